//! The authentication-request token: HMAC-SHA-256 over a fixed ASCII
//! literal, keyed by the session key (`IHS_SessionFrameHMACSHA256`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::key::SessionKey;

type HmacSha256 = Hmac<Sha256>;

/// The literal HMAC'd to produce the `AuthenticationRequest.token` field.
pub const AUTHENTICATION_LITERAL: &[u8] = b"Steam In-Home Streaming";

/// Compute the 32-byte authentication token for `key`.
#[must_use]
pub fn authentication_token(key: &SessionKey) -> [u8; 32] {
    #[allow(clippy::expect_used)]
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(AUTHENTICATION_LITERAL);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_deterministic_for_a_given_key() {
        let key = SessionKey::new(vec![0x7Fu8; 16]).expect("valid key");
        assert_eq!(authentication_token(&key), authentication_token(&key));
    }

    #[test]
    fn different_keys_produce_different_tokens() {
        let a = SessionKey::new(vec![0x01u8; 16]).expect("valid key");
        let b = SessionKey::new(vec![0x02u8; 16]).expect("valid key");
        assert_ne!(authentication_token(&a), authentication_token(&b));
    }
}
