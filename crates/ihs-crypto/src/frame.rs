//! Per-message frame encryption: AES-CBC-PKCS7 with an HMAC-MD5-derived IV
//! and a strictly increasing plaintext-embedded sequence number
//! (`IHS_SessionFrameEncrypt`/`IHS_SessionFrameDecrypt`).

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::{aes_cbc, errors::CryptoError, key::SessionKey};

type HmacMd5 = Hmac<Md5>;

fn hmac_md5(key: &SessionKey, data: &[u8]) -> [u8; 16] {
    #[allow(clippy::expect_used)]
    let mut mac = HmacMd5::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Encrypt `plaintext` under `key` for the given per-channel sequence
/// number. Output is `iv(16) || ciphertext`, where the ciphertext covers
/// `sequence(8, LE) || plaintext`.
#[must_use]
pub fn encrypt(key: &SessionKey, plaintext: &[u8], sequence: u64) -> Vec<u8> {
    let mut plain = Vec::with_capacity(8 + plaintext.len());
    plain.extend_from_slice(&sequence.to_le_bytes());
    plain.extend_from_slice(plaintext);

    let iv = hmac_md5(key, &plain);
    let ciphertext = aes_cbc::encrypt(key, &iv, &plain);

    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Outcome of [`decrypt`], mirroring spec.md §4.3/§7's three-way sequence
/// policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// `actual == expected`: deliver, advance nothing (caller bumps by one).
    Ok {
        /// The decrypted, sequence-stripped plaintext.
        plaintext: Vec<u8>,
    },
    /// `actual > expected`: deliver, but the caller should reset its
    /// expectation to `actual + 1` and log a warning.
    SequenceJump {
        /// The decrypted, sequence-stripped plaintext.
        plaintext: Vec<u8>,
        /// The sequence actually observed.
        actual: u64,
    },
    /// `actual < expected`: a replay or reordering; drop silently.
    OldSequence {
        /// The sequence actually observed.
        actual: u64,
    },
    /// The HMAC over the decrypted plaintext didn't match the IV prefix:
    /// drop silently, do not advance the sequence expectation.
    HashMismatch,
}

/// Decrypt a frame body of the form `iv(16) || ciphertext`, verifying the
/// HMAC-derived IV and classifying the embedded sequence number against
/// `expected`.
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if `input` is shorter than
/// the 16-byte IV prefix, or [`CryptoError::PaddingInvalid`] if PKCS#7
/// unpadding fails (corrupt ciphertext, not a protocol-level outcome).
pub fn decrypt(
    key: &SessionKey,
    input: &[u8],
    expected: u64,
) -> Result<DecryptOutcome, CryptoError> {
    if input.len() < 16 {
        return Err(CryptoError::CiphertextTooShort(input.len()));
    }
    #[allow(clippy::expect_used)]
    let iv: [u8; 16] = input[..16].try_into().expect("sliced to exactly 16 bytes");
    let ciphertext = &input[16..];

    let plain = aes_cbc::decrypt(key, &iv, ciphertext)?;

    let expected_iv = hmac_md5(key, &plain);
    if expected_iv != iv {
        return Ok(DecryptOutcome::HashMismatch);
    }

    if plain.len() < 8 {
        return Err(CryptoError::PaddingInvalid);
    }
    #[allow(clippy::expect_used)]
    let actual = u64::from_le_bytes(plain[..8].try_into().expect("sliced to exactly 8 bytes"));
    let plaintext = plain[8..].to_vec();

    Ok(match actual.cmp(&expected) {
        std::cmp::Ordering::Equal => DecryptOutcome::Ok { plaintext },
        std::cmp::Ordering::Greater => DecryptOutcome::SequenceJump { plaintext, actual },
        std::cmp::Ordering::Less => DecryptOutcome::OldSequence { actual },
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::new(vec![0x5Au8; 16]).expect("valid key")
    }

    #[test]
    fn encrypt_decrypt_is_inverse() {
        let key = test_key();
        let plaintext = b"authenticate me";
        let ciphertext = encrypt(&key, plaintext, 7);
        let outcome = decrypt(&key, &ciphertext, 7).expect("should decrypt");
        assert_eq!(outcome, DecryptOutcome::Ok { plaintext: plaintext.to_vec() });
    }

    #[test]
    fn flipping_a_bit_causes_hash_mismatch_or_padding_error() {
        let key = test_key();
        let mut ciphertext = encrypt(&key, b"some control message", 1);
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        let outcome = decrypt(&key, &ciphertext, 1);
        // Corrupting the last byte usually breaks PKCS#7 padding; either
        // outcome demonstrates the frame is rejected.
        assert!(matches!(outcome, Ok(DecryptOutcome::HashMismatch) | Err(CryptoError::PaddingInvalid)));
    }

    #[test]
    fn flipping_iv_bit_causes_hash_mismatch() {
        let key = test_key();
        let mut ciphertext = encrypt(&key, b"some control message", 1);
        ciphertext[0] ^= 0x01;
        let outcome = decrypt(&key, &ciphertext, 1).expect("AES-CBC tolerates any IV");
        assert_eq!(outcome, DecryptOutcome::HashMismatch);
    }

    #[test]
    fn replaying_old_sequence_is_detected() {
        let key = test_key();
        let ciphertext = encrypt(&key, b"keepalive", 5);
        let outcome = decrypt(&key, &ciphertext, 6).expect("should decrypt");
        assert_eq!(outcome, DecryptOutcome::OldSequence { actual: 5 });
    }

    #[test]
    fn sequence_jump_is_reported() {
        let key = test_key();
        let ciphertext = encrypt(&key, b"keepalive", 10);
        let outcome = decrypt(&key, &ciphertext, 3).expect("should decrypt");
        assert_eq!(
            outcome,
            DecryptOutcome::SequenceJump { plaintext: b"keepalive".to_vec(), actual: 10 }
        );
    }

    proptest! {
        #[test]
        fn encrypt_decrypt_roundtrip_any_plaintext_and_sequence(
            plaintext in prop::collection::vec(any::<u8>(), 0..512),
            sequence in any::<u64>(),
        ) {
            let key = test_key();
            let ciphertext = encrypt(&key, &plaintext, sequence);
            let outcome = decrypt(&key, &ciphertext, sequence).expect("should decrypt");
            prop_assert_eq!(outcome, DecryptOutcome::Ok { plaintext });
        }
    }
}
