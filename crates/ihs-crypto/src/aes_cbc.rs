//! AES-CBC-PKCS7 dispatch over the two session-key sizes the protocol allows.

use aes::{Aes128, Aes256};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::{
    errors::{CryptoError, Result},
    key::SessionKey,
};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt `plaintext` under `key`/`iv` with PKCS#7 padding.
#[must_use]
pub fn encrypt(key: &SessionKey, iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    if key.is_aes_128() {
        Aes128CbcEnc::new(key.as_bytes().into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    } else {
        Aes256CbcEnc::new(key.as_bytes().into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }
}

/// Decrypt `ciphertext` under `key`/`iv`, validating and stripping PKCS#7 padding.
pub fn decrypt(key: &SessionKey, iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if key.is_aes_128() {
        Aes128CbcDec::new(key.as_bytes().into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_err| CryptoError::PaddingInvalid)
    } else {
        Aes256CbcDec::new(key.as_bytes().into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_err| CryptoError::PaddingInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_aes_128() {
        let key = SessionKey::new(vec![0x11u8; 16]).expect("valid key");
        let iv = [0x22u8; 16];
        let plaintext = b"Steam In-Home Streaming payload";
        let ciphertext = encrypt(&key, &iv, plaintext);
        let decrypted = decrypt(&key, &iv, &ciphertext).expect("should decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn round_trips_aes_256() {
        let key = SessionKey::new(vec![0x33u8; 32]).expect("valid key");
        let iv = [0x44u8; 16];
        let plaintext = b"another payload of a different length";
        let ciphertext = encrypt(&key, &iv, plaintext);
        let decrypted = decrypt(&key, &iv, &ciphertext).expect("should decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails_to_unpad() {
        let key = SessionKey::new(vec![0x11u8; 16]).expect("valid key");
        let other = SessionKey::new(vec![0x99u8; 16]).expect("valid key");
        let iv = [0x22u8; 16];
        let ciphertext = encrypt(&key, &iv, b"some plaintext here");
        assert!(decrypt(&other, &iv, &ciphertext).is_err());
    }
}
