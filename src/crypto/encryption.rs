use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::keys::KEY_LENGTH;
use super::CryptoError;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Encrypted field container: nonce + ciphertext (includes AES-GCM auth tag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

fn cipher(key_bytes: &[u8; KEY_LENGTH]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes))
}

impl EncryptedData {
    /// Seal `plaintext` under a fresh random 96-bit nonce.
    pub(crate) fn encrypt(key_bytes: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Self, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher(key_bytes)
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(Self {
            nonce: nonce.into(),
            ciphertext,
        })
    }

    /// Open the envelope; any authentication failure is `DecryptionFailed`.
    pub(crate) fn decrypt(&self, key_bytes: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
        cipher(key_bytes)
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Wire layout: nonce, then ciphertext with its trailing tag.
    pub fn to_bytes(&self) -> Vec<u8> {
        [self.nonce.as_slice(), self.ciphertext.as_slice()].concat()
    }

    /// Inverse of `to_bytes`. Anything shorter than nonce plus tag is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::MalformedCiphertext(format!(
                "{} bytes is shorter than nonce + tag",
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LENGTH);
        Ok(Self {
            nonce: nonce
                .try_into()
                .map_err(|_| CryptoError::MalformedCiphertext("nonce length".into()))?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Text envelope stored in document fields: base64([nonce][ciphertext...])
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::FieldKey;

    fn test_key() -> FieldKey {
        FieldKey::from_bytes([7u8; KEY_LENGTH])
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = test_key();
        let plaintext = b"Prescription for appointment A-1042";
        let encrypted = key.encrypt(plaintext).unwrap();
        let decrypted = key.decrypt(&encrypted).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key1 = FieldKey::from_bytes([1u8; KEY_LENGTH]);
        let key2 = FieldKey::from_bytes([2u8; KEY_LENGTH]);
        let encrypted = key1.encrypt(b"secret").unwrap();
        assert_eq!(key2.decrypt(&encrypted), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_ciphertext_detected() {
        let key = test_key();
        let encrypted = key.encrypt(b"secret data").unwrap();
        let mut tampered = encrypted.clone();
        tampered.ciphertext[0] ^= 0xFF;
        assert!(key.decrypt(&tampered).is_err());
    }

    #[test]
    fn base64_envelope_survives_surrounding_whitespace() {
        let key = test_key();
        let encoded = key.encrypt(b"envelope").unwrap().to_base64();
        let restored = EncryptedData::from_base64(&format!("  {encoded}\n")).unwrap();
        assert_eq!(key.decrypt(&restored).unwrap(), b"envelope");
    }

    #[test]
    fn from_bytes_rejects_too_short() {
        let result = EncryptedData::from_bytes(&[0u8; 10]);
        assert!(matches!(result, Err(CryptoError::MalformedCiphertext(_))));
    }

    #[test]
    fn from_base64_rejects_non_base64() {
        let result = EncryptedData::from_base64("John Smith");
        assert!(matches!(result, Err(CryptoError::MalformedCiphertext(_))));
    }

    #[test]
    fn different_encryptions_produce_different_nonces() {
        let key = test_key();
        let e1 = key.encrypt(b"same data").unwrap();
        let e2 = key.encrypt(b"same data").unwrap();
        assert_ne!(e1.nonce, e2.nonce);
        assert_ne!(e1.to_base64(), e2.to_base64());
    }

    #[test]
    fn wire_layout_is_nonce_then_ciphertext() {
        let key = test_key();
        let encrypted = key.encrypt(b"layout").unwrap();
        let bytes = encrypted.to_bytes();
        assert_eq!(bytes.len(), NONCE_LENGTH + b"layout".len() + TAG_LENGTH);
        assert_eq!(&bytes[..NONCE_LENGTH], &encrypted.nonce);
        assert_eq!(EncryptedData::from_bytes(&bytes).unwrap(), encrypted);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let key = test_key();
        let encrypted = key.encrypt(b"").unwrap();
        let decrypted = key.decrypt(&encrypted).unwrap();
        assert!(decrypted.is_empty());
    }
}
