use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::encryption::EncryptedData;
use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const KEY_LENGTH: usize = 32; // AES-256
pub const SALT_LENGTH: usize = 32;

/// Shared field-encryption key, zeroed on drop.
///
/// Loaded once at startup from configuration and handed to the pipeline
/// by reference; never rotated while the process runs.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct FieldKey {
    pub(super) key_bytes: [u8; KEY_LENGTH],
}

impl FieldKey {
    pub fn from_bytes(key_bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key_bytes }
    }

    /// Parse a base64-encoded 32-byte key
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        if decoded.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LENGTH} bytes, got {}",
                decoded.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_LENGTH];
        key_bytes.copy_from_slice(&decoded);
        Ok(Self { key_bytes })
    }

    /// Derive from passphrase + salt using PBKDF2-SHA256
    pub fn derive(passphrase: &str, salt: &[u8]) -> Self {
        let mut key_bytes = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key_bytes);
        Self { key_bytes }
    }

    /// Generate a fresh random key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key_bytes = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        Self { key_bytes }
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key_bytes))
    }

    /// Encrypt data using AES-256-GCM
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData, CryptoError> {
        EncryptedData::encrypt(&self.key_bytes, plaintext)
    }

    /// Decrypt data using AES-256-GCM
    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>, CryptoError> {
        encrypted.decrypt(&self.key_bytes)
    }

    /// Encrypt a text field into its stored base64 envelope.
    pub fn encrypt_text(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(self.encrypt(plaintext.as_bytes())?.to_base64())
    }

    /// Recover the plaintext of a stored base64 envelope.
    pub fn decrypt_text(&self, envelope: &str) -> Result<String, CryptoError> {
        let encrypted = EncryptedData::from_base64(envelope)?;
        let bytes = self.decrypt(&encrypted)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::NotUtf8)
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldKey(..)")
    }
}

/// Generate a cryptographically random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_produces_deterministic_key() {
        let salt = [42u8; SALT_LENGTH];
        let key1 = FieldKey::derive("clinic passphrase", &salt);
        let key2 = FieldKey::derive("clinic passphrase", &salt);
        assert_eq!(key1.key_bytes, key2.key_bytes);

        let other = FieldKey::derive("clinic passphrase", &[1u8; SALT_LENGTH]);
        assert_ne!(key1.key_bytes, other.key_bytes);
    }

    #[test]
    fn base64_key_round_trip() {
        let key = FieldKey::generate();
        let encoded = key.to_base64();
        let restored = FieldKey::from_base64(&encoded).unwrap();
        assert_eq!(key.key_bytes, restored.key_bytes);
    }

    #[test]
    fn base64_key_rejects_wrong_length() {
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            FieldKey::from_base64(&short),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(FieldKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn text_round_trip() {
        let key = FieldKey::generate();
        let envelope = key.encrypt_text("Ayesha Perera").unwrap();
        assert_ne!(envelope, "Ayesha Perera");
        assert_eq!(key.decrypt_text(&envelope).unwrap(), "Ayesha Perera");
    }

    #[test]
    fn text_with_wrong_key_fails() {
        let envelope = FieldKey::generate().encrypt_text("Ayesha Perera").unwrap();
        let result = FieldKey::generate().decrypt_text(&envelope);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn non_utf8_plaintext_is_rejected() {
        let key = FieldKey::generate();
        let envelope = key.encrypt(&[0xFF, 0xFE, 0xFD]).unwrap().to_base64();
        assert_eq!(key.decrypt_text(&envelope), Err(CryptoError::NotUtf8));
    }

    #[test]
    fn debug_does_not_leak_key_bytes() {
        let key = FieldKey::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(format!("{key:?}"), "FieldKey(..)");
    }

    #[test]
    fn generate_salt_is_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
