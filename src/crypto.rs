use crate::error::AppError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;

/// AES-256-GCM cipher for tokens at rest
///
/// Ciphertexts are encoded as `base64(nonce):base64(ciphertext)` with a random
/// 96-bit nonce per value.
pub struct TokenCipher {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Generate a new salt for key derivation
    pub fn generate_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    /// Derive the encryption key from the configured secret and a persisted salt
    pub fn derive(secret: &str, salt: &str) -> Result<Self, AppError> {
        let salt = SaltString::from_b64(salt)
            .map_err(|e| AppError::Config(format!("Invalid token store salt: {}", e)))?;

        let password_hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to derive encryption key: {}", e)))?;

        let hash_bytes = password_hash
            .hash
            .ok_or_else(|| AppError::Internal("Failed to extract hash bytes".to_string()))?;

        Ok(Self {
            key: hash_bytes.as_bytes()[..32].to_vec(),
        })
    }

    /// Encrypt a string with random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let nonce_bytes: [u8; 12] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        Ok(format!(
            "{}:{}",
            STANDARD.encode(nonce_bytes),
            STANDARD.encode(&ciphertext)
        ))
    }

    /// Decrypt a string (expects nonce:ciphertext format)
    pub fn decrypt(&self, encoded: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let (nonce_b64, ciphertext_b64) = encoded
            .split_once(':')
            .filter(|(_, rest)| !rest.contains(':'))
            .ok_or_else(|| AppError::Internal("Invalid ciphertext format".to_string()))?;

        let nonce_bytes = STANDARD
            .decode(nonce_b64)
            .map_err(|e| AppError::Internal(format!("Failed to decode nonce: {}", e)))?;
        if nonce_bytes.len() != 12 {
            return Err(AppError::Internal("Invalid nonce length".to_string()));
        }

        let ciphertext = STANDARD
            .decode(ciphertext_b64)
            .map_err(|e| AppError::Internal(format!("Failed to decode ciphertext: {}", e)))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| AppError::Internal(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Internal(format!("Decrypted token is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        let salt = TokenCipher::generate_salt();
        TokenCipher::derive("a-long-enough-test-secret", &salt).unwrap()
    }

    #[test]
    fn test_encryption_decryption() {
        let cipher = test_cipher();
        let encrypted = cipher.encrypt("sensitive_token_data").unwrap();

        assert_ne!(encrypted, "sensitive_token_data");
        assert!(encrypted.contains(':'));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "sensitive_token_data");
    }

    #[test]
    fn test_random_nonce_different_ciphertexts() {
        let cipher = test_cipher();
        let encrypted1 = cipher.encrypt("same_plaintext").unwrap();
        let encrypted2 = cipher.encrypt("same_plaintext").unwrap();

        assert_ne!(encrypted1, encrypted2);
        assert_eq!(cipher.decrypt(&encrypted1).unwrap(), "same_plaintext");
        assert_eq!(cipher.decrypt(&encrypted2).unwrap(), "same_plaintext");
    }

    #[test]
    fn test_same_secret_and_salt_derive_same_key() {
        let salt = TokenCipher::generate_salt();
        let a = TokenCipher::derive("a-long-enough-test-secret", &salt).unwrap();
        let b = TokenCipher::derive("a-long-enough-test-secret", &salt).unwrap();

        let encrypted = a.encrypt("tok1").unwrap();
        assert_eq!(b.decrypt(&encrypted).unwrap(), "tok1");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = test_cipher().encrypt("tok1").unwrap();
        assert!(test_cipher().decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_invalid_ciphertext_format() {
        let cipher = test_cipher();
        assert!(cipher.decrypt("invalid_format_without_colon").is_err());
        assert!(cipher.decrypt("invalid:base64:too:many:parts").is_err());
    }
}
