use std::fmt::Debug;

use crate::JoseError;

/// A content encryption algorithm (the JWE enc header value).
pub trait JweContentEncryption: Debug + Send + Sync {
    /// Return the "enc" (encryption) header parameter value of JWE.
    fn name(&self) -> &str;

    /// Return the required CEK length in bytes.
    fn key_len(&self) -> usize;

    /// Return the required IV length in bytes.
    fn iv_len(&self) -> usize;

    /// Encrypt the message.
    ///
    /// # Arguments
    ///
    /// * `key` - the content encryption key
    /// * `iv` - the initialization vector
    /// * `message` - the plaintext
    /// * `aad` - the additional authenticated data
    ///
    /// Returns the ciphertext and the authentication tag.
    fn encrypt(
        &self,
        key: &[u8],
        iv: Option<&[u8]>,
        message: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), JoseError>;

    /// Decrypt the message, verifying the authentication tag.
    fn decrypt(
        &self,
        key: &[u8],
        iv: Option<&[u8]>,
        encrypted_message: &[u8],
        aad: &[u8],
        tag: Option<&[u8]>,
    ) -> Result<Vec<u8>, JoseError>;

    fn box_clone(&self) -> Box<dyn JweContentEncryption>;
}

impl PartialEq for Box<dyn JweContentEncryption> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Box<dyn JweContentEncryption> {}

impl Clone for Box<dyn JweContentEncryption> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
