use std::fmt::Debug;

use crate::JoseError;

/// A payload compression algorithm (the JWE zip header value).
pub trait JweCompression: Debug + Send + Sync {
    /// Return the "zip" (compression) header parameter value of JWE.
    fn name(&self) -> &str;

    /// Compress the message.
    fn compress(&self, message: &[u8]) -> Result<Vec<u8>, JoseError>;

    /// Decompress the message.
    fn decompress(&self, message: &[u8]) -> Result<Vec<u8>, JoseError>;

    fn box_clone(&self) -> Box<dyn JweCompression>;
}

impl PartialEq for Box<dyn JweCompression> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Box<dyn JweCompression> {}

impl Clone for Box<dyn JweCompression> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
