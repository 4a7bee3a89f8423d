use std::borrow::Cow;
use std::fmt::Debug;

use crate::jwe::{JweContentEncryption, JweHeader};
use crate::jwk::Jwk;
use crate::JoseError;

/// The sub-kind of a key management algorithm.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KeyManagementKind {
    /// The CEK is the key itself or derived by key agreement; the
    /// encrypted key is empty.
    Direct,
    /// The CEK is wrapped with a key encryption key.
    Wrap,
    /// The CEK is encrypted with the recipient key.
    Encrypt,
}

pub trait JweAlgorithm: Debug + Send + Sync {
    /// Return the "alg" (algorithm) header parameter value of JWE.
    fn name(&self) -> &str;

    /// Return the "kty" (key type) the algorithm operates on.
    fn key_type(&self) -> &str;

    /// Return the sub-kind of the algorithm.
    fn kind(&self) -> KeyManagementKind;

    /// Return the JOSE header parameter names the algorithm consumes.
    /// Used to compute the understood set for the crit check.
    fn processed_parameters(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Return an encrypter from a JWK key.
    fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JweEncrypter>, JoseError>;

    /// Return a decrypter from a JWK key.
    fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JweDecrypter>, JoseError>;

    fn box_clone(&self) -> Box<dyn JweAlgorithm>;
}

impl PartialEq for Box<dyn JweAlgorithm> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Box<dyn JweAlgorithm> {}

impl Clone for Box<dyn JweAlgorithm> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub trait JweEncrypter: Debug + Send + Sync {
    /// Return the source algorithm instance.
    fn algorithm(&self) -> &dyn JweAlgorithm;

    /// Return the source key ID.
    fn key_id(&self) -> Option<&str>;

    /// Return the forced CEK of a direct or agreement algorithm, emitting
    /// the header parameters the derivation produces. None means a random
    /// CEK of the content encryption's key length must be generated.
    fn compute_content_encryption_key(
        &self,
        cipher: &dyn JweContentEncryption,
        header: &mut JweHeader,
    ) -> Result<Option<Cow<[u8]>>, JoseError>;

    /// Wrap or encrypt the CEK, emitting algorithm specific header
    /// parameters. None means the encrypted key part is empty.
    fn encrypt(
        &self,
        key: &[u8],
        cipher: &dyn JweContentEncryption,
        header: &mut JweHeader,
    ) -> Result<Option<Vec<u8>>, JoseError>;

    fn box_clone(&self) -> Box<dyn JweEncrypter>;
}

impl Clone for Box<dyn JweEncrypter> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub trait JweDecrypter: Debug + Send + Sync {
    /// Return the source algorithm instance.
    fn algorithm(&self) -> &dyn JweAlgorithm;

    /// Return the source key ID.
    fn key_id(&self) -> Option<&str>;

    /// Recover the CEK from the encrypted key part and the header.
    fn decrypt(
        &self,
        encrypted_key: Option<&[u8]>,
        cipher: &dyn JweContentEncryption,
        header: &JweHeader,
    ) -> Result<Cow<[u8]>, JoseError>;

    fn box_clone(&self) -> Box<dyn JweDecrypter>;
}

impl Clone for Box<dyn JweDecrypter> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
