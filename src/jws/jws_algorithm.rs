use std::fmt::Debug;

use crate::jwk::Jwk;
use crate::JoseError;

pub trait JwsAlgorithm: Debug + Send + Sync {
    /// Return the "alg" (algorithm) header parameter value of JWS.
    fn name(&self) -> &str;

    /// Return the "kty" (key type) the algorithm operates on.
    fn key_type(&self) -> &str;

    /// Return the JOSE header parameter names the algorithm consumes.
    /// Used to compute the understood set for the crit check.
    fn processed_parameters(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Return a signer from a JWK private key.
    ///
    /// # Arguments
    ///
    /// * `jwk` - a JWK private key.
    fn signer_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JwsSigner>, JoseError>;

    /// Return a verifier from a JWK key.
    ///
    /// # Arguments
    ///
    /// * `jwk` - a JWK key.
    fn verifier_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, JoseError>;

    fn box_clone(&self) -> Box<dyn JwsAlgorithm>;
}

impl PartialEq for Box<dyn JwsAlgorithm> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Box<dyn JwsAlgorithm> {}

impl Clone for Box<dyn JwsAlgorithm> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub trait JwsSigner: Debug + Send + Sync {
    /// Return the source algorithm instance.
    fn algorithm(&self) -> &dyn JwsAlgorithm;

    /// Return the signature length of the algorithm on this key.
    fn signature_len(&self) -> usize;

    /// Return the source key ID.
    /// The default value is the kid parameter of the JWK.
    fn key_id(&self) -> Option<&str>;

    /// Return a signature of the data.
    ///
    /// # Arguments
    ///
    /// * `message` - the message data to sign.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JoseError>;

    fn box_clone(&self) -> Box<dyn JwsSigner>;
}

impl Clone for Box<dyn JwsSigner> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub trait JwsVerifier: Debug + Send + Sync {
    /// Return the source algorithm instance.
    fn algorithm(&self) -> &dyn JwsAlgorithm;

    /// Return the source key ID.
    /// The default value is the kid parameter of the JWK.
    fn key_id(&self) -> Option<&str>;

    /// Verify the data by the signature.
    ///
    /// # Arguments
    ///
    /// * `message` - a message data to verify.
    /// * `signature` - a signature data.
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), JoseError>;

    fn box_clone(&self) -> Box<dyn JwsVerifier>;
}

impl Clone for Box<dyn JwsVerifier> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
