use std::fmt;
use std::ops::Deref;

use anyhow::bail;

use crate::jwk::Jwk;
use crate::jws::{JwsAlgorithm, JwsSigner, JwsVerifier};
use crate::JoseError;

/// The "none" signature algorithm: recognized, emits a zero-length
/// signature, and is rejected by readers and writers unless the context
/// explicitly allows unsecured objects.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum UnsecuredJwsAlgorithm {
    None,
}

impl UnsecuredJwsAlgorithm {
    pub fn signer(&self) -> UnsecuredJwsSigner {
        UnsecuredJwsSigner { algorithm: *self }
    }

    pub fn verifier(&self) -> UnsecuredJwsVerifier {
        UnsecuredJwsVerifier { algorithm: *self }
    }
}

impl JwsAlgorithm for UnsecuredJwsAlgorithm {
    fn name(&self) -> &str {
        "none"
    }

    fn key_type(&self) -> &str {
        "none"
    }

    fn signer_from_jwk(&self, _jwk: &Jwk) -> Result<Box<dyn JwsSigner>, JoseError> {
        Ok(Box::new(self.signer()))
    }

    fn verifier_from_jwk(&self, _jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, JoseError> {
        Ok(Box::new(self.verifier()))
    }

    fn box_clone(&self) -> Box<dyn JwsAlgorithm> {
        Box::new(*self)
    }
}

impl fmt::Display for UnsecuredJwsAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for UnsecuredJwsAlgorithm {
    type Target = dyn JwsAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct UnsecuredJwsSigner {
    algorithm: UnsecuredJwsAlgorithm,
}

impl JwsSigner for UnsecuredJwsSigner {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn signature_len(&self) -> usize {
        0
    }

    fn key_id(&self) -> Option<&str> {
        None
    }

    fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, JoseError> {
        Ok(Vec::new())
    }

    fn box_clone(&self) -> Box<dyn JwsSigner> {
        Box::new(self.clone())
    }
}

impl Deref for UnsecuredJwsSigner {
    type Target = dyn JwsSigner;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct UnsecuredJwsVerifier {
    algorithm: UnsecuredJwsAlgorithm,
}

impl JwsVerifier for UnsecuredJwsVerifier {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        None
    }

    fn verify(&self, _message: &[u8], signature: &[u8]) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            if !signature.is_empty() {
                bail!("The none algorithm signature must be empty.");
            }
            Ok(())
        })()
        .map_err(JoseError::SignatureVerificationFailed)
    }

    fn box_clone(&self) -> Box<dyn JwsVerifier> {
        Box::new(self.clone())
    }
}

impl Deref for UnsecuredJwsVerifier {
    type Target = dyn JwsVerifier;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsecured_signature_is_empty() -> anyhow::Result<()> {
        let signer = UnsecuredJwsAlgorithm::None.signer();
        let signature = signer.sign(b"payload")?;
        assert!(signature.is_empty());

        let verifier = UnsecuredJwsAlgorithm::None.verifier();
        verifier.verify(b"payload", &signature)?;
        assert!(verifier.verify(b"payload", b"sig").is_err());
        Ok(())
    }
}
