use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::pkey::{PKey, Private, Public};
use openssl::sign::{Signer, Verifier};
use serde_json::Value;

use crate::jwk::key_generator::EdCurve;
use crate::jwk::Jwk;
use crate::jws::alg::rsassa::decode_parameter;
use crate::jws::{JwsAlgorithm, JwsSigner, JwsVerifier};
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum EddsaJwsAlgorithm {
    /// EdDSA over Ed25519 or Ed448
    Eddsa,
}

impl EddsaJwsAlgorithm {
    /// Return a signer from a private key that is formatted by a JWK of
    /// OKP type.
    pub fn signer_from_jwk(&self, jwk: &Jwk) -> Result<EddsaJwsSigner, JoseError> {
        (|| -> anyhow::Result<EddsaJwsSigner> {
            let curve = self.check_jwk(jwk, "sign")?;

            let d = decode_parameter(jwk, "d")?;
            let private_key = PKey::private_key_from_raw_bytes(&d, curve.pkey_id())?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(EddsaJwsSigner {
                algorithm: *self,
                curve,
                private_key,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    /// Return a verifier from a public key that is formatted by a JWK of
    /// OKP type.
    pub fn verifier_from_jwk(&self, jwk: &Jwk) -> Result<EddsaJwsVerifier, JoseError> {
        (|| -> anyhow::Result<EddsaJwsVerifier> {
            let curve = self.check_jwk(jwk, "verify")?;

            let x = decode_parameter(jwk, "x")?;
            let public_key = PKey::public_key_from_raw_bytes(&x, curve.pkey_id())?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(EddsaJwsVerifier {
                algorithm: *self,
                public_key,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn check_jwk(&self, jwk: &Jwk, key_operation: &str) -> anyhow::Result<EdCurve> {
        match jwk.key_type() {
            val if val == "OKP" => {}
            val => bail!("A parameter kty must be OKP: {}", val),
        }
        match jwk.key_use() {
            Some(val) if val == "sig" => {}
            None => {}
            Some(val) => bail!("A parameter use must be sig: {}", val),
        }
        if !jwk.is_for_key_operation(key_operation) {
            bail!("A parameter key_ops must contains {}.", key_operation);
        }
        match jwk.algorithm() {
            Some(val) if val == self.name() => {}
            None => {}
            Some(val) => bail!("A parameter alg must be {} but {}", self.name(), val),
        }
        match jwk.parameter("crv") {
            Some(Value::String(val)) => match EdCurve::from_name(val) {
                Some(curve) => Ok(curve),
                None => bail!("A parameter crv must be Ed25519 or Ed448: {}", val),
            },
            Some(_) => bail!("A parameter crv must be a string."),
            None => bail!("A parameter crv is required."),
        }
    }
}

impl JwsAlgorithm for EddsaJwsAlgorithm {
    fn name(&self) -> &str {
        "EdDSA"
    }

    fn key_type(&self) -> &str {
        "OKP"
    }

    fn signer_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JwsSigner>, JoseError> {
        Ok(Box::new(self.signer_from_jwk(jwk)?))
    }

    fn verifier_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, JoseError> {
        Ok(Box::new(self.verifier_from_jwk(jwk)?))
    }

    fn box_clone(&self) -> Box<dyn JwsAlgorithm> {
        Box::new(*self)
    }
}

impl fmt::Display for EddsaJwsAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for EddsaJwsAlgorithm {
    type Target = dyn JwsAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct EddsaJwsSigner {
    algorithm: EddsaJwsAlgorithm,
    curve: EdCurve,
    private_key: PKey<Private>,
    key_id: Option<String>,
}

impl JwsSigner for EddsaJwsSigner {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn signature_len(&self) -> usize {
        match self.curve {
            EdCurve::Ed25519 => 64,
            EdCurve::Ed448 => 114,
        }
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        (|| -> anyhow::Result<Vec<u8>> {
            let mut signer = Signer::new_without_digest(&self.private_key)?;
            Ok(signer.sign_oneshot_to_vec(message)?)
        })()
        .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JwsSigner> {
        Box::new(self.clone())
    }
}

impl Deref for EddsaJwsSigner {
    type Target = dyn JwsSigner;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct EddsaJwsVerifier {
    algorithm: EddsaJwsAlgorithm,
    public_key: PKey<Public>,
    key_id: Option<String>,
}

impl JwsVerifier for EddsaJwsVerifier {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            let mut verifier = Verifier::new_without_digest(&self.public_key)?;
            if !verifier.verify_oneshot(signature, message)? {
                bail!("The signature does not verify.");
            }
            Ok(())
        })()
        .map_err(JoseError::SignatureVerificationFailed)
    }

    fn box_clone(&self) -> Box<dyn JwsVerifier> {
        Box::new(self.clone())
    }
}

impl Deref for EddsaJwsVerifier {
    type Target = dyn JwsVerifier;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::key_generator::generate_ed_key;

    #[test]
    fn test_sign_and_verify_eddsa() -> anyhow::Result<()> {
        let input = b"abcde12345";

        for curve in &[EdCurve::Ed25519, EdCurve::Ed448] {
            let jwk = generate_ed_key(*curve)?;

            let signer = EddsaJwsAlgorithm::Eddsa.signer_from_jwk(&jwk)?;
            let signature = signer.sign(input)?;
            assert_eq!(signature.len(), signer.signature_len());

            let public = jwk.to_public_key().unwrap();
            let verifier = EddsaJwsAlgorithm::Eddsa.verifier_from_jwk(&public)?;
            verifier.verify(input, &signature)?;

            let mut bad = signature.clone();
            bad[0] ^= 0x01;
            assert!(verifier.verify(input, &bad).is_err());
        }

        Ok(())
    }
}
