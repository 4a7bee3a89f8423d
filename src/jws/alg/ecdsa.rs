use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::hash;
use serde_json::Value;

use crate::jwk::key_generator::EcCurve;
use crate::jwk::Jwk;
use crate::jws::alg::rsassa::decode_parameter;
use crate::jws::{JwsAlgorithm, JwsSigner, JwsVerifier};
use crate::util::HashAlgorithm;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum EcdsaJwsAlgorithm {
    /// ECDSA using P-256 and SHA-256
    Es256,
    /// ECDSA using P-384 and SHA-384
    Es384,
    /// ECDSA using P-521 and SHA-512
    Es512,
}

impl EcdsaJwsAlgorithm {
    /// Return a signer from a private key that is formatted by a JWK of
    /// EC type.
    pub fn signer_from_jwk(&self, jwk: &Jwk) -> Result<EcdsaJwsSigner, JoseError> {
        (|| -> anyhow::Result<EcdsaJwsSigner> {
            self.check_jwk(jwk, "sign")?;

            let group = EcGroup::from_curve_name(self.curve().nid())?;
            let d = decode_parameter(jwk, "d")?;
            let d = BigNum::from_slice(&d)?;

            let public_point = self.public_point_from_jwk(jwk, &group)?;
            let private_key = EcKey::from_private_components(&group, &d, &public_point)?;
            private_key.check_key()?;

            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(EcdsaJwsSigner {
                algorithm: *self,
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
    /// EC type.
    pub fn verifier_from_jwk(&self, jwk: &Jwk) -> Result<EcdsaJwsVerifier, JoseError> {
        (|| -> anyhow::Result<EcdsaJwsVerifier> {
            self.check_jwk(jwk, "verify")?;

            let group = EcGroup::from_curve_name(self.curve().nid())?;
            let public_point = self.public_point_from_jwk(jwk, &group)?;
            let public_key = EcKey::from_public_key(&group, &public_point)?;
            public_key.check_key()?;

            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(EcdsaJwsVerifier {
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

    fn public_point_from_jwk(&self, jwk: &Jwk, group: &EcGroup) -> anyhow::Result<EcPoint> {
        let x = decode_parameter(jwk, "x")?;
        let y = decode_parameter(jwk, "y")?;
        let x = BigNum::from_slice(&x)?;
        let y = BigNum::from_slice(&y)?;
        let mut ctx = BigNumContext::new()?;
        let mut point = EcPoint::new(group)?;
        point.set_affine_coordinates_gfp(group, &x, &y, &mut ctx)?;
        Ok(point)
    }

    fn check_jwk(&self, jwk: &Jwk, key_operation: &str) -> anyhow::Result<()> {
        match jwk.key_type() {
            val if val == "EC" => {}
            val => bail!("A parameter kty must be EC: {}", val),
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
            Some(Value::String(val)) if val == self.curve().name() => {}
            Some(Value::String(val)) => {
                bail!("A parameter crv must be {} but {}", self.curve().name(), val)
            }
            Some(_) => bail!("A parameter crv must be a string."),
            None => bail!("A parameter crv is required."),
        }
        Ok(())
    }

    /// Return the curve the algorithm is bound to.
    pub fn curve(&self) -> EcCurve {
        match self {
            Self::Es256 => EcCurve::P256,
            Self::Es384 => EcCurve::P384,
            Self::Es512 => EcCurve::P521,
        }
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Es256 => HashAlgorithm::Sha256,
            Self::Es384 => HashAlgorithm::Sha384,
            Self::Es512 => HashAlgorithm::Sha512,
        }
    }
}

impl JwsAlgorithm for EcdsaJwsAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
        }
    }

    fn key_type(&self) -> &str {
        "EC"
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

impl fmt::Display for EcdsaJwsAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for EcdsaJwsAlgorithm {
    type Target = dyn JwsAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct EcdsaJwsSigner {
    algorithm: EcdsaJwsAlgorithm,
    private_key: EcKey<openssl::pkey::Private>,
    key_id: Option<String>,
}

impl JwsSigner for EcdsaJwsSigner {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn signature_len(&self) -> usize {
        self.algorithm.curve().coordinate_len() * 2
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        (|| -> anyhow::Result<Vec<u8>> {
            let md = self.algorithm.hash_algorithm().message_digest();
            let digest = hash(md, message)?;
            let sig = EcdsaSig::sign(&digest, &self.private_key)?;

            // fixed length r || s encoding
            let len = self.algorithm.curve().coordinate_len() as i32;
            let mut out = sig.r().to_vec_padded(len)?;
            out.extend_from_slice(&sig.s().to_vec_padded(len)?);
            Ok(out)
        })()
        .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JwsSigner> {
        Box::new(self.clone())
    }
}

impl Deref for EcdsaJwsSigner {
    type Target = dyn JwsSigner;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct EcdsaJwsVerifier {
    algorithm: EcdsaJwsAlgorithm,
    public_key: EcKey<openssl::pkey::Public>,
    key_id: Option<String>,
}

impl JwsVerifier for EcdsaJwsVerifier {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            let len = self.algorithm.curve().coordinate_len();
            if signature.len() != len * 2 {
                bail!("The signature length must be {}.", len * 2);
            }
            let r = BigNum::from_slice(&signature[..len])?;
            let s = BigNum::from_slice(&signature[len..])?;
            let sig = EcdsaSig::from_private_components(r, s)?;

            let md = self.algorithm.hash_algorithm().message_digest();
            let digest = hash(md, message)?;
            if !sig.verify(&digest, &self.public_key)? {
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

impl Deref for EcdsaJwsVerifier {
    type Target = dyn JwsVerifier;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::key_generator::generate_ec_key;

    #[test]
    fn test_sign_and_verify_ecdsa() -> anyhow::Result<()> {
        let input = b"abcde12345";

        for alg in &[
            EcdsaJwsAlgorithm::Es256,
            EcdsaJwsAlgorithm::Es384,
            EcdsaJwsAlgorithm::Es512,
        ] {
            let jwk = generate_ec_key(alg.curve())?;

            let signer = alg.signer_from_jwk(&jwk)?;
            let signature = signer.sign(input)?;
            assert_eq!(signature.len(), signer.signature_len());

            let public = jwk.to_public_key().unwrap();
            let verifier = alg.verifier_from_jwk(&public)?;
            verifier.verify(input, &signature)?;

            let mut bad = signature.clone();
            bad[0] ^= 0x01;
            assert!(verifier.verify(input, &bad).is_err());
        }

        Ok(())
    }

    #[test]
    fn test_ecdsa_curve_is_bound_to_algorithm() -> anyhow::Result<()> {
        let jwk = generate_ec_key(EcCurve::P384)?;
        assert!(EcdsaJwsAlgorithm::Es256.signer_from_jwk(&jwk).is_err());
        Ok(())
    }
}
