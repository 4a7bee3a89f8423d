use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::bn::BigNum;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwk::Jwk;
use crate::jws::{JwsAlgorithm, JwsSigner, JwsVerifier};
use crate::util::HashAlgorithm;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum RsassaJwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    Rs256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    Rs384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    Rs512,
}

impl RsassaJwsAlgorithm {
    /// Return a signer from a private key that is formatted by a JWK of
    /// RSA type.
    pub fn signer_from_jwk(&self, jwk: &Jwk) -> Result<RsassaJwsSigner, JoseError> {
        (|| -> anyhow::Result<RsassaJwsSigner> {
            self.check_jwk(jwk, "sign")?;

            let private_key = rsa_private_key_from_jwk(jwk)?;
            self.check_key_size(private_key.rsa()?.size())?;
            let signature_len = private_key.rsa()?.size() as usize;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(RsassaJwsSigner {
                algorithm: *self,
                private_key,
                signature_len,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    /// Return a verifier from a public key that is formatted by a JWK of
    /// RSA type.
    pub fn verifier_from_jwk(&self, jwk: &Jwk) -> Result<RsassaJwsVerifier, JoseError> {
        (|| -> anyhow::Result<RsassaJwsVerifier> {
            self.check_jwk(jwk, "verify")?;

            let public_key = rsa_public_key_from_jwk(jwk)?;
            self.check_key_size(public_key.rsa()?.size())?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(RsassaJwsVerifier {
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

    fn check_jwk(&self, jwk: &Jwk, key_operation: &str) -> anyhow::Result<()> {
        match jwk.key_type() {
            val if val == "RSA" => {}
            val => bail!("A parameter kty must be RSA: {}", val),
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
        Ok(())
    }

    fn check_key_size(&self, size: u32) -> anyhow::Result<()> {
        if size * 8 < 2048 {
            bail!("key length must be 2048 or more.");
        }
        Ok(())
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Rs256 => HashAlgorithm::Sha256,
            Self::Rs384 => HashAlgorithm::Sha384,
            Self::Rs512 => HashAlgorithm::Sha512,
        }
    }
}

pub(crate) fn decode_parameter(jwk: &Jwk, key: &str) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    match jwk.parameter(key) {
        Some(Value::String(val)) => Ok(Zeroizing::new(base64::decode_config(
            val,
            base64::URL_SAFE_NO_PAD,
        )?)),
        Some(_) => bail!("A parameter {} must be a string.", key),
        None => bail!("A parameter {} is required.", key),
    }
}

pub(crate) fn rsa_private_key_from_jwk(jwk: &Jwk) -> anyhow::Result<PKey<Private>> {
    let n = decode_parameter(jwk, "n")?;
    let e = decode_parameter(jwk, "e")?;
    let d = decode_parameter(jwk, "d")?;
    let p = decode_parameter(jwk, "p")?;
    let q = decode_parameter(jwk, "q")?;
    let dp = decode_parameter(jwk, "dp")?;
    let dq = decode_parameter(jwk, "dq")?;
    let qi = decode_parameter(jwk, "qi")?;

    let rsa = Rsa::from_private_components(
        BigNum::from_slice(&n)?,
        BigNum::from_slice(&e)?,
        BigNum::from_slice(&d)?,
        BigNum::from_slice(&p)?,
        BigNum::from_slice(&q)?,
        BigNum::from_slice(&dp)?,
        BigNum::from_slice(&dq)?,
        BigNum::from_slice(&qi)?,
    )?;
    Ok(PKey::from_rsa(rsa)?)
}

pub(crate) fn rsa_public_key_from_jwk(jwk: &Jwk) -> anyhow::Result<PKey<Public>> {
    let n = decode_parameter(jwk, "n")?;
    let e = decode_parameter(jwk, "e")?;

    let rsa = Rsa::from_public_components(BigNum::from_slice(&n)?, BigNum::from_slice(&e)?)?;
    Ok(PKey::from_rsa(rsa)?)
}

impl JwsAlgorithm for RsassaJwsAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
        }
    }

    fn key_type(&self) -> &str {
        "RSA"
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

impl fmt::Display for RsassaJwsAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for RsassaJwsAlgorithm {
    type Target = dyn JwsAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct RsassaJwsSigner {
    algorithm: RsassaJwsAlgorithm,
    private_key: PKey<Private>,
    signature_len: usize,
    key_id: Option<String>,
}

impl JwsSigner for RsassaJwsSigner {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn signature_len(&self) -> usize {
        self.signature_len
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        (|| -> anyhow::Result<Vec<u8>> {
            let md = self.algorithm.hash_algorithm().message_digest();
            let mut signer = Signer::new(md, &self.private_key)?;
            signer.update(message)?;
            Ok(signer.sign_to_vec()?)
        })()
        .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JwsSigner> {
        Box::new(self.clone())
    }
}

impl Deref for RsassaJwsSigner {
    type Target = dyn JwsSigner;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct RsassaJwsVerifier {
    algorithm: RsassaJwsAlgorithm,
    public_key: PKey<Public>,
    key_id: Option<String>,
}

impl JwsVerifier for RsassaJwsVerifier {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            let md = self.algorithm.hash_algorithm().message_digest();
            let mut verifier = Verifier::new(md, &self.public_key)?;
            verifier.update(message)?;
            if !verifier.verify(signature)? {
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

impl Deref for RsassaJwsVerifier {
    type Target = dyn JwsVerifier;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::key_generator::generate_rsa_key;

    #[test]
    fn test_sign_and_verify_rsassa() -> anyhow::Result<()> {
        let input = b"abcde12345";
        let jwk = generate_rsa_key(2048)?;

        for alg in &[
            RsassaJwsAlgorithm::Rs256,
            RsassaJwsAlgorithm::Rs384,
            RsassaJwsAlgorithm::Rs512,
        ] {
            let signer = alg.signer_from_jwk(&jwk)?;
            let signature = signer.sign(input)?;
            assert_eq!(signature.len(), signer.signature_len());

            let public = jwk.to_public_key().unwrap();
            let verifier = alg.verifier_from_jwk(&public)?;
            verifier.verify(input, &signature)?;

            let mut bad = signature.clone();
            bad[10] ^= 0x01;
            assert!(verifier.verify(input, &bad).is_err());
        }

        Ok(())
    }

    #[test]
    fn test_rsassa_rejects_wrong_use() -> anyhow::Result<()> {
        let mut jwk = generate_rsa_key(2048)?;
        jwk.set_key_use("enc");
        assert!(RsassaJwsAlgorithm::Rs256.signer_from_jwk(&jwk).is_err());
        Ok(())
    }
}
