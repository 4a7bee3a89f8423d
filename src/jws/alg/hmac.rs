use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwk::Jwk;
use crate::jws::{JwsAlgorithm, JwsSigner, JwsVerifier};
use crate::util::{self, HashAlgorithm};
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum HmacJwsAlgorithm {
    /// HMAC using SHA-256
    Hs256,
    /// HMAC using SHA-384
    Hs384,
    /// HMAC using SHA-512
    Hs512,
}

impl HmacJwsAlgorithm {
    pub fn signer_from_jwk(&self, jwk: &Jwk) -> Result<HmacJwsSigner, JoseError> {
        (|| -> anyhow::Result<HmacJwsSigner> {
            let k = self.private_key_from_jwk(jwk, "sign")?;
            let private_key = PKey::hmac(&k)?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(HmacJwsSigner {
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

    pub fn verifier_from_jwk(&self, jwk: &Jwk) -> Result<HmacJwsVerifier, JoseError> {
        (|| -> anyhow::Result<HmacJwsVerifier> {
            let k = self.private_key_from_jwk(jwk, "verify")?;
            let private_key = PKey::hmac(&k)?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(HmacJwsVerifier {
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

    fn private_key_from_jwk(
        &self,
        jwk: &Jwk,
        key_operation: &str,
    ) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        match jwk.key_type() {
            val if val == "oct" => {}
            val => bail!("A parameter kty must be oct: {}", val),
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
        let k = match jwk.parameter("k") {
            Some(Value::String(val)) => {
                Zeroizing::new(base64::decode_config(val, base64::URL_SAFE_NO_PAD)?)
            }
            Some(_) => bail!("A parameter k must be a string."),
            None => bail!("A parameter k is required."),
        };
        if k.len() < self.hash_algorithm().output_len() {
            bail!(
                "The key size must be {} or more.",
                self.hash_algorithm().output_len()
            );
        }
        Ok(k)
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Hs256 => HashAlgorithm::Sha256,
            Self::Hs384 => HashAlgorithm::Sha384,
            Self::Hs512 => HashAlgorithm::Sha512,
        }
    }
}

impl JwsAlgorithm for HmacJwsAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }

    fn key_type(&self) -> &str {
        "oct"
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

impl fmt::Display for HmacJwsAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for HmacJwsAlgorithm {
    type Target = dyn JwsAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct HmacJwsSigner {
    algorithm: HmacJwsAlgorithm,
    private_key: PKey<Private>,
    key_id: Option<String>,
}

impl HmacJwsSigner {
    fn compute_mac(&self, message: &[u8]) -> anyhow::Result<Vec<u8>> {
        let md = self.algorithm.hash_algorithm().message_digest();
        let mut signer = Signer::new(md, &self.private_key)?;
        signer.update(message)?;
        Ok(signer.sign_to_vec()?)
    }
}

impl JwsSigner for HmacJwsSigner {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn signature_len(&self) -> usize {
        self.algorithm.hash_algorithm().output_len()
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        self.compute_mac(message)
            .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JwsSigner> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for HmacJwsSigner {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("HmacJwsSigner")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for HmacJwsSigner {
    type Target = dyn JwsSigner;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct HmacJwsVerifier {
    algorithm: HmacJwsAlgorithm,
    private_key: PKey<Private>,
    key_id: Option<String>,
}

impl JwsVerifier for HmacJwsVerifier {
    fn algorithm(&self) -> &dyn JwsAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            let md = self.algorithm.hash_algorithm().message_digest();
            let mut signer = Signer::new(md, &self.private_key)?;
            signer.update(message)?;
            let mac = signer.sign_to_vec()?;
            if !util::constant_time_eq(&mac, signature) {
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

impl fmt::Debug for HmacJwsVerifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("HmacJwsVerifier")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for HmacJwsVerifier {
    type Target = dyn JwsVerifier;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::key_generator::generate_oct_key;

    #[test]
    fn test_sign_and_verify_hmac() -> anyhow::Result<()> {
        let input = b"abcde12345";

        for alg in &[
            HmacJwsAlgorithm::Hs256,
            HmacJwsAlgorithm::Hs384,
            HmacJwsAlgorithm::Hs512,
        ] {
            let jwk = generate_oct_key(64)?;

            let signer = alg.signer_from_jwk(&jwk)?;
            let signature = signer.sign(input)?;
            assert_eq!(signature.len(), signer.signature_len());

            let verifier = alg.verifier_from_jwk(&jwk)?;
            verifier.verify(input, &signature)?;

            let mut bad = signature.clone();
            bad[0] ^= 0x01;
            assert!(verifier.verify(input, &bad).is_err());
            assert!(verifier.verify(b"other", &signature).is_err());
        }

        Ok(())
    }

    #[test]
    fn test_hmac_rejects_short_key() -> anyhow::Result<()> {
        let jwk = generate_oct_key(16)?;
        assert!(HmacJwsAlgorithm::Hs256.signer_from_jwk(&jwk).is_err());
        Ok(())
    }

    #[test]
    fn test_hmac_rejects_wrong_kty() -> anyhow::Result<()> {
        let jwk = Jwk::new("RSA");
        assert!(HmacJwsAlgorithm::Hs256.signer_from_jwk(&jwk).is_err());
        Ok(())
    }
}
