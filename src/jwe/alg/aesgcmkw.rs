use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::symm::{self, Cipher};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwe::{
    JweAlgorithm, JweContentEncryption, JweDecrypter, JweEncrypter, JweHeader, KeyManagementKind,
};
use crate::jwk::Jwk;
use crate::util;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AesgcmkwJweAlgorithm {
    /// Key wrapping with AES GCM using 128-bit key
    A128gcmkw,
    /// Key wrapping with AES GCM using 192-bit key
    A192gcmkw,
    /// Key wrapping with AES GCM using 256-bit key
    A256gcmkw,
}

impl AesgcmkwJweAlgorithm {
    pub fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<AesgcmkwJweEncrypter, JoseError> {
        (|| -> anyhow::Result<AesgcmkwJweEncrypter> {
            let k = self.private_key_from_jwk(jwk, "wrapKey")?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(AesgcmkwJweEncrypter {
                algorithm: *self,
                private_key: k,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    pub fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<AesgcmkwJweDecrypter, JoseError> {
        (|| -> anyhow::Result<AesgcmkwJweDecrypter> {
            let k = self.private_key_from_jwk(jwk, "unwrapKey")?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(AesgcmkwJweDecrypter {
                algorithm: *self,
                private_key: k,
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
            Some(val) if val == "enc" => {}
            None => {}
            Some(val) => bail!("A parameter use must be enc: {}", val),
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
        if k.len() != self.key_len() {
            bail!("The key size must be {}: {}", self.key_len(), k.len());
        }
        Ok(k)
    }

    fn key_len(&self) -> usize {
        match self {
            Self::A128gcmkw => 16,
            Self::A192gcmkw => 24,
            Self::A256gcmkw => 32,
        }
    }

    fn cipher(&self) -> Cipher {
        match self {
            Self::A128gcmkw => Cipher::aes_128_gcm(),
            Self::A192gcmkw => Cipher::aes_192_gcm(),
            Self::A256gcmkw => Cipher::aes_256_gcm(),
        }
    }
}

impl JweAlgorithm for AesgcmkwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::A128gcmkw => "A128GCMKW",
            Self::A192gcmkw => "A192GCMKW",
            Self::A256gcmkw => "A256GCMKW",
        }
    }

    fn key_type(&self) -> &str {
        "oct"
    }

    fn kind(&self) -> KeyManagementKind {
        KeyManagementKind::Encrypt
    }

    fn processed_parameters(&self) -> Vec<&str> {
        vec!["iv", "tag"]
    }

    fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JweEncrypter>, JoseError> {
        Ok(Box::new(self.encrypter_from_jwk(jwk)?))
    }

    fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JweDecrypter>, JoseError> {
        Ok(Box::new(self.decrypter_from_jwk(jwk)?))
    }

    fn box_clone(&self) -> Box<dyn JweAlgorithm> {
        Box::new(*self)
    }
}

impl fmt::Display for AesgcmkwJweAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for AesgcmkwJweAlgorithm {
    type Target = dyn JweAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct AesgcmkwJweEncrypter {
    algorithm: AesgcmkwJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweEncrypter for AesgcmkwJweEncrypter {
    fn algorithm(&self) -> &dyn JweAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn compute_content_encryption_key(
        &self,
        _cipher: &dyn JweContentEncryption,
        _header: &mut JweHeader,
    ) -> Result<Option<Cow<[u8]>>, JoseError> {
        Ok(None)
    }

    fn encrypt(
        &self,
        key: &[u8],
        _cipher: &dyn JweContentEncryption,
        header: &mut JweHeader,
    ) -> Result<Option<Vec<u8>>, JoseError> {
        (|| -> anyhow::Result<Option<Vec<u8>>> {
            let iv = util::random_bytes(12);
            let mut tag = vec![0; 16];
            let encrypted_key = symm::encrypt_aead(
                self.algorithm.cipher(),
                &self.private_key,
                Some(&iv),
                &[],
                key,
                &mut tag,
            )?;

            header.set_initialization_vector(&iv);
            header.set_authentication_tag(&tag);
            Ok(Some(encrypted_key))
        })()
        .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JweEncrypter> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for AesgcmkwJweEncrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AesgcmkwJweEncrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for AesgcmkwJweEncrypter {
    type Target = dyn JweEncrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct AesgcmkwJweDecrypter {
    algorithm: AesgcmkwJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweDecrypter for AesgcmkwJweDecrypter {
    fn algorithm(&self) -> &dyn JweAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn decrypt(
        &self,
        encrypted_key: Option<&[u8]>,
        cipher: &dyn JweContentEncryption,
        header: &JweHeader,
    ) -> Result<Cow<[u8]>, JoseError> {
        (|| -> anyhow::Result<Cow<[u8]>> {
            let encrypted_key = match encrypted_key {
                Some(val) => val,
                None => bail!("A encrypted_key value is required."),
            };
            let iv = match header.initialization_vector() {
                Some(val) => val,
                None => bail!("The iv header claim is required."),
            };
            let tag = match header.authentication_tag() {
                Some(val) => val,
                None => bail!("The tag header claim is required."),
            };

            let key = symm::decrypt_aead(
                self.algorithm.cipher(),
                &self.private_key,
                Some(&iv),
                &[],
                encrypted_key,
                &tag,
            )?;
            if key.len() != cipher.key_len() {
                bail!("The unwrapped key size must be {}.", cipher.key_len());
            }
            Ok(Cow::Owned(key))
        })()
        .map_err(|_| JoseError::DecryptionFailed)
    }

    fn box_clone(&self) -> Box<dyn JweDecrypter> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for AesgcmkwJweDecrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AesgcmkwJweDecrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for AesgcmkwJweDecrypter {
    type Target = dyn JweDecrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::enc::aesgcm::AesgcmJweEncryption;
    use crate::jwk::key_generator::generate_oct_key;
    use crate::util::random_bytes;

    #[test]
    fn test_wrap_and_unwrap_gcmkw() -> anyhow::Result<()> {
        let enc = AesgcmJweEncryption::A128gcm;

        for alg in &[
            AesgcmkwJweAlgorithm::A128gcmkw,
            AesgcmkwJweAlgorithm::A192gcmkw,
            AesgcmkwJweAlgorithm::A256gcmkw,
        ] {
            let jwk = generate_oct_key(alg.key_len())?;
            let cek = random_bytes(enc.key_len());

            let encrypter = alg.encrypter_from_jwk(&jwk)?;
            let mut header = JweHeader::new();
            let encrypted_key = encrypter.encrypt(&cek, &enc, &mut header)?.unwrap();

            assert!(header.initialization_vector().is_some());
            assert!(header.authentication_tag().is_some());

            let decrypter = alg.decrypter_from_jwk(&jwk)?;
            let recovered = decrypter.decrypt(Some(&encrypted_key), &enc, &header)?;
            assert_eq!(recovered.as_ref(), cek.as_slice());

            let mut bad = encrypted_key.clone();
            bad[0] ^= 0x01;
            assert!(decrypter.decrypt(Some(&bad), &enc, &header).is_err());
        }

        Ok(())
    }
}
