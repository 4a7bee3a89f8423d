use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwe::{
    JweAlgorithm, JweContentEncryption, JweDecrypter, JweEncrypter, JweHeader, KeyManagementKind,
};
use crate::jwk::Jwk;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum DirectJweAlgorithm {
    /// Direct use of a shared symmetric key as the CEK
    Dir,
}

impl DirectJweAlgorithm {
    pub fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<DirectJweEncrypter, JoseError> {
        (|| -> anyhow::Result<DirectJweEncrypter> {
            let k = self.private_key_from_jwk(jwk)?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(DirectJweEncrypter {
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

    pub fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<DirectJweDecrypter, JoseError> {
        (|| -> anyhow::Result<DirectJweDecrypter> {
            let k = self.private_key_from_jwk(jwk)?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(DirectJweDecrypter {
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

    fn private_key_from_jwk(&self, jwk: &Jwk) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        match jwk.key_type() {
            val if val == "oct" => {}
            val => bail!("A parameter kty must be oct: {}", val),
        }
        match jwk.key_use() {
            Some(val) if val == "enc" => {}
            None => {}
            Some(val) => bail!("A parameter use must be enc: {}", val),
        }
        if !jwk.is_for_key_operation("deriveKey") {
            bail!("A parameter key_ops must contains deriveKey.");
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
        if k.is_empty() {
            bail!("The key size must not be empty.");
        }
        Ok(k)
    }
}

impl JweAlgorithm for DirectJweAlgorithm {
    fn name(&self) -> &str {
        "dir"
    }

    fn key_type(&self) -> &str {
        "oct"
    }

    fn kind(&self) -> KeyManagementKind {
        KeyManagementKind::Direct
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

impl fmt::Display for DirectJweAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for DirectJweAlgorithm {
    type Target = dyn JweAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct DirectJweEncrypter {
    algorithm: DirectJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweEncrypter for DirectJweEncrypter {
    fn algorithm(&self) -> &dyn JweAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn compute_content_encryption_key(
        &self,
        cipher: &dyn JweContentEncryption,
        _header: &mut JweHeader,
    ) -> Result<Option<Cow<[u8]>>, JoseError> {
        (|| -> anyhow::Result<Option<Cow<[u8]>>> {
            if self.private_key.len() != cipher.key_len() {
                bail!(
                    "The key size must be {}: {}",
                    cipher.key_len(),
                    self.private_key.len()
                );
            }
            Ok(Some(Cow::Borrowed(self.private_key.as_slice())))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn encrypt(
        &self,
        _key: &[u8],
        _cipher: &dyn JweContentEncryption,
        _header: &mut JweHeader,
    ) -> Result<Option<Vec<u8>>, JoseError> {
        Ok(None)
    }

    fn box_clone(&self) -> Box<dyn JweEncrypter> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for DirectJweEncrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("DirectJweEncrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for DirectJweEncrypter {
    type Target = dyn JweEncrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct DirectJweDecrypter {
    algorithm: DirectJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweDecrypter for DirectJweDecrypter {
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
        _header: &JweHeader,
    ) -> Result<Cow<[u8]>, JoseError> {
        (|| -> anyhow::Result<Cow<[u8]>> {
            match encrypted_key {
                None => {}
                Some(val) if val.is_empty() => {}
                Some(_) => bail!("The dir algorithm encrypted key must be empty."),
            }
            if self.private_key.len() != cipher.key_len() {
                bail!(
                    "The key size must be {}: {}",
                    cipher.key_len(),
                    self.private_key.len()
                );
            }
            Ok(Cow::Borrowed(self.private_key.as_slice()))
        })()
        .map_err(|_| JoseError::DecryptionFailed)
    }

    fn box_clone(&self) -> Box<dyn JweDecrypter> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for DirectJweDecrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("DirectJweDecrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for DirectJweDecrypter {
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

    #[test]
    fn test_direct_key_is_the_cek() -> anyhow::Result<()> {
        let enc = AesgcmJweEncryption::A256gcm;
        let jwk = generate_oct_key(32)?;

        let encrypter = DirectJweAlgorithm::Dir.encrypter_from_jwk(&jwk)?;
        let mut header = JweHeader::new();
        let cek = encrypter
            .compute_content_encryption_key(&enc, &mut header)?
            .unwrap();
        assert_eq!(cek.len(), 32);
        assert_eq!(encrypter.encrypt(&cek, &enc, &mut header)?, None);

        let decrypter = DirectJweAlgorithm::Dir.decrypter_from_jwk(&jwk)?;
        let recovered = decrypter.decrypt(None, &enc, &header)?;
        assert_eq!(cek, recovered);
        Ok(())
    }

    #[test]
    fn test_direct_rejects_wrong_key_size() -> anyhow::Result<()> {
        let enc = AesgcmJweEncryption::A256gcm;
        let jwk = generate_oct_key(16)?;
        let encrypter = DirectJweAlgorithm::Dir.encrypter_from_jwk(&jwk)?;
        let mut header = JweHeader::new();
        assert!(encrypter
            .compute_content_encryption_key(&enc, &mut header)
            .is_err());
        Ok(())
    }
}
