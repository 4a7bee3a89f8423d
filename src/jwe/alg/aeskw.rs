use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::aes::{self, AesKey};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwe::{
    JweAlgorithm, JweContentEncryption, JweDecrypter, JweEncrypter, JweHeader, KeyManagementKind,
};
use crate::jwk::Jwk;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AeskwJweAlgorithm {
    /// AES Key Wrap with 128-bit key
    A128kw,
    /// AES Key Wrap with 192-bit key
    A192kw,
    /// AES Key Wrap with 256-bit key
    A256kw,
}

impl AeskwJweAlgorithm {
    pub fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<AeskwJweEncrypter, JoseError> {
        (|| -> anyhow::Result<AeskwJweEncrypter> {
            let k = self.private_key_from_jwk(jwk, "wrapKey")?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(AeskwJweEncrypter {
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

    pub fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<AeskwJweDecrypter, JoseError> {
        (|| -> anyhow::Result<AeskwJweDecrypter> {
            let k = self.private_key_from_jwk(jwk, "unwrapKey")?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(AeskwJweDecrypter {
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
            Self::A128kw => 16,
            Self::A192kw => 24,
            Self::A256kw => 32,
        }
    }
}

pub(crate) fn wrap_key(kek: &[u8], key: &[u8]) -> anyhow::Result<Vec<u8>> {
    let aes = match AesKey::new_encrypt(kek) {
        Ok(val) => val,
        Err(_) => bail!("Failed to set a key wrapping key."),
    };
    let mut out = vec![0; key.len() + 8];
    match aes::wrap_key(&aes, None, &mut out, key) {
        Ok(len) => {
            if len < out.len() {
                out.truncate(len);
            }
        }
        Err(_) => bail!("Failed to wrap a key."),
    }
    Ok(out)
}

pub(crate) fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> anyhow::Result<Vec<u8>> {
    let aes = match AesKey::new_decrypt(kek) {
        Ok(val) => val,
        Err(_) => bail!("Failed to set a key unwrapping key."),
    };
    if wrapped.len() < 8 {
        bail!("The wrapped key is too short.");
    }
    let mut out = vec![0; wrapped.len() - 8];
    match aes::unwrap_key(&aes, None, &mut out, wrapped) {
        Ok(len) => {
            if len < out.len() {
                out.truncate(len);
            }
        }
        Err(_) => bail!("Failed to unwrap a key."),
    }
    Ok(out)
}

impl JweAlgorithm for AeskwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::A128kw => "A128KW",
            Self::A192kw => "A192KW",
            Self::A256kw => "A256KW",
        }
    }

    fn key_type(&self) -> &str {
        "oct"
    }

    fn kind(&self) -> KeyManagementKind {
        KeyManagementKind::Wrap
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

impl fmt::Display for AeskwJweAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for AeskwJweAlgorithm {
    type Target = dyn JweAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct AeskwJweEncrypter {
    algorithm: AeskwJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweEncrypter for AeskwJweEncrypter {
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
        _header: &mut JweHeader,
    ) -> Result<Option<Vec<u8>>, JoseError> {
        (|| -> anyhow::Result<Option<Vec<u8>>> {
            let encrypted_key = wrap_key(&self.private_key, key)?;
            Ok(Some(encrypted_key))
        })()
        .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JweEncrypter> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for AeskwJweEncrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AeskwJweEncrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for AeskwJweEncrypter {
    type Target = dyn JweEncrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct AeskwJweDecrypter {
    algorithm: AeskwJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweDecrypter for AeskwJweDecrypter {
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
            let encrypted_key = match encrypted_key {
                Some(val) => val,
                None => bail!("A encrypted_key value is required."),
            };
            let key = unwrap_key(&self.private_key, encrypted_key)?;
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

impl fmt::Debug for AeskwJweDecrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AeskwJweDecrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for AeskwJweDecrypter {
    type Target = dyn JweDecrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::enc::aescbc_hmac::AescbcHmacJweEncryption;
    use crate::jwk::key_generator::generate_oct_key;
    use crate::util::random_bytes;

    #[test]
    fn test_wrap_and_unwrap() -> anyhow::Result<()> {
        let enc = AescbcHmacJweEncryption::A128cbcHs256;

        for alg in &[
            AeskwJweAlgorithm::A128kw,
            AeskwJweAlgorithm::A192kw,
            AeskwJweAlgorithm::A256kw,
        ] {
            let jwk = generate_oct_key(alg.key_len())?;
            let cek = random_bytes(enc.key_len());

            let encrypter = alg.encrypter_from_jwk(&jwk)?;
            let mut header = JweHeader::new();
            assert!(encrypter
                .compute_content_encryption_key(&enc, &mut header)?
                .is_none());
            let encrypted_key = encrypter.encrypt(&cek, &enc, &mut header)?.unwrap();
            assert_eq!(encrypted_key.len(), cek.len() + 8);

            let decrypter = alg.decrypter_from_jwk(&jwk)?;
            let recovered = decrypter.decrypt(Some(&encrypted_key), &enc, &header)?;
            assert_eq!(recovered.as_ref(), cek.as_slice());

            let mut bad = encrypted_key.clone();
            bad[0] ^= 0x01;
            assert!(decrypter.decrypt(Some(&bad), &enc, &header).is_err());
        }

        Ok(())
    }

    #[test]
    fn test_aeskw_key_size_is_checked() -> anyhow::Result<()> {
        let jwk = generate_oct_key(16)?;
        assert!(AeskwJweAlgorithm::A256kw.encrypter_from_jwk(&jwk).is_err());
        Ok(())
    }
}
