use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::pkcs5;
use serde_json::{Number, Value};
use zeroize::Zeroizing;

use crate::jwe::alg::aeskw::{unwrap_key, wrap_key};
use crate::jwe::{
    JweAlgorithm, JweContentEncryption, JweDecrypter, JweEncrypter, JweHeader, KeyManagementKind,
};
use crate::jwk::Jwk;
use crate::util::{self, HashAlgorithm};
use crate::{JoseError, JoseHeader};

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Pbes2HmacAeskwJweAlgorithm {
    /// PBES2 with HMAC SHA-256 and "A128KW" wrapping
    Pbes2Hs256A128kw,
    /// PBES2 with HMAC SHA-384 and "A192KW" wrapping
    Pbes2Hs384A192kw,
    /// PBES2 with HMAC SHA-512 and "A256KW" wrapping
    Pbes2Hs512A256kw,
}

impl Pbes2HmacAeskwJweAlgorithm {
    pub fn encrypter_from_jwk(
        &self,
        jwk: &Jwk,
    ) -> Result<Pbes2HmacAeskwJweEncrypter, JoseError> {
        (|| -> anyhow::Result<Pbes2HmacAeskwJweEncrypter> {
            let password = self.private_key_from_jwk(jwk, "deriveKey")?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(Pbes2HmacAeskwJweEncrypter {
                algorithm: *self,
                private_key: password,
                salt_len: 8,
                iter_count: 1000,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    pub fn decrypter_from_jwk(
        &self,
        jwk: &Jwk,
    ) -> Result<Pbes2HmacAeskwJweDecrypter, JoseError> {
        (|| -> anyhow::Result<Pbes2HmacAeskwJweDecrypter> {
            let password = self.private_key_from_jwk(jwk, "deriveKey")?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(Pbes2HmacAeskwJweDecrypter {
                algorithm: *self,
                private_key: password,
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
            Some(val) => bail!("A parameter k must be string type but {:?}", val),
            None => bail!("A parameter k is required."),
        };
        if k.is_empty() {
            bail!("The key size must not be empty.");
        }
        Ok(k)
    }

    /// Derive the key wrapping key: PBKDF2 with salt `utf8(alg) || 0x00 ||
    /// p2s` and iteration count p2c.
    fn derive_key(
        &self,
        password: &[u8],
        p2s: &[u8],
        p2c: usize,
    ) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        let mut salt = Vec::with_capacity(self.name().len() + 1 + p2s.len());
        salt.extend_from_slice(self.name().as_bytes());
        salt.push(0);
        salt.extend_from_slice(p2s);

        let md = self.hash_algorithm().message_digest();
        let mut derived_key = Zeroizing::new(vec![0; self.derived_key_len()]);
        pkcs5::pbkdf2_hmac(password, &salt, p2c, md, &mut derived_key)?;
        Ok(derived_key)
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Pbes2Hs256A128kw => HashAlgorithm::Sha256,
            Self::Pbes2Hs384A192kw => HashAlgorithm::Sha384,
            Self::Pbes2Hs512A256kw => HashAlgorithm::Sha512,
        }
    }

    fn derived_key_len(&self) -> usize {
        match self {
            Self::Pbes2Hs256A128kw => 16,
            Self::Pbes2Hs384A192kw => 24,
            Self::Pbes2Hs512A256kw => 32,
        }
    }
}

impl JweAlgorithm for Pbes2HmacAeskwJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Pbes2Hs256A128kw => "PBES2-HS256+A128KW",
            Self::Pbes2Hs384A192kw => "PBES2-HS384+A192KW",
            Self::Pbes2Hs512A256kw => "PBES2-HS512+A256KW",
        }
    }

    fn key_type(&self) -> &str {
        "oct"
    }

    fn kind(&self) -> KeyManagementKind {
        KeyManagementKind::Encrypt
    }

    fn processed_parameters(&self) -> Vec<&str> {
        vec!["p2s", "p2c"]
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

impl fmt::Display for Pbes2HmacAeskwJweAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for Pbes2HmacAeskwJweAlgorithm {
    type Target = dyn JweAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct Pbes2HmacAeskwJweEncrypter {
    algorithm: Pbes2HmacAeskwJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    salt_len: usize,
    iter_count: usize,
    key_id: Option<String>,
}

impl Pbes2HmacAeskwJweEncrypter {
    pub fn set_salt_len(&mut self, salt_len: usize) {
        if salt_len < 8 {
            panic!("salt_len must be 8 or more: {}", salt_len);
        }
        self.salt_len = salt_len;
    }

    pub fn set_iter_count(&mut self, iter_count: usize) {
        if iter_count < 1000 {
            panic!("iter_count must be 1000 or more: {}", iter_count);
        }
        self.iter_count = iter_count;
    }
}

impl JweEncrypter for Pbes2HmacAeskwJweEncrypter {
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
            let p2s = match header.claim("p2s") {
                Some(Value::String(val)) => {
                    let p2s = base64::decode_config(val, base64::URL_SAFE_NO_PAD)?;
                    if p2s.len() < 8 {
                        bail!("The decoded value of p2s header claim must be 8 or more.");
                    }
                    p2s
                }
                Some(_) => bail!("The p2s header claim must be string."),
                None => {
                    let p2s = util::random_bytes(self.salt_len);
                    header.set_pbes2_salt_input(&p2s);
                    p2s
                }
            };
            let p2c = match header.claim("p2c") {
                Some(Value::Number(val)) => match val.as_u64() {
                    Some(val) => usize::try_from(val)?,
                    None => bail!("Overflow u64 value: {}", val),
                },
                Some(_) => bail!("The p2c header claim must be a number."),
                None => {
                    let p2c = self.iter_count;
                    header.set_claim("p2c", Some(Value::Number(Number::from(p2c))))?;
                    p2c
                }
            };

            let derived_key = self.algorithm.derive_key(&self.private_key, &p2s, p2c)?;
            let encrypted_key = wrap_key(&derived_key, key)?;
            Ok(Some(encrypted_key))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn box_clone(&self) -> Box<dyn JweEncrypter> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for Pbes2HmacAeskwJweEncrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pbes2HmacAeskwJweEncrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for Pbes2HmacAeskwJweEncrypter {
    type Target = dyn JweEncrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Clone)]
pub struct Pbes2HmacAeskwJweDecrypter {
    algorithm: Pbes2HmacAeskwJweAlgorithm,
    private_key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
}

impl JweDecrypter for Pbes2HmacAeskwJweDecrypter {
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

            let p2s = match header.claim("p2s") {
                Some(Value::String(val)) => {
                    let p2s = base64::decode_config(val, base64::URL_SAFE_NO_PAD)?;
                    if p2s.len() < 8 {
                        bail!("The decoded value of p2s header claim must be 8 or more.");
                    }
                    p2s
                }
                Some(_) => bail!("The p2s header claim must be string."),
                None => bail!("The p2s header claim is required."),
            };
            let p2c = match header.claim("p2c") {
                Some(Value::Number(val)) => match val.as_u64() {
                    Some(val) => usize::try_from(val)?,
                    None => bail!("Overflow u64 value: {}", val),
                },
                Some(_) => bail!("The p2c header claim must be a number."),
                None => bail!("The p2c header claim is required."),
            };

            let derived_key = self.algorithm.derive_key(&self.private_key, &p2s, p2c)?;
            let key = unwrap_key(&derived_key, encrypted_key)?;
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

impl fmt::Debug for Pbes2HmacAeskwJweDecrypter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pbes2HmacAeskwJweDecrypter")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl Deref for Pbes2HmacAeskwJweDecrypter {
    type Target = dyn JweDecrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::enc::aescbc_hmac::AescbcHmacJweEncryption;
    use crate::util::random_bytes;
    use serde_json::json;

    #[test]
    fn test_encrypt_and_decrypt_pbes2_hmac() -> anyhow::Result<()> {
        let enc = AescbcHmacJweEncryption::A128cbcHs256;

        for alg in &[
            Pbes2HmacAeskwJweAlgorithm::Pbes2Hs256A128kw,
            Pbes2HmacAeskwJweAlgorithm::Pbes2Hs384A192kw,
            Pbes2HmacAeskwJweAlgorithm::Pbes2Hs512A256kw,
        ] {
            let mut header = JweHeader::new();
            header.set_content_encryption(enc.name());

            let jwk = {
                let key = random_bytes(8);
                let key = base64::encode_config(&key, base64::URL_SAFE_NO_PAD);

                let mut jwk = Jwk::new("oct");
                jwk.set_key_use("enc");
                jwk.set_parameter("k", Some(json!(key)))?;
                jwk
            };

            let cek = random_bytes(enc.key_len());

            let encrypter = alg.encrypter_from_jwk(&jwk)?;
            let encrypted_key = encrypter.encrypt(&cek, &enc, &mut header)?.unwrap();

            assert!(header.claim("p2s").is_some());
            assert!(header.claim("p2c").is_some());

            let decrypter = alg.decrypter_from_jwk(&jwk)?;
            let recovered = decrypter.decrypt(Some(&encrypted_key), &enc, &header)?;
            assert_eq!(recovered.as_ref(), cek.as_slice());
        }

        Ok(())
    }

    #[test]
    fn test_pbes2_decrypt_requires_salt_claims() -> anyhow::Result<()> {
        let enc = AescbcHmacJweEncryption::A128cbcHs256;
        let mut jwk = Jwk::new("oct");
        jwk.set_parameter(
            "k",
            Some(json!(base64::encode_config(
                b"password",
                base64::URL_SAFE_NO_PAD
            ))),
        )?;
        let decrypter =
            Pbes2HmacAeskwJweAlgorithm::Pbes2Hs256A128kw.decrypter_from_jwk(&jwk)?;
        let header = JweHeader::new();
        assert!(decrypter.decrypt(Some(&[0; 24]), &enc, &header).is_err());
        Ok(())
    }
}
