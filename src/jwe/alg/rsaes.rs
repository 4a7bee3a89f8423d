use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::encrypt::{Decrypter, Encrypter};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Padding;

use crate::jwe::{
    JweAlgorithm, JweContentEncryption, JweDecrypter, JweEncrypter, JweHeader, KeyManagementKind,
};
use crate::jwk::Jwk;
use crate::jws::alg::rsassa::{rsa_private_key_from_jwk, rsa_public_key_from_jwk};
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum RsaesJweAlgorithm {
    /// RSAES-PKCS1-v1_5
    Rsa1_5,
    /// RSAES OAEP using default parameters
    RsaOaep,
    /// RSAES OAEP using SHA-256 and MGF1 with SHA-256
    RsaOaep256,
    /// RSAES OAEP using SHA-384 and MGF1 with SHA-384
    RsaOaep384,
    /// RSAES OAEP using SHA-512 and MGF1 with SHA-512
    RsaOaep512,
}

impl RsaesJweAlgorithm {
    pub fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<RsaesJweEncrypter, JoseError> {
        (|| -> anyhow::Result<RsaesJweEncrypter> {
            self.check_jwk(jwk, "wrapKey")?;

            let public_key = rsa_public_key_from_jwk(jwk)?;
            self.check_key_size(public_key.rsa()?.size())?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(RsaesJweEncrypter {
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

    pub fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<RsaesJweDecrypter, JoseError> {
        (|| -> anyhow::Result<RsaesJweDecrypter> {
            self.check_jwk(jwk, "unwrapKey")?;

            let private_key = rsa_private_key_from_jwk(jwk)?;
            self.check_key_size(private_key.rsa()?.size())?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(RsaesJweDecrypter {
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

    fn check_jwk(&self, jwk: &Jwk, key_operation: &str) -> anyhow::Result<()> {
        match jwk.key_type() {
            val if val == "RSA" => {}
            val => bail!("A parameter kty must be RSA: {}", val),
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
        Ok(())
    }

    fn check_key_size(&self, size: u32) -> anyhow::Result<()> {
        if size * 8 < 2048 {
            bail!("key length must be 2048 or more.");
        }
        Ok(())
    }

    fn oaep_md(&self) -> Option<MessageDigest> {
        match self {
            Self::Rsa1_5 => None,
            Self::RsaOaep => Some(MessageDigest::sha1()),
            Self::RsaOaep256 => Some(MessageDigest::sha256()),
            Self::RsaOaep384 => Some(MessageDigest::sha384()),
            Self::RsaOaep512 => Some(MessageDigest::sha512()),
        }
    }
}

impl JweAlgorithm for RsaesJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::Rsa1_5 => "RSA1_5",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep384 => "RSA-OAEP-384",
            Self::RsaOaep512 => "RSA-OAEP-512",
        }
    }

    fn key_type(&self) -> &str {
        "RSA"
    }

    fn kind(&self) -> KeyManagementKind {
        KeyManagementKind::Encrypt
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

impl fmt::Display for RsaesJweAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for RsaesJweAlgorithm {
    type Target = dyn JweAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct RsaesJweEncrypter {
    algorithm: RsaesJweAlgorithm,
    public_key: PKey<Public>,
    key_id: Option<String>,
}

impl JweEncrypter for RsaesJweEncrypter {
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
            let mut encrypter = Encrypter::new(&self.public_key)?;
            match self.algorithm.oaep_md() {
                Some(md) => {
                    encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
                    encrypter.set_rsa_oaep_md(md)?;
                    encrypter.set_rsa_mgf1_md(md)?;
                }
                None => {
                    encrypter.set_rsa_padding(Padding::PKCS1)?;
                }
            }

            let mut encrypted_key = vec![0; encrypter.encrypt_len(key)?];
            let len = encrypter.encrypt(key, &mut encrypted_key)?;
            encrypted_key.truncate(len);
            Ok(Some(encrypted_key))
        })()
        .map_err(JoseError::InvalidKeyFormat)
    }

    fn box_clone(&self) -> Box<dyn JweEncrypter> {
        Box::new(self.clone())
    }
}

impl Deref for RsaesJweEncrypter {
    type Target = dyn JweEncrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct RsaesJweDecrypter {
    algorithm: RsaesJweAlgorithm,
    private_key: PKey<Private>,
    key_id: Option<String>,
}

impl JweDecrypter for RsaesJweDecrypter {
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

            let mut decrypter = Decrypter::new(&self.private_key)?;
            match self.algorithm.oaep_md() {
                Some(md) => {
                    decrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
                    decrypter.set_rsa_oaep_md(md)?;
                    decrypter.set_rsa_mgf1_md(md)?;
                }
                None => {
                    decrypter.set_rsa_padding(Padding::PKCS1)?;
                }
            }

            let mut key = vec![0; decrypter.decrypt_len(encrypted_key)?];
            let len = decrypter.decrypt(encrypted_key, &mut key)?;
            key.truncate(len);

            if key.len() != cipher.key_len() {
                bail!("The decrypted key size must be {}.", cipher.key_len());
            }
            Ok(Cow::Owned(key))
        })()
        .map_err(|_| JoseError::DecryptionFailed)
    }

    fn box_clone(&self) -> Box<dyn JweDecrypter> {
        Box::new(self.clone())
    }
}

impl Deref for RsaesJweDecrypter {
    type Target = dyn JweDecrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::enc::aescbc_hmac::AescbcHmacJweEncryption;
    use crate::jwk::key_generator::generate_rsa_key;
    use crate::util::random_bytes;

    #[test]
    fn test_encrypt_and_decrypt_rsaes() -> anyhow::Result<()> {
        let enc = AescbcHmacJweEncryption::A128cbcHs256;
        let jwk = generate_rsa_key(2048)?;

        for alg in &[
            RsaesJweAlgorithm::Rsa1_5,
            RsaesJweAlgorithm::RsaOaep,
            RsaesJweAlgorithm::RsaOaep256,
            RsaesJweAlgorithm::RsaOaep384,
            RsaesJweAlgorithm::RsaOaep512,
        ] {
            let cek = random_bytes(enc.key_len());
            let mut header = JweHeader::new();

            let public = jwk.to_public_key().unwrap();
            let encrypter = alg.encrypter_from_jwk(&public)?;
            let encrypted_key = encrypter.encrypt(&cek, &enc, &mut header)?.unwrap();
            assert_eq!(encrypted_key.len(), 256);

            let decrypter = alg.decrypter_from_jwk(&jwk)?;
            let recovered = decrypter.decrypt(Some(&encrypted_key), &enc, &header)?;
            assert_eq!(recovered.as_ref(), cek.as_slice());
        }

        Ok(())
    }
}
