use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use openssl::symm::{self, Cipher};

use crate::jwe::JweContentEncryption;
use crate::util::{self, HashAlgorithm};
use crate::JoseError;

/// AES_CBC_HMAC_SHA2 composite encryption (RFC 7518 §5.2): AES-CBC with
/// PKCS#7 padding, authenticated MAC-then-encrypt style with an HMAC over
/// `AAD || IV || ciphertext || AL` truncated to its first half.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AescbcHmacJweEncryption {
    /// AES_128_CBC_HMAC_SHA_256
    A128cbcHs256,
    /// AES_192_CBC_HMAC_SHA_384
    A192cbcHs384,
    /// AES_256_CBC_HMAC_SHA_512
    A256cbcHs512,
}

impl AescbcHmacJweEncryption {
    fn cipher(&self) -> Cipher {
        match self {
            Self::A128cbcHs256 => Cipher::aes_128_cbc(),
            Self::A192cbcHs384 => Cipher::aes_192_cbc(),
            Self::A256cbcHs512 => Cipher::aes_256_cbc(),
        }
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::A128cbcHs256 => HashAlgorithm::Sha256,
            Self::A192cbcHs384 => HashAlgorithm::Sha384,
            Self::A256cbcHs512 => HashAlgorithm::Sha512,
        }
    }

    /// MAC key and tag length: half of the composite key.
    fn half_len(&self) -> usize {
        match self {
            Self::A128cbcHs256 => 16,
            Self::A192cbcHs384 => 24,
            Self::A256cbcHs512 => 32,
        }
    }

    fn compute_tag(
        &self,
        mac_key: &[u8],
        iv: Option<&[u8]>,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let pkey = PKey::hmac(mac_key)?;
        let md = self.hash_algorithm().message_digest();
        let mut signer = Signer::new(md, &pkey)?;
        signer.update(aad)?;
        if let Some(iv) = iv {
            signer.update(iv)?;
        }
        signer.update(ciphertext)?;
        // AL is the bit length of the AAD as a 64 bit big endian integer
        let al = ((aad.len() as u64) * 8).to_be_bytes();
        signer.update(&al)?;
        let mut mac = signer.sign_to_vec()?;
        mac.truncate(self.half_len());
        Ok(mac)
    }
}

impl JweContentEncryption for AescbcHmacJweEncryption {
    fn name(&self) -> &str {
        match self {
            Self::A128cbcHs256 => "A128CBC-HS256",
            Self::A192cbcHs384 => "A192CBC-HS384",
            Self::A256cbcHs512 => "A256CBC-HS512",
        }
    }

    fn key_len(&self) -> usize {
        self.half_len() * 2
    }

    fn iv_len(&self) -> usize {
        16
    }

    fn encrypt(
        &self,
        key: &[u8],
        iv: Option<&[u8]>,
        message: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), JoseError> {
        (|| -> anyhow::Result<(Vec<u8>, Option<Vec<u8>>)> {
            if key.len() != self.key_len() {
                bail!("The key size must be {}.", self.key_len());
            }
            let mac_key = &key[..self.half_len()];
            let enc_key = &key[self.half_len()..];

            let ciphertext = symm::encrypt(self.cipher(), enc_key, iv, message)?;
            let tag = self.compute_tag(mac_key, iv, &ciphertext, aad)?;
            Ok((ciphertext, Some(tag)))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn decrypt(
        &self,
        key: &[u8],
        iv: Option<&[u8]>,
        encrypted_message: &[u8],
        aad: &[u8],
        tag: Option<&[u8]>,
    ) -> Result<Vec<u8>, JoseError> {
        (|| -> anyhow::Result<Vec<u8>> {
            if key.len() != self.key_len() {
                bail!("The key size must be {}.", self.key_len());
            }
            let mac_key = &key[..self.half_len()];
            let enc_key = &key[self.half_len()..];

            let tag = match tag {
                Some(val) => val,
                None => bail!("A tag value is required."),
            };
            let expected = self.compute_tag(mac_key, iv, encrypted_message, aad)?;
            if !util::constant_time_eq(&expected, tag) {
                bail!("The tag does not verify.");
            }

            let message = symm::decrypt(self.cipher(), enc_key, iv, encrypted_message)?;
            Ok(message)
        })()
        .map_err(|_| JoseError::DecryptionFailed)
    }

    fn box_clone(&self) -> Box<dyn JweContentEncryption> {
        Box::new(*self)
    }
}

impl fmt::Display for AescbcHmacJweEncryption {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for AescbcHmacJweEncryption {
    type Target = dyn JweContentEncryption;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::random_bytes;

    #[test]
    fn test_encrypt_and_decrypt_aescbc_hmac() -> anyhow::Result<()> {
        let message = b"test payload!";
        let aad = b"header aad";

        for enc in &[
            AescbcHmacJweEncryption::A128cbcHs256,
            AescbcHmacJweEncryption::A192cbcHs384,
            AescbcHmacJweEncryption::A256cbcHs512,
        ] {
            let key = random_bytes(enc.key_len());
            let iv = random_bytes(enc.iv_len());

            let (ciphertext, tag) = enc.encrypt(&key, Some(&iv), message, aad)?;
            let tag = tag.unwrap();
            assert_eq!(tag.len(), enc.half_len());

            let decrypted = enc.decrypt(&key, Some(&iv), &ciphertext, aad, Some(&tag))?;
            assert_eq!(decrypted, message);
        }

        Ok(())
    }

    #[test]
    fn test_decrypt_rejects_tampering() -> anyhow::Result<()> {
        let enc = AescbcHmacJweEncryption::A128cbcHs256;
        let key = random_bytes(enc.key_len());
        let iv = random_bytes(enc.iv_len());
        let (ciphertext, tag) = enc.encrypt(&key, Some(&iv), b"message", b"aad")?;
        let tag = tag.unwrap();

        let mut bad_ciphertext = ciphertext.clone();
        bad_ciphertext[0] ^= 0x01;
        match enc.decrypt(&key, Some(&iv), &bad_ciphertext, b"aad", Some(&tag)) {
            Err(JoseError::DecryptionFailed) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut bad_tag = tag.clone();
        bad_tag[0] ^= 0x01;
        match enc.decrypt(&key, Some(&iv), &ciphertext, b"aad", Some(&bad_tag)) {
            Err(JoseError::DecryptionFailed) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        match enc.decrypt(&key, Some(&iv), &ciphertext, b"other aad", Some(&tag)) {
            Err(JoseError::DecryptionFailed) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }
}
