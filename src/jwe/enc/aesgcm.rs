use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::symm::{self, Cipher};

use crate::jwe::JweContentEncryption;
use crate::JoseError;

/// AES-GCM single pass AEAD encryption with a 96 bit IV and a 128 bit tag.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AesgcmJweEncryption {
    /// AES GCM using 128-bit key
    A128gcm,
    /// AES GCM using 192-bit key
    A192gcm,
    /// AES GCM using 256-bit key
    A256gcm,
}

impl AesgcmJweEncryption {
    fn cipher(&self) -> Cipher {
        match self {
            Self::A128gcm => Cipher::aes_128_gcm(),
            Self::A192gcm => Cipher::aes_192_gcm(),
            Self::A256gcm => Cipher::aes_256_gcm(),
        }
    }
}

impl JweContentEncryption for AesgcmJweEncryption {
    fn name(&self) -> &str {
        match self {
            Self::A128gcm => "A128GCM",
            Self::A192gcm => "A192GCM",
            Self::A256gcm => "A256GCM",
        }
    }

    fn key_len(&self) -> usize {
        match self {
            Self::A128gcm => 16,
            Self::A192gcm => 24,
            Self::A256gcm => 32,
        }
    }

    fn iv_len(&self) -> usize {
        12
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
            let mut tag = vec![0; 16];
            let ciphertext =
                symm::encrypt_aead(self.cipher(), key, iv, aad, message, &mut tag)?;
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
            let tag = match tag {
                Some(val) => val,
                None => bail!("A tag value is required."),
            };
            let message =
                symm::decrypt_aead(self.cipher(), key, iv, aad, encrypted_message, tag)?;
            Ok(message)
        })()
        .map_err(|_| JoseError::DecryptionFailed)
    }

    fn box_clone(&self) -> Box<dyn JweContentEncryption> {
        Box::new(*self)
    }
}

impl fmt::Display for AesgcmJweEncryption {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for AesgcmJweEncryption {
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
    fn test_encrypt_and_decrypt_aesgcm() -> anyhow::Result<()> {
        let message = b"test payload!";
        let aad = b"header aad";

        for enc in &[
            AesgcmJweEncryption::A128gcm,
            AesgcmJweEncryption::A192gcm,
            AesgcmJweEncryption::A256gcm,
        ] {
            let key = random_bytes(enc.key_len());
            let iv = random_bytes(enc.iv_len());

            let (ciphertext, tag) = enc.encrypt(&key, Some(&iv), message, aad)?;
            let tag = tag.unwrap();
            assert_eq!(tag.len(), 16);

            let decrypted = enc.decrypt(&key, Some(&iv), &ciphertext, aad, Some(&tag))?;
            assert_eq!(decrypted, message);

            let mut bad = ciphertext.clone();
            bad[0] ^= 0x01;
            match enc.decrypt(&key, Some(&iv), &bad, aad, Some(&tag)) {
                Err(JoseError::DecryptionFailed) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }

        Ok(())
    }
}
