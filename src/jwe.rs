//! JSON Web Encryption (JWE) support.

pub mod alg;
pub mod enc;
mod jwe_algorithm;
mod jwe_compression;
mod jwe_content_encryption;
mod jwe_context;
mod jwe_header;
mod jwe_header_set;
pub mod zip;

use once_cell::sync::Lazy;

use crate::jwk::{Jwk, JwkService};
use crate::JoseError;

pub use crate::jwe::jwe_algorithm::JweAlgorithm;
pub use crate::jwe::jwe_algorithm::JweDecrypter;
pub use crate::jwe::jwe_algorithm::JweEncrypter;
pub use crate::jwe::jwe_algorithm::KeyManagementKind;
pub use crate::jwe::jwe_compression::JweCompression;
pub use crate::jwe::jwe_content_encryption::JweContentEncryption;
pub use crate::jwe::jwe_context::JweContext;
pub use crate::jwe::jwe_header::JweHeader;
pub use crate::jwe::jwe_header_set::JweHeaderSet;

use crate::jwe::alg::aesgcmkw::AesgcmkwJweAlgorithm;
use crate::jwe::alg::aeskw::AeskwJweAlgorithm;
use crate::jwe::alg::direct::DirectJweAlgorithm;
use crate::jwe::alg::ecdh_es::EcdhEsJweAlgorithm;
use crate::jwe::alg::pbes2_hmac_aeskw::Pbes2HmacAeskwJweAlgorithm;
use crate::jwe::alg::rsaes::RsaesJweAlgorithm;
use crate::jwe::enc::aescbc_hmac::AescbcHmacJweEncryption;
use crate::jwe::enc::aesgcm::AesgcmJweEncryption;
use crate::jwe::zip::deflate::DeflateJweCompression;

pub use DirectJweAlgorithm::Dir;

pub use EcdhEsJweAlgorithm::EcdhEs as ECDH_ES;
pub use EcdhEsJweAlgorithm::EcdhEsA128kw as ECDH_ES_A128KW;
pub use EcdhEsJweAlgorithm::EcdhEsA192kw as ECDH_ES_A192KW;
pub use EcdhEsJweAlgorithm::EcdhEsA256kw as ECDH_ES_A256KW;

pub use AeskwJweAlgorithm::A128kw as A128KW;
pub use AeskwJweAlgorithm::A192kw as A192KW;
pub use AeskwJweAlgorithm::A256kw as A256KW;

pub use AesgcmkwJweAlgorithm::A128gcmkw as A128GCMKW;
pub use AesgcmkwJweAlgorithm::A192gcmkw as A192GCMKW;
pub use AesgcmkwJweAlgorithm::A256gcmkw as A256GCMKW;

pub use Pbes2HmacAeskwJweAlgorithm::Pbes2Hs256A128kw as PBES2_HS256_A128KW;
pub use Pbes2HmacAeskwJweAlgorithm::Pbes2Hs384A192kw as PBES2_HS384_A192KW;
pub use Pbes2HmacAeskwJweAlgorithm::Pbes2Hs512A256kw as PBES2_HS512_A256KW;

pub use RsaesJweAlgorithm::Rsa1_5 as RSA1_5;
pub use RsaesJweAlgorithm::RsaOaep as RSA_OAEP;
pub use RsaesJweAlgorithm::RsaOaep256 as RSA_OAEP_256;
pub use RsaesJweAlgorithm::RsaOaep384 as RSA_OAEP_384;
pub use RsaesJweAlgorithm::RsaOaep512 as RSA_OAEP_512;

pub use AescbcHmacJweEncryption::A128cbcHs256 as A128CBC_HS256;
pub use AescbcHmacJweEncryption::A192cbcHs384 as A192CBC_HS384;
pub use AescbcHmacJweEncryption::A256cbcHs512 as A256CBC_HS512;

pub use AesgcmJweEncryption::A128gcm as A128GCM;
pub use AesgcmJweEncryption::A192gcm as A192GCM;
pub use AesgcmJweEncryption::A256gcm as A256GCM;

pub use DeflateJweCompression::Deflate as DEF;

static DEFAULT_CONTEXT: Lazy<JweContext> = Lazy::new(JweContext::new);

/// Look up a key management algorithm by its JWA name.
pub fn algorithm_from_name(name: &str) -> Result<Box<dyn JweAlgorithm>, JoseError> {
    let alg: Box<dyn JweAlgorithm> = match name {
        "dir" => Box::new(Dir),
        "ECDH-ES" => Box::new(ECDH_ES),
        "ECDH-ES+A128KW" => Box::new(ECDH_ES_A128KW),
        "ECDH-ES+A192KW" => Box::new(ECDH_ES_A192KW),
        "ECDH-ES+A256KW" => Box::new(ECDH_ES_A256KW),
        "A128KW" => Box::new(A128KW),
        "A192KW" => Box::new(A192KW),
        "A256KW" => Box::new(A256KW),
        "A128GCMKW" => Box::new(A128GCMKW),
        "A192GCMKW" => Box::new(A192GCMKW),
        "A256GCMKW" => Box::new(A256GCMKW),
        "PBES2-HS256+A128KW" => Box::new(PBES2_HS256_A128KW),
        "PBES2-HS384+A192KW" => Box::new(PBES2_HS384_A192KW),
        "PBES2-HS512+A256KW" => Box::new(PBES2_HS512_A256KW),
        "RSA1_5" => Box::new(RSA1_5),
        "RSA-OAEP" => Box::new(RSA_OAEP),
        "RSA-OAEP-256" => Box::new(RSA_OAEP_256),
        "RSA-OAEP-384" => Box::new(RSA_OAEP_384),
        "RSA-OAEP-512" => Box::new(RSA_OAEP_512),
        _ => {
            return Err(JoseError::UnsupportedAlgorithm(anyhow::anyhow!(
                "Unknown key management algorithm: {}",
                name
            )))
        }
    };
    Ok(alg)
}

/// Look up a content encryption algorithm by its JWA name.
pub fn content_encryption_from_name(
    name: &str,
) -> Result<Box<dyn JweContentEncryption>, JoseError> {
    let enc: Box<dyn JweContentEncryption> = match name {
        "A128CBC-HS256" => Box::new(A128CBC_HS256),
        "A192CBC-HS384" => Box::new(A192CBC_HS384),
        "A256CBC-HS512" => Box::new(A256CBC_HS512),
        "A128GCM" => Box::new(A128GCM),
        "A192GCM" => Box::new(A192GCM),
        "A256GCM" => Box::new(A256GCM),
        _ => {
            return Err(JoseError::UnsupportedAlgorithm(anyhow::anyhow!(
                "Unknown content encryption algorithm: {}",
                name
            )))
        }
    };
    Ok(enc)
}

/// Look up a compression algorithm by its zip header value.
pub fn compression_from_name(name: &str) -> Result<Box<dyn JweCompression>, JoseError> {
    let zip: Box<dyn JweCompression> = match name {
        "DEF" => Box::new(DEF),
        _ => {
            return Err(JoseError::UnsupportedAlgorithm(anyhow::anyhow!(
                "Unknown compression algorithm: {}",
                name
            )))
        }
    };
    Ok(zip)
}

/// Return a representation of the data that is formatted by compact
/// serialization.
///
/// # Arguments
///
/// * `payload` - The payload data.
/// * `header` - The JWE header claims.
/// * `encrypter` - The JWE encrypter.
pub fn serialize_compact(
    payload: &[u8],
    header: &JweHeader,
    encrypter: &dyn JweEncrypter,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_compact(payload, header, encrypter)
}

/// Encrypt to the first trusted key the service resolves for the header.
pub fn serialize_compact_with_service(
    payload: &[u8],
    header: &JweHeader,
    service: &JwkService,
    keys: &[Jwk],
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_compact_with_service(payload, header, service, keys)
}

/// Return a representation of the data that is formatted by general json
/// serialization.
pub fn serialize_general_json(
    payload: &[u8],
    header: Option<&JweHeaderSet>,
    recipients: &[(Option<&JweHeader>, &dyn JweEncrypter)],
    aad: Option<&[u8]>,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_general_json(payload, header, recipients, aad)
}

/// Return a representation of the data that is formatted by flattened json
/// serialization.
pub fn serialize_flattened_json(
    payload: &[u8],
    header: Option<&JweHeaderSet>,
    recipient_header: Option<&JweHeader>,
    aad: Option<&[u8]>,
    encrypter: &dyn JweEncrypter,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_flattened_json(payload, header, recipient_header, aad, encrypter)
}

/// Deserialize the input that is formatted by compact serialization.
pub fn deserialize_compact(
    input: &str,
    decrypter: &dyn JweDecrypter,
) -> Result<(Vec<u8>, JweHeader), JoseError> {
    DEFAULT_CONTEXT.deserialize_compact(input, decrypter)
}

/// Decrypt a compact input against every trusted candidate key, trying
/// them in sequence.
pub fn deserialize_compact_with_keys(
    input: &str,
    keys: &[Jwk],
) -> Result<(Vec<u8>, JweHeader), JoseError> {
    DEFAULT_CONTEXT.deserialize_compact_with_keys(input, keys)
}

/// Deserialize the input that is formatted by json serialization.
pub fn deserialize_json(
    input: &str,
    decrypter: &dyn JweDecrypter,
) -> Result<(Vec<u8>, JweHeader), JoseError> {
    DEFAULT_CONTEXT.deserialize_json(input, decrypter)
}
