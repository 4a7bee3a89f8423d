//! JSON Web Signature (JWS) support.

pub mod alg;
mod jws_algorithm;
mod jws_context;
mod jws_header;
mod jws_header_set;

use once_cell::sync::Lazy;

use crate::jwk::{Jwk, JwkService};
use crate::JoseError;

pub use crate::jws::jws_algorithm::JwsAlgorithm;
pub use crate::jws::jws_algorithm::JwsSigner;
pub use crate::jws::jws_algorithm::JwsVerifier;
pub use crate::jws::jws_context::JwsContext;
pub use crate::jws::jws_header::JwsHeader;
pub use crate::jws::jws_header_set::JwsHeaderSet;

use crate::jws::alg::ecdsa::EcdsaJwsAlgorithm;
use crate::jws::alg::eddsa::EddsaJwsAlgorithm;
use crate::jws::alg::hmac::HmacJwsAlgorithm;
use crate::jws::alg::rsassa::RsassaJwsAlgorithm;
use crate::jws::alg::rsassa_pss::RsassaPssJwsAlgorithm;
use crate::jws::alg::unsecured::UnsecuredJwsAlgorithm;

pub use HmacJwsAlgorithm::Hs256 as HS256;
pub use HmacJwsAlgorithm::Hs384 as HS384;
pub use HmacJwsAlgorithm::Hs512 as HS512;

pub use RsassaJwsAlgorithm::Rs256 as RS256;
pub use RsassaJwsAlgorithm::Rs384 as RS384;
pub use RsassaJwsAlgorithm::Rs512 as RS512;

pub use RsassaPssJwsAlgorithm::Ps256 as PS256;
pub use RsassaPssJwsAlgorithm::Ps384 as PS384;
pub use RsassaPssJwsAlgorithm::Ps512 as PS512;

pub use EcdsaJwsAlgorithm::Es256 as ES256;
pub use EcdsaJwsAlgorithm::Es384 as ES384;
pub use EcdsaJwsAlgorithm::Es512 as ES512;

pub use EddsaJwsAlgorithm::Eddsa as EdDSA;

pub use UnsecuredJwsAlgorithm::None as Unsecured;

static DEFAULT_CONTEXT: Lazy<JwsContext> = Lazy::new(JwsContext::new);

/// Look up a signature algorithm by its JWA name.
pub fn algorithm_from_name(name: &str) -> Result<Box<dyn JwsAlgorithm>, JoseError> {
    let alg: Box<dyn JwsAlgorithm> = match name {
        "HS256" => Box::new(HS256),
        "HS384" => Box::new(HS384),
        "HS512" => Box::new(HS512),
        "RS256" => Box::new(RS256),
        "RS384" => Box::new(RS384),
        "RS512" => Box::new(RS512),
        "PS256" => Box::new(PS256),
        "PS384" => Box::new(PS384),
        "PS512" => Box::new(PS512),
        "ES256" => Box::new(ES256),
        "ES384" => Box::new(ES384),
        "ES512" => Box::new(ES512),
        "EdDSA" => Box::new(EdDSA),
        "none" => Box::new(Unsecured),
        _ => {
            return Err(JoseError::UnsupportedAlgorithm(anyhow::anyhow!(
                "Unknown signature algorithm: {}",
                name
            )))
        }
    };
    Ok(alg)
}

/// Return a representation of the data that is formatted by compact
/// serialization.
///
/// # Arguments
///
/// * `payload` - The payload data.
/// * `header` - The JWS header claims.
/// * `signer` - The JWS signer.
pub fn serialize_compact(
    payload: &[u8],
    header: &JwsHeader,
    signer: &dyn JwsSigner,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_compact(payload, header, signer)
}

/// Return a detached compact representation: the payload part is empty.
pub fn serialize_compact_detached(
    payload: &[u8],
    header: &JwsHeader,
    signer: &dyn JwsSigner,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_compact_detached(payload, header, signer)
}

/// Sign with the first trusted key the service resolves for the header.
pub fn serialize_compact_with_service(
    payload: &[u8],
    header: &JwsHeader,
    service: &JwkService,
    keys: &[Jwk],
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_compact_with_service(payload, header, service, keys)
}

/// Return a representation of the data that is formatted by general json
/// serialization.
pub fn serialize_general_json(
    payload: &[u8],
    signers: &[(&JwsHeaderSet, &dyn JwsSigner)],
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_general_json(payload, signers)
}

/// Return a representation of the data that is formatted by flattened json
/// serialization.
pub fn serialize_flattened_json(
    payload: &[u8],
    header: &JwsHeaderSet,
    signer: &dyn JwsSigner,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.serialize_flattened_json(payload, header, signer)
}

/// Deserialize the input that is formatted by compact serialization.
pub fn deserialize_compact(
    input: impl AsRef<[u8]>,
    verifier: &dyn JwsVerifier,
) -> Result<(Vec<u8>, JwsHeader), JoseError> {
    DEFAULT_CONTEXT.deserialize_compact(input, verifier)
}

/// Deserialize a detached compact input against an externally supplied
/// payload.
pub fn deserialize_compact_detached(
    input: impl AsRef<[u8]>,
    payload: &[u8],
    verifier: &dyn JwsVerifier,
) -> Result<JwsHeader, JoseError> {
    DEFAULT_CONTEXT.deserialize_compact_detached(input, payload, verifier)
}

/// Verify a compact input against every trusted candidate key, trying them
/// in sequence.
pub fn deserialize_compact_with_keys(
    input: impl AsRef<[u8]>,
    keys: &[Jwk],
) -> Result<(Vec<u8>, JwsHeader), JoseError> {
    DEFAULT_CONTEXT.deserialize_compact_with_keys(input, keys)
}

/// Deserialize the input that is formatted by json serialization.
pub fn deserialize_json(
    input: impl AsRef<[u8]>,
    verifier: &dyn JwsVerifier,
) -> Result<(Vec<u8>, JwsHeader), JoseError> {
    DEFAULT_CONTEXT.deserialize_json(input, verifier)
}
