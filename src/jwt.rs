//! JSON Web Token (JWT) support: a JWS or JWE whose payload is a JSON
//! claims set.

mod jwt_context;
mod jwt_payload;
mod jwt_payload_validator;

use once_cell::sync::Lazy;

use crate::jwe::{JweDecrypter, JweEncrypter, JweHeader};
use crate::jwk::{Jwk, JwkSet};
use crate::jws::{JwsHeader, JwsSigner, JwsVerifier};
use crate::{JoseError, JoseHeader};

pub use crate::jwt::jwt_context::JwtContext;
pub use crate::jwt::jwt_payload::JwtPayload;
pub use crate::jwt::jwt_payload_validator::JwtPayloadValidator;

static DEFAULT_CONTEXT: Lazy<JwtContext> = Lazy::new(JwtContext::new);

/// Return the string representation of the JWT with the signing
/// algorithm.
///
/// # Arguments
///
/// * `payload` - The JWT claims set.
/// * `header` - The JWS header claims.
/// * `signer` - a signer object.
pub fn encode_with_signer(
    payload: &JwtPayload,
    header: &JwsHeader,
    signer: &dyn JwsSigner,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.encode_with_signer(payload, header, signer)
}

/// Return the string representation of the JWT with the encrypting
/// algorithm.
pub fn encode_with_encrypter(
    payload: &JwtPayload,
    header: &JweHeader,
    encrypter: &dyn JweEncrypter,
) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.encode_with_encrypter(payload, header, encrypter)
}

/// Return the string representation of the JWT with the "none"
/// algorithm. This is the explicit opt in for unsecured tokens.
pub fn encode_unsecured(payload: &JwtPayload, header: &JwsHeader) -> Result<String, JoseError> {
    DEFAULT_CONTEXT.encode_unsecured(payload, header)
}

/// Return the JOSE header decoded from a JWT without verification.
pub fn decode_header(input: impl AsRef<[u8]>) -> Result<Box<dyn JoseHeader>, JoseError> {
    DEFAULT_CONTEXT.decode_header(input)
}

/// Return the JWT object decoded by the selected verifier.
pub fn decode_with_verifier(
    input: impl AsRef<[u8]>,
    verifier: &dyn JwsVerifier,
) -> Result<(JwtPayload, JwsHeader), JoseError> {
    DEFAULT_CONTEXT.decode_with_verifier(input, verifier)
}

/// Return the JWT object decoded by using a JWK set.
pub fn decode_with_verifier_in_jwk_set<'a, F>(
    input: impl AsRef<[u8]>,
    jwk_set: &'a JwkSet,
    selector: F,
) -> Result<(JwtPayload, JwsHeader), JoseError>
where
    F: Fn(&'a Jwk) -> Result<Option<&'a dyn JwsVerifier>, JoseError>,
{
    DEFAULT_CONTEXT.decode_with_verifier_in_jwk_set(input, jwk_set, selector)
}

/// Return the JWT object decoded against trusted candidate keys.
pub fn decode_with_keys(
    input: impl AsRef<[u8]>,
    keys: &[Jwk],
) -> Result<(JwtPayload, JwsHeader), JoseError> {
    DEFAULT_CONTEXT.decode_with_keys(input, keys)
}

/// Return the JWT object decoded by the selected decrypter.
pub fn decode_with_decrypter(
    input: impl AsRef<[u8]>,
    decrypter: &dyn JweDecrypter,
) -> Result<(JwtPayload, JweHeader), JoseError> {
    DEFAULT_CONTEXT.decode_with_decrypter(input, decrypter)
}

/// Return the JWT object decoded with the "none" algorithm. This is the
/// explicit opt in for unsecured tokens.
pub fn decode_unsecured(input: impl AsRef<[u8]>) -> Result<(JwtPayload, JwsHeader), JoseError> {
    DEFAULT_CONTEXT.decode_unsecured(input)
}
