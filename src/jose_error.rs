use thiserror::Error;

/// Error kinds raised by the JOSE engine.
#[derive(Error, Debug)]
pub enum JoseError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(#[source] anyhow::Error),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(#[source] anyhow::Error),

    #[error("Invalid JWK format: {0}")]
    InvalidJwkFormat(#[source] anyhow::Error),

    #[error("Invalid JWS format: {0}")]
    InvalidJwsFormat(#[source] anyhow::Error),

    #[error("Invalid JWE format: {0}")]
    InvalidJweFormat(#[source] anyhow::Error),

    #[error("Invalid JWT format: {0}")]
    InvalidJwtFormat(#[source] anyhow::Error),

    #[error("Invalid json: {0}")]
    InvalidJson(#[source] anyhow::Error),

    #[error("Invalid claim: {0}")]
    InvalidClaim(#[source] anyhow::Error),

    /// No trusted key consistent with the header survived the resolution
    /// chain.
    #[error("No suitable key: {0}")]
    NoSuitableKey(#[source] anyhow::Error),

    /// Resolved key material disagrees with the provided parameters or with
    /// the x5c leaf certificate.
    #[error("Inconsistent key: {0}")]
    InconsistentKey(#[source] anyhow::Error),

    /// A key was resolved but its provenance does not allow using it.
    #[error("Untrusted key: {0}")]
    UntrustedKey(#[source] anyhow::Error),

    /// The crit header claim references a parameter the reader does not
    /// understand.
    #[error("Unknown critical header claim: {0}")]
    UnknownCritical(String),

    /// Every candidate key failed to verify; the sources of the per-key
    /// failures are aggregated in the message.
    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(#[source] anyhow::Error),

    /// Tag mismatch, padding error or unwrap failure. The cause is not
    /// distinguished.
    #[error("Decryption failed.")]
    DecryptionFailed,

    #[error("Compression error: {0}")]
    CompressionError(#[source] anyhow::Error),
}
