use std::fmt::Debug;

use anyhow::anyhow;

use crate::jwk::Jwk;
use crate::JoseError;

/// Resolution of key material outside the store, typically backed by a
/// platform key store. Keys returned by a resolver are considered trusted.
pub trait JwkResolver: Debug + Send + Sync {
    /// Resolve key material by key ID or certificate thumbprints.
    fn resolve(
        &self,
        key_id: Option<&str>,
        x509_sha1_thumbprint: Option<&[u8]>,
        x509_sha256_thumbprint: Option<&[u8]>,
    ) -> Result<Option<Jwk>, JoseError>;
}

/// The default resolver: resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJwkResolver;

impl JwkResolver for NoopJwkResolver {
    fn resolve(
        &self,
        _key_id: Option<&str>,
        _x509_sha1_thumbprint: Option<&[u8]>,
        _x509_sha256_thumbprint: Option<&[u8]>,
    ) -> Result<Option<Jwk>, JoseError> {
        Ok(None)
    }
}

/// Fetches documents referenced by `jku` and `x5u` header parameters. The
/// engine performs no I/O of its own; an implementation wires an actual
/// URI-resource loader here.
pub trait JwkSetLoader: Debug + Send + Sync {
    /// Fetch the raw document at the given URL.
    fn load(&self, url: &str) -> Result<Vec<u8>, JoseError>;
}

/// The default loader: refuses every URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJwkSetLoader;

impl JwkSetLoader for NoopJwkSetLoader {
    fn load(&self, url: &str) -> Result<Vec<u8>, JoseError> {
        Err(JoseError::InvalidKeyFormat(anyhow!(
            "URL resolution is not enabled: {}",
            url
        )))
    }
}
