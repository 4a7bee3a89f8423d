use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

use crate::jwk::Jwk;
use crate::JoseError;

/// Storage capability for JWKs. Keys returned by a store are considered
/// trusted by the resolution chain.
///
/// Mutations must be serializable; reads may be concurrent.
pub trait JwkStore: Debug + Send + Sync {
    /// Return the key with the given key ID.
    fn get_by_key_id(&self, key_id: &str) -> Result<Option<Jwk>, JoseError>;

    /// Return the key with the given X.509 certificate SHA-1 thumbprint.
    fn get_by_x509_sha1_thumbprint(&self, thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError>;

    /// Return the key with the given X.509 certificate SHA-256 thumbprint.
    fn get_by_x509_sha256_thumbprint(&self, thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError>;

    /// Return the key with the given RFC 7638 JWK thumbprint.
    fn get_by_thumbprint(&self, thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError>;

    /// Store a key.
    fn set(&self, jwk: Jwk) -> Result<(), JoseError>;

    /// Remove the key with the given key ID.
    fn remove(&self, key_id: &str) -> Result<(), JoseError>;
}

/// The default store: holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJwkStore;

impl JwkStore for NoopJwkStore {
    fn get_by_key_id(&self, _key_id: &str) -> Result<Option<Jwk>, JoseError> {
        Ok(None)
    }

    fn get_by_x509_sha1_thumbprint(&self, _thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError> {
        Ok(None)
    }

    fn get_by_x509_sha256_thumbprint(&self, _thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError> {
        Ok(None)
    }

    fn get_by_thumbprint(&self, _thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError> {
        Ok(None)
    }

    fn set(&self, _jwk: Jwk) -> Result<(), JoseError> {
        Ok(())
    }

    fn remove(&self, _key_id: &str) -> Result<(), JoseError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    by_key_id: HashMap<String, Jwk>,
    by_x5t: HashMap<Vec<u8>, Jwk>,
    by_x5t_s256: HashMap<Vec<u8>, Jwk>,
    by_thumbprint: HashMap<Vec<u8>, Jwk>,
}

/// An in-memory store indexed by kid, certificate thumbprints and JWK
/// thumbprint.
#[derive(Debug, Default)]
pub struct InMemoryJwkStore {
    inner: RwLock<Inner>,
}

impl InMemoryJwkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JwkStore for InMemoryJwkStore {
    fn get_by_key_id(&self, key_id: &str) -> Result<Option<Jwk>, JoseError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.by_key_id.get(key_id).cloned())
    }

    fn get_by_x509_sha1_thumbprint(&self, thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.by_x5t.get(thumbprint).cloned())
    }

    fn get_by_x509_sha256_thumbprint(&self, thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.by_x5t_s256.get(thumbprint).cloned())
    }

    fn get_by_thumbprint(&self, thumbprint: &[u8]) -> Result<Option<Jwk>, JoseError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.by_thumbprint.get(thumbprint).cloned())
    }

    fn set(&self, jwk: Jwk) -> Result<(), JoseError> {
        let thumbprint = jwk.thumbprint(crate::util::HashAlgorithm::Sha256)?;
        let mut inner = self.inner.write().unwrap();
        if let Some(key_id) = jwk.key_id() {
            inner.by_key_id.insert(key_id.to_string(), jwk.clone());
        }
        if let Some(x5t) = jwk.x509_certificate_sha1_thumbprint() {
            inner.by_x5t.insert(x5t, jwk.clone());
        }
        if let Some(x5t_s256) = jwk.x509_certificate_sha256_thumbprint() {
            inner.by_x5t_s256.insert(x5t_s256, jwk.clone());
        }
        inner.by_thumbprint.insert(thumbprint, jwk);
        Ok(())
    }

    fn remove(&self, key_id: &str) -> Result<(), JoseError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(jwk) = inner.by_key_id.remove(key_id) {
            if let Some(x5t) = jwk.x509_certificate_sha1_thumbprint() {
                inner.by_x5t.remove(&x5t);
            }
            if let Some(x5t_s256) = jwk.x509_certificate_sha256_thumbprint() {
                inner.by_x5t_s256.remove(&x5t_s256);
            }
            if let Ok(thumbprint) = jwk.thumbprint(crate::util::HashAlgorithm::Sha256) {
                inner.by_thumbprint.remove(&thumbprint);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jwk(kid: &str) -> Jwk {
        let mut jwk = Jwk::new("oct");
        jwk.set_key_id(kid);
        jwk.set_parameter("k", Some(serde_json::json!("c2VjcmV0")))
            .unwrap();
        jwk
    }

    #[test]
    fn test_in_memory_store_set_get_remove() -> anyhow::Result<()> {
        let store = InMemoryJwkStore::new();
        let jwk = sample_jwk("k1");
        store.set(jwk.clone())?;

        assert_eq!(store.get_by_key_id("k1")?, Some(jwk.clone()));
        assert_eq!(store.get_by_key_id("k2")?, None);

        let thumbprint = jwk.thumbprint(crate::util::HashAlgorithm::Sha256)?;
        assert_eq!(store.get_by_thumbprint(&thumbprint)?, Some(jwk));

        store.remove("k1")?;
        assert_eq!(store.get_by_key_id("k1")?, None);
        assert_eq!(store.get_by_thumbprint(&thumbprint)?, None);
        Ok(())
    }

    #[test]
    fn test_noop_store() -> anyhow::Result<()> {
        let store = NoopJwkStore;
        store.set(sample_jwk("k1"))?;
        assert_eq!(store.get_by_key_id("k1")?, None);
        Ok(())
    }
}
