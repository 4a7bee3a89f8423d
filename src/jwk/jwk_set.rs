use std::fmt::Display;

use anyhow::bail;
use serde_json::{Map, Value};

use crate::jwk::Jwk;
use crate::JoseError;

/// Represent a JWK set (RFC 7517 §5).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JwkSet {
    keys: Vec<Jwk>,
}

impl JwkSet {
    /// Return an empty JWK set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new JWK set parsed from a JSON representation.
    pub fn from_bytes(input: impl AsRef<[u8]>) -> Result<Self, JoseError> {
        let map = (|| -> anyhow::Result<Map<String, Value>> {
            let map: Map<String, Value> = serde_json::from_slice(input.as_ref())?;
            Ok(map)
        })()
        .map_err(JoseError::InvalidJson)?;
        Self::from_map(map)
    }

    /// Return a new JWK set from a claims map.
    pub fn from_map(map: Map<String, Value>) -> Result<Self, JoseError> {
        (|| -> anyhow::Result<Self> {
            let keys = match map.get("keys") {
                Some(Value::Array(vals)) => {
                    let mut vec = Vec::with_capacity(vals.len());
                    for val in vals {
                        match val {
                            Value::Object(val) => vec.push(Jwk::from_map(val.clone())?),
                            _ => bail!("An element of the JWK set keys parameter must be an object."),
                        }
                    }
                    vec
                }
                Some(_) => bail!("The JWK set keys parameter must be an array."),
                None => bail!("The JWK set keys parameter is required."),
            };
            Ok(Self { keys })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwkFormat(err),
        })
    }

    /// Return all keys.
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Return the keys with the given key ID.
    pub fn get(&self, key_id: &str) -> Vec<&Jwk> {
        self.keys
            .iter()
            .filter(|key| key.key_id() == Some(key_id))
            .collect()
    }

    /// Add a key to the set.
    pub fn push_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// Remove every key with the given key ID.
    pub fn remove_keys(&mut self, key_id: &str) {
        self.keys.retain(|key| key.key_id() != Some(key_id));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Display for JwkSet {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let mut map = Map::new();
        let keys: Vec<Value> = self
            .keys
            .iter()
            .map(|key| Value::Object(key.as_ref().clone()))
            .collect();
        map.insert("keys".to_string(), Value::Array(keys));
        let val = serde_json::to_string(&map).map_err(|_| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwk_set_round_trip() -> anyhow::Result<()> {
        let input = br#"{"keys":[
            {"kty":"oct","kid":"k1","k":"c2VjcmV0"},
            {"kty":"oct","kid":"k2","k":"b3RoZXI"},
            {"kty":"oct","kid":"k1","k":"dGhpcmQ"}
        ]}"#;
        let set = JwkSet::from_bytes(&input[..])?;
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("k1").len(), 2);
        assert_eq!(set.get("missing").len(), 0);

        let clone = JwkSet::from_bytes(set.to_string().as_bytes())?;
        assert_eq!(set, clone);
        Ok(())
    }

    #[test]
    fn test_jwk_set_requires_keys() {
        assert!(JwkSet::from_bytes(br#"{}"#).is_err());
        assert!(JwkSet::from_bytes(br#"{"keys":"oops"}"#).is_err());
    }

    #[test]
    fn test_remove_keys() -> anyhow::Result<()> {
        let mut set = JwkSet::new();
        let mut jwk = Jwk::new("oct");
        jwk.set_key_id("k1");
        set.push_key(jwk);
        set.remove_keys("k1");
        assert!(set.is_empty());
        Ok(())
    }
}
