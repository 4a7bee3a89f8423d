use serde_json::{Map, Value};

use crate::jwk::Jwk;
use crate::JoseError;

/// A protected / unprotected header claim pair for the JSON serialization
/// forms. The two claim sets are kept disjoint: setting a claim on one
/// side removes it from the other.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JwsHeaderSet {
    protected: Map<String, Value>,
    unprotected: Map<String, Value>,
}

impl JwsHeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, key: &str, value: Value, protection: bool) {
        if protection {
            self.unprotected.remove(key);
            self.protected.insert(key.to_string(), value);
        } else {
            self.protected.remove(key);
            self.unprotected.insert(key.to_string(), value);
        }
    }

    /// Set a value for algorithm header claim (alg).
    ///
    /// The alg claim always belongs in the protected set for the JSON
    /// serializations; passing false is rejected at serialization time.
    pub fn set_algorithm(&mut self, value: impl Into<String>, protection: bool) {
        self.set("alg", Value::String(value.into()), protection);
    }

    pub fn algorithm(&self) -> Option<&str> {
        match self
            .protected
            .get("alg")
            .or_else(|| self.unprotected.get("alg"))
        {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for key ID header claim (kid).
    pub fn set_key_id(&mut self, value: impl Into<String>, protection: bool) {
        self.set("kid", Value::String(value.into()), protection);
    }

    pub fn key_id(&self) -> Option<&str> {
        match self
            .protected
            .get("kid")
            .or_else(|| self.unprotected.get("kid"))
        {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for token type header claim (typ).
    pub fn set_token_type(&mut self, value: impl Into<String>, protection: bool) {
        self.set("typ", Value::String(value.into()), protection);
    }

    pub fn token_type(&self) -> Option<&str> {
        match self
            .protected
            .get("typ")
            .or_else(|| self.unprotected.get("typ"))
        {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for content type header claim (cty).
    pub fn set_content_type(&mut self, value: impl Into<String>, protection: bool) {
        self.set("cty", Value::String(value.into()), protection);
    }

    pub fn content_type(&self) -> Option<&str> {
        match self
            .protected
            .get("cty")
            .or_else(|| self.unprotected.get("cty"))
        {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set values for critical header claim (crit). Critical claims are
    /// integrity relevant and always protected.
    pub fn set_critical(&mut self, values: &[impl AsRef<str>]) {
        let vec = values
            .iter()
            .map(|val| Value::String(val.as_ref().to_string()))
            .collect();
        self.set("crit", Value::Array(vec), true);
    }

    /// Set a value for JWK header claim (jwk).
    pub fn set_jwk(&mut self, value: Jwk, protection: bool) {
        let map: Map<String, Value> = value.into();
        self.set("jwk", Value::Object(map), protection);
    }

    /// Set a value for an arbitrary header claim.
    pub fn set_claim(
        &mut self,
        key: &str,
        value: Option<Value>,
        protection: bool,
    ) -> Result<(), JoseError> {
        match value {
            Some(val) => self.set(key, val, protection),
            None => {
                self.protected.remove(key);
                self.unprotected.remove(key);
            }
        }
        Ok(())
    }

    /// Return the claims of one side.
    ///
    /// # Arguments
    ///
    /// * `protection` - true for the protected claims
    pub fn claims_set(&self, protection: bool) -> &Map<String, Value> {
        if protection {
            &self.protected
        } else {
            &self.unprotected
        }
    }

    /// Return the merged claims map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.protected.clone();
        for (key, value) in &self.unprotected {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sides_stay_disjoint() {
        let mut set = JwsHeaderSet::new();
        set.set_key_id("k1", true);
        assert_eq!(set.claims_set(true).len(), 1);
        set.set_key_id("k1", false);
        assert_eq!(set.claims_set(true).len(), 0);
        assert_eq!(set.claims_set(false).len(), 1);
        assert_eq!(set.key_id(), Some("k1"));
    }

    #[test]
    fn test_to_map_merges() {
        let mut set = JwsHeaderSet::new();
        set.set_algorithm("RS256", true);
        set.set_token_type("JWT", false);
        let map = set.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("alg"), Some(&Value::String("RS256".to_string())));
    }
}
