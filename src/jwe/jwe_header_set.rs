use serde_json::{Map, Value};

use crate::JoseError;

/// A shared protected / unprotected header claim pair for the JWE JSON
/// serialization forms. The two claim sets are kept disjoint.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JweHeaderSet {
    protected: Map<String, Value>,
    unprotected: Map<String, Value>,
}

impl JweHeaderSet {
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

    /// Set a value for content encryption header claim (enc). The enc
    /// claim affects integrity; serialization requires it protected.
    pub fn set_content_encryption(&mut self, value: impl Into<String>, protection: bool) {
        self.set("enc", Value::String(value.into()), protection);
    }

    pub fn content_encryption(&self) -> Option<&str> {
        match self.protected.get("enc") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for compression header claim (zip). Always protected.
    pub fn set_compression(&mut self, value: impl Into<String>) {
        self.set("zip", Value::String(value.into()), true);
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

    /// Set values for critical header claim (crit). Always protected.
    pub fn set_critical(&mut self, values: &[impl AsRef<str>]) {
        let vec = values
            .iter()
            .map(|val| Value::String(val.as_ref().to_string()))
            .collect();
        self.set("crit", Value::Array(vec), true);
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
    fn test_enc_side_follows_protection_flag() {
        let mut set = JweHeaderSet::new();
        set.set_content_encryption("A128GCM", true);
        assert_eq!(set.claims_set(true).len(), 1);
        assert_eq!(set.content_encryption(), Some("A128GCM"));
    }

    #[test]
    fn test_sides_stay_disjoint() {
        let mut set = JweHeaderSet::new();
        set.set_key_id("k1", true);
        set.set_key_id("k1", false);
        assert_eq!(set.claims_set(true).len(), 0);
        assert_eq!(set.claims_set(false).len(), 1);
    }
}
