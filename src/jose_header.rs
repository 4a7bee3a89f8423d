use serde_json::{Map, Value};

use crate::JoseError;

/// Common view over a JWS or JWE header claims map.
pub trait JoseHeader {
    /// Return the claims map.
    fn claims_set(&self) -> &Map<String, Value>;

    /// Set a value for a header claim of the specified key.
    ///
    /// # Arguments
    ///
    /// * `key` - a key name of the header claim
    /// * `value` - a typed value of the header claim. If the value is None,
    ///   the claim is removed.
    fn set_claim(&mut self, key: &str, value: Option<Value>) -> Result<(), JoseError>;

    /// Return the value of the header claim of the specified key.
    ///
    /// # Arguments
    ///
    /// * `key` - a key name of the header claim
    fn claim(&self, key: &str) -> Option<&Value> {
        self.claims_set().get(key)
    }

    /// Return the value for algorithm header claim (alg).
    fn algorithm(&self) -> Option<&str> {
        match self.claims_set().get("alg") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Return the value for key ID header claim (kid).
    fn key_id(&self) -> Option<&str> {
        match self.claims_set().get("kid") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    fn box_clone(&self) -> Box<dyn JoseHeader>;

    /// Unwrap the header into its claims map.
    fn into_map(self) -> Map<String, Value>
    where
        Self: Sized;
}

impl Clone for Box<dyn JoseHeader> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
