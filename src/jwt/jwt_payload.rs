use std::fmt::Display;

use anyhow::bail;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Number, Value};

use crate::JoseError;

/// Represent a JWT claims set: the registered claims of RFC 7519 §4.1
/// plus arbitrary custom claims.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JwtPayload {
    claims: Map<String, Value>,
}

impl JwtPayload {
    /// Return a JwtPayload instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new payload from a json style claims set.
    pub fn from_bytes(value: &[u8]) -> Result<Self, JoseError> {
        let claims = (|| -> anyhow::Result<Map<String, Value>> {
            let claims: Map<String, Value> = serde_json::from_slice(value)?;
            Ok(claims)
        })()
        .map_err(JoseError::InvalidJson)?;
        Self::from_map(claims)
    }

    /// Return a new payload from a claims map.
    pub fn from_map(map: impl Into<Map<String, Value>>) -> Result<Self, JoseError> {
        let map: Map<String, Value> = map.into();
        for (key, value) in &map {
            Self::check_claim(key, value)?;
        }
        Ok(Self { claims: map })
    }

    /// Set a value for issuer claim (iss).
    pub fn set_issuer(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("iss".to_string(), Value::String(value));
    }

    /// Return the value for issuer claim (iss).
    pub fn issuer(&self) -> Option<&str> {
        match self.claims.get("iss") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for subject claim (sub).
    pub fn set_subject(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("sub".to_string(), Value::String(value));
    }

    /// Return the value for subject claim (sub).
    pub fn subject(&self) -> Option<&str> {
        match self.claims.get("sub") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set values for audience claim (aud). A single audience is stored
    /// as a string, several as an array.
    pub fn set_audience(&mut self, values: Vec<impl Into<String>>) {
        let mut values: Vec<String> = values.into_iter().map(|v| v.into()).collect();
        let value = if values.len() == 1 {
            Value::String(values.remove(0))
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        self.claims.insert("aud".to_string(), value);
    }

    /// Return values for audience claim (aud).
    pub fn audience(&self) -> Option<Vec<&str>> {
        match self.claims.get("aud") {
            Some(Value::String(val)) => Some(vec![val.as_str()]),
            Some(Value::Array(vals)) => {
                let mut vec = Vec::with_capacity(vals.len());
                for val in vals {
                    match val {
                        Value::String(val) => vec.push(val.as_str()),
                        _ => return None,
                    }
                }
                Some(vec)
            }
            _ => None,
        }
    }

    /// Set a value for expiration time claim (exp).
    pub fn set_expires_at(&mut self, value: &DateTime<Utc>) {
        self.claims.insert(
            "exp".to_string(),
            Value::Number(Number::from(value.timestamp())),
        );
    }

    /// Return the value for expiration time claim (exp).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.time_claim("exp")
    }

    /// Set a value for not before claim (nbf).
    pub fn set_not_before(&mut self, value: &DateTime<Utc>) {
        self.claims.insert(
            "nbf".to_string(),
            Value::Number(Number::from(value.timestamp())),
        );
    }

    /// Return the value for not before claim (nbf).
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.time_claim("nbf")
    }

    /// Set a value for issued at claim (iat).
    pub fn set_issued_at(&mut self, value: &DateTime<Utc>) {
        self.claims.insert(
            "iat".to_string(),
            Value::Number(Number::from(value.timestamp())),
        );
    }

    /// Return the value for issued at claim (iat).
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.time_claim("iat")
    }

    /// Set a value for JWT ID claim (jti).
    pub fn set_jwt_id(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("jti".to_string(), Value::String(value));
    }

    /// Return the value for JWT ID claim (jti).
    pub fn jwt_id(&self) -> Option<&str> {
        match self.claims.get("jti") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    fn time_claim(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.claims.get(key) {
            Some(Value::Number(val)) => val
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            _ => None,
        }
    }

    /// Return the claims map.
    pub fn claims_set(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Return the value of the claim of the specified key.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// Set a value for the claim of the specified key. A None value
    /// removes the claim.
    pub fn set_claim(&mut self, key: &str, value: Option<Value>) -> Result<(), JoseError> {
        match value {
            Some(val) => {
                Self::check_claim(key, &val)?;
                self.claims.insert(key.to_string(), val);
            }
            None => {
                self.claims.remove(key);
            }
        }
        Ok(())
    }

    fn check_claim(key: &str, value: &Value) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            match key {
                "iss" | "sub" | "jti" => match value {
                    Value::String(_) => {}
                    _ => bail!("The JWT {} payload claim must be a string.", key),
                },
                "aud" => match value {
                    Value::String(_) => {}
                    Value::Array(vals) => {
                        for val in vals {
                            match val {
                                Value::String(_) => {}
                                _ => bail!(
                                    "An element of the JWT {} payload claim must be a string.",
                                    key
                                ),
                            }
                        }
                    }
                    _ => bail!("The JWT {} payload claim must be a string or array.", key),
                },
                "exp" | "nbf" | "iat" => match value {
                    Value::Number(val) if val.is_i64() || val.is_u64() => {}
                    _ => bail!("The JWT {} payload claim must be a number.", key),
                },
                _ => {}
            }
            Ok(())
        })()
        .map_err(JoseError::InvalidClaim)
    }

    /// Unwrap the payload into its claims map.
    pub fn into_map(self) -> Map<String, Value> {
        self.claims
    }
}

impl AsRef<Map<String, Value>> for JwtPayload {
    fn as_ref(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl From<JwtPayload> for Map<String, Value> {
    fn from(payload: JwtPayload) -> Self {
        payload.claims
    }
}

impl Display for JwtPayload {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let val = serde_json::to_string(&self.claims).map_err(|_| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registered_claims() -> anyhow::Result<()> {
        let now = Utc.timestamp_opt(1_300_819_380, 0).single().unwrap();

        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");
        payload.set_subject("subject");
        payload.set_audience(vec!["aud1"]);
        payload.set_expires_at(&now);
        payload.set_jwt_id("id-1");
        payload.set_claim("http://example.com/is_root", Some(json!(true)))?;

        assert_eq!(payload.issuer(), Some("joe"));
        assert_eq!(payload.subject(), Some("subject"));
        assert_eq!(payload.audience(), Some(vec!["aud1"]));
        assert_eq!(payload.expires_at(), Some(now));
        assert_eq!(payload.jwt_id(), Some("id-1"));
        assert_eq!(
            payload.claim("http://example.com/is_root"),
            Some(&json!(true))
        );
        Ok(())
    }

    #[test]
    fn test_single_audience_is_a_string() {
        let mut payload = JwtPayload::new();
        payload.set_audience(vec!["aud1"]);
        assert_eq!(payload.claim("aud"), Some(&json!("aud1")));

        payload.set_audience(vec!["aud1", "aud2"]);
        assert_eq!(payload.claim("aud"), Some(&json!(["aud1", "aud2"])));
    }

    #[test]
    fn test_claim_types_are_checked() {
        assert!(JwtPayload::from_bytes(br#"{"iss":1}"#).is_err());
        assert!(JwtPayload::from_bytes(br#"{"exp":"soon"}"#).is_err());
        assert!(JwtPayload::from_bytes(br#"{"aud":[1]}"#).is_err());
        assert!(JwtPayload::from_bytes(br#"{"iss":"joe","exp":1300819380}"#).is_ok());
    }
}
