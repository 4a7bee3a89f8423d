use std::fmt::Display;

use anyhow::bail;
use serde_json::{Map, Value};

use crate::jwk::Jwk;
use crate::util;
use crate::{JoseError, JoseHeader};

/// Represent JWS header claims.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JwsHeader {
    claims: Map<String, Value>,
}

impl JwsHeader {
    /// Return a JwsHeader instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new header instance from a json style header.
    ///
    /// # Arguments
    ///
    /// * `value` - the json style header claims
    pub fn from_bytes(value: &[u8]) -> Result<Self, JoseError> {
        let claims = (|| -> anyhow::Result<Map<String, Value>> {
            let claims: Map<String, Value> = serde_json::from_slice(value)?;
            Ok(claims)
        })()
        .map_err(JoseError::InvalidJson)?;
        Self::from_map(claims)
    }

    /// Return a new header instance from a claims map.
    ///
    /// # Arguments
    ///
    /// * `map` - JWS header claims.
    pub fn from_map(map: impl Into<Map<String, Value>>) -> Result<Self, JoseError> {
        let map: Map<String, Value> = map.into();
        for (key, value) in &map {
            Self::check_claim(key, value)?;
        }

        (|| -> anyhow::Result<()> {
            if let Some(Value::Bool(false)) = map.get("b64") {
                match map.get("crit") {
                    Some(Value::Array(vals)) if vals.iter().any(|e| e == "b64") => {}
                    _ => bail!("The b64 header claim name must be in critical."),
                }
            }
            Ok(())
        })()
        .map_err(JoseError::InvalidJwsFormat)?;

        Ok(Self { claims: map })
    }

    /// Set a value for algorithm header claim (alg).
    pub fn set_algorithm(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("alg".to_string(), Value::String(value));
    }

    /// Set a value for JWK set URL header claim (jku).
    pub fn set_jwk_set_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("jku".to_string(), Value::String(value));
    }

    /// Return the value for JWK set URL header claim (jku).
    pub fn jwk_set_url(&self) -> Option<&str> {
        match self.claims.get("jku") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for JWK header claim (jwk).
    pub fn set_jwk(&mut self, value: Jwk) {
        let value: Map<String, Value> = value.into();
        self.claims.insert("jwk".to_string(), Value::Object(value));
    }

    /// Return the value for JWK header claim (jwk).
    pub fn jwk(&self) -> Option<Jwk> {
        match self.claims.get("jwk") {
            Some(Value::Object(vals)) => Jwk::from_map(vals.clone()).ok(),
            _ => None,
        }
    }

    /// Set a value for X.509 URL header claim (x5u).
    pub fn set_x509_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("x5u".to_string(), Value::String(value));
    }

    /// Return the value for X.509 URL header claim (x5u).
    pub fn x509_url(&self) -> Option<&str> {
        match self.claims.get("x5u") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set values for X.509 certificate chain header claim (x5c).
    pub fn set_x509_certificate_chain(&mut self, values: &[impl AsRef<[u8]>]) {
        let mut vec = Vec::with_capacity(values.len());
        for val in values {
            vec.push(Value::String(base64::encode_config(
                val.as_ref(),
                base64::STANDARD,
            )));
        }
        self.claims.insert("x5c".to_string(), Value::Array(vec));
    }

    /// Return values for X.509 certificate chain header claim (x5c).
    pub fn x509_certificate_chain(&self) -> Option<Vec<Vec<u8>>> {
        match self.claims.get("x5c") {
            Some(Value::Array(vals)) => {
                let mut vec = Vec::with_capacity(vals.len());
                for val in vals {
                    match val {
                        Value::String(val) => match base64::decode_config(val, base64::STANDARD) {
                            Ok(val) => vec.push(val),
                            Err(_) => return None,
                        },
                        _ => return None,
                    }
                }
                Some(vec)
            }
            _ => None,
        }
    }

    /// Set a value for X.509 certificate SHA-1 thumbprint header claim
    /// (x5t).
    pub fn set_x509_certificate_sha1_thumbprint(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims.insert("x5t".to_string(), Value::String(val));
    }

    /// Return the value for X.509 certificate SHA-1 thumbprint header claim
    /// (x5t).
    pub fn x509_certificate_sha1_thumbprint(&self) -> Option<Vec<u8>> {
        match self.claims.get("x5t") {
            Some(Value::String(val)) => {
                base64::decode_config(val, base64::URL_SAFE_NO_PAD).ok()
            }
            _ => None,
        }
    }

    /// Set a value for X.509 certificate SHA-256 thumbprint header claim
    /// (x5t#S256).
    pub fn set_x509_certificate_sha256_thumbprint(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims
            .insert("x5t#S256".to_string(), Value::String(val));
    }

    /// Return the value for X.509 certificate SHA-256 thumbprint header
    /// claim (x5t#S256).
    pub fn x509_certificate_sha256_thumbprint(&self) -> Option<Vec<u8>> {
        match self.claims.get("x5t#S256") {
            Some(Value::String(val)) => {
                base64::decode_config(val, base64::URL_SAFE_NO_PAD).ok()
            }
            _ => None,
        }
    }

    /// Set a value for key ID header claim (kid).
    pub fn set_key_id(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("kid".to_string(), Value::String(value));
    }

    /// Set a value for token type header claim (typ).
    pub fn set_token_type(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("typ".to_string(), Value::String(value));
    }

    /// Return the value for token type header claim (typ).
    pub fn token_type(&self) -> Option<&str> {
        match self.claims.get("typ") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for content type header claim (cty).
    pub fn set_content_type(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("cty".to_string(), Value::String(value));
    }

    /// Return the value for content type header claim (cty).
    pub fn content_type(&self) -> Option<&str> {
        match self.claims.get("cty") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set values for critical header claim (crit).
    pub fn set_critical(&mut self, values: &[impl AsRef<str>]) {
        let mut vec = Vec::with_capacity(values.len());
        for val in values {
            vec.push(Value::String(val.as_ref().to_string()));
        }
        self.claims.insert("crit".to_string(), Value::Array(vec));
    }

    /// Return values for critical header claim (crit).
    pub fn critical(&self) -> Option<Vec<&str>> {
        match self.claims.get("crit") {
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

    /// Set a value for base64url-encode payload header claim (b64).
    pub fn set_base64url_encode_payload(&mut self, value: bool) {
        self.claims.insert("b64".to_string(), Value::Bool(value));
    }

    /// Return the value for base64url-encode payload header claim (b64).
    pub fn base64url_encode_payload(&self) -> Option<bool> {
        match self.claims.get("b64") {
            Some(Value::Bool(val)) => Some(*val),
            _ => None,
        }
    }

    fn check_claim(key: &str, value: &Value) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            match key {
                "alg" | "jku" | "x5u" | "kid" | "typ" | "cty" => match &value {
                    Value::String(_) => {}
                    _ => bail!("The JWS {} header claim must be a string.", key),
                },
                "b64" => match &value {
                    Value::Bool(_) => {}
                    _ => bail!("The JWS {} header claim must be a bool.", key),
                },
                "crit" => match &value {
                    Value::Array(vals) => {
                        for val in vals {
                            match val {
                                Value::String(_) => {}
                                _ => bail!(
                                    "An element of the JWS {} header claim must be a string.",
                                    key
                                ),
                            }
                        }
                    }
                    _ => bail!("The JWS {} header claim must be an array.", key),
                },
                "x5t" | "x5t#S256" => match &value {
                    Value::String(val) => {
                        if !util::is_base64_url_safe_nopad(val) {
                            bail!("The JWS {} header claim must be a base64 string.", key);
                        }
                    }
                    _ => bail!("The JWS {} header claim must be a string.", key),
                },
                "x5c" => match &value {
                    Value::Array(vals) => {
                        for val in vals {
                            match val {
                                Value::String(_) => {}
                                _ => bail!(
                                    "An element of the JWS {} header claim must be a string.",
                                    key
                                ),
                            }
                        }
                    }
                    _ => bail!("The JWS {} header claim must be an array.", key),
                },
                "jwk" => match &value {
                    Value::Object(vals) => Jwk::check_map(vals)?,
                    _ => bail!("The JWS {} header claim must be an object.", key),
                },
                _ => {}
            }

            Ok(())
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }
}

impl JoseHeader for JwsHeader {
    fn claims_set(&self) -> &Map<String, Value> {
        &self.claims
    }

    fn set_claim(&mut self, key: &str, value: Option<Value>) -> Result<(), JoseError> {
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

    fn box_clone(&self) -> Box<dyn JoseHeader> {
        Box::new(self.clone())
    }

    fn into_map(self) -> Map<String, Value> {
        self.claims
    }
}

impl AsRef<Map<String, Value>> for JwsHeader {
    fn as_ref(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl From<JwsHeader> for Map<String, Value> {
    fn from(header: JwsHeader) -> Self {
        header.claims
    }
}

impl Display for JwsHeader {
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
    fn test_header_claims() -> anyhow::Result<()> {
        let mut header = JwsHeader::new();
        header.set_algorithm("HS256");
        header.set_token_type("JWT");
        header.set_key_id("k1");
        header.set_critical(&["exp"]);

        assert_eq!(header.algorithm(), Some("HS256"));
        assert_eq!(header.token_type(), Some("JWT"));
        assert_eq!(header.key_id(), Some("k1"));
        assert_eq!(header.critical(), Some(vec!["exp"]));
        Ok(())
    }

    #[test]
    fn test_header_claim_types_are_checked() {
        assert!(JwsHeader::from_bytes(br#"{"alg":1}"#).is_err());
        assert!(JwsHeader::from_bytes(br#"{"crit":"b64"}"#).is_err());
        assert!(JwsHeader::from_bytes(br#"{"x5t":"not base64!"}"#).is_err());
    }

    #[test]
    fn test_b64_requires_crit() {
        assert!(JwsHeader::from_bytes(br#"{"b64":false}"#).is_err());
        assert!(JwsHeader::from_bytes(br#"{"b64":false,"crit":["b64"]}"#).is_ok());
    }

    #[test]
    fn test_header_serialization_preserves_order() -> anyhow::Result<()> {
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        header.set_algorithm("HS256");
        assert_eq!(header.to_string(), r#"{"typ":"JWT","alg":"HS256"}"#);
        Ok(())
    }

    #[test]
    fn test_set_claim_checks() -> anyhow::Result<()> {
        let mut header = JwsHeader::new();
        header.set_claim("custom", Some(json!({"a":1})))?;
        assert!(header.set_claim("alg", Some(json!(42))).is_err());
        header.set_claim("custom", None)?;
        assert_eq!(header.claim("custom"), None);
        Ok(())
    }
}
