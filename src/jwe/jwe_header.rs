use std::fmt::Display;

use anyhow::bail;
use serde_json::{Map, Number, Value};

use crate::jwk::Jwk;
use crate::util;
use crate::{JoseError, JoseHeader};

/// Represent JWE header claims.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JweHeader {
    claims: Map<String, Value>,
}

impl JweHeader {
    /// Return a JweHeader instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new header instance from a json style header.
    pub fn from_bytes(value: &[u8]) -> Result<Self, JoseError> {
        let claims = (|| -> anyhow::Result<Map<String, Value>> {
            let claims: Map<String, Value> = serde_json::from_slice(value)?;
            Ok(claims)
        })()
        .map_err(JoseError::InvalidJson)?;
        Self::from_map(claims)
    }

    /// Return a new header instance from a claims map.
    pub fn from_map(map: impl Into<Map<String, Value>>) -> Result<Self, JoseError> {
        let map: Map<String, Value> = map.into();
        for (key, value) in &map {
            Self::check_claim(key, value)?;
        }
        Ok(Self { claims: map })
    }

    /// Set a value for algorithm header claim (alg).
    pub fn set_algorithm(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("alg".to_string(), Value::String(value));
    }

    /// Set a value for content encryption header claim (enc).
    pub fn set_content_encryption(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("enc".to_string(), Value::String(value));
    }

    /// Return the value for content encryption header claim (enc).
    pub fn content_encryption(&self) -> Option<&str> {
        match self.claims.get("enc") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for compression header claim (zip).
    pub fn set_compression(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("zip".to_string(), Value::String(value));
    }

    /// Return the value for compression header claim (zip).
    pub fn compression(&self) -> Option<&str> {
        match self.claims.get("zip") {
            Some(Value::String(val)) => Some(val),
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
        let vec = values
            .iter()
            .map(|val| Value::String(val.as_ref().to_string()))
            .collect();
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

    /// Set a value for JWK set URL header claim (jku).
    pub fn set_jwk_set_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("jku".to_string(), Value::String(value));
    }

    /// Set a value for JWK header claim (jwk).
    pub fn set_jwk(&mut self, value: Jwk) {
        let value: Map<String, Value> = value.into();
        self.claims.insert("jwk".to_string(), Value::Object(value));
    }

    /// Set a value for X.509 URL header claim (x5u).
    pub fn set_x509_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.claims.insert("x5u".to_string(), Value::String(value));
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

    /// Set a value for ephemeral public key header claim (epk).
    pub fn set_ephemeral_public_key(&mut self, value: Jwk) {
        let value: Map<String, Value> = value.into();
        self.claims.insert("epk".to_string(), Value::Object(value));
    }

    /// Return the value for ephemeral public key header claim (epk).
    pub fn ephemeral_public_key(&self) -> Option<Jwk> {
        match self.claims.get("epk") {
            Some(Value::Object(vals)) => Jwk::from_map(vals.clone()).ok(),
            _ => None,
        }
    }

    /// Set a value for agreement PartyUInfo header claim (apu).
    pub fn set_agreement_partyuinfo(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims.insert("apu".to_string(), Value::String(val));
    }

    /// Return the value for agreement PartyUInfo header claim (apu).
    pub fn agreement_partyuinfo(&self) -> Option<Vec<u8>> {
        match self.claims.get("apu") {
            Some(Value::String(val)) => {
                base64::decode_config(val, base64::URL_SAFE_NO_PAD).ok()
            }
            _ => None,
        }
    }

    /// Set a value for agreement PartyVInfo header claim (apv).
    pub fn set_agreement_partyvinfo(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims.insert("apv".to_string(), Value::String(val));
    }

    /// Return the value for agreement PartyVInfo header claim (apv).
    pub fn agreement_partyvinfo(&self) -> Option<Vec<u8>> {
        match self.claims.get("apv") {
            Some(Value::String(val)) => {
                base64::decode_config(val, base64::URL_SAFE_NO_PAD).ok()
            }
            _ => None,
        }
    }

    /// Set a value for PBES2 salt input header claim (p2s).
    pub fn set_pbes2_salt_input(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims.insert("p2s".to_string(), Value::String(val));
    }

    /// Set a value for PBES2 count header claim (p2c).
    pub fn set_pbes2_count(&mut self, value: usize) {
        self.claims
            .insert("p2c".to_string(), Value::Number(Number::from(value)));
    }

    /// Set a value for initialization vector header claim (iv).
    pub fn set_initialization_vector(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims.insert("iv".to_string(), Value::String(val));
    }

    /// Return the value for initialization vector header claim (iv).
    pub fn initialization_vector(&self) -> Option<Vec<u8>> {
        match self.claims.get("iv") {
            Some(Value::String(val)) => {
                base64::decode_config(val, base64::URL_SAFE_NO_PAD).ok()
            }
            _ => None,
        }
    }

    /// Set a value for authentication tag header claim (tag).
    pub fn set_authentication_tag(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.claims.insert("tag".to_string(), Value::String(val));
    }

    /// Return the value for authentication tag header claim (tag).
    pub fn authentication_tag(&self) -> Option<Vec<u8>> {
        match self.claims.get("tag") {
            Some(Value::String(val)) => {
                base64::decode_config(val, base64::URL_SAFE_NO_PAD).ok()
            }
            _ => None,
        }
    }

    fn check_claim(key: &str, value: &Value) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            match key {
                "alg" | "enc" | "zip" | "jku" | "x5u" | "kid" | "typ" | "cty" => match &value {
                    Value::String(_) => {}
                    _ => bail!("The JWE {} header claim must be a string.", key),
                },
                "p2c" => match &value {
                    Value::Number(val) if val.is_u64() => {}
                    _ => bail!("The JWE {} header claim must be an unsigned integer.", key),
                },
                "crit" => match &value {
                    Value::Array(vals) => {
                        for val in vals {
                            match val {
                                Value::String(_) => {}
                                _ => bail!(
                                    "An element of the JWE {} header claim must be a string.",
                                    key
                                ),
                            }
                        }
                    }
                    _ => bail!("The JWE {} header claim must be an array.", key),
                },
                "x5t" | "x5t#S256" | "apu" | "apv" | "p2s" | "iv" | "tag" => match &value {
                    Value::String(val) => {
                        if !util::is_base64_url_safe_nopad(val) {
                            bail!("The JWE {} header claim must be a base64 string.", key);
                        }
                    }
                    _ => bail!("The JWE {} header claim must be a string.", key),
                },
                "x5c" => match &value {
                    Value::Array(vals) => {
                        for val in vals {
                            match val {
                                Value::String(_) => {}
                                _ => bail!(
                                    "An element of the JWE {} header claim must be a string.",
                                    key
                                ),
                            }
                        }
                    }
                    _ => bail!("The JWE {} header claim must be an array.", key),
                },
                "jwk" | "epk" => match &value {
                    Value::Object(vals) => Jwk::check_map(vals)?,
                    _ => bail!("The JWE {} header claim must be an object.", key),
                },
                _ => {}
            }
            Ok(())
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }
}

impl JoseHeader for JweHeader {
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

impl AsRef<Map<String, Value>> for JweHeader {
    fn as_ref(&self) -> &Map<String, Value> {
        &self.claims
    }
}

impl From<JweHeader> for Map<String, Value> {
    fn from(header: JweHeader) -> Self {
        header.claims
    }
}

impl Display for JweHeader {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let val = serde_json::to_string(&self.claims).map_err(|_| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_claims() -> anyhow::Result<()> {
        let mut header = JweHeader::new();
        header.set_algorithm("RSA-OAEP");
        header.set_content_encryption("A128CBC-HS256");
        header.set_compression("DEF");
        header.set_agreement_partyuinfo(b"alice");

        assert_eq!(header.algorithm(), Some("RSA-OAEP"));
        assert_eq!(header.content_encryption(), Some("A128CBC-HS256"));
        assert_eq!(header.compression(), Some("DEF"));
        assert_eq!(header.agreement_partyuinfo(), Some(b"alice".to_vec()));
        Ok(())
    }

    #[test]
    fn test_header_claim_types_are_checked() {
        assert!(JweHeader::from_bytes(br#"{"enc":1}"#).is_err());
        assert!(JweHeader::from_bytes(br#"{"p2c":-1}"#).is_err());
        assert!(JweHeader::from_bytes(br#"{"apu":"not base64!"}"#).is_err());
        assert!(JweHeader::from_bytes(br#"{"epk":{"no_kty":true}}"#).is_err());
    }
}
