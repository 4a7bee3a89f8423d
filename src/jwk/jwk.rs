use std::fmt::Display;

use anyhow::bail;
use serde_json::{Map, Value};

use crate::util::{self, HashAlgorithm};
use crate::JoseError;

/// Represent a JSON Web Key (RFC 7517).
///
/// The key carries an engine-level trust flag besides its JSON members: a
/// key is trusted when it came from the key store, was resolved by a key
/// resolver, was backed by a validated certificate chain or a whitelisted
/// JWK set URL, or was explicitly marked trusted. The flag is never
/// serialized.
#[derive(Debug, Clone)]
pub struct Jwk {
    map: Map<String, Value>,
    trusted: bool,
}

impl Jwk {
    /// Return a new JWK of the given key type.
    pub fn new(key_type: &str) -> Self {
        let mut map = Map::new();
        map.insert(
            "kty".to_string(),
            Value::String(key_type.to_string()),
        );
        Self {
            map,
            trusted: false,
        }
    }

    /// Return a new JWK parsed from a JSON representation.
    pub fn from_bytes(input: impl AsRef<[u8]>) -> Result<Self, JoseError> {
        let map = (|| -> anyhow::Result<Map<String, Value>> {
            let map: Map<String, Value> = serde_json::from_slice(input.as_ref())?;
            Ok(map)
        })()
        .map_err(JoseError::InvalidJson)?;
        Self::from_map(map)
    }

    /// Return a new JWK from a claims map.
    pub fn from_map(map: impl Into<Map<String, Value>>) -> Result<Self, JoseError> {
        let map: Map<String, Value> = map.into();
        Self::check_map(&map)?;
        Ok(Self {
            map,
            trusted: false,
        })
    }

    pub(crate) fn check_map(map: &Map<String, Value>) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            match map.get("kty") {
                Some(Value::String(_)) => {}
                Some(_) => bail!("The JWK kty parameter must be a string."),
                None => bail!("The JWK kty parameter is required."),
            }
            for (key, value) in map {
                match key.as_str() {
                    "use" | "alg" | "kid" | "x5u" | "crv" => match value {
                        Value::String(_) => {}
                        _ => bail!("The JWK {} parameter must be a string.", key),
                    },
                    "key_ops" => match value {
                        Value::Array(vals) => {
                            for val in vals {
                                match val {
                                    Value::String(_) => {}
                                    _ => bail!(
                                        "An element of the JWK {} parameter must be a string.",
                                        key
                                    ),
                                }
                            }
                        }
                        _ => bail!("The JWK {} parameter must be an array.", key),
                    },
                    "x5t" | "x5t#S256" => match value {
                        Value::String(val) => {
                            if !util::is_base64_url_safe_nopad(val) {
                                bail!("The JWK {} parameter must be a base64 string.", key);
                            }
                        }
                        _ => bail!("The JWK {} parameter must be a string.", key),
                    },
                    "x5c" => match value {
                        Value::Array(vals) => {
                            for val in vals {
                                match val {
                                    Value::String(_) => {}
                                    _ => bail!(
                                        "An element of the JWK {} parameter must be a string.",
                                        key
                                    ),
                                }
                            }
                        }
                        _ => bail!("The JWK {} parameter must be an array.", key),
                    },
                    _ => {}
                }
            }
            Ok(())
        })()
        .map_err(JoseError::InvalidJwkFormat)
    }

    /// Return the value for key type parameter (kty).
    pub fn key_type(&self) -> &str {
        match self.map.get("kty") {
            Some(Value::String(val)) => val,
            _ => unreachable!("kty is checked on construction"),
        }
    }

    /// Set a value for key use parameter (use).
    pub fn set_key_use(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.map.insert("use".to_string(), Value::String(value));
    }

    /// Return the value for key use parameter (use).
    pub fn key_use(&self) -> Option<&str> {
        match self.map.get("use") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set values for key operations parameter (key_ops).
    pub fn set_key_operations(&mut self, values: Vec<impl Into<String>>) {
        let mut vec = Vec::with_capacity(values.len());
        for val in values {
            vec.push(Value::String(val.into()));
        }
        self.map.insert("key_ops".to_string(), Value::Array(vec));
    }

    /// Return values for key operations parameter (key_ops).
    pub fn key_operations(&self) -> Option<Vec<&str>> {
        match self.map.get("key_ops") {
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

    /// Test whether the key may be used for the operation. A key without a
    /// key_ops parameter may be used for any operation.
    pub fn is_for_key_operation(&self, key_operation: &str) -> bool {
        match self.map.get("key_ops") {
            Some(Value::Array(vals)) => vals.iter().any(|val| match val {
                Value::String(val) => val == key_operation,
                _ => false,
            }),
            None => true,
            _ => false,
        }
    }

    /// Set a value for algorithm parameter (alg).
    pub fn set_algorithm(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.map.insert("alg".to_string(), Value::String(value));
    }

    /// Return the value for algorithm parameter (alg).
    pub fn algorithm(&self) -> Option<&str> {
        match self.map.get("alg") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for key ID parameter (kid).
    pub fn set_key_id(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.map.insert("kid".to_string(), Value::String(value));
    }

    /// Return the value for key ID parameter (kid).
    pub fn key_id(&self) -> Option<&str> {
        match self.map.get("kid") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set a value for X.509 URL parameter (x5u).
    pub fn set_x509_url(&mut self, value: impl Into<String>) {
        let value: String = value.into();
        self.map.insert("x5u".to_string(), Value::String(value));
    }

    /// Return the value for X.509 URL parameter (x5u).
    pub fn x509_url(&self) -> Option<&str> {
        match self.map.get("x5u") {
            Some(Value::String(val)) => Some(val),
            _ => None,
        }
    }

    /// Set values for X.509 certificate chain parameter (x5c).
    pub fn set_x509_certificate_chain(&mut self, values: &[impl AsRef<[u8]>]) {
        let mut vec = Vec::with_capacity(values.len());
        for val in values {
            vec.push(Value::String(base64::encode_config(
                val.as_ref(),
                base64::STANDARD,
            )));
        }
        self.map.insert("x5c".to_string(), Value::Array(vec));
    }

    /// Return values for X.509 certificate chain parameter (x5c).
    pub fn x509_certificate_chain(&self) -> Option<Vec<Vec<u8>>> {
        match self.map.get("x5c") {
            Some(Value::Array(vals)) => {
                let mut vec = Vec::with_capacity(vals.len());
                for val in vals {
                    match val {
                        Value::String(val) => {
                            match base64::decode_config(val, base64::STANDARD) {
                                Ok(val) => vec.push(val),
                                Err(_) => return None,
                            }
                        }
                        _ => return None,
                    }
                }
                Some(vec)
            }
            _ => None,
        }
    }

    /// Set a value for X.509 certificate SHA-1 thumbprint parameter (x5t).
    pub fn set_x509_certificate_sha1_thumbprint(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.map.insert("x5t".to_string(), Value::String(val));
    }

    /// Return the value for X.509 certificate SHA-1 thumbprint parameter
    /// (x5t).
    pub fn x509_certificate_sha1_thumbprint(&self) -> Option<Vec<u8>> {
        match self.map.get("x5t") {
            Some(Value::String(val)) => {
                match base64::decode_config(val, base64::URL_SAFE_NO_PAD) {
                    Ok(val) => Some(val),
                    Err(_) => None,
                }
            }
            _ => None,
        }
    }

    /// Set a value for X.509 certificate SHA-256 thumbprint parameter
    /// (x5t#S256).
    pub fn set_x509_certificate_sha256_thumbprint(&mut self, value: impl AsRef<[u8]>) {
        let val = base64::encode_config(value.as_ref(), base64::URL_SAFE_NO_PAD);
        self.map.insert("x5t#S256".to_string(), Value::String(val));
    }

    /// Return the value for X.509 certificate SHA-256 thumbprint parameter
    /// (x5t#S256).
    pub fn x509_certificate_sha256_thumbprint(&self) -> Option<Vec<u8>> {
        match self.map.get("x5t#S256") {
            Some(Value::String(val)) => {
                match base64::decode_config(val, base64::URL_SAFE_NO_PAD) {
                    Ok(val) => Some(val),
                    Err(_) => None,
                }
            }
            _ => None,
        }
    }

    /// Return the value of the parameter of the specified key.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Set a value for the parameter of the specified key. A None value
    /// removes the parameter.
    pub fn set_parameter(&mut self, key: &str, value: Option<Value>) -> Result<(), JoseError> {
        match value {
            Some(val) => {
                let mut map = self.map.clone();
                map.insert(key.to_string(), val);
                Self::check_map(&map)?;
                self.map = map;
            }
            None => {
                if key == "kty" {
                    return Err(JoseError::InvalidJwkFormat(anyhow::anyhow!(
                        "The JWK kty parameter cannot be removed."
                    )));
                }
                self.map.remove(key);
            }
        }
        Ok(())
    }

    /// Whether the key's provenance makes it acceptable for build and read
    /// operations.
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// Explicitly mark the key trusted or untrusted.
    pub fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    /// Test whether the key carries private or secret material.
    pub fn is_private(&self) -> bool {
        match self.key_type() {
            "oct" => self.map.contains_key("k"),
            _ => self.map.contains_key("d"),
        }
    }

    /// Return the public form of the key, with private members stripped.
    /// A symmetric key has no public form.
    pub fn to_public_key(&self) -> Option<Jwk> {
        let keys: &[&str] = match self.key_type() {
            "RSA" => &["kty", "use", "key_ops", "alg", "kid", "x5u", "x5c", "x5t", "x5t#S256", "n", "e"],
            "EC" => &["kty", "use", "key_ops", "alg", "kid", "x5u", "x5c", "x5t", "x5t#S256", "crv", "x", "y"],
            "OKP" => &["kty", "use", "key_ops", "alg", "kid", "x5u", "x5c", "x5t", "x5t#S256", "crv", "x"],
            _ => return None,
        };
        let mut map = Map::new();
        for key in keys {
            if let Some(val) = self.map.get(*key) {
                map.insert(key.to_string(), val.clone());
            }
        }
        Some(Self {
            map,
            trusted: self.trusted,
        })
    }

    /// Return the minified JWK: only the members RFC 7638 requires for the
    /// key type, in canonical order.
    pub fn minified(&self) -> Result<Map<String, Value>, JoseError> {
        (|| -> anyhow::Result<Map<String, Value>> {
            let keys: &[&str] = match self.key_type() {
                "EC" => &["crv", "kty", "x", "y"],
                "RSA" => &["e", "kty", "n"],
                "oct" => &["k", "kty"],
                "OKP" => &["crv", "kty", "x"],
                val => bail!("Unsupported kty for a thumbprint: {}", val),
            };
            let mut map = Map::new();
            for key in keys {
                match self.map.get(*key) {
                    Some(val) => {
                        map.insert(key.to_string(), val.clone());
                    }
                    None => bail!("A parameter {} is required for a thumbprint.", key),
                }
            }
            Ok(map)
        })()
        .map_err(JoseError::InvalidJwkFormat)
    }

    /// Return the RFC 7638 thumbprint of the key.
    pub fn thumbprint(&self, hash: HashAlgorithm) -> Result<Vec<u8>, JoseError> {
        let minified = self.minified()?;
        let json = (|| -> anyhow::Result<Vec<u8>> {
            let json = serde_json::to_vec(&minified)?;
            Ok(json)
        })()
        .map_err(JoseError::InvalidJson)?;
        let digest = openssl::hash::hash(hash.message_digest(), &json)
            .map_err(|err| JoseError::InvalidJwkFormat(err.into()))?;
        Ok(digest.to_vec())
    }

    /// Return the SHA-256 thumbprint of the key, Base64URL encoded without
    /// padding.
    pub fn key_thumbprint(&self) -> Result<String, JoseError> {
        let digest = self.thumbprint(HashAlgorithm::Sha256)?;
        Ok(base64::encode_config(digest, base64::URL_SAFE_NO_PAD))
    }
}

impl PartialEq for Jwk {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl Eq for Jwk {}

impl AsRef<Map<String, Value>> for Jwk {
    fn as_ref(&self) -> &Map<String, Value> {
        &self.map
    }
}

impl From<Jwk> for Map<String, Value> {
    fn from(jwk: Jwk) -> Self {
        jwk.map
    }
}

impl Display for Jwk {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let val = serde_json::to_string(&self.map).map_err(|_| std::fmt::Error {})?;
        fmt.write_str(&val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_jwk() -> anyhow::Result<()> {
        let mut jwk = Jwk::new("oct");
        jwk.set_key_use("sig");
        jwk.set_key_id("k1");
        jwk.set_parameter("k", Some(json!("c2VjcmV0")))?;

        assert_eq!(jwk.key_type(), "oct");
        assert_eq!(jwk.key_use(), Some("sig"));
        assert_eq!(jwk.key_id(), Some("k1"));
        assert!(jwk.is_private());
        assert!(!jwk.is_trusted());
        Ok(())
    }

    #[test]
    fn test_from_bytes_requires_kty() {
        assert!(Jwk::from_bytes(br#"{"kid":"k1"}"#).is_err());
        assert!(Jwk::from_bytes(br#"{"kty":"oct"}"#).is_ok());
    }

    #[test]
    fn test_key_operations() -> anyhow::Result<()> {
        let mut jwk = Jwk::new("oct");
        assert!(jwk.is_for_key_operation("sign"));
        jwk.set_key_operations(vec!["sign", "verify"]);
        assert!(jwk.is_for_key_operation("sign"));
        assert!(!jwk.is_for_key_operation("encrypt"));
        Ok(())
    }

    #[test]
    fn test_to_public_key_strips_private_members() -> anyhow::Result<()> {
        let jwk = Jwk::from_bytes(
            br#"{"kty":"EC","crv":"P-256","x":"eA","y":"eQ","d":"ZA","kid":"k1"}"#,
        )?;
        let public = jwk.to_public_key().unwrap();
        assert_eq!(public.parameter("x"), Some(&json!("eA")));
        assert_eq!(public.parameter("d"), None);
        assert_eq!(public.key_id(), Some("k1"));

        let oct = Jwk::from_bytes(br#"{"kty":"oct","k":"c2VjcmV0"}"#)?;
        assert!(oct.to_public_key().is_none());
        Ok(())
    }

    #[test]
    fn test_rfc7638_thumbprint() -> anyhow::Result<()> {
        // the RFC 7638 §3.1 example key
        let jwk = Jwk::from_bytes(
            br#"{
            "kty": "RSA",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB",
            "alg": "RS256",
            "kid": "2011-04-29"
            }"#,
        )?;
        assert_eq!(jwk.key_thumbprint()?, "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs");
        Ok(())
    }

    #[test]
    fn test_display_round_trip() -> anyhow::Result<()> {
        let jwk = Jwk::from_bytes(br#"{"kty":"oct","k":"c2VjcmV0","kid":"k1"}"#)?;
        let clone = Jwk::from_bytes(jwk.to_string().as_bytes())?;
        assert_eq!(jwk, clone);
        Ok(())
    }
}
