//! Typed media-type converters keyed by content-type, the seam the
//! engine uses to turn typed payloads into bytes and back. The registry
//! is passed explicitly; callers plug their own converters in.

use std::collections::HashMap;
use std::fmt::Debug;

use anyhow::{anyhow, bail};
use serde_json::Value;

use crate::JoseError;

pub trait MediaTypeConverter: Debug + Send + Sync {
    /// Return the media type the converter handles.
    fn media_type(&self) -> &str;

    /// Encode a typed value into payload bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, JoseError>;

    /// Decode payload bytes into a typed value.
    fn decode(&self, input: &[u8]) -> Result<Value, JoseError>;
}

/// application/json conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMediaTypeConverter;

impl MediaTypeConverter for JsonMediaTypeConverter {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, JoseError> {
        serde_json::to_vec(value).map_err(|err| JoseError::InvalidJson(err.into()))
    }

    fn decode(&self, input: &[u8]) -> Result<Value, JoseError> {
        serde_json::from_slice(input).map_err(|err| JoseError::InvalidJson(err.into()))
    }
}

/// text/plain conversion: the value must be a JSON string.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextMediaTypeConverter;

impl MediaTypeConverter for TextMediaTypeConverter {
    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, JoseError> {
        match value {
            Value::String(val) => Ok(val.as_bytes().to_vec()),
            _ => Err(JoseError::InvalidJson(anyhow!(
                "A text/plain payload must be a string."
            ))),
        }
    }

    fn decode(&self, input: &[u8]) -> Result<Value, JoseError> {
        (|| -> anyhow::Result<Value> {
            let val = std::str::from_utf8(input)?;
            Ok(Value::String(val.to_string()))
        })()
        .map_err(JoseError::InvalidJson)
    }
}

/// A converter registry keyed by content-type string. Lookup accepts the
/// shortened cty convention of RFC 7515 §4.1.10 ("json" for
/// "application/json").
#[derive(Debug)]
pub struct MediaTypeConverterRegistry {
    converters: HashMap<String, Box<dyn MediaTypeConverter>>,
}

impl MediaTypeConverterRegistry {
    /// Return an empty registry.
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Register a converter under its media type.
    pub fn register(&mut self, converter: Box<dyn MediaTypeConverter>) {
        self.converters
            .insert(converter.media_type().to_string(), converter);
    }

    /// Return the converter for a content type.
    pub fn get(&self, content_type: &str) -> Result<&dyn MediaTypeConverter, JoseError> {
        (|| -> anyhow::Result<&dyn MediaTypeConverter> {
            let normalized = if content_type.contains('/') {
                content_type.to_string()
            } else {
                format!("application/{}", content_type)
            };
            match self.converters.get(&normalized) {
                Some(val) => Ok(val.as_ref()),
                None => bail!("No converter for the content type: {}", content_type),
            }
        })()
        .map_err(JoseError::InvalidJson)
    }
}

impl Default for MediaTypeConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(JsonMediaTypeConverter));
        registry.register(Box::new(TextMediaTypeConverter));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_converter_round_trip() -> anyhow::Result<()> {
        let converter = JsonMediaTypeConverter;
        let value = json!({"a": 1, "b": "x"});
        let bytes = converter.encode(&value)?;
        assert_eq!(converter.decode(&bytes)?, value);
        Ok(())
    }

    #[test]
    fn test_registry_lookup_accepts_short_names() -> anyhow::Result<()> {
        let registry = MediaTypeConverterRegistry::default();
        assert_eq!(registry.get("json")?.media_type(), "application/json");
        assert_eq!(
            registry.get("application/json")?.media_type(),
            "application/json"
        );
        assert!(registry.get("application/xml").is_err());
        Ok(())
    }
}
