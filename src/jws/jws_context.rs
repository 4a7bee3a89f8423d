use std::collections::BTreeSet;

use anyhow::{anyhow, bail};
use serde_json::{Map, Value};

use crate::jwk::{Jwk, JwkService};
use crate::jws::{self, JwsHeader, JwsHeaderSet, JwsSigner, JwsVerifier};
use crate::{JoseError, JoseHeader};

/// Serialization and deserialization of JWS objects under a policy: which
/// critical header claims are acceptable and whether the "none" algorithm
/// may be used.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JwsContext {
    acceptable_criticals: BTreeSet<String>,
    allow_unsecured: bool,
}

impl JwsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test whether a critical header claim name is acceptable.
    pub fn is_acceptable_critical(&self, name: &str) -> bool {
        self.acceptable_criticals.contains(name)
    }

    /// Add an acceptable critical header claim name.
    pub fn add_acceptable_critical(&mut self, name: &str) {
        self.acceptable_criticals.insert(name.to_string());
    }

    /// Remove an acceptable critical header claim name.
    pub fn remove_acceptable_critical(&mut self, name: &str) {
        self.acceptable_criticals.remove(name);
    }

    /// Allow the "none" signature algorithm. Off by default; readers and
    /// writers reject unsecured objects unless this is set.
    pub fn set_allow_unsecured(&mut self, allow: bool) {
        self.allow_unsecured = allow;
    }

    pub fn is_unsecured_allowed(&self) -> bool {
        self.allow_unsecured
    }

    fn check_unsecured(&self, alg_name: &str) -> Result<(), JoseError> {
        if alg_name == "none" && !self.allow_unsecured {
            return Err(JoseError::UnsupportedAlgorithm(anyhow!(
                "The none algorithm must be explicitly allowed."
            )));
        }
        Ok(())
    }

    /// Check the crit closure: every listed name must be acceptable for
    /// this context or processed by the algorithm.
    fn check_critical(
        &self,
        claims: &Map<String, Value>,
        processed: &[&str],
    ) -> Result<(), JoseError> {
        if let Some(Value::Array(vals)) = claims.get("crit") {
            for val in vals {
                match val {
                    Value::String(name) => {
                        if name != "b64"
                            && !self.is_acceptable_critical(name)
                            && !processed.contains(&name.as_str())
                        {
                            return Err(JoseError::UnknownCritical(name.clone()));
                        }
                    }
                    _ => {
                        return Err(JoseError::InvalidJwsFormat(anyhow!(
                            "An element of the crit header claim must be a string."
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Return a representation of the data that is formatted by compact
    /// serialization.
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload data.
    /// * `header` - The JWS header claims.
    /// * `signer` - The JWS signer.
    pub fn serialize_compact(
        &self,
        payload: &[u8],
        header: &JwsHeader,
        signer: &dyn JwsSigner,
    ) -> Result<String, JoseError> {
        self.serialize_compact_with_selector(payload, header, |_header| Some(signer))
    }

    /// Return a detached compact representation: the payload part is left
    /// empty.
    pub fn serialize_compact_detached(
        &self,
        payload: &[u8],
        header: &JwsHeader,
        signer: &dyn JwsSigner,
    ) -> Result<String, JoseError> {
        let compact = self.serialize_compact(payload, header, signer)?;
        (|| -> anyhow::Result<String> {
            let mut parts = compact.split('.');
            let header_part = parts.next().unwrap_or("");
            let _payload = parts.next();
            let signature = parts.next().unwrap_or("");
            Ok(format!("{}..{}", header_part, signature))
        })()
        .map_err(JoseError::InvalidJwsFormat)
    }

    /// Return a representation of the data that is formatted by compact
    /// serialization.
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload data.
    /// * `header` - The JWS header claims.
    /// * `selector` - a function for selecting the signing algorithm.
    pub fn serialize_compact_with_selector<'a, F>(
        &self,
        payload: &[u8],
        header: &JwsHeader,
        selector: F,
    ) -> Result<String, JoseError>
    where
        F: Fn(&JwsHeader) -> Option<&'a dyn JwsSigner>,
    {
        (|| -> anyhow::Result<String> {
            let signer = match selector(header) {
                Some(val) => val,
                None => bail!("A signer is not found."),
            };

            self.check_unsecured(signer.algorithm().name())?;

            let mut claims = header.claims_set().clone();
            match claims.get("alg") {
                Some(Value::String(val)) if val == signer.algorithm().name() => {}
                Some(Value::String(val)) => {
                    bail!("The JWS alg header claim is mismatched: {}", val)
                }
                _ => {
                    claims.insert(
                        "alg".to_string(),
                        Value::String(signer.algorithm().name().to_string()),
                    );
                }
            }
            if !claims.contains_key("kid") {
                if let Some(key_id) = signer.key_id() {
                    claims.insert("kid".to_string(), Value::String(key_id.to_string()));
                }
            }

            self.check_critical(&claims, &signer.algorithm().processed_parameters())?;

            let mut b64 = true;
            if let Some(Value::Array(vals)) = claims.get("crit") {
                if vals.iter().any(|val| val == "b64") {
                    if let Some(Value::Bool(val)) = claims.get("b64") {
                        b64 = *val;
                    }
                }
            }

            let header_bytes = serde_json::to_vec(&claims)?;

            let mut message = String::new();
            base64::encode_config_buf(header_bytes, base64::URL_SAFE_NO_PAD, &mut message);
            message.push('.');
            if b64 {
                base64::encode_config_buf(payload, base64::URL_SAFE_NO_PAD, &mut message);
            } else {
                let payload = std::str::from_utf8(payload)?;
                if payload.contains('.') {
                    bail!("A JWS payload cannot contain dot.");
                }
                message.push_str(payload);
            }

            let signature = signer.sign(message.as_bytes())?;

            message.push('.');
            base64::encode_config_buf(signature, base64::URL_SAFE_NO_PAD, &mut message);

            Ok(message)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Sign with the first trusted key the service resolves for the
    /// header.
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload data.
    /// * `header` - The JWS header claims; must carry or imply alg.
    /// * `service` - The key resolution service.
    /// * `keys` - Candidate JWKs supplied by the caller.
    pub fn serialize_compact_with_service(
        &self,
        payload: &[u8],
        header: &JwsHeader,
        service: &JwkService,
        keys: &[Jwk],
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            let key = service.resolve_build_key(header, keys)?;
            let alg_name = match header.algorithm().or_else(|| key.algorithm()) {
                Some(val) => val.to_string(),
                None => bail!("The JWS alg header claim is required."),
            };
            self.check_unsecured(&alg_name)?;
            let alg = jws::algorithm_from_name(&alg_name)?;
            let signer = alg.signer_from_jwk(&key)?;
            let compact = self.serialize_compact(payload, header, &*signer)?;
            Ok(compact)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Return a representation of the data that is formatted by general
    /// json serialization.
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload data.
    /// * `signers` - The protected/unprotected headers and the signer for
    ///   each signature.
    pub fn serialize_general_json(
        &self,
        payload: &[u8],
        signers: &[(&JwsHeaderSet, &dyn JwsSigner)],
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            if signers.is_empty() {
                bail!("At least one signer is required.");
            }

            let payload_b64 = base64::encode_config(payload, base64::URL_SAFE_NO_PAD);

            let mut signatures: Vec<Value> = Vec::with_capacity(signers.len());
            for (header, signer) in signers {
                signatures.push(self.sign_json_recipient(&payload_b64, header, *signer)?);
            }

            let mut out = Map::new();
            out.insert("payload".to_string(), Value::String(payload_b64));
            out.insert("signatures".to_string(), Value::Array(signatures));
            Ok(serde_json::to_string(&out)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Return a representation of the data that is formatted by flattened
    /// json serialization.
    pub fn serialize_flattened_json(
        &self,
        payload: &[u8],
        header: &JwsHeaderSet,
        signer: &dyn JwsSigner,
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            let payload_b64 = base64::encode_config(payload, base64::URL_SAFE_NO_PAD);
            let signature = self.sign_json_recipient(&payload_b64, header, signer)?;

            let mut out = Map::new();
            out.insert("payload".to_string(), Value::String(payload_b64));
            if let Value::Object(map) = signature {
                for (key, value) in map {
                    out.insert(key, value);
                }
            }
            Ok(serde_json::to_string(&out)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Sign one recipient of a JSON serialization. The signing input is
    /// built from the recipient's own protected header.
    fn sign_json_recipient(
        &self,
        payload_b64: &str,
        header: &JwsHeaderSet,
        signer: &dyn JwsSigner,
    ) -> Result<Value, JoseError> {
        (|| -> anyhow::Result<Value> {
            self.check_unsecured(signer.algorithm().name())?;

            let mut protected = header.claims_set(true).clone();
            let unprotected = header.claims_set(false);

            if let Some(Value::Bool(false)) = protected.get("b64") {
                bail!("The unencoded payload mode is not supported in the JSON serialization.");
            }
            for key in unprotected.keys() {
                if protected.contains_key(key) {
                    bail!("A duplicate header claim exists: {}", key);
                }
            }
            if unprotected.contains_key("alg") {
                bail!("The JWS alg header claim must be in protected.");
            }

            match protected.get("alg") {
                Some(Value::String(val)) if val == signer.algorithm().name() => {}
                Some(Value::String(val)) => bail!("A signer is unmatched: {}", val),
                _ => {
                    protected.insert(
                        "alg".to_string(),
                        Value::String(signer.algorithm().name().to_string()),
                    );
                }
            }
            if !protected.contains_key("kid") && !unprotected.contains_key("kid") {
                if let Some(key_id) = signer.key_id() {
                    protected.insert("kid".to_string(), Value::String(key_id.to_string()));
                }
            }

            self.check_critical(&protected, &signer.algorithm().processed_parameters())?;

            let protected_bytes = serde_json::to_vec(&protected)?;
            let protected_b64 =
                base64::encode_config(&protected_bytes, base64::URL_SAFE_NO_PAD);

            let message = format!("{}.{}", protected_b64, payload_b64);
            let signature = signer.sign(message.as_bytes())?;

            let mut out = Map::new();
            out.insert("protected".to_string(), Value::String(protected_b64));
            if !unprotected.is_empty() {
                out.insert("header".to_string(), Value::Object(unprotected.clone()));
            }
            out.insert(
                "signature".to_string(),
                Value::String(base64::encode_config(signature, base64::URL_SAFE_NO_PAD)),
            );
            Ok(Value::Object(out))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Deserialize the input that is formatted by compact serialization.
    ///
    /// # Arguments
    ///
    /// * `input` - The input data.
    /// * `verifier` - The JWS verifier.
    pub fn deserialize_compact(
        &self,
        input: impl AsRef<[u8]>,
        verifier: &dyn JwsVerifier,
    ) -> Result<(Vec<u8>, JwsHeader), JoseError> {
        self.deserialize_compact_with_selector(input, |_header| Ok(Some(verifier)))
    }

    /// Deserialize the input that is formatted by compact serialization.
    ///
    /// # Arguments
    ///
    /// * `input` - The input data.
    /// * `selector` - a function for selecting the verifying algorithm.
    pub fn deserialize_compact_with_selector<'a, F>(
        &self,
        input: impl AsRef<[u8]>,
        selector: F,
    ) -> Result<(Vec<u8>, JwsHeader), JoseError>
    where
        F: Fn(&JwsHeader) -> Result<Option<&'a dyn JwsVerifier>, JoseError>,
    {
        (|| -> anyhow::Result<(Vec<u8>, JwsHeader)> {
            let input = input.as_ref();
            let indexes: Vec<usize> = input
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'.')
                .map(|(pos, _)| pos)
                .collect();
            if indexes.len() != 2 {
                bail!("The compact serialization form of JWS must be three parts separated by dot.");
            }

            let header = &input[..indexes[0]];
            let payload = &input[(indexes[0] + 1)..indexes[1]];
            let signature = &input[(indexes[1] + 1)..];

            let header = base64::decode_config(header, base64::URL_SAFE_NO_PAD)?;
            let header: Map<String, Value> = serde_json::from_slice(&header)?;
            let header = JwsHeader::from_map(header)?;

            let verifier = match selector(&header)? {
                Some(val) => val,
                None => bail!("A verifier is not found."),
            };

            self.check_unsecured(verifier.algorithm().name())?;

            match header.claim("alg") {
                Some(Value::String(val)) => {
                    let expected = verifier.algorithm().name();
                    if val != expected {
                        bail!("The JWS alg header claim is not {}: {}", expected, val);
                    }
                }
                Some(_) => bail!("The JWS alg header claim must be a string."),
                None => bail!("The JWS alg header claim is required."),
            }

            if let Some(expected) = verifier.key_id() {
                match header.key_id() {
                    Some(actual) if expected == actual => {}
                    Some(actual) => bail!("The JWS kid header claim is mismatched: {}", actual),
                    None => bail!("The JWS kid header claim is required."),
                }
            }

            self.check_critical(
                header.claims_set(),
                &verifier.algorithm().processed_parameters(),
            )?;

            let mut b64 = true;
            if let Some(vals) = header.critical() {
                if vals.contains(&"b64") {
                    if let Some(val) = header.base64url_encode_payload() {
                        b64 = val;
                    }
                }
            }

            let message = &input[..indexes[1]];
            let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD)?;
            verifier.verify(message, &signature)?;

            let payload = if b64 {
                base64::decode_config(payload, base64::URL_SAFE_NO_PAD)?
            } else {
                payload.to_vec()
            };

            Ok((payload, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Deserialize a detached compact input: the payload part is empty in
    /// the input and supplied externally.
    pub fn deserialize_compact_detached(
        &self,
        input: impl AsRef<[u8]>,
        payload: &[u8],
        verifier: &dyn JwsVerifier,
    ) -> Result<JwsHeader, JoseError> {
        (|| -> anyhow::Result<JwsHeader> {
            let input = std::str::from_utf8(input.as_ref())?;
            let parts: Vec<&str> = input.split('.').collect();
            if parts.len() != 3 {
                bail!("The compact serialization form of JWS must be three parts separated by dot.");
            }
            if !parts[1].is_empty() {
                bail!("The payload part of a detached JWS must be empty.");
            }
            let payload_b64 = base64::encode_config(payload, base64::URL_SAFE_NO_PAD);
            let rebuilt = format!("{}.{}.{}", parts[0], payload_b64, parts[2]);
            let (_, header) = self.deserialize_compact(rebuilt.as_bytes(), verifier)?;
            Ok(header)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }

    /// Verify a compact input against the trusted candidate keys, trying
    /// them in sequence. Untrusted keys never reach the cryptographic
    /// layer. Per-key failures are aggregated.
    pub fn deserialize_compact_with_keys(
        &self,
        input: impl AsRef<[u8]>,
        keys: &[Jwk],
    ) -> Result<(Vec<u8>, JwsHeader), JoseError> {
        let input = input.as_ref();
        let header = peek_compact_header(input)?;
        let alg_name = match header.algorithm() {
            Some(val) => val.to_string(),
            None => {
                return Err(JoseError::InvalidJwsFormat(anyhow!(
                    "The JWS alg header claim is required."
                )))
            }
        };
        self.check_unsecured(&alg_name)?;
        let alg = jws::algorithm_from_name(&alg_name)?;

        let candidates: Vec<&Jwk> = keys
            .iter()
            .filter(|key| key.is_trusted())
            .filter(|key| match (header.key_id(), key.key_id()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => true,
            })
            .filter(|key| match key.key_use() {
                Some(val) => val == "sig",
                None => true,
            })
            .filter(|key| key.is_for_key_operation("verify"))
            .collect();
        if candidates.is_empty() {
            return Err(JoseError::NoSuitableKey(anyhow!(
                "No trusted key is consistent with the JWS header."
            )));
        }

        let mut failures: Vec<String> = Vec::new();
        for key in candidates {
            let verifier = match alg.verifier_from_jwk(key) {
                Ok(val) => val,
                Err(err) => {
                    failures.push(err.to_string());
                    continue;
                }
            };
            match self.deserialize_compact(input, &*verifier) {
                Ok(result) => return Ok(result),
                Err(err) => failures.push(err.to_string()),
            }
        }
        Err(JoseError::SignatureVerificationFailed(anyhow!(
            "All candidate keys failed to verify: [{}]",
            failures.join("; ")
        )))
    }

    /// Verify a compact input with keys resolved through the service
    /// (store, resolver, header key material) in addition to the supplied
    /// keys.
    pub fn deserialize_compact_with_service(
        &self,
        input: impl AsRef<[u8]>,
        service: &JwkService,
        keys: &[Jwk],
    ) -> Result<(Vec<u8>, JwsHeader), JoseError> {
        let input = input.as_ref();
        let header = peek_compact_header(input)?;
        let candidates = service.resolve_verification_keys(&header, keys)?;
        self.deserialize_compact_with_keys(input, &candidates)
    }

    /// Deserialize the input that is formatted by json serialization.
    pub fn deserialize_json<'a>(
        &self,
        input: impl AsRef<[u8]>,
        verifier: &'a dyn JwsVerifier,
    ) -> Result<(Vec<u8>, JwsHeader), JoseError> {
        self.deserialize_json_with_selector(input, |header| {
            match header.algorithm() {
                Some(val) => {
                    if val != verifier.algorithm().name() {
                        return Ok(None);
                    }
                }
                _ => return Ok(None),
            }
            if let Some(expected) = verifier.key_id() {
                match header.key_id() {
                    Some(actual) if expected == actual => {}
                    _ => return Ok(None),
                }
            }
            Ok(Some(verifier))
        })
    }

    /// Deserialize the input that is formatted by json serialization.
    ///
    /// # Arguments
    ///
    /// * `input` - The input data.
    /// * `selector` - a function for selecting the verifying algorithm.
    pub fn deserialize_json_with_selector<'a, F>(
        &self,
        input: impl AsRef<[u8]>,
        selector: F,
    ) -> Result<(Vec<u8>, JwsHeader), JoseError>
    where
        F: Fn(&JwsHeader) -> Result<Option<&'a dyn JwsVerifier>, JoseError>,
    {
        (|| -> anyhow::Result<(Vec<u8>, JwsHeader)> {
            let input = input.as_ref();
            let mut map: Map<String, Value> = serde_json::from_slice(input)?;

            let payload_b64 = match map.remove("payload") {
                Some(Value::String(val)) => val,
                Some(_) => bail!("The payload field must be a string."),
                None => bail!("The payload field is required."),
            };

            let signatures: Vec<Map<String, Value>> = match map.remove("signatures") {
                Some(Value::Array(vals)) => {
                    let mut vec = Vec::with_capacity(vals.len());
                    for val in vals {
                        match val {
                            Value::Object(val) => vec.push(val),
                            _ => bail!("The signatures field must be an array of objects."),
                        }
                    }
                    vec
                }
                Some(_) => bail!("The signatures field must be an array."),
                None => vec![map],
            };

            for mut signature_entry in signatures {
                let unprotected = signature_entry.remove("header");

                let protected_b64 = match signature_entry.get("protected") {
                    Some(Value::String(val)) => val.clone(),
                    Some(_) => bail!("The protected field must be a string."),
                    None => bail!("The JWS alg header claim must be in protected."),
                };
                let protected_vec =
                    base64::decode_config(&protected_b64, base64::URL_SAFE_NO_PAD)?;
                let protected_map: Map<String, Value> = serde_json::from_slice(&protected_vec)?;

                if !protected_map.contains_key("alg") {
                    bail!("The JWS alg header claim must be in protected.");
                }

                let merged_map = match unprotected {
                    Some(Value::Object(val)) => {
                        let mut merged = protected_map.clone();
                        for (key, value) in val {
                            if merged.contains_key(&key) {
                                bail!("A duplicate header claim exists: {}", key);
                            }
                            merged.insert(key, value);
                        }
                        merged
                    }
                    Some(_) => bail!("The header field must be an object."),
                    None => protected_map.clone(),
                };

                let signature = match signature_entry.get("signature") {
                    Some(Value::String(val)) => {
                        base64::decode_config(val, base64::URL_SAFE_NO_PAD)?
                    }
                    Some(_) => bail!("The signature field must be a string."),
                    None => bail!("The signature field is required."),
                };

                let merged = JwsHeader::from_map(merged_map)?;
                let verifier = match selector(&merged)? {
                    Some(val) => val,
                    None => continue,
                };

                self.check_unsecured(verifier.algorithm().name())?;

                match merged.algorithm() {
                    Some(val) => {
                        let expected = verifier.algorithm().name();
                        if val != expected {
                            bail!("The JWS alg header claim is not {}: {}", expected, val);
                        }
                    }
                    None => bail!("The JWS alg header claim is required."),
                }

                self.check_critical(
                    &protected_map,
                    &verifier.algorithm().processed_parameters(),
                )?;

                let mut b64 = true;
                if let Some(Value::Array(vals)) = protected_map.get("crit") {
                    if vals.iter().any(|val| val == "b64") {
                        if let Some(Value::Bool(val)) = protected_map.get("b64") {
                            b64 = *val;
                        }
                    }
                }

                let message = format!("{}.{}", protected_b64, payload_b64);
                verifier.verify(message.as_bytes(), &signature)?;

                let payload = if b64 {
                    base64::decode_config(&payload_b64, base64::URL_SAFE_NO_PAD)?
                } else {
                    payload_b64.into_bytes()
                };

                return Ok((payload, merged));
            }

            bail!("A signature that matched the header claims is not found.");
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwsFormat(err),
        })
    }
}

/// Parse only the header part of a compact JWS.
fn peek_compact_header(input: &[u8]) -> Result<JwsHeader, JoseError> {
    (|| -> anyhow::Result<JwsHeader> {
        let end = input
            .iter()
            .position(|b| *b == b'.')
            .unwrap_or(input.len());
        let header = base64::decode_config(&input[..end], base64::URL_SAFE_NO_PAD)?;
        let header: Map<String, Value> = serde_json::from_slice(&header)?;
        let header = JwsHeader::from_map(header)?;
        Ok(header)
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InvalidJwsFormat(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::Jwk;
    use crate::jws::{self, JwsHeader, JwsHeaderSet, HS256, HS384};
    use serde_json::json;

    fn oct_jwk(kid: &str) -> Jwk {
        let mut jwk = Jwk::new("oct");
        jwk.set_key_id(kid);
        jwk.set_parameter(
            "k",
            Some(json!(base64::encode_config(
                b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
                base64::URL_SAFE_NO_PAD
            ))),
        )
        .unwrap();
        jwk
    }

    #[test]
    fn test_compact_round_trip() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let signer = HS256.signer_from_jwk(&jwk)?;
        let compact = jws::serialize_compact(b"test payload!", &header, &*signer)?;
        assert_eq!(compact.split('.').count(), 3);

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        let (payload, decoded) = jws::deserialize_compact(&compact, &*verifier)?;
        assert_eq!(payload, b"test payload!");
        assert_eq!(decoded.algorithm(), Some("HS256"));
        assert_eq!(decoded.token_type(), Some("JWT"));
        assert_eq!(decoded.key_id(), Some("k1"));
        Ok(())
    }

    #[test]
    fn test_compact_rejects_tampered_signature() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let header = JwsHeader::new();
        let signer = HS256.signer_from_jwk(&jwk)?;
        let compact = jws::serialize_compact(b"payload", &header, &*signer)?;

        let mut tampered = compact.into_bytes();
        let last = tampered.last_mut().unwrap();
        *last = if *last == b'A' { b'B' } else { b'A' };

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        assert!(jws::deserialize_compact(&tampered, &*verifier).is_err());
        Ok(())
    }

    #[test]
    fn test_detached_round_trip() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let header = JwsHeader::new();
        let signer = HS256.signer_from_jwk(&jwk)?;
        let detached = jws::serialize_compact_detached(b"payload", &header, &*signer)?;

        let parts: Vec<&str> = detached.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].is_empty());

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        let decoded = jws::deserialize_compact_detached(&detached, b"payload", &*verifier)?;
        assert_eq!(decoded.algorithm(), Some("HS256"));
        Ok(())
    }

    #[test]
    fn test_unknown_critical_is_rejected() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let mut header = JwsHeader::new();
        header.set_critical(&["http://example.com/custom"]);

        let signer = HS256.signer_from_jwk(&jwk)?;
        let context = JwsContext::new();
        match context.serialize_compact(b"payload", &header, &*signer) {
            Err(JoseError::UnknownCritical(name)) => {
                assert_eq!(name, "http://example.com/custom")
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut permissive = JwsContext::new();
        permissive.add_acceptable_critical("http://example.com/custom");
        let compact = permissive.serialize_compact(b"payload", &header, &*signer)?;

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        match context.deserialize_compact(&compact, &*verifier) {
            Err(JoseError::UnknownCritical(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        permissive.deserialize_compact(&compact, &*verifier)?;
        Ok(())
    }

    #[test]
    fn test_deserialize_with_keys_filters_untrusted() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let header = JwsHeader::new();
        let signer = HS256.signer_from_jwk(&jwk)?;
        let compact = jws::serialize_compact(b"payload", &header, &*signer)?;

        let context = JwsContext::new();
        match context.deserialize_compact_with_keys(&compact, &[jwk.clone()]) {
            Err(JoseError::NoSuitableKey(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut trusted = jwk;
        trusted.set_trusted(true);
        let (payload, _) = context.deserialize_compact_with_keys(&compact, &[trusted])?;
        assert_eq!(payload, b"payload");
        Ok(())
    }

    #[test]
    fn test_deserialize_with_keys_aggregates_failures() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let header = JwsHeader::new();
        let signer = HS256.signer_from_jwk(&jwk)?;
        let compact = jws::serialize_compact(b"payload", &header, &*signer)?;

        let mut wrong = Jwk::new("oct");
        wrong.set_parameter(
            "k",
            Some(json!(base64::encode_config(
                b"ffffffffffffffffffffffffffffffff",
                base64::URL_SAFE_NO_PAD
            ))),
        )?;
        wrong.set_trusted(true);

        let context = JwsContext::new();
        match context.deserialize_compact_with_keys(&compact, &[wrong]) {
            Err(JoseError::SignatureVerificationFailed(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_general_json_round_trip() -> anyhow::Result<()> {
        let jwk1 = oct_jwk("k1");
        let jwk2 = oct_jwk("k2");

        let mut header1 = JwsHeaderSet::new();
        header1.set_key_id("k1", true);
        header1.set_token_type("JWT", false);
        let signer1 = HS256.signer_from_jwk(&jwk1)?;

        let mut header2 = JwsHeaderSet::new();
        header2.set_key_id("k2", true);
        let signer2 = HS384.signer_from_jwk(&jwk2)?;

        let json = jws::serialize_general_json(
            b"test payload!",
            &[(&header1, &*signer1), (&header2, &*signer2)],
        )?;

        let verifier = HS384.verifier_from_jwk(&jwk2)?;
        let (payload, header) = jws::deserialize_json(json.as_bytes(), &*verifier)?;
        assert_eq!(payload, b"test payload!");
        assert_eq!(header.algorithm(), Some("HS384"));
        assert_eq!(header.key_id(), Some("k2"));
        Ok(())
    }

    #[test]
    fn test_flattened_json_round_trip() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let mut header = JwsHeaderSet::new();
        header.set_key_id("k1", true);
        header.set_token_type("JWT", false);
        let signer = HS256.signer_from_jwk(&jwk)?;

        let json = jws::serialize_flattened_json(b"test payload!", &header, &*signer)?;

        let parsed: serde_json::Value = serde_json::from_str(&json)?;
        assert!(parsed.get("signatures").is_none());
        assert!(parsed.get("protected").is_some());

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        let (payload, decoded) = jws::deserialize_json(json.as_bytes(), &*verifier)?;
        assert_eq!(payload, b"test payload!");
        assert_eq!(decoded.token_type(), Some("JWT"));
        Ok(())
    }

    #[test]
    fn test_json_rejects_duplicate_claims() -> anyhow::Result<()> {
        let jwk = oct_jwk("k1");
        let mut header = JwsHeaderSet::new();
        header.set_key_id("k1", true);
        let signer = HS256.signer_from_jwk(&jwk)?;
        let json = jws::serialize_flattened_json(b"p", &header, &*signer)?;

        // graft a duplicate kid into the unprotected header
        let mut parsed: Map<String, Value> = serde_json::from_str(&json)?;
        parsed.insert("header".to_string(), json!({"kid": "k1"}));
        let tampered = serde_json::to_string(&parsed)?;

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        assert!(jws::deserialize_json(tampered.as_bytes(), &*verifier).is_err());
        Ok(())
    }

    #[test]
    fn test_unsecured_requires_opt_in() -> anyhow::Result<()> {
        let header = JwsHeader::new();
        let signer = crate::jws::Unsecured.signer();

        let context = JwsContext::new();
        assert!(context
            .serialize_compact(b"payload", &header, &signer)
            .is_err());

        let mut permissive = JwsContext::new();
        permissive.set_allow_unsecured(true);
        let compact = permissive.serialize_compact(b"payload", &header, &signer)?;
        assert!(compact.ends_with('.'));

        let verifier = crate::jws::Unsecured.verifier();
        let (payload, _) = permissive.deserialize_compact(&compact, &verifier)?;
        assert_eq!(payload, b"payload");
        assert!(context.deserialize_compact(&compact, &verifier).is_err());
        Ok(())
    }
}
