use std::borrow::Cow;
use std::collections::BTreeSet;

use anyhow::{anyhow, bail};
use serde_json::{Map, Value};

use crate::jwe::{self, JweDecrypter, JweEncrypter, JweHeader, JweHeaderSet};
use crate::jwk::{Jwk, JwkService};
use crate::util;
use crate::{JoseError, JoseHeader};

/// Serialization and deserialization of JWE objects under a policy of
/// acceptable critical header claims.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct JweContext {
    acceptable_criticals: BTreeSet<String>,
}

impl JweContext {
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
                        if !self.is_acceptable_critical(name)
                            && !processed.contains(&name.as_str())
                        {
                            return Err(JoseError::UnknownCritical(name.clone()));
                        }
                    }
                    _ => {
                        return Err(JoseError::InvalidJweFormat(anyhow!(
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
    /// * `header` - The JWE header claims.
    /// * `encrypter` - The JWE encrypter.
    pub fn serialize_compact(
        &self,
        payload: &[u8],
        header: &JweHeader,
        encrypter: &dyn JweEncrypter,
    ) -> Result<String, JoseError> {
        self.serialize_compact_with_selector(payload, header, |_header| Some(encrypter))
    }

    /// Return a representation of the data that is formatted by compact
    /// serialization.
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload data.
    /// * `header` - The JWE header claims.
    /// * `selector` - a function for selecting the encrypting algorithm.
    pub fn serialize_compact_with_selector<'a, F>(
        &self,
        payload: &[u8],
        header: &JweHeader,
        selector: F,
    ) -> Result<String, JoseError>
    where
        F: Fn(&JweHeader) -> Option<&'a dyn JweEncrypter>,
    {
        (|| -> anyhow::Result<String> {
            let encrypter = match selector(header) {
                Some(val) => val,
                None => bail!("A encrypter is not found."),
            };

            let mut merged = header.clone();
            match merged.algorithm() {
                Some(val) if val == encrypter.algorithm().name() => {}
                Some(val) => bail!("The JWE alg header claim is mismatched: {}", val),
                None => merged.set_algorithm(encrypter.algorithm().name()),
            }
            if merged.key_id().is_none() {
                if let Some(key_id) = encrypter.key_id() {
                    merged.set_key_id(key_id);
                }
            }

            let enc_name = match merged.content_encryption() {
                Some(val) => val.to_string(),
                None => bail!("The JWE enc header claim is required."),
            };
            let cipher = jwe::content_encryption_from_name(&enc_name)?;
            let compression = match merged.compression() {
                Some(val) => Some(jwe::compression_from_name(val)?),
                None => None,
            };

            self.check_critical(
                merged.claims_set(),
                &encrypter.algorithm().processed_parameters(),
            )?;

            let cek = match encrypter.compute_content_encryption_key(&*cipher, &mut merged)? {
                Some(val) => val.into_owned(),
                None => util::random_bytes(cipher.key_len()),
            };
            let encrypted_key = encrypter.encrypt(&cek, &*cipher, &mut merged)?;

            let content = match &compression {
                Some(zip) => Cow::Owned(zip.compress(payload)?),
                None => Cow::Borrowed(payload),
            };

            // the encoded header is captured once and reused as AAD
            let header_bytes = serde_json::to_vec(merged.claims_set())?;
            let header_b64 = base64::encode_config(&header_bytes, base64::URL_SAFE_NO_PAD);

            let iv = if cipher.iv_len() > 0 {
                Some(util::random_bytes(cipher.iv_len()))
            } else {
                None
            };

            let (ciphertext, tag) =
                cipher.encrypt(&cek, iv.as_deref(), &content, header_b64.as_bytes())?;

            let mut message = header_b64;
            message.push('.');
            if let Some(encrypted_key) = &encrypted_key {
                base64::encode_config_buf(encrypted_key, base64::URL_SAFE_NO_PAD, &mut message);
            }
            message.push('.');
            if let Some(iv) = &iv {
                base64::encode_config_buf(iv, base64::URL_SAFE_NO_PAD, &mut message);
            }
            message.push('.');
            base64::encode_config_buf(&ciphertext, base64::URL_SAFE_NO_PAD, &mut message);
            message.push('.');
            if let Some(tag) = &tag {
                base64::encode_config_buf(tag, base64::URL_SAFE_NO_PAD, &mut message);
            }

            Ok(message)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }

    /// Encrypt to the first trusted key the service resolves for the
    /// header.
    pub fn serialize_compact_with_service(
        &self,
        payload: &[u8],
        header: &JweHeader,
        service: &JwkService,
        keys: &[Jwk],
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            let key = service.resolve_build_key(header, keys)?;
            let alg_name = match header.algorithm().or_else(|| key.algorithm()) {
                Some(val) => val.to_string(),
                None => bail!("The JWE alg header claim is required."),
            };
            let alg = jwe::algorithm_from_name(&alg_name)?;
            let encrypter = alg.encrypter_from_jwk(&key)?;
            let compact = self.serialize_compact(payload, header, &*encrypter)?;
            Ok(compact)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }

    /// Return a representation of the data that is formatted by general
    /// json serialization. All recipients share one CEK; only the key
    /// management material differs per recipient.
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload data.
    /// * `header` - The shared protected and unprotected header claims.
    /// * `recipients` - The per-recipient header claims and encrypters.
    /// * `aad` - Additional authenticated data.
    pub fn serialize_general_json(
        &self,
        payload: &[u8],
        header: Option<&JweHeaderSet>,
        recipients: &[(Option<&JweHeader>, &dyn JweEncrypter)],
        aad: Option<&[u8]>,
    ) -> Result<String, JoseError> {
        let map = self.serialize_json_map(payload, header, recipients, aad)?;
        serde_json::to_string(&map)
            .map_err(|err| JoseError::InvalidJweFormat(err.into()))
    }

    /// Return a representation of the data that is formatted by flattened
    /// json serialization.
    pub fn serialize_flattened_json(
        &self,
        payload: &[u8],
        header: Option<&JweHeaderSet>,
        recipient_header: Option<&JweHeader>,
        aad: Option<&[u8]>,
        encrypter: &dyn JweEncrypter,
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            let mut map =
                self.serialize_json_map(payload, header, &[(recipient_header, encrypter)], aad)?;
            let recipients = match map.remove("recipients") {
                Some(Value::Array(vals)) => vals,
                _ => bail!("A recipient is missing."),
            };
            if let Some(Value::Object(recipient)) = recipients.into_iter().next() {
                for (key, value) in recipient {
                    map.insert(key, value);
                }
            }
            Ok(serde_json::to_string(&map)?)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }

    fn serialize_json_map(
        &self,
        payload: &[u8],
        header: Option<&JweHeaderSet>,
        recipients: &[(Option<&JweHeader>, &dyn JweEncrypter)],
        aad: Option<&[u8]>,
    ) -> Result<Map<String, Value>, JoseError> {
        (|| -> anyhow::Result<Map<String, Value>> {
            if recipients.is_empty() {
                bail!("At least one recipient is required.");
            }

            let protected_map = header
                .map(|set| set.claims_set(true).clone())
                .unwrap_or_default();
            let unprotected_map = header
                .map(|set| set.claims_set(false).clone())
                .unwrap_or_default();

            let enc_name = match protected_map.get("enc") {
                Some(Value::String(val)) => val.clone(),
                Some(_) => bail!("The JWE enc header claim must be a string."),
                None => bail!("The JWE enc header claim must be in protected."),
            };
            let cipher = jwe::content_encryption_from_name(&enc_name)?;
            let compression = match protected_map.get("zip") {
                Some(Value::String(val)) => Some(jwe::compression_from_name(val)?),
                Some(_) => bail!("The JWE zip header claim must be a string."),
                None => None,
            };

            self.check_critical(&protected_map, &[])?;

            let mut recipient_headers: Vec<JweHeader> = Vec::with_capacity(recipients.len());
            for (recipient_header, encrypter) in recipients {
                let mut claims = recipient_header
                    .map(|h| h.claims_set().clone())
                    .unwrap_or_default();
                for key in claims.keys() {
                    if protected_map.contains_key(key) || unprotected_map.contains_key(key) {
                        bail!("A duplicate header claim exists: {}", key);
                    }
                }
                let alg_claim = claims
                    .get("alg")
                    .or_else(|| protected_map.get("alg"))
                    .or_else(|| unprotected_map.get("alg"));
                match alg_claim {
                    Some(Value::String(val)) if val == encrypter.algorithm().name() => {}
                    Some(_) => bail!("A encrypter is unmatched."),
                    None => {
                        claims.insert(
                            "alg".to_string(),
                            Value::String(encrypter.algorithm().name().to_string()),
                        );
                    }
                }
                if !claims.contains_key("kid")
                    && !protected_map.contains_key("kid")
                    && !unprotected_map.contains_key("kid")
                {
                    if let Some(key_id) = encrypter.key_id() {
                        claims.insert("kid".to_string(), Value::String(key_id.to_string()));
                    }
                }
                recipient_headers.push(JweHeader::from_map(claims)?);
            }

            // a direct or agreement recipient dictates the shared CEK
            let mut cek: Option<Vec<u8>> = None;
            for (i, (_, encrypter)) in recipients.iter().enumerate() {
                if let Some(val) = encrypter
                    .compute_content_encryption_key(&*cipher, &mut recipient_headers[i])?
                {
                    match &cek {
                        Some(existing) if existing.as_slice() == val.as_ref() => {}
                        Some(_) => bail!("The recipients disagree on the content encryption key."),
                        None => cek = Some(val.into_owned()),
                    }
                }
            }
            let cek = match cek {
                Some(val) => val,
                None => util::random_bytes(cipher.key_len()),
            };

            let mut encrypted_keys: Vec<Option<Vec<u8>>> = Vec::with_capacity(recipients.len());
            for (i, (_, encrypter)) in recipients.iter().enumerate() {
                encrypted_keys.push(encrypter.encrypt(&cek, &*cipher, &mut recipient_headers[i])?);
            }

            let content = match &compression {
                Some(zip) => Cow::Owned(zip.compress(payload)?),
                None => Cow::Borrowed(payload),
            };

            let protected_b64 = if protected_map.is_empty() {
                String::new()
            } else {
                let protected_bytes = serde_json::to_vec(&protected_map)?;
                base64::encode_config(&protected_bytes, base64::URL_SAFE_NO_PAD)
            };

            let aad_b64 = aad.map(|val| base64::encode_config(val, base64::URL_SAFE_NO_PAD));
            let mut full_aad = protected_b64.clone();
            if let Some(aad_b64) = &aad_b64 {
                full_aad.push('.');
                full_aad.push_str(aad_b64);
            }

            let iv = if cipher.iv_len() > 0 {
                Some(util::random_bytes(cipher.iv_len()))
            } else {
                None
            };

            let (ciphertext, tag) =
                cipher.encrypt(&cek, iv.as_deref(), &content, full_aad.as_bytes())?;

            let mut out = Map::new();
            if !protected_b64.is_empty() {
                out.insert("protected".to_string(), Value::String(protected_b64));
            }
            if !unprotected_map.is_empty() {
                out.insert("unprotected".to_string(), Value::Object(unprotected_map));
            }
            let mut recipient_values = Vec::with_capacity(recipients.len());
            for (header, encrypted_key) in recipient_headers.iter().zip(&encrypted_keys) {
                let mut entry = Map::new();
                if !header.claims_set().is_empty() {
                    entry.insert(
                        "header".to_string(),
                        Value::Object(header.claims_set().clone()),
                    );
                }
                if let Some(encrypted_key) = encrypted_key {
                    entry.insert(
                        "encrypted_key".to_string(),
                        Value::String(base64::encode_config(
                            encrypted_key,
                            base64::URL_SAFE_NO_PAD,
                        )),
                    );
                }
                recipient_values.push(Value::Object(entry));
            }
            out.insert("recipients".to_string(), Value::Array(recipient_values));
            if let Some(aad_b64) = aad_b64 {
                out.insert("aad".to_string(), Value::String(aad_b64));
            }
            if let Some(iv) = &iv {
                out.insert(
                    "iv".to_string(),
                    Value::String(base64::encode_config(iv, base64::URL_SAFE_NO_PAD)),
                );
            }
            out.insert(
                "ciphertext".to_string(),
                Value::String(base64::encode_config(&ciphertext, base64::URL_SAFE_NO_PAD)),
            );
            if let Some(tag) = &tag {
                out.insert(
                    "tag".to_string(),
                    Value::String(base64::encode_config(tag, base64::URL_SAFE_NO_PAD)),
                );
            }
            Ok(out)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }

    /// Deserialize the input that is formatted by compact serialization.
    ///
    /// # Arguments
    ///
    /// * `input` - The input data.
    /// * `decrypter` - The JWE decrypter.
    pub fn deserialize_compact(
        &self,
        input: &str,
        decrypter: &dyn JweDecrypter,
    ) -> Result<(Vec<u8>, JweHeader), JoseError> {
        self.deserialize_compact_with_selector(input, |_header| Ok(Some(decrypter)))
    }

    /// Deserialize the input that is formatted by compact serialization.
    ///
    /// # Arguments
    ///
    /// * `input` - The input data.
    /// * `selector` - a function for selecting the decrypting algorithm.
    pub fn deserialize_compact_with_selector<'a, F>(
        &self,
        input: &str,
        selector: F,
    ) -> Result<(Vec<u8>, JweHeader), JoseError>
    where
        F: Fn(&JweHeader) -> Result<Option<&'a dyn JweDecrypter>, JoseError>,
    {
        (|| -> anyhow::Result<(Vec<u8>, JweHeader)> {
            let parts: Vec<&str> = input.split('.').collect();
            if parts.len() != 5 {
                bail!("The compact serialization form of JWE must be five parts separated by dot.");
            }

            let header_b64 = parts[0];
            let header = base64::decode_config(header_b64, base64::URL_SAFE_NO_PAD)?;
            let header: Map<String, Value> = serde_json::from_slice(&header)?;
            let header = JweHeader::from_map(header)?;

            let decrypter = match selector(&header)? {
                Some(val) => val,
                None => bail!("A decrypter is not found."),
            };

            match header.algorithm() {
                Some(val) => {
                    let expected = decrypter.algorithm().name();
                    if val != expected {
                        bail!("The JWE alg header claim is not {}: {}", expected, val);
                    }
                }
                None => bail!("The JWE alg header claim is required."),
            }

            if let Some(expected) = decrypter.key_id() {
                match header.key_id() {
                    Some(actual) if expected == actual => {}
                    Some(actual) => bail!("The JWE kid header claim is mismatched: {}", actual),
                    None => bail!("The JWE kid header claim is required."),
                }
            }

            self.check_critical(
                header.claims_set(),
                &decrypter.algorithm().processed_parameters(),
            )?;

            let enc_name = match header.content_encryption() {
                Some(val) => val.to_string(),
                None => bail!("The JWE enc header claim is required."),
            };
            let cipher = jwe::content_encryption_from_name(&enc_name)?;
            let compression = match header.compression() {
                Some(val) => Some(jwe::compression_from_name(val)?),
                None => None,
            };

            let encrypted_key = if parts[1].is_empty() {
                None
            } else {
                Some(base64::decode_config(parts[1], base64::URL_SAFE_NO_PAD)?)
            };
            let iv = if parts[2].is_empty() {
                None
            } else {
                Some(base64::decode_config(parts[2], base64::URL_SAFE_NO_PAD)?)
            };
            let ciphertext = base64::decode_config(parts[3], base64::URL_SAFE_NO_PAD)?;
            let tag = if parts[4].is_empty() {
                None
            } else {
                Some(base64::decode_config(parts[4], base64::URL_SAFE_NO_PAD)?)
            };

            let cek = decrypter.decrypt(encrypted_key.as_deref(), &*cipher, &header)?;

            let content = cipher.decrypt(
                &cek,
                iv.as_deref(),
                &ciphertext,
                header_b64.as_bytes(),
                tag.as_deref(),
            )?;

            let content = match &compression {
                Some(zip) => zip.decompress(&content)?,
                None => content,
            };

            Ok((content, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }

    /// Decrypt a compact input against the trusted candidate keys, trying
    /// them in sequence. Untrusted keys never reach the cryptographic
    /// layer.
    pub fn deserialize_compact_with_keys(
        &self,
        input: &str,
        keys: &[Jwk],
    ) -> Result<(Vec<u8>, JweHeader), JoseError> {
        let header = peek_compact_header(input)?;
        let alg_name = match header.algorithm() {
            Some(val) => val.to_string(),
            None => {
                return Err(JoseError::InvalidJweFormat(anyhow!(
                    "The JWE alg header claim is required."
                )))
            }
        };
        let alg = jwe::algorithm_from_name(&alg_name)?;

        let candidates: Vec<&Jwk> = keys
            .iter()
            .filter(|key| key.is_trusted())
            .filter(|key| match (header.key_id(), key.key_id()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => true,
            })
            .filter(|key| match key.key_use() {
                Some(val) => val == "enc",
                None => true,
            })
            .collect();
        if candidates.is_empty() {
            return Err(JoseError::NoSuitableKey(anyhow!(
                "No trusted key is consistent with the JWE header."
            )));
        }

        for key in candidates {
            let decrypter = match alg.decrypter_from_jwk(key) {
                Ok(val) => val,
                Err(_) => continue,
            };
            if let Ok(result) = self.deserialize_compact(input, &*decrypter) {
                return Ok(result);
            }
        }
        // per-key failure causes are never distinguished
        Err(JoseError::DecryptionFailed)
    }

    /// Decrypt a compact input with keys resolved through the service in
    /// addition to the supplied keys.
    pub fn deserialize_compact_with_service(
        &self,
        input: &str,
        service: &JwkService,
        keys: &[Jwk],
    ) -> Result<(Vec<u8>, JweHeader), JoseError> {
        let header = peek_compact_header(input)?;
        let candidates = service.resolve_verification_keys(&header, keys)?;
        self.deserialize_compact_with_keys(input, &candidates)
    }

    /// Deserialize the input that is formatted by json serialization.
    pub fn deserialize_json<'a>(
        &self,
        input: &str,
        decrypter: &'a dyn JweDecrypter,
    ) -> Result<(Vec<u8>, JweHeader), JoseError> {
        self.deserialize_json_with_selector(input, |header| {
            match header.algorithm() {
                Some(val) => {
                    if val != decrypter.algorithm().name() {
                        return Ok(None);
                    }
                }
                None => return Ok(None),
            }
            if let Some(expected) = decrypter.key_id() {
                match header.key_id() {
                    Some(actual) if expected == actual => {}
                    _ => return Ok(None),
                }
            }
            Ok(Some(decrypter))
        })
    }

    /// Deserialize the input that is formatted by json serialization.
    ///
    /// # Arguments
    ///
    /// * `input` - The input data.
    /// * `selector` - a function for selecting the decrypting algorithm.
    pub fn deserialize_json_with_selector<'a, F>(
        &self,
        input: &str,
        selector: F,
    ) -> Result<(Vec<u8>, JweHeader), JoseError>
    where
        F: Fn(&JweHeader) -> Result<Option<&'a dyn JweDecrypter>, JoseError>,
    {
        (|| -> anyhow::Result<(Vec<u8>, JweHeader)> {
            let mut map: Map<String, Value> = serde_json::from_str(input)?;

            let protected_b64 = match map.remove("protected") {
                Some(Value::String(val)) => val,
                Some(_) => bail!("The protected field must be a string."),
                None => String::new(),
            };
            let protected_map: Map<String, Value> = if protected_b64.is_empty() {
                Map::new()
            } else {
                let protected_vec =
                    base64::decode_config(&protected_b64, base64::URL_SAFE_NO_PAD)?;
                serde_json::from_slice(&protected_vec)?
            };

            let unprotected_map = match map.remove("unprotected") {
                Some(Value::Object(val)) => val,
                Some(_) => bail!("The unprotected field must be an object."),
                None => Map::new(),
            };

            let aad_b64 = match map.remove("aad") {
                Some(Value::String(val)) => Some(val),
                Some(_) => bail!("The aad field must be a string."),
                None => None,
            };

            let iv = match map.remove("iv") {
                Some(Value::String(val)) => {
                    Some(base64::decode_config(&val, base64::URL_SAFE_NO_PAD)?)
                }
                Some(_) => bail!("The iv field must be a string."),
                None => None,
            };
            let ciphertext = match map.remove("ciphertext") {
                Some(Value::String(val)) => {
                    base64::decode_config(&val, base64::URL_SAFE_NO_PAD)?
                }
                Some(_) => bail!("The ciphertext field must be a string."),
                None => bail!("The ciphertext field is required."),
            };
            let tag = match map.remove("tag") {
                Some(Value::String(val)) => {
                    Some(base64::decode_config(&val, base64::URL_SAFE_NO_PAD)?)
                }
                Some(_) => bail!("The tag field must be a string."),
                None => None,
            };

            let recipients: Vec<Map<String, Value>> = match map.remove("recipients") {
                Some(Value::Array(vals)) => {
                    let mut vec = Vec::with_capacity(vals.len());
                    for val in vals {
                        match val {
                            Value::Object(val) => vec.push(val),
                            _ => bail!("The recipients field must be an array of objects."),
                        }
                    }
                    vec
                }
                Some(_) => bail!("The recipients field must be an array."),
                None => vec![map],
            };

            let mut full_aad = protected_b64.clone();
            if let Some(aad_b64) = &aad_b64 {
                full_aad.push('.');
                full_aad.push_str(aad_b64);
            }

            for mut recipient in recipients {
                let recipient_map = match recipient.remove("header") {
                    Some(Value::Object(val)) => val,
                    Some(_) => bail!("The header field must be an object."),
                    None => Map::new(),
                };

                let mut merged = protected_map.clone();
                for (key, value) in &unprotected_map {
                    if merged.contains_key(key) {
                        bail!("A duplicate header claim exists: {}", key);
                    }
                    merged.insert(key.clone(), value.clone());
                }
                for (key, value) in &recipient_map {
                    if merged.contains_key(key) {
                        bail!("A duplicate header claim exists: {}", key);
                    }
                    merged.insert(key.clone(), value.clone());
                }

                let merged = JweHeader::from_map(merged)?;

                let decrypter = match selector(&merged)? {
                    Some(val) => val,
                    None => continue,
                };

                self.check_critical(
                    merged.claims_set(),
                    &decrypter.algorithm().processed_parameters(),
                )?;

                let enc_name = match merged.content_encryption() {
                    Some(val) => val.to_string(),
                    None => bail!("The JWE enc header claim is required."),
                };
                let cipher = jwe::content_encryption_from_name(&enc_name)?;
                let compression = match merged.compression() {
                    Some(val) => Some(jwe::compression_from_name(val)?),
                    None => None,
                };

                let encrypted_key = match recipient.get("encrypted_key") {
                    Some(Value::String(val)) => {
                        Some(base64::decode_config(val, base64::URL_SAFE_NO_PAD)?)
                    }
                    Some(_) => bail!("The encrypted_key field must be a string."),
                    None => None,
                };

                let cek = decrypter.decrypt(encrypted_key.as_deref(), &*cipher, &merged)?;

                let content = cipher.decrypt(
                    &cek,
                    iv.as_deref(),
                    &ciphertext,
                    full_aad.as_bytes(),
                    tag.as_deref(),
                )?;

                let content = match &compression {
                    Some(zip) => zip.decompress(&content)?,
                    None => content,
                };

                return Ok((content, merged));
            }

            bail!("A recipient matching the header claims is not found.");
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJweFormat(err),
        })
    }
}

/// Parse only the header part of a compact JWE.
fn peek_compact_header(input: &str) -> Result<JweHeader, JoseError> {
    (|| -> anyhow::Result<JweHeader> {
        let end = input.find('.').unwrap_or(input.len());
        let header = base64::decode_config(&input[..end], base64::URL_SAFE_NO_PAD)?;
        let header: Map<String, Value> = serde_json::from_slice(&header)?;
        let header = JweHeader::from_map(header)?;
        Ok(header)
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InvalidJweFormat(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::{self, Dir, JweHeader, JweHeaderSet, A128KW, ECDH_ES, RSA_OAEP};
    use crate::jwk::key_generator::{generate_ec_key, generate_oct_key, generate_rsa_key, EcCurve};

    #[test]
    fn test_compact_round_trip_direct() -> anyhow::Result<()> {
        for enc in &[
            "A128CBC-HS256",
            "A192CBC-HS384",
            "A256CBC-HS512",
            "A128GCM",
            "A192GCM",
            "A256GCM",
        ] {
            let key_len = jwe::content_encryption_from_name(enc)?.key_len();
            let jwk = generate_oct_key(key_len)?;

            let mut header = JweHeader::new();
            header.set_content_encryption(*enc);
            header.set_token_type("JWT");

            let encrypter = Dir.encrypter_from_jwk(&jwk)?;
            let compact = jwe::serialize_compact(b"test payload!", &header, &*encrypter)?;

            let parts: Vec<&str> = compact.split('.').collect();
            assert_eq!(parts.len(), 5);
            assert!(parts[1].is_empty());

            let decrypter = Dir.decrypter_from_jwk(&jwk)?;
            let (payload, decoded) = jwe::deserialize_compact(&compact, &*decrypter)?;
            assert_eq!(payload, b"test payload!");
            assert_eq!(decoded.algorithm(), Some("dir"));
            assert_eq!(decoded.content_encryption(), Some(*enc));
        }

        Ok(())
    }

    #[test]
    fn test_compact_round_trip_rsa_oaep() -> anyhow::Result<()> {
        let jwk = generate_rsa_key(2048)?;
        let public = jwk.to_public_key().unwrap();

        let mut header = JweHeader::new();
        header.set_content_encryption("A128CBC-HS256");

        let encrypter = RSA_OAEP.encrypter_from_jwk(&public)?;
        let compact = jwe::serialize_compact(b"test payload!", &header, &*encrypter)?;

        let parts: Vec<&str> = compact.split('.').collect();
        assert_eq!(parts.len(), 5);
        assert!(!parts[1].is_empty());

        let decrypter = RSA_OAEP.decrypter_from_jwk(&jwk)?;
        let (payload, _) = jwe::deserialize_compact(&compact, &*decrypter)?;
        assert_eq!(payload, b"test payload!");
        Ok(())
    }

    #[test]
    fn test_mutated_parts_fail_decryption() -> anyhow::Result<()> {
        let jwk = generate_rsa_key(2048)?;
        let public = jwk.to_public_key().unwrap();

        let mut header = JweHeader::new();
        header.set_content_encryption("A128CBC-HS256");

        let encrypter = RSA_OAEP.encrypter_from_jwk(&public)?;
        let compact = jwe::serialize_compact(b"test payload!", &header, &*encrypter)?;
        let decrypter = RSA_OAEP.decrypter_from_jwk(&jwk)?;

        for part in 1..5 {
            let mut parts: Vec<String> =
                compact.split('.').map(|s| s.to_string()).collect();
            let mut chars: Vec<char> = parts[part].chars().collect();
            chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
            parts[part] = chars.into_iter().collect();
            let tampered = parts.join(".");
            assert!(
                jwe::deserialize_compact(&tampered, &*decrypter).is_err(),
                "part {} mutation must fail",
                part
            );
        }
        Ok(())
    }

    #[test]
    fn test_ecdh_es_direct_has_empty_encrypted_key() -> anyhow::Result<()> {
        let jwk = generate_ec_key(EcCurve::P256)?;
        let public = jwk.to_public_key().unwrap();

        let mut header = JweHeader::new();
        header.set_content_encryption("A256GCM");

        let encrypter = ECDH_ES.encrypter_from_jwk(&public)?;
        let compact = jwe::serialize_compact(b"test payload!", &header, &*encrypter)?;

        let parts: Vec<&str> = compact.split('.').collect();
        assert_eq!(parts.len(), 5);
        assert!(parts[1].is_empty());

        let decrypter = ECDH_ES.decrypter_from_jwk(&jwk)?;
        let (payload, decoded) = jwe::deserialize_compact(&compact, &*decrypter)?;
        assert_eq!(payload, b"test payload!");
        let epk = decoded.ephemeral_public_key().unwrap();
        assert_eq!(epk.key_type(), "EC");
        assert!(epk.parameter("d").is_none());
        Ok(())
    }

    #[test]
    fn test_compact_round_trip_with_deflate() -> anyhow::Result<()> {
        let jwk = generate_oct_key(32)?;
        let mut header = JweHeader::new();
        header.set_content_encryption("A256GCM");
        header.set_compression("DEF");

        let payload = b"test payload! test payload! test payload!".to_vec();

        let encrypter = Dir.encrypter_from_jwk(&jwk)?;
        let compact = jwe::serialize_compact(&payload, &header, &*encrypter)?;

        let decrypter = Dir.decrypter_from_jwk(&jwk)?;
        let (decrypted, decoded) = jwe::deserialize_compact(&compact, &*decrypter)?;
        assert_eq!(decrypted, payload);
        assert_eq!(decoded.compression(), Some("DEF"));
        Ok(())
    }

    #[test]
    fn test_general_json_shares_the_cek() -> anyhow::Result<()> {
        let rsa_jwk = generate_rsa_key(2048)?;
        let oct_jwk = generate_oct_key(16)?;

        let mut header = JweHeaderSet::new();
        header.set_content_encryption("A128CBC-HS256", true);
        header.set_token_type("JWT", false);

        let mut rheader1 = JweHeader::new();
        rheader1.set_key_id("rsa-1");
        let encrypter1 = RSA_OAEP.encrypter_from_jwk(&rsa_jwk.to_public_key().unwrap())?;

        let mut rheader2 = JweHeader::new();
        rheader2.set_key_id("oct-2");
        let encrypter2 = A128KW.encrypter_from_jwk(&oct_jwk)?;

        let json = jwe::serialize_general_json(
            b"test payload!",
            Some(&header),
            &[
                (Some(&rheader1), &*encrypter1),
                (Some(&rheader2), &*encrypter2),
            ],
            None,
        )?;

        let decrypter1 = RSA_OAEP.decrypter_from_jwk(&rsa_jwk)?;
        let (payload, decoded) = jwe::deserialize_json(&json, &*decrypter1)?;
        assert_eq!(payload, b"test payload!");
        assert_eq!(decoded.algorithm(), Some("RSA-OAEP"));
        assert_eq!(decoded.key_id(), Some("rsa-1"));

        let decrypter2 = A128KW.decrypter_from_jwk(&oct_jwk)?;
        let (payload, decoded) = jwe::deserialize_json(&json, &*decrypter2)?;
        assert_eq!(payload, b"test payload!");
        assert_eq!(decoded.key_id(), Some("oct-2"));
        Ok(())
    }

    #[test]
    fn test_flattened_json_with_external_aad() -> anyhow::Result<()> {
        let jwk = generate_oct_key(16)?;

        let mut header = JweHeaderSet::new();
        header.set_content_encryption("A128GCM", true);

        let encrypter = A128KW.encrypter_from_jwk(&jwk)?;
        let json = jwe::serialize_flattened_json(
            b"test payload!",
            Some(&header),
            None,
            Some(b"external aad"),
            &*encrypter,
        )?;

        let parsed: Map<String, Value> = serde_json::from_str(&json)?;
        assert!(parsed.get("recipients").is_none());
        assert!(parsed.get("aad").is_some());
        assert!(parsed.get("encrypted_key").is_some());

        let decrypter = A128KW.decrypter_from_jwk(&jwk)?;
        let (payload, _) = jwe::deserialize_json(&json, &*decrypter)?;
        assert_eq!(payload, b"test payload!");

        // stripping the external aad must break decryption
        let mut tampered: Map<String, Value> = serde_json::from_str(&json)?;
        tampered.remove("aad");
        let tampered = serde_json::to_string(&tampered)?;
        assert!(jwe::deserialize_json(&tampered, &*decrypter).is_err());
        Ok(())
    }

    #[test]
    fn test_deserialize_with_keys_requires_trust() -> anyhow::Result<()> {
        let jwk = generate_oct_key(32)?;
        let mut header = JweHeader::new();
        header.set_content_encryption("A256GCM");

        let encrypter = Dir.encrypter_from_jwk(&jwk)?;
        let compact = jwe::serialize_compact(b"payload", &header, &*encrypter)?;

        let context = JweContext::new();
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
    fn test_unknown_critical_is_rejected() -> anyhow::Result<()> {
        let jwk = generate_oct_key(32)?;
        let mut header = JweHeader::new();
        header.set_content_encryption("A256GCM");
        header.set_critical(&["http://example.com/custom"]);

        let encrypter = Dir.encrypter_from_jwk(&jwk)?;
        let context = JweContext::new();
        match context.serialize_compact(b"payload", &header, &*encrypter) {
            Err(JoseError::UnknownCritical(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut permissive = JweContext::new();
        permissive.add_acceptable_critical("http://example.com/custom");
        let compact = permissive.serialize_compact(b"payload", &header, &*encrypter)?;

        let decrypter = Dir.decrypter_from_jwk(&jwk)?;
        match context.deserialize_compact(&compact, &*decrypter) {
            Err(JoseError::UnknownCritical(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        permissive.deserialize_compact(&compact, &*decrypter)?;
        Ok(())
    }
}
