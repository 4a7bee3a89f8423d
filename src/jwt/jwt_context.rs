use anyhow::bail;
use serde_json::{Map, Value};

use crate::jwe::{JweContext, JweDecrypter, JweEncrypter, JweHeader};
use crate::jwk::{Jwk, JwkService, JwkSet};
use crate::jws::{self, JwsContext, JwsHeader, JwsSigner, JwsVerifier};
use crate::jwt::JwtPayload;
use crate::media_type::{JsonMediaTypeConverter, MediaTypeConverter};
use crate::{JoseError, JoseHeader};

/// Serialization and deserialization of JWTs over the JWS and JWE
/// engines. The payload is always the JSON claims set; typ must be "JWT"
/// or absent, cty must be absent and the unencoded payload mode is
/// refused.
#[derive(Debug)]
pub struct JwtContext {
    jws_context: JwsContext,
    jwe_context: JweContext,
    converter: JsonMediaTypeConverter,
}

impl JwtContext {
    pub fn new() -> Self {
        Self {
            jws_context: JwsContext::new(),
            jwe_context: JweContext::new(),
            converter: JsonMediaTypeConverter,
        }
    }

    /// Test whether a critical header claim name is acceptable.
    pub fn is_acceptable_critical(&self, name: &str) -> bool {
        self.jws_context.is_acceptable_critical(name)
    }

    /// Add an acceptable critical header claim name.
    pub fn add_acceptable_critical(&mut self, name: &str) {
        self.jws_context.add_acceptable_critical(name);
        self.jwe_context.add_acceptable_critical(name);
    }

    /// Remove an acceptable critical header claim name.
    pub fn remove_acceptable_critical(&mut self, name: &str) {
        self.jws_context.remove_acceptable_critical(name);
        self.jwe_context.remove_acceptable_critical(name);
    }

    fn check_jwt_header(claims: &Map<String, Value>) -> anyhow::Result<()> {
        match claims.get("typ") {
            Some(Value::String(val)) if val == "JWT" => {}
            Some(Value::String(val)) => bail!("The JWT typ header claim must be JWT: {}", val),
            Some(_) => bail!("The JWT typ header claim must be a string."),
            None => {}
        }
        if claims.contains_key("cty") {
            bail!("The JWT cty header claim must be absent.");
        }
        if let Some(Value::Array(vals)) = claims.get("crit") {
            if vals.iter().any(|val| val == "b64") {
                bail!("JWT does not support the b64 header claim.");
            }
        }
        Ok(())
    }

    /// Return the string representation of the JWT with the signing
    /// algorithm.
    ///
    /// # Arguments
    ///
    /// * `payload` - The JWT claims set.
    /// * `header` - The JWS header claims.
    /// * `signer` - a signer object.
    pub fn encode_with_signer(
        &self,
        payload: &JwtPayload,
        header: &JwsHeader,
        signer: &dyn JwsSigner,
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            Self::check_jwt_header(header.claims_set())?;

            let payload_bytes = self
                .converter
                .encode(&Value::Object(payload.claims_set().clone()))?;
            let jwt = self
                .jws_context
                .serialize_compact(&payload_bytes, header, signer)?;
            Ok(jwt)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Sign with the first trusted key the service resolves for the
    /// header.
    pub fn encode_with_service(
        &self,
        payload: &JwtPayload,
        header: &JwsHeader,
        service: &JwkService,
        keys: &[Jwk],
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            Self::check_jwt_header(header.claims_set())?;

            let payload_bytes = self
                .converter
                .encode(&Value::Object(payload.claims_set().clone()))?;
            let jwt = self
                .jws_context
                .serialize_compact_with_service(&payload_bytes, header, service, keys)?;
            Ok(jwt)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the string representation of the JWT with the encrypting
    /// algorithm.
    pub fn encode_with_encrypter(
        &self,
        payload: &JwtPayload,
        header: &JweHeader,
        encrypter: &dyn JweEncrypter,
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            Self::check_jwt_header(header.claims_set())?;

            let payload_bytes = self
                .converter
                .encode(&Value::Object(payload.claims_set().clone()))?;
            let jwt = self
                .jwe_context
                .serialize_compact(&payload_bytes, header, encrypter)?;
            Ok(jwt)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the string representation of the JWT with the "none"
    /// algorithm. This is the explicit opt in for unsecured tokens.
    pub fn encode_unsecured(
        &self,
        payload: &JwtPayload,
        header: &JwsHeader,
    ) -> Result<String, JoseError> {
        (|| -> anyhow::Result<String> {
            Self::check_jwt_header(header.claims_set())?;

            let payload_bytes = self
                .converter
                .encode(&Value::Object(payload.claims_set().clone()))?;
            let mut context = self.jws_context.clone();
            context.set_allow_unsecured(true);
            let signer = jws::Unsecured.signer();
            let jwt = context.serialize_compact(&payload_bytes, header, &signer)?;
            Ok(jwt)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the JOSE header decoded from a JWT without verification.
    pub fn decode_header(&self, input: impl AsRef<[u8]>) -> Result<Box<dyn JoseHeader>, JoseError> {
        (|| -> anyhow::Result<Box<dyn JoseHeader>> {
            let input = input.as_ref();
            let parts: Vec<&[u8]> = input.split(|b| *b == b'.').collect();
            if parts.len() == 3 {
                // JWS
                let header = base64::decode_config(parts[0], base64::URL_SAFE_NO_PAD)?;
                let header: Map<String, Value> = serde_json::from_slice(&header)?;
                let header = JwsHeader::from_map(header)?;
                Ok(Box::new(header) as Box<dyn JoseHeader>)
            } else if parts.len() == 5 {
                // JWE
                let header = base64::decode_config(parts[0], base64::URL_SAFE_NO_PAD)?;
                let header: Map<String, Value> = serde_json::from_slice(&header)?;
                let header = JweHeader::from_map(header)?;
                Ok(Box::new(header) as Box<dyn JoseHeader>)
            } else {
                bail!("The input cannot be recognized as a JWT.");
            }
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the JWT object decoded by the selected verifier.
    pub fn decode_with_verifier(
        &self,
        input: impl AsRef<[u8]>,
        verifier: &dyn JwsVerifier,
    ) -> Result<(JwtPayload, JwsHeader), JoseError> {
        self.decode_with_verifier_selector(input, |_header| Ok(Some(verifier)))
    }

    /// Return the JWT object decoded with a selected verifying algorithm.
    ///
    /// # Arguments
    ///
    /// * `input` - a JWT string representation.
    /// * `selector` - a function for selecting the verifying algorithm.
    pub fn decode_with_verifier_selector<'a, F>(
        &self,
        input: impl AsRef<[u8]>,
        selector: F,
    ) -> Result<(JwtPayload, JwsHeader), JoseError>
    where
        F: Fn(&JwsHeader) -> Result<Option<&'a dyn JwsVerifier>, JoseError>,
    {
        (|| -> anyhow::Result<(JwtPayload, JwsHeader)> {
            let (payload, header) = self
                .jws_context
                .deserialize_compact_with_selector(input, |header| selector(header))?;

            Self::check_jwt_header(header.claims_set())?;
            let payload = self.parse_payload(&payload)?;
            Ok((payload, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the JWT object decoded by using a JWK set.
    ///
    /// # Arguments
    ///
    /// * `input` - a JWT string representation.
    /// * `jwk_set` - a JWK set.
    /// * `selector` - a function for selecting the verifying algorithm.
    pub fn decode_with_verifier_in_jwk_set<'a, F>(
        &self,
        input: impl AsRef<[u8]>,
        jwk_set: &'a JwkSet,
        selector: F,
    ) -> Result<(JwtPayload, JwsHeader), JoseError>
    where
        F: Fn(&'a Jwk) -> Result<Option<&'a dyn JwsVerifier>, JoseError>,
    {
        self.decode_with_verifier_selector(input, |header| {
            let key_id = match header.key_id() {
                Some(val) => val,
                None => return Ok(None),
            };

            for jwk in jwk_set.get(key_id) {
                if let Some(val) = selector(jwk)? {
                    return Ok(Some(val));
                }
            }
            Ok(None)
        })
    }

    /// Return the JWT object decoded against trusted candidate keys.
    pub fn decode_with_keys(
        &self,
        input: impl AsRef<[u8]>,
        keys: &[Jwk],
    ) -> Result<(JwtPayload, JwsHeader), JoseError> {
        (|| -> anyhow::Result<(JwtPayload, JwsHeader)> {
            let (payload, header) = self.jws_context.deserialize_compact_with_keys(input, keys)?;

            Self::check_jwt_header(header.claims_set())?;
            let payload = self.parse_payload(&payload)?;
            Ok((payload, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the JWT object decoded with keys resolved through the
    /// service.
    pub fn decode_with_service(
        &self,
        input: impl AsRef<[u8]>,
        service: &JwkService,
        keys: &[Jwk],
    ) -> Result<(JwtPayload, JwsHeader), JoseError> {
        (|| -> anyhow::Result<(JwtPayload, JwsHeader)> {
            let (payload, header) =
                self.jws_context
                    .deserialize_compact_with_service(input, service, keys)?;

            Self::check_jwt_header(header.claims_set())?;
            let payload = self.parse_payload(&payload)?;
            Ok((payload, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the JWT object decoded by the selected decrypter.
    pub fn decode_with_decrypter(
        &self,
        input: impl AsRef<[u8]>,
        decrypter: &dyn JweDecrypter,
    ) -> Result<(JwtPayload, JweHeader), JoseError> {
        (|| -> anyhow::Result<(JwtPayload, JweHeader)> {
            let input = std::str::from_utf8(input.as_ref())?;
            let (payload, header) = self.jwe_context.deserialize_compact(input, decrypter)?;

            Self::check_jwt_header(header.claims_set())?;
            let payload = self.parse_payload(&payload)?;
            Ok((payload, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    /// Return the JWT object decoded with the "none" algorithm. This is
    /// the explicit opt in for unsecured tokens.
    pub fn decode_unsecured(
        &self,
        input: impl AsRef<[u8]>,
    ) -> Result<(JwtPayload, JwsHeader), JoseError> {
        (|| -> anyhow::Result<(JwtPayload, JwsHeader)> {
            let mut context = self.jws_context.clone();
            context.set_allow_unsecured(true);
            let verifier = jws::Unsecured.verifier();
            let (payload, header) = context.deserialize_compact(input, &verifier)?;

            Self::check_jwt_header(header.claims_set())?;
            let payload = self.parse_payload(&payload)?;
            Ok((payload, header))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidJwtFormat(err),
        })
    }

    fn parse_payload(&self, payload: &[u8]) -> anyhow::Result<JwtPayload> {
        let payload = match self.converter.decode(payload)? {
            Value::Object(map) => JwtPayload::from_map(map)?,
            _ => bail!("The JWT payload must be a JSON object."),
        };
        Ok(payload)
    }
}

impl Default for JwtContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::Jwk;
    use crate::jws::{HS256, RS256};
    use crate::jwt::{self, JwtPayload, JwtPayloadValidator};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn oct_jwk() -> Jwk {
        let mut jwk = Jwk::new("oct");
        jwk.set_key_id("k1");
        jwk.set_parameter(
            "k",
            Some(json!(base64::encode_config(
                b"0123456789abcdef0123456789abcdef",
                base64::URL_SAFE_NO_PAD
            ))),
        )
        .unwrap();
        jwk
    }

    #[test]
    fn test_jwt_round_trip_hs256() -> anyhow::Result<()> {
        let jwk = oct_jwk();

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let far_future = Utc::now() + Duration::days(365 * 100);
        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");
        payload.set_expires_at(&far_future);
        payload.set_claim("http://example.com/is_root", Some(json!(true)))?;

        let signer = HS256.signer_from_jwk(&jwk)?;
        let jwt_string = jwt::encode_with_signer(&payload, &header, &signer)?;
        assert_eq!(jwt_string.split('.').count(), 3);

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        let (decoded_payload, decoded_header) = jwt::decode_with_verifier(&jwt_string, &verifier)?;
        assert_eq!(decoded_header.token_type(), Some("JWT"));
        assert_eq!(decoded_payload, payload);

        // flipping a bit of the signature must fail verification
        let mut tampered = jwt_string.into_bytes();
        let last = tampered.last_mut().unwrap();
        *last ^= 0x01;
        assert!(jwt::decode_with_verifier(&tampered, &verifier).is_err());
        Ok(())
    }

    #[test]
    fn test_jwt_rejects_cty_and_foreign_typ() -> anyhow::Result<()> {
        let jwk = oct_jwk();
        let signer = HS256.signer_from_jwk(&jwk)?;
        let payload = JwtPayload::new();

        let mut header = JwsHeader::new();
        header.set_content_type("json");
        assert!(jwt::encode_with_signer(&payload, &header, &signer).is_err());

        let mut header = JwsHeader::new();
        header.set_token_type("JOSE");
        assert!(jwt::encode_with_signer(&payload, &header, &signer).is_err());
        Ok(())
    }

    #[test]
    fn test_validation_is_separate_from_verification() -> anyhow::Result<()> {
        let jwk = oct_jwk();

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");
        payload.set_expires_at(&(Utc::now() - Duration::seconds(60)));

        let signer = HS256.signer_from_jwk(&jwk)?;
        let jwt_string = jwt::encode_with_signer(&payload, &header, &signer)?;

        // the signature verifies even though the token has expired
        let verifier = HS256.verifier_from_jwk(&jwk)?;
        let (decoded_payload, _) = jwt::decode_with_verifier(&jwt_string, &verifier)?;

        let validator = JwtPayloadValidator::new();
        assert!(!validator.is_valid(&decoded_payload));
        Ok(())
    }

    #[test]
    fn test_unsecured_jwt_requires_explicit_entry_points() -> anyhow::Result<()> {
        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");
        let header = JwsHeader::new();

        let jwt_string = jwt::encode_unsecured(&payload, &header)?;
        assert!(jwt_string.ends_with('.'));

        let (decoded, header) = jwt::decode_unsecured(&jwt_string)?;
        assert_eq!(decoded.issuer(), Some("joe"));
        assert_eq!(header.algorithm(), Some("none"));

        // the regular verification path refuses the none algorithm
        let verifier = crate::jws::Unsecured.verifier();
        assert!(jwt::decode_with_verifier(&jwt_string, &verifier).is_err());
        Ok(())
    }

    #[test]
    fn test_decode_with_verifier_in_jwk_set() -> anyhow::Result<()> {
        let jwk = oct_jwk();
        let mut jwk_set = crate::jwk::JwkSet::new();
        jwk_set.push_key(jwk.clone());

        let mut header = JwsHeader::new();
        header.set_key_id("k1");
        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");

        let signer = HS256.signer_from_jwk(&jwk)?;
        let jwt_string = jwt::encode_with_signer(&payload, &header, &signer)?;

        let verifier = HS256.verifier_from_jwk(&jwk)?;
        let (decoded, _) = jwt::decode_with_verifier_in_jwk_set(&jwt_string, &jwk_set, |_jwk| {
            Ok(Some(&verifier))
        })?;
        assert_eq!(decoded.issuer(), Some("joe"));
        Ok(())
    }

    #[test]
    fn test_decode_with_keys_requires_trust() -> anyhow::Result<()> {
        let jwk = oct_jwk();
        let header = JwsHeader::new();
        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");

        let signer = HS256.signer_from_jwk(&jwk)?;
        let jwt_string = jwt::encode_with_signer(&payload, &header, &signer)?;

        match jwt::decode_with_keys(&jwt_string, &[jwk.clone()]) {
            Err(JoseError::NoSuitableKey(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut trusted = jwk;
        trusted.set_trusted(true);
        let (decoded, _) = jwt::decode_with_keys(&jwt_string, &[trusted])?;
        assert_eq!(decoded.issuer(), Some("joe"));
        Ok(())
    }

    #[test]
    fn test_jwt_over_jwe() -> anyhow::Result<()> {
        let jwk = crate::jwk::key_generator::generate_rsa_key(2048)?;

        let mut header = JweHeader::new();
        header.set_token_type("JWT");
        header.set_content_encryption("A128CBC-HS256");

        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");

        let encrypter = crate::jwe::RSA_OAEP.encrypter_from_jwk(&jwk.to_public_key().unwrap())?;
        let jwt_string = jwt::encode_with_encrypter(&payload, &header, &*encrypter)?;
        assert_eq!(jwt_string.split('.').count(), 5);

        let decrypter = crate::jwe::RSA_OAEP.decrypter_from_jwk(&jwk)?;
        let (decoded, decoded_header) = jwt::decode_with_decrypter(&jwt_string, &*decrypter)?;
        assert_eq!(decoded.issuer(), Some("joe"));
        assert_eq!(decoded_header.token_type(), Some("JWT"));
        Ok(())
    }

    #[test]
    fn test_decode_header_distinguishes_jws_and_jwe() -> anyhow::Result<()> {
        let jwk = oct_jwk();
        let header = JwsHeader::new();
        let payload = JwtPayload::new();
        let signer = HS256.signer_from_jwk(&jwk)?;
        let jwt_string = jwt::encode_with_signer(&payload, &header, &signer)?;

        let decoded = jwt::decode_header(&jwt_string)?;
        assert_eq!(decoded.algorithm(), Some("HS256"));
        Ok(())
    }

    #[test]
    fn test_rs256_jwt_round_trip() -> anyhow::Result<()> {
        let jwk = crate::jwk::key_generator::generate_rsa_key(2048)?;
        let header = JwsHeader::new();
        let mut payload = JwtPayload::new();
        payload.set_subject("subject");

        let signer = RS256.signer_from_jwk(&jwk)?;
        let jwt_string = jwt::encode_with_signer(&payload, &header, &signer)?;

        let verifier = RS256.verifier_from_jwk(&jwk.to_public_key().unwrap())?;
        let (decoded, _) = jwt::decode_with_verifier(&jwt_string, &verifier)?;
        assert_eq!(decoded.subject(), Some("subject"));
        Ok(())
    }
}
