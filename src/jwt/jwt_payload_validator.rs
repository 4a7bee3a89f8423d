use std::fmt;

use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::jwt::JwtPayload;
use crate::JoseError;

type ClaimCheck = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Validation of a JWT claims set, independent of cryptographic
/// verification. Built-in checks cover the time claims and expected
/// values of the registered claims; custom checks are evaluated in
/// registration order. The first failure wins.
pub struct JwtPayloadValidator {
    base_time: Option<DateTime<Utc>>,
    acceptable_skew: Duration,
    issuer: Option<String>,
    subject: Option<String>,
    audience: Option<String>,
    jwt_id: Option<String>,
    min_issued_time: Option<DateTime<Utc>>,
    max_issued_time: Option<DateTime<Utc>>,
    claim_checks: Vec<(String, ClaimCheck)>,
}

impl JwtPayloadValidator {
    pub fn new() -> Self {
        Self {
            base_time: None,
            acceptable_skew: Duration::zero(),
            issuer: None,
            subject: None,
            audience: None,
            jwt_id: None,
            min_issued_time: None,
            max_issued_time: None,
            claim_checks: Vec::new(),
        }
    }

    /// Set the moment the time claims are evaluated against. Defaults to
    /// the current time at validation.
    pub fn set_base_time(&mut self, value: DateTime<Utc>) {
        self.base_time = Some(value);
    }

    /// Set the acceptable clock skew for the time claims.
    pub fn set_acceptable_skew(&mut self, value: Duration) {
        self.acceptable_skew = value;
    }

    /// Set the expected value for issuer claim (iss).
    pub fn set_issuer(&mut self, value: impl Into<String>) {
        self.issuer = Some(value.into());
    }

    /// Set the expected value for subject claim (sub).
    pub fn set_subject(&mut self, value: impl Into<String>) {
        self.subject = Some(value.into());
    }

    /// Set an audience value (aud) the token must be addressed to.
    pub fn set_audience(&mut self, value: impl Into<String>) {
        self.audience = Some(value.into());
    }

    /// Set the expected value for JWT ID claim (jti).
    pub fn set_jwt_id(&mut self, value: impl Into<String>) {
        self.jwt_id = Some(value.into());
    }

    /// Set the lower bound of the issued at claim (iat).
    pub fn set_min_issued_time(&mut self, value: DateTime<Utc>) {
        self.min_issued_time = Some(value);
    }

    /// Set the upper bound of the issued at claim (iat).
    pub fn set_max_issued_time(&mut self, value: DateTime<Utc>) {
        self.max_issued_time = Some(value);
    }

    /// Add a custom claim check. Checks run after the built-in ones, in
    /// registration order.
    ///
    /// # Arguments
    ///
    /// * `key` - the claim name
    /// * `check` - a predicate over the claim value (None when absent)
    pub fn add_claim_check<F>(&mut self, key: impl Into<String>, check: F)
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.claim_checks.push((key.into(), Box::new(check)));
    }

    /// Validate the claims set. The first failing check aborts.
    pub fn validate(&self, payload: &JwtPayload) -> Result<(), JoseError> {
        (|| -> anyhow::Result<()> {
            let now = self.base_time.unwrap_or_else(Utc::now);

            if let Some(exp) = payload.expires_at() {
                if exp + self.acceptable_skew <= now {
                    bail!("The token has expired: {}", exp);
                }
            }
            if let Some(nbf) = payload.not_before() {
                if nbf - self.acceptable_skew > now {
                    bail!("The token is not yet valid: {}", nbf);
                }
            }
            if let Some(iat) = payload.issued_at() {
                if let Some(min) = self.min_issued_time {
                    if iat < min {
                        bail!("The token has been issued too long ago: {}", iat);
                    }
                }
                if let Some(max) = self.max_issued_time {
                    if iat > max {
                        bail!("The token has been issued too recently: {}", iat);
                    }
                }
            }

            if let Some(expected) = &self.issuer {
                match payload.issuer() {
                    Some(actual) if actual == expected => {}
                    Some(actual) => bail!("The iss claim is mismatched: {}", actual),
                    None => bail!("The iss claim is required."),
                }
            }
            if let Some(expected) = &self.subject {
                match payload.subject() {
                    Some(actual) if actual == expected => {}
                    Some(actual) => bail!("The sub claim is mismatched: {}", actual),
                    None => bail!("The sub claim is required."),
                }
            }
            if let Some(expected) = &self.audience {
                match payload.audience() {
                    Some(vals) if vals.iter().any(|val| val == expected) => {}
                    Some(_) => bail!("The aud claim does not contain: {}", expected),
                    None => bail!("The aud claim is required."),
                }
            }
            if let Some(expected) = &self.jwt_id {
                match payload.jwt_id() {
                    Some(actual) if actual == expected => {}
                    Some(actual) => bail!("The jti claim is mismatched: {}", actual),
                    None => bail!("The jti claim is required."),
                }
            }

            for (key, check) in &self.claim_checks {
                if !check(payload.claim(key)) {
                    bail!("The {} claim is rejected.", key);
                }
            }

            Ok(())
        })()
        .map_err(JoseError::InvalidClaim)
    }

    /// Test whether the claims set is valid.
    pub fn is_valid(&self, payload: &JwtPayload) -> bool {
        self.validate(payload).is_ok()
    }

    /// Apply a function to the payload when it is valid.
    pub fn if_valid<T, F>(&self, payload: &JwtPayload, f: F) -> Option<T>
    where
        F: FnOnce(&JwtPayload) -> T,
    {
        match self.validate(payload) {
            Ok(()) => Some(f(payload)),
            Err(_) => None,
        }
    }

    /// Apply one of two functions depending on validity.
    pub fn if_valid_or_else<T, F, G>(&self, payload: &JwtPayload, f: F, g: G) -> T
    where
        F: FnOnce(&JwtPayload) -> T,
        G: FnOnce(&JoseError) -> T,
    {
        match self.validate(payload) {
            Ok(()) => f(payload),
            Err(err) => g(&err),
        }
    }
}

impl Default for JwtPayloadValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JwtPayloadValidator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("JwtPayloadValidator")
            .field("base_time", &self.base_time)
            .field("acceptable_skew", &self.acceptable_skew)
            .field("issuer", &self.issuer)
            .field("subject", &self.subject)
            .field("audience", &self.audience)
            .field("jwt_id", &self.jwt_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> JwtPayload {
        let mut payload = JwtPayload::new();
        payload.set_issuer("joe");
        payload.set_audience(vec!["aud1", "aud2"]);
        payload
    }

    #[test]
    fn test_expired_token_is_invalid() -> anyhow::Result<()> {
        let now = Utc::now();
        let mut payload = payload();
        payload.set_expires_at(&(now - Duration::seconds(60)));

        let mut validator = JwtPayloadValidator::new();
        validator.set_base_time(now);
        assert!(!validator.is_valid(&payload));

        // a skew larger than the overshoot makes it valid again
        validator.set_acceptable_skew(Duration::seconds(120));
        assert!(validator.is_valid(&payload));
        Ok(())
    }

    #[test]
    fn test_not_before_with_skew() -> anyhow::Result<()> {
        let now = Utc::now();
        let mut payload = payload();
        payload.set_not_before(&(now + Duration::seconds(30)));

        let mut validator = JwtPayloadValidator::new();
        validator.set_base_time(now);
        assert!(!validator.is_valid(&payload));

        validator.set_acceptable_skew(Duration::seconds(60));
        assert!(validator.is_valid(&payload));
        Ok(())
    }

    #[test]
    fn test_expected_claims() -> anyhow::Result<()> {
        let payload = payload();

        let mut validator = JwtPayloadValidator::new();
        validator.set_issuer("joe");
        validator.set_audience("aud2");
        assert!(validator.is_valid(&payload));

        validator.set_issuer("someone else");
        assert!(!validator.is_valid(&payload));
        Ok(())
    }

    #[test]
    fn test_custom_checks_run_in_order() -> anyhow::Result<()> {
        let mut payload = payload();
        payload.set_claim("http://example.com/is_root", Some(json!(true)))?;

        let mut validator = JwtPayloadValidator::new();
        validator.add_claim_check("http://example.com/is_root", |val| {
            matches!(val, Some(Value::Bool(true)))
        });
        assert!(validator.is_valid(&payload));

        validator.add_claim_check("missing", |val| val.is_some());
        match validator.validate(&payload) {
            Err(JoseError::InvalidClaim(err)) => {
                assert!(err.to_string().contains("missing"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_if_valid_combinators() {
        let mut expired = payload();
        expired.set_expires_at(&(Utc::now() - Duration::seconds(60)));

        let validator = JwtPayloadValidator::new();
        assert_eq!(validator.if_valid(&expired, |_| 1), None);
        assert_eq!(validator.if_valid_or_else(&expired, |_| 1, |_| 2), 2);

        let valid = payload();
        assert_eq!(validator.if_valid(&valid, |_| 1), Some(1));
        assert_eq!(validator.if_valid_or_else(&valid, |_| 1, |_| 2), 1);
    }
}
