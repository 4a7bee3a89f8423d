use anyhow::{anyhow, bail};
use openssl::pkey::{Id, PKey, Public};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509};
use serde_json::Value;

use crate::jwk::jwk_resolver::{JwkResolver, JwkSetLoader, NoopJwkResolver, NoopJwkSetLoader};
use crate::jwk::jwk_store::{JwkStore, NoopJwkStore};
use crate::jwk::{Jwk, JwkSet};
use crate::{JoseError, JoseHeader};

/// Options governing key resolution and trust.
#[derive(Debug, Clone, Default)]
pub struct JoseConfig {
    /// Enable `jku` URL fetching during key resolution.
    pub resolve_jku: bool,
    /// URLs whose resolved keys are trusted.
    pub trusted_jku: Vec<String>,
    /// Enable `x5u` URL fetching.
    pub resolve_x5u: bool,
    /// Enable X.509 certificate path validation.
    pub validate_certificate: bool,
    /// DER encoded trust anchor certificates.
    pub trust_anchors: Vec<Vec<u8>>,
}

/// Composes the JWK store, the key resolver, the URL loader and the trust
/// rules into the key resolution chain used by build and read operations.
#[derive(Debug)]
pub struct JwkService {
    store: Box<dyn JwkStore>,
    resolver: Box<dyn JwkResolver>,
    loader: Box<dyn JwkSetLoader>,
    config: JoseConfig,
}

impl JwkService {
    pub fn new() -> Self {
        Self {
            store: Box::new(NoopJwkStore),
            resolver: Box::new(NoopJwkResolver),
            loader: Box::new(NoopJwkSetLoader),
            config: JoseConfig::default(),
        }
    }

    pub fn set_store(&mut self, store: Box<dyn JwkStore>) {
        self.store = store;
    }

    pub fn set_resolver(&mut self, resolver: Box<dyn JwkResolver>) {
        self.resolver = resolver;
    }

    pub fn set_loader(&mut self, loader: Box<dyn JwkSetLoader>) {
        self.loader = loader;
    }

    pub fn set_config(&mut self, config: JoseConfig) {
        self.config = config;
    }

    pub fn store(&self) -> &dyn JwkStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &JoseConfig {
        &self.config
    }

    /// Run the key resolution algorithm over a possibly partial JWK.
    ///
    /// Store hits are returned verbatim. Otherwise resolver, certificate
    /// chain and URL material is merged into the input under a byte
    /// equality consistency check, and the result is marked trusted when
    /// any resolution succeeded.
    pub fn load_key(&self, input: &Jwk) -> Result<Jwk, JoseError> {
        if let Some(key_id) = input.key_id() {
            if let Some(mut found) = self.store.get_by_key_id(key_id)? {
                found.set_trusted(true);
                return Ok(found);
            }
        }
        let x5t = input.x509_certificate_sha1_thumbprint();
        if let Some(x5t) = &x5t {
            if let Some(mut found) = self.store.get_by_x509_sha1_thumbprint(x5t)? {
                found.set_trusted(true);
                return Ok(found);
            }
        }
        let x5t_s256 = input.x509_certificate_sha256_thumbprint();
        if let Some(x5t_s256) = &x5t_s256 {
            if let Some(mut found) = self.store.get_by_x509_sha256_thumbprint(x5t_s256)? {
                found.set_trusted(true);
                return Ok(found);
            }
        }

        let mut merged = input.clone();
        let mut trusted = input.is_trusted();

        if let Some(resolved) =
            self.resolver
                .resolve(input.key_id(), x5t.as_deref(), x5t_s256.as_deref())?
        {
            merge_consistent(&mut merged, &resolved)?;
            trusted = true;
        }

        if self.config.validate_certificate {
            if let Some(chain) = input.x509_certificate_chain() {
                let leaf_key = self.validate_certificate_chain(&chain)?;
                merge_consistent(&mut merged, &leaf_key)?;
                trusted = true;
            }
        }

        if self.config.resolve_x5u {
            if let Some(url) = input.x509_url() {
                let data = self.loader.load(url)?;
                let chain = parse_certificates(&data)?;
                let leaf_key = self.validate_certificate_chain(&chain)?;
                merge_consistent(&mut merged, &leaf_key)?;
                trusted = true;
            }
        }

        if trusted {
            merged.set_trusted(true);
        }
        Ok(merged)
    }

    /// Resolve the trusted verification candidates for a header: supplied
    /// keys first, then the store, the resolver and the header's own key
    /// material (jwk, x5c, jku, x5u).
    pub fn resolve_verification_keys(
        &self,
        header: &dyn JoseHeader,
        provided: &[Jwk],
    ) -> Result<Vec<Jwk>, JoseError> {
        let mut candidates: Vec<Jwk> = Vec::new();

        for key in provided {
            if !key_matches_header(key, header) {
                continue;
            }
            if key.is_trusted() {
                candidates.push(key.clone());
                continue;
            }
            let loaded = self.load_key(key)?;
            if loaded.is_trusted() {
                candidates.push(loaded);
            }
        }

        if let Some(key_id) = header.key_id() {
            if let Some(mut found) = self.store.get_by_key_id(key_id)? {
                found.set_trusted(true);
                if key_matches_header(&found, header) {
                    candidates.push(found);
                }
            } else if let Some(mut resolved) = self.resolver.resolve(Some(key_id), None, None)? {
                resolved.set_trusted(true);
                if key_matches_header(&resolved, header) {
                    candidates.push(resolved);
                }
            }
        }

        if let Some(Value::Object(map)) = header.claim("jwk") {
            let jwk = Jwk::from_map(map.clone())?;
            let loaded = self.load_key(&jwk)?;
            if loaded.is_trusted() && key_matches_header(&loaded, header) {
                candidates.push(loaded);
            }
        }

        if self.config.validate_certificate {
            if let Some(Value::Array(vals)) = header.claim("x5c") {
                let chain = decode_certificate_claim(vals)?;
                let leaf_key = self.validate_certificate_chain(&chain)?;
                candidates.push(leaf_key);
            }
        }

        if self.config.resolve_jku {
            if let Some(Value::String(url)) = header.claim("jku") {
                let trusted = self.config.trusted_jku.iter().any(|val| val == url);
                if trusted {
                    let data = self.loader.load(url)?;
                    let set = JwkSet::from_bytes(&data)?;
                    for key in set.keys() {
                        if key_matches_header(key, header) {
                            let mut key = key.clone();
                            key.set_trusted(true);
                            candidates.push(key);
                        }
                    }
                }
            }
        }

        if self.config.resolve_x5u {
            if let Some(Value::String(url)) = header.claim("x5u") {
                let data = self.loader.load(url)?;
                let chain = parse_certificates(&data)?;
                let leaf_key = self.validate_certificate_chain(&chain)?;
                candidates.push(leaf_key);
            }
        }

        Ok(candidates)
    }

    /// Resolve the key a build operation signs or encrypts with: the first
    /// trusted supplied key consistent with the header, else a store or
    /// resolver hit for the header kid.
    pub fn resolve_build_key(
        &self,
        header: &dyn JoseHeader,
        provided: &[Jwk],
    ) -> Result<Jwk, JoseError> {
        let mut saw_untrusted = false;
        for key in provided {
            if !key_matches_header(key, header) {
                continue;
            }
            if key.is_trusted() {
                return Ok(key.clone());
            }
            let loaded = self.load_key(key)?;
            if loaded.is_trusted() {
                return Ok(loaded);
            }
            saw_untrusted = true;
        }

        if let Some(key_id) = header.key_id() {
            if let Some(mut found) = self.store.get_by_key_id(key_id)? {
                found.set_trusted(true);
                return Ok(found);
            }
            if let Some(mut resolved) = self.resolver.resolve(Some(key_id), None, None)? {
                resolved.set_trusted(true);
                return Ok(resolved);
            }
        }

        if saw_untrusted {
            Err(JoseError::UntrustedKey(anyhow!(
                "A key was found but its provenance does not allow using it."
            )))
        } else {
            Err(JoseError::NoSuitableKey(anyhow!(
                "No key consistent with the header was found."
            )))
        }
    }

    /// Validate a certificate chain against the configured trust anchors
    /// and return the leaf public key as a trusted JWK.
    fn validate_certificate_chain(&self, chain: &[Vec<u8>]) -> Result<Jwk, JoseError> {
        (|| -> anyhow::Result<Jwk> {
            if chain.is_empty() {
                bail!("The certificate chain is empty.");
            }
            let leaf = X509::from_der(&chain[0])?;

            let mut store_builder = X509StoreBuilder::new()?;
            for anchor in &self.config.trust_anchors {
                store_builder.add_cert(X509::from_der(anchor)?)?;
            }
            let store = store_builder.build();

            let mut untrusted = Stack::new()?;
            for der in &chain[1..] {
                untrusted.push(X509::from_der(der)?)?;
            }

            let mut ctx = X509StoreContext::new()?;
            let valid = ctx.init(&store, &leaf, &untrusted, |ctx| ctx.verify_cert())?;
            if !valid {
                bail!("Certificate path validation failed.");
            }

            let mut jwk = public_key_to_jwk(&leaf.public_key()?)?;
            jwk.set_trusted(true);
            Ok(jwk)
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::UntrustedKey(err),
        })
    }
}

impl Default for JwkService {
    fn default() -> Self {
        Self::new()
    }
}

fn key_matches_header(key: &Jwk, header: &dyn JoseHeader) -> bool {
    if let (Some(expected), Some(actual)) = (header.key_id(), key.key_id()) {
        if expected != actual {
            return false;
        }
    }
    if let (Some(expected), Some(actual)) = (header.algorithm(), key.algorithm()) {
        if expected != actual {
            return false;
        }
    }
    true
}

/// Merge resolved material into the input. Every parameter present on both
/// sides must be byte equal.
fn merge_consistent(target: &mut Jwk, resolved: &Jwk) -> Result<(), JoseError> {
    const KEY_PARAMS: &[&str] = &[
        "kty", "crv", "k", "n", "e", "d", "p", "q", "dp", "dq", "qi", "x", "y",
    ];
    (|| -> anyhow::Result<()> {
        for param in KEY_PARAMS {
            match (target.parameter(param), resolved.parameter(param)) {
                (Some(provided), Some(found)) => {
                    if provided != found {
                        bail!(
                            "The provided {} parameter disagrees with the resolved key.",
                            param
                        );
                    }
                }
                (None, Some(found)) => {
                    let found = found.clone();
                    target.set_parameter(param, Some(found))?;
                }
                _ => {}
            }
        }
        Ok(())
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InconsistentKey(err),
    })
}

fn decode_certificate_claim(vals: &[Value]) -> Result<Vec<Vec<u8>>, JoseError> {
    (|| -> anyhow::Result<Vec<Vec<u8>>> {
        let mut chain = Vec::with_capacity(vals.len());
        for val in vals {
            match val {
                Value::String(val) => {
                    chain.push(base64::decode_config(val, base64::STANDARD)?);
                }
                _ => bail!("An element of the x5c header claim must be a string."),
            }
        }
        Ok(chain)
    })()
    .map_err(JoseError::InvalidKeyFormat)
}

fn parse_certificates(data: &[u8]) -> Result<Vec<Vec<u8>>, JoseError> {
    (|| -> anyhow::Result<Vec<Vec<u8>>> {
        if data.starts_with(b"-----") {
            let certs = X509::stack_from_pem(data)?;
            let mut chain = Vec::with_capacity(certs.len());
            for cert in certs {
                chain.push(cert.to_der()?);
            }
            Ok(chain)
        } else {
            Ok(vec![data.to_vec()])
        }
    })()
    .map_err(JoseError::InvalidKeyFormat)
}

/// Extract the public key of a certificate as a JWK.
fn public_key_to_jwk(pkey: &PKey<Public>) -> anyhow::Result<Jwk> {
    fn b64(input: impl AsRef<[u8]>) -> Value {
        Value::String(base64::encode_config(
            input.as_ref(),
            base64::URL_SAFE_NO_PAD,
        ))
    }

    match pkey.id() {
        Id::RSA => {
            let rsa = pkey.rsa()?;
            let mut jwk = Jwk::new("RSA");
            jwk.set_parameter("n", Some(b64(rsa.n().to_vec())))?;
            jwk.set_parameter("e", Some(b64(rsa.e().to_vec())))?;
            Ok(jwk)
        }
        Id::EC => {
            let ec = pkey.ec_key()?;
            let group = ec.group();
            let curve = match group.curve_name() {
                Some(openssl::nid::Nid::X9_62_PRIME256V1) => "P-256",
                Some(openssl::nid::Nid::SECP384R1) => "P-384",
                Some(openssl::nid::Nid::SECP521R1) => "P-521",
                _ => bail!("Unsupported certificate curve."),
            };
            let len = match curve {
                "P-256" => 32,
                "P-384" => 48,
                _ => 66,
            };
            let mut ctx = openssl::bn::BigNumContext::new()?;
            let mut x = openssl::bn::BigNum::new()?;
            let mut y = openssl::bn::BigNum::new()?;
            ec.public_key()
                .affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)?;
            let mut jwk = Jwk::new("EC");
            jwk.set_parameter("crv", Some(Value::String(curve.to_string())))?;
            jwk.set_parameter("x", Some(b64(x.to_vec_padded(len)?)))?;
            jwk.set_parameter("y", Some(b64(y.to_vec_padded(len)?)))?;
            Ok(jwk)
        }
        Id::ED25519 | Id::ED448 => {
            let curve = if pkey.id() == Id::ED25519 {
                "Ed25519"
            } else {
                "Ed448"
            };
            let mut jwk = Jwk::new("OKP");
            jwk.set_parameter("crv", Some(Value::String(curve.to_string())))?;
            jwk.set_parameter("x", Some(b64(pkey.raw_public_key()?)))?;
            Ok(jwk)
        }
        _ => bail!("Unsupported certificate key type."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::InMemoryJwkStore;
    use crate::jws::JwsHeader;
    use serde_json::json;

    fn sample_jwk(kid: &str) -> Jwk {
        let mut jwk = Jwk::new("oct");
        jwk.set_key_id(kid);
        jwk.set_parameter("k", Some(json!("c2VjcmV0"))).unwrap();
        jwk
    }

    #[test]
    fn test_load_key_store_hit_is_trusted_verbatim() -> anyhow::Result<()> {
        let store = InMemoryJwkStore::new();
        store.set(sample_jwk("k1"))?;
        let mut service = JwkService::new();
        service.set_store(Box::new(store));

        let loaded = service.load_key(&sample_jwk("k1"))?;
        assert!(loaded.is_trusted());
        assert_eq!(loaded.key_id(), Some("k1"));

        let missed = service.load_key(&sample_jwk("k2"))?;
        assert!(!missed.is_trusted());
        Ok(())
    }

    #[test]
    fn test_resolve_build_key_errors() -> anyhow::Result<()> {
        let service = JwkService::new();
        let mut header = JwsHeader::new();
        header.set_algorithm("HS256");

        match service.resolve_build_key(&header, &[]) {
            Err(JoseError::NoSuitableKey(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        match service.resolve_build_key(&header, &[sample_jwk("k1")]) {
            Err(JoseError::UntrustedKey(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut trusted = sample_jwk("k1");
        trusted.set_trusted(true);
        let resolved = service.resolve_build_key(&header, &[trusted])?;
        assert_eq!(resolved.key_id(), Some("k1"));
        Ok(())
    }

    #[test]
    fn test_resolve_verification_keys_filters_kid() -> anyhow::Result<()> {
        let service = JwkService::new();
        let mut header = JwsHeader::new();
        header.set_key_id("k1");

        let mut matching = sample_jwk("k1");
        matching.set_trusted(true);
        let mut other = sample_jwk("k2");
        other.set_trusted(true);

        let candidates = service.resolve_verification_keys(&header, &[matching, other])?;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key_id(), Some("k1"));
        Ok(())
    }

    #[test]
    fn test_jku_requires_whitelist() -> anyhow::Result<()> {
        #[derive(Debug)]
        struct FixedLoader(Vec<u8>);
        impl JwkSetLoader for FixedLoader {
            fn load(&self, _url: &str) -> Result<Vec<u8>, JoseError> {
                Ok(self.0.clone())
            }
        }

        let set_json = br#"{"keys":[{"kty":"oct","kid":"k1","k":"c2VjcmV0"}]}"#.to_vec();

        let mut service = JwkService::new();
        service.set_loader(Box::new(FixedLoader(set_json.clone())));
        service.set_config(JoseConfig {
            resolve_jku: true,
            trusted_jku: vec!["https://keys.example.com/jwks.json".to_string()],
            ..Default::default()
        });

        let mut header = JwsHeader::new();
        header.set_key_id("k1");
        header.set_jwk_set_url("https://keys.example.com/jwks.json");
        let candidates = service.resolve_verification_keys(&header, &[])?;
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_trusted());

        let mut header = JwsHeader::new();
        header.set_key_id("k1");
        header.set_jwk_set_url("https://evil.example.com/jwks.json");
        let candidates = service.resolve_verification_keys(&header, &[])?;
        assert!(candidates.is_empty());
        Ok(())
    }

    #[test]
    fn test_merge_consistent_detects_mismatch() -> anyhow::Result<()> {
        let mut target = sample_jwk("k1");
        let mut resolved = sample_jwk("k1");
        resolved
            .set_parameter("k", Some(json!("b3RoZXI")))
            .unwrap();
        match merge_consistent(&mut target, &resolved) {
            Err(JoseError::InconsistentKey(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }
}
