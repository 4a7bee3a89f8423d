use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use openssl::bn::{BigNum, BigNumContext};
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{PKey, Private, Public};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::jwe::alg::aeskw::{unwrap_key, wrap_key};
use crate::jwe::{
    JweAlgorithm, JweContentEncryption, JweDecrypter, JweEncrypter, JweHeader, KeyManagementKind,
};
use crate::jwk::key_generator::{EcCurve, EcxCurve};
use crate::jwk::Jwk;
use crate::jws::alg::rsassa::decode_parameter;
use crate::util;
use crate::JoseError;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum EcdhEsJweAlgorithm {
    /// ECDH-ES using Concat KDF, direct key agreement
    EcdhEs,
    /// ECDH-ES using Concat KDF and "A128KW" wrapping
    EcdhEsA128kw,
    /// ECDH-ES using Concat KDF and "A192KW" wrapping
    EcdhEsA192kw,
    /// ECDH-ES using Concat KDF and "A256KW" wrapping
    EcdhEsA256kw,
}

/// The curve an agreement key lives on: a NIST P curve or a Montgomery
/// curve over an OKP key.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum AgreementCurve {
    Ec(EcCurve),
    Ecx(EcxCurve),
}

impl AgreementCurve {
    fn name(&self) -> &str {
        match self {
            Self::Ec(curve) => curve.name(),
            Self::Ecx(curve) => curve.name(),
        }
    }
}

impl EcdhEsJweAlgorithm {
    pub fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<EcdhEsJweEncrypter, JoseError> {
        (|| -> anyhow::Result<EcdhEsJweEncrypter> {
            self.check_jwk(jwk)?;
            let curve = agreement_curve_from_jwk(jwk)?;
            let public_key = agreement_public_key_from_jwk(jwk, curve)?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(EcdhEsJweEncrypter {
                algorithm: *self,
                curve,
                public_key,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    pub fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<EcdhEsJweDecrypter, JoseError> {
        (|| -> anyhow::Result<EcdhEsJweDecrypter> {
            self.check_jwk(jwk)?;
            let curve = agreement_curve_from_jwk(jwk)?;
            let private_key = agreement_private_key_from_jwk(jwk, curve)?;
            let key_id = jwk.key_id().map(|val| val.to_string());

            Ok(EcdhEsJweDecrypter {
                algorithm: *self,
                curve,
                private_key,
                key_id,
            })
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn check_jwk(&self, jwk: &Jwk) -> anyhow::Result<()> {
        match jwk.key_type() {
            "EC" | "OKP" => {}
            val => bail!("A parameter kty must be EC or OKP: {}", val),
        }
        match jwk.key_use() {
            Some(val) if val == "enc" => {}
            None => {}
            Some(val) => bail!("A parameter use must be enc: {}", val),
        }
        if !jwk.is_for_key_operation("deriveKey") {
            bail!("A parameter key_ops must contains deriveKey.");
        }
        match jwk.algorithm() {
            Some(val) if val == self.name() => {}
            None => {}
            Some(val) => bail!("A parameter alg must be {} but {}", self.name(), val),
        }
        Ok(())
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::EcdhEs)
    }

    fn wrap_key_len(&self) -> usize {
        match self {
            Self::EcdhEs => 0,
            Self::EcdhEsA128kw => 16,
            Self::EcdhEsA192kw => 24,
            Self::EcdhEsA256kw => 32,
        }
    }
}

fn agreement_curve_from_jwk(jwk: &Jwk) -> anyhow::Result<AgreementCurve> {
    let crv = match jwk.parameter("crv") {
        Some(Value::String(val)) => val,
        Some(_) => bail!("A parameter crv must be a string."),
        None => bail!("A parameter crv is required."),
    };
    match jwk.key_type() {
        "EC" => match EcCurve::from_name(crv) {
            Some(curve) => Ok(AgreementCurve::Ec(curve)),
            None => bail!("Unsupported EC curve: {}", crv),
        },
        _ => match EcxCurve::from_name(crv) {
            Some(curve) => Ok(AgreementCurve::Ecx(curve)),
            None => bail!("Unsupported OKP agreement curve: {}", crv),
        },
    }
}

fn agreement_public_key_from_jwk(
    jwk: &Jwk,
    curve: AgreementCurve,
) -> anyhow::Result<PKey<Public>> {
    match curve {
        AgreementCurve::Ec(curve) => {
            let group = EcGroup::from_curve_name(curve.nid())?;
            let x = decode_parameter(jwk, "x")?;
            let y = decode_parameter(jwk, "y")?;
            let x = BigNum::from_slice(&x)?;
            let y = BigNum::from_slice(&y)?;
            let mut ctx = BigNumContext::new()?;
            let mut point = EcPoint::new(&group)?;
            point.set_affine_coordinates_gfp(&group, &x, &y, &mut ctx)?;
            let ec_key = EcKey::from_public_key(&group, &point)?;
            ec_key.check_key()?;
            Ok(PKey::from_ec_key(ec_key)?)
        }
        AgreementCurve::Ecx(curve) => {
            let x = decode_parameter(jwk, "x")?;
            Ok(PKey::public_key_from_raw_bytes(&x, curve.pkey_id())?)
        }
    }
}

fn agreement_private_key_from_jwk(
    jwk: &Jwk,
    curve: AgreementCurve,
) -> anyhow::Result<PKey<Private>> {
    match curve {
        AgreementCurve::Ec(curve) => {
            let group = EcGroup::from_curve_name(curve.nid())?;
            let d = decode_parameter(jwk, "d")?;
            let d = BigNum::from_slice(&d)?;
            let x = decode_parameter(jwk, "x")?;
            let y = decode_parameter(jwk, "y")?;
            let x = BigNum::from_slice(&x)?;
            let y = BigNum::from_slice(&y)?;
            let mut ctx = BigNumContext::new()?;
            let mut point = EcPoint::new(&group)?;
            point.set_affine_coordinates_gfp(&group, &x, &y, &mut ctx)?;
            let ec_key = EcKey::from_private_components(&group, &d, &point)?;
            ec_key.check_key()?;
            Ok(PKey::from_ec_key(ec_key)?)
        }
        AgreementCurve::Ecx(curve) => {
            let d = decode_parameter(jwk, "d")?;
            Ok(PKey::private_key_from_raw_bytes(&d, curve.pkey_id())?)
        }
    }
}

/// Generate an ephemeral key pair on the curve and return it with its
/// minified public JWK.
fn generate_ephemeral_key(curve: AgreementCurve) -> anyhow::Result<(PKey<Private>, Jwk)> {
    fn b64(input: impl AsRef<[u8]>) -> Value {
        Value::String(base64::encode_config(
            input.as_ref(),
            base64::URL_SAFE_NO_PAD,
        ))
    }

    match curve {
        AgreementCurve::Ec(curve) => {
            let group = EcGroup::from_curve_name(curve.nid())?;
            let ec_key = EcKey::generate(&group)?;
            let mut ctx = BigNumContext::new()?;
            let mut x = BigNum::new()?;
            let mut y = BigNum::new()?;
            ec_key
                .public_key()
                .affine_coordinates_gfp(&group, &mut x, &mut y, &mut ctx)?;
            let len = curve.coordinate_len() as i32;

            let mut epk = Jwk::new("EC");
            epk.set_parameter("crv", Some(Value::String(curve.name().to_string())))?;
            epk.set_parameter("x", Some(b64(x.to_vec_padded(len)?)))?;
            epk.set_parameter("y", Some(b64(y.to_vec_padded(len)?)))?;

            Ok((PKey::from_ec_key(ec_key)?, epk))
        }
        AgreementCurve::Ecx(curve) => {
            let pkey = match curve {
                EcxCurve::X25519 => PKey::generate_x25519()?,
                EcxCurve::X448 => PKey::generate_x448()?,
            };
            let mut epk = Jwk::new("OKP");
            epk.set_parameter("crv", Some(Value::String(curve.name().to_string())))?;
            epk.set_parameter("x", Some(b64(pkey.raw_public_key()?)))?;
            Ok((pkey, epk))
        }
    }
}

/// The Concat KDF of NIST SP 800-56A with SHA-256, as profiled by RFC 7518
/// §4.6.2.
fn concat_kdf(
    z: &[u8],
    algorithm_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_len: usize,
) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let mut other_info = Vec::new();
    other_info.extend_from_slice(&(algorithm_id.len() as u32).to_be_bytes());
    other_info.extend_from_slice(algorithm_id.as_bytes());
    other_info.extend_from_slice(&(apu.len() as u32).to_be_bytes());
    other_info.extend_from_slice(apu);
    other_info.extend_from_slice(&(apv.len() as u32).to_be_bytes());
    other_info.extend_from_slice(apv);
    other_info.extend_from_slice(&((key_len * 8) as u32).to_be_bytes());

    let md = MessageDigest::sha256();
    let reps = util::ceiling(key_len, md.size());
    let mut derived = Zeroizing::new(Vec::with_capacity(reps * md.size()));
    for counter in 1..=(reps as u32) {
        let mut input = Vec::with_capacity(4 + z.len() + other_info.len());
        input.extend_from_slice(&counter.to_be_bytes());
        input.extend_from_slice(z);
        input.extend_from_slice(&other_info);
        let digest = hash(md, &input)?;
        derived.extend_from_slice(&digest);
    }
    derived.truncate(key_len);
    Ok(derived)
}

/// Derive the key agreement output for one operation.
fn derive_key(
    private_key: &PKey<Private>,
    peer: &PKey<Public>,
    algorithm_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_len: usize,
) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let mut deriver = Deriver::new(private_key)?;
    deriver.set_peer(peer)?;
    let z = Zeroizing::new(deriver.derive_to_vec()?);
    concat_kdf(&z, algorithm_id, apu, apv, key_len)
}

impl JweAlgorithm for EcdhEsJweAlgorithm {
    fn name(&self) -> &str {
        match self {
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256kw => "ECDH-ES+A256KW",
        }
    }

    fn key_type(&self) -> &str {
        "EC"
    }

    fn kind(&self) -> KeyManagementKind {
        if self.is_direct() {
            KeyManagementKind::Direct
        } else {
            KeyManagementKind::Wrap
        }
    }

    fn processed_parameters(&self) -> Vec<&str> {
        vec!["epk", "apu", "apv"]
    }

    fn encrypter_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JweEncrypter>, JoseError> {
        Ok(Box::new(self.encrypter_from_jwk(jwk)?))
    }

    fn decrypter_from_jwk(&self, jwk: &Jwk) -> Result<Box<dyn JweDecrypter>, JoseError> {
        Ok(Box::new(self.decrypter_from_jwk(jwk)?))
    }

    fn box_clone(&self) -> Box<dyn JweAlgorithm> {
        Box::new(*self)
    }
}

impl fmt::Display for EcdhEsJweAlgorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for EcdhEsJweAlgorithm {
    type Target = dyn JweAlgorithm;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct EcdhEsJweEncrypter {
    algorithm: EcdhEsJweAlgorithm,
    curve: AgreementCurve,
    public_key: PKey<Public>,
    key_id: Option<String>,
}

impl EcdhEsJweEncrypter {
    /// Generate the ephemeral key pair, emit epk and derive the agreement
    /// output for the given length.
    fn agree(
        &self,
        header: &mut JweHeader,
        algorithm_id: &str,
        key_len: usize,
    ) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        let (ephemeral_key, epk) = generate_ephemeral_key(self.curve)?;
        header.set_ephemeral_public_key(epk);

        let apu = header.agreement_partyuinfo().unwrap_or_default();
        let apv = header.agreement_partyvinfo().unwrap_or_default();
        derive_key(
            &ephemeral_key,
            &self.public_key,
            algorithm_id,
            &apu,
            &apv,
            key_len,
        )
    }
}

impl JweEncrypter for EcdhEsJweEncrypter {
    fn algorithm(&self) -> &dyn JweAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn compute_content_encryption_key(
        &self,
        cipher: &dyn JweContentEncryption,
        header: &mut JweHeader,
    ) -> Result<Option<Cow<[u8]>>, JoseError> {
        (|| -> anyhow::Result<Option<Cow<[u8]>>> {
            if !self.algorithm.is_direct() {
                return Ok(None);
            }
            // for direct key agreement AlgorithmID is the enc value and
            // the derived key is the CEK
            let derived = self.agree(header, cipher.name(), cipher.key_len())?;
            Ok(Some(Cow::Owned(derived.to_vec())))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn encrypt(
        &self,
        key: &[u8],
        _cipher: &dyn JweContentEncryption,
        header: &mut JweHeader,
    ) -> Result<Option<Vec<u8>>, JoseError> {
        (|| -> anyhow::Result<Option<Vec<u8>>> {
            if self.algorithm.is_direct() {
                return Ok(None);
            }
            let wrap_len = self.algorithm.wrap_key_len();
            let derived = self.agree(header, self.algorithm.name(), wrap_len)?;
            let encrypted_key = wrap_key(&derived, key)?;
            Ok(Some(encrypted_key))
        })()
        .map_err(|err| match err.downcast::<JoseError>() {
            Ok(err) => err,
            Err(err) => JoseError::InvalidKeyFormat(err),
        })
    }

    fn box_clone(&self) -> Box<dyn JweEncrypter> {
        Box::new(self.clone())
    }
}

impl Deref for EcdhEsJweEncrypter {
    type Target = dyn JweEncrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[derive(Debug, Clone)]
pub struct EcdhEsJweDecrypter {
    algorithm: EcdhEsJweAlgorithm,
    curve: AgreementCurve,
    private_key: PKey<Private>,
    key_id: Option<String>,
}

impl JweDecrypter for EcdhEsJweDecrypter {
    fn algorithm(&self) -> &dyn JweAlgorithm {
        &self.algorithm
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn decrypt(
        &self,
        encrypted_key: Option<&[u8]>,
        cipher: &dyn JweContentEncryption,
        header: &JweHeader,
    ) -> Result<Cow<[u8]>, JoseError> {
        (|| -> anyhow::Result<Cow<[u8]>> {
            let epk = match header.ephemeral_public_key() {
                Some(val) => val,
                None => bail!("The epk header claim is required."),
            };
            let epk_curve = agreement_curve_from_jwk(&epk)?;
            if epk_curve != self.curve {
                bail!(
                    "The epk curve must be {}: {}",
                    self.curve.name(),
                    epk_curve.name()
                );
            }
            let peer = agreement_public_key_from_jwk(&epk, epk_curve)?;

            let apu = header.agreement_partyuinfo().unwrap_or_default();
            let apv = header.agreement_partyvinfo().unwrap_or_default();

            if self.algorithm.is_direct() {
                match encrypted_key {
                    None => {}
                    Some(val) if val.is_empty() => {}
                    Some(_) => bail!("The ECDH-ES encrypted key must be empty."),
                }
                let derived = derive_key(
                    &self.private_key,
                    &peer,
                    cipher.name(),
                    &apu,
                    &apv,
                    cipher.key_len(),
                )?;
                Ok(Cow::Owned(derived.to_vec()))
            } else {
                let encrypted_key = match encrypted_key {
                    Some(val) => val,
                    None => bail!("A encrypted_key value is required."),
                };
                let wrap_len = self.algorithm.wrap_key_len();
                let derived = derive_key(
                    &self.private_key,
                    &peer,
                    self.algorithm.name(),
                    &apu,
                    &apv,
                    wrap_len,
                )?;
                let key = unwrap_key(&derived, encrypted_key)?;
                if key.len() != cipher.key_len() {
                    bail!("The unwrapped key size must be {}.", cipher.key_len());
                }
                Ok(Cow::Owned(key))
            }
        })()
        .map_err(|_| JoseError::DecryptionFailed)
    }

    fn box_clone(&self) -> Box<dyn JweDecrypter> {
        Box::new(self.clone())
    }
}

impl Deref for EcdhEsJweDecrypter {
    type Target = dyn JweDecrypter;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::enc::aesgcm::AesgcmJweEncryption;
    use crate::jwk::key_generator::{generate_ec_key, generate_ecx_key};

    #[test]
    fn test_direct_agreement_derives_the_same_cek() -> anyhow::Result<()> {
        let enc = AesgcmJweEncryption::A256gcm;
        let jwk = generate_ec_key(EcCurve::P256)?;
        let public = jwk.to_public_key().unwrap();

        let encrypter = EcdhEsJweAlgorithm::EcdhEs.encrypter_from_jwk(&public)?;
        let mut header = JweHeader::new();
        header.set_agreement_partyuinfo(b"alice");
        header.set_agreement_partyvinfo(b"bob");

        let cek = encrypter
            .compute_content_encryption_key(&enc, &mut header)?
            .unwrap();
        assert_eq!(cek.len(), enc.key_len());
        assert_eq!(encrypter.encrypt(&cek, &enc, &mut header)?, None);

        let epk = header.ephemeral_public_key().unwrap();
        assert_eq!(epk.key_type(), "EC");
        assert!(epk.parameter("d").is_none());

        let decrypter = EcdhEsJweAlgorithm::EcdhEs.decrypter_from_jwk(&jwk)?;
        let recovered = decrypter.decrypt(None, &enc, &header)?;
        assert_eq!(cek.as_ref(), recovered.as_ref());
        Ok(())
    }

    #[test]
    fn test_agreement_with_key_wrapping() -> anyhow::Result<()> {
        let enc = AesgcmJweEncryption::A128gcm;

        for alg in &[
            EcdhEsJweAlgorithm::EcdhEsA128kw,
            EcdhEsJweAlgorithm::EcdhEsA192kw,
            EcdhEsJweAlgorithm::EcdhEsA256kw,
        ] {
            for curve in &[EcCurve::P256, EcCurve::P384, EcCurve::P521] {
                let jwk = generate_ec_key(*curve)?;
                let public = jwk.to_public_key().unwrap();

                let encrypter = alg.encrypter_from_jwk(&public)?;
                let mut header = JweHeader::new();
                let cek = crate::util::random_bytes(enc.key_len());
                let encrypted_key = encrypter.encrypt(&cek, &enc, &mut header)?.unwrap();

                let decrypter = alg.decrypter_from_jwk(&jwk)?;
                let recovered = decrypter.decrypt(Some(&encrypted_key), &enc, &header)?;
                assert_eq!(recovered.as_ref(), cek.as_slice());
            }
        }

        Ok(())
    }

    #[test]
    fn test_agreement_over_montgomery_curves() -> anyhow::Result<()> {
        let enc = AesgcmJweEncryption::A256gcm;

        for curve in &[EcxCurve::X25519, EcxCurve::X448] {
            let jwk = generate_ecx_key(*curve)?;
            let public = jwk.to_public_key().unwrap();

            let encrypter = EcdhEsJweAlgorithm::EcdhEs.encrypter_from_jwk(&public)?;
            let mut header = JweHeader::new();
            let cek = encrypter
                .compute_content_encryption_key(&enc, &mut header)?
                .unwrap();

            let decrypter = EcdhEsJweAlgorithm::EcdhEs.decrypter_from_jwk(&jwk)?;
            let recovered = decrypter.decrypt(None, &enc, &header)?;
            assert_eq!(cek.as_ref(), recovered.as_ref());
        }

        Ok(())
    }

    #[test]
    fn test_concat_kdf_rfc7518_appendix_c() -> anyhow::Result<()> {
        // RFC 7518 appendix C test vector
        let z: Vec<u8> = vec![
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251,
            49, 110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let apu = b"Alice";
        let apv = b"Bob";
        let derived = concat_kdf(&z, "A128GCM", apu, apv, 16)?;
        let expected: Vec<u8> = vec![
            86, 170, 141, 234, 248, 35, 109, 32, 92, 34, 40, 205, 113, 167, 16, 26,
        ];
        assert_eq!(derived.as_slice(), expected.as_slice());
        Ok(())
    }
}
