//! Fresh key generation per key family, producing private JWKs.

use std::fmt::Display;

use anyhow::bail;
use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use serde_json::Value;

use crate::jwk::Jwk;
use crate::util;
use crate::JoseError;

/// Elliptic curves for ECDSA and ECDH-ES.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    pub fn name(&self) -> &str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    pub(crate) fn nid(&self) -> Nid {
        match self {
            Self::P256 => Nid::X9_62_PRIME256V1,
            Self::P384 => Nid::SECP384R1,
            Self::P521 => Nid::SECP521R1,
        }
    }

    /// Byte length of one coordinate (and of the ECDSA r and s values).
    pub(crate) fn coordinate_len(&self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "P-521" => Some(Self::P521),
            _ => None,
        }
    }
}

impl Display for EcCurve {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(self.name())
    }
}

/// Edwards curves for EdDSA.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EdCurve {
    Ed25519,
    Ed448,
}

impl EdCurve {
    pub fn name(&self) -> &str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::Ed448 => "Ed448",
        }
    }

    pub(crate) fn pkey_id(&self) -> openssl::pkey::Id {
        match self {
            Self::Ed25519 => openssl::pkey::Id::ED25519,
            Self::Ed448 => openssl::pkey::Id::ED448,
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "Ed25519" => Some(Self::Ed25519),
            "Ed448" => Some(Self::Ed448),
            _ => None,
        }
    }
}

/// Montgomery curves for ECDH-ES over OKP keys.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EcxCurve {
    X25519,
    X448,
}

impl EcxCurve {
    pub fn name(&self) -> &str {
        match self {
            Self::X25519 => "X25519",
            Self::X448 => "X448",
        }
    }

    pub(crate) fn pkey_id(&self) -> openssl::pkey::Id {
        match self {
            Self::X25519 => openssl::pkey::Id::X25519,
            Self::X448 => openssl::pkey::Id::X448,
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "X25519" => Some(Self::X25519),
            "X448" => Some(Self::X448),
            _ => None,
        }
    }
}

fn b64(input: impl AsRef<[u8]>) -> Value {
    Value::String(base64::encode_config(input.as_ref(), base64::URL_SAFE_NO_PAD))
}

/// Generate a symmetric key of the given byte length.
pub fn generate_oct_key(len: usize) -> Result<Jwk, JoseError> {
    if len == 0 {
        return Err(JoseError::InvalidKeyFormat(anyhow::anyhow!(
            "The key size must not be empty."
        )));
    }
    let k = util::random_bytes(len);
    let mut jwk = Jwk::new("oct");
    jwk.set_parameter("k", Some(b64(&k)))?;
    Ok(jwk)
}

/// Generate an RSA private key.
///
/// # Arguments
///
/// * `bits` - RSA key length; 2048 or more
pub fn generate_rsa_key(bits: u32) -> Result<Jwk, JoseError> {
    (|| -> anyhow::Result<Jwk> {
        if bits < 2048 {
            bail!("key length must be 2048 or more.");
        }
        let rsa = Rsa::generate(bits)?;
        let mut jwk = Jwk::new("RSA");
        jwk.set_parameter("n", Some(b64(rsa.n().to_vec())))?;
        jwk.set_parameter("e", Some(b64(rsa.e().to_vec())))?;
        jwk.set_parameter("d", Some(b64(rsa.d().to_vec())))?;
        match (rsa.p(), rsa.q(), rsa.dmp1(), rsa.dmq1(), rsa.iqmp()) {
            (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) => {
                jwk.set_parameter("p", Some(b64(p.to_vec())))?;
                jwk.set_parameter("q", Some(b64(q.to_vec())))?;
                jwk.set_parameter("dp", Some(b64(dp.to_vec())))?;
                jwk.set_parameter("dq", Some(b64(dq.to_vec())))?;
                jwk.set_parameter("qi", Some(b64(qi.to_vec())))?;
            }
            _ => bail!("Failed to export the RSA CRT parameters."),
        }
        Ok(jwk)
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InvalidKeyFormat(err),
    })
}

/// Generate an EC private key on the given curve.
pub fn generate_ec_key(curve: EcCurve) -> Result<Jwk, JoseError> {
    (|| -> anyhow::Result<Jwk> {
        let group = EcGroup::from_curve_name(curve.nid())?;
        let ec_key = EcKey::generate(&group)?;
        let mut ctx = BigNumContext::new()?;
        let mut x = openssl::bn::BigNum::new()?;
        let mut y = openssl::bn::BigNum::new()?;
        ec_key
            .public_key()
            .affine_coordinates_gfp(&group, &mut x, &mut y, &mut ctx)?;
        let len = curve.coordinate_len();
        let mut jwk = Jwk::new("EC");
        jwk.set_parameter("crv", Some(Value::String(curve.name().to_string())))?;
        jwk.set_parameter("x", Some(b64(x.to_vec_padded(len as i32)?)))?;
        jwk.set_parameter("y", Some(b64(y.to_vec_padded(len as i32)?)))?;
        jwk.set_parameter(
            "d",
            Some(b64(ec_key.private_key().to_vec_padded(len as i32)?)),
        )?;
        Ok(jwk)
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InvalidKeyFormat(err),
    })
}

/// Generate an Ed25519 or Ed448 private key.
pub fn generate_ed_key(curve: EdCurve) -> Result<Jwk, JoseError> {
    (|| -> anyhow::Result<Jwk> {
        let pkey = match curve {
            EdCurve::Ed25519 => PKey::generate_ed25519()?,
            EdCurve::Ed448 => PKey::generate_ed448()?,
        };
        let mut jwk = Jwk::new("OKP");
        jwk.set_parameter("crv", Some(Value::String(curve.name().to_string())))?;
        jwk.set_parameter("x", Some(b64(pkey.raw_public_key()?)))?;
        jwk.set_parameter("d", Some(b64(pkey.raw_private_key()?)))?;
        Ok(jwk)
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InvalidKeyFormat(err),
    })
}

/// Generate an X25519 or X448 private key.
pub fn generate_ecx_key(curve: EcxCurve) -> Result<Jwk, JoseError> {
    (|| -> anyhow::Result<Jwk> {
        let pkey = match curve {
            EcxCurve::X25519 => PKey::generate_x25519()?,
            EcxCurve::X448 => PKey::generate_x448()?,
        };
        let mut jwk = Jwk::new("OKP");
        jwk.set_parameter("crv", Some(Value::String(curve.name().to_string())))?;
        jwk.set_parameter("x", Some(b64(pkey.raw_public_key()?)))?;
        jwk.set_parameter("d", Some(b64(pkey.raw_private_key()?)))?;
        Ok(jwk)
    })()
    .map_err(|err| match err.downcast::<JoseError>() {
        Ok(err) => err,
        Err(err) => JoseError::InvalidKeyFormat(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_oct_key() -> anyhow::Result<()> {
        let jwk = generate_oct_key(32)?;
        assert_eq!(jwk.key_type(), "oct");
        assert!(jwk.is_private());
        assert!(generate_oct_key(0).is_err());
        Ok(())
    }

    #[test]
    fn test_generate_rsa_key() -> anyhow::Result<()> {
        let jwk = generate_rsa_key(2048)?;
        assert_eq!(jwk.key_type(), "RSA");
        for param in &["n", "e", "d", "p", "q", "dp", "dq", "qi"] {
            assert!(jwk.parameter(param).is_some(), "missing {}", param);
        }
        assert!(generate_rsa_key(1024).is_err());
        Ok(())
    }

    #[test]
    fn test_generate_ec_key() -> anyhow::Result<()> {
        for curve in &[EcCurve::P256, EcCurve::P384, EcCurve::P521] {
            let jwk = generate_ec_key(*curve)?;
            assert_eq!(jwk.key_type(), "EC");
            assert_eq!(
                jwk.parameter("crv").and_then(|v| v.as_str()),
                Some(curve.name())
            );
            let x = jwk.parameter("x").and_then(|v| v.as_str()).unwrap();
            let decoded = base64::decode_config(x, base64::URL_SAFE_NO_PAD)?;
            assert_eq!(decoded.len(), curve.coordinate_len());
        }
        Ok(())
    }

    #[test]
    fn test_generate_ed_key() -> anyhow::Result<()> {
        for curve in &[EdCurve::Ed25519, EdCurve::Ed448] {
            let jwk = generate_ed_key(*curve)?;
            assert_eq!(jwk.key_type(), "OKP");
            assert!(jwk.parameter("x").is_some());
            assert!(jwk.parameter("d").is_some());
        }
        Ok(())
    }

    #[test]
    fn test_generate_ecx_key() -> anyhow::Result<()> {
        for curve in &[EcxCurve::X25519, EcxCurve::X448] {
            let jwk = generate_ecx_key(*curve)?;
            assert_eq!(jwk.key_type(), "OKP");
            assert!(jwk.parameter("d").is_some());
        }
        Ok(())
    }
}
