//! gatekit bundles two loosely coupled subsystems:
//!
//! * a parameterized URI engine ([`uri`]) that parses, normalizes, renders
//!   and compiles URI templates with glob-style path patterns (`?`, `*`,
//!   `**`), including a matcher and a path-inclusion oracle, and
//! * a JOSE engine ([`jwk`], [`jws`], [`jwe`], [`jwt`]) that builds,
//!   serializes, parses and validates JOSE objects over a registry of JWA
//!   algorithms, resolving keys through pluggable stores and resolvers.

pub mod jwe;
pub mod jwk;
pub mod jws;
pub mod jwt;
pub mod media_type;
pub mod uri;
pub mod util;

mod jose_error;
mod jose_header;

pub use crate::jose_error::JoseError;
pub use crate::jose_header::JoseHeader;
pub use crate::uri::UriError;

pub use serde_json::Map;
pub use serde_json::Value;
