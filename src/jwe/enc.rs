pub mod aescbc_hmac;
pub mod aesgcm;
