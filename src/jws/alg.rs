pub mod ecdsa;
pub mod eddsa;
pub mod hmac;
pub mod rsassa;
pub mod rsassa_pss;
pub mod unsecured;
