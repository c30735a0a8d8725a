//! # Payment signatures
//!
//! The gateway proves that a payment happened in two ways, and both are HMAC-SHA256 tags encoded as lower-case hex.
//!
//! * The **client callback** carries a signature over the gateway order id and payment id, keyed with the API key
//!   secret that created the gateway order:
//!
//!   ```text
//!      hex(HMAC_SHA256(key_secret, "{gateway_order_id}|{gateway_payment_id}"))
//!   ```
//!
//! * The **webhook** carries a signature over the exact raw request body, keyed with the webhook secret. The body must
//!   be verified byte-for-byte as received. Re-serialising parsed JSON changes the bytes and breaks the tag.
//!
//! Verification always goes through [`Mac::verify_slice`], which compares in constant time.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes `hex(HMAC_SHA256(secret, message))`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length, so `new_from_slice` cannot fail here
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a hex-encoded HMAC-SHA256 tag. Malformed hex is simply an invalid signature.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(tag) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&tag).is_ok()
}

/// The signature the client hands back after paying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSignature<'a> {
    pub gateway_order_id: &'a str,
    pub gateway_payment_id: &'a str,
    pub signature: &'a str,
}

impl<'a> PaymentSignature<'a> {
    pub fn message(&self) -> String {
        format!("{}|{}", self.gateway_order_id, self.gateway_payment_id)
    }

    pub fn sign(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        hmac_sha256_hex(secret.as_bytes(), format!("{gateway_order_id}|{gateway_payment_id}").as_bytes())
    }

    pub fn verify(&self, secret: &str) -> bool {
        verify_hmac_sha256_hex(secret.as_bytes(), self.message().as_bytes(), self.signature)
    }
}
