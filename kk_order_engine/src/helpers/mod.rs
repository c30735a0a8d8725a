mod order_ids;
mod payment_signature;

pub use order_ids::{generate_order_id, is_valid_receipt};
pub use payment_signature::{hmac_sha256_hex, verify_hmac_sha256_hex, PaymentSignature};
