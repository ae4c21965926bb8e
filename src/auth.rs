//! PIN hashing for worker accounts.
//!
//! The phone number acts as a per-worker keying salt so identical PINs
//! hash differently across workers. Cookie/token verification lives in the
//! fronting auth layer; the only consumer here is employee onboarding and
//! login verification.

use subtle::ConstantTimeEq;

/// Hash a PIN keyed by the worker's phone number.
pub fn hash_pin(pin: &str, phone: &str) -> String {
    let key = blake3::hash(phone.as_bytes());
    blake3::keyed_hash(key.as_bytes(), pin.as_bytes())
        .to_hex()
        .to_string()
}

/// Verify a PIN against a stored hash in constant time.
pub fn verify_pin(pin: &str, phone: &str, stored: &str) -> bool {
    let computed = hash_pin(pin, phone);
    computed.as_bytes().ct_eq(stored.as_bytes()).into()
}
