// Password hashing.
//
// scrypt (N=16384, r=16, p=1, dkLen=64) with a random 16-byte salt.
// Output format: "hex(salt):hex(key)".

use rand::RngCore;
use scrypt::{scrypt, Params};

use devrelay_core::error::{RelayError, Result};

/// Hash a password using scrypt. Returns `salt:key`, both hex-encoded.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt_hex = hex::encode(salt_bytes);

    let key = generate_key(password, &salt_hex)?;
    Ok(format!("{}:{}", salt_hex, hex::encode(key)))
}

/// Verify a password against a hash produced by `hash_password`.
pub fn verify_password(hash: &str, password: &str) -> Result<bool> {
    let (salt, key_hex) = hash
        .split_once(':')
        .ok_or_else(|| RelayError::internal("invalid password hash format"))?;

    let expected_key = hex::decode(key_hex)
        .map_err(|e| RelayError::internal(format!("invalid hex in password hash: {e}")))?;

    let derived_key = generate_key(password, salt)?;
    Ok(constant_time_equal(&derived_key, &expected_key))
}

/// Derive a 64-byte key using scrypt.
fn generate_key(password: &str, salt: &str) -> Result<Vec<u8>> {
    // N=16384 -> log2(N)=14, r=16, p=1, dkLen=64
    let params = Params::new(14, 16, 1, 64)
        .map_err(|e| RelayError::internal(format!("invalid scrypt params: {e}")))?;

    let mut output = vec![0u8; 64];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut output)
        .map_err(|e| RelayError::internal(format!("scrypt failed: {e}")))?;
    Ok(output)
}

/// Constant-time byte comparison; never short-circuits on content.
fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
