//! Authentication scrambles.
//!
//! SphinxQL listeners usually accept any credentials, but they still run
//! the handshake and announce a plugin. Two plugins are supported:
//!
//! - `mysql_native_password`: `SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))`
//! - `caching_sha2_password` fast path:
//!   `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + seed)`
//!
//! An empty password always produces an empty response.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Authentication plugin names.
pub mod plugins {
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
}

/// Status bytes of the `caching_sha2_password` exchange.
pub mod caching_sha2 {
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Length of the scramble the server sends.
const SEED_LEN: usize = 20;

fn seed(auth_data: &[u8]) -> &[u8] {
    &auth_data[..auth_data.len().min(SEED_LEN)]
}

fn xor<const N: usize>(a: [u8; N], b: [u8; N]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

/// `mysql_native_password` response.
pub fn mysql_native_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();
    let stage3: [u8; 20] = Sha1::new()
        .chain_update(seed(auth_data))
        .chain_update(stage2)
        .finalize()
        .into();
    xor(stage1, stage3)
}

/// `caching_sha2_password` fast-auth response.
pub fn caching_sha2_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let double: [u8; 32] = Sha256::digest(hash).into();
    let scramble: [u8; 32] = Sha256::new()
        .chain_update(double)
        .chain_update(seed(auth_data))
        .finalize()
        .into();
    xor(hash, scramble)
}

/// Response for `plugin`; unknown plugins get the native scramble.
pub fn auth_response(plugin: &str, password: &str, auth_data: &[u8]) -> Vec<u8> {
    match plugin {
        plugins::CACHING_SHA2_PASSWORD => caching_sha2_password(password, auth_data),
        _ => mysql_native_password(password, auth_data),
    }
}
