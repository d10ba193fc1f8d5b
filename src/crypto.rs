//! Symmetric encryption for Warden heartbeat traffic.
//!
//! Implements the OpenSSL `enc` default framing so payloads interoperate with
//! already-deployed clients: base64 over `Salted__` || 8-byte salt ||
//! AES-256-CBC/PKCS7 ciphertext, with key material derived by a single
//! EVP_BytesToKey pass over MD5. This is a legacy-compatible scheme, kept
//! byte-for-byte; it is not a security upgrade target. There is no integrity
//! tag, so authentication comes from the application checks layered on top.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::errors::{WardenError, WardenResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// 8-byte magic literal at the start of every ciphertext.
pub const SALTED_MAGIC: &[u8; 8] = b"Salted__";

/// Salt length in bytes, fixed at bytes [8, 16) of the framing.
pub const SALT_SIZE: usize = 8;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// Derive an AES-256 key and IV from a password and salt.
///
/// EVP_BytesToKey with MD5 and exactly one iteration:
/// `D0 = MD5(password || salt)`, `Di = MD5(D(i-1) || password || salt)`;
/// the first 48 bytes of `D0 || D1 || D2` split into key and IV.
fn evp_bytes_to_key(password: &[u8], salt: &[u8]) -> ([u8; KEY_SIZE], [u8; IV_SIZE]) {
    let mut material = Vec::with_capacity(KEY_SIZE + IV_SIZE);
    let mut prev: Vec<u8> = Vec::new();

    while material.len() < KEY_SIZE + IV_SIZE {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        material.extend_from_slice(&prev);
    }

    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; IV_SIZE];
    key.copy_from_slice(&material[..KEY_SIZE]);
    iv.copy_from_slice(&material[KEY_SIZE..KEY_SIZE + IV_SIZE]);

    (key, iv)
}

/// Encrypt arbitrary bytes under a password, returning base64 text.
///
/// A fresh random salt is generated per call, so ciphertexts for identical
/// inputs differ between calls.
pub fn encrypt(plaintext: &[u8], password: &str) -> WardenResult<String> {
    let mut salt = [0u8; SALT_SIZE];
    let mut rng = OsRng;

    rng.try_fill_bytes(&mut salt)
        .expect("OsRng failed to generate salt");

    let (key, iv) = evp_bytes_to_key(password.as_bytes(), &salt);

    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut framed = Vec::with_capacity(SALTED_MAGIC.len() + SALT_SIZE + ciphertext.len());
    framed.extend_from_slice(SALTED_MAGIC);
    framed.extend_from_slice(&salt);
    framed.extend_from_slice(&ciphertext);

    Ok(B64.encode(framed))
}

/// Decrypt base64 text produced by [`encrypt`] (or any OpenSSL-compatible
/// producer) under a password.
///
/// Fails with `WardenError::DecryptionError` when base64 decoding fails, the
/// magic prefix is absent, or the final unpad step fails. A wrong password
/// surfaces as an unpad failure in all but pathological cases.
pub fn decrypt(ciphertext_b64: &str, password: &str) -> WardenResult<Vec<u8>> {
    let framed = B64
        .decode(ciphertext_b64)
        .map_err(|e| WardenError::DecryptionError(format!("base64 decode failed: {e}")))?;

    if framed.len() < SALTED_MAGIC.len() + SALT_SIZE {
        return Err(WardenError::DecryptionError(
            "ciphertext too short".to_string(),
        ));
    }

    if &framed[..SALTED_MAGIC.len()] != SALTED_MAGIC {
        return Err(WardenError::DecryptionError(
            "invalid encrypted data format".to_string(),
        ));
    }

    let salt = &framed[SALTED_MAGIC.len()..SALTED_MAGIC.len() + SALT_SIZE];
    let body = &framed[SALTED_MAGIC.len() + SALT_SIZE..];

    let (key, iv) = evp_bytes_to_key(password.as_bytes(), salt);

    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|e| WardenError::DecryptionError(format!("unpad failed: {e}")))?;

    Ok(plaintext)
}
