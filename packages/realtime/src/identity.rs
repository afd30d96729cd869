//! Local key material offered during key exchange

use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use tracing::{debug, info};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{RealtimeError, RealtimeResult};
use crate::key_store::write_atomically;

/// The local user's X25519 key pair
#[derive(Clone)]
pub struct IdentityKeys {
    secret: StaticSecret,
    public: PublicKey,
}

impl fmt::Debug for IdentityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeys")
            .field("public", &self.public_key_base64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl IdentityKeys {
    /// Generate a fresh key pair from the OS RNG
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Rebuild a key pair from stored secret bytes
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    /// Load the key pair saved at `path`, or generate and save a new one
    ///
    /// The file holds the base64 secret on a single line. A file that exists
    /// but cannot be decoded is an error rather than being replaced, so a
    /// damaged identity is never silently rotated.
    pub fn load_or_create(path: impl AsRef<Path>) -> RealtimeResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                RealtimeError::KeyStore(format!("failed to read {}: {e}", path.display()))
            })?;
            let bytes: [u8; 32] = STANDARD
                .decode(contents.trim())
                .ok()
                .and_then(|raw| raw.try_into().ok())
                .ok_or_else(|| {
                    RealtimeError::KeyStore(format!(
                        "{} does not hold a 32-byte base64 secret",
                        path.display()
                    ))
                })?;
            let keys = Self::from_secret_bytes(bytes);
            debug!(path = %path.display(), "Loaded local key material");
            return Ok(keys);
        }

        let keys = Self::generate();
        let encoded = STANDARD.encode(keys.secret_bytes());
        write_atomically(path, format!("{encoded}\n").as_bytes())?;
        restrict_permissions(path);
        info!(path = %path.display(), "Generated and saved local key material");
        Ok(keys)
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Public key in the form sent on the wire
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    /// Secret bytes, for persisting the key pair
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

/// Keep the secret readable by the owner only
#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!(error = %e, path = %path.display(), "Could not restrict key file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
