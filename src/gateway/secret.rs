#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rand::Rng as _;

pub const SECRET_FILE: &str = "recmd_secret";
pub const SECRET_LENGTH: usize = 40;
const SECRET_CHARSET: &[u8] = b"abcdedfghijklmnopqrstABCDEFGHIJKLMNOP123456789";

/// Shared secret every request must present.
#[derive(Clone)]
pub struct Secret {
    value: String,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Secret {
    #[must_use]
    pub fn new(value: String) -> Self {
        Self { value }
    }

    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let value = (0..SECRET_LENGTH)
            .map(|_| char::from(SECRET_CHARSET[rng.gen_range(0..SECRET_CHARSET.len())]))
            .collect();
        Self { value }
    }

    /// Generates a fresh secret and writes it to `path`, replacing any
    /// previous one.
    pub fn rotate(path: &Path) -> anyhow::Result<Self> {
        let secret = Self::generate();
        secret.write_to(path)?;
        tracing::info!(path = %path.display(), "wrote new secret");
        Ok(secret)
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.value.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let value = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if value.len() != SECRET_LENGTH {
            anyhow::bail!(
                "invalid secret length in {}: expected {SECRET_LENGTH}, got {}",
                path.display(),
                value.len()
            );
        }
        Ok(Self { value })
    }

    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        self.value == candidate
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }
}

#[must_use]
pub fn secret_path(conf_dir: &Path) -> PathBuf {
    conf_dir.join(SECRET_FILE)
}
