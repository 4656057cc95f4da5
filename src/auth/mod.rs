//! Shared-key authentication for mutating routes.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Number of random bytes in a generated key, rendered as twice as many hex chars.
const GENERATED_KEY_BYTES: usize = 16;

/// Allow-list of API keys, optionally backed by a file with one key per line.
///
/// Blank lines and lines starting with `#` are ignored. The list can be re-read from disk
/// with [`ApiKeyPolicy::reload`] or replaced with a fresh key via [`ApiKeyPolicy::rotate`].
pub struct ApiKeyPolicy {
    keys: RwLock<HashSet<String>>,
    path: Option<PathBuf>,
}

impl ApiKeyPolicy {
    /// Loads keys from `path`. If the file is missing or holds no key, a new key is
    /// generated, written there and logged.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        let keys = if path.exists() {
            read_keys(path)?
        } else {
            HashSet::new()
        };

        let policy = Self {
            keys: RwLock::new(keys),
            path: Some(path.to_path_buf()),
        };
        if policy.key_count() == 0 {
            let key = policy.rotate()?;
            warn!(
                "No API key found in {:?}, generated a new one: {}",
                path, key
            );
        } else {
            info!("Loaded {} API keys from {:?}", policy.key_count(), path);
        }
        Ok(policy)
    }

    /// In-memory policy. `reload` is a no-op and `rotate` does not persist anything.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: RwLock::new(keys.into_iter().map(Into::into).collect()),
            path: None,
        }
    }

    /// Compares `candidate` against every key without short-circuiting on the first
    /// differing byte.
    pub fn is_allowed(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        self.read()
            .iter()
            .fold(false, |found, key| found | constant_time_eq(key.as_bytes(), candidate.as_bytes()))
    }

    pub fn key_count(&self) -> usize {
        self.read().len()
    }

    /// Re-reads the backing file. On error the current list is kept.
    pub fn reload(&self) -> Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.key_count());
        };
        let keys = read_keys(path)?;
        if keys.is_empty() {
            bail!("{:?} contains no API key, keeping the current ones", path);
        }
        let count = keys.len();
        *self.write() = keys;
        info!("Reloaded {} API keys from {:?}", count, path);
        Ok(count)
    }

    /// Replaces every key with a single freshly generated one and returns it.
    pub fn rotate(&self) -> Result<String> {
        let key = generate_key();
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
            std::fs::write(path, format!("{}\n", key))
                .with_context(|| format!("Failed to write API key file {:?}", path))?;
        }
        let mut keys = self.write();
        keys.clear();
        keys.insert(key.clone());
        Ok(key)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashSet<String>> {
        self.keys.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        self.keys
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_keys(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read API key file {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn generate_key() -> String {
    let bytes: [u8; GENERATED_KEY_BYTES] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generates_key_when_file_is_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys").join("api_keys.txt");

        let policy = ApiKeyPolicy::load_or_generate(&path).unwrap();

        let stored = std::fs::read_to_string(&path).unwrap();
        let key = stored.trim();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(policy.is_allowed(key));
        assert_eq!(policy.key_count(), 1);
    }

    #[test]
    fn loads_existing_keys_skipping_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.txt");
        std::fs::write(&path, "# admins\nalpha\n\n  beta  \n").unwrap();

        let policy = ApiKeyPolicy::load_or_generate(&path).unwrap();

        assert_eq!(policy.key_count(), 2);
        assert!(policy.is_allowed("alpha"));
        assert!(policy.is_allowed("beta"));
        assert!(!policy.is_allowed("# admins"));
        assert!(!policy.is_allowed("alph"));
        assert!(!policy.is_allowed(""));
    }

    #[test]
    fn reload_picks_up_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.txt");
        std::fs::write(&path, "alpha\n").unwrap();
        let policy = ApiKeyPolicy::load_or_generate(&path).unwrap();

        std::fs::write(&path, "gamma\n").unwrap();
        assert_eq!(policy.reload().unwrap(), 1);

        assert!(!policy.is_allowed("alpha"));
        assert!(policy.is_allowed("gamma"));
    }

    #[test]
    fn reload_of_empty_file_keeps_current_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.txt");
        std::fs::write(&path, "alpha\n").unwrap();
        let policy = ApiKeyPolicy::load_or_generate(&path).unwrap();

        std::fs::write(&path, "\n").unwrap();
        assert!(policy.reload().is_err());
        assert!(policy.is_allowed("alpha"));
    }

    #[test]
    fn rotate_replaces_every_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.txt");
        std::fs::write(&path, "alpha\nbeta\n").unwrap();
        let policy = ApiKeyPolicy::load_or_generate(&path).unwrap();

        let fresh = policy.rotate().unwrap();

        assert!(!policy.is_allowed("alpha"));
        assert!(!policy.is_allowed("beta"));
        assert!(policy.is_allowed(&fresh));
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), fresh);
    }

    #[test]
    fn in_memory_policy() {
        let policy = ApiKeyPolicy::from_keys(["secret"]);
        assert!(policy.is_allowed("secret"));
        assert!(!policy.is_allowed("Secret"));
        assert_eq!(policy.reload().unwrap(), 1);
    }

    #[test]
    fn constant_time_eq_matches_plain_equality() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
