//! Revoked assertion identifiers, partitioned by token family.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt revocation entry at {path}:{line}")]
    Corrupt { path: PathBuf, line: usize },

    #[error("Revocation identifiers must be non-empty and free of whitespace")]
    InvalidIdentifier,
}

/// Set of revoked `(family, id)` pairs. Revocation is permanent: once
/// `is_revoked` reports true for a pair it never reports false again.
pub trait RevocationRegistry: Send + Sync + fmt::Debug {
    /// Marks the pair as revoked. Returns whether it was newly added.
    fn revoke(&self, family: &str, id: &str) -> Result<bool, RevocationError>;

    fn is_revoked(&self, family: &str, id: &str) -> bool;
}

type Key = (String, String);

fn key(family: &str, id: &str) -> Result<Key, RevocationError> {
    let valid = |s: &str| !s.is_empty() && !s.chars().any(char::is_whitespace);
    if valid(family) && valid(id) {
        Ok((family.to_string(), id.to_string()))
    } else {
        Err(RevocationError::InvalidIdentifier)
    }
}

/// Process-local registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryRevocationRegistry {
    entries: Arc<DashSet<Key>>,
}

impl MemoryRevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RevocationRegistry for MemoryRevocationRegistry {
    fn revoke(&self, family: &str, id: &str) -> Result<bool, RevocationError> {
        Ok(self.entries.insert(key(family, id)?))
    }

    fn is_revoked(&self, family: &str, id: &str) -> bool {
        self.entries
            .contains(&(family.to_string(), id.to_string()))
    }
}

/// Registry persisted as an append-only file of `family id` lines, so
/// revocations survive restarts.
#[derive(Debug)]
pub struct FileRevocationRegistry {
    path: PathBuf,
    entries: DashSet<Key>,
    file: Mutex<File>,
}

impl FileRevocationRegistry {
    /// Opens (or creates) the registry file and loads its entries.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RevocationError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let entries = DashSet::new();
        for (index, line) in BufReader::new(&file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(family), Some(id), None) => {
                    entries.insert((family.to_string(), id.to_string()));
                }
                _ => {
                    return Err(RevocationError::Corrupt {
                        path,
                        line: index + 1,
                    });
                }
            }
        }
        tracing::info!("Loaded {} revoked assertions from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RevocationRegistry for FileRevocationRegistry {
    fn revoke(&self, family: &str, id: &str) -> Result<bool, RevocationError> {
        let key = key(family, id)?;
        // The lock orders the membership check with the append, so each pair
        // is written at most once.
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.entries.contains(&key) {
            return Ok(false);
        }
        writeln!(file, "{family} {id}")?;
        file.flush()?;
        self.entries.insert(key);
        Ok(true)
    }

    fn is_revoked(&self, family: &str, id: &str) -> bool {
        self.entries
            .contains(&(family.to_string(), id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAML2: &str = "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
    const SAML11: &str = "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";

    #[test]
    fn test_revoke_is_per_family() {
        let registry = MemoryRevocationRegistry::new();
        assert!(registry.revoke(SAML2, "ID_1").unwrap());
        assert!(!registry.revoke(SAML2, "ID_1").unwrap());

        assert!(registry.is_revoked(SAML2, "ID_1"));
        assert!(!registry.is_revoked(SAML11, "ID_1"));
        assert!(!registry.is_revoked(SAML2, "ID_2"));
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        let registry = MemoryRevocationRegistry::new();
        assert!(matches!(
            registry.revoke(SAML2, ""),
            Err(RevocationError::InvalidIdentifier)
        ));
        assert!(registry.revoke(SAML2, "ID 1").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_revocations_are_monotonic() {
        let registry = MemoryRevocationRegistry::new();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..100 {
                        registry.revoke(SAML2, &format!("ID_{}", (worker * 50) + i)).unwrap();
                        assert!(registry.is_revoked(SAML2, &format!("ID_{}", (worker * 50) + i)));
                    }
                });
            }
        });
        // Ranges overlap between neighbouring workers
        assert_eq!(registry.len(), 7 * 50 + 100);
    }

    #[test]
    fn test_file_registry_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revoked.txt");

        {
            let registry = FileRevocationRegistry::open(&path).unwrap();
            assert!(registry.revoke(SAML2, "ID_a").unwrap());
            assert!(registry.revoke(SAML11, "ID_b").unwrap());
            assert!(!registry.revoke(SAML2, "ID_a").unwrap());
        }

        let reopened = FileRevocationRegistry::open(&path).unwrap();
        assert!(reopened.is_revoked(SAML2, "ID_a"));
        assert!(reopened.is_revoked(SAML11, "ID_b"));
        assert!(!reopened.is_revoked(SAML11, "ID_a"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revoked.txt");
        std::fs::write(&path, "family id\nbroken\n").unwrap();

        match FileRevocationRegistry::open(&path) {
            Err(RevocationError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
