// crates/orderflow-evidence-fs/src/fs.rs
// ============================================================================
// Module: Filesystem Evidence Store
// Description: Write-once blob storage with capability-token reads.
// Purpose: Implement the evidence interface over a plain directory tree.
// Dependencies: orderflow-core, rand, sha2
// ============================================================================

//! ## Overview
//! Every stored path is validated against traversal and length limits before
//! touching the filesystem. Writes land in a temp file and rename into
//! place, so a crash never leaves a half-written artifact; a rewrite with
//! different bytes fails closed. Audit-prefixed paths are made read-only
//! after sealing. Presigned reads produce `path?expires=..&roles=..&token=..`
//! capabilities keyed by a per-process secret; the serving layer calls
//! [`FsEvidenceStore::verify_presign`] before answering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use orderflow_core::EvidenceStore;
use orderflow_core::EvidenceStoreError;
use orderflow_core::Sha256Digest;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4_096;
/// Path prefix whose artifacts are sealed read-only.
const AUDIT_SEGMENT: &str = "/audit/";

// ============================================================================
// SECTION: Store
// ============================================================================

/// Parsed presign capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignToken {
    /// Store-relative path the capability grants.
    pub path: String,
    /// Unix-second expiry.
    pub expires: u64,
    /// Roles the capability was issued for.
    pub roles: Vec<String>,
    /// Capability digest.
    pub token: String,
}

/// Filesystem-backed evidence store.
pub struct FsEvidenceStore {
    /// Root directory all paths resolve under.
    root: PathBuf,
    /// Per-process capability secret.
    secret: [u8; 32],
}

impl FsEvidenceStore {
    /// Creates a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError::Unavailable`] when the root cannot be
    /// created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, EvidenceStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        let mut secret = [0_u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Ok(Self {
            root,
            secret,
        })
    }

    /// Resolves and validates a store-relative path.
    fn resolve(&self, path: &str) -> Result<PathBuf, EvidenceStoreError> {
        if path.is_empty() || path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(EvidenceStoreError::InvalidPath(path.to_string()));
        }
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    if segment.len() > MAX_PATH_COMPONENT_LENGTH {
                        return Err(EvidenceStoreError::InvalidPath(path.to_string()));
                    }
                }
                _ => return Err(EvidenceStoreError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }

    /// Computes the capability digest for a path/expiry/roles triple.
    fn capability(&self, path: &str, expires: u64, roles: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(path.as_bytes());
        hasher.update(expires.to_be_bytes());
        for role in roles {
            hasher.update(role.as_bytes());
            hasher.update([0_u8]);
        }
        Sha256Digest::of_bytes(&hasher.finalize()).as_str().to_string()
    }

    /// Verifies a presign capability against the path and current time.
    #[must_use]
    pub fn verify_presign(&self, token: &PresignToken, now_unix: u64) -> bool {
        now_unix <= token.expires
            && self.capability(&token.path, token.expires, &token.roles) == token.token
    }

    /// Marks audit-path artifacts read-only on disk.
    fn seal_if_audit(&self, path: &str, full: &Path) {
        let audit = path.contains(AUDIT_SEGMENT) || path.starts_with("logs/");
        if audit
            && let Ok(metadata) = fs::metadata(full)
        {
            let mut permissions = metadata.permissions();
            permissions.set_readonly(true);
            // Sealing is advisory on filesystems without permission support.
            let _unused = fs::set_permissions(full, permissions);
        }
    }
}

impl EvidenceStore for FsEvidenceStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<Sha256Digest, EvidenceStoreError> {
        let full = self.resolve(path)?;
        if let Ok(existing) = fs::read(&full) {
            if existing == bytes {
                return Ok(Sha256Digest::of_bytes(bytes));
            }
            return Err(EvidenceStoreError::Immutable(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        }

        let temp = full.with_extension("tmp-write");
        {
            let mut file = fs::File::create(&temp)
                .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
            file.write_all(bytes)
                .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
            file.sync_all().map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        }
        fs::rename(&temp, &full)
            .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        self.seal_if_audit(path, &full);
        Ok(Sha256Digest::of_bytes(bytes))
    }

    fn put_append(&self, path: &str, record: &str) -> Result<(), EvidenceStoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        file.write_all(record.as_bytes())
            .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        file.write_all(b"\n")
            .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?;
        file.sync_all().map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, EvidenceStoreError> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                EvidenceStoreError::NotFound(path.to_string())
            } else {
                EvidenceStoreError::Unavailable(err.to_string())
            }
        })
    }

    fn presign_read(
        &self,
        path: &str,
        ttl: Duration,
        allowed_roles: &[String],
    ) -> Result<String, EvidenceStoreError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(EvidenceStoreError::NotFound(path.to_string()));
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| EvidenceStoreError::Unavailable(err.to_string()))?
            .as_secs();
        let expires = now.saturating_add(ttl.as_secs());
        let token = self.capability(path, expires, allowed_roles);
        Ok(format!("{path}?expires={expires}&roles={}&token={token}", allowed_roles.join(",")))
    }
}
