//! Manifest deployment with a digest-by-path audit record.
//!
//! `deploy` applies a manifest through kubectl and then records the SHA-256
//! of the file under its path in the deployment store. The record is an audit
//! trail: it is overwritten on every deploy and never used to skip one.

use crate::config::Config;
use crate::error::Result;
use crate::kvfile::KvFile;
use crate::runner::{CommandRunner, StepResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Store locking
// ---------------------------------------------------------------------------

static STORE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// One lock per store path, shared by every tracker in the process.
fn store_lock(path: &Path) -> Arc<Mutex<()>> {
    let locks = STORE_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = locks.lock().unwrap_or_else(|e| e.into_inner());
    locks
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// Hex SHA-256 of the file's bytes.
pub fn manifest_digest(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// DeploymentRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// File on disk still hashes to the recorded digest.
    Current,
    /// File changed since it was last deployed.
    Modified,
    /// File no longer readable.
    Missing,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Current => "current",
            DeploymentStatus::Modified => "modified",
            DeploymentStatus::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub path: String,
    pub digest: String,
    pub status: DeploymentStatus,
}

// ---------------------------------------------------------------------------
// DeploymentTracker
// ---------------------------------------------------------------------------

pub struct DeploymentTracker<'a> {
    runner: &'a dyn CommandRunner,
    kubeconfig: PathBuf,
    store: PathBuf,
}

impl<'a> DeploymentTracker<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &Config) -> Self {
        Self {
            runner,
            kubeconfig: config.admin_kubeconfig.clone(),
            store: config.deployment_store.clone(),
        }
    }

    /// Apply `manifest` and record its digest.
    ///
    /// A failure after the apply succeeded means the resource exists in the
    /// cluster but the record is stale; callers must not re-apply for it.
    pub fn deploy(&self, manifest: &Path) -> StepResult {
        let manifest_arg = manifest.to_string_lossy();
        // A path the store cannot hold must fail before anything is applied.
        if let Err(e) = KvFile::check_key(&manifest_arg) {
            return StepResult::failure(format!("Cannot record {}: {e}", manifest.display()));
        }

        let kubeconfig = format!("--kubeconfig={}", self.kubeconfig.display());
        let applied = self
            .runner
            .run("kubectl", &[kubeconfig.as_str(), "apply", "-f", manifest_arg.as_ref()]);
        if !applied.success {
            warn!(manifest = %manifest.display(), "kubectl apply failed");
            return applied;
        }

        let digest = match manifest_digest(manifest) {
            Ok(d) => d,
            Err(e) => {
                return StepResult::failure(format!(
                    "Cannot compute digest of {}: {e}",
                    manifest.display()
                ))
            }
        };

        let lock = store_lock(&self.store);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut records = match KvFile::loose_load(&self.store) {
            Ok(kv) => kv,
            Err(e) => {
                return StepResult::failure(format!("Cannot load {}: {e}", self.store_name()))
            }
        };
        if let Err(e) = records.set(&manifest_arg, &digest) {
            return StepResult::failure(format!("Cannot write {}: {e}", self.store_name()));
        }
        if let Err(e) = records.save() {
            return StepResult::failure(format!("Cannot write {}: {e}", self.store_name()));
        }

        info!(manifest = %manifest.display(), digest = %digest, "manifest deployed");
        StepResult::ok("")
    }

    /// Every recorded manifest with the state of its file today.
    pub fn records(&self) -> Result<Vec<DeploymentRecord>> {
        let kv = {
            let lock = store_lock(&self.store);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            KvFile::loose_load(&self.store)?
        };

        let records = kv
            .entries()
            .map(|(path, digest)| {
                let status = match manifest_digest(Path::new(path)) {
                    Ok(current) if current == digest => DeploymentStatus::Current,
                    Ok(_) => DeploymentStatus::Modified,
                    Err(e) => {
                        debug!(path, error = %e, "recorded manifest unreadable");
                        DeploymentStatus::Missing
                    }
                };
                DeploymentRecord {
                    path: path.to_string(),
                    digest: digest.to_string(),
                    status,
                }
            })
            .collect();
        Ok(records)
    }

    fn store_name(&self) -> String {
        self.store
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.store.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
