use crate::config::{Config, CONTROL_PLANE_MARKERS};
use std::path::PathBuf;

/// Whether this host already runs (or ran) a control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneState {
    Absent,
    /// First marker found.
    Present(PathBuf),
}

pub trait HostProbe: Send + Sync {
    fn control_plane_state(&self) -> ControlPlaneState;
}

/// Looks for the static-pod manifests kubeadm writes on init.
#[derive(Debug, Clone)]
pub struct MarkerFileProbe {
    manifests_dir: PathBuf,
}

impl MarkerFileProbe {
    pub fn new(config: &Config) -> Self {
        Self {
            manifests_dir: config.manifests_dir.clone(),
        }
    }
}

impl HostProbe for MarkerFileProbe {
    fn control_plane_state(&self) -> ControlPlaneState {
        CONTROL_PLANE_MARKERS
            .iter()
            .map(|name| self.manifests_dir.join(name))
            // A marker that cannot be stat-ed counts as present.
            .find(|path| !matches!(path.try_exists(), Ok(false)))
            .map(ControlPlaneState::Present)
            .unwrap_or(ControlPlaneState::Absent)
    }
}
