use crate::error::Result;
use crate::io;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/kubicd/kubicd.yaml";

/// Marker files whose presence means a control plane was already set up.
pub const CONTROL_PLANE_MARKERS: [&str; 3] =
    ["kube-apiserver.yaml", "kube-scheduler.yaml", "etcd.yaml"];

// ---------------------------------------------------------------------------
// ConfigWarning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// RebootConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebootConfig {
    /// transactional-update configuration file.
    #[serde(default = "default_reboot_path")]
    pub path: PathBuf,
    #[serde(default = "default_reboot_key")]
    pub key: String,
    #[serde(default = "default_reboot_value")]
    pub value: String,
}

fn default_reboot_path() -> PathBuf {
    PathBuf::from("/etc/transactional-update.conf")
}

fn default_reboot_key() -> String {
    "REBOOT_METHOD".to_string()
}

fn default_reboot_value() -> String {
    "kured".to_string()
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            path: default_reboot_path(),
            key: default_reboot_key(),
            value: default_reboot_value(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerGrain
// ---------------------------------------------------------------------------

/// Role marker appended on joined nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerGrain {
    #[serde(default = "default_grain_key")]
    pub key: String,
    #[serde(default = "default_grain_value")]
    pub value: String,
}

fn default_grain_key() -> String {
    "kubicd".to_string()
}

fn default_grain_value() -> String {
    "kubic-worker-node".to_string()
}

impl Default for WorkerGrain {
    fn default() -> Self {
        Self {
            key: default_grain_key(),
            value: default_grain_value(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_cri_socket")]
    pub cri_socket: String,
    #[serde(default = "default_runtime_service")]
    pub runtime_service: String,
    #[serde(default = "default_kubelet_service")]
    pub kubelet_service: String,
    #[serde(default = "default_manifests_dir")]
    pub manifests_dir: PathBuf,
    #[serde(default = "default_admin_kubeconfig")]
    pub admin_kubeconfig: PathBuf,
    #[serde(default = "default_deployment_store")]
    pub deployment_store: PathBuf,
    #[serde(default = "default_flannel_manifest")]
    pub flannel_manifest: PathBuf,
    #[serde(default = "default_cilium_manifest")]
    pub cilium_manifest: PathBuf,
    #[serde(default = "default_kured_manifest")]
    pub kured_manifest: PathBuf,
    #[serde(default = "default_flannel_pod_cidr")]
    pub flannel_pod_cidr: String,
    #[serde(default = "default_kubeadm_package")]
    pub kubeadm_package: String,
    #[serde(default)]
    pub reboot: RebootConfig,
    #[serde(default)]
    pub worker_grain: WorkerGrain,
}

fn default_cri_socket() -> String {
    "/run/crio/crio.sock".to_string()
}

fn default_runtime_service() -> String {
    "crio".to_string()
}

fn default_kubelet_service() -> String {
    "kubelet".to_string()
}

fn default_manifests_dir() -> PathBuf {
    PathBuf::from("/etc/kubernetes/manifests")
}

fn default_admin_kubeconfig() -> PathBuf {
    PathBuf::from("/etc/kubernetes/admin.conf")
}

fn default_deployment_store() -> PathBuf {
    PathBuf::from("/var/lib/kubic-control/k8s-yaml.conf")
}

fn default_flannel_manifest() -> PathBuf {
    PathBuf::from("/usr/share/k8s-yaml/flannel/kube-flannel.yaml")
}

fn default_cilium_manifest() -> PathBuf {
    PathBuf::from("/usr/share/k8s-yaml/cilium/cilium.yaml")
}

fn default_kured_manifest() -> PathBuf {
    PathBuf::from("/usr/share/k8s-yaml/kured/kured.yaml")
}

fn default_flannel_pod_cidr() -> String {
    "10.244.0.0/16".to_string()
}

fn default_kubeadm_package() -> String {
    "kubernetes-kubeadm".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cri_socket: default_cri_socket(),
            runtime_service: default_runtime_service(),
            kubelet_service: default_kubelet_service(),
            manifests_dir: default_manifests_dir(),
            admin_kubeconfig: default_admin_kubeconfig(),
            deployment_store: default_deployment_store(),
            flannel_manifest: default_flannel_manifest(),
            cilium_manifest: default_cilium_manifest(),
            kured_manifest: default_kured_manifest(),
            flannel_pod_cidr: default_flannel_pod_cidr(),
            kubeadm_package: default_kubeadm_package(),
            reboot: RebootConfig::default(),
            worker_grain: WorkerGrain::default(),
        }
    }
}

static CIDR_RE: OnceLock<Regex> = OnceLock::new();

fn cidr_re() -> &'static Regex {
    CIDR_RE.get_or_init(|| {
        Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}/\d{1,2}$").expect("static regex")
    })
}

impl Config {
    /// Load from `path`; a missing file yields the stock defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match io::read_optional(path)? {
            Some(data) if !data.trim().is_empty() => Ok(serde_yaml::from_str(&data)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }

    /// `--cri-socket=<socket>` as passed to kubeadm.
    pub fn cri_socket_arg(&self) -> String {
        format!("--cri-socket={}", self.cri_socket)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |field: &str, message: String| {
            warnings.push(ConfigWarning {
                field: field.to_string(),
                message,
            })
        };

        for (field, value) in [
            ("runtime_service", &self.runtime_service),
            ("kubelet_service", &self.kubelet_service),
            ("cri_socket", &self.cri_socket),
        ] {
            if value.trim().is_empty() {
                warn(field, format!("{field} is empty"));
            }
        }

        if !cidr_re().is_match(&self.flannel_pod_cidr) {
            warn(
                "flannel_pod_cidr",
                format!("'{}' is not an IPv4 CIDR", self.flannel_pod_cidr),
            );
        }

        if self.deployment_store.is_relative() {
            warn(
                "deployment_store",
                format!(
                    "'{}' is relative and depends on the working directory",
                    self.deployment_store.display()
                ),
            );
        }

        if self.reboot.key.contains('=') || self.reboot.key.trim().is_empty() {
            warn("reboot.key", format!("'{}' is not a usable key", self.reboot.key));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
