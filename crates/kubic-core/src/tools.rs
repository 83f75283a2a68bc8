use serde::Serialize;
use std::path::PathBuf;

/// External programs the workflows shell out to.
pub const REQUIRED_TOOLS: [&str; 5] = ["kubeadm", "kubectl", "salt", "systemctl", "rpm"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub name: &'static str,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

/// Locate every required tool on `PATH`.
pub fn check_tools() -> Vec<ToolStatus> {
    REQUIRED_TOOLS
        .iter()
        .map(|&name| ToolStatus {
            name,
            path: which::which(name).ok(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_required_tool() {
        let names: Vec<&str> = check_tools().iter().map(|t| t.name).collect();
        assert_eq!(names, REQUIRED_TOOLS.to_vec());
    }
}
