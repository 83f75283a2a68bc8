use crate::config::RebootConfig;
use crate::error::Result;
use crate::kvfile::KvFile;
use tracing::info;

/// Points transactional-update at the reboot daemon so node reboots are
/// coordinated through it.
pub struct RebootIntegration<'a> {
    config: &'a RebootConfig,
}

impl<'a> RebootIntegration<'a> {
    pub fn new(config: &'a RebootConfig) -> Self {
        Self { config }
    }

    /// Set the reboot-method key, keeping every other line of the file.
    pub fn configure(&self) -> Result<()> {
        let mut file = KvFile::loose_load(&self.config.path)?;
        if file.get(&self.config.key) == Some(self.config.value.as_str()) {
            return Ok(());
        }
        file.set(&self.config.key, &self.config.value)?;
        file.save()?;
        info!(
            path = %self.config.path.display(),
            key = %self.config.key,
            value = %self.config.value,
            "reboot method updated"
        );
        Ok(())
    }

    /// Advisory shown when `configure` fails.
    pub fn manual_advice(&self) -> String {
        format!(
            "Adjusting transactional-update to use {} for reboot failed.\nPlease adjust {} yourself.",
            self.config.value,
            self.config.path.display()
        )
    }
}
