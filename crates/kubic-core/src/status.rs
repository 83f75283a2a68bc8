use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One progress or terminal update sent to the caller of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub success: bool,
    pub message: String,
}

impl StatusMessage {
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("status receiver disconnected")]
pub struct Disconnected;

/// Ordered destination for status messages.
pub trait StatusSink {
    fn send(&mut self, status: StatusMessage) -> Result<(), Disconnected>;
}

impl StatusSink for Vec<StatusMessage> {
    fn send(&mut self, status: StatusMessage) -> Result<(), Disconnected> {
        self.push(status);
        Ok(())
    }
}
