//! Constructor methods for LunaError

use super::types::LunaError;

impl LunaError {
    /// Create an invalid task error
    pub fn invalid_task(message: impl Into<String>) -> Self {
        Self::InvalidTask {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid task error naming the offending field
    pub fn invalid_task_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidTask {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Create a transfer error
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            path: None,
        }
    }

    /// Create a transfer error for a specific path
    pub fn transfer_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}
