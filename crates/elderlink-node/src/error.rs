use thiserror::Error;

/// Why a guardian command was refused.
///
/// The display text is sent to the guardian verbatim in `command_error`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{action}: {source}")]
    Storage {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl CommandError {
    pub fn storage(action: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| CommandError::Storage { action, source }
    }

    /// Error code used on the local control socket.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Invalid(_) | CommandError::Payload(_) => "invalid_request",
            CommandError::NotFound(_) => "not_found",
            CommandError::Storage { .. } => "storage_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_guardian_readable() {
        assert_eq!(
            CommandError::NotFound("Medication not found").to_string(),
            "Medication not found"
        );
        let e = CommandError::storage("Failed to add medication")(anyhow::anyhow!("disk full"));
        assert_eq!(e.to_string(), "Failed to add medication: disk full");

        let bad = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert!(CommandError::from(bad).to_string().starts_with("Invalid payload:"));
    }

    #[test]
    fn control_codes() {
        assert_eq!(CommandError::Invalid("x").code(), "invalid_request");
        assert_eq!(CommandError::NotFound("x").code(), "not_found");
        let e = CommandError::storage("Failed")(anyhow::anyhow!("io"));
        assert_eq!(e.code(), "storage_error");
    }
}
