use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryBankError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Document not found: {0}")]
    UnknownDocument(String),

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
}

impl MemoryBankError {
    pub fn contract(message: impl Into<String>) -> Self {
        MemoryBankError::ContractViolation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MemoryBankError>;

/// Fails with a contract violation when a required document name is empty.
pub(crate) fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MemoryBankError::contract(format!("{} must not be empty", what)));
    }
    Ok(())
}
