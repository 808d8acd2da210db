// src/errors.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceControlError {
    #[error("Failed to connect to the service control manager: {0}")]
    ManagerOpenError(String),

    #[error("Failed to open service '{0}': {1}")]
    ServiceOpenError(String, String),

    #[error("Failed to query configuration of service '{0}': {1}")]
    QueryError(String, String),

    #[error("Unrecognized start type {1} reported for service '{0}'")]
    UnknownStartType(String, u32),

    #[error("Start mode '{0}' cannot be written back")]
    UnsupportedStartMode(String),

    #[error("Failed to reconfigure service '{0}': {1}")]
    ConfigureError(String, String),

    #[error("Failed to stop service '{0}': {1}")]
    StopError(String, String),
}

#[derive(Error, Debug)]
pub enum RegistryControlError {
    #[error("Invalid registry key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Unsupported registry hive: {0}")]
    UnsupportedHive(String),

    #[error("Failed to open registry key: {0}")]
    KeyOpenError(String),

    #[error("Failed to read registry value: {0}")]
    ReadValueError(String),

    #[error("Failed to set registry value: {0}")]
    SetValueError(String),

    #[error("Failed to delete registry value: {0}")]
    DeleteValueError(String),

    #[error("Failed to create registry key: {0}")]
    CreateError(String),
}
