//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Certificate generation failed: {message}")]
    CertificateGeneration { message: String },

    #[error("Key generation failed: {message}")]
    KeyGeneration { message: String },

    #[error("Invalid DNS name '{name}': {message}")]
    InvalidDnsName { name: String, message: String },

    #[error("Failed to decode certificate: {message}")]
    CertificateDecode { message: String },

    #[error("Certificate chain is empty")]
    EmptyChain,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
