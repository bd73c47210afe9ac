// src/error.rs

//! Error types for rpmts

use thiserror::Error;

/// Errors raised while building, checking or ordering a transaction
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored header could not be encoded or decoded
    #[error("Header serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed configuration file
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Package database could not be opened in the requested mode
    #[error("Failed to open package database: {0}")]
    DatabaseOpen(String),

    /// Unparsable dependency, manifest or header field
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Binary package lacks a tag it must carry
    #[error("Package {package} has no {tag} tag")]
    MissingTag { package: String, tag: String },

    /// Added packages index refused the package
    #[error("Available list rejected package {0}")]
    AvailableListRejected(String),

    /// Dependency resolution could not complete
    #[error("Dependency resolution failed: {0}")]
    Resolver(String),
}

/// Result type alias using the rpmts Error type
pub type Result<T> = std::result::Result<T, Error>;
