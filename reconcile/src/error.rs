//! Error types for reconciliation runs.
//!
//! [`DiscoveryError`] covers everything that goes wrong while looking at the
//! outside world (declaration files, the migration directory, the generator
//! subprocess). [`ReconcileError`] is the umbrella type returned by the
//! public entry points.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use trigger_migrate_core::{CompileError, SerializeError, ValidationError};

/// Failures while discovering declarations, history, or a destination file.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The migration directory exists but cannot be listed.
    #[error("failed to read migration directory '{path}': {source}")]
    MigrationDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A declaration or migration file cannot be read.
    #[error("failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A declaration file is not valid YAML/JSON for the declaration format.
    #[error("failed to parse declaration file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    /// Invalid or missing input (e.g. non-existent path, wrong extension).
    #[error("{0}")]
    InvalidInput(String),

    /// The generator program could not be started.
    #[error("failed to spawn migration generator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the generator failed.
    #[error("failed to wait on migration generator: {0}")]
    Wait(#[source] std::io::Error),

    /// The generator did not finish in time and was killed.
    #[error("migration generator timed out after {0:?}")]
    Timeout(Duration),

    /// The generator exited unsuccessfully.
    #[error("migration generator exited with {status}: {stderr}")]
    GeneratorFailed { status: String, stderr: String },

    /// No line of generator output matched the configured pattern.
    #[error("could not resolve migration file path from generator output: {output}")]
    UnparseableOutput { output: String },

    /// The reported file does not exist.
    #[error("generated migration file '{0}' does not exist")]
    MissingFile(PathBuf),

    /// The reported file is outside the migration directory.
    #[error("generated migration file '{file}' is not inside '{migrations}'")]
    OutsideMigrationDir { file: PathBuf, migrations: PathBuf },

    /// The reported file already has content.
    #[error("generated migration file '{0}' is not empty")]
    NotEmpty(PathBuf),

    /// The reported file is one of the prior migration artifacts.
    #[error("generated migration file '{0}' is an existing migration artifact")]
    ExistingArtifact(PathBuf),

    /// Creating a destination file failed.
    #[error("failed to create migration file '{path}': {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by reconciliation entry points.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A declaration failed validation.
    #[error("validation error: {0}")]
    ValidationError(#[from] ValidationError),

    /// A trigger failed to compile.
    #[error("compile error: {0}")]
    CompileError(#[from] CompileError),

    /// The convergence statement could not be serialized.
    #[error("serialize error: {0}")]
    SerializeError(#[from] SerializeError),

    /// Discovery of declarations, history, or destination failed.
    #[error("discovery error: {0}")]
    DiscoveryError(#[from] DiscoveryError),

    /// Configuration file I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file is not valid YAML.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Writing the new artifact failed.
    #[error("failed to write migration file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for results with [`ReconcileError`].
pub type Result<T> = std::result::Result<T, ReconcileError>;
