// AssetLens - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation: every error keeps its source so the
// catch point can log the full causal chain.

use crate::core::model::Category;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all AssetLens operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum AssetLensError {
    /// Discovery of a DataSet failed.
    Discovery(DiscoveryError),

    /// A worker computation failed.
    Process(ProcessError),

    /// The sidecar store could not be read.
    Sidecar(SidecarError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// A worker thread could not be spawned.
    WorkerSpawn {
        category: Category,
        source: io::Error,
    },
}

impl fmt::Display for AssetLensError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery(e) => write!(f, "Discovery error: {e}"),
            Self::Process(e) => write!(f, "Processing error: {e}"),
            Self::Sidecar(e) => write!(f, "Sidecar error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::WorkerSpawn { category, source } => {
                write!(f, "Could not start the {category} worker thread: {source}")
            }
        }
    }
}

impl std::error::Error for AssetLensError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Discovery(e) => Some(e),
            Self::Process(e) => Some(e),
            Self::Sidecar(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::WorkerSpawn { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery errors
// ---------------------------------------------------------------------------

/// Errors related to enumerating a DataSet source.
///
/// Only the variants produced before enumeration starts abort a discovery
/// call. Per-entry failures are carried as `Entry` and skipped.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The source root does not exist or is not accessible.
    RootNotFound { path: PathBuf },

    /// The source root is not a directory.
    NotADirectory { path: PathBuf },

    /// Permission denied accessing the source root.
    PermissionDenied { path: PathBuf, source: io::Error },

    /// The pre-flight check of the root did not finish in time.
    Timeout { path: PathBuf, timeout_secs: u64 },

    /// A single entry could not be read (vanished file, permissions).
    Entry {
        path: Option<PathBuf>,
        source: walkdir::Error,
    },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Source path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Source path '{}' is not a directory", path.display())
            }
            Self::PermissionDenied { path, source } => {
                write!(
                    f,
                    "Permission denied accessing '{}': {source}",
                    path.display()
                )
            }
            Self::Timeout { path, timeout_secs } => write!(
                f,
                "Source path '{}' did not respond within {timeout_secs}s",
                path.display()
            ),
            Self::Entry { path, source } => match path {
                Some(p) => write!(f, "Cannot read entry '{}': {source}", p.display()),
                None => write!(f, "Cannot read entry: {source}"),
            },
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            Self::Entry { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DiscoveryError> for AssetLensError {
    fn from(e: DiscoveryError) -> Self {
        Self::Discovery(e)
    }
}

// ---------------------------------------------------------------------------
// Worker processing errors
// ---------------------------------------------------------------------------

/// Errors produced by a category computation. Workers never propagate these;
/// they are logged and replaced by a blank or fallback value.
#[derive(Debug)]
pub enum ProcessError {
    /// The backing file could not be stat'ed.
    Stat { path: PathBuf, source: io::Error },

    /// An image could not be decoded or resized.
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    /// A generated thumbnail could not be written to the cache.
    WriteThumbnail {
        path: PathBuf,
        source: image::ImageError,
    },

    /// The thumbnail cache directory could not be created.
    CacheDir { path: PathBuf, source: io::Error },

    /// The Record is missing data the computation needs.
    MissingField {
        category: Category,
        field: &'static str,
    },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stat { path, source } => {
                write!(f, "Cannot stat '{}': {source}", path.display())
            }
            Self::Decode { path, source } => {
                write!(f, "Cannot decode image '{}': {source}", path.display())
            }
            Self::WriteThumbnail { path, source } => {
                write!(f, "Cannot write thumbnail '{}': {source}", path.display())
            }
            Self::CacheDir { path, source } => write!(
                f,
                "Cannot create thumbnail cache directory '{}': {source}",
                path.display()
            ),
            Self::MissingField { category, field } => {
                write!(f, "{category} worker: record has no '{field}'")
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stat { source, .. } => Some(source),
            Self::Decode { source, .. } => Some(source),
            Self::WriteThumbnail { source, .. } => Some(source),
            Self::CacheDir { source, .. } => Some(source),
            Self::MissingField { .. } => None,
        }
    }
}

impl From<ProcessError> for AssetLensError {
    fn from(e: ProcessError) -> Self {
        Self::Process(e)
    }
}

// ---------------------------------------------------------------------------
// Sidecar errors
// ---------------------------------------------------------------------------

/// Errors related to the sidecar description/flag store.
#[derive(Debug)]
pub enum SidecarError {
    /// The sidecar file could not be read.
    Io { path: PathBuf, source: io::Error },

    /// The sidecar file is not valid JSON for the expected shape.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for SidecarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Cannot read sidecar '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "Invalid sidecar JSON '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SidecarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<SidecarError> for AssetLensError {
    fn from(e: SidecarError) -> Self {
        Self::Sidecar(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for AssetLensError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for AssetLens results.
pub type Result<T> = std::result::Result<T, AssetLensError>;
