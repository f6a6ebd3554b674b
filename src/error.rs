use std::fmt;

/// Errors surfaced while loading or managing ui packages.
///
/// `Format` and `IdConflict` are fatal to the load that produced them;
/// nothing gets registered. Missing backing resources are *not* errors at
/// this level - the resolver degrades those to placeholder assets.
#[derive(Debug, Clone)]
pub enum PackageError {
    /// Bad magic, truncated buffer or an out-of-range read.
    Format(String),
    /// A different package name is already registered under the same id.
    IdConflict {
        id: String,
        existing: String,
        incoming: String,
    },
    /// Missing package descriptor on an explicit load path.
    NotFound(String),
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::Format(msg) => write!(f, "Malformed package: {}", msg),
            PackageError::IdConflict {
                id,
                existing,
                incoming,
            } => write!(
                f,
                "Package id {} conflicts: '{}' and '{}'",
                id, incoming, existing
            ),
            PackageError::NotFound(key) => write!(f, "Package not found: {}", key),
        }
    }
}

impl std::error::Error for PackageError {}

impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        PackageError::Format(err.to_string())
    }
}
