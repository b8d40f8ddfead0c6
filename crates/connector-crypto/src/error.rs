//! Certificate error types.

use crate::bundle::BundleArtifact;

/// Errors from generating or writing certificates.
///
/// Disk and permission failures are folded into `Generation`; callers only
/// need to know the bundle was not (re)issued.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("Certificate generation error: {0}")]
    Generation(String),
}

/// Errors from resolving an existing bundle.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("unable to find {0}")]
    Missing(BundleArtifact),

    #[error("unable to read {artifact}: {reason}")]
    Unreadable {
        artifact: BundleArtifact,
        reason: String,
    },

    #[error("invalid {artifact}: {reason}")]
    Invalid {
        artifact: BundleArtifact,
        reason: String,
    },

    #[error("leaf certificate expires in under 24 hours ({remaining_secs}s remaining)")]
    Expiring {
        /// Leaf `notAfter` as unix seconds.
        not_after: i64,
        /// Seconds left at the time of the check; negative once expired.
        remaining_secs: i64,
    },
}
