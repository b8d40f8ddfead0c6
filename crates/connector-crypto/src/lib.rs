//! Connector certificate management
//!
//! Issues and validates the mutual-TLS identity securing the control channel
//! between a connector facade and its daemon.
//!
//! ## Layout
//!
//! A bundle is four PEM files in one directory: `root.cert`, `root.key`,
//! `leaf.cert`, `leaf.key`. The root is a long-lived self-signed CA; the
//! leaf is short-lived, signed by the root, and presented by both ends of
//! the control channel.
//!
//! - **Authority**: root bootstrap and leaf (re)issue
//! - **Bundle store**: presence and leaf-expiry checks, no key loading

pub mod authority;
pub mod bundle;
pub mod error;
mod files;
pub mod host;
mod names;

pub use authority::{CertificateAuthority, DEFAULT_ROOT_VALIDITY, LeafSubjects};
pub use bundle::{
    BundleArtifact, CertBundle, EXPIRY_MARGIN, get_local_cert_bundle, get_local_cert_bundle_at,
    leaf_not_after,
};
pub use error::{BundleError, CertError};
pub use files::read_pem;
