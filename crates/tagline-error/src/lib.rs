#![forbid(unsafe_code)]
//! Error types for the tagline driver.
//!
//! Two-layer model: the wire codec has its own `WireError` in
//! `tagline-wire`, converted into [`TaglineError::Codec`] at the bus
//! boundary. This crate is intentionally independent of the other workspace
//! crates so the conversion direction never cycles.
//!
//! | Variant | Class | errno |
//! |---------|-------|-------|
//! | `Io` | bus transport failure | raw, else `EIO` |
//! | `Bus` | non-zero bus status / echo mismatch / short transfer | `EIO` |
//! | `Codec` | malformed opcode word | `EPROTO` |
//! | `Address` | tagline or offset out of range | `EINVAL` |
//! | `NoSpace` | physical slots exhausted | `ENOSPC` |
//! | `Consistency` | directory/cache invariant violated | `EIO` |
//! | `Geometry` | invalid disk-array configuration | `EINVAL` |
//! | `Recovery` | disk reconstruction aborted | `EIO` |

use thiserror::Error;

/// Unified error type for every public driver operation.
#[derive(Debug, Error)]
pub enum TaglineError {
    /// Operating system I/O error on the bus transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage bus reported a non-zero status, echoed a mismatched
    /// response, or delivered a short transfer.
    #[error("storage bus failure: {detail}")]
    Bus { detail: String },

    /// A 64-bit opcode word could not be decoded.
    #[error("wire codec error: {0}")]
    Codec(String),

    /// Tagline or block offset outside the addressable range.
    #[error("address out of range: {detail}")]
    Address { detail: String },

    /// No free physical block slot remains anywhere in the array.
    #[error("no free physical block available")]
    NoSpace,

    /// An invariant the directory or cache cannot satisfy.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Disk-array configuration is invalid.
    #[error("invalid geometry: {0}")]
    Geometry(String),

    /// Disk reconstruction aborted; already-rebuilt blocks are kept.
    #[error("recovery failed: {0}")]
    Recovery(String),
}

impl TaglineError {
    pub fn bus(detail: impl Into<String>) -> Self {
        Self::Bus {
            detail: detail.into(),
        }
    }

    pub fn address(detail: impl Into<String>) -> Self {
        Self::Address {
            detail: detail.into(),
        }
    }

    /// Convert this error into a POSIX errno for embedders with a C-style
    /// driver surface. Exhaustive: adding a variant without an errno is a
    /// compile error.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Bus { .. } | Self::Consistency(_) | Self::Recovery(_) => libc::EIO,
            Self::Codec(_) => libc::EPROTO,
            Self::Address { .. } | Self::Geometry(_) => libc::EINVAL,
            Self::NoSpace => libc::ENOSPC,
        }
    }
}

/// Result alias using `TaglineError`.
pub type Result<T> = std::result::Result<T, TaglineError>;
