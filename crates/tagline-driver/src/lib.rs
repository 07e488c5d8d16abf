#![forbid(unsafe_code)]
//! Tagline driver: logical block storage over a remote disk array.
//!
//! Callers address data by (tagline, block offset); the driver maps every
//! logical block to a primary and a backup physical copy on different disks,
//! keeps hot blocks in a write-back LRU cache, and rebuilds lost copies from
//! their mirrors when a disk fails. One [`TaglineDriver`] is a complete,
//! self-contained storage stack; independent instances coexist freely.

mod config;
mod driver;
mod recovery;

pub use config::DriverConfig;
pub use driver::TaglineDriver;
pub use recovery::RecoveryReport;
