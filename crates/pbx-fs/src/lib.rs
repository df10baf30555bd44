//! Filesystem layer for pbx-sync
//!
//! Provides normalized paths, atomic writes guarded by advisory locks,
//! canonical SHA-256 checksums and the content-addressed [`BackupStore`]
//! that protects every configuration file mutation.

pub mod backup;
pub mod checksum;
pub mod error;
pub mod io;
pub mod lock;
pub mod path;

pub use backup::{BackupEntry, BackupStore};
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use lock::PathLocks;
pub use path::{NormalizedPath, validate_path_identifier};
