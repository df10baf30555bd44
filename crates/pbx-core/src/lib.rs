//! Core orchestration for pbx-sync
//!
//! Compares the intended extension records with what the telephony engine
//! is actually running, and pushes changes in either direction:
//!
//! - [`collector`] gathers both sides into id-keyed maps
//! - [`reconcile`] classifies every id as matched, one-sided or mismatched
//! - [`executor`] applies records to the engine configuration or live state
//!   back onto records
//! - [`reload`] serializes engine reloads
//! - [`service::PbxSync`] ties it together for callers

mod blocking;
pub mod collector;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lock;
pub mod mapping;
pub mod model;
pub mod reconcile;
pub mod reload;
pub mod repository;
pub mod service;
pub mod settings;

pub use collector::{LiveStateCollector, RecordStateCollector};
pub use engine::{AsteriskCli, EngineControl, EngineError};
pub use error::{Error, Result};
pub use executor::{
    ApplyOptions, BatchReport, CancelHandle, CancelToken, Direction, ItemResult, OperationSummary, ReloadStatus,
    SyncExecutor,
};
pub use lock::KeyedLocks;
pub use model::{EntityRecord, Field, FieldDiff, LiveEntityState, Registration, SyncStatus};
pub use reconcile::{ReconcileReport, Reconciler, StatusCounts};
pub use reload::ReloadController;
pub use repository::{RecordRepository, TomlRecordRepository};
pub use service::{PbxSync, Target};
pub use settings::{Settings, SettingsResolver};
