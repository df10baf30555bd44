//! Shared test utilities for the pbx-sync workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`engine`]: [`FakeEngine`], a scriptable stand-in for the telephony engine
//! - [`memory`]: [`MemoryRecordRepository`] holding records in memory
//! - [`pbx`]: [`TestPbx`] wiring both to a temporary endpoints file

pub mod engine;
pub mod memory;
pub mod pbx;

pub use engine::FakeEngine;
pub use memory::MemoryRecordRepository;
pub use pbx::{TEST_TIMEOUT, TestPbx, record};
