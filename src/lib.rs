//! Scope-bound ownership of raw resource handles.
//!
//! [`handle::UniqueHandle`] owns one raw identifier and releases it exactly
//! once, through a [`handle::HandleTraits`] policy. [`sqlite`] puts it to work
//! on SQLite connections and statements.

pub mod config;
pub mod handle;
pub mod logging;
pub mod sqlite;

pub use handle::{HandleTraits, UniqueHandle};
pub use sqlite::{Connection, SqlError, Statement};
