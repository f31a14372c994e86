//! Daily duty journals for school class shifts, stored remotely when the
//! network allows and in a local SQLite slot when it does not.

pub mod config;
pub mod error;
pub mod journal;
pub mod local;
pub mod probe;
pub mod reconcile;
pub mod remote;
pub mod server;
pub mod types;

pub use error::JournalError;
