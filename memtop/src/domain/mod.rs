//! Types shared by the tracer, snapshots and reports, and the errors they
//! return.

pub mod errors;
pub mod types;

pub use types::{Frame, KeyType, StackId, Traceback, UNKNOWN_FILENAME};

pub use errors::{SnapshotError, TracerError};
