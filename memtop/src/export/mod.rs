//! Snapshot persistence
//!
//! Snapshots are stored as a JSON document wrapping the snapshot with a
//! format version:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "snapshot": {
//!     "traces": [{ "size": 8000, "traceback": { "frames": [{ "filename": "src/sample.rs", "lineno": 14 }], "total_nframe": 3 } }],
//!     "traceback_limit": 1
//!   }
//! }
//! ```

use log::debug;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::domain::SnapshotError;
use crate::snapshot::Snapshot;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    format_version: u32,
    snapshot: &'a Snapshot,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

#[derive(Deserialize)]
struct SnapshotFile {
    snapshot: Snapshot,
}

/// Serialize `snapshot` to `writer`.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn dump_snapshot<W: Write>(mut writer: W, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let file = SnapshotFileRef { format_version: FORMAT_VERSION, snapshot };
    serde_json::to_writer(&mut writer, &file)?;
    writer.flush()?;
    debug!("Dumped snapshot with {} traces", snapshot.traces().len());
    Ok(())
}

/// Deserialize a snapshot from `reader`.
///
/// # Errors
/// Returns [`SnapshotError::UnsupportedVersion`] for unknown format versions,
/// or a JSON/IO error if the document cannot be read.
pub fn load_snapshot<R: Read>(reader: R) -> Result<Snapshot, SnapshotError> {
    let document: serde_json::Value = serde_json::from_reader(reader)?;

    let probe: VersionProbe = serde_json::from_value(document.clone())?;
    if probe.format_version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(probe.format_version));
    }

    let file: SnapshotFile = serde_json::from_value(document)?;
    debug!("Loaded snapshot with {} traces", file.snapshot.traces().len());
    Ok(file.snapshot)
}
