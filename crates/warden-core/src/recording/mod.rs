//! Tamper-evident session recordings.
//!
//! A recorder buffers events in memory while the session runs. On stop the
//! payload is serialized, hashed with SHA-256 and written once; every read
//! re-hashes the stored bytes before the payload is trusted.

mod integrity;
mod pool;
mod recorder;

pub use integrity::{VerifiedRecording, checksum, get_recording, verify};
pub use pool::RecorderPool;
pub use recorder::SessionRecorder;
