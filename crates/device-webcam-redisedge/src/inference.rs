use serde::Serialize;
use tracing::debug;

use crate::error::InferenceError;

/// Object counts for the classes the device reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Detections {
    pub people: u64,
    pub dogs: u64,
}

/// Runs YOLO detection over an encoded frame.
///
/// The server-side pipeline (resize and normalise into the model's input
/// tensor, `AI.MODELRUN`, `AI.SCRIPTRUN` over the raw output, box extraction)
/// has no reference tensor layout yet, so this reports
/// [`InferenceError::NotImplemented`] rather than inventing counts.
pub fn yolo_detect(frame: &[u8]) -> Result<Detections, InferenceError> {
    if frame.is_empty() {
        return Err(InferenceError::EmptyFrame);
    }
    debug!(bytes = frame.len(), "YOLO detection requested");
    Err(InferenceError::NotImplemented)
}
