//! Business services.

pub mod media;
pub mod pipeline;

pub use media::StoredMedia;
pub use pipeline::{IncomingUpload, SegmentOutcome, UploadPipeline, UploadSummary};
