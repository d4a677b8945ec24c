mod types;

pub use types::{
    AudioDescriptor, ClipCategory, ClipMetadata, FrameRate, Geometry, MediaClip, ProcessedClip,
    ProcessedOrigin, StreamProfile, VideoDescriptor,
};
