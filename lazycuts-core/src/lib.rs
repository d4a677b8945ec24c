pub mod budget;
pub mod catalog;
pub mod compat;
pub mod composer;
pub mod config;
pub mod error;
pub mod media;
pub mod normalizer;
pub mod stitcher;
pub mod test_framework;
pub mod tools;

pub use budget::{AdBlock, DurationBudgeter};
pub use catalog::{sanitize_filename, Catalog, CatalogError, CatalogResult, ShowFolder};
pub use compat::is_stream_copy_safe;
pub use composer::{
    AdBreakSummary, BroadcastReport, ComposeError, ComposeResult, Playlist, PlaylistComposer,
    PlaylistEntry, SlotRole,
};
pub use config::{
    load_lazycuts_config, LazyCutsConfig, NormalizeSection, PathsSection, ScheduleSection,
    StitchSection, ToolsSection, PROCESSED_DIR_NAME,
};
pub use error::{ConfigError, Result};
pub use media::{
    AudioDescriptor, ClipCategory, ClipMetadata, FrameRate, Geometry, MediaClip, ProcessedClip,
    ProcessedOrigin, StreamProfile, VideoDescriptor,
};
pub use normalizer::{cache_key, ClipNormalizer, NormalizeError, NormalizeResult};
pub use stitcher::{render_manifest, JoinStrategy, StitchError, StitchResult, Stitcher};
pub use tools::{CommandExecutor, MediaTools, SystemCommandExecutor, ToolError, ToolResult};
