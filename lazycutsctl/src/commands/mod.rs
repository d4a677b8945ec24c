pub mod build;
pub mod cache;

pub use build::BuildArgs;
pub use cache::CacheCommands;
