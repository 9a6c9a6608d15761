pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, ChatConfig, ChunkingConfig, LlmConfig, StoreConfig, API_KEY_ENV};
