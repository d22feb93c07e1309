pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    ChunkingSettings, NewsSettings, ProviderBackend, ProviderSettings, RetrievalSettings, Settings,
};
