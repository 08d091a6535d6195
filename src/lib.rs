pub mod app;
pub mod browse;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod lightbox;
pub mod media;
pub mod preferences;
pub mod progress;
pub mod query;
pub mod scroll;
pub mod session;

pub use crate::error::{PixsearchError, Result};
pub use app::{run_search, PixsearchApp};
pub use clap::Parser;
pub use cli::{Cli, Commands};
pub use fetcher::{HttpFetcher, ImageResult, ResultFetcher};
pub use lightbox::{ClickTarget, Key, LightboxController, LightboxView, LoadFailureOutcome};
pub use preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, Preferences};
pub use query::{ImageSize, SearchFilters, SearchQuery, TimeRange};
pub use scroll::{InfiniteScrollController, ScrollLock, Viewport};
pub use session::{FetchOutcome, PageRequest, SearchSession, SessionPhase};
