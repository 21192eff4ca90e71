pub mod error;
pub mod config;
pub mod table;
pub mod intent;
pub mod inventory;
pub mod source_selector;
pub mod execution;
pub mod live_fetcher;
pub mod cascade;
pub mod citation;
pub mod synthesizer;
pub mod assistant;
pub mod metrics;

// Entry points used by the CLI and integration tests
pub use assistant::{AssistantResponse, QaAssistant};
pub use config::EngineConfig;
pub use error::{QaError, ResolutionIssue, Result};
pub use intent::{Intent, IntentParser, QueryType};
pub use table::{Row, Table};
