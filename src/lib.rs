//! DLHub SDK - Describe, publish, discover and run machine-learning servables
//!
//! A Rust client for the DLHub model repository. Servable descriptions are
//! built in memory, validated against the DLHub schemas, and published with
//! their files; published servables can be searched for and invoked remotely.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod schemas;
pub mod search;
pub mod task;
pub mod telemetry;

pub use client::{DlhubClient, InputEncoding, select_latest_versions};
pub use config::ClientConfig;
pub use error::{DlhubError, DlhubResult, SchemaViolation};
pub use models::{ArgumentBlock, ArgumentType, ServableModel};
pub use schemas::{SchemaKind, validate_against_dlhub_schema};
pub use search::{SEARCH_LIMIT, SearchHelper, SearchInfo};
pub use task::{PollConfig, TaskFuture, TaskState};

/// Version of this SDK, recorded in every servable description
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
