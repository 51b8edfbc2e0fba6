pub mod cache;
pub mod config;
pub mod core;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod security;

pub use crate::config::AppConfig;
pub use crate::core::assembler::{GenerativeClient, ResponseAssembler};
pub use crate::core::extractor::EntityExtractor;
pub use crate::core::processor::QueryProcessor;
pub use crate::core::router::QueryRouter;
pub use crate::core::search::SearchEngine;
pub use crate::core::synonyms::{Slot, SynonymStore};
pub use crate::database::Database;
pub use crate::error::{AppError, Result};
pub use crate::logging::{LogConfig, Logger};
pub use crate::models::{Entities, Response, ResponseType, RoutingDecision, RoutingKind, Vehicle};
