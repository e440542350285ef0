// src/models/mod.rs

//! Domain models for the curator.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod article;
mod config;
mod state;
mod ticket;

// Re-export all public types
pub use article::{ArticleIdentity, ArticleRecord, RawArticle};
pub use config::{
    ArchiveConfig, Config, HttpConfig, JiraConfig, RetryConfig, SourceConfig, SourceKind,
    SyncConfig, expand_home,
};
pub use state::{CreatedTicket, SyncState, TicketMark};
pub use ticket::{NewTicket, TicketId, TicketQuery};
