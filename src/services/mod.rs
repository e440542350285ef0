//! Service layer for the curator.
//!
//! This module contains:
//! - The ticket service contract (`TicketService`)
//! - The Jira REST adapter implementing it (`JiraClient`)
//! - Duplicate detection against local state and the tracker (`DuplicateResolver`)

mod jira;
mod resolver;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewTicket, TicketId, TicketQuery};

pub use jira::JiraClient;
pub use resolver::{DuplicateResolver, Resolution};

/// Issue tracker operations the sync engine relies on.
///
/// Implementations classify failures as `TransientRemote` or
/// `PermanentRemote`; retrying is left to the caller.
#[async_trait]
pub trait TicketService: Send + Sync {
    /// Create a ticket and return its key.
    async fn create(&self, ticket: &NewTicket) -> Result<TicketId>;

    /// List tickets matching the query, newest first.
    async fn search(&self, query: &TicketQuery) -> Result<Vec<TicketId>>;

    /// Full text of a ticket (summary and description).
    async fn view(&self, id: &TicketId) -> Result<String>;

    /// Replace a ticket's description.
    async fn edit(&self, id: &TicketId, body: &str) -> Result<()>;

    /// Add a comment to a ticket.
    async fn comment(&self, id: &TicketId, text: &str) -> Result<()>;
}
