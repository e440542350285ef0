//! Ticket service data structures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ticket key owned by the issue tracker (e.g. `GAT-123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ticket to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Filter for listing recent tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketQuery {
    pub project: String,
    /// Restrict to tickets carrying this label
    pub label: Option<String>,
    pub created_after: DateTime<Utc>,
}
