// src/services/resolver.rs

//! Duplicate resolver.
//!
//! Decides whether an article already has a ticket, in order:
//!
//! 1. Local state: the identity or the URL is a key of `url_to_ticket`.
//!    No remote calls.
//! 2. Remote search: tickets created in the project (and label) within the
//!    search window are viewed one by one until one mentions the URL.
//! 3. Otherwise not found.
//!
//! Remote failures degrade to "not found" with a warning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::error::Result;
use crate::models::{ArticleIdentity, SyncState, TicketId, TicketQuery};
use crate::pipeline::retry::{RetryPolicy, retry};
use crate::services::TicketService;

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Known from local state
    Cached(TicketId),
    /// Found by the remote search
    Remote(TicketId),
    NotFound,
}

/// Duplicate check against local state and the ticket service.
pub struct DuplicateResolver {
    tickets: Arc<dyn TicketService>,
    policy: RetryPolicy,
    project: String,
    label: Option<String>,
    window: Duration,
    /// Ticket text already viewed during this run
    viewed: Mutex<HashMap<TicketId, String>>,
}

impl DuplicateResolver {
    pub fn new(
        tickets: Arc<dyn TicketService>,
        policy: RetryPolicy,
        project: impl Into<String>,
        label: Option<String>,
        window_days: u32,
    ) -> Self {
        Self {
            tickets,
            policy,
            project: project.into(),
            label,
            window: Duration::days(i64::from(window_days)),
            viewed: Mutex::new(HashMap::new()),
        }
    }

    /// Find the ticket for an article, if any.
    pub async fn resolve(
        &self,
        identity: &ArticleIdentity,
        url: &str,
        state: &SyncState,
    ) -> Resolution {
        if let Some(id) = state
            .ticket_for(identity.as_str())
            .or_else(|| state.ticket_for(url))
        {
            log::debug!("{identity} already mapped to {id}");
            return Resolution::Cached(id.clone());
        }

        if url.is_empty() {
            return Resolution::NotFound;
        }

        match self.search_remote(url).await {
            Ok(Some(id)) => {
                log::info!("Found existing ticket {id} for {url}");
                Resolution::Remote(id)
            }
            Ok(None) => Resolution::NotFound,
            Err(e) => {
                log::warn!("Remote duplicate check failed for {url}, assuming new: {e}");
                Resolution::NotFound
            }
        }
    }

    async fn search_remote(&self, url: &str) -> Result<Option<TicketId>> {
        let query = TicketQuery {
            project: self.project.clone(),
            label: self.label.clone(),
            created_after: Utc::now() - self.window,
        };
        let candidates = retry(&self.policy, "search", || self.tickets.search(&query)).await?;

        for id in candidates {
            match self.text_of(&id).await {
                Ok(text) if text.contains(url) => return Ok(Some(id)),
                Ok(_) => {}
                Err(e) => log::warn!("Could not view {id}: {e}"),
            }
        }
        Ok(None)
    }

    async fn text_of(&self, id: &TicketId) -> Result<String> {
        if let Some(text) = self.cached_text(id) {
            return Ok(text);
        }

        let text = retry(&self.policy, "view", || self.tickets.view(id)).await?;
        if let Ok(mut viewed) = self.viewed.lock() {
            viewed.insert(id.clone(), text.clone());
        }
        Ok(text)
    }

    fn cached_text(&self, id: &TicketId) -> Option<String> {
        self.viewed.lock().ok().and_then(|v| v.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketMark;
    use crate::testing::FakeTickets;

    fn resolver(tickets: Arc<FakeTickets>) -> DuplicateResolver {
        DuplicateResolver::new(tickets, RetryPolicy::immediate(2), "GAT", None, 30)
    }

    #[tokio::test]
    async fn test_local_hit_makes_no_remote_calls() {
        let tickets = Arc::new(FakeTickets::new());
        let mut state = SyncState::default();
        let identity = ArticleIdentity::new("https://x.io/a");
        state.mark_seen(&identity, Some(TicketMark::Existing(TicketId::new("GAT-1"))));

        let res = resolver(tickets.clone())
            .resolve(&identity, "https://x.io/a", &state)
            .await;

        assert_eq!(res, Resolution::Cached(TicketId::new("GAT-1")));
        assert_eq!(tickets.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_local_hit_by_url_alias() {
        let tickets = Arc::new(FakeTickets::new());
        let mut state = SyncState::default();
        state.add_alias(&ArticleIdentity::new("https://x.io/a"), &TicketId::new("GAT-5"));

        let res = resolver(tickets)
            .resolve(&ArticleIdentity::new("tag:x.io,2026:7"), "https://x.io/a", &state)
            .await;

        assert_eq!(res, Resolution::Cached(TicketId::new("GAT-5")));
    }

    #[tokio::test]
    async fn test_remote_hit() {
        let tickets = Arc::new(
            FakeTickets::new()
                .with_existing("GAT-10", "Unrelated\n\nhttps://x.io/other")
                .with_existing("GAT-11", "Filed by hand\n\nRead https://x.io/a?utm_source=mail"),
        );

        let res = resolver(tickets.clone())
            .resolve(&ArticleIdentity::new("https://x.io/a"), "https://x.io/a", &SyncState::default())
            .await;

        assert_eq!(res, Resolution::Remote(TicketId::new("GAT-11")));
    }

    #[tokio::test]
    async fn test_remote_miss() {
        let tickets = Arc::new(FakeTickets::new().with_existing("GAT-10", "https://x.io/other"));

        let res = resolver(tickets)
            .resolve(&ArticleIdentity::new("https://x.io/a"), "https://x.io/a", &SyncState::default())
            .await;

        assert_eq!(res, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_search_failure_degrades_to_not_found() {
        let tickets = Arc::new(FakeTickets::new().with_existing("GAT-1", "https://x.io/a"));
        tickets.take_search_down();

        let res = resolver(tickets.clone())
            .resolve(&ArticleIdentity::new("https://x.io/a"), "https://x.io/a", &SyncState::default())
            .await;

        assert_eq!(res, Resolution::NotFound);
        // Transient, so retried up to the policy limit.
        assert_eq!(tickets.search_calls(), 2);
    }

    #[tokio::test]
    async fn test_viewed_tickets_are_cached() {
        let tickets = Arc::new(
            FakeTickets::new()
                .with_existing("GAT-1", "https://x.io/1")
                .with_existing("GAT-2", "https://x.io/2"),
        );
        let resolver = resolver(tickets.clone());
        let state = SyncState::default();

        resolver.resolve(&ArticleIdentity::new("a"), "https://x.io/a", &state).await;
        resolver.resolve(&ArticleIdentity::new("b"), "https://x.io/b", &state).await;

        assert_eq!(tickets.search_calls(), 2);
        assert_eq!(tickets.view_calls(), 2);
    }
}
