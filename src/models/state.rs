//! Persisted sync state.
//!
//! On-disk layout (one file per source):
//!
//! ```text
//! {
//!   "seen_guids":      ["https://...", "tag:blog,2025:42"],
//!   "last_check":      "2026-01-31T07:00:00+00:00",
//!   "created_tickets": { "<identity>": { "ticket_id": "GAT-1", "title": ..., "url": ..., "created_at": ... } },
//!   "url_to_ticket":   { "<identity or url>": "GAT-1" }
//! }
//! ```
//!
//! Older files may use `seen_identities`, store bare ticket ids in
//! `created_tickets`, or write `last_check` without an offset. All of these
//! load. Unknown top-level keys are carried through untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ArticleIdentity, TicketId};

/// Durable record of everything a source has already processed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Identities already processed (ticket created or duplicate confirmed)
    #[serde(rename = "seen_guids", alias = "seen_identities", default)]
    pub seen_identities: BTreeSet<ArticleIdentity>,

    /// Time of the most recent completed run
    #[serde(rename = "last_check", default, with = "timestamp")]
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Audit trail of tickets this system created
    #[serde(default, deserialize_with = "created_tickets")]
    pub created_tickets: BTreeMap<ArticleIdentity, CreatedTicket>,

    /// Fast-path duplicate lookup
    #[serde(rename = "url_to_ticket", default)]
    pub identity_to_ticket: BTreeMap<ArticleIdentity, TicketId>,

    /// Keys written by other tools
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Detail kept for a ticket created by this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTicket {
    pub ticket_id: TicketId,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CreatedTicket {
    pub fn new(ticket_id: TicketId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            ticket_id,
            title: title.into(),
            url: url.into(),
            created_at: Some(Utc::now()),
        }
    }
}

/// How an identity got linked to a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketMark {
    /// Ticket found by the duplicate check
    Existing(TicketId),
    /// Ticket created during this run
    Created(CreatedTicket),
}

impl TicketMark {
    pub fn ticket_id(&self) -> &TicketId {
        match self {
            TicketMark::Existing(id) => id,
            TicketMark::Created(created) => &created.ticket_id,
        }
    }
}

impl SyncState {
    /// Record an identity as processed.
    ///
    /// An existing ticket mapping is never overwritten: the first ticket
    /// linked to an identity wins.
    pub fn mark_seen(&mut self, identity: &ArticleIdentity, mark: Option<TicketMark>) {
        self.seen_identities.insert(identity.clone());

        match mark {
            None => {}
            Some(TicketMark::Existing(ticket_id)) => {
                self.identity_to_ticket
                    .entry(identity.clone())
                    .or_insert(ticket_id);
            }
            Some(TicketMark::Created(created)) => {
                self.identity_to_ticket
                    .entry(identity.clone())
                    .or_insert_with(|| created.ticket_id.clone());
                self.created_tickets
                    .entry(identity.clone())
                    .or_insert(created);
            }
        }
    }

    /// Record a secondary key (e.g. the article URL when the identity is a
    /// GUID) that resolves to the same ticket.
    pub fn add_alias(&mut self, alias: &ArticleIdentity, ticket_id: &TicketId) {
        self.seen_identities.insert(alias.clone());
        self.identity_to_ticket
            .entry(alias.clone())
            .or_insert_with(|| ticket_id.clone());
    }

    pub fn is_seen(&self, key: &str) -> bool {
        self.seen_identities.contains(key)
    }

    pub fn ticket_for(&self, key: &str) -> Option<&TicketId> {
        self.identity_to_ticket.get(key)
    }

    /// Fill in the lookup entries older tools never wrote: every created
    /// ticket is mapped and every mapped key is seen. Existing mappings are
    /// kept. Returns how many entries were added.
    pub fn restore_invariants(&mut self) -> usize {
        let mut added = 0;
        for (identity, created) in &self.created_tickets {
            if !self.identity_to_ticket.contains_key(identity) {
                self.identity_to_ticket
                    .insert(identity.clone(), created.ticket_id.clone());
                added += 1;
            }
        }
        for identity in self.identity_to_ticket.keys() {
            if self.seen_identities.insert(identity.clone()) {
                added += 1;
            }
        }
        added
    }

    /// Check the cross-field invariants: every mapped key is seen, and every
    /// created ticket is mapped.
    pub fn is_consistent(&self) -> bool {
        self.identity_to_ticket
            .keys()
            .all(|k| self.seen_identities.contains(k))
            && self
                .created_tickets
                .keys()
                .all(|k| self.identity_to_ticket.contains_key(k))
    }

    /// Copy of this state with the run timestamp cleared, for comparisons.
    pub fn without_timestamp(&self) -> Self {
        Self {
            last_sync_at: None,
            ..self.clone()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedTicketRepr {
    Bare(TicketId),
    Detailed(CreatedTicket),
}

impl From<CreatedTicketRepr> for CreatedTicket {
    fn from(repr: CreatedTicketRepr) -> Self {
        match repr {
            CreatedTicketRepr::Bare(ticket_id) => CreatedTicket {
                ticket_id,
                title: String::new(),
                url: String::new(),
                created_at: None,
            },
            CreatedTicketRepr::Detailed(created) => created,
        }
    }
}

fn created_tickets<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<ArticleIdentity, CreatedTicket>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<ArticleIdentity, CreatedTicketRepr>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.into())).collect())
}

/// Timestamps are written as RFC 3339 and read leniently: offset-less ISO
/// strings are taken as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        parse(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
