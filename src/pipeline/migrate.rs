// src/pipeline/migrate.rs

//! One-time state migration.
//!
//! State files written before URL normalization hold raw links as keys
//! (`https://x.io/a?utm_source=rss`). Migration rewrites every URL-shaped
//! key in `seen_guids`, `url_to_ticket` and `created_tickets` to its
//! normalized form. Keys that collapse onto the same identity are merged:
//! a created ticket wins, then the first mapping in key order. Afterwards
//! every created ticket is mapped and every mapped key is seen.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::Result;
use crate::models::{ArticleIdentity, SyncState, TicketId};
use crate::storage::StateStore;
use crate::utils::console;
use crate::utils::url::{is_http_url, normalize};

/// Two old keys that normalize to one identity but point at different tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingConflict {
    pub identity: ArticleIdentity,
    pub kept: TicketId,
    pub dropped: TicketId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Keys whose text changed
    pub rewritten: usize,
    /// Keys folded into an existing entry
    pub merged: usize,
    /// Lookup entries added so every mapped key is seen
    pub restored: usize,
    pub conflicts: Vec<MappingConflict>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.rewritten == 0 && self.merged == 0 && self.restored == 0
    }

    pub fn print_summary(&self, path: &str, dry_run: bool) {
        let title = if dry_run {
            format!("Migration of {path} (dry run)")
        } else {
            format!("Migration of {path}")
        };
        console::summary(
            &title,
            &[
                ("Rewritten keys", self.rewritten.to_string()),
                ("Merged keys", self.merged.to_string()),
                ("Restored entries", self.restored.to_string()),
                ("Conflicts", self.conflicts.len().to_string()),
            ],
        );
        for conflict in &self.conflicts {
            console::sub_item(&format!(
                "{}: kept {}, dropped {}",
                conflict.identity, conflict.kept, conflict.dropped
            ));
        }
    }
}

fn migrate_key(key: &ArticleIdentity, report: &mut MigrationReport) -> ArticleIdentity {
    let raw = key.as_str();
    if !is_http_url(raw) {
        return key.clone();
    }
    match normalize(raw) {
        Some(normalized) if normalized != raw => {
            report.rewritten += 1;
            ArticleIdentity::new(normalized)
        }
        _ => key.clone(),
    }
}

/// Rewrite the keys of a state and restore its lookup invariants. Pure; the
/// input is untouched.
///
/// Created tickets claim their key first so the audit trail and the lookup
/// map always agree; remaining mappings follow in key order.
pub fn migrate_state(state: &SyncState) -> (SyncState, MigrationReport) {
    let mut report = MigrationReport::default();

    let mut created = BTreeMap::new();
    // Old keys whose created ticket won its normalized key.
    let mut created_sources = BTreeSet::new();
    for (key, ticket) in &state.created_tickets {
        let new_key = migrate_key(key, &mut report);
        if created.contains_key(&new_key) {
            report.merged += 1;
        } else {
            created.insert(new_key, ticket.clone());
            created_sources.insert(key.clone());
        }
    }

    let mut mapping: BTreeMap<ArticleIdentity, TicketId> = created
        .iter()
        .map(|(key, ticket)| (key.clone(), ticket.ticket_id.clone()))
        .collect();
    for (key, ticket_id) in &state.identity_to_ticket {
        let new_key = migrate_key(key, &mut report);
        let Some(kept) = mapping.get(&new_key) else {
            mapping.insert(new_key, ticket_id.clone());
            continue;
        };
        if !created_sources.contains(key) {
            report.merged += 1;
        }
        if kept != ticket_id {
            log::warn!("{new_key}: keeping {kept}, dropping {ticket_id}");
            report.conflicts.push(MappingConflict {
                identity: new_key,
                kept: kept.clone(),
                dropped: ticket_id.clone(),
            });
        }
    }

    let mut seen = BTreeSet::new();
    for key in &state.seen_identities {
        let new_key = migrate_key(key, &mut report);
        if !seen.insert(new_key) {
            report.merged += 1;
        }
    }

    let mut migrated = SyncState {
        seen_identities: seen,
        last_sync_at: state.last_sync_at,
        created_tickets: created,
        identity_to_ticket: mapping,
        extra: state.extra.clone(),
    };
    report.restored = migrated.restore_invariants();
    (migrated, report)
}

/// Migrate a state file in place. With `dry_run` the file is only read.
pub async fn run_migration(store: &StateStore, dry_run: bool) -> Result<MigrationReport> {
    let state = store.load().await?;
    let (migrated, report) = migrate_state(&state);

    if report.is_noop() {
        log::info!("{} is already normalized", store.path().display());
    } else if dry_run {
        log::info!(
            "Dry run: {} key(s) would be rewritten in {}",
            report.rewritten,
            store.path().display()
        );
    } else {
        store.save(&migrated).await?;
        log::info!(
            "Rewrote {} key(s) in {}",
            report.rewritten,
            store.path().display()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreatedTicket, TicketMark};
    use tempfile::TempDir;

    fn id(s: &str) -> ArticleIdentity {
        ArticleIdentity::new(s)
    }

    fn legacy_state() -> SyncState {
        let mut state = SyncState::default();
        state.mark_seen(
            &id("https://x.io/a?utm_source=rss"),
            Some(TicketMark::Created(CreatedTicket::new(
                TicketId::new("GAT-1"),
                "A",
                "https://x.io/a?utm_source=rss",
            ))),
        );
        state.mark_seen(
            &id("https://x.io/a#comments"),
            Some(TicketMark::Existing(TicketId::new("GAT-9"))),
        );
        state.mark_seen(&id("tag:x.io,2026:1"), None);
        state.mark_seen(&id("https://x.io/b"), None);
        state
    }

    #[test]
    fn test_rewrites_and_merges_keys() {
        let (migrated, report) = migrate_state(&legacy_state());

        let seen: Vec<&str> = migrated.seen_identities.iter().map(|i| i.as_str()).collect();
        assert_eq!(seen, vec!["https://x.io/a", "https://x.io/b", "tag:x.io,2026:1"]);
        assert_eq!(report.merged, 2);
        assert!(migrated.is_consistent());
        assert!(migrated.created_tickets.contains_key("https://x.io/a"));
    }

    #[test]
    fn test_created_ticket_wins_merge() {
        let (migrated, report) = migrate_state(&legacy_state());

        assert_eq!(
            migrated.ticket_for("https://x.io/a"),
            Some(&TicketId::new("GAT-1"))
        );
        assert_eq!(
            migrated.created_tickets["https://x.io/a"].ticket_id,
            TicketId::new("GAT-1")
        );
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].dropped, TicketId::new("GAT-9"));
    }

    #[test]
    fn test_historic_file_becomes_consistent() {
        // GUIDs in seen_guids, raw links in url_to_ticket.
        let state: SyncState = serde_json::from_str(
            r#"{
                "seen_guids": ["g1"],
                "created_tickets": {
                    "g1": {"ticket_id": "GAT-1", "title": "A", "url": "https://x.io/a?utm=1"}
                },
                "url_to_ticket": {"https://x.io/a?utm=1": "GAT-1"}
            }"#,
        )
        .unwrap();
        assert!(!state.is_consistent());

        let (migrated, report) = migrate_state(&state);

        assert!(migrated.is_consistent());
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.restored, 1);
        assert!(report.conflicts.is_empty());
        assert!(migrated.is_seen("https://x.io/a"));
        assert_eq!(migrated.ticket_for("g1"), Some(&TicketId::new("GAT-1")));
        assert_eq!(
            migrated.ticket_for("https://x.io/a"),
            Some(&TicketId::new("GAT-1"))
        );
    }

    #[test]
    fn test_normalized_state_is_noop() {
        let (once, _) = migrate_state(&legacy_state());
        let (twice, report) = migrate_state(&once);
        assert!(report.is_noop());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_file() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        store.save(&legacy_state()).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let report = run_migration(&store, true).await.unwrap();
        assert!(!report.is_noop());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);

        run_migration(&store, false).await.unwrap();
        let after = store.load().await.unwrap();
        assert!(after.is_seen("https://x.io/a"));
        assert!(!after.is_seen("https://x.io/a?utm_source=rss"));
    }
}
