//! Run report: per-item outcomes, console summary and JSON output.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{ArticleIdentity, ArticleRecord, TicketId};
use crate::storage::write_atomic;
use crate::utils::console;

/// Exit code for a completed run with failed items.
pub const EXIT_ITEM_FAILURES: i32 = 1;

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Ticket created during this run
    Created { ticket_id: TicketId },
    /// Ticket already existed
    Duplicate { ticket_id: TicketId, remote: bool },
    /// Dry run: a ticket would have been created
    WouldCreate,
    /// Filtered out before processing
    AlreadySeen,
    /// Not marked seen; retried on the next run
    Failed { error: String },
}

/// One candidate in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub identity: ArticleIdentity,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_link: Option<String>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemReport {
    pub fn new(record: &ArticleRecord, outcome: ItemOutcome) -> Self {
        Self {
            identity: record.identity.clone(),
            title: record.title.clone(),
            url: record.url.clone(),
            published: record.published,
            archive_link: None,
            outcome,
        }
    }

    pub fn with_archive_link(mut self, link: Option<String>) -> Self {
        self.archive_link = link;
        self
    }
}

/// Summary of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub backfill: bool,
    /// Records produced by the source
    pub fetched: usize,
    /// Items without a usable identity
    pub dropped: usize,
    pub skipped_video: usize,
    pub items: Vec<ItemReport>,
}

impl SyncReport {
    pub fn new(source: impl Into<String>, dry_run: bool, backfill: bool) -> Self {
        Self {
            source: source.into(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            backfill,
            fetched: 0,
            dropped: 0,
            skipped_video: 0,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: ItemReport) {
        self.items.push(item);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Created { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Duplicate { .. }))
    }

    pub fn would_create(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::WouldCreate))
    }

    pub fn already_seen(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::AlreadySeen))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
    }

    /// 0 when every item succeeded, 1 when any failed.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            EXIT_ITEM_FAILURES
        } else {
            0
        }
    }

    /// Print the operator-facing summary to stdout.
    pub fn print_summary(&self) {
        let mut title = format!("{} sync", self.source);
        if self.dry_run {
            title.push_str(" (dry run)");
        }
        if self.backfill {
            title.push_str(" (backfill)");
        }

        let mut rows = vec![
            ("Fetched", self.fetched.to_string()),
            ("Created", self.created().to_string()),
            ("Skipped (seen)", self.already_seen().to_string()),
            ("Duplicates", self.duplicates().to_string()),
            ("Failed", self.failed().to_string()),
            ("Dropped", self.dropped.to_string()),
        ];
        if self.dry_run {
            rows.insert(2, ("Would create", self.would_create().to_string()));
        }
        if self.skipped_video > 0 {
            rows.push(("Skipped (video)", self.skipped_video.to_string()));
        }
        console::summary(&title, &rows);

        if self.failed() > 0 {
            println!();
            console::header("Failed items");
            for item in self.failures() {
                console::sub_item(&item.title);
                console::sub_item(&format!("  {}", item.url));
                if let ItemOutcome::Failed { error } = &item.outcome {
                    console::sub_item(&format!("  {error}"));
                }
            }
        }

        let created: Vec<_> = self
            .items
            .iter()
            .filter_map(|i| match &i.outcome {
                ItemOutcome::Created { ticket_id } => Some((ticket_id, i)),
                _ => None,
            })
            .collect();
        if !created.is_empty() {
            println!();
            console::separator();
            for (ticket_id, item) in created {
                console::sub_item(&format!("{ticket_id}: {}", short(&item.title)));
            }
        }
    }

    /// Write the report as pretty JSON, atomically.
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        write_atomic(path, &bytes).await?;
        log::info!("Run metadata written to {}", path.display());
        Ok(())
    }
}

fn short(title: &str) -> String {
    title.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;
    use tempfile::TempDir;

    fn sample_report() -> SyncReport {
        let mut report = SyncReport::new("Optimizely", false, false);
        let a = record("A", "https://x.io/a");
        let b = record("B", "https://x.io/b");
        let c = record("C", "https://x.io/c");
        report.push(ItemReport::new(
            &a,
            ItemOutcome::Created {
                ticket_id: TicketId::new("GAT-1"),
            },
        ));
        report.push(ItemReport::new(&b, ItemOutcome::AlreadySeen));
        report.push(ItemReport::new(
            &c,
            ItemOutcome::Failed {
                error: "Remote error during create (status 400): bad".into(),
            },
        ));
        report
    }

    #[test]
    fn test_counts_and_exit_code() {
        let report = sample_report();
        assert_eq!(report.created(), 1);
        assert_eq!(report.already_seen(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_code(), EXIT_ITEM_FAILURES);

        let clean = SyncReport::new("Optimizely", false, false);
        assert_eq!(clean.exit_code(), 0);
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(value["source"], "Optimizely");
        assert_eq!(value["items"][0]["status"], "created");
        assert_eq!(value["items"][0]["ticket_id"], "GAT-1");
        assert_eq!(value["items"][1]["status"], "already_seen");
        assert!(value["items"][2]["error"].as_str().unwrap().contains("400"));
    }

    #[tokio::test]
    async fn test_write_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out/run.json");
        sample_report().write_json(&path).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["items"].as_array().unwrap().len(), 3);
    }
}
