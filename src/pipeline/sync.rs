// src/pipeline/sync.rs

//! Sync engine.
//!
//! One run moves through `FETCHING -> FILTERING -> PROCESSING -> PERSISTING
//! -> DONE`. Candidates are processed strictly one at a time; each item that
//! links to a ticket is checkpointed to disk before the next one starts, so
//! an interrupted run never loses completed work and never re-creates a
//! ticket it already recorded.
//!
//! Item failures are collected in the report. Failing to load or save state
//! aborts the run.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{
    ArticleIdentity, ArticleRecord, Config, CreatedTicket, NewTicket, SourceConfig, SyncState,
    TicketId, TicketMark,
};
use crate::pipeline::report::{ItemOutcome, ItemReport, SyncReport};
use crate::pipeline::retry::{RetryPolicy, retry};
use crate::services::{DuplicateResolver, Resolution, TicketService};
use crate::sources::ArticleSource;
use crate::storage::{FileStorage, StateStore, folder_segments};

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Filtering,
    Processing,
    Persisting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Fetching => "FETCHING",
            Phase::Filtering => "FILTERING",
            Phase::Processing => "PROCESSING",
            Phase::Persisting => "PERSISTING",
            Phase::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Run everything except ticket creation, uploads and state writes
    pub dry_run: bool,
    /// Re-evaluate items already in `seen_guids`
    pub backfill: bool,
    pub title_template: String,
    pub body_template: String,
    pub labels: Vec<String>,
    /// Pause after each ticket creation
    pub request_delay: Duration,
    /// Comment on tickets found by the remote search
    pub annotate_duplicates: bool,
}

impl SyncOptions {
    pub fn for_source(config: &Config, source: &SourceConfig) -> Self {
        Self {
            dry_run: false,
            backfill: false,
            title_template: source.title_template.clone(),
            body_template: source.body_template.clone(),
            labels: source.label.iter().cloned().collect(),
            request_delay: Duration::from_millis(config.sync.request_delay_ms),
            annotate_duplicates: config.sync.annotate_duplicates,
        }
    }
}

/// Result of processing one candidate.
struct Processed {
    outcome: ItemOutcome,
    mark: Option<TicketMark>,
    archive_link: Option<String>,
}

/// Orchestrates one run for one source.
pub struct SyncEngine {
    store: StateStore,
    tickets: Arc<dyn TicketService>,
    files: Option<Arc<dyn FileStorage>>,
    resolver: DuplicateResolver,
    policy: RetryPolicy,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        store: StateStore,
        tickets: Arc<dyn TicketService>,
        resolver: DuplicateResolver,
        policy: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            tickets,
            files: None,
            resolver,
            policy,
            options,
        }
    }

    /// Archive attachments through `files` before creating tickets.
    pub fn with_file_storage(mut self, files: Arc<dyn FileStorage>) -> Self {
        self.files = Some(files);
        self
    }

    /// Run one sync against `source`.
    pub async fn run(&self, source: &dyn ArticleSource) -> Result<SyncReport> {
        let name = source.name().to_string();
        let mut report = SyncReport::new(&name, self.options.dry_run, self.options.backfill);
        if self.options.dry_run {
            log::info!("[{name}] Dry run: no tickets, uploads or state writes");
        }

        let mut state = self.store.load().await?;
        log::info!(
            "[{name}] Loaded state: {} seen, {} mapped",
            state.seen_identities.len(),
            state.identity_to_ticket.len()
        );

        log_phase(&name, Phase::Fetching);
        let fetched = source.fetch().await?;
        report.fetched = fetched.records.len();
        report.dropped = fetched.dropped;
        report.skipped_video = fetched.skipped_video;

        log_phase(&name, Phase::Filtering);
        let (candidates, skipped) = self.filter(fetched.records, &state);
        log::info!(
            "[{name}] {} candidate(s), {} already seen",
            candidates.len(),
            skipped.len()
        );
        for record in &skipped {
            report.push(ItemReport::new(record, ItemOutcome::AlreadySeen));
        }

        log_phase(&name, Phase::Processing);
        let total = candidates.len();
        for (index, record) in candidates.iter().enumerate() {
            let position = format!("[{}/{}]", index + 1, total);

            match self.process(record, &state).await {
                Ok(processed) => {
                    log_outcome(&position, record, &processed.outcome);
                    let created = matches!(processed.outcome, ItemOutcome::Created { .. });

                    if let Some(mark) = processed.mark {
                        record_mark(&mut state, record, mark);
                        if !self.options.dry_run {
                            self.checkpoint(&state).await?;
                        }
                    }
                    report.push(
                        ItemReport::new(record, processed.outcome)
                            .with_archive_link(processed.archive_link),
                    );

                    if created && index + 1 < total && !self.options.request_delay.is_zero() {
                        tokio::time::sleep(self.options.request_delay).await;
                    }
                }
                Err(e) => {
                    log::error!("{position} Failed: {} ({}): {e}", record.short_title(), record.url);
                    report.push(ItemReport::new(
                        record,
                        ItemOutcome::Failed {
                            error: e.to_string(),
                        },
                    ));
                }
            }
        }

        log_phase(&name, Phase::Persisting);
        if self.options.dry_run {
            log::info!("[{name}] Dry run: state file left untouched");
        } else {
            state.last_sync_at = Some(Utc::now());
            self.checkpoint(&state).await?;
            log::info!("[{name}] State saved to {}", self.store.path().display());
        }

        report.finish();
        log_phase(&name, Phase::Done);
        Ok(report)
    }

    /// Order candidates oldest-first and split off the ones to skip.
    ///
    /// Repeats within the batch (same identity or URL) are always skipped;
    /// items already in state are skipped unless backfilling.
    fn filter(
        &self,
        mut records: Vec<ArticleRecord>,
        state: &SyncState,
    ) -> (Vec<ArticleRecord>, Vec<ArticleRecord>) {
        records.sort_by_key(|r| (r.published.is_none(), r.published));

        let mut batch_keys: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        for record in records {
            let repeat = batch_keys.contains(record.identity.as_str())
                || batch_keys.contains(&record.url);
            batch_keys.insert(record.identity.as_str().to_string());
            batch_keys.insert(record.url.clone());

            let seen = state.is_seen(record.identity.as_str()) || state.is_seen(&record.url);
            if repeat || (seen && !self.options.backfill) {
                log::debug!("Skipping {} (already seen)", record.identity);
                skipped.push(record);
            } else {
                candidates.push(record);
            }
        }

        (candidates, skipped)
    }

    async fn process(&self, record: &ArticleRecord, state: &SyncState) -> Result<Processed> {
        match self
            .resolver
            .resolve(&record.identity, &record.url, state)
            .await
        {
            Resolution::Cached(ticket_id) => Ok(Processed {
                outcome: ItemOutcome::Duplicate {
                    ticket_id: ticket_id.clone(),
                    remote: false,
                },
                mark: Some(TicketMark::Existing(ticket_id)),
                archive_link: None,
            }),
            Resolution::Remote(ticket_id) => {
                if self.options.annotate_duplicates && !self.options.dry_run {
                    self.annotate(record, &ticket_id).await;
                }
                Ok(Processed {
                    outcome: ItemOutcome::Duplicate {
                        ticket_id: ticket_id.clone(),
                        remote: true,
                    },
                    mark: Some(TicketMark::Existing(ticket_id)),
                    archive_link: None,
                })
            }
            Resolution::NotFound if self.options.dry_run => Ok(Processed {
                outcome: ItemOutcome::WouldCreate,
                mark: None,
                archive_link: None,
            }),
            Resolution::NotFound => self.create(record).await,
        }
    }

    async fn create(&self, record: &ArticleRecord) -> Result<Processed> {
        let archive_link = self.archive(record).await?;

        let ticket = NewTicket {
            title: record.render(&self.options.title_template, None),
            body: record.render(&self.options.body_template, archive_link.as_deref()),
            labels: self.options.labels.clone(),
        };
        let ticket_id = retry(&self.policy, "create", || self.tickets.create(&ticket)).await?;

        Ok(Processed {
            outcome: ItemOutcome::Created {
                ticket_id: ticket_id.clone(),
            },
            mark: Some(TicketMark::Created(CreatedTicket::new(
                ticket_id,
                &record.title,
                &record.url,
            ))),
            archive_link,
        })
    }

    /// Upload the attachment into today's folder. Any failure fails the item.
    async fn archive(&self, record: &ArticleRecord) -> Result<Option<String>> {
        let (Some(files), Some(attachment)) = (&self.files, &record.attachment) else {
            return Ok(None);
        };
        if !attachment.is_file() {
            return Err(AppError::validation(format!(
                "attachment {} does not exist",
                attachment.display()
            )));
        }

        let segments = folder_segments(Utc::now().date_naive());
        let folder = retry(&self.policy, "ensure_folder", || files.ensure_folder(&segments)).await?;
        let link = retry(&self.policy, "upload", || files.upload(attachment, &folder)).await?;
        Ok(Some(link))
    }

    async fn annotate(&self, record: &ArticleRecord, ticket_id: &TicketId) {
        let text = format!("Also reported by {}: {}", record.source, record.url);
        if let Err(e) = retry(&self.policy, "comment", || self.tickets.comment(ticket_id, &text)).await {
            log::warn!("Could not comment on {ticket_id}: {e}");
        }
    }

    async fn checkpoint(&self, state: &SyncState) -> Result<()> {
        self.store.save(state).await.map_err(|e| {
            log::error!("Cannot persist state to {}: {e}", self.store.path().display());
            e
        })
    }
}

/// Link an identity (and its URL, when different) to a ticket.
fn record_mark(state: &mut SyncState, record: &ArticleRecord, mark: TicketMark) {
    let ticket_id = mark.ticket_id().clone();
    state.mark_seen(&record.identity, Some(mark));
    if record.url != record.identity.as_str() {
        state.add_alias(&ArticleIdentity::new(&record.url), &ticket_id);
    }
}

fn log_phase(source: &str, phase: Phase) {
    log::info!("[{source}] {phase}");
}

fn log_outcome(position: &str, record: &ArticleRecord, outcome: &ItemOutcome) {
    let title = record.short_title();
    match outcome {
        ItemOutcome::Created { ticket_id } => log::info!("{position} Created {ticket_id}: {title}"),
        ItemOutcome::Duplicate {
            ticket_id,
            remote: true,
        } => log::info!("{position} Existing ticket {ticket_id} found remotely: {title}"),
        ItemOutcome::Duplicate { ticket_id, .. } => {
            log::info!("{position} Already tracked as {ticket_id}: {title}")
        }
        ItemOutcome::WouldCreate => log::info!("{position} Would create: {title} ({})", record.url),
        ItemOutcome::AlreadySeen => log::debug!("{position} Already seen: {title}"),
        ItemOutcome::Failed { error } => log::error!("{position} Failed: {title}: {error}"),
    }
}
