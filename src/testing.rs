//! In-memory collaborators for engine and resolver tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ArticleRecord, NewTicket, RawArticle, TicketId, TicketQuery};
use crate::services::TicketService;
use crate::sources::{ArticleSource, FetchOutcome};
use crate::storage::{FileStorage, FolderId};

#[derive(Debug, Default)]
struct TrackerState {
    /// (id, text) in creation order
    tickets: Vec<(TicketId, String)>,
    next_id: u32,
    create_calls: usize,
    search_calls: usize,
    view_calls: usize,
    comments: Vec<(TicketId, String)>,
    edits: Vec<(TicketId, String)>,
}

/// Ticket tracker kept in memory.
#[derive(Debug, Default)]
pub struct FakeTickets {
    state: Mutex<TrackerState>,
    /// Titles containing any of these fail with a 400
    reject_titles: Mutex<HashSet<String>>,
    /// Remaining transient failures for create
    flaky_creates: Mutex<u32>,
    search_down: Mutex<bool>,
}

impl FakeTickets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ticket filed outside the curator.
    pub fn with_existing(self, id: &str, text: &str) -> Self {
        self.lock().tickets.push((TicketId::new(id), text.to_string()));
        self
    }

    pub fn reject(&self, title_fragment: &str) {
        if let Ok(mut set) = self.reject_titles.lock() {
            set.insert(title_fragment.to_string());
        }
    }

    pub fn fail_creates_transiently(&self, times: u32) {
        if let Ok(mut n) = self.flaky_creates.lock() {
            *n = times;
        }
    }

    pub fn take_search_down(&self) {
        if let Ok(mut down) = self.search_down.lock() {
            *down = true;
        }
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn search_calls(&self) -> usize {
        self.lock().search_calls
    }

    pub fn view_calls(&self) -> usize {
        self.lock().view_calls
    }

    pub fn created_count(&self) -> usize {
        self.lock().next_id as usize
    }

    pub fn comments(&self) -> Vec<(TicketId, String)> {
        self.lock().comments.clone()
    }

    pub fn edits(&self) -> Vec<(TicketId, String)> {
        self.lock().edits.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl TicketService for FakeTickets {
    async fn create(&self, ticket: &NewTicket) -> Result<TicketId> {
        self.lock().create_calls += 1;

        {
            let mut flaky = self.flaky_creates.lock().unwrap();
            if *flaky > 0 {
                *flaky -= 1;
                return Err(AppError::transient("create", "503 Service Unavailable"));
            }
        }
        let rejected = self
            .reject_titles
            .lock()
            .unwrap()
            .iter()
            .any(|frag| ticket.title.contains(frag.as_str()));
        if rejected {
            return Err(AppError::permanent("create", 400, "field 'summary' rejected"));
        }

        let mut state = self.lock();
        state.next_id += 1;
        let id = TicketId::new(format!("NEW-{}", state.next_id));
        state
            .tickets
            .push((id.clone(), format!("{}\n\n{}", ticket.title, ticket.body)));
        Ok(id)
    }

    async fn search(&self, _query: &TicketQuery) -> Result<Vec<TicketId>> {
        self.lock().search_calls += 1;
        if *self.search_down.lock().unwrap() {
            return Err(AppError::transient("search", "timed out"));
        }
        Ok(self.lock().tickets.iter().rev().map(|(id, _)| id.clone()).collect())
    }

    async fn view(&self, id: &TicketId) -> Result<String> {
        let mut state = self.lock();
        state.view_calls += 1;
        state
            .tickets
            .iter()
            .find(|(t, _)| t == id)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| AppError::permanent("view", 404, "Issue does not exist"))
    }

    async fn edit(&self, id: &TicketId, body: &str) -> Result<()> {
        self.lock().edits.push((id.clone(), body.to_string()));
        Ok(())
    }

    async fn comment(&self, id: &TicketId, text: &str) -> Result<()> {
        self.lock().comments.push((id.clone(), text.to_string()));
        Ok(())
    }
}

/// File storage that records uploads.
#[derive(Debug, Default)]
pub struct FakeStorage {
    uploads: Mutex<Vec<(PathBuf, FolderId)>>,
    fail: Mutex<bool>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let storage = Self::default();
        *storage.fail.lock().unwrap() = true;
        storage
    }

    pub fn uploads(&self) -> Vec<(PathBuf, FolderId)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn ensure_folder(&self, segments: &[String]) -> Result<FolderId> {
        Ok(FolderId(segments.join("/")))
    }

    async fn upload(&self, local_path: &Path, folder: &FolderId) -> Result<String> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::permanent("upload", 403, "quota exceeded"));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), folder.clone()));
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("https://files.example/{folder}/{name}"))
    }
}

/// Source returning a fixed list of raw items.
#[derive(Debug, Clone)]
pub struct FakeSource {
    name: String,
    raws: Vec<RawArticle>,
}

impl FakeSource {
    pub fn new(name: &str, raws: Vec<RawArticle>) -> Self {
        Self {
            name: name.to_string(),
            raws,
        }
    }
}

#[async_trait]
impl ArticleSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        Ok(FetchOutcome::from_raw(self.raws.clone(), &self.name))
    }
}

/// Raw item with just a title and link.
pub fn raw(title: &str, url: &str) -> RawArticle {
    RawArticle {
        title: title.to_string(),
        url: url.to_string(),
        ..RawArticle::default()
    }
}

/// Record for a link, as the extractor would produce it.
pub fn record(title: &str, url: &str) -> ArticleRecord {
    crate::identity::extract(raw(title, url), "Test").unwrap()
}

