//! Filters, sort orders and the lazy note sequence returned by
//! [`RecordStore::list_notes`](super::record_store::RecordStore::list_notes).
//!
//! A [`NoteQuery`] holds no database resources. A pass over it reads the
//! ordered list of matching ids in one statement when it starts, then loads
//! the notes themselves one page at a time. Membership and order are fixed
//! for the whole pass, so a note edited between pages is neither repeated nor
//! skipped; it is returned once, in its starting position, with its current
//! content. Notes that leave the filter or are purged mid-pass are dropped.
//! Iterating the same query again starts a new pass.

use crate::core::record_store::RecordStore;
use crate::{Note, Result};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default number of notes fetched per round trip.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Keeps a page's `IN (...)` list well under SQLite's parameter limit.
pub const MAX_PAGE_SIZE: usize = 500;

/// Which lifecycle states a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NoteFilter {
    Active,
    Trashed,
    All,
}

/// The field a listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Modified,
    Created,
    Title,
}

impl SortKey {
    /// Name stored in the `app_state.sort_mode` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Created => "created",
            Self::Title => "title",
        }
    }

    /// Parses a stored sort mode. Accepts the legacy `time_edited` /
    /// `time_created` names as well.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "modified" | "time_edited" => Some(Self::Modified),
            "created" | "time_created" => Some(Self::Created),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Modified => "modified_at",
            Self::Created => "created_at",
            Self::Title => "title",
        }
    }
}

/// Sort key plus direction. Ties are always broken by note id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl SortSpec {
    pub fn ascending(key: SortKey) -> Self {
        Self { key, ascending: true }
    }

    pub fn descending(key: SortKey) -> Self {
        Self { key, ascending: false }
    }
}

impl Default for SortSpec {
    /// Most recently edited first.
    fn default() -> Self {
        Self::descending(SortKey::Modified)
    }
}

/// A lazy, finite, restartable listing of notes.
#[derive(Clone, Copy)]
pub struct NoteQuery<'a> {
    store: &'a RecordStore,
    filter: NoteFilter,
    sort: SortSpec,
    modified_since: Option<i64>,
    page_size: usize,
}

impl<'a> NoteQuery<'a> {
    pub(crate) fn new(store: &'a RecordStore, filter: NoteFilter, sort: SortSpec) -> Self {
        Self {
            store,
            filter,
            sort,
            modified_since: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Restricts the listing to notes with `modified_at` strictly after `since`.
    #[must_use]
    pub fn modified_since(mut self, since: i64) -> Self {
        self.modified_since = Some(since);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn filter(&self) -> NoteFilter {
        self.filter
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    /// Starts a fresh pass over the listing.
    pub fn iter(&self) -> NoteIter<'a> {
        NoteIter {
            query: *self,
            pending: None,
            page: VecDeque::new(),
            failed: false,
        }
    }

    /// Collects the whole listing, stopping at the first error.
    pub fn to_vec(&self) -> Result<Vec<Note>> {
        self.iter().collect()
    }

    fn state_condition(&self) -> &'static str {
        match self.filter {
            NoteFilter::Active => " AND state = 'active'",
            NoteFilter::Trashed => " AND state = 'trashed'",
            NoteFilter::All => "",
        }
    }

    /// SQL and parameters listing every matching id in pass order.
    fn ids_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT id FROM notes WHERE 1 = 1{}", self.state_condition());
        let mut params = Vec::new();
        if let Some(since) = self.modified_since {
            sql.push_str(" AND modified_at > ?");
            params.push(Value::Integer(since));
        }

        let column = self.sort.key.column();
        let direction = if self.sort.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {column} {direction}, id ASC"));
        (sql, params)
    }

    /// SQL and parameters loading the notes with the given ids.
    fn page_sql(&self, ids: &[String]) -> (String, Vec<Value>) {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, title, body, created_at, modified_at, state, trashed_at
             FROM notes WHERE id IN ({placeholders}){}",
            self.state_condition()
        );
        let params = ids.iter().cloned().map(Value::Text).collect();
        (sql, params)
    }
}

impl<'a> IntoIterator for NoteQuery<'a> {
    type Item = Result<Note>;
    type IntoIter = NoteIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &NoteQuery<'a> {
    type Item = Result<Note>;
    type IntoIter = NoteIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`NoteQuery`]. Ends after the first error.
pub struct NoteIter<'a> {
    query: NoteQuery<'a>,
    /// Ids not yet loaded; `None` until the pass has started.
    pending: Option<VecDeque<String>>,
    page: VecDeque<Note>,
    failed: bool,
}

impl NoteIter<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        if self.pending.is_none() {
            let (sql, params) = self.query.ids_sql();
            let ids = self.query.store.query_ids(&sql, &params)?;
            self.pending = Some(ids.into());
        }
        let Some(pending) = self.pending.as_mut() else {
            return Ok(());
        };

        while self.page.is_empty() && !pending.is_empty() {
            let take = self.query.page_size.min(pending.len());
            let ids: Vec<String> = pending.drain(..take).collect();
            let (sql, params) = self.query.page_sql(&ids);
            let mut loaded: HashMap<String, Note> = self
                .query
                .store
                .query_notes(&sql, &params)?
                .into_iter()
                .map(|note| (note.id.clone(), note))
                .collect();
            self.page.extend(ids.iter().filter_map(|id| loaded.remove(id)));
        }
        Ok(())
    }
}

impl Iterator for NoteIter<'_> {
    type Item = Result<Note>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.page.is_empty() {
            if let Err(e) = self.fetch_page() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        self.page.pop_front().map(Ok)
    }
}
