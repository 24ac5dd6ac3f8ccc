//! Per-note edit buffers with debounced and blocking flushes.

use super::{AutosaveConfig, DirtyTracker};
use crate::{RecordStore, Result, TkNoteError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Snapshot of the working copy of an open note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub note_id: String,
    pub title: String,
    pub body: String,
    pub dirty: bool,
}

/// A change to an edit buffer; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferEdit {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl BufferEdit {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: None,
        }
    }

    pub fn body(body: impl Into<String>) -> Self {
        Self {
            title: None,
            body: Some(body.into()),
        }
    }
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Debounce,
    Save,
    Close,
    Shutdown,
}

/// A failed flush, kept for the GUI to show as a non-fatal warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushWarning {
    pub note_id: String,
    pub trigger: FlushTrigger,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutosaveStats {
    pub flushes: u64,
    pub failed_flushes: u64,
}

/// Edits that could not be persisted before shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostChanges {
    pub note_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Notes whose pending edits were written during shutdown.
    pub flushed: Vec<String>,
    pub lost: Vec<LostChanges>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.lost.is_empty()
    }
}

struct Slot {
    title: String,
    body: String,
    tracker: DirtyTracker,
    timer: Option<JoinHandle<()>>,
}

impl Slot {
    fn snapshot(&self, note_id: &str) -> EditBuffer {
        EditBuffer {
            note_id: note_id.to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            dirty: self.tracker.is_dirty(),
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Shared {
    store: Arc<RecordStore>,
    config: AutosaveConfig,
    slots: Mutex<HashMap<String, Slot>>,
    /// Held for the whole of a flush so writes for one note land in order.
    /// Entries outlive their buffer: a flush still waiting on the lock of a
    /// closed buffer must serialise with flushes of the reopened one.
    flush_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: Mutex<AutosaveStats>,
    warnings: Mutex<Vec<FlushWarning>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_open(&self, note_id: &str) -> bool {
        lock(&self.slots).contains_key(note_id)
    }

    fn flush_lock_of(&self, note_id: &str) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.flush_locks);
        Arc::clone(locks.entry(note_id.to_string()).or_default())
    }

    /// Writes the buffer of `note_id` if it is dirty. Returns whether a write happened.
    fn flush(&self, note_id: &str, trigger: FlushTrigger) -> Result<bool> {
        if !self.is_open(note_id) {
            return Ok(false);
        }
        let flush_lock = self.flush_lock_of(note_id);
        let _guard = lock(&flush_lock);
        self.flush_locked(note_id, trigger)
    }

    /// Like [`flush`](Self::flush); the caller already holds the note's flush lock.
    fn flush_locked(&self, note_id: &str, trigger: FlushTrigger) -> Result<bool> {
        let (title, body, generation) = {
            let mut slots = lock(&self.slots);
            match slots.get_mut(note_id) {
                Some(slot) if slot.tracker.is_dirty() => (
                    slot.title.clone(),
                    slot.body.clone(),
                    slot.tracker.start_save(),
                ),
                _ => return Ok(false),
            }
        };

        // The slots lock is released here: edits to any note continue while we write.
        let result = self.store.update_note(note_id, Some(&title), Some(&body));

        if let Some(slot) = lock(&self.slots).get_mut(note_id) {
            match result {
                Ok(_) => {
                    slot.tracker.save_complete(generation);
                }
                Err(_) => slot.tracker.save_failed(),
            }
        }

        match result {
            Ok(_) => {
                lock(&self.stats).flushes += 1;
                log::debug!("Autosave ({trigger:?}) wrote note {note_id}");
                Ok(true)
            }
            Err(e) => {
                lock(&self.stats).failed_flushes += 1;
                log::warn!("Autosave ({trigger:?}) failed for note {note_id}: {e}");
                lock(&self.warnings).push(FlushWarning {
                    note_id: note_id.to_string(),
                    trigger,
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }
}

/// Keeps the edit buffers of open notes and writes them to the store.
///
/// Every edit restarts that buffer's debounce timer; the timers run on a small
/// tokio runtime owned by the scheduler and the writes themselves run on its
/// blocking pool. All public methods are synchronous and may be called from
/// the GUI thread, but not from inside another tokio runtime.
///
/// Call [`shutdown`](Self::shutdown) before exiting: dropping the scheduler
/// cancels pending timers without flushing.
pub struct AutosaveScheduler {
    shared: Arc<Shared>,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl AutosaveScheduler {
    /// Creates a scheduler writing through `store`.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::Io`] if the timer runtime cannot be started.
    pub fn new(store: Arc<RecordStore>, config: AutosaveConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tknote-autosave")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            shared: Arc::new(Shared {
                store,
                config,
                slots: Mutex::new(HashMap::new()),
                flush_locks: Mutex::new(HashMap::new()),
                stats: Mutex::new(AutosaveStats::default()),
                warnings: Mutex::new(Vec::new()),
            }),
            handle,
            runtime: Some(runtime),
        })
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.shared.config
    }

    /// Opens `note_id` for editing. A note that is already open keeps its
    /// existing buffer, unsaved edits included.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::NotFound`] for unknown notes and
    /// [`TkNoteError::InvalidState`] for notes in the trash.
    pub fn open(&self, note_id: &str) -> Result<EditBuffer> {
        if let Some(buffer) = self.buffer(note_id) {
            return Ok(buffer);
        }

        let note = self.shared.store.get_note(note_id)?;
        if note.is_trashed() {
            return Err(TkNoteError::InvalidState(format!(
                "Note {note_id} is in the trash and cannot be edited"
            )));
        }

        let mut slots = lock(&self.shared.slots);
        let slot = slots.entry(note.id).or_insert_with(|| Slot {
            title: note.title,
            body: note.body,
            tracker: DirtyTracker::new(),
            timer: None,
        });
        log::debug!("Opened edit buffer for note {note_id}");
        Ok(slot.snapshot(note_id))
    }

    pub fn buffer(&self, note_id: &str) -> Option<EditBuffer> {
        lock(&self.shared.slots)
            .get(note_id)
            .map(|slot| slot.snapshot(note_id))
    }

    /// IDs of all open notes, sorted.
    pub fn open_buffers(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.shared.slots).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_dirty(&self, note_id: &str) -> bool {
        lock(&self.shared.slots)
            .get(note_id)
            .is_some_and(|slot| slot.tracker.is_dirty())
    }

    /// Applies `edit` to the buffer and (re)starts its debounce timer.
    ///
    /// Edits that leave the content unchanged do not dirty the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TkNoteError::InvalidState`] if the note is not open.
    pub fn edit(&self, note_id: &str, edit: BufferEdit) -> Result<EditBuffer> {
        let mut slots = lock(&self.shared.slots);
        let slot = slots.get_mut(note_id).ok_or_else(|| {
            TkNoteError::InvalidState(format!("Note {note_id} is not open for editing"))
        })?;

        let mut changed = false;
        if let Some(title) = edit.title.filter(|t| *t != slot.title) {
            slot.title = title;
            changed = true;
        }
        if let Some(body) = edit.body.filter(|b| *b != slot.body) {
            slot.body = body;
            changed = true;
        }
        if !changed {
            return Ok(slot.snapshot(note_id));
        }

        slot.tracker.mark_dirty();
        slot.cancel_timer();
        if let Some(delay) = slot.tracker.flush_delay(&self.shared.config) {
            slot.timer = Some(self.spawn_timer(note_id.to_string(), delay));
        }
        Ok(slot.snapshot(note_id))
    }

    pub fn set_title(&self, note_id: &str, title: &str) -> Result<EditBuffer> {
        self.edit(note_id, BufferEdit::title(title))
    }

    pub fn set_body(&self, note_id: &str, body: &str) -> Result<EditBuffer> {
        self.edit(note_id, BufferEdit::body(body))
    }

    fn spawn_timer(&self, note_id: String, delay: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let flush = tokio::task::spawn_blocking(move || {
                // A failure is recorded as a FlushWarning and retried on the next trigger.
                let _ = shared.flush(&note_id, FlushTrigger::Debounce);
            });
            if let Err(e) = flush.await {
                log::error!("Autosave flush task failed: {e}");
            }
        })
    }

    /// Writes the buffer now if it has unsaved edits. Returns whether a write happened.
    pub fn save(&self, note_id: &str) -> Result<bool> {
        self.shared.flush(note_id, FlushTrigger::Save)
    }

    /// Writes every dirty buffer. All buffers are attempted; the first error
    /// is returned after the rest have been tried.
    pub fn save_all(&self) -> Result<usize> {
        let mut written = 0;
        let mut first_error = None;
        for note_id in self.open_buffers() {
            match self.shared.flush(&note_id, FlushTrigger::Save) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Flushes the buffer and discards it. A buffer that was never edited is
    /// dropped without writing.
    ///
    /// # Errors
    ///
    /// If the flush fails the buffer stays open and dirty and the error is
    /// returned.
    pub fn close(&self, note_id: &str) -> Result<()> {
        if !self.shared.is_open(note_id) {
            return Ok(());
        }
        let flush_lock = self.shared.flush_lock_of(note_id);
        let _guard = lock(&flush_lock);

        loop {
            self.shared.flush_locked(note_id, FlushTrigger::Close)?;

            let mut slots = lock(&self.shared.slots);
            let dirty = slots.get(note_id).map(|slot| slot.tracker.is_dirty());
            match dirty {
                // Edited again while the flush was running.
                Some(true) => continue,
                Some(false) => {
                    if let Some(mut slot) = slots.remove(note_id) {
                        slot.cancel_timer();
                    }
                    break;
                }
                None => break,
            }
        }
        log::debug!("Closed edit buffer for note {note_id}");
        Ok(())
    }

    pub fn stats(&self) -> AutosaveStats {
        *lock(&self.shared.stats)
    }

    /// Takes the flush warnings collected since the last call.
    pub fn drain_warnings(&self) -> Vec<FlushWarning> {
        std::mem::take(&mut *lock(&self.shared.warnings))
    }

    /// Cancels all timers and flushes every dirty buffer, waiting at most
    /// `timeout`. Buffers that could not be written are reported as lost.
    pub fn shutdown(mut self, timeout: Duration) -> ShutdownReport {
        let dirty: Vec<String> = {
            let mut slots = lock(&self.shared.slots);
            for slot in slots.values_mut() {
                slot.cancel_timer();
            }
            let mut ids: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| slot.tracker.is_dirty())
                .map(|(id, _)| id.clone())
                .collect();
            ids.sort();
            ids
        };

        let deadline = tokio::time::Instant::now() + timeout;
        let pending: Vec<(String, JoinHandle<Result<bool>>)> = dirty
            .into_iter()
            .map(|note_id| {
                let shared = Arc::clone(&self.shared);
                let id = note_id.clone();
                let handle = self
                    .handle
                    .spawn_blocking(move || shared.flush(&id, FlushTrigger::Shutdown));
                (note_id, handle)
            })
            .collect();

        let mut report = ShutdownReport::default();
        self.handle.block_on(async {
            for (note_id, handle) in pending {
                match tokio::time::timeout_at(deadline, handle).await {
                    Ok(Ok(Ok(true))) => report.flushed.push(note_id),
                    // Already written by a flush that finished first.
                    Ok(Ok(Ok(false))) => {}
                    Ok(Ok(Err(e))) => report.lost.push(LostChanges {
                        note_id,
                        reason: e.user_message(),
                    }),
                    Ok(Err(e)) => report.lost.push(LostChanges {
                        note_id,
                        reason: e.to_string(),
                    }),
                    Err(_) => report.lost.push(LostChanges {
                        note_id,
                        reason: "Timed out waiting for the save to finish".to_string(),
                    }),
                }
            }
        });

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        for lost in &report.lost {
            log::error!("Unsaved changes to note {} were lost: {}", lost.note_id, lost.reason);
        }
        log::info!(
            "Autosave shut down: {} flushed, {} lost",
            report.flushed.len(),
            report.lost.len()
        );
        report
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let unsaved = lock(&self.shared.slots)
            .values()
            .filter(|slot| slot.tracker.is_dirty())
            .count();
        if unsaved > 0 {
            log::warn!("Autosave dropped without shutdown; {unsaved} buffer(s) had unsaved edits");
        }
        runtime.shutdown_background();
    }
}
