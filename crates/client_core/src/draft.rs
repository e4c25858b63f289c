use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use storage::DraftKvStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_DRAFT_VERSION: u32 = 1;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub trait DraftData: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> DraftData for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftEnvelope<T> {
    pub data: T,
    pub timestamp: i64,
    pub version: u32,
}

impl<T> DraftEnvelope<T> {
    pub fn new(data: T, version: u32, timestamp: i64) -> Self {
        Self {
            data,
            timestamp,
            version,
        }
    }

    pub fn is_valid(&self, expected_version: u32, max_age: Duration, now_ms: i64) -> bool {
        if self.version != expected_version {
            return false;
        }
        let age_ms = now_ms.saturating_sub(self.timestamp).max(0);
        u128::from(age_ms.unsigned_abs()) <= max_age.as_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftOptions {
    pub version: u32,
    pub max_age: Duration,
    pub debounce: Duration,
}

impl Default for DraftOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_DRAFT_VERSION,
            max_age: DEFAULT_MAX_AGE,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restoration<T> {
    Restored(T),
    Fresh(T),
}

impl<T> Restoration<T> {
    pub fn was_restored(&self) -> bool {
        matches!(self, Self::Restored(_))
    }

    pub fn data(&self) -> &T {
        match self {
            Self::Restored(data) | Self::Fresh(data) => data,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Restored(data) | Self::Fresh(data) => data,
        }
    }
}

struct DraftShared<T> {
    data: T,
    revision: u64,
    saved_revision: u64,
    last_saved: Option<i64>,
    // Bumped by `clear`; writes armed under an older epoch are dropped.
    epoch: u64,
    // Set by `clear`; nothing is written until the next edit.
    cleared: bool,
}

impl<T> DraftShared<T> {
    fn has_unsaved_changes(&self) -> bool {
        self.revision != self.saved_revision
    }
}

fn lock<T>(shared: &Mutex<DraftShared<T>>) -> MutexGuard<'_, DraftShared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

struct WriteJob<T> {
    backend: Arc<dyn DraftKvStore>,
    key: String,
    version: u32,
    shared: Arc<Mutex<DraftShared<T>>>,
    io: Arc<tokio::sync::Mutex<()>>,
    epoch: u64,
}

impl<T: DraftData> WriteJob<T> {
    async fn run(self) -> bool {
        let _io = self.io.lock().await;

        let (data, revision) = {
            let shared = lock(&self.shared);
            if shared.epoch != self.epoch {
                debug!(key = %self.key, "dropping draft write armed before clear");
                return false;
            }
            if shared.cleared {
                debug!(key = %self.key, "draft cleared and unchanged since; skipping write");
                return false;
            }
            (shared.data.clone(), shared.revision)
        };

        let timestamp = now_ms();
        let envelope = DraftEnvelope::new(data, self.version, timestamp);
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to serialize draft");
                return false;
            }
        };

        if let Err(err) = self.backend.set(&self.key, &raw).await {
            warn!(key = %self.key, error = %err, "draft write failed; continuing without persistence");
            return false;
        }

        let mut shared = lock(&self.shared);
        if revision > shared.saved_revision {
            shared.saved_revision = revision;
        }
        shared.last_saved = Some(timestamp);
        debug!(key = %self.key, revision, "draft written");
        true
    }
}

pub struct DraftStore<T: DraftData> {
    key: String,
    options: DraftOptions,
    backend: Arc<dyn DraftKvStore>,
    shared: Arc<Mutex<DraftShared<T>>>,
    io: Arc<tokio::sync::Mutex<()>>,
    pending: Option<JoinHandle<()>>,
    closed: bool,
}

impl<T: DraftData> DraftStore<T> {
    pub async fn open(
        backend: Arc<dyn DraftKvStore>,
        key: impl Into<String>,
        initial: T,
        options: DraftOptions,
    ) -> (Self, Restoration<T>) {
        Self::open_with(backend, key, initial, options, |_| true).await
    }

    /// Like [`DraftStore::open`], but a stored payload must also pass `accept`.
    /// Rejected payloads are deleted exactly like version mismatches.
    pub async fn open_with(
        backend: Arc<dyn DraftKvStore>,
        key: impl Into<String>,
        initial: T,
        options: DraftOptions,
        accept: impl FnOnce(&T) -> bool,
    ) -> (Self, Restoration<T>) {
        let key = key.into();
        let restoration = match read_envelope::<T>(backend.as_ref(), &key, &options).await {
            StoredDraft::Valid(data) => {
                if accept(&data) {
                    info!(key = %key, "restored draft");
                    Restoration::Restored(data)
                } else {
                    info!(key = %key, "stored draft does not fit current shape; discarding");
                    discard(backend.as_ref(), &key).await;
                    Restoration::Fresh(initial)
                }
            }
            StoredDraft::Invalid => {
                discard(backend.as_ref(), &key).await;
                Restoration::Fresh(initial)
            }
            StoredDraft::Absent => Restoration::Fresh(initial),
        };

        let store = Self {
            key,
            options,
            backend,
            shared: Arc::new(Mutex::new(DraftShared {
                data: restoration.data().clone(),
                revision: 0,
                saved_revision: 0,
                last_saved: None,
                epoch: 0,
                cleared: false,
            })),
            io: Arc::new(tokio::sync::Mutex::new(())),
            pending: None,
            closed: false,
        };
        (store, restoration)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> DraftOptions {
        self.options
    }

    pub fn data(&self) -> T {
        lock(&self.shared).data.clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.shared).data)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        lock(&self.shared).has_unsaved_changes()
    }

    pub fn last_saved(&self) -> Option<i64> {
        lock(&self.shared).last_saved
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn set_data(&mut self, value: T) {
        self.update(move |data| *data = value);
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut shared = lock(&self.shared);
            let result = f(&mut shared.data);
            shared.revision += 1;
            shared.cleared = false;
            result
        };
        self.schedule_save();
        result
    }

    pub fn schedule_save(&mut self) {
        self.cancel_pending();
        let job = self.write_job();
        let delay = self.options.debounce;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.run().await;
        }));
    }

    pub async fn save_now(&mut self) -> bool {
        self.cancel_pending();
        self.write_job().run().await
    }

    pub async fn clear(&mut self) {
        self.cancel_pending();
        {
            let mut shared = lock(&self.shared);
            shared.epoch += 1;
            shared.cleared = true;
            shared.saved_revision = shared.revision;
            shared.last_saved = None;
        }
        let _io = self.io.lock().await;
        match self.backend.delete(&self.key).await {
            Ok(()) => info!(key = %self.key, "draft cleared"),
            Err(err) => warn!(key = %self.key, error = %err, "failed to delete draft"),
        }
    }

    pub async fn close(mut self) {
        self.cancel_pending();
        self.closed = true;
        if self.has_unsaved_changes() {
            self.write_job().run().await;
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn write_job(&self) -> WriteJob<T> {
        let epoch = lock(&self.shared).epoch;
        WriteJob {
            backend: Arc::clone(&self.backend),
            key: self.key.clone(),
            version: self.options.version,
            shared: Arc::clone(&self.shared),
            io: Arc::clone(&self.io),
            epoch,
        }
    }
}

impl<T: DraftData> Drop for DraftStore<T> {
    fn drop(&mut self) {
        self.cancel_pending();
        if self.closed || !self.has_unsaved_changes() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let job = self.write_job();
                runtime.spawn(job.run());
            }
            Err(_) => warn!(
                key = %self.key,
                "draft dropped outside a runtime with unsaved changes"
            ),
        }
    }
}

enum StoredDraft<T> {
    Absent,
    Invalid,
    Valid(T),
}

async fn read_envelope<T: DraftData>(
    backend: &dyn DraftKvStore,
    key: &str,
    options: &DraftOptions,
) -> StoredDraft<T> {
    let raw = match backend.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return StoredDraft::Absent,
        Err(err) => {
            warn!(key = %key, error = %err, "draft read failed; starting fresh");
            return StoredDraft::Absent;
        }
    };

    let envelope = match serde_json::from_str::<DraftEnvelope<T>>(&raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            info!(key = %key, error = %err, "discarding unreadable draft");
            return StoredDraft::Invalid;
        }
    };

    if envelope.is_valid(options.version, options.max_age, now_ms()) {
        StoredDraft::Valid(envelope.data)
    } else {
        info!(
            key = %key,
            stored_version = envelope.version,
            expected_version = options.version,
            "discarding stale or incompatible draft"
        );
        StoredDraft::Invalid
    }
}

async fn discard(backend: &dyn DraftKvStore, key: &str) {
    if let Err(err) = backend.delete(key).await {
        warn!(key = %key, error = %err, "failed to delete discarded draft");
    }
}

#[cfg(test)]
#[path = "tests/draft_tests.rs"]
mod tests;
