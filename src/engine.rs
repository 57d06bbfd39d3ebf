use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, broadcast};

use crate::cache::{CacheSnapshot, LocalCache};
use crate::config::Config;
use crate::error::{ErrorKind, SyncError};
use crate::record::{Person, SessionRecord, sanitize};
use crate::remote::RemoteClient;
use crate::transport;

/// Buffered events per subscriber before the oldest are dropped.
pub const EVENT_CAPACITY: usize = 64;

/// Per-person synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Only the local cache is trusted.
    Stale,
    /// A remote list is in flight.
    Syncing,
    /// Local collection equals the last successful remote list.
    Synced,
    /// Last remote attempt failed; local collection kept as is.
    SyncFailed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::SyncFailed => "sync_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    SyncOk,
    SyncBlocked,
    SyncDisabled,
    Sending,
    Sent,
    SendBlocked,
    Resetting,
    ResetOk,
    ResetBlocked,
}

impl NoticeKind {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SyncBlocked | Self::SendBlocked | Self::ResetBlocked)
    }
}

/// Transient, non-fatal message for the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Bootstrap,
    LocalWrite(Person),
    LocalReset,
    RemoteSync,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The snapshot changed; re-read it with [`SyncEngine::snapshot`].
    Changed(ChangeReason),
    Notice(Notice),
}

/// Result of one [`SyncEngine::sync_all`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub synced: Vec<Person>,
    pub failed: Vec<(Person, ErrorKind)>,
    /// Listed fine, but a local write landed while the list was in flight,
    /// so the stale rows were discarded.
    pub superseded: Vec<Person>,
    /// True when remote sync is disabled and nothing was attempted.
    pub skipped: bool,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        !self.skipped && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The remote store acknowledged the record.
    Confirmed,
    /// Kept locally only. `error` is `None` when remote sync is disabled.
    LocalOnly { error: Option<ErrorKind> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    Confirmed,
    /// Local collections were cleared; the listed remote resets failed.
    LocalOnly { failed: Vec<(Person, ErrorKind)> },
}

struct EngineState {
    snapshot: CacheSnapshot,
    states: BTreeMap<Person, SyncState>,
    /// Bumped on every local mutation of a person's collection.
    generations: BTreeMap<Person, u64>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            snapshot: CacheSnapshot::default(),
            states: Person::ALL.map(|p| (p, SyncState::Stale)).into(),
            generations: Person::ALL.map(|p| (p, 0)).into(),
        }
    }

    fn set(&mut self, person: Person, state: SyncState) {
        self.states.insert(person, state);
    }

    fn generation(&self, person: Person) -> u64 {
        self.generations.get(&person).copied().unwrap_or_default()
    }

    fn bump(&mut self, person: Person) {
        *self.generations.entry(person).or_default() += 1;
    }
}

/// Reconciles the local cache with the remote store.
///
/// Local mutations are applied, mirrored to the cache and announced before
/// any network round trip. Remote failures never roll back local state;
/// they become [`Notice`]s. `sync_all` passes are serialized, so the last
/// pass to finish determines the snapshot.
pub struct SyncEngine {
    remote: Option<RemoteClient>,
    cache: LocalCache,
    inner: Mutex<EngineState>,
    sync_gate: AsyncMutex<()>,
    events: broadcast::Sender<EngineEvent>,
}

impl SyncEngine {
    /// `remote: None` runs local-only.
    pub fn new(cache: LocalCache, remote: Option<RemoteClient>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            cache,
            inner: Mutex::new(EngineState::new()),
            sync_gate: AsyncMutex::new(()),
            events,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let cache = LocalCache::new(&config.cache_dir);
        let remote = match config.sync_endpoint() {
            Some(endpoint) => {
                let transport = transport::build(config.transport, endpoint, config.timeout())?;
                tracing::info!(transport = transport.name(), "remote sync enabled");
                Some(RemoteClient::new(transport))
            }
            None => None,
        };
        Ok(Self::new(cache, remote))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    pub fn transport_name(&self) -> Option<&'static str> {
        self.remote.as_ref().map(RemoteClient::transport_name)
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.with_state(|s| s.snapshot.clone())
    }

    pub fn collection(&self, person: Person) -> Vec<SessionRecord> {
        self.with_state(|s| s.snapshot.collection(person).to_vec())
    }

    pub fn state(&self, person: Person) -> SyncState {
        self.with_state(|s| s.states.get(&person).copied().unwrap_or(SyncState::Stale))
    }

    /// Load the cache mirror and announce it. Never touches the network.
    pub fn bootstrap(&self) {
        let loaded = self.cache.load();
        tracing::debug!(records = loaded.len(), "bootstrap from local cache");
        self.with_state(|s| {
            s.snapshot = loaded;
            for person in Person::ALL {
                s.set(person, SyncState::Stale);
                s.bump(person);
            }
        });
        self.emit(EngineEvent::Changed(ChangeReason::Bootstrap));

        if self.remote.is_none() {
            self.notice(
                NoticeKind::SyncDisabled,
                "remote sync disabled: no http(s) endpoint configured".to_string(),
                None,
            );
        }
    }

    /// List both persons concurrently and replace each collection whose
    /// list succeeded. A failed person keeps its local collection, and so
    /// does a person written locally while the list was in flight.
    pub async fn sync_all(&self) -> SyncReport {
        let Some(remote) = &self.remote else {
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        };

        let _gate = self.sync_gate.lock().await;
        let issued: BTreeMap<Person, u64> = self.with_state(|s| {
            for person in Person::ALL {
                s.set(person, SyncState::Syncing);
            }
            Person::ALL.map(|p| (p, s.generation(p))).into()
        });
        let _syncing = SyncingGuard { engine: self };

        let results = join_all(
            Person::ALL.map(|person| async move { (person, remote.list(person).await) }),
        )
        .await;

        let mut report = SyncReport::default();
        let mut first_error: Option<SyncError> = None;
        self.with_state(|s| {
            for (person, result) in results {
                match result {
                    Ok(_) if issued.get(&person) != Some(&s.generation(person)) => {
                        tracing::debug!(
                            person = person.as_str(),
                            "remote list superseded by local write"
                        );
                        if s.states.get(&person) == Some(&SyncState::Syncing) {
                            s.set(person, SyncState::Stale);
                        }
                        report.superseded.push(person);
                    }
                    Ok(rows) => {
                        s.snapshot
                            .replace(person, rows.iter().map(sanitize).collect());
                        s.set(person, SyncState::Synced);
                        report.synced.push(person);
                    }
                    Err(e) => {
                        tracing::warn!(
                            person = person.as_str(),
                            retryable = e.is_retryable(),
                            "remote list failed: {e}"
                        );
                        s.set(person, SyncState::SyncFailed);
                        report.failed.push((person, e.kind()));
                        first_error.get_or_insert(e);
                    }
                }
            }
            if !report.synced.is_empty() {
                self.cache.save(&s.snapshot);
            }
        });

        if !report.synced.is_empty() {
            tracing::info!(synced = ?report.synced, "remote sync applied");
            self.emit(EngineEvent::Changed(ChangeReason::RemoteSync));
        }

        match first_error {
            None => self.notice(NoticeKind::SyncOk, "remote sync ok".to_string(), None),
            Some(e) => self.notice(
                NoticeKind::SyncBlocked,
                format!("remote sync blocked: {}", e.user_message()),
                Some(e.kind()),
            ),
        }
        report
    }

    /// Optimistic write: the record is stored and announced locally first,
    /// then sent. On acknowledgement a full resync follows; on failure the
    /// local record stays.
    pub async fn record_live(&self, person: Person, raw: &Value) -> WriteOutcome {
        let record = sanitize(raw);
        self.with_state(|s| {
            s.snapshot.push(person, record.clone());
            s.bump(person);
            self.cache.save(&s.snapshot);
        });
        self.emit(EngineEvent::Changed(ChangeReason::LocalWrite(person)));

        let Some(remote) = &self.remote else {
            return WriteOutcome::LocalOnly { error: None };
        };

        self.notice(
            NoticeKind::Sending,
            "sending to remote store".to_string(),
            None,
        );
        match remote.add(person, &record).await {
            Ok(()) => {
                self.notice(NoticeKind::Sent, "sent to remote store".to_string(), None);
                self.sync_all().await;
                WriteOutcome::Confirmed
            }
            Err(e) => {
                tracing::warn!(
                    person = person.as_str(),
                    retryable = e.is_retryable(),
                    "remote add failed: {e}"
                );
                self.with_state(|s| s.set(person, SyncState::SyncFailed));
                self.notice(
                    NoticeKind::SendBlocked,
                    format!("send blocked, kept locally: {}", e.user_message()),
                    Some(e.kind()),
                );
                WriteOutcome::LocalOnly {
                    error: Some(e.kind()),
                }
            }
        }
    }

    /// Clear both collections locally, then remotely. Confirmation is the
    /// caller's job. A remote failure does not restore local data.
    pub async fn reset_all(&self) -> ResetOutcome {
        self.with_state(|s| {
            s.snapshot.clear();
            for person in Person::ALL {
                s.bump(person);
            }
            self.cache.save(&s.snapshot);
        });
        self.emit(EngineEvent::Changed(ChangeReason::LocalReset));

        let Some(remote) = &self.remote else {
            return ResetOutcome::LocalOnly { failed: Vec::new() };
        };

        self.notice(
            NoticeKind::Resetting,
            "resetting remote store".to_string(),
            None,
        );
        let results = join_all(
            Person::ALL.map(|person| async move { (person, remote.reset(person).await) }),
        )
        .await;

        let mut failed = Vec::new();
        let mut first_error: Option<SyncError> = None;
        for (person, result) in results {
            if let Err(e) = result {
                tracing::warn!(
                    person = person.as_str(),
                    retryable = e.is_retryable(),
                    "remote reset failed: {e}"
                );
                failed.push((person, e.kind()));
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => {
                self.notice(NoticeKind::ResetOk, "remote reset ok".to_string(), None);
                self.sync_all().await;
                ResetOutcome::Confirmed
            }
            Some(e) => {
                self.with_state(|s| {
                    for (person, _) in &failed {
                        s.set(*person, SyncState::SyncFailed);
                    }
                });
                self.notice(
                    NoticeKind::ResetBlocked,
                    format!("remote reset blocked, local reset kept: {}", e.user_message()),
                    Some(e.kind()),
                );
                ResetOutcome::LocalOnly { failed }
            }
        }
    }

    /// Liveness probe against the remote store.
    pub async fn ping(&self) -> Result<Value, SyncError> {
        match &self.remote {
            Some(remote) => remote.ping().await,
            None => Err(SyncError::Other("remote sync disabled".to_string())),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notice(&self, kind: NoticeKind, message: String, error: Option<ErrorKind>) {
        self.emit(EngineEvent::Notice(Notice {
            kind,
            message,
            error,
        }));
    }
}

/// Moves anyone still `Syncing` to `SyncFailed` if a sync pass is dropped
/// before it settles.
struct SyncingGuard<'a> {
    engine: &'a SyncEngine,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.engine.with_state(|s| {
            for state in s.states.values_mut() {
                if *state == SyncState::Syncing {
                    *state = SyncState::SyncFailed;
                }
            }
        });
    }
}
