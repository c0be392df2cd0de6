//! Local-first sync engine
//!
//! The engine owns the working copy of the resident collection and the config
//! singleton. Every mutation is written to the [`LocalStore`] before it
//! returns, then pushed to the [`RemoteStore`] after a quiet window. Remote
//! changes arrive through subscriptions and are merged back per record.
//!
//! # Merge policy
//!
//! Remote snapshots are reconciled by id, never swapped in wholesale:
//!
//! - records that differ by value from the local copy are upserted
//! - ids in the remote tombstone set are removed
//! - local records missing from the snapshot are kept
//! - records with local changes not yet confirmed by the remote store are
//!   left alone
//!
//! Applying the same snapshot twice yields the same state, and a snapshot
//! equal to local state publishes nothing. Across sessions the remote store
//! is last-write-wins per record: two offices editing the same resident
//! concurrently keep whichever write landed last.
//!
//! # Echoes
//!
//! Before each push the engine stamps a fresh [`VersionToken`] and remembers
//! it. A subscription change carrying that version (or flagged as a local
//! echo by the store) is this session's own write coming back and is ignored.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use siga_registry::{
    AppConfig, Presentation, Resident, ResidentCollection, ResidentCommand, ResidentId,
};

use crate::debounce::Debouncer;
use crate::error::{RemoteError, Result, SyncError};
use crate::local::LocalStore;
use crate::push_queue::{PendingPush, PushQueue};
use crate::remote::{
    CollectionBody, RecordWrite, RemoteChange, RemoteDocument, RemoteStore, RemoteSubscription,
    VersionToken,
};
use crate::session::{AuthState, SessionGate};
use crate::settings::SyncSettings;

const PUSH_KEY: &str = "push";

/// Own write tokens remembered for echo detection
const OWN_VERSION_HISTORY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Local store only
    Disconnected,
    /// Subscribed, waiting for the first remote snapshot
    Hydrating,
    Synced,
    /// A push is in flight
    Writing,
}

/// Observable engine state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub hydrated: bool,
    pub pending_local_write: bool,
    /// Local changes waiting for the next push
    pub queued_changes: usize,
    pub last_error: Option<String>,
}

#[derive(Clone, Copy)]
enum Feed {
    Residents,
    Config,
}

struct Listeners {
    residents: JoinHandle<()>,
    config: JoinHandle<()>,
}

impl Listeners {
    fn abort(self) {
        self.residents.abort();
        self.config.abort();
    }
}

struct EngineState {
    residents: Arc<ResidentCollection>,
    config: Arc<AppConfig>,
    hydrated: bool,
    /// Last version applied or written, per document
    residents_version: Option<VersionToken>,
    config_version: Option<VersionToken>,
    /// Tokens of this session's recent writes, oldest first
    own_versions: VecDeque<VersionToken>,
    pending_local_write: bool,
    phase: SyncPhase,
    push_queue: PushQueue,
    /// Presentation fields changed locally and not pushed yet
    config_dirty: bool,
    listeners: Option<Listeners>,
    /// Bumped on every connect and disconnect; changes from an older
    /// subscription are dropped
    generation: u64,
    last_error: Option<String>,
    gate: Option<SessionGate>,
    gate_follower: Option<JoinHandle<()>>,
}

impl EngineState {
    fn is_connected(&self) -> bool {
        self.phase != SyncPhase::Disconnected
    }

    fn gate_open(&self) -> bool {
        self.gate
            .as_ref()
            .map(|gate| gate.is_open(&self.config))
            .unwrap_or(true)
    }

    /// Stamp a new write from this session
    fn next_own_version(&mut self) -> VersionToken {
        let version = VersionToken::generate();
        if self.own_versions.len() == OWN_VERSION_HISTORY {
            self.own_versions.pop_front();
        }
        self.own_versions.push_back(version.clone());
        version
    }

    /// A snapshot this session already knows: one of its own writes, or
    /// the version applied last
    fn is_known_version(&self, version: Option<&VersionToken>, last: Option<&VersionToken>) -> bool {
        match version {
            Some(version) => last == Some(version) || self.own_versions.contains(version),
            None => false,
        }
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            phase: self.phase,
            hydrated: self.hydrated,
            pending_local_write: self.pending_local_write,
            queued_changes: self.push_queue.len(),
            last_error: self.last_error.clone(),
        }
    }
}

struct EngineInner {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    settings: SyncSettings,
    runtime: Handle,
    state: Mutex<EngineState>,
    /// Serializes pushes and forced operations
    push_lock: tokio::sync::Mutex<()>,
    debouncer: Debouncer,
    residents_tx: watch::Sender<Arc<ResidentCollection>>,
    config_tx: watch::Sender<Arc<AppConfig>>,
    status_tx: watch::Sender<SyncStatus>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(listeners) = state.listeners.take() {
            listeners.abort();
        }
        if let Some(follower) = state.gate_follower.take() {
            follower.abort();
        }
    }
}

/// Handle to the sync engine; clones share one engine
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Load residents and config from the local store.
    ///
    /// Missing keys start empty / default. Must be called inside a tokio
    /// runtime; background work is scheduled on it.
    pub fn open(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Runtime(e.to_string()))?;

        let residents = match local.get(&settings.residents_key)? {
            Some(json) => ResidentCollection::from_json(&json)?,
            None => ResidentCollection::new(),
        };
        let config = match local.get(&settings.config_key)? {
            Some(json) => AppConfig::from_json(&json)?,
            None => AppConfig::default(),
        };

        let conflicts = residents.head_conflicts();
        if !conflicts.is_empty() {
            warn!(households = ?conflicts, "Households with more than one active head of family");
        }
        info!(
            residents = residents.len(),
            sync_enabled = config.sync_enabled(),
            "Sync engine opened"
        );

        let residents = Arc::new(residents);
        let config = Arc::new(config);
        let state = EngineState {
            residents: Arc::clone(&residents),
            config: Arc::clone(&config),
            hydrated: false,
            residents_version: None,
            config_version: None,
            own_versions: VecDeque::with_capacity(OWN_VERSION_HISTORY),
            pending_local_write: false,
            phase: SyncPhase::Disconnected,
            push_queue: PushQueue::new(),
            config_dirty: false,
            listeners: None,
            generation: 0,
            last_error: None,
            gate: None,
            gate_follower: None,
        };
        let (residents_tx, _) = watch::channel(residents);
        let (config_tx, _) = watch::channel(config);
        let (status_tx, _) = watch::channel(state.status());

        Ok(Self {
            inner: Arc::new(EngineInner {
                local,
                remote,
                settings,
                runtime,
                state: Mutex::new(state),
                push_lock: tokio::sync::Mutex::new(()),
                debouncer: Debouncer::new(),
                residents_tx,
                config_tx,
                status_tx,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    // ==================== Lifecycle ====================

    /// Start syncing according to the stored config.
    ///
    /// With remote sync disabled the engine is hydrated at once and works on
    /// the local store only. With a session gate attached and closed, the
    /// engine waits for sign-in.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.state();
            if !state.config.sync_enabled() {
                state.hydrated = true;
                state.phase = SyncPhase::Disconnected;
                self.publish_status(&state);
                info!("Remote sync disabled, using local store only");
                return Ok(());
            }
            if !state.gate_open() {
                info!("Remote sync waiting for a session");
                return Ok(());
            }
        }
        self.connect().await
    }

    async fn connect(&self) -> Result<()> {
        let generation = {
            let mut state = self.state();
            if state.is_connected() {
                return Ok(());
            }
            if !state.config.sync_enabled() {
                return Err(SyncError::SyncDisabled);
            }
            if !state.gate_open() {
                return Err(SyncError::NotAuthenticated);
            }
            state.generation += 1;
            state.hydrated = false;
            state.phase = SyncPhase::Hydrating;
            state.last_error = None;
            self.publish_status(&state);
            state.generation
        };

        let settings = &self.inner.settings;
        info!(residents = %settings.residents_path, config = %settings.config_path, "Connecting to remote store");

        let subscriptions = async {
            let residents = self.inner.remote.subscribe(&settings.residents_path).await?;
            let config = self.inner.remote.subscribe(&settings.config_path).await?;
            Ok::<_, RemoteError>((residents, config))
        }
        .await;

        let (residents, config) = match subscriptions {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!(error = %e, "Could not subscribe to remote store");
                let mut state = self.state();
                if state.generation == generation {
                    state.phase = SyncPhase::Disconnected;
                    state.hydrated = true;
                    state.last_error = Some(e.to_string());
                    self.publish_status(&state);
                }
                return Err(SyncError::RemoteConnection(e));
            }
        };

        let listeners = Listeners {
            residents: self.spawn_listener(residents, generation, Feed::Residents),
            config: self.spawn_listener(config, generation, Feed::Config),
        };

        let mut state = self.state();
        if state.generation != generation {
            // Disconnected while subscribing
            listeners.abort();
            return Ok(());
        }
        state.listeners = Some(listeners);
        Ok(())
    }

    fn spawn_listener(
        &self,
        mut subscription: RemoteSubscription,
        generation: u64,
        feed: Feed,
    ) -> JoinHandle<()> {
        let engine = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            while let Some(change) = subscription.next().await {
                let Some(inner) = engine.upgrade() else { break };
                let engine = SyncEngine { inner };
                match feed {
                    Feed::Residents => engine.handle_residents_change(Some(generation), change),
                    Feed::Config => engine.handle_config_change(Some(generation), change),
                }
            }
            debug!(generation, "Remote feed ended");
        })
    }

    /// Stop syncing: unsubscribe and cancel any pending push. Queued local
    /// changes are kept for the next connection.
    pub fn disconnect(&self) {
        self.inner.debouncer.cancel_all();
        let mut state = self.state();
        if !state.is_connected() {
            return;
        }
        state.generation += 1;
        if let Some(listeners) = state.listeners.take() {
            listeners.abort();
        }
        state.phase = SyncPhase::Disconnected;
        state.hydrated = true;
        self.publish_status(&state);
        info!(queued = state.push_queue.len(), "Disconnected from remote store");
    }

    /// Couple remote sync to a session gate: connect on sign-in, disconnect
    /// on sign-out. Only matters while sync is enabled.
    pub fn attach_session_gate(&self, gate: SessionGate) {
        let mut changes = gate.watch();
        let engine = Arc::downgrade(&self.inner);

        let mut state = self.state();
        state.gate = Some(gate);

        let follower = self.inner.runtime.spawn(async move {
            loop {
                let auth = changes.borrow_and_update().state;
                let Some(inner) = engine.upgrade() else { break };
                let engine = SyncEngine { inner };
                match auth {
                    AuthState::Authenticated => {
                        if engine.config().sync_enabled() {
                            if let Err(e) = engine.connect().await {
                                warn!(error = %e, "Could not connect after sign-in");
                            }
                        }
                    }
                    AuthState::Unauthenticated => engine.disconnect(),
                    AuthState::Authenticating => {}
                }
                drop(engine);
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = state.gate_follower.replace(follower) {
            previous.abort();
        }
    }

    // ==================== Remote feed ====================

    /// Handle a change on the remote resident collection. Never fails;
    /// problems are logged and recorded in the status.
    pub fn on_remote_residents_update(&self, change: RemoteChange) {
        self.handle_residents_change(None, change);
    }

    /// Handle a change on the remote config document. Only presentation
    /// fields are taken; the local connection descriptor is never replaced.
    pub fn on_remote_config_update(&self, change: RemoteChange) {
        self.handle_config_change(None, change);
    }

    fn handle_residents_change(&self, generation: Option<u64>, change: RemoteChange) {
        let mut state = self.state();
        if generation.is_some_and(|g| g != state.generation) {
            debug!("Dropping change from a closed subscription");
            return;
        }

        let (document, is_local_echo) = match change {
            RemoteChange::Failed(reason) => {
                warn!(%reason, "Remote residents read failed");
                state.last_error = Some(reason);
                self.finish_hydration(&mut state);
                return;
            }
            RemoteChange::Snapshot {
                document,
                is_local_echo,
            } => (document, is_local_echo),
        };

        let version = document.as_ref().and_then(|d| d.version.clone());
        let echo = is_local_echo
            || state.is_known_version(version.as_ref(), state.residents_version.as_ref());
        if echo && state.hydrated {
            debug!(version = ?version, "Ignoring echo of own resident write");
            return;
        }

        let body = match CollectionBody::from_document(document.as_ref()) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Remote resident collection is unreadable");
                state.last_error = Some(e.to_string());
                self.finish_hydration(&mut state);
                return;
            }
        };

        let first_load = !state.hydrated;
        // The first snapshot after (re)connecting is merged even when it is
        // an own write, so hydration always completes
        let merged = reconcile(&state.residents, &body, &state.push_queue);
        if version.is_some() {
            state.residents_version = version;
        }

        if first_load && !merged.local_only.is_empty() {
            info!(records = merged.local_only.len(), "Queueing local records missing remotely");
            for id in merged.local_only {
                state.push_queue.mark_changed(id);
            }
        }

        match merged.collection {
            Some(next) => {
                if let Err(e) = self.persist_residents(&next) {
                    error!(error = %e, "Could not persist remote residents locally");
                    state.last_error = Some(e.to_string());
                }
                info!(
                    upserted = merged.upserted,
                    removed = merged.removed,
                    skipped_dirty = merged.skipped_dirty,
                    "Applied remote residents snapshot"
                );
                self.publish_residents(&mut state, next);
            }
            None => debug!(skipped_dirty = merged.skipped_dirty, "Remote snapshot matches local residents"),
        }

        self.finish_hydration(&mut state);
    }

    fn finish_hydration(&self, state: &mut EngineState) {
        state.hydrated = true;
        if state.phase == SyncPhase::Hydrating {
            state.phase = SyncPhase::Synced;
        }
        self.publish_status(state);
        if state.is_connected() && (!state.push_queue.is_empty() || state.config_dirty) {
            self.schedule_push();
        }
    }

    fn handle_config_change(&self, generation: Option<u64>, change: RemoteChange) {
        let mut state = self.state();
        if generation.is_some_and(|g| g != state.generation) {
            return;
        }

        let document = match change {
            RemoteChange::Failed(reason) => {
                warn!(%reason, "Remote config read failed");
                state.last_error = Some(reason);
                self.publish_status(&state);
                return;
            }
            RemoteChange::Snapshot {
                is_local_echo: true,
                ..
            } => return,
            RemoteChange::Snapshot { document, .. } => document,
        };

        let version = document.as_ref().and_then(|d| d.version.clone());
        if state.is_known_version(version.as_ref(), state.config_version.as_ref()) {
            debug!(version = ?version, "Ignoring echo of own config write");
            return;
        }

        let Some(document) = document else {
            if !state.config_dirty {
                debug!("No remote config yet, uploading local presentation");
                state.config_dirty = true;
                if state.is_connected() {
                    self.schedule_push();
                }
            }
            return;
        };

        state.config_version = version;
        if state.config_dirty {
            debug!("Keeping unpushed local config edits");
            return;
        }

        let presentation: Presentation = match serde_json::from_value(document.body) {
            Ok(presentation) => presentation,
            Err(e) => {
                warn!(error = %e, "Remote config is unreadable");
                state.last_error = Some(e.to_string());
                self.publish_status(&state);
                return;
            }
        };

        let merged = state.config.merged_with_remote(presentation);
        if merged == *state.config {
            return;
        }
        if let Err(e) = self.persist_config(&merged) {
            error!(error = %e, "Could not persist remote config locally");
            state.last_error = Some(e.to_string());
        }
        info!(app_name = %merged.presentation.app_name, "Applied remote config");
        let snapshot = Arc::new(merged);
        state.config = Arc::clone(&snapshot);
        self.inner.config_tx.send_replace(snapshot);
        self.publish_status(&state);
    }

    // ==================== Local mutations ====================

    /// Apply a pure transform to the residents.
    ///
    /// The result is persisted locally before this returns; the remote push
    /// follows after the debounce window. Returns the new snapshot.
    pub fn mutate_residents<F>(&self, f: F) -> Result<Arc<ResidentCollection>>
    where
        F: FnOnce(ResidentCollection) -> ResidentCollection,
    {
        let mut state = self.state();
        let next = f((*state.residents).clone());
        self.commit_local(&mut state, next)
    }

    /// Validate a command against the current residents and apply it.
    /// A rejected command changes nothing.
    pub fn apply(&self, command: ResidentCommand) -> Result<Arc<ResidentCollection>> {
        let name = command.name();
        let mut state = self.state();
        let validated = match command.validate(&state.residents) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(command = name, error = %e, "Command rejected");
                return Err(e.into());
            }
        };
        let created = validated.created().len();
        let next = validated.apply((*state.residents).clone());
        let snapshot = self.commit_local(&mut state, next)?;
        info!(command = name, created, "Command applied");
        Ok(snapshot)
    }

    fn commit_local(
        &self,
        state: &mut EngineState,
        next: ResidentCollection,
    ) -> Result<Arc<ResidentCollection>> {
        if next == *state.residents {
            debug!("Mutation left residents unchanged");
            return Ok(Arc::clone(&state.residents));
        }

        self.persist_residents(&next)?;
        let diff = next.diff_from(&state.residents);
        state.push_queue.record(&diff);
        debug!(
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "Residents changed locally"
        );

        let snapshot = self.publish_residents(state, next);
        self.publish_status(state);
        if state.is_connected() {
            self.schedule_push();
        }
        Ok(snapshot)
    }

    /// Change the config singleton. Turning remote sync on connects, turning
    /// it off disconnects.
    pub async fn update_config<F>(&self, f: F) -> Result<Arc<AppConfig>>
    where
        F: FnOnce(AppConfig) -> AppConfig,
    {
        let (snapshot, was_enabled) = {
            let mut state = self.state();
            let current = Arc::clone(&state.config);
            let next = f((*current).clone());
            if next == *current {
                return Ok(current);
            }

            self.persist_config(&next)?;
            if next.presentation != current.presentation {
                state.config_dirty = true;
            }
            let snapshot = Arc::new(next);
            state.config = Arc::clone(&snapshot);
            self.inner.config_tx.send_replace(Arc::clone(&snapshot));
            if state.config_dirty && state.is_connected() {
                self.schedule_push();
            }
            (snapshot, current.sync_enabled())
        };

        match (was_enabled, snapshot.sync_enabled()) {
            (false, true) => {
                info!("Remote sync enabled");
                match self.connect().await {
                    Ok(()) | Err(SyncError::NotAuthenticated) => {}
                    Err(e) => warn!(error = %e, "Could not connect after enabling sync"),
                }
            }
            (true, false) => {
                info!("Remote sync disabled");
                self.disconnect();
            }
            _ => {}
        }
        Ok(snapshot)
    }

    fn persist_residents(&self, residents: &ResidentCollection) -> Result<()> {
        let json = residents.to_json()?;
        self.inner.local.set(&self.inner.settings.residents_key, &json)?;
        Ok(())
    }

    fn persist_config(&self, config: &AppConfig) -> Result<()> {
        let json = config.to_json()?;
        self.inner.local.set(&self.inner.settings.config_key, &json)?;
        Ok(())
    }

    fn publish_residents(
        &self,
        state: &mut EngineState,
        next: ResidentCollection,
    ) -> Arc<ResidentCollection> {
        let snapshot = Arc::new(next);
        state.residents = Arc::clone(&snapshot);
        self.inner.residents_tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    fn publish_status(&self, state: &EngineState) {
        let next = state.status();
        self.inner.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // ==================== Pushing ====================

    fn schedule_push(&self) {
        let engine = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(
            &self.inner.runtime,
            PUSH_KEY,
            self.inner.settings.debounce(),
            async move {
                if let Some(inner) = engine.upgrade() {
                    SyncEngine { inner }.push_to_remote().await;
                }
            },
        );
    }

    /// Push queued changes now. No-op while disconnected, deferred until the
    /// first remote snapshot was applied. Failures are logged and the
    /// changes stay queued.
    pub async fn push_to_remote(&self) {
        let _guard = self.inner.push_lock.lock().await;
        self.push_residents().await;
        self.push_config().await;
    }

    /// Run a pending debounced push immediately
    pub async fn flush(&self) {
        self.inner.debouncer.cancel(PUSH_KEY);
        self.push_to_remote().await;
    }

    async fn push_residents(&self) {
        let (writes, version) = {
            let mut state = self.state();
            if !state.is_connected() {
                debug!("Not connected, push skipped");
                return;
            }
            if !state.hydrated {
                debug!(queued = state.push_queue.len(), "Push deferred until hydrated");
                return;
            }
            let Some(batch) = state.push_queue.take_batch() else {
                return;
            };
            let writes = record_writes(&batch, &state.residents);
            let version = state.next_own_version();
            state.residents_version = Some(version.clone());
            state.pending_local_write = true;
            state.phase = SyncPhase::Writing;
            self.publish_status(&state);
            (writes, version)
        };

        let count = writes.len();
        let result = self
            .inner
            .remote
            .write_batched(
                &self.inner.settings.residents_path,
                writes,
                &version,
                self.inner.settings.max_batch_size,
            )
            .await;

        let mut state = self.state();
        state.pending_local_write = false;
        if state.phase == SyncPhase::Writing {
            state.phase = SyncPhase::Synced;
        }
        match result {
            Ok(()) => {
                state.push_queue.complete();
                state.last_error = None;
                info!(records = count, %version, "Pushed local changes");
            }
            Err(e) => {
                state.push_queue.requeue();
                state.last_error = Some(e.to_string());
                error!(error = %e, records = count, "Remote write failed, changes stay queued");
            }
        }
        self.publish_status(&state);
    }

    async fn push_config(&self) {
        let (document, version) = {
            let mut state = self.state();
            if !state.is_connected() || !state.config_dirty {
                return;
            }
            let body = match serde_json::to_value(&state.config.presentation) {
                Ok(body) => body,
                Err(e) => {
                    error!(error = %e, "Could not encode config");
                    return;
                }
            };
            let version = state.next_own_version();
            state.config_version = Some(version.clone());
            state.config_dirty = false;
            (
                RemoteDocument {
                    version: Some(version.clone()),
                    body,
                },
                version,
            )
        };

        let result = self
            .inner
            .remote
            .write_document(&self.inner.settings.config_path, document)
            .await;

        match result {
            Ok(()) => info!(%version, "Pushed config"),
            Err(e) => {
                error!(error = %e, "Remote config write failed");
                let mut state = self.state();
                state.config_dirty = true;
                state.last_error = Some(e.to_string());
                self.publish_status(&state);
            }
        }
    }

    // ==================== Forced operations ====================

    fn ensure_remote_allowed(&self) -> Result<()> {
        let state = self.state();
        if !state.config.sync_enabled() {
            return Err(SyncError::SyncDisabled);
        }
        if !state.gate_open() {
            return Err(SyncError::NotAuthenticated);
        }
        Ok(())
    }

    /// Replace the remote collection with the local one, deleting remote
    /// records this session does not have.
    pub async fn force_push(&self) -> Result<()> {
        self.ensure_remote_allowed()?;
        let _guard = self.inner.push_lock.lock().await;
        let path = &self.inner.settings.residents_path;

        let remote = self
            .inner
            .remote
            .read_once(path)
            .await
            .map_err(SyncError::RemoteRead)?;
        let remote = CollectionBody::from_document(remote.as_ref()).map_err(SyncError::RemoteRead)?;

        let (writes, version) = {
            let mut state = self.state();
            let mut writes = Vec::with_capacity(state.residents.len());
            for resident in state.residents.iter() {
                writes.push(RecordWrite::Upsert {
                    id: resident.id.to_string(),
                    body: serde_json::to_value(resident)?,
                });
            }
            for id in remote.records.keys() {
                if !state.residents.contains(&ResidentId::from(id.as_str())) {
                    writes.push(RecordWrite::Delete { id: id.clone() });
                }
            }

            // Everything queued is covered by the full write
            state.push_queue.take_batch();
            let version = state.next_own_version();
            state.residents_version = Some(version.clone());
            state.pending_local_write = true;
            self.publish_status(&state);
            (writes, version)
        };

        let deleted = writes
            .iter()
            .filter(|w| matches!(w, RecordWrite::Delete { .. }))
            .count();
        let total = writes.len();
        let result = self
            .inner
            .remote
            .write_batched(path, writes, &version, self.inner.settings.max_batch_size)
            .await;

        let mut state = self.state();
        state.pending_local_write = false;
        let outcome = match result {
            Ok(()) => {
                state.push_queue.complete();
                info!(records = total - deleted, deleted, %version, "Force push replaced remote residents");
                Ok(())
            }
            Err(e) => {
                state.push_queue.requeue();
                state.last_error = Some(e.to_string());
                error!(error = %e, "Force push failed");
                Err(SyncError::RemoteConnection(e))
            }
        };
        self.publish_status(&state);
        outcome
    }

    /// Replace local residents with the remote collection.
    ///
    /// Refuses to replace a non-empty local collection with an empty remote
    /// one. Unpushed local changes are discarded.
    pub async fn force_pull(&self) -> Result<Arc<ResidentCollection>> {
        self.ensure_remote_allowed()?;
        let _guard = self.inner.push_lock.lock().await;

        let document = self
            .inner
            .remote
            .read_once(&self.inner.settings.residents_path)
            .await
            .map_err(SyncError::RemoteRead)?;
        let version = document.as_ref().and_then(|d| d.version.clone());
        let body = CollectionBody::from_document(document.as_ref()).map_err(SyncError::RemoteRead)?;

        let mut remote = ResidentCollection::new();
        for value in body.records.into_values() {
            let resident: Resident = serde_json::from_value(value)?;
            remote.upsert(resident);
        }

        let mut state = self.state();
        if remote.is_empty() && !state.residents.is_empty() {
            let local = state.residents.len();
            warn!(local, "Refusing to replace local residents with an empty remote collection");
            return Err(SyncError::RefusedEmptyPull { local });
        }

        let snapshot = if remote == *state.residents {
            Arc::clone(&state.residents)
        } else {
            self.persist_residents(&remote)?;
            self.publish_residents(&mut state, remote)
        };
        state.push_queue.clear();
        state.residents_version = version;
        state.hydrated = true;
        self.publish_status(&state);
        info!(residents = snapshot.len(), "Force pull replaced local residents");
        Ok(snapshot)
    }

    // ==================== Observation ====================

    pub fn residents(&self) -> Arc<ResidentCollection> {
        Arc::clone(&self.inner.residents_tx.borrow())
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.inner.config_tx.borrow())
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn watch_residents(&self) -> watch::Receiver<Arc<ResidentCollection>> {
        self.inner.residents_tx.subscribe()
    }

    pub fn watch_config(&self) -> watch::Receiver<Arc<AppConfig>> {
        self.inner.config_tx.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }
}

/// Outcome of merging a remote snapshot into local residents
struct Reconciled {
    /// New collection, `None` when nothing changed
    collection: Option<ResidentCollection>,
    upserted: usize,
    removed: usize,
    skipped_dirty: usize,
    /// Local ids the remote neither has nor tombstoned
    local_only: Vec<ResidentId>,
}

fn reconcile(local: &ResidentCollection, body: &CollectionBody, queue: &PushQueue) -> Reconciled {
    let mut next: Option<ResidentCollection> = None;
    let mut upserted = 0;
    let mut removed = 0;
    let mut skipped_dirty = 0;

    for (key, value) in &body.records {
        let id = ResidentId::from(key.as_str());
        if queue.is_dirty(&id) {
            skipped_dirty += 1;
            continue;
        }
        let record: Resident = match serde_json::from_value(value.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(id = %key, error = %e, "Skipping unreadable remote record");
                continue;
            }
        };
        if record.id != id {
            warn!(key = %key, id = %record.id, "Skipping remote record stored under another id");
            continue;
        }
        let differs = next.as_ref().unwrap_or(local).get(&id) != Some(&record);
        if differs {
            next.get_or_insert_with(|| local.clone()).upsert(record);
            upserted += 1;
        }
    }

    for key in &body.removed {
        let id = ResidentId::from(key.as_str());
        if queue.is_dirty(&id) {
            skipped_dirty += 1;
            continue;
        }
        if next.as_ref().unwrap_or(local).contains(&id) {
            next.get_or_insert_with(|| local.clone()).remove(&id);
            removed += 1;
        }
    }

    let local_only = local
        .ids()
        .filter(|id| {
            !body.records.contains_key(id.as_str()) && !body.removed.contains(id.as_str())
        })
        .cloned()
        .collect();

    Reconciled {
        collection: next,
        upserted,
        removed,
        skipped_dirty,
        local_only,
    }
}

fn record_writes(batch: &PendingPush, residents: &ResidentCollection) -> Vec<RecordWrite> {
    let mut writes = Vec::with_capacity(batch.len());
    for id in &batch.changed {
        match residents.get(id) {
            Some(resident) => match serde_json::to_value(resident) {
                Ok(body) => writes.push(RecordWrite::Upsert {
                    id: id.to_string(),
                    body,
                }),
                Err(e) => error!(id = %id, error = %e, "Could not encode resident"),
            },
            None => writes.push(RecordWrite::Delete { id: id.to_string() }),
        }
    }
    for id in &batch.removed {
        writes.push(RecordWrite::Delete { id: id.to_string() });
    }
    writes
}
