//! Match scheduler - owns the current match and drives its engine

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, MatchSettings};
use crate::game::{ArenaRules, Engine, IntentSlots, Participant, Snapshot};
use crate::store::{
    result_sink, settlement_notifier, MatchResult, ResultSink, SettlementNotice, SettlementNotifier,
};
use crate::util::time::{tick_interval, unix_millis, Timer};

use super::lifecycle::{
    AdmissionError, FinishReason, Lifecycle, MatchPhase, MatchStatus, PlayerHandle, Transition,
};

/// Receives life-cycle callbacks. Called from the driver task (or the
/// admitting request), so implementations must not block.
pub trait LifecycleObserver: Send + Sync {
    fn on_lobby_open(&self, _status: &MatchStatus) {}
    fn on_status_changed(&self, _status: &MatchStatus) {}
    /// Every tick's snapshot; `terminal` marks the final one of a match
    fn on_state_update(&self, _snapshot: &Arc<Snapshot>, _terminal: bool) {}
    fn on_match_end(&self, _result: &MatchResult) {}
}

/// Background collaborators handed every finished match
#[derive(Clone)]
pub struct Collaborators {
    pub results: Arc<dyn ResultSink>,
    pub settlement: Arc<dyn SettlementNotifier>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Self {
        Self {
            results: result_sink(config),
            settlement: settlement_notifier(config),
        }
    }
}

/// What an agent supplies when joining
#[derive(Debug, Clone)]
pub struct JoinProfile {
    pub display_name: String,
    pub cosmetic: Option<serde_json::Value>,
}

/// One match: life cycle, pending intents and the latest published snapshot
pub struct MatchSlot {
    id: Uuid,
    lifecycle: Mutex<Lifecycle>,
    intents: Arc<IntentSlots>,
    latest: RwLock<Arc<Snapshot>>,
}

impl MatchSlot {
    fn open(settings: &MatchSettings, now_ms: u64) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            lifecycle: Mutex::new(Lifecycle::open(id, settings, now_ms)),
            intents: Arc::new(IntentSlots::new()),
            latest: RwLock::new(Arc::new(Snapshot::empty(id, settings.arena, now_ms))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.lifecycle.lock().phase()
    }

    pub fn is_participant(&self, id: &Uuid) -> bool {
        self.lifecycle.lock().is_participant(id)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.lifecycle.lock().remaining_ms(now_ms)
    }

    pub fn intents(&self) -> &Arc<IntentSlots> {
        &self.intents
    }

    /// Latest end-of-tick snapshot (readers never touch the engine)
    pub fn latest(&self) -> Arc<Snapshot> {
        self.latest.read().clone()
    }

    pub fn status(&self) -> MatchStatus {
        let tick = self.latest.read().tick;
        self.lifecycle.lock().status(tick)
    }

    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.latest.write() = snapshot.clone();
        snapshot
    }
}

struct Shared {
    settings: MatchSettings,
    rules: ArenaRules,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    collaborators: Collaborators,
    current: RwLock<Arc<MatchSlot>>,
    last_result: RwLock<Option<Arc<MatchResult>>>,
}

impl Shared {
    fn current(&self) -> Arc<MatchSlot> {
        self.current.read().clone()
    }

    fn open_lobby(&self, now_ms: u64) -> Arc<MatchSlot> {
        let slot = Arc::new(MatchSlot::open(&self.settings, now_ms));
        *self.current.write() = slot.clone();

        let status = slot.status();
        info!(match_id = %slot.id, arena = ?self.settings.arena, "Lobby open");
        for observer in &self.observers {
            observer.on_lobby_open(&status);
        }
        slot
    }

    fn notify_status(&self, slot: &MatchSlot) {
        let status = slot.status();
        for observer in &self.observers {
            observer.on_status_changed(&status);
        }
    }
}

/// Runs matches back to back: lobby, countdown, active, results, next lobby
pub struct Scheduler {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        settings: MatchSettings,
        observers: Vec<Arc<dyn LifecycleObserver>>,
        collaborators: Collaborators,
    ) -> Self {
        let rules = ArenaRules::configured(settings.arena, settings.boundary);
        let first = Arc::new(MatchSlot::open(&settings, unix_millis()));
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                settings,
                rules,
                observers,
                collaborators,
                current: RwLock::new(first),
                last_result: RwLock::new(None),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Spawn the driver task
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Scheduler already started");
            return;
        }

        let slot = self.shared.current();
        let status = slot.status();
        for observer in &self.shared.observers {
            observer.on_lobby_open(&status);
        }

        let driver = Driver {
            shared: self.shared.clone(),
            engine: None,
        };
        *task = Some(tokio::spawn(driver.run(self.shutdown.subscribe())));
    }

    /// Force-finish the current match and wait for the driver to exit
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task failed");
            }
        }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.shared.settings
    }

    pub fn current(&self) -> Arc<MatchSlot> {
        self.shared.current()
    }

    pub fn status(&self) -> MatchStatus {
        self.shared.current().status()
    }

    /// Result of the most recently finished match
    pub fn last_result(&self) -> Option<Arc<MatchResult>> {
        self.shared.last_result.read().clone()
    }

    /// Admit an agent to the current match
    pub fn admit(&self, agent_id: Uuid, profile: JoinProfile) -> Result<PlayerHandle, AdmissionError> {
        let now = unix_millis();
        let slot = self.shared.current();
        let participant = Participant {
            id: agent_id,
            display_name: profile.display_name,
            cosmetic: profile.cosmetic,
        };

        let (handle, transition) = slot.lifecycle.lock().admit(participant, now)?;
        info!(
            match_id = %slot.id,
            agent_id = %agent_id,
            phase = ?handle.phase,
            "Agent admitted"
        );

        if let Some(Transition::CountdownArmed { starts_at_ms }) = transition {
            info!(match_id = %slot.id, starts_at_ms, "Countdown armed");
            self.shared.notify_status(&slot);
        }

        Ok(handle)
    }
}

/// Owns the engine; the only place entity state is mutated
struct Driver {
    shared: Arc<Shared>,
    engine: Option<Engine>,
}

impl Driver {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = tick_interval(self.shared.settings.tick_rate);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_rate = self.shared.settings.tick_rate, "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                // Only ever flipped to true; a dropped sender also stops the driver
                _ = shutdown.changed() => break,
            }

            self.step(period, unix_millis());
        }

        let now = unix_millis();
        let slot = self.shared.current();
        let finished = slot.lifecycle.lock().finish(FinishReason::Stopped, now);
        if finished.is_some() {
            self.conclude(&slot, FinishReason::Stopped, now, None);
        }

        info!("Scheduler stopped");
    }

    fn step(&mut self, period: Duration, now_ms: u64) {
        let slot = self.shared.current();

        let transition = slot.lifecycle.lock().poll(now_ms);
        match transition {
            Some(Transition::Started {
                started_at_ms,
                ends_at_ms,
            }) => self.begin(&slot, started_at_ms, ends_at_ms),
            Some(Transition::Finished { reason }) => self.conclude(&slot, reason, now_ms, None),
            _ => {}
        }

        if slot.phase() == MatchPhase::Active {
            self.advance(&slot, period, now_ms);
        }

        if slot.lifecycle.lock().lobby_due(now_ms) {
            self.shared.open_lobby(now_ms);
        }
    }

    fn begin(&mut self, slot: &MatchSlot, started_at_ms: u64, ends_at_ms: u64) {
        let seed = self.shared.settings.seed.unwrap_or_else(rand::random);
        self.engine = Some(Engine::new(
            slot.id,
            self.shared.rules.clone(),
            seed,
            self.shared.settings.max_idle_ms,
            slot.intents.clone(),
        ));

        info!(
            match_id = %slot.id,
            started_at_ms,
            ends_at_ms,
            participants = slot.lifecycle.lock().participant_count(),
            "Match started"
        );
        self.shared.notify_status(slot);
    }

    fn advance(&mut self, slot: &MatchSlot, period: Duration, now_ms: u64) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let fresh = slot.lifecycle.lock().take_unspawned();
        for participant in fresh {
            let id = participant.id;
            if let Err(e) = engine.spawn(participant, now_ms) {
                warn!(match_id = %slot.id, agent_id = %id, error = %e, "Spawn skipped");
            }
        }

        let timer = Timer::new();
        let snapshot = engine.tick(period, now_ms);
        let elapsed_us = timer.elapsed_micros();
        if elapsed_us > period.as_micros() as u64 {
            warn!(match_id = %slot.id, tick = snapshot.tick, elapsed_us, "Tick overran its period");
        }

        let terminal = engine.is_terminal();
        let snapshot = slot.publish(snapshot);

        if !terminal {
            for observer in &self.shared.observers {
                observer.on_state_update(&snapshot, false);
            }
            return;
        }

        let finished = slot.lifecycle.lock().finish(FinishReason::Decided, now_ms);
        if finished.is_some() {
            self.conclude(slot, FinishReason::Decided, now_ms, Some(snapshot));
        }
    }

    /// Flush the final snapshot, emit match end and hand results off
    fn conclude(
        &mut self,
        slot: &MatchSlot,
        reason: FinishReason,
        now_ms: u64,
        flushed: Option<Arc<Snapshot>>,
    ) {
        let engine = self.engine.take();
        let snapshot = match (flushed, engine) {
            (Some(snapshot), _) => snapshot,
            (None, Some(mut engine)) => slot.publish(engine.snapshot(now_ms)),
            (None, None) => slot.latest(),
        };

        for observer in &self.shared.observers {
            observer.on_state_update(&snapshot, true);
        }

        let (status, started_at_ms) = {
            let lifecycle = slot.lifecycle.lock();
            (lifecycle.status(snapshot.tick), lifecycle.started_at_ms())
        };

        let result = Arc::new(MatchResult::new(
            slot.id,
            self.shared.settings.arena,
            started_at_ms,
            status.finished_at_ms.unwrap_or(now_ms),
            reason,
            snapshot.tick,
            snapshot.leaderboard.clone(),
        ));

        info!(
            match_id = %slot.id,
            reason = ?reason,
            ticks = snapshot.tick,
            participants = result.standings.len(),
            "Match finished"
        );

        for observer in &self.shared.observers {
            observer.on_status_changed(&status);
            observer.on_match_end(&result);
        }
        *self.shared.last_result.write() = Some(result.clone());

        if started_at_ms.is_some() {
            self.dispatch(result);
        }
    }

    /// Persistence and settlement run detached; failures are only logged
    fn dispatch(&self, result: Arc<MatchResult>) {
        let sink = self.shared.collaborators.results.clone();
        let persisted = result.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(&persisted).await {
                warn!(match_id = %persisted.match_id, error = %e, "Failed to persist match result");
            }
        });

        let settlement = self.shared.collaborators.settlement.clone();
        let notice = SettlementNotice {
            match_id: result.match_id,
            winners: result.winners.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = settlement.notify(&notice).await {
                warn!(match_id = %notice.match_id, error = %e, "Failed to notify settlement");
            }
        });
    }
}
