//! Action gateway: validates agent commands and hands them to the intent slots

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::config::MatchSettings;
use crate::game::{ActionKind, ArenaKind, HeadingChange, Intent, Snapshot};
use crate::scheduler::{MatchPhase, MatchSlot};
use crate::util::rate_limit::{ActionLimiter, LimitDecision};
use crate::ws::protocol::AgentCommand;

/// The parts of a running match the gateway reads (and the one slot it writes)
pub trait MatchView {
    fn phase(&self) -> MatchPhase;
    fn arena(&self) -> ArenaKind;
    fn is_participant(&self, id: &Uuid) -> bool;
    fn latest(&self) -> Arc<Snapshot>;
    /// Store the intent; true when a pending one was replaced
    fn put_intent(&self, entity_id: Uuid, intent: Intent) -> bool;
}

impl MatchView for MatchSlot {
    fn phase(&self) -> MatchPhase {
        MatchSlot::phase(self)
    }

    fn arena(&self) -> ArenaKind {
        MatchSlot::latest(self).arena
    }

    fn is_participant(&self, id: &Uuid) -> bool {
        MatchSlot::is_participant(self, id)
    }

    fn latest(&self) -> Arc<Snapshot> {
        MatchSlot::latest(self)
    }

    fn put_intent(&self, entity_id: Uuid, intent: Intent) -> bool {
        self.intents().put(entity_id, intent)
    }
}

/// Why a command never reached the intent slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("Entity is not owned by this agent")]
    NotOwner,

    #[error("Agent has not joined the current match")]
    NotJoined,

    #[error("Entity is dead")]
    NotAlive,

    #[error("Match is not running")]
    MatchNotRunning,

    #[error("Command is not available in this arena")]
    WrongArena,

    #[error("Malformed command")]
    InvalidShape,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotOwner => "not_owner",
            Self::NotJoined => "not_joined",
            Self::NotAlive => "not_alive",
            Self::MatchNotRunning => "match_not_running",
            Self::WrongArena => "wrong_arena",
            Self::InvalidShape => "invalid_command",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted {
        /// An earlier intent from the same tick window was overwritten
        replaced: bool,
    },
    RateLimited {
        retry_after: Duration,
    },
    Rejected(RejectReason),
}

/// Front door for agent commands
pub struct ActionGateway {
    limiter: ActionLimiter,
}

impl ActionGateway {
    pub fn new(settings: &MatchSettings) -> Self {
        Self {
            limiter: ActionLimiter::new(
                settings.max_actions,
                Duration::from_millis(settings.action_window_ms),
            ),
        }
    }

    /// Validate `command` from `agent_id` for `entity_id` and store it.
    ///
    /// Checks run in order: shape, ownership, liveness, rate limit. Only an
    /// accepted command is counted against the rate limit.
    pub fn submit(
        &self,
        view: &impl MatchView,
        agent_id: Uuid,
        entity_id: Uuid,
        command: &AgentCommand,
        now: Instant,
        now_ms: u64,
    ) -> SubmitOutcome {
        let intent = match to_intent(command, view.arena(), now_ms) {
            Ok(intent) => intent,
            Err(reason) => return SubmitOutcome::Rejected(reason),
        };

        if agent_id != entity_id {
            return SubmitOutcome::Rejected(RejectReason::NotOwner);
        }

        if let Err(reason) = check_live(view, &entity_id) {
            return SubmitOutcome::Rejected(reason);
        }

        if let LimitDecision::Limited { retry_after } = self.limiter.check(entity_id, now) {
            debug!(entity_id = %entity_id, ?retry_after, "Action rate limited");
            return SubmitOutcome::RateLimited { retry_after };
        }

        let replaced = view.put_intent(entity_id, intent);
        SubmitOutcome::Accepted { replaced }
    }

    /// Drop rate buckets whose window has passed
    pub fn prune(&self, now: Instant) {
        self.limiter.prune(now);
    }
}

fn check_live(view: &impl MatchView, entity_id: &Uuid) -> Result<(), RejectReason> {
    let phase = view.phase();
    if phase == MatchPhase::Finished {
        return Err(RejectReason::MatchNotRunning);
    }

    if !view.is_participant(entity_id) {
        return Err(RejectReason::NotJoined);
    }

    // Participants admitted late are spawned on the next tick
    if phase == MatchPhase::Active {
        if let Some(entity) = view.latest().entity(entity_id) {
            if !entity.alive {
                return Err(RejectReason::NotAlive);
            }
        }
    }

    Ok(())
}

fn finite(value: Option<f32>) -> Result<Option<f32>, RejectReason> {
    match value {
        Some(v) if !v.is_finite() => Err(RejectReason::InvalidShape),
        other => Ok(other),
    }
}

/// At most one of `angle` / `turn`
fn heading(angle: Option<f32>, turn: Option<f32>) -> Result<Option<HeadingChange>, RejectReason> {
    match (finite(angle)?, finite(turn)?) {
        (Some(a), None) => Ok(Some(HeadingChange::Absolute(a))),
        (None, Some(t)) => Ok(Some(HeadingChange::Delta(t))),
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(RejectReason::InvalidShape),
    }
}

/// Decode a wire command into an engine intent
pub fn to_intent(
    command: &AgentCommand,
    arena: ArenaKind,
    now_ms: u64,
) -> Result<Intent, RejectReason> {
    if command.arena() != arena {
        return Err(RejectReason::WrongArena);
    }

    let mut intent = Intent {
        issued_at_ms: now_ms,
        ..Intent::default()
    };

    match *command {
        AgentCommand::Steer { angle, turn, boost } => {
            intent.heading = heading(angle, turn)?;
            if intent.heading.is_none() && boost.is_none() {
                return Err(RejectReason::InvalidShape);
            }
            intent.boost = boost;
        }
        AgentCommand::Move { angle, turn, moving } => {
            intent.heading = heading(angle, turn)?;
            if intent.heading.is_none() && moving.is_none() {
                return Err(RejectReason::InvalidShape);
            }
            intent.moving = Some(moving.unwrap_or(true));
        }
        AgentCommand::Shoot { angle } => {
            intent.action = Some(ActionKind::Fire);
            intent.aim = finite(angle)?;
        }
        AgentCommand::Melee { angle } => {
            intent.action = Some(ActionKind::Melee);
            intent.aim = finite(angle)?;
        }
        AgentCommand::Pickup => intent.action = Some(ActionKind::Pickup),
        AgentCommand::Stop => intent.moving = Some(false),
    }

    Ok(intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{IntentSlots, Participant};
    use crate::game::{ArenaRules, Engine};
    use parking_lot::Mutex;

    struct FakeMatch {
        phase: MatchPhase,
        arena: ArenaKind,
        roster: Vec<Uuid>,
        snapshot: Mutex<Arc<Snapshot>>,
        intents: IntentSlots,
    }

    impl FakeMatch {
        fn new(arena: ArenaKind, phase: MatchPhase, roster: Vec<Uuid>) -> Self {
            Self {
                phase,
                arena,
                roster,
                snapshot: Mutex::new(Arc::new(Snapshot::empty(Uuid::nil(), arena, 0))),
                intents: IntentSlots::new(),
            }
        }
    }

    impl MatchView for FakeMatch {
        fn phase(&self) -> MatchPhase {
            self.phase
        }

        fn arena(&self) -> ArenaKind {
            self.arena
        }

        fn is_participant(&self, id: &Uuid) -> bool {
            self.roster.contains(id)
        }

        fn latest(&self) -> Arc<Snapshot> {
            self.snapshot.lock().clone()
        }

        fn put_intent(&self, entity_id: Uuid, intent: Intent) -> bool {
            self.intents.put(entity_id, intent)
        }
    }

    fn settings(max_actions: u32) -> MatchSettings {
        let mut settings = MatchSettings::for_arena(ArenaKind::Growth);
        settings.max_actions = max_actions;
        settings.action_window_ms = 1_000;
        settings
    }

    fn steer(turn: f32) -> AgentCommand {
        AgentCommand::Steer {
            angle: None,
            turn: Some(turn),
            boost: None,
        }
    }

    #[test]
    fn test_accepts_and_replaces_pending_intent() {
        let agent = Uuid::new_v4();
        let view = FakeMatch::new(ArenaKind::Growth, MatchPhase::Active, vec![agent]);
        let gateway = ActionGateway::new(&settings(10));
        let now = Instant::now();

        let first = gateway.submit(&view, agent, agent, &steer(0.1), now, 0);
        let second = gateway.submit(&view, agent, agent, &steer(0.2), now, 1);

        assert_eq!(first, SubmitOutcome::Accepted { replaced: false });
        assert_eq!(second, SubmitOutcome::Accepted { replaced: true });
        assert_eq!(view.intents.pending(), 1);
        assert_eq!(
            view.intents.take(&agent).and_then(|i| i.heading),
            Some(HeadingChange::Delta(0.2))
        );
    }

    #[test]
    fn test_rate_limit_counts_accepted_only() {
        let agent = Uuid::new_v4();
        let view = FakeMatch::new(ArenaKind::Growth, MatchPhase::Active, vec![agent]);
        let gateway = ActionGateway::new(&settings(2));
        let now = Instant::now();

        // Malformed submissions do not use up the budget
        let malformed = AgentCommand::Steer {
            angle: Some(1.0),
            turn: Some(1.0),
            boost: None,
        };
        for _ in 0..5 {
            assert_eq!(
                gateway.submit(&view, agent, agent, &malformed, now, 0),
                SubmitOutcome::Rejected(RejectReason::InvalidShape)
            );
        }

        assert!(matches!(
            gateway.submit(&view, agent, agent, &steer(0.1), now, 0),
            SubmitOutcome::Accepted { .. }
        ));
        assert!(matches!(
            gateway.submit(&view, agent, agent, &steer(0.1), now, 0),
            SubmitOutcome::Accepted { .. }
        ));

        view.intents.take(&agent);
        match gateway.submit(&view, agent, agent, &steer(0.3), now + Duration::from_millis(250), 0) {
            SubmitOutcome::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(750));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        // Limited submissions never touch the slot
        assert_eq!(view.intents.pending(), 0);
    }

    #[test]
    fn test_rejections() {
        let agent = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let gateway = ActionGateway::new(&settings(10));
        let now = Instant::now();

        let view = FakeMatch::new(ArenaKind::Growth, MatchPhase::Lobby, vec![agent]);
        assert_eq!(
            gateway.submit(&view, agent, stranger, &steer(0.1), now, 0),
            SubmitOutcome::Rejected(RejectReason::NotOwner)
        );
        assert_eq!(
            gateway.submit(&view, stranger, stranger, &steer(0.1), now, 0),
            SubmitOutcome::Rejected(RejectReason::NotJoined)
        );
        assert_eq!(
            gateway.submit(&view, agent, agent, &AgentCommand::Pickup, now, 0),
            SubmitOutcome::Rejected(RejectReason::WrongArena)
        );
        assert_eq!(
            gateway.submit(&view, agent, agent, &steer(f32::NAN), now, 0),
            SubmitOutcome::Rejected(RejectReason::InvalidShape)
        );
        // Lobby intents are held until the match starts
        assert!(matches!(
            gateway.submit(&view, agent, agent, &steer(0.1), now, 0),
            SubmitOutcome::Accepted { .. }
        ));

        let finished = FakeMatch::new(ArenaKind::Growth, MatchPhase::Finished, vec![agent]);
        assert_eq!(
            gateway.submit(&finished, agent, agent, &steer(0.1), now, 0),
            SubmitOutcome::Rejected(RejectReason::MatchNotRunning)
        );
    }

    #[test]
    fn test_dead_entity_is_rejected() {
        let agent = Uuid::new_v4();
        let intents = Arc::new(IntentSlots::new());
        let mut engine = Engine::new(
            Uuid::new_v4(),
            ArenaRules::for_kind(ArenaKind::Growth),
            9,
            60_000,
            intents,
        );
        engine
            .spawn(
                Participant {
                    id: agent,
                    display_name: "doomed".to_string(),
                    cosmetic: None,
                },
                0,
            )
            .unwrap();
        engine
            .world_mut()
            .record_death(agent, None, crate::game::DeathCause::Boundary, 0, 0);

        let view = FakeMatch::new(ArenaKind::Growth, MatchPhase::Active, vec![agent]);
        *view.snapshot.lock() = Arc::new(engine.snapshot(0));

        let gateway = ActionGateway::new(&settings(10));
        assert_eq!(
            gateway.submit(&view, agent, agent, &steer(0.1), Instant::now(), 0),
            SubmitOutcome::Rejected(RejectReason::NotAlive)
        );
        assert_eq!(view.intents.pending(), 0);
    }

    #[test]
    fn test_toggle_without_heading_keeps_course() {
        let boost = AgentCommand::Steer {
            angle: None,
            turn: None,
            boost: Some(true),
        };
        let intent = to_intent(&boost, ArenaKind::Growth, 0).unwrap();
        assert_eq!(intent.heading, None);
        assert_eq!(intent.boost, Some(true));

        let halt = AgentCommand::Move {
            angle: None,
            turn: None,
            moving: Some(false),
        };
        let intent = to_intent(&halt, ArenaKind::Combat, 0).unwrap();
        assert_eq!(intent.heading, None);
        assert_eq!(intent.moving, Some(false));

        let empty = AgentCommand::Steer {
            angle: None,
            turn: None,
            boost: None,
        };
        assert_eq!(
            to_intent(&empty, ArenaKind::Growth, 0),
            Err(RejectReason::InvalidShape)
        );
    }

    #[test]
    fn test_combat_commands_decode() {
        let shoot = to_intent(&AgentCommand::Shoot { angle: Some(1.5) }, ArenaKind::Combat, 5).unwrap();
        assert_eq!(shoot.action, Some(ActionKind::Fire));
        assert_eq!(shoot.aim, Some(1.5));
        assert_eq!(shoot.issued_at_ms, 5);

        let walk = AgentCommand::Move {
            angle: Some(0.0),
            turn: None,
            moving: None,
        };
        assert_eq!(to_intent(&walk, ArenaKind::Combat, 0).unwrap().moving, Some(true));
        assert_eq!(
            to_intent(&AgentCommand::Stop, ArenaKind::Combat, 0).unwrap().moving,
            Some(false)
        );
        assert_eq!(
            to_intent(&steer(0.1), ArenaKind::Combat, 0),
            Err(RejectReason::WrongArena)
        );
    }
}
