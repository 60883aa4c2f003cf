//! Match life cycle: lobby -> countdown -> active -> finished.
//!
//! Pure state machine driven by wall-clock deadlines (unix ms). Every
//! deadline is computed from the moment its phase was entered, so a late
//! poll never shifts the schedule.

use serde::Serialize;
use uuid::Uuid;

use crate::config::MatchSettings;
use crate::game::{ArenaKind, Participant};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Lobby,
    Countdown,
    Active,
    Finished,
}

impl MatchPhase {
    /// Late joins are allowed until the match finishes
    pub fn is_joinable(self) -> bool {
        !matches!(self, Self::Finished)
    }
}

/// Why a match finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Match duration elapsed
    TimeUp,
    /// Terminal condition reached (no one or one left in play)
    Decided,
    /// Scheduler shut down
    Stopped,
}

/// Admission errors, reported synchronously with no state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Lobby is full ({capacity} participants)")]
    LobbyFull { capacity: usize },

    #[error("Agent already joined this match")]
    AlreadyJoined,

    #[error("Match is not accepting participants")]
    NotJoinable,
}

impl AdmissionError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::LobbyFull { .. } => "lobby_full",
            Self::AlreadyJoined => "already_joined",
            Self::NotJoinable => "not_joinable",
        }
    }
}

/// Phase change produced by `admit`, `poll` or `finish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CountdownArmed { starts_at_ms: u64 },
    Started { started_at_ms: u64, ends_at_ms: u64 },
    Finished { reason: FinishReason },
}

/// Handle returned to an admitted agent
#[derive(Debug, Clone, Serialize)]
pub struct PlayerHandle {
    pub participant_id: Uuid,
    pub match_id: Uuid,
    pub phase: MatchPhase,
    /// Scheduled start, once the countdown is armed
    pub starts_at_ms: Option<u64>,
}

/// Public view of the life cycle
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatus {
    pub match_id: Uuid,
    pub arena: ArenaKind,
    pub phase: MatchPhase,
    pub created_at_ms: u64,
    pub starts_at_ms: Option<u64>,
    pub ends_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// When the next lobby opens (known once finished)
    pub next_lobby_at_ms: Option<u64>,
    pub participants: usize,
    pub min_participants: usize,
    pub capacity: usize,
    pub tick: u64,
}

/// Life cycle of one match
#[derive(Debug, Clone)]
pub struct Lifecycle {
    match_id: Uuid,
    arena: ArenaKind,
    phase: MatchPhase,
    created_at_ms: u64,
    starts_at_ms: Option<u64>,
    ends_at_ms: Option<u64>,
    finished_at_ms: Option<u64>,
    finish_reason: Option<FinishReason>,
    next_lobby_at_ms: Option<u64>,
    /// Admitted participants in join order (append-only)
    roster: Vec<Participant>,
    /// Roster entries already handed to the engine
    spawned: usize,

    min_participants: usize,
    capacity: usize,
    countdown_ms: u64,
    match_duration_ms: u64,
    results_window_ms: u64,
}

impl Lifecycle {
    /// Open a fresh lobby
    pub fn open(match_id: Uuid, settings: &MatchSettings, now_ms: u64) -> Self {
        Self {
            match_id,
            arena: settings.arena,
            phase: MatchPhase::Lobby,
            created_at_ms: now_ms,
            starts_at_ms: None,
            ends_at_ms: None,
            finished_at_ms: None,
            finish_reason: None,
            next_lobby_at_ms: None,
            roster: Vec::new(),
            spawned: 0,
            min_participants: settings.min_participants.max(1),
            capacity: settings.capacity,
            countdown_ms: settings.countdown_ms,
            match_duration_ms: settings.match_duration_ms,
            results_window_ms: settings.results_window_ms,
        }
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn participant_count(&self) -> usize {
        self.roster.len()
    }

    pub fn is_participant(&self, id: &Uuid) -> bool {
        self.roster.iter().any(|p| &p.id == id)
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.starts_at_ms.filter(|_| {
            matches!(self.phase, MatchPhase::Active | MatchPhase::Finished)
        })
    }

    /// Remaining match time, while active
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        match self.phase {
            MatchPhase::Active => self.ends_at_ms.map(|end| end.saturating_sub(now_ms)),
            _ => None,
        }
    }

    /// Admit a participant; the join that reaches the minimum arms the countdown
    pub fn admit(
        &mut self,
        participant: Participant,
        now_ms: u64,
    ) -> Result<(PlayerHandle, Option<Transition>), AdmissionError> {
        if !self.phase.is_joinable() {
            return Err(AdmissionError::NotJoinable);
        }
        if self.is_participant(&participant.id) {
            return Err(AdmissionError::AlreadyJoined);
        }
        if self.roster.len() >= self.capacity {
            return Err(AdmissionError::LobbyFull {
                capacity: self.capacity,
            });
        }

        let participant_id = participant.id;
        self.roster.push(participant);

        let mut transition = None;
        if self.phase == MatchPhase::Lobby && self.roster.len() >= self.min_participants {
            let starts_at_ms = now_ms + self.countdown_ms;
            self.phase = MatchPhase::Countdown;
            self.starts_at_ms = Some(starts_at_ms);
            transition = Some(Transition::CountdownArmed { starts_at_ms });
        }

        let handle = PlayerHandle {
            participant_id,
            match_id: self.match_id,
            phase: self.phase,
            starts_at_ms: self.starts_at_ms,
        };
        Ok((handle, transition))
    }

    /// Advance deadline-driven transitions
    pub fn poll(&mut self, now_ms: u64) -> Option<Transition> {
        match self.phase {
            MatchPhase::Countdown => {
                let starts_at_ms = self.starts_at_ms?;
                if now_ms < starts_at_ms {
                    return None;
                }
                let ends_at_ms = starts_at_ms + self.match_duration_ms;
                self.phase = MatchPhase::Active;
                self.ends_at_ms = Some(ends_at_ms);
                Some(Transition::Started {
                    started_at_ms: starts_at_ms,
                    ends_at_ms,
                })
            }
            MatchPhase::Active => {
                let ends_at_ms = self.ends_at_ms?;
                if now_ms < ends_at_ms {
                    return None;
                }
                self.finish(FinishReason::TimeUp, ends_at_ms)
            }
            MatchPhase::Lobby | MatchPhase::Finished => None,
        }
    }

    /// Finish the match now; `None` if it already finished
    pub fn finish(&mut self, reason: FinishReason, now_ms: u64) -> Option<Transition> {
        if self.phase == MatchPhase::Finished {
            return None;
        }
        self.phase = MatchPhase::Finished;
        self.finished_at_ms = Some(now_ms);
        self.finish_reason = Some(reason);
        self.next_lobby_at_ms = Some(now_ms + self.results_window_ms);
        Some(Transition::Finished { reason })
    }

    /// Results window elapsed, time for the next lobby
    pub fn lobby_due(&self, now_ms: u64) -> bool {
        self.phase == MatchPhase::Finished
            && self.next_lobby_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Participants admitted since the last call (only while active)
    pub fn take_unspawned(&mut self) -> Vec<Participant> {
        if self.phase != MatchPhase::Active {
            return Vec::new();
        }
        let fresh = self.roster[self.spawned..].to_vec();
        self.spawned = self.roster.len();
        fresh
    }

    pub fn status(&self, tick: u64) -> MatchStatus {
        MatchStatus {
            match_id: self.match_id,
            arena: self.arena,
            phase: self.phase,
            created_at_ms: self.created_at_ms,
            starts_at_ms: self.starts_at_ms,
            ends_at_ms: self.ends_at_ms,
            finished_at_ms: self.finished_at_ms,
            finish_reason: self.finish_reason,
            next_lobby_at_ms: self.next_lobby_at_ms,
            participants: self.roster.len(),
            min_participants: self.min_participants,
            capacity: self.capacity,
            tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(min: usize, capacity: usize) -> MatchSettings {
        MatchSettings {
            min_participants: min,
            capacity,
            countdown_ms: 10_000,
            match_duration_ms: 60_000,
            results_window_ms: 5_000,
            ..MatchSettings::for_arena(ArenaKind::Combat)
        }
    }

    fn agent(n: u128) -> Participant {
        Participant {
            id: Uuid::from_u128(n),
            display_name: format!("agent-{n}"),
            cosmetic: None,
        }
    }

    #[test]
    fn test_countdown_arms_on_second_join_and_starts_on_deadline() {
        let mut lc = Lifecycle::open(Uuid::new_v4(), &settings(2, 8), 0);

        let (handle, transition) = lc.admit(agent(1), 1_000).unwrap();
        assert_eq!(handle.phase, MatchPhase::Lobby);
        assert_eq!(transition, None);
        assert_eq!(lc.poll(50_000), None);
        assert_eq!(lc.phase(), MatchPhase::Lobby);

        let (handle, transition) = lc.admit(agent(2), 60_000).unwrap();
        assert_eq!(transition, Some(Transition::CountdownArmed { starts_at_ms: 70_000 }));
        assert_eq!(handle.starts_at_ms, Some(70_000));

        assert_eq!(lc.poll(69_999), None);
        assert_eq!(lc.phase(), MatchPhase::Countdown);

        // A late poll still reports the scheduled deadline
        assert_eq!(
            lc.poll(70_040),
            Some(Transition::Started {
                started_at_ms: 70_000,
                ends_at_ms: 130_000
            })
        );
        assert_eq!(lc.phase(), MatchPhase::Active);
        assert_eq!(lc.remaining_ms(100_000), Some(30_000));
    }

    #[test]
    fn test_capacity_overflow_has_no_side_effects() {
        let mut lc = Lifecycle::open(Uuid::new_v4(), &settings(2, 2), 0);
        lc.admit(agent(1), 0).unwrap();
        lc.admit(agent(2), 0).unwrap();
        let before = lc.status(0);

        assert_eq!(
            lc.admit(agent(3), 10).unwrap_err(),
            AdmissionError::LobbyFull { capacity: 2 }
        );
        let after = lc.status(0);
        assert_eq!(after.participants, before.participants);
        assert_eq!(after.starts_at_ms, before.starts_at_ms);
        assert!(!lc.is_participant(&Uuid::from_u128(3)));
    }

    #[test]
    fn test_duplicate_join_is_rejected() {
        let mut lc = Lifecycle::open(Uuid::new_v4(), &settings(2, 8), 0);
        lc.admit(agent(1), 0).unwrap();
        let err = lc.admit(agent(1), 5).unwrap_err();
        assert_eq!(err, AdmissionError::AlreadyJoined);
        assert_eq!(err.code(), "already_joined");
        assert_eq!(lc.participant_count(), 1);
    }

    #[test]
    fn test_late_join_while_active_but_not_after_finish() {
        let mut lc = Lifecycle::open(Uuid::new_v4(), &settings(1, 8), 0);
        lc.admit(agent(1), 0).unwrap();
        lc.poll(10_000);
        assert_eq!(lc.take_unspawned().len(), 1);

        let (handle, transition) = lc.admit(agent(2), 11_000).unwrap();
        assert_eq!(handle.phase, MatchPhase::Active);
        assert_eq!(transition, None);
        let fresh = lc.take_unspawned();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, Uuid::from_u128(2));
        assert!(lc.take_unspawned().is_empty());

        lc.finish(FinishReason::Decided, 12_000);
        assert_eq!(lc.admit(agent(3), 12_001).unwrap_err(), AdmissionError::NotJoinable);
    }

    #[test]
    fn test_time_up_and_results_window() {
        let mut lc = Lifecycle::open(Uuid::new_v4(), &settings(1, 8), 0);
        lc.admit(agent(1), 0).unwrap();
        lc.poll(10_000);

        assert_eq!(lc.poll(69_999), None);
        assert_eq!(
            lc.poll(70_500),
            Some(Transition::Finished {
                reason: FinishReason::TimeUp
            })
        );
        let status = lc.status(1_200);
        assert_eq!(status.finished_at_ms, Some(70_000));
        assert_eq!(status.next_lobby_at_ms, Some(75_000));

        assert!(!lc.lobby_due(74_999));
        assert!(lc.lobby_due(75_000));
        assert_eq!(lc.finish(FinishReason::Stopped, 76_000), None);
    }
}
