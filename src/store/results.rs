//! Match results and the persistence sink they are handed to

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::game::{ArenaKind, Standing};
use crate::scheduler::FinishReason;

use super::client::{RestClient, RestError};

/// How many top placements count as winners
pub const WINNER_COUNT: usize = 3;

/// Final outcome of a match
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub match_id: Uuid,
    pub arena: ArenaKind,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub finish_reason: FinishReason,
    pub ticks: u64,
    pub standings: Vec<Standing>,
    /// Top placements in order
    pub winners: Vec<Uuid>,
}

impl MatchResult {
    pub fn new(
        match_id: Uuid,
        arena: ArenaKind,
        started_at_ms: Option<u64>,
        ended_at_ms: u64,
        finish_reason: FinishReason,
        ticks: u64,
        standings: Vec<Standing>,
    ) -> Self {
        let winners = standings.iter().take(WINNER_COUNT).map(|s| s.id).collect();
        Self {
            match_id,
            arena,
            started_at: started_at_ms.map(to_datetime),
            ended_at: to_datetime(ended_at_ms),
            finish_reason,
            ticks,
            standings,
            winners,
        }
    }
}

fn to_datetime(unix_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(unix_ms as i64).unwrap_or_else(Utc::now)
}

/// Errors from background collaborators
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Collaborator request failed: {0}")]
    Rest(#[from] RestError),

    #[error("Failed to sign payload")]
    Signature,
}

/// Destination for finished match results
pub trait ResultSink: Send + Sync {
    fn record<'a>(&'a self, result: &'a MatchResult) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// POSTs results to a REST endpoint
pub struct RestResultSink {
    client: RestClient,
}

impl RestResultSink {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl ResultSink for RestResultSink {
    fn record<'a>(&'a self, result: &'a MatchResult) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.client.post_json("matches", result).await?;
            info!(match_id = %result.match_id, "Match result persisted");
            Ok(())
        })
    }
}

/// Logs results when no endpoint is configured
pub struct LogResultSink;

impl ResultSink for LogResultSink {
    fn record<'a>(&'a self, result: &'a MatchResult) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            info!(
                match_id = %result.match_id,
                reason = ?result.finish_reason,
                ticks = result.ticks,
                participants = result.standings.len(),
                winners = ?result.winners,
                "Match result (no results endpoint configured)"
            );
            Ok(())
        })
    }
}

/// Pick the sink for the configured environment
pub fn result_sink(config: &Config) -> Arc<dyn ResultSink> {
    match &config.results_url {
        Some(url) => Arc::new(RestResultSink::new(RestClient::new(
            url,
            config.results_api_key.clone(),
        ))),
        None => Arc::new(LogResultSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::DeathCause;

    fn standing(placement: u32) -> Standing {
        Standing {
            placement,
            id: Uuid::from_u128(placement as u128),
            name: format!("agent-{placement}"),
            score: 100 - placement,
            kills: 0,
            alive: placement == 1,
            alive_time_ms: 1_000,
            death_cause: (placement != 1).then_some(DeathCause::Collision),
        }
    }

    #[test]
    fn test_winners_are_top_placements() {
        let standings = (1..=5).map(standing).collect();
        let result = MatchResult::new(
            Uuid::new_v4(),
            ArenaKind::Growth,
            Some(1_700_000_000_000),
            1_700_000_060_000,
            FinishReason::TimeUp,
            1_200,
            standings,
        );

        assert_eq!(
            result.winners,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
        assert_eq!(result.ended_at.timestamp_millis(), 1_700_000_060_000);
    }

    #[test]
    fn test_log_sink_accepts_results() {
        let result = MatchResult::new(
            Uuid::new_v4(),
            ArenaKind::Combat,
            None,
            0,
            FinishReason::Stopped,
            0,
            Vec::new(),
        );
        tokio_test::assert_ok!(tokio_test::block_on(LogResultSink.record(&result)));
        assert!(result.winners.is_empty());
    }
}
