//! External collaborators: result persistence, settlement, cosmetics

pub mod client;
pub mod cosmetics;
pub mod results;
pub mod settlement;

pub use client::{RestClient, RestError};
pub use cosmetics::{cosmetic_resolver, CosmeticResolver};
pub use results::{result_sink, MatchResult, ResultSink, SinkError};
pub use settlement::{settlement_notifier, SettlementNotice, SettlementNotifier};
