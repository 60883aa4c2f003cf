//! Spectator broadcast

pub mod fanout;

pub use fanout::{Fanout, Subscription};
