//! Application state shared across routes

use std::sync::Arc;

use crate::broadcast::Fanout;
use crate::config::Config;
use crate::gateway::ActionGateway;
use crate::scheduler::{Collaborators, LifecycleObserver, Scheduler};
use crate::store::{cosmetic_resolver, CosmeticResolver};
use crate::util::rate_limit::{create_agent_limiter, AgentLimiter, JOIN_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<Scheduler>,
    pub gateway: Arc<ActionGateway>,
    pub fanout: Arc<Fanout>,
    pub cosmetics: Arc<dyn CosmeticResolver>,
    pub join_limiter: Arc<AgentLimiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let settings = config.match_settings.clone();

        let fanout = Arc::new(Fanout::new(&settings));
        let gateway = Arc::new(ActionGateway::new(&settings));

        let observers = vec![fanout.clone() as Arc<dyn LifecycleObserver>];
        let scheduler = Arc::new(Scheduler::new(
            settings,
            observers,
            Collaborators::from_config(&config),
        ));

        Self {
            cosmetics: cosmetic_resolver(&config),
            join_limiter: create_agent_limiter(JOIN_RATE_LIMIT),
            config,
            scheduler,
            gateway,
            fanout,
        }
    }
}
