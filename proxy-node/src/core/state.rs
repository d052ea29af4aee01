//! Process-wide shared state: configuration, metrics, and the
//! internally-synchronized singletons (Conversation Manager, Multi-Turn
//! Handler, Model Router, Circuit Breaker) plus one upstream client per
//! configured backend.

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::clients::UpstreamClient;
use crate::config::Config;
use crate::core::conversation::{ConversationManager, ManagerConfig, MultiTurnConfig, MultiTurnHandler};
use crate::core::metrics::Metrics;
use crate::core::router::ModelRouter;
use proxy_types::domain::dialect::Provider;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;

pub struct AppState {
    pub config: Config,
    pub start_time: SystemTime,
    pub metrics: Arc<Metrics>,
    pub router: ModelRouter,
    pub conversation_manager: Arc<ConversationManager>,
    pub multi_turn: MultiTurnHandler,
    pub breaker: Arc<CircuitBreaker>,
    pub primary_client: Arc<UpstreamClient>,
    pub secondary_client: Option<Arc<UpstreamClient>>,
    pub shutdown: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, crate::core::error::NodeError> {
        let primary_client = Arc::new(UpstreamClient::new(
            &config.primary,
            config.upstream_timeout,
            config.upstream_max_retries,
            "primary",
        )?);
        let secondary_client = config
            .secondary
            .as_ref()
            .map(|backend| UpstreamClient::new(backend, config.upstream_timeout, config.upstream_max_retries, "secondary").map(Arc::new))
            .transpose()?;

        let router = ModelRouter::new(&config.routing_table);
        let conversation_manager = Arc::new(ConversationManager::new(ManagerConfig {
            max_conversation_age: config.max_conversation_age,
            max_stored_conversations: config.max_stored_conversations,
        }));
        let multi_turn = MultiTurnHandler::new(
            Arc::clone(&conversation_manager),
            MultiTurnConfig {
                max_history_length: config.max_history_length,
                max_history_age: config.max_history_age,
                max_concurrent_conversations: config.max_concurrent_conversations,
            },
        );
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            initial_backoff: config.breaker_recovery_timeout,
            max_backoff: config.breaker_max_backoff,
        }));

        Ok(Self {
            config,
            start_time: SystemTime::now(),
            metrics: Arc::new(Metrics::new()),
            router,
            conversation_manager,
            multi_turn,
            breaker,
            primary_client,
            secondary_client,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn client_for(&self, provider: Provider) -> Option<Arc<UpstreamClient>> {
        match provider {
            Provider::Primary => Some(Arc::clone(&self.primary_client)),
            Provider::Secondary => self.secondary_client.as_ref().map(Arc::clone),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    }
}

pub type SharedState = Arc<AppState>;
