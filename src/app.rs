//! Composition root
//!
//! Wires every component together: Event Bus, Auth Verifier, rate-limiting
//! defaults, Connection Registry, Broadcaster, Room/Presence Engine,
//! Service Supervisor, Circuit Breaker, the Topic Router's handler table,
//! and the hub's own WebSocket server, split into an `init` phase that
//! builds everything and a `start` phase that runs it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::auth::AuthVerifier;
use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::broadcast::Broadcaster;
use crate::bus::EventBus;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, SystemCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, DEFAULT_SLOW_CONSUMER_THRESHOLD, ENV_LOG, SHUTDOWN_TIMEOUT_SECS};
use crate::core::secret::SecretManager;
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::hub::{self, HubState};
use crate::registry::ConnectionRegistry;
use crate::router::Dispatcher;
use crate::router::handlers::{self, HandlerTable};
use crate::rooms::{NoParticipants, RoomEngine};
use crate::supervisor::{Service, Supervisor};

/// The backend collaborators the circuit breaker and supervisor both watch:
/// `wallet`, `market-data`, and `ai` are out-of-scope external services
///, represented here only by their health and
/// breaker state, never by real calls.
const BACKEND_SERVICES: &[&str] = &["wallet", "market-data", "ai"];

pub struct App {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub storage: AppStorage,
    pub supervisor: Arc<Supervisor>,
    pub state: HubState,
}

impl App {
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();
        tracing::debug!("hub starting");

        let (cli_config, command) = cli::parse();
        if let Some(Commands::System { command: SystemCommands::Prune { yes } }) = command {
            return Self::prune(yes);
        }

        let app = Self::init(&cli_config).await?;
        Self::start(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init(&config).await?;
        let secrets = SecretManager::init(&storage).await?;

        let bus = Arc::new(EventBus::new());
        let shutdown = ShutdownService::new(bus.clone());
        let auth = Arc::new(AuthVerifier::new(&secrets, config.auth.enabled));
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), DEFAULT_SLOW_CONSUMER_THRESHOLD));
        let rooms = Arc::new(RoomEngine::new(
            broadcaster.clone(),
            Arc::new(NoParticipants),
            config.rooms.chat_history_len,
            config.rooms.chat_message_max_chars,
            config.rate_limit.chat_window_max,
            config.rate_limit.chat_window_secs,
        ));

        let breaker = Arc::new(CircuitBreaker::init(storage.data_dir(), bus.clone()).await?);
        let default_breaker_config = BreakerConfig {
            failure_threshold: config.breaker.failure_threshold,
            recovery_timeout_secs: config.breaker.recovery_timeout_secs,
            request_limit: config.breaker.request_limit,
            monitoring_window_secs: config.breaker.monitoring_window_secs,
            minimum_requests: config.breaker.minimum_requests,
        };
        for service in BACKEND_SERVICES {
            breaker.register(service, default_breaker_config.clone()).await;
        }

        let mut supervisor = Supervisor::new(bus.clone(), Duration::from_secs(30));
        for service in BACKEND_SERVICES {
            supervisor.register(Arc::new(BackendService {
                name: service,
                breaker: breaker.clone(),
            }));
        }
        let supervisor = Arc::new(supervisor);

        let handlers = Arc::new(build_handler_table());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            handlers,
            Duration::from_secs(config.server.request_deadline_secs),
            rooms.clone(),
        ));

        shutdown.register(hub::bridge::spawn(bus.clone(), broadcaster)).await;

        let state = HubState {
            registry,
            dispatcher,
            auth,
            rooms,
            breaker,
            supervisor: supervisor.clone(),
            shutdown: shutdown.clone(),
            bucket_capacity: config.rate_limit.bucket_capacity,
            bucket_refill_per_sec: config.rate_limit.bucket_refill_per_sec,
            max_payload_bytes: config.server.max_payload_bytes,
            idle_timeout: Duration::from_secs(config.server.idle_timeout_secs),
            shutdown_grace: Duration::from_secs(config.server.shutdown_grace_secs),
        };

        Ok(Self {
            shutdown,
            config,
            storage,
            supervisor,
            state,
        })
    }

    fn prune(skip_confirm: bool) -> Result<()> {
        let data_dir = AppStorage::resolve_data_dir();
        if !data_dir.exists() {
            println!("Nothing to prune. Data directory does not exist: {}", data_dir.display());
            return Ok(());
        }

        if !skip_confirm {
            print!("This will permanently delete {}\nContinue? [y/N] ", data_dir.display());
            std::io::Write::flush(&mut std::io::stdout())?;
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
                println!("Aborted.");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&data_dir)?;
        println!("Pruned: {}", data_dir.display());
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);
        let filter = std::env::var(ENV_LOG).or_else(|_| std::env::var("RUST_LOG")).unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();
        app.supervisor.start_all().await?;
        app.shutdown.register(app.supervisor.start_metrics_task()).await;

        banner::print_banner(
            &app.config.server.host,
            app.config.server.port,
            app.state.auth.is_enabled(),
            &app.storage.data_dir().display().to_string(),
        );

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let shutdown = app.shutdown.clone();
        let supervisor = app.supervisor.clone();

        hub::server::serve(app.state, &host, port).await?;

        supervisor.stop_all(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS)).await;
        shutdown.shutdown().await;
        Ok(())
    }
}

struct BackendService {
    name: &'static str,
    breaker: Arc<CircuitBreaker>,
}

#[async_trait]
impl Service for BackendService {
    fn name(&self) -> &str {
        self.name
    }

    async fn health_check(&self) -> bool {
        self.breaker.allow_request(self.name)
    }

    async fn metrics(&self) -> Value {
        json!({ "circuitState": self.breaker.state(self.name) })
    }
}

fn build_handler_table() -> HandlerTable {
    HandlerTable::builder()
        .register("terminal", "getTerminalData", Arc::new(handlers::terminal::GetTerminalData))
        .register("ai", "stream", Arc::new(handlers::ai::StreamChat))
        .register("contest", "SET_ADMIN_PRESENCE", Arc::new(handlers::contest::SetAdminPresence))
        .register("contest", "sendChatMessage", Arc::new(handlers::contest::SendChatMessage))
        .register("market-data", "getSnapshot", Arc::new(handlers::market_data::GetSnapshot))
        .register("wallet", "getBalance", Arc::new(handlers::wallet::GetBalance))
        .register("admin", "manualReset", Arc::new(handlers::admin::ManualReset))
        .register("admin", "queryIncidents", Arc::new(handlers::admin::QueryIncidents))
        .register("monitor", "getSnapshot", Arc::new(handlers::monitor::GetSnapshot))
        .build()
}
