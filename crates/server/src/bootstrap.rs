use std::sync::Arc;
use std::time::Duration;

use innkeep_agent::attachments::TransportHostedAttachments;
use innkeep_agent::llm::client_from_config;
use innkeep_agent::locks::ConversationLocks;
use innkeep_agent::{
    AgentRuntime, AgentServices, DeliveryDispatcher, RetryPolicy, SystemClock,
    TracingBookingEventSink,
};
use innkeep_core::audit::TracingAuditSink;
use innkeep_core::config::{AppConfig, ConfigError, LoadOptions};
use innkeep_db::repositories::{
    SqlBookingRepository, SqlConversationEventRepository, SqlDeliveryLogRepository,
    SqlPropertyRepository,
};
use innkeep_db::{connect_with_config, migrations, ConversationStore, DbPool};
use thiserror::Error;
use tracing::info;

use crate::transport::transport_from_config;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("delivery transport could not be built: {0}")]
    Transport(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let transport = transport_from_config(&config.delivery).map_err(BootstrapError::Transport)?;
    let services = AgentServices {
        store: ConversationStore::new(Arc::new(SqlConversationEventRepository::new(
            db_pool.clone(),
        ))),
        properties: Arc::new(SqlPropertyRepository::new(db_pool.clone())),
        bookings: Arc::new(SqlBookingRepository::new(db_pool.clone())),
        dispatcher: DeliveryDispatcher::new(
            transport,
            Arc::new(SqlDeliveryLogRepository::new(db_pool.clone())),
            RetryPolicy::from_config(&config.delivery),
        ),
        attachments: Arc::new(TransportHostedAttachments),
        locks: ConversationLocks::default(),
        audit: Arc::new(TracingAuditSink),
        clock: Arc::new(SystemClock),
    };

    let runtime = AgentRuntime::new(
        services,
        client_from_config(&config.llm),
        Duration::from_secs(config.llm.timeout_secs.max(1)),
        Arc::new(TracingBookingEventSink),
    );
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        webhook_delivery = config.delivery.webhook_url.is_some(),
        "agent runtime initialized"
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

#[cfg(test)]
mod tests {
    use innkeep_core::config::{ConfigOverrides, LoadOptions};
    use innkeep_core::domain::conversation::{ConversationKey, Phase};
    use innkeep_core::domain::message::InboundMessage;
    use innkeep_db::fixtures::{DemoSeedDataset, DEMO_PROPERTY_ID};
    use innkeep_db::repositories::SqlPropertyRepository;

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_database_urls() {
        let result = bootstrap(options("postgres://localhost/innkeep")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrapped_runtime_answers_a_guest_from_sqlite() {
        let app = bootstrap(options("sqlite::memory:")).await.expect("bootstrap succeeds");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('property', 'conversation_event', 'booking_record', 'delivery_log')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 4);

        DemoSeedDataset::load(&SqlPropertyRepository::new(app.db_pool.clone()))
            .await
            .expect("seed demo property");

        let key = ConversationKey::new("guest-1", DEMO_PROPERTY_ID);
        let report = app
            .runtime
            .handle_message(InboundMessage::text(key.clone(), "m-1", "Hello!"))
            .await
            .expect("turn succeeds");
        assert_eq!(report.phase, Phase::Inquiry);
        assert!(!report.replies.is_empty());

        let snapshot = app.runtime.snapshot(&key).await.expect("snapshot");
        assert_eq!(snapshot, report.context);

        app.db_pool.close().await;
    }
}
