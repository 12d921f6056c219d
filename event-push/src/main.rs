use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use event_push::api::{ApiServer, ApiServerConfig, AppState};
use event_push::config::ServerConfig;
use event_push::database::{self, SqlxTopicBindingRepository};
use event_push::logging;
use event_push::notification::{FanoutService, HttpPushSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env_or_default()?;
    let logging_handle = Arc::new(logging::init_logging(config.log_dir.as_deref())?);

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let bindings = Arc::new(SqlxTopicBindingRepository::new(pool.clone()));
    let mut state = AppState::new(bindings.clone()).with_logging(logging_handle.clone());

    match &config.gateway {
        Some(gateway) => {
            let sender = Arc::new(HttpPushSender::new(gateway)?);
            let fanout = FanoutService::new(bindings, sender)
                .with_concurrency(config.fanout_concurrency);
            state = state.with_fanout(Arc::new(fanout));
            tracing::info!(gateway = %gateway.url, "Announcement fan-out enabled");
        }
        None => tracing::warn!("PUSH_GATEWAY_URL not set, announcement fan-out disabled"),
    }

    let shutdown = CancellationToken::new();
    logging_handle.start_retention_cleanup(shutdown.child_token());

    let server = ApiServer::new(ApiServerConfig::from(&config), state);
    let server_token = server.cancel_token();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
            server_token.cancel();
        }
    });

    server.run().await?;

    shutdown.cancel();
    pool.close().await;
    tracing::info!("event-push stopped");

    Ok(())
}
