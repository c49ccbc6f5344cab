mod applications;
mod dispatcher;
mod fanout;
mod mailer;
mod maintenance;
mod notifications;
mod postings;
mod problem;
mod router;
mod telemetry;
mod tokens;

use std::net::SocketAddr;

use tracing::info;

use jobboard_storage::Database;
use jobboard_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let (task_dispatcher, task_receiver) = dispatcher::TaskDispatcher::channel();
    let mailer = mailer::Mailer::new(config.mail_relay_url.clone());
    fanout::FanoutWorker::new(database.clone(), mailer).spawn(task_receiver);

    maintenance::MaintenanceWorker::new(database.clone(), config.maintenance_interval).spawn();

    let addr: SocketAddr = config.bind_addr;
    let public_base_url = format!("http://{addr}");
    let state = router::AppState::new(metrics, database, task_dispatcher, public_base_url);

    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
