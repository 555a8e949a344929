//! CivInsight Worker Binary
//!
//! Runs the dispatch worker pool against the configured report store and inference
//! provider. Pending reports are swept into the dispatch queue periodically; Ctrl-C
//! stops the sweep and drains the workers.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use civinsight_core::capability::{probe_all, Capability, CapabilityClient, HttpCapabilityClient};
use civinsight_core::config::ConfigManager;
use civinsight_core::logging::init_structured_logging;
use civinsight_core::orchestration::{DispatchQueue, DispatchWorkerPool, ReportLifecycleController};
use civinsight_core::persistence::ReportRepository;
use civinsight_core::state_machine::ReportState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading configuration")?;
    let config = manager.config();
    info!(
        environment = %manager.environment(),
        version = civinsight_core::constants::system::CIVINSIGHT_CORE_VERSION,
        "Starting CivInsight worker"
    );

    let repository = connect_repository(config).await?;

    let client: Arc<dyn CapabilityClient> = Arc::new(
        HttpCapabilityClient::from_config(config).context("building inference client")?,
    );
    for (capability, status) in probe_all(client.as_ref(), &Capability::ALL).await {
        if !status.is_available() {
            warn!(
                capability = %capability,
                status = ?status,
                "Capability not available at startup"
            );
        }
    }

    let controller = Arc::new(ReportLifecycleController::from_config(
        config,
        Arc::clone(&repository),
        client,
    ));

    let (queue, receiver) = DispatchQueue::new(config.dispatch.queue_capacity);
    let pool = DispatchWorkerPool::start(&config.dispatch, queue.clone(), receiver, controller);

    let mut sweep = tokio::time::interval(config.dispatch.sweep_interval());
    let batch_size = usize::try_from(config.dispatch.sweep_batch_size).unwrap_or(usize::MAX);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = sweep.tick() => {
                match repository.list_reports_by_status(ReportState::Pending, batch_size).await {
                    Ok(reports) if !reports.is_empty() => {
                        let found = reports.len();
                        let count = queue.offer_batch(reports.into_iter().map(|r| r.id));
                        info!(count, found, "Swept pending reports into the queue");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Pending report sweep failed"),
                }
            }
        }
    }

    pool.shutdown().await;
    info!(stats = ?queue.stats().snapshot(), "CivInsight worker stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn connect_repository(
    config: &civinsight_core::CivInsightConfig,
) -> anyhow::Result<Arc<dyn ReportRepository>> {
    use civinsight_core::persistence::PgReportRepository;

    let repository = PgReportRepository::connect(&config.database)
        .await
        .context("connecting to the report database")?;
    repository.migrate().await.context("applying migrations")?;
    Ok(Arc::new(repository))
}

#[cfg(not(feature = "postgres"))]
async fn connect_repository(
    _config: &civinsight_core::CivInsightConfig,
) -> anyhow::Result<Arc<dyn ReportRepository>> {
    warn!("Built without the postgres feature; reports are kept in memory");
    Ok(Arc::new(civinsight_core::persistence::InMemoryReportRepository::new()))
}
