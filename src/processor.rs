use anyhow::{Context, Result};
use distiller_kanban::{Filter, RunStats, ShutdownSignal};
use periodical_distiller::collaborators::Collaborators;
use periodical_distiller::config::Config;
use periodical_distiller::orchestrator::standard_pipeline;
use periodical_distiller::stages::{standard_stages, stage_buckets, STAGE_BUCKETS};
use std::time::Duration;

/// Continuous mode for one stage of the standard topology.
pub struct StageProcessor {
    filter: Filter,
    shutdown: ShutdownSignal,
}

impl StageProcessor {
    pub fn new(config: &Config, stage: &str) -> Result<Self> {
        let Some((input, output)) = stage_buckets(stage) else {
            let known: Vec<_> = STAGE_BUCKETS.iter().map(|(name, _)| *name).collect();
            anyhow::bail!("Unknown stage '{}' (expected one of {})", stage, known.join(", "));
        };

        let pipeline = standard_pipeline(&config.workspace.root);
        pipeline.ensure_dirs()?;

        let collaborators = Collaborators::from_config(&config.stages);
        let (_, stage_impl) = standard_stages(&config.workspace.sip_output, collaborators)
            .into_iter()
            .find(|(bucket, _)| bucket == output)
            .with_context(|| format!("No stage writes to {}", output))?;

        let filter = Filter::new(pipeline.pipe(input, output)?, stage_impl)?
            .with_poll_interval(Duration::from_secs(config.processing.poll_interval_secs));

        Ok(Self {
            filter,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Process tokens until SIGINT or SIGTERM. The token in flight when the
    /// signal arrives is finished first.
    pub async fn run(self) -> Result<RunStats> {
        tracing::info!(
            "Stage processor started for {} ({} -> {})",
            self.filter.name(),
            self.filter.pipe().input().display(),
            self.filter.pipe().output().display()
        );

        let signal = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            tracing::info!("Shutdown signal received, finishing current token");
            signal.request();
        });

        let shutdown = self.shutdown;
        let mut filter = self.filter;
        let stats = tokio::task::spawn_blocking(move || filter.run_forever(&shutdown)).await??;

        tracing::info!(
            "Stage processor stopped: {} succeeded, {} failed",
            stats.succeeded,
            stats.failed
        );
        Ok(stats)
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
