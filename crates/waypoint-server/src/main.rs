//! Waypoint Server - Service Discovery Resolver

use clap::Parser;
use tracing::{info, warn};
use waypoint_server::{
    app,
    cli::Cli,
    observability::{init_metrics, init_tracing, TracingConfig},
};
use waypoint_tree::EtcdConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(TracingConfig {
        log_format: cli.log_format.clone(),
    })
    .map_err(|e| anyhow::anyhow!(e))?;

    info!("Starting waypoint-server");

    let metrics_state = match init_metrics() {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let tree_config = cli.tree_config();
    let state = app::build_state(
        EtcdConnector::new(&tree_config),
        cli.namespace.clone(),
        cli.cache_config(),
        &tree_config,
        metrics_state,
    )
    .await?;

    app::serve(state, cli.bind_addr).await
}
