use std::env;

use tw::config::Config;
use tw::core::Node;
use tw::framework::Pipeline;
use tw::monitor::Monitor;
use tw::sync::Syncer;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), tw::error::Error> {
    // Configure tracing subscriber
    let filter = env::var("TW_LOG").unwrap_or(String::from("tw=info"));
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(filter)
        .finish();

    let _guard = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("starting tw v{VERSION}");
    if cfg!(feature = "test-utilities") {
        tracing::warn!("build includes test-utilities, use cargo's `--no-default-features` flag");
    } else {
        tracing::debug!("compiled without test-utilities");
    }

    let config = Config::from_env()?;

    let mut monitor = Monitor::new(config.monitor_port);
    let monitor_tx = monitor.sender();
    tokio::spawn(async move {
        monitor.start().await;
    });

    tracing::info!("configuring pipeline");
    let node = Node::new("local-node", &config.node.url);
    let pipeline = Pipeline::new(&config.postgres, node).await?;
    let mut syncer = Syncer::new(pipeline, config.node.poll_interval_ms, monitor_tx);

    tokio::select! {
        res = syncer.start() => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("exiting");
            Ok(())
        }
    }
}
