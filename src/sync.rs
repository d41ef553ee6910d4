//! Keeps the pipeline in sync with the node's main chain.
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::core::types::RawBlock;
use crate::core::NodeRpc;
use crate::error::Error;
use crate::framework::Pipeline;
use crate::monitor::MonitorMessage;

pub struct Syncer<N: NodeRpc> {
    pipeline: Pipeline<N>,
    poll_interval: Duration,
    monitor_tx: mpsc::Sender<MonitorMessage>,
}

enum Step {
    Applied,
    Reverted,
    Synced,
}

impl<N: NodeRpc> Syncer<N> {
    pub fn new(
        pipeline: Pipeline<N>,
        poll_interval_ms: u64,
        monitor_tx: mpsc::Sender<MonitorMessage>,
    ) -> Self {
        Self {
            pipeline,
            poll_interval: Duration::from_millis(poll_interval_ms),
            monitor_tx,
        }
    }

    /// Follow the node until a fatal error occurs.
    pub async fn start(&mut self) -> Result<(), Error> {
        tracing::info!("starting sync from {:?}", self.pipeline.head());
        loop {
            match self.step().await {
                Ok(Step::Applied) | Ok(Step::Reverted) => self.report().await,
                Ok(Step::Synced) => tokio::time::sleep(self.poll_interval).await,
                Err(e) if e.is_fatal() => {
                    tracing::error!("stopping sync: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("{e}, retrying in {:?}", self.poll_interval);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Apply the next block, or revert the head if the next block is not
    /// its child.
    async fn step(&mut self) -> Result<Step, Error> {
        let head = self.pipeline.head().clone();
        let node_level = self.pipeline.node().head_level().await?;
        if !head.is_initial() && node_level <= head.level {
            return Ok(Step::Synced);
        }
        let next_level = if head.is_initial() { 1 } else { head.level + 1 };
        let next = self.pipeline.node().block_at(next_level).await?;
        if head.is_initial() || next.predecessor == head.hash {
            self.pipeline.apply(&next).await?;
            return Ok(Step::Applied);
        }
        tracing::warn!(
            "block {} {} does not follow {}, rolling back",
            next.level,
            next.hash,
            head.hash
        );
        let orphan: RawBlock = self.pipeline.node().block(&head.hash).await?;
        self.pipeline.revert(&orphan).await?;
        Ok(Step::Reverted)
    }

    async fn report(&self) {
        let level = self.pipeline.head().level;
        if let Err(e) = self.monitor_tx.send(MonitorMessage::Head(level)).await {
            tracing::warn!("monitor unavailable: {e}");
        }
    }
}
