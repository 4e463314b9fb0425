//! Health convergence of a set of running nodes.

use std::sync::Arc;
use std::time::Duration;

use fleet_telemetry::log_node_event;
use shared_types::NodeId;
use tokio::time::MissedTickBehavior;

use crate::context::OpContext;
use crate::domain::{OrchestratorError, RuntimeHandle};
use crate::ports::NodeRuntime;

/// Polls nodes on a fixed interval until every one reports healthy.
#[derive(Clone)]
pub struct HealthMonitor {
    runtime: Arc<dyn NodeRuntime>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(runtime: Arc<dyn NodeRuntime>, interval: Duration) -> Self {
        Self { runtime, interval }
    }

    /// Wait for every node in `nodes` to report healthy.
    ///
    /// A node is not queried again once healthy. A query error aborts the
    /// wait; expiry of `ctx` fails with the nodes still unhealthy.
    pub async fn wait_for_healthy(
        &self,
        ctx: &OpContext,
        nodes: Vec<(NodeId, RuntimeHandle)>,
    ) -> Result<(), OrchestratorError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut unhealthy = nodes;
        loop {
            let mut still_unhealthy = Vec::with_capacity(unhealthy.len());
            for (node_id, handle) in unhealthy {
                let healthy = self
                    .runtime
                    .is_healthy(&handle)
                    .await
                    .map_err(|source| OrchestratorError::HealthCheck { node_id, source })?;
                if healthy {
                    log_node_event!(info, "node is healthy", node_id, uri = %handle.uri);
                } else {
                    still_unhealthy.push((node_id, handle));
                }
            }
            unhealthy = still_unhealthy;

            if unhealthy.is_empty() {
                return Ok(());
            }

            tokio::select! {
                source = ctx.done() => {
                    return Err(OrchestratorError::HealthTimeout {
                        unhealthy: unhealthy.into_iter().map(|(id, _)| id).collect(),
                        source,
                    });
                }
                _ = ticker.tick() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::test_utils::FakeRuntime;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_nodes_are_not_queried_after_healthy() {
        let runtime = Arc::new(FakeRuntime::new());
        let a = NodeId::new([1; 20]);
        let b = NodeId::new([2; 20]);
        runtime.healthy_after(a, 1);
        runtime.healthy_after(b, 4);

        let monitor = HealthMonitor::new(runtime.clone(), Duration::from_millis(200));
        let ctx = OpContext::with_timeout(Duration::from_secs(10));
        let started = Instant::now();
        monitor
            .wait_for_healthy(&ctx, vec![(a, runtime.attach(a)), (b, runtime.attach(b))])
            .await
            .unwrap();

        assert_eq!(runtime.health_queries(&a), 1);
        assert_eq!(runtime.health_queries(&b), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_healthy_times_out_at_deadline() {
        let runtime = Arc::new(FakeRuntime::new());
        let stuck = NodeId::new([3; 20]);
        runtime.never_healthy(stuck);

        let nodes = vec![(stuck, runtime.attach(stuck))];
        let monitor = HealthMonitor::new(runtime, Duration::from_millis(200));
        let ctx = OpContext::with_timeout(Duration::from_secs(10));
        let started = Instant::now();
        let err = monitor
            .wait_for_healthy(&ctx, nodes)
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(10_200), "{elapsed:?}");
        match err {
            OrchestratorError::HealthTimeout { unhealthy, source } => {
                assert_eq!(unhealthy, vec![stuck]);
                assert_eq!(source, ContextError::DeadlineExceeded);
            }
            other => panic!("expected health timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_error_aborts_immediately() {
        let runtime = Arc::new(FakeRuntime::new());
        let broken = NodeId::new([4; 20]);
        let fine = NodeId::new([5; 20]);
        runtime.fail_health(broken);
        runtime.never_healthy(fine);

        let nodes = vec![(fine, runtime.attach(fine)), (broken, runtime.attach(broken))];
        let monitor = HealthMonitor::new(runtime, Duration::from_millis(200));
        let ctx = OpContext::with_timeout(Duration::from_secs(10));
        let started = Instant::now();
        let err = monitor
            .wait_for_healthy(&ctx, nodes)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::HealthCheck { node_id, .. } if node_id == broken));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_ends_wait_without_waiting_for_deadline() {
        let runtime = Arc::new(FakeRuntime::new());
        let stuck = NodeId::new([6; 20]);
        runtime.never_healthy(stuck);

        let nodes = vec![(stuck, runtime.attach(stuck))];
        let monitor = HealthMonitor::new(runtime, Duration::from_millis(200));
        let (cancel, rx) = tokio::sync::watch::channel(false);
        let ctx = OpContext::with_timeout(Duration::from_secs(60)).with_cancel(rx);
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_100)).await;
            cancel.send(true).unwrap();
        });

        let started = Instant::now();
        let err = monitor
            .wait_for_healthy(&ctx, nodes)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(1_100));
        match err {
            OrchestratorError::HealthTimeout { unhealthy, source } => {
                assert_eq!(unhealthy, vec![stuck]);
                assert_eq!(source, ContextError::Cancelled);
            }
            other => panic!("expected health timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_set_is_healthy() {
        let monitor = HealthMonitor::new(Arc::new(FakeRuntime::new()), Duration::from_millis(200));
        let ctx = OpContext::with_timeout(Duration::from_secs(1));
        monitor.wait_for_healthy(&ctx, Vec::new()).await.unwrap();
    }
}
