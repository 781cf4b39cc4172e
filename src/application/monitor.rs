//! Background tasks: periodic statistics rollup and improvement cycles.
//!
//! Each task is a cancellable tokio loop with an idempotent start and a
//! bounded stop. Self-investigation owns its own loop; this module
//! drives the rollup and the improvement cadence and delegates the
//! investigation loop's lifecycle.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ports::ExecutionStore;

use super::improvement::AutonomousImprovement;
use super::investigation::SelfInvestigator;

/// Background cadences.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between statistics rollups.
    pub statistics_interval: Duration,
    /// Interval between improvement cycles (when enabled).
    pub improvement_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            statistics_interval: Duration::from_secs(600),
            improvement_interval: Duration::from_secs(3_600),
        }
    }
}

struct TaskHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

async fn stop_task(handle: TaskHandle, name: &str) {
    let _ = handle.stop.send(true);
    if tokio::time::timeout(Duration::from_secs(5), handle.task)
        .await
        .is_err()
    {
        warn!(task = name, "background task did not stop within 5s");
    }
}

/// Owner of the engine's background loops.
pub struct BackgroundMonitor {
    execution_store: Arc<dyn ExecutionStore>,
    investigator: Arc<SelfInvestigator>,
    improvement: Option<Arc<AutonomousImprovement>>,
    config: MonitorConfig,
    tasks: Mutex<Vec<(String, TaskHandle)>>,
}

impl BackgroundMonitor {
    pub fn new(
        execution_store: Arc<dyn ExecutionStore>,
        investigator: Arc<SelfInvestigator>,
        improvement: Option<Arc<AutonomousImprovement>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            execution_store,
            investigator,
            improvement,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Starts every background task. Idempotent against double starts.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        tasks.push((
            "statistics_rollup".to_string(),
            Self::spawn_loop(
                self.config.statistics_interval,
                {
                    let store = Arc::clone(&self.execution_store);
                    move || {
                        let store = Arc::clone(&store);
                        async move {
                            if let Err(e) = store.update_statistics().await {
                                error!(error = %e, "statistics rollup failed");
                            }
                        }
                    }
                },
            ),
        ));

        self.investigator.start_monitoring().await;

        if let Some(improvement) = &self.improvement {
            tasks.push((
                "improvement_cycle".to_string(),
                Self::spawn_loop(self.config.improvement_interval, {
                    let improvement = Arc::clone(improvement);
                    move || {
                        let improvement = Arc::clone(&improvement);
                        async move {
                            match improvement.run_cycle().await {
                                Ok(report) => info!(
                                    opportunities = report.opportunities_detected,
                                    deployed = report.deployed.len(),
                                    queued = report.queued_for_review.len(),
                                    "improvement cycle finished"
                                ),
                                Err(e) => error!(error = %e, "improvement cycle failed"),
                            }
                        }
                    }
                }),
            ));
        }

        info!(tasks = tasks.len(), "background monitor started");
    }

    /// Stops everything, waiting up to five seconds per task.
    pub async fn stop(&self) {
        self.investigator.stop_monitoring().await;
        let drained: Vec<(String, TaskHandle)> = self.tasks.lock().await.drain(..).collect();
        futures::future::join_all(
            drained
                .into_iter()
                .map(|(name, handle)| async move { stop_task(handle, &name).await }),
        )
        .await;
        info!("background monitor stopped");
    }

    fn spawn_loop<F, Fut>(interval: Duration, mut work: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => work().await,
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        TaskHandle {
            stop: stop_tx,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryExecutionStore;
    use crate::application::investigation::InvestigationConfig;
    use crate::domain::foundation::GoalId;
    use crate::domain::goal::{GoalExecution, ToolExecutionRecord};
    use serde_json::json;

    fn monitor(store: Arc<InMemoryExecutionStore>) -> BackgroundMonitor {
        let investigator = Arc::new(SelfInvestigator::new(
            store.clone(),
            None,
            InvestigationConfig::default(),
        ));
        BackgroundMonitor::new(
            store,
            investigator,
            None,
            MonitorConfig {
                statistics_interval: Duration::from_millis(10),
                improvement_interval: Duration::from_secs(3_600),
            },
        )
    }

    #[tokio::test]
    async fn rollup_loop_refreshes_statistics() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let execution = GoalExecution::started(GoalId::new(), "goal");
        store.store_execution(&execution).await.unwrap();
        store
            .store_tool_execution(&ToolExecutionRecord::succeeded(
                execution.execution_id,
                "t",
                json!({}),
                json!({}),
                5,
            ))
            .await
            .unwrap();

        let monitor = monitor(store.clone());
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await;

        let stats = store.get_tool_statistics("t").await.unwrap().unwrap();
        assert_eq!(stats.total_executions, 1);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_is_clean() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let monitor = monitor(store);

        monitor.start().await;
        monitor.start().await;
        assert_eq!(monitor.tasks.lock().await.len(), 1);
        monitor.stop().await;
        assert!(monitor.tasks.lock().await.is_empty());
    }
}
