//! Orchestrator - routes events to pipelines and chains completions

use crate::{
    adapters::ExecutorRegistry,
    cache::CacheStore,
    core::{
        config::OrchestratorConfig,
        event::Event,
        run::Run,
        secrets::{EnvSecretResolver, SecretResolver},
        Pipeline,
    },
    execution::{cancellation::CancellationToken, engine::PipelineExecutor},
    notify::Notifier,
    persistence::{HistoryStore, RunSummary},
    trigger::TriggerListener,
};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Deliveries remembered for redelivery detection
pub const DEFAULT_REDELIVERY_WINDOW: usize = 10_000;

/// The most recent (pipeline, delivery id) pairs that produced a run.
///
/// Once `capacity` pairs are held the oldest is forgotten, so a redelivery
/// older than the window starts a new run.
struct DeliveryLog {
    capacity: usize,
    inner: Mutex<DeliveryLogInner>,
}

#[derive(Default)]
struct DeliveryLogInner {
    seen: HashSet<(String, Uuid)>,
    order: VecDeque<(String, Uuid)>,
}

impl DeliveryLog {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(DeliveryLogInner::default()),
        }
    }

    /// Record a delivery; false if it is already in the window
    fn insert(&self, pipeline: &str, delivery_id: Uuid) -> bool {
        let key = (pipeline.to_string(), delivery_id);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.seen.contains(&key) {
            return false;
        }
        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(key.clone());
        inner.order.push_back(key);
        true
    }

    fn len(&self) -> usize {
        self.inner.lock().order.len()
    }
}

/// Owns the configured pipelines and everything runs share.
///
/// Concurrent `dispatch` calls are independent; they share only the cache
/// store (and the redelivery window).
pub struct Orchestrator {
    pipelines: Vec<(Pipeline, TriggerListener)>,
    executor: PipelineExecutor,
    history: Option<Arc<dyn HistoryStore>>,
    delivered: DeliveryLog,
    active: DashMap<Uuid, Arc<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(pipelines: Vec<Pipeline>, executor: PipelineExecutor) -> Self {
        let pipelines = pipelines
            .into_iter()
            .map(|pipeline| {
                let listener = TriggerListener::new(&pipeline.name, pipeline.trigger.clone());
                (pipeline, listener)
            })
            .collect();
        Self {
            pipelines,
            executor,
            history: None,
            delivered: DeliveryLog::new(DEFAULT_REDELIVERY_WINDOW),
            active: DashMap::new(),
        }
    }

    /// Build from configuration. Executor references are checked against
    /// `registry`; secrets resolve from the environment.
    pub fn from_config(
        config: &OrchestratorConfig,
        registry: ExecutorRegistry,
        cache: Arc<dyn CacheStore>,
    ) -> anyhow::Result<Self> {
        let secrets: Arc<dyn SecretResolver> =
            Arc::new(EnvSecretResolver::new(&config.secrets.env_prefix));
        Self::from_config_with_secrets(config, registry, cache, secrets)
    }

    pub fn from_config_with_secrets(
        config: &OrchestratorConfig,
        registry: ExecutorRegistry,
        cache: Arc<dyn CacheStore>,
        secrets: Arc<dyn SecretResolver>,
    ) -> anyhow::Result<Self> {
        let pipelines = config.to_pipelines();
        registry.check_pipelines(&pipelines)?;

        let notifier = Notifier::from_config(&config.notification)?;
        let executor = PipelineExecutor::new(registry, cache, notifier, secrets, config.workdir());
        Ok(Self::new(pipelines, executor))
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Number of recent deliveries remembered for redelivery detection
    pub fn with_redelivery_window(mut self, capacity: usize) -> Self {
        self.delivered = DeliveryLog::new(capacity);
        self
    }

    /// Deliveries currently remembered
    pub fn remembered_deliveries(&self) -> usize {
        self.delivered.len()
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.iter().map(|(pipeline, _)| pipeline)
    }

    /// Feed an event to every pipeline and execute the runs it starts.
    ///
    /// Each terminal run emits a completion event that is fed back in, so
    /// dependent pipelines run in the same call. Returns every run, in
    /// completion order.
    pub async fn dispatch(&self, event: Event) -> Vec<Run> {
        let mut queue = VecDeque::from([event]);
        let mut finished = Vec::new();

        while let Some(event) = queue.pop_front() {
            let accepted: Vec<(&Pipeline, Run)> = self
                .pipelines
                .iter()
                .filter_map(|(pipeline, listener)| {
                    let run = listener.accept(&event)?;
                    if !self.delivered.insert(&pipeline.name, event.delivery_id) {
                        info!(
                            "Ignoring redelivery {} for pipeline {}",
                            event.delivery_id, pipeline.name
                        );
                        return None;
                    }
                    Some((pipeline, run))
                })
                .collect();

            let runs = join_all(
                accepted
                    .into_iter()
                    .map(|(pipeline, run)| self.execute(pipeline, run)),
            )
            .await;

            for run in runs {
                if let Some(conclusion) = run.overall_status.conclusion() {
                    queue.push_back(Event::completion(
                        &run.pipeline_name,
                        conclusion,
                        &run.triggering_event,
                    ));
                }
                finished.push(run);
            }
        }

        finished
    }

    async fn execute(&self, pipeline: &Pipeline, run: Run) -> Run {
        let token = Arc::new(CancellationToken::new());
        let run_id = run.id;
        self.active.insert(run_id, token.clone());

        let run = self.executor.execute(pipeline, run, &token).await;
        self.active.remove(&run_id);

        if let Some(history) = &self.history {
            if let Err(e) = history.save_run(&RunSummary::from_run(&run)).await {
                warn!("Could not record run {} in history: {}", run.id, e);
            }
        }
        run
    }

    /// Cancel an active run at its next stage or task boundary
    pub fn cancel(&self, run_id: Uuid, reason: &str) -> bool {
        match self.active.get(&run_id) {
            Some(token) => token.cancel(reason),
            None => false,
        }
    }

    /// Cancel every active run; returns how many were newly cancelled
    pub fn cancel_all(&self, reason: &str) -> usize {
        self.active
            .iter()
            .filter(|entry| entry.value().cancel(reason))
            .count()
    }

    /// Ids of runs currently executing
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.active.iter().map(|entry| *entry.key()).collect()
    }
}
