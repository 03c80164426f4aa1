//! Synchronous, background and composite analyses on top of the pipeline.
//!
//! Background work goes through a bounded queue drained by a fixed pool of
//! workers. A full queue makes submitters wait; it never drops work. Task
//! state is kept in a [`TaskStore`] so status polls, cancellation and
//! completion waits all see the same transitions.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use psylens_audit::events::{AuditEvent, actions};
use psylens_core::models::analysis::{AnalysisRequest, CompositeRequest, ProcessingMode};
use psylens_core::models::result::{AnalysisResult, CompositeAnalysis};
use psylens_core::models::task::{AnalysisTask, TaskError, TaskStatusReport};

use crate::error::AnalysisError;
use crate::insights;
use crate::pipeline::AnalysisPipeline;
use crate::registry::AnalysisRegistry;
use crate::store::ResultStore;
use crate::tasks::TaskStore;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Background workers draining the queue.
    pub workers: usize,
    /// Queued tasks allowed before submitters wait.
    pub queue_capacity: usize,
    /// Typical task duration, used for progress estimates.
    pub expected_task_duration: Duration,
    /// How long finished tasks stay queryable.
    pub task_retention: Duration,
    pub sweep_interval: Duration,
    /// Accept `async` submissions. Off where the process cannot keep
    /// working between requests.
    pub background: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            expected_task_duration: Duration::from_secs(30),
            task_retention: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
            background: true,
        }
    }
}

/// Who is asking, as established by the authenticated outer layer.
///
/// Both values are opaque and only ever reach audit events.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub caller: String,
    pub patient_id: Option<String>,
}

impl CallerContext {
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            patient_id: None,
        }
    }

    pub fn with_patient(mut self, patient_id: Option<String>) -> Self {
        self.patient_id = patient_id;
        self
    }

    fn audit(&self, action: &str, resource_type: &str, resource_id: Uuid) -> AuditEvent {
        AuditEvent::new(action, resource_type, resource_id.to_string(), &self.caller)
            .with_patient(self.patient_id.as_deref())
    }
}

/// Outcome of [`Orchestrator::submit`].
#[derive(Debug, Clone)]
pub enum Submission {
    Completed(AnalysisResult),
    Queued(TaskStatusReport),
}

struct QueuedTask {
    task_id: Uuid,
    caller: CallerContext,
}

struct Inner {
    pipeline: AnalysisPipeline,
    tasks: TaskStore,
    results: Arc<dyn ResultStore>,
    config: OrchestratorConfig,
    queue: mpsc::Sender<QueuedTask>,
    receiver: StdMutex<Option<mpsc::Receiver<QueuedTask>>>,
    shutdown: watch::Sender<bool>,
}

/// Cheap to clone; clones share the same queue, tasks and results.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        pipeline: AnalysisPipeline,
        results: Arc<dyn ResultStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                pipeline,
                tasks: TaskStore::new(),
                results,
                config,
                queue,
                receiver: StdMutex::new(Some(receiver)),
                shutdown,
            }),
        }
    }

    pub fn registry(&self) -> &AnalysisRegistry {
        self.inner.pipeline.registry()
    }

    pub fn model_version(&self) -> &str {
        self.inner.pipeline.model_version()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Spawn the worker pool and the retention sweeper.
    ///
    /// Only the first call spawns anything.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let receiver = self
            .inner
            .receiver
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let Some(receiver) = receiver else {
            warn!("orchestrator workers already started");
            return Vec::new();
        };

        let receiver = Arc::new(Mutex::new(receiver));
        let workers = self.inner.config.workers.max(1);
        let mut handles = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            let inner = Arc::clone(&self.inner);
            let receiver = Arc::clone(&receiver);
            let shutdown = self.inner.shutdown.subscribe();
            handles.push(tokio::spawn(worker_loop(inner, receiver, shutdown, worker)));
        }
        handles.push(tokio::spawn(sweep_loop(
            Arc::clone(&self.inner),
            self.inner.shutdown.subscribe(),
        )));

        info!(workers, queue_capacity = self.inner.config.queue_capacity, "orchestrator started");
        handles
    }

    /// Ask workers to stop after their current task.
    ///
    /// The queue is closed as the workers exit. Tasks still waiting in it
    /// fail as cancelled, and later background submissions are refused.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        info!("orchestrator shutting down");
    }

    /// Run a request inline or queue it, according to its processing mode.
    ///
    /// Validation happens here, before any detector or model call.
    pub async fn submit(
        &self,
        request: AnalysisRequest,
        caller: &CallerContext,
    ) -> Result<Submission, AnalysisError> {
        self.registry().validate_request(&request)?;
        let details = serde_json::json!({
            "analysis_type": request.analysis_type,
            "processing_mode": request.processing_mode,
        });

        match request.processing_mode {
            ProcessingMode::Sync => {
                let request_id = Uuid::new_v4();
                caller
                    .audit(actions::ANALYSIS_SUBMITTED, "analysis", request_id)
                    .with_details(details)
                    .emit();
                let result = self.inner.run_and_store(request_id, &request, caller).await?;
                Ok(Submission::Completed(result))
            }
            ProcessingMode::Async if !self.inner.config.background => Err(
                AnalysisError::Validation(
                    "async processing is not available in this deployment; use sync".to_string(),
                ),
            ),
            ProcessingMode::Async => {
                let task = AnalysisTask::new(request);
                let task_id = task.task_id;
                let report = task.status_report(jiff::Timestamp::now(), self.expected());
                self.inner.tasks.insert(task).await;

                caller
                    .audit(actions::ANALYSIS_SUBMITTED, "analysis_task", task_id)
                    .with_details(details)
                    .emit();

                let queued = QueuedTask {
                    task_id,
                    caller: caller.clone(),
                };
                if self.inner.queue.send(queued).await.is_err() {
                    self.inner.tasks.retain(|t| t.task_id != task_id).await;
                    return Err(AnalysisError::Internal("task queue is closed".to_string()));
                }
                info!(%task_id, "task queued");
                Ok(Submission::Queued(report))
            }
        }
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<AnalysisTask, AnalysisError> {
        self.inner
            .tasks
            .get(task_id)
            .await
            .ok_or(AnalysisError::TaskNotFound(task_id))
    }

    pub async fn get_status(&self, task_id: Uuid) -> Result<TaskStatusReport, AnalysisError> {
        let task = self.get_task(task_id).await?;
        Ok(task.status_report(jiff::Timestamp::now(), self.expected()))
    }

    /// Wait until the task is terminal or `timeout` elapses, then return
    /// its current state either way.
    pub async fn wait_for(
        &self,
        task_id: Uuid,
        timeout: Duration,
    ) -> Result<AnalysisTask, AnalysisError> {
        let mut rx = self
            .inner
            .tasks
            .subscribe(task_id)
            .await
            .ok_or(AnalysisError::TaskNotFound(task_id))?;
        let _ = tokio::time::timeout(timeout, until_terminal(&mut rx)).await;
        let task = rx.borrow().clone();
        Ok(task)
    }

    /// Cancel a queued or processing task.
    ///
    /// A processing task's in-flight work is abandoned and its result, if
    /// it arrives, is discarded.
    pub async fn cancel(
        &self,
        task_id: Uuid,
        caller: &CallerContext,
    ) -> Result<TaskStatusReport, AnalysisError> {
        let task = self
            .inner
            .tasks
            .update(task_id, |t| t.cancel(jiff::Timestamp::now()))
            .await?;
        caller
            .audit(actions::ANALYSIS_CANCELLED, "analysis_task", task_id)
            .emit();
        info!(%task_id, "task cancelled");
        Ok(task.status_report(jiff::Timestamp::now(), self.expected()))
    }

    pub async fn get_result(
        &self,
        result_id: Uuid,
        caller: &CallerContext,
    ) -> Result<AnalysisResult, AnalysisError> {
        let result = self
            .inner
            .results
            .get(result_id)
            .await?
            .ok_or(AnalysisError::ResultNotFound(result_id))?;
        caller
            .audit(actions::RESULT_READ, "analysis_result", result_id)
            .emit();
        Ok(result)
    }

    /// Run several analyses over one text concurrently.
    ///
    /// The first failure aborts the rest and nothing is stored. On success
    /// every sub-result is stored and merged into comprehensive insights; if
    /// storing any of them fails, the ones already written are withdrawn.
    pub async fn run_composite(
        &self,
        request: CompositeRequest,
        caller: &CallerContext,
    ) -> Result<CompositeAnalysis, AnalysisError> {
        let sub_requests = request.sub_requests()?;
        for sub in &sub_requests {
            self.registry().validate_request(sub)?;
        }

        let request_id = Uuid::new_v4();
        let types: Vec<_> = sub_requests.iter().map(|r| r.analysis_type).collect();
        caller
            .audit(actions::ANALYSIS_SUBMITTED, "composite_analysis", request_id)
            .with_details(serde_json::json!({ "analysis_types": types }))
            .emit();

        let pipeline = &self.inner.pipeline;
        let outcome = try_join_all(
            sub_requests
                .iter()
                .map(|sub| pipeline.run(Uuid::new_v4(), sub)),
        )
        .await;

        let fail = |e: AnalysisError| -> Result<CompositeAnalysis, AnalysisError> {
            warn!(%request_id, error = %e, "composite analysis failed");
            caller
                .audit(actions::COMPOSITE_FAILED, "composite_analysis", request_id)
                .with_details(serde_json::json!({ "error_kind": e.kind() }))
                .emit();
            Err(e)
        };

        let results = match outcome {
            Ok(results) => results,
            Err(e) => return fail(e),
        };

        let mut written = Vec::with_capacity(results.len());
        for result in &results {
            written.push(result.request_id);
            if let Err(e) = self.inner.results.put(result).await {
                self.inner.withdraw(&written).await;
                return fail(e);
            }
        }

        let sub_results: BTreeMap<_, _> = results
            .into_iter()
            .map(|r| (r.analysis_type, r))
            .collect();
        let comprehensive_insights = insights::merge(&sub_results);

        caller
            .audit(actions::COMPOSITE_COMPLETED, "composite_analysis", request_id)
            .with_details(serde_json::json!({
                "analysis_types": types,
                "priority": comprehensive_insights.priority,
                "review_required": comprehensive_insights.review_required,
            }))
            .emit();

        Ok(CompositeAnalysis {
            request_id,
            sub_results,
            comprehensive_insights,
            timestamp: jiff::Timestamp::now(),
        })
    }

    /// Drop finished tasks older than the retention window.
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    fn expected(&self) -> Duration {
        self.inner.config.expected_task_duration
    }
}

impl Inner {
    async fn run_and_store(
        &self,
        request_id: Uuid,
        request: &AnalysisRequest,
        caller: &CallerContext,
    ) -> Result<AnalysisResult, AnalysisError> {
        let outcome = match self.pipeline.run(request_id, request).await {
            Ok(result) => self.results.put(&result).await.map(|()| result),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(result) => audit_completed(caller, result),
            Err(e) => audit_failed(caller, request_id, e),
        }
        outcome
    }

    /// Remove results that must not stay readable. Failures are logged.
    async fn withdraw(&self, result_ids: &[Uuid]) {
        for &result_id in result_ids {
            if let Err(e) = self.results.delete(result_id).await {
                warn!(%result_id, error = %e, "failed to withdraw analysis result");
            }
        }
    }

    async fn process_task(&self, queued: QueuedTask) {
        let QueuedTask { task_id, caller } = queued;

        let task = match self
            .tasks
            .update(task_id, |t| t.start(jiff::Timestamp::now()))
            .await
        {
            Ok(task) => task,
            Err(e) => {
                info!(%task_id, reason = %e, "skipping task");
                return;
            }
        };
        let Some(mut rx) = self.tasks.subscribe(task_id).await else {
            return;
        };

        // Only the pipeline run is abandoned on cancellation. Once a result
        // exists, storing it runs to the end and the completion transition
        // decides whether it stays.
        let run = tokio::select! {
            run = self.pipeline.run(task_id, &task.request) => run,
            _ = until_terminal(&mut rx) => {
                info!(%task_id, "in-flight analysis abandoned after cancellation");
                return;
            }
        };

        // The result id of a background task is its task id.
        let stored = match run {
            Ok(result) => self.results.put(&result).await.map(|()| result),
            Err(e) => Err(e),
        };

        let now = jiff::Timestamp::now();
        match stored {
            Ok(result) => {
                match self
                    .tasks
                    .update(task_id, |t| t.complete(result.request_id, now))
                    .await
                {
                    Ok(task) => {
                        audit_completed(&caller, &result);
                        info!(%task_id, status = %task.status, "task finished");
                    }
                    Err(e) => {
                        self.withdraw(&[result.request_id]).await;
                        info!(%task_id, reason = %e, "task outcome discarded");
                    }
                }
            }
            Err(e) => {
                let error = e.to_task_error();
                match self.tasks.update(task_id, |t| t.fail(error, now)).await {
                    Ok(task) => {
                        audit_failed(&caller, task_id, &e);
                        info!(%task_id, status = %task.status, "task finished");
                    }
                    Err(reason) => info!(%task_id, %reason, "task outcome discarded"),
                }
            }
        }
    }

    /// Fail a task that was still queued when the workers stopped.
    async fn abandon_queued(&self, queued: QueuedTask) {
        let QueuedTask { task_id, caller } = queued;
        let now = jiff::Timestamp::now();
        match self
            .tasks
            .update(task_id, |t| t.abandon(TaskError::shutdown(), now))
            .await
        {
            Ok(_) => {
                caller
                    .audit(actions::ANALYSIS_CANCELLED, "analysis_task", task_id)
                    .with_details(serde_json::json!({ "reason": "shutdown" }))
                    .emit();
                info!(%task_id, "queued task cancelled by shutdown");
            }
            Err(e) => info!(%task_id, reason = %e, "skipping task"),
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = jiff::Timestamp::now();
        let retention = self.config.task_retention.as_secs_f64();
        let dropped = self
            .tasks
            .retain(|t| match t.completed_at {
                Some(done) if t.status.is_terminal() => {
                    now.duration_since(done).as_secs_f64() < retention
                }
                _ => true,
            })
            .await;
        if dropped > 0 {
            info!(dropped, "purged expired tasks");
        }
        dropped
    }
}

fn audit_completed(caller: &CallerContext, result: &AnalysisResult) {
    caller
        .audit(actions::ANALYSIS_COMPLETED, "analysis_result", result.request_id)
        .with_details(serde_json::json!({
            "analysis_type": result.analysis_type,
            "requires_review": result.requires_review(),
        }))
        .emit();
}

fn audit_failed(caller: &CallerContext, request_id: Uuid, error: &AnalysisError) {
    warn!(%request_id, error = %error, "analysis failed");
    caller
        .audit(actions::ANALYSIS_FAILED, "analysis", request_id)
        .with_details(serde_json::json!({ "error_kind": error.kind() }))
        .emit();
}

/// Resolves once the task is terminal. The store only drops terminal tasks,
/// so a closed channel means the same thing and resolves too.
async fn until_terminal(rx: &mut watch::Receiver<AnalysisTask>) {
    let _ = rx.wait_for(|t| t.status.is_terminal()).await;
}

async fn worker_loop(
    inner: Arc<Inner>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    mut shutdown: watch::Receiver<bool>,
    worker: usize,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                next = receiver.recv() => next,
                _ = shutdown.changed() => None,
            }
        };
        let Some(queued) = next else {
            break;
        };
        inner.process_task(queued).await;
    }

    let mut receiver = receiver.lock().await;
    receiver.close();
    while let Ok(queued) = receiver.try_recv() {
        inner.abandon_queued(queued).await;
    }
    info!(worker, "worker stopped");
}

async fn sweep_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(inner.config.sweep_interval.max(Duration::from_secs(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                inner.purge_expired().await;
            }
            _ = shutdown.changed() => break,
        }
    }
}
