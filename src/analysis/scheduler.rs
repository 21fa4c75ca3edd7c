//! Task Scheduler
//!
//! In-memory delay queue with a single worker. Tasks live in a task map keyed
//! by ID; a min-heap on `(scheduled_time, seq)` orders them. The worker sleeps
//! until the earliest task is due or a new submission arrives, runs one task
//! at a time under an execution timeout, mirrors the final task state to the
//! database and reports the product to the category tracker.
//!
//! ## Worker lifecycle
//!
//! ```text
//!   schedule() ──► start if stopped ──► wait for due task ──► execute ──► persist ──► untrack
//!                                             │    ▲                                     │
//!                                             │    └─────────────────────────────────────┘
//!                                             └─ idle timeout with empty queue ──► exit
//! ```
//!
//! Untracking runs after the task state is persisted and outside the
//! execution timeout; it is the only place category completion is triggered.
//! Failed tasks are not retried; callers re-schedule explicitly.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use super::executor::AnalysisExecutor;
use super::tracker::CategoryTracker;
use crate::ai::with_timeout;
use crate::config::SchedulerConfig;
use crate::storage::{ProductStore, SharedDatabase, TaskStore};
use crate::types::{AnalysisStatus, ForgeError, Result, Task, TaskType};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    due: DateTime<Utc>,
    seq: u64,
    task_id: String,
}

struct SchedulerInner {
    db: SharedDatabase,
    executor: Arc<AnalysisExecutor>,
    tracker: Arc<CategoryTracker>,
    config: SchedulerConfig,
    tasks: DashMap<String, Task>,
    queue: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    /// Wakes the worker on submission or shutdown
    wake: Notify,
    /// Signalled whenever the outstanding count drops to zero
    idle: Notify,
    seq: AtomicU64,
    /// Scheduled but not yet finished
    outstanding: AtomicUsize,
    running: AtomicBool,
    closed: AtomicBool,
}

/// Handle to the single scheduler instance; clones share the same queue
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        db: SharedDatabase,
        executor: Arc<AnalysisExecutor>,
        tracker: Arc<CategoryTracker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                db,
                executor,
                tracker,
                config,
                tasks: DashMap::new(),
                queue: Mutex::new(BinaryHeap::new()),
                wake: Notify::new(),
                idle: Notify::new(),
                seq: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queue an analysis task to run after `delay`; returns the task ID immediately.
    ///
    /// Market research tasks must name a prompt block; other types must not.
    pub async fn schedule(
        &self,
        product_id: &str,
        user_id: &str,
        project_id: &str,
        delay: Duration,
        task_type: TaskType,
        prompt_block_id: Option<&str>,
    ) -> Result<String> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ForgeError::SchedulerClosed);
        }

        match (task_type.requires_prompt_block(), prompt_block_id) {
            (true, None) => {
                return Err(ForgeError::Validation(format!(
                    "{} tasks require a prompt block ID",
                    task_type
                )));
            }
            (false, Some(_)) => {
                return Err(ForgeError::Validation(format!(
                    "{} tasks do not take a prompt block ID",
                    task_type
                )));
            }
            _ => {}
        }

        let delay = chrono::Duration::from_std(delay)
            .map_err(|_| ForgeError::Validation(format!("Delay out of range: {:?}", delay)))?;
        let now = Utc::now();
        let seq = inner.seq.fetch_add(1, Ordering::Relaxed);
        let task = Task {
            task_id: format!("{}_{}_{}", now.timestamp(), product_id, seq),
            product_id: product_id.to_string(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            task_type,
            scheduled_time: now + delay,
            prompt_block_id: prompt_block_id.map(String::from),
            executed: false,
            success: None,
            error: None,
            completed_at: None,
        };

        if task_type.tracks_category() {
            match inner.tracker.track(product_id).await {
                Ok(Some(key)) => debug!(product_id, category = %key, "Product registered as pending"),
                Ok(None) => debug!(product_id, "Product has no category to track"),
                Err(e) => warn!(product_id, "Failed to track product: {}", e),
            }
        }

        let task_id = task.task_id.clone();
        let entry = QueueEntry {
            due: task.scheduled_time,
            seq,
            task_id: task_id.clone(),
        };
        inner.tasks.insert(task_id.clone(), task);
        inner.outstanding.fetch_add(1, Ordering::AcqRel);
        inner.lock_queue().push(Reverse(entry));
        inner.wake.notify_one();
        inner.ensure_worker();

        info!(task_id = %task_id, product_id, %task_type, "Task scheduled");
        Ok(task_id)
    }

    /// Convenience for `task_type = competitor_analysis`
    pub async fn schedule_competitor_analysis(
        &self,
        product_id: &str,
        user_id: &str,
        project_id: &str,
        delay: Duration,
    ) -> Result<String> {
        self.schedule(
            product_id,
            user_id,
            project_id,
            delay,
            TaskType::CompetitorAnalysis,
            None,
        )
        .await
    }

    /// In-memory state first, then the persisted mirror
    pub fn get_status(&self, task_id: &str) -> Result<Option<Task>> {
        if let Some(task) = self.inner.tasks.get(task_id) {
            return Ok(Some(task.value().clone()));
        }
        TaskStore::new(&self.inner.db).get(task_id)
    }

    /// Tasks scheduled but not yet finished
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Wait until every scheduled task has run, then stop the worker
    pub async fn drain(&self) {
        self.inner.ensure_worker();
        loop {
            let idle = self.inner.idle.notified();
            if self.outstanding() == 0 || self.inner.closed.load(Ordering::Acquire) {
                break;
            }
            idle.await;
        }
        self.shutdown();
    }

    /// Reject new submissions and stop the worker after its in-flight task
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!(
                outstanding = self.outstanding(),
                "Scheduler shutting down"
            );
        }
        self.inner.wake.notify_one();
        self.inner.idle.notify_waiters();
    }
}

impl SchedulerInner {
    fn lock_queue(&self) -> MutexGuard<'_, BinaryHeap<Reverse<QueueEntry>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue_is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    /// Spawn the worker unless one is already running
    fn ensure_worker(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run().await });
        }
    }

    async fn run(self: Arc<Self>) {
        debug!("Scheduler worker started");

        while let Some(task_id) = self.next_due().await {
            self.dispatch(&task_id).await;
        }

        self.running.store(false, Ordering::Release);
        debug!("Scheduler worker stopped");

        // A submission may have landed between the idle check and the flag reset
        if !self.queue_is_empty() {
            self.ensure_worker();
        }
    }

    /// Pop the next due task, sleeping until one is due.
    /// Returns `None` on shutdown or after an idle timeout with an empty queue.
    async fn next_due(&self) -> Option<String> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            let wait = {
                let mut queue = self.lock_queue();
                match queue.peek() {
                    None => None,
                    Some(Reverse(entry)) => {
                        let now = Utc::now();
                        if entry.due <= now {
                            return queue.pop().map(|Reverse(entry)| entry.task_id);
                        }
                        Some((entry.due - now).to_std().unwrap_or_default())
                    }
                }
            };

            match wait {
                Some(delay) => {
                    let _ = tokio::time::timeout(delay, self.wake.notified()).await;
                }
                None => {
                    let idle = tokio::time::timeout(self.config.idle_timeout(), self.wake.notified())
                        .await
                        .is_err();
                    if idle && self.queue_is_empty() {
                        debug!("Scheduler idle, stopping worker");
                        return None;
                    }
                }
            }
        }
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn dispatch(&self, task_id: &str) {
        let Some(mut task) = self.tasks.get(task_id).map(|t| t.value().clone()) else {
            warn!("Queued task missing from task map");
            self.finish_one();
            return;
        };

        let result = with_timeout(
            self.config.task_timeout(),
            self.executor.execute(&task),
            "analysis task",
        )
        .await;

        match result {
            Ok(summary) => {
                info!(
                    product_id = %task.product_id,
                    blocks = summary.blocks,
                    failed = summary.failed,
                    "Task succeeded"
                );
                task.mark_succeeded();
            }
            Err(e) => {
                warn!(product_id = %task.product_id, "Task failed: {}", e);
                let message = e.to_string();
                // A timed-out competitor run never reaches its own failure branch
                if task.task_type == TaskType::CompetitorAnalysis {
                    self.record_analysis_failure(&task.product_id, &message);
                }
                task.mark_failed(message);
            }
        }

        self.tasks.insert(task_id.to_string(), task.clone());

        if let Err(e) = TaskStore::new(&self.db).upsert(&task) {
            warn!("Failed to persist task state: {}", e);
        }

        if task.task_type.tracks_category()
            && let Err(e) = self
                .tracker
                .untrack_and_maybe_drain(&task.product_id)
                .await
        {
            warn!(product_id = %task.product_id, "Failed to untrack product: {}", e);
        }

        self.finish_one();
    }

    fn record_analysis_failure(&self, product_id: &str, message: &str) {
        if let Err(e) = ProductStore::new(&self.db).set_analysis_status(
            product_id,
            AnalysisStatus::Failed,
            Some(message),
        ) {
            warn!(product_id, "Failed to record analysis failure: {}", e);
        }
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::tests::ScriptedProvider;
    use crate::ai::{GenerationClient, SamplingParams};
    use crate::analysis::completion::MasterRecipeGenerator;
    use crate::analysis::tracker::tests::RecordingHandler;
    use crate::config::{AnalysisConfig, CompletionConfig};
    use crate::constants::prompt_category;
    use crate::storage::{AnalysisStore, Database, PromptStore, RecipeStore};
    use crate::types::{CategoryHierarchy, CategoryKey, Product, PromptBlock};

    struct Fixture {
        scheduler: Scheduler,
        db: SharedDatabase,
        handler: Arc<RecordingHandler>,
    }

    fn fixture(analysis: AnalysisConfig, config: SchedulerConfig) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let tracker = Arc::new(CategoryTracker::new(db.clone(), handler.clone()));
        let client = Arc::new(GenerationClient::new(
            Arc::new(ScriptedProvider::always("a".repeat(250))),
            SamplingParams::default(),
        ));
        let executor = Arc::new(AnalysisExecutor::new(
            db.clone(),
            client,
            tracker.clone(),
            analysis,
        ));

        Fixture {
            scheduler: Scheduler::new(db.clone(), executor, tracker, config),
            db,
            handler,
        }
    }

    /// Wired like the engine: the recipe generator handles drained categories
    fn recipe_fixture(
        analysis: AnalysisConfig,
        completion: CompletionConfig,
        config: SchedulerConfig,
    ) -> (Scheduler, SharedDatabase) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();

        let client = Arc::new(GenerationClient::new(
            Arc::new(ScriptedProvider::always("a".repeat(250))),
            SamplingParams::default(),
        ));
        let generator = Arc::new(MasterRecipeGenerator::new(
            db.clone(),
            client.clone(),
            completion,
            analysis.clone(),
        ));
        let tracker = Arc::new(CategoryTracker::new(db.clone(), generator));
        let executor = Arc::new(AnalysisExecutor::new(
            db.clone(),
            client,
            tracker.clone(),
            analysis,
        ));
        (Scheduler::new(db.clone(), executor, tracker, config), db)
    }

    fn with_master_prompts(db: &Database) {
        let prompts = PromptStore::new(db);
        for block in prompts
            .active_blocks(prompt_category::COMPETITOR_ANALYSIS, 100)
            .unwrap()
        {
            prompts
                .upsert(&block.with_master_recipe_prompt("Summarize"))
                .unwrap();
        }
    }

    fn fast() -> Fixture {
        fixture(
            AnalysisConfig {
                batch_interval_ms: 1,
                ..AnalysisConfig::default()
            },
            SchedulerConfig {
                task_timeout_secs: 5,
                idle_timeout_secs: 1,
            },
        )
    }

    fn seed(db: &Database, products: &[&str], blocks: usize) {
        for id in products {
            let product = Product::new(
                *id,
                "u1",
                "Mug",
                Some(CategoryHierarchy::new("Home", &["Kitchen"])),
            );
            ProductStore::new(db).upsert(&product).unwrap();
        }
        for i in 0..blocks {
            let block = PromptBlock::new(
                format!("b{}", i),
                prompt_category::COMPETITOR_ANALYSIS,
                format!("Block {}", i),
                "Analyze",
            );
            PromptStore::new(db).upsert(&block).unwrap();
        }
    }

    #[tokio::test]
    async fn test_tasks_run_and_report_success() {
        let f = fast();
        seed(&f.db, &["p1"], 3);

        let task_id = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();

        let status = f.scheduler.get_status(&task_id).unwrap().unwrap();
        assert_eq!(status.product_id, "p1");

        f.scheduler.drain().await;

        let status = f.scheduler.get_status(&task_id).unwrap().unwrap();
        assert!(status.executed);
        assert_eq!(status.success, Some(true));
        assert!(status.error.is_none());
        assert_eq!(AnalysisStore::new(&f.db).for_product("p1").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_status_eventually_executed() {
        let f = fast();
        seed(&f.db, &["p1"], 1);

        let task_id = f
            .scheduler
            .schedule_competitor_analysis("p1", "u1", "proj", Duration::from_millis(20))
            .await
            .unwrap();

        let executed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let task = f.scheduler.get_status(&task_id).unwrap().unwrap();
                if task.executed {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(executed.task_type, TaskType::CompetitorAnalysis);
        assert_eq!(executed.success, Some(true));
    }

    #[tokio::test]
    async fn test_same_product_twice_gets_independent_tasks() {
        let f = fast();
        seed(&f.db, &["p1"], 2);

        let first = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        let second = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        assert_ne!(first, second);

        f.scheduler.drain().await;

        assert_eq!(AnalysisStore::new(&f.db).for_product("p1").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_due_order_wins_over_submission_order() {
        let f = fast();
        seed(&f.db, &["late", "early"], 1);

        let late = f
            .scheduler
            .schedule("late", "u1", "proj", Duration::from_millis(200), TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        let early = f
            .scheduler
            .schedule("early", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();

        f.scheduler.drain().await;

        let late = f.scheduler.get_status(&late).unwrap().unwrap();
        let early = f.scheduler.get_status(&early).unwrap().unwrap();
        assert!(early.completed_at.unwrap() < late.completed_at.unwrap());
    }

    #[tokio::test]
    async fn test_category_drains_once_for_many_products() {
        let f = fast();
        seed(&f.db, &["p1", "p2", "p3"], 1);

        for id in ["p1", "p2", "p3"] {
            f.scheduler
                .schedule(id, "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
                .await
                .unwrap();
        }
        f.scheduler.drain().await;

        let calls = f.handler.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(CategoryKey::new("Home", "Kitchen"), "u1".to_string())]);
    }

    #[tokio::test]
    async fn test_prompt_block_rules() {
        let f = fast();

        let missing = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::MarketResearch, None)
            .await;
        assert!(matches!(missing, Err(ForgeError::Validation(_))));

        let unexpected = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, Some("b1"))
            .await;
        assert!(matches!(unexpected, Err(ForgeError::Validation(_))));
        assert_eq!(f.scheduler.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_records_error_and_worker_continues() {
        let f = fast();
        seed(&f.db, &["p2"], 1);

        let bad = f
            .scheduler
            .schedule("ghost", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        let good = f
            .scheduler
            .schedule("p2", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        f.scheduler.drain().await;

        let bad = f.scheduler.get_status(&bad).unwrap().unwrap();
        assert!(bad.executed);
        assert_eq!(bad.success, Some(false));
        assert!(bad.error.unwrap().contains("not found"));

        let good = f.scheduler.get_status(&good).unwrap().unwrap();
        assert_eq!(good.success, Some(true));
    }

    #[tokio::test]
    async fn test_timeout_fails_task_without_partial_recipe() {
        let (scheduler, db) = recipe_fixture(
            AnalysisConfig {
                batch_size: 1,
                batch_interval_ms: 10_000,
                ..AnalysisConfig::default()
            },
            CompletionConfig {
                poll_interval_ms: 10,
                max_wait_ms: 80,
            },
            SchedulerConfig {
                task_timeout_secs: 1,
                idle_timeout_secs: 1,
            },
        );
        seed(&db, &["p1"], 2);
        with_master_prompts(&db);

        let task_id = scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        scheduler.drain().await;

        let task = scheduler.get_status(&task_id).unwrap().unwrap();
        assert_eq!(task.success, Some(false));
        assert!(task.error.unwrap().contains("Timeout"));
        // First batch persisted before the timeout fired
        assert_eq!(AnalysisStore::new(&db).for_product("p1").unwrap().len(), 1);
        assert_eq!(RecipeStore::new(&db).count(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_competitor_run_marks_product_failed() {
        let f = fixture(
            AnalysisConfig {
                batch_size: 1,
                batch_interval_ms: 10_000,
                ..AnalysisConfig::default()
            },
            SchedulerConfig {
                task_timeout_secs: 1,
                idle_timeout_secs: 1,
            },
        );
        seed(&f.db, &["p1"], 2);

        f.scheduler
            .schedule_competitor_analysis("p1", "u1", "proj", Duration::ZERO)
            .await
            .unwrap();
        f.scheduler.drain().await;

        let product = ProductStore::new(&f.db).get("p1").unwrap().unwrap();
        assert_eq!(product.analysis_status, Some(AnalysisStatus::Failed));
        assert!(product.analysis_error.unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_slow_completion_check_does_not_fail_task() {
        let (scheduler, db) = recipe_fixture(
            AnalysisConfig {
                batch_interval_ms: 1,
                ..AnalysisConfig::default()
            },
            CompletionConfig {
                poll_interval_ms: 50,
                max_wait_ms: 2_500,
            },
            SchedulerConfig {
                task_timeout_secs: 1,
                idle_timeout_secs: 1,
            },
        );
        // p2 is never scheduled, so the completion wait runs its full bound
        seed(&db, &["p1", "p2"], 2);
        with_master_prompts(&db);

        let task_id = scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        scheduler.drain().await;

        let task = scheduler.get_status(&task_id).unwrap().unwrap();
        assert_eq!(task.success, Some(true));
        assert!(task.error.is_none());
        assert_eq!(AnalysisStore::new(&db).for_product("p1").unwrap().len(), 2);
        assert_eq!(RecipeStore::new(&db).count(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_survives_in_persisted_mirror() {
        let f = fast();
        seed(&f.db, &["p1"], 1);

        let task_id = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        f.scheduler.drain().await;

        let persisted = TaskStore::new(&f.db).get(&task_id).unwrap().unwrap();
        assert!(persisted.executed);
        assert!(f.scheduler.get_status("0_nothing_0").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_tasks() {
        let f = fast();
        f.scheduler.shutdown();

        let result = f
            .scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await;
        assert!(matches!(result, Err(ForgeError::SchedulerClosed)));
    }

    #[tokio::test]
    async fn test_worker_restarts_after_idle_exit() {
        let f = fast();
        seed(&f.db, &["p1", "p2"], 1);

        f.scheduler
            .schedule("p1", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.scheduler.is_running() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap();

        let task_id = f
            .scheduler
            .schedule("p2", "u1", "proj", Duration::ZERO, TaskType::StandardAnalysis, None)
            .await
            .unwrap();
        f.scheduler.drain().await;

        let task = f.scheduler.get_status(&task_id).unwrap().unwrap();
        assert_eq!(task.success, Some(true));
    }
}
