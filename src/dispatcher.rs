// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Plugin Dispatcher
 * Consumer loop feeding discovery plugins and routing what they find
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupEngine;
use crate::errors::ScannerError;
use crate::knowledge::{ExceptionSink, KnowledgeSink};
use crate::plugin::{DiscoverOutcome, DiscoveryPlugin, PluginOutput};
use crate::queue::{QueueHandle, WorkItem};
use crate::request::DiscoveryRequest;
use crate::scan_context::ScanContext;
use crate::status::ScanStatus;

/// Input queue poll timeout; keeps the loop responsive to pause/stop
/// between items
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(200);

const PHASE_NAME: &str = "crawl";

struct RegisteredPlugin {
    plugin: Arc<dyn DiscoveryPlugin>,
    output: PluginOutput,
    results: mpsc::UnboundedReceiver<DiscoveryRequest>,
    disabled: bool,
    ended: bool,
}

enum TaskOutcome {
    Completed,
    /// Stop flag or time budget hit before the plugin ran; the task still
    /// counts as complete
    Skipped,
    /// Run-once signal
    Exhausted,
    /// Contract violation: results returned instead of emitted
    Inline(usize),
    Failed(ScannerError),
}

struct TaskCompletion {
    plugin_idx: usize,
    request: DiscoveryRequest,
    outcome: TaskOutcome,
}

/// What the discovery phase found, reported once the sentinel has been
/// processed.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySummary {
    pub urls: Vec<String>,
    pub fuzzable_requests: Vec<String>,
}

/// Consumer that takes discovery requests from the input queue, fans each
/// one out to all enabled plugins on a bounded worker pool, filters what
/// they emit through the dedup engine, feeds confirmed-new requests back
/// into the queue and forwards them downstream exactly once.
pub struct PluginDispatcher {
    plugins: Vec<RegisteredPlugin>,
    context: Arc<ScanContext>,
    status: Arc<ScanStatus>,
    knowledge: Arc<dyn KnowledgeSink>,
    exceptions: Arc<dyn ExceptionSink>,
    dedup: DedupEngine,
    in_tx: mpsc::UnboundedSender<WorkItem>,
    in_rx: mpsc::UnboundedReceiver<WorkItem>,
    out_tx: mpsc::UnboundedSender<WorkItem>,
    out_rx: Option<mpsc::UnboundedReceiver<WorkItem>>,
    workers: Arc<Semaphore>,
    tasks: JoinSet<TaskCompletion>,
}

impl PluginDispatcher {
    pub fn new(
        plugins: Vec<Arc<dyn DiscoveryPlugin>>,
        context: Arc<ScanContext>,
        status: Arc<ScanStatus>,
        knowledge: Arc<dyn KnowledgeSink>,
        exceptions: Arc<dyn ExceptionSink>,
    ) -> Self {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let plugins = plugins
            .into_iter()
            .map(|plugin| {
                let (output, results) = PluginOutput::channel();
                RegisteredPlugin {
                    plugin,
                    output,
                    results,
                    disabled: false,
                    ended: false,
                }
            })
            .collect();

        let workers = Arc::new(Semaphore::new(context.config().worker_pool_size));
        let dedup = DedupEngine::new(context.clone());

        Self {
            plugins,
            context,
            status,
            knowledge,
            exceptions,
            dedup,
            in_tx,
            in_rx,
            out_tx,
            out_rx: Some(out_rx),
            workers,
            tasks: JoinSet::new(),
        }
    }

    /// Producer handle for seeding requests and enqueueing the sentinel.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle::new(self.in_tx.clone())
    }

    /// Downstream consumer queue; the sentinel is forwarded on it exactly
    /// once when the input sentinel is processed. Can be taken once.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<WorkItem>> {
        self.out_rx.take()
    }

    /// Consume queue items until the shutdown sentinel arrives, then run
    /// the shutdown protocol and report the summary.
    pub async fn run(mut self) -> DiscoverySummary {
        self.status.set_phase(PHASE_NAME);

        loop {
            let polled = tokio::time::timeout(QUEUE_POLL_INTERVAL, self.in_rx.recv()).await;
            match polled {
                Ok(Some(WorkItem::Request(request))) => self.consume(request).await,
                Ok(Some(WorkItem::PoisonPill)) | Ok(None) => {
                    self.shutdown().await;
                    break;
                }
                // Poll timeout: fall through to reap/route so the loop
                // stays live while plugins are still working
                Err(_) => {}
            }

            self.reap_finished().await;
            self.route_all_results();
        }

        self.summary()
    }

    /// Fan one request out to every enabled plugin, draining all output
    /// channels after each submission to bound queue growth.
    async fn consume(&mut self, request: DiscoveryRequest) {
        for idx in 0..self.plugins.len() {
            if self.plugins[idx].disabled {
                continue;
            }
            self.submit(idx, request.clone());
            self.reap_finished().await;
            self.route_all_results();
        }
    }

    /// Fire-and-forget submission; the semaphore bounds how many plugin
    /// invocations actually run at once.
    fn submit(&mut self, plugin_idx: usize, request: DiscoveryRequest) {
        let entry = &self.plugins[plugin_idx];
        let plugin = entry.plugin.clone();
        let output = entry.output.clone();
        let status = self.status.clone();
        let workers = self.workers.clone();
        let budget = Duration::from_secs(self.context.config().max_discovery_time_secs);

        self.tasks.spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return TaskCompletion {
                        plugin_idx,
                        request,
                        outcome: TaskOutcome::Skipped,
                    }
                }
            };

            // Stop/time-budget guard: return an empty result without
            // invoking the plugin, but still complete the task
            if status.is_stopped() {
                debug!(plugin = plugin.name(), "skipping work, stop requested");
                return TaskCompletion {
                    plugin_idx,
                    request,
                    outcome: TaskOutcome::Skipped,
                };
            }
            if status.run_time() > budget {
                info!("Maximum crawl time limit hit.");
                return TaskCompletion {
                    plugin_idx,
                    request,
                    outcome: TaskOutcome::Skipped,
                };
            }

            status.set_phase(PHASE_NAME);
            status.set_running_plugin(plugin.name());
            status.set_current_request(&request);
            debug!(plugin = plugin.name(), request = %request, "plugin is testing");

            let outcome = match plugin.discover(&request, &output).await {
                Ok(DiscoverOutcome::Done) => TaskOutcome::Completed,
                Ok(DiscoverOutcome::Exhausted) => TaskOutcome::Exhausted,
                Ok(DiscoverOutcome::Inline(results)) => TaskOutcome::Inline(results.len()),
                Err(err) => TaskOutcome::Failed(err),
            };

            TaskCompletion {
                plugin_idx,
                request,
                outcome,
            }
        });
    }

    /// Collect every finished task without blocking.
    async fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            match joined {
                Ok(completion) => self.handle_completion(completion).await,
                Err(join_err) => error!(error = %join_err, "discovery task panicked"),
            }
        }
    }

    /// The per-task completion callback: account progress, react to the
    /// outcome, then route that plugin's pending results.
    async fn handle_completion(&mut self, completion: TaskCompletion) {
        self.status.inc_progress();

        let idx = completion.plugin_idx;
        let name = self.plugins[idx].plugin.name().to_string();
        let plugin_type = self.plugins[idx].plugin.plugin_type();

        match completion.outcome {
            TaskOutcome::Completed | TaskOutcome::Skipped => {}
            TaskOutcome::Exhausted => self.disable_plugin(idx).await,
            TaskOutcome::Inline(count) => {
                warn!(
                    plugin = %name,
                    results = count,
                    "plugin returned results inline instead of using its output channel"
                );
                let defect = ScannerError::PluginContract {
                    plugin: name.clone(),
                };
                self.exceptions
                    .record(plugin_type, &name, &completion.request, &defect);
            }
            TaskOutcome::Failed(err) => {
                warn!(
                    plugin = %name,
                    request = %completion.request,
                    error = %err,
                    "exception while running plugin, continuing scan"
                );
                self.exceptions
                    .record(plugin_type, &name, &completion.request, &err);
            }
        }

        self.route_plugin_results(idx);
    }

    /// Disable a run-once plugin and invoke its teardown exactly once.
    /// Not an error.
    async fn disable_plugin(&mut self, idx: usize) {
        if self.plugins[idx].disabled {
            return;
        }
        self.plugins[idx].disabled = true;
        debug!(
            plugin = self.plugins[idx].plugin.name(),
            "plugin won't be run anymore this scan"
        );
        self.teardown_plugin(idx).await;
    }

    async fn teardown_plugin(&mut self, idx: usize) {
        if self.plugins[idx].ended {
            return;
        }
        self.plugins[idx].ended = true;

        let plugin = self.plugins[idx].plugin.clone();
        if let Err(err) = plugin.end().await {
            error!(
                plugin = plugin.name(),
                error = %err,
                "plugin raised an exception in its end() hook"
            );
        }
    }

    fn route_all_results(&mut self) {
        for idx in 0..self.plugins.len() {
            self.route_plugin_results(idx);
        }
    }

    /// Drain one plugin's output channel, accepting genuinely new requests
    /// into the knowledge record, the input queue (breadth-first recursion)
    /// and the downstream queue.
    fn route_plugin_results(&mut self, idx: usize) {
        loop {
            let mut request = match self.plugins[idx].results.try_recv() {
                Ok(request) => request,
                Err(_) => break,
            };

            if self.dedup.accept(&mut request) {
                info!(
                    plugin = self.plugins[idx].plugin.name(),
                    url = %request.url(),
                    "new URL found"
                );
                self.knowledge.record(&request);
                let _ = self.in_tx.send(WorkItem::Request(request.clone()));
                let _ = self.out_tx.send(WorkItem::Request(request));
            }
        }
    }

    /// Shutdown protocol: no new submissions, wait for every in-flight
    /// task, drain all outputs, tear down still-enabled plugins and
    /// forward exactly one sentinel downstream. Nothing is dropped.
    async fn shutdown(&mut self) {
        debug!("shutdown sentinel received, draining in-flight discovery tasks");

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(completion) => self.handle_completion(completion).await,
                Err(join_err) => error!(error = %join_err, "discovery task panicked"),
            }
        }
        self.route_all_results();

        for idx in 0..self.plugins.len() {
            if !self.plugins[idx].disabled {
                self.teardown_plugin(idx).await;
            }
        }

        let _ = self.out_tx.send(WorkItem::PoisonPill);
        debug!("discovery consumer finished");
    }

    /// Report identified URLs and fuzzable requests once the crawl phase
    /// is over.
    fn summary(&self) -> DiscoverySummary {
        let fuzzable = self.knowledge.fuzzable_requests();
        if fuzzable.is_empty() {
            info!("No URLs found during crawl phase.");
            return DiscoverySummary::default();
        }

        let mut urls = self.knowledge.urls();
        urls.sort();
        urls.dedup();

        let mut fuzzable: Vec<String> = fuzzable.iter().map(|fr| fr.to_string()).collect();
        fuzzable.sort();

        info!(
            "Found {} URLs and {} different points of injection.",
            urls.len(),
            fuzzable.len()
        );
        for url in &urls {
            info!("- {url}");
        }

        DiscoverySummary {
            urls,
            fuzzable_requests: fuzzable,
        }
    }
}
