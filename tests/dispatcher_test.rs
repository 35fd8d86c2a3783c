// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Plugin Dispatcher Tests
 * End-to-end discovery loop: routing, dedup, shutdown, plugin lifecycle
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use luotain_scanner::dispatcher::PluginDispatcher;
use luotain_scanner::errors::{ScannerError, ScannerResult};
use luotain_scanner::knowledge::{ExceptionSink, InMemoryKnowledge, KnowledgeSink};
use luotain_scanner::plugin::{DiscoverOutcome, DiscoveryPlugin, PluginOutput, PluginType};
use luotain_scanner::queue::{QueueHandle, WorkItem};
use luotain_scanner::request::{DiscoveryRequest, HttpMethod};
use luotain_scanner::scan_context::{DiscoveryConfig, ScanContext};
use luotain_scanner::status::ScanStatus;

fn get(url: &str) -> DiscoveryRequest {
    DiscoveryRequest::parse(HttpMethod::Get, url).unwrap()
}

fn context() -> Arc<ScanContext> {
    Arc::new(
        ScanContext::new(
            vec![Url::parse("http://host.tld/").unwrap()],
            vec![],
            DiscoveryConfig::default(),
        )
        .unwrap(),
    )
}

/// Emits a fixed set of children for each URL it is handed.
struct MapPlugin {
    name: String,
    edges: HashMap<String, Vec<String>>,
    calls: Arc<AtomicU32>,
}

impl MapPlugin {
    fn new(name: &str, edges: &[(&str, &[&str])]) -> Self {
        Self {
            name: name.to_string(),
            edges: edges
                .iter()
                .map(|(from, to)| {
                    (
                        from.to_string(),
                        to.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl DiscoveryPlugin for MapPlugin {
    async fn discover(
        &self,
        request: &DiscoveryRequest,
        out: &PluginOutput,
    ) -> ScannerResult<DiscoverOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(children) = self.edges.get(request.url().as_str()) {
            for child in children {
                out.emit(get(child));
            }
        }
        Ok(DiscoverOutcome::Done)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Crawl
    }
}

struct RunOncePlugin {
    calls: Arc<AtomicU32>,
    ends: Arc<AtomicU32>,
}

#[async_trait]
impl DiscoveryPlugin for RunOncePlugin {
    async fn discover(
        &self,
        _request: &DiscoveryRequest,
        out: &PluginOutput,
    ) -> ScannerResult<DiscoverOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        out.emit(get("http://host.tld/once"));
        Ok(DiscoverOutcome::Exhausted)
    }

    async fn end(&self) -> ScannerResult<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "run_once"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Infrastructure
    }
}

struct FailingPlugin {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl DiscoveryPlugin for FailingPlugin {
    async fn discover(
        &self,
        _request: &DiscoveryRequest,
        _out: &PluginOutput,
    ) -> ScannerResult<DiscoverOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ScannerError::General("deliberate failure".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Crawl
    }
}

/// Violates the output contract by returning its findings.
struct InlinePlugin;

#[async_trait]
impl DiscoveryPlugin for InlinePlugin {
    async fn discover(
        &self,
        _request: &DiscoveryRequest,
        _out: &PluginOutput,
    ) -> ScannerResult<DiscoverOutcome> {
        Ok(DiscoverOutcome::Inline(vec![get("http://host.tld/leaked")]))
    }

    fn name(&self) -> &str {
        "inline"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Crawl
    }
}

struct SlowEmitPlugin;

#[async_trait]
impl DiscoveryPlugin for SlowEmitPlugin {
    async fn discover(
        &self,
        _request: &DiscoveryRequest,
        out: &PluginOutput,
    ) -> ScannerResult<DiscoverOutcome> {
        tokio::time::sleep(Duration::from_millis(400)).await;
        out.emit(get("http://host.tld/late"));
        Ok(DiscoverOutcome::Done)
    }

    fn name(&self) -> &str {
        "slow_emit"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Crawl
    }
}

#[derive(Default)]
struct CollectingExceptionSink {
    records: Mutex<Vec<(String, String)>>,
}

impl ExceptionSink for CollectingExceptionSink {
    fn record(
        &self,
        _plugin_type: PluginType,
        plugin_name: &str,
        _request: &DiscoveryRequest,
        error: &ScannerError,
    ) {
        self.records
            .lock()
            .push((plugin_name.to_string(), error.to_string()));
    }
}

struct Harness {
    handle: QueueHandle,
    out_rx: mpsc::UnboundedReceiver<WorkItem>,
    runner: tokio::task::JoinHandle<luotain_scanner::DiscoverySummary>,
    knowledge: Arc<InMemoryKnowledge>,
    exceptions: Arc<CollectingExceptionSink>,
    status: Arc<ScanStatus>,
}

fn start(plugins: Vec<Arc<dyn DiscoveryPlugin>>) -> Harness {
    start_with_status(plugins, Arc::new(ScanStatus::new()), context())
}

fn start_with_status(
    plugins: Vec<Arc<dyn DiscoveryPlugin>>,
    status: Arc<ScanStatus>,
    context: Arc<ScanContext>,
) -> Harness {
    let knowledge = Arc::new(InMemoryKnowledge::new());
    let exceptions = Arc::new(CollectingExceptionSink::default());

    let knowledge_sink: Arc<dyn KnowledgeSink> = knowledge.clone();
    let exception_sink: Arc<dyn ExceptionSink> = exceptions.clone();
    let mut dispatcher = PluginDispatcher::new(
        plugins,
        context,
        status.clone(),
        knowledge_sink,
        exception_sink,
    );
    let handle = dispatcher.handle();
    let out_rx = dispatcher.take_output().unwrap();
    let runner = tokio::spawn(dispatcher.run());

    Harness {
        handle,
        out_rx,
        runner,
        knowledge,
        exceptions,
        status,
    }
}

/// Read downstream items until the flow goes quiet, then poison and keep
/// reading until the sentinel arrives. Returns the forwarded requests.
async fn drain_downstream(harness: &mut Harness) -> Vec<DiscoveryRequest> {
    let mut found = Vec::new();
    let mut poisoned = false;
    loop {
        match tokio::time::timeout(Duration::from_millis(600), harness.out_rx.recv()).await {
            Ok(Some(WorkItem::Request(request))) => found.push(request),
            Ok(Some(WorkItem::PoisonPill)) => break,
            Ok(None) => break,
            Err(_) => {
                if !poisoned {
                    harness.handle.poison();
                    poisoned = true;
                }
            }
        }
    }
    found
}

#[tokio::test]
async fn test_breadth_first_expansion_reaches_fixed_point() {
    let plugin = Arc::new(MapPlugin::new(
        "spider",
        &[
            (
                "http://host.tld/",
                &["http://host.tld/a?id=1", "http://host.tld/b"][..],
            ),
            ("http://host.tld/a?id=1", &["http://host.tld/c"][..]),
        ],
    ));
    let calls = plugin.calls.clone();

    let mut harness = start(vec![plugin]);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    let summary = harness.runner.await.unwrap();

    let mut urls: Vec<String> = found.iter().map(|r| r.normalized_url()).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://host.tld/a?id=1".to_string(),
            "http://host.tld/b".to_string(),
            "http://host.tld/c".to_string(),
        ]
    );

    // Seed plus the three discoveries were each dispatched once
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(harness.knowledge.len(), 3);
    assert_eq!(summary.urls.len(), 3);
    assert!(summary.urls.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_cross_plugin_rediscovery_forwarded_once() {
    let first = Arc::new(MapPlugin::new(
        "first",
        &[("http://host.tld/", &["http://host.tld/shared"][..])],
    ));
    let second = Arc::new(MapPlugin::new(
        "second",
        &[("http://host.tld/", &["http://host.tld/shared"][..])],
    ));

    let mut harness = start(vec![first, second]);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    harness.runner.await.unwrap();

    assert_eq!(found.len(), 1, "rediscovered URL must be forwarded exactly once");
    assert_eq!(found[0].normalized_url(), "http://host.tld/shared");
    assert_eq!(harness.knowledge.len(), 1);
}

#[tokio::test]
async fn test_run_once_plugin_disabled_and_ended_exactly_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let ends = Arc::new(AtomicU32::new(0));
    let plugin = Arc::new(RunOncePlugin {
        calls: calls.clone(),
        ends: ends.clone(),
    });

    let mut harness = start(vec![plugin]);
    harness.handle.push(get("http://host.tld/"));

    // Let the run-once signal land before feeding more work
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.handle.push(get("http://host.tld/two"));
    harness.handle.push(get("http://host.tld/three"));

    let found = drain_downstream(&mut harness).await;
    harness.runner.await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "disabled plugin must not run again");
    assert_eq!(ends.load(Ordering::SeqCst), 1, "end() must be invoked exactly once");
    // What it emitted before exhausting still flows downstream
    assert_eq!(found.len(), 1);
    assert!(harness.exceptions.records.lock().is_empty());
}

#[tokio::test]
async fn test_plugin_failure_is_isolated() {
    let failing_calls = Arc::new(AtomicU32::new(0));
    let failing = Arc::new(FailingPlugin {
        calls: failing_calls.clone(),
    });
    let spider = Arc::new(MapPlugin::new(
        "spider",
        &[("http://host.tld/", &["http://host.tld/found"][..])],
    ));

    let mut harness = start(vec![failing, spider]);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    harness.runner.await.unwrap();

    assert_eq!(found.len(), 1, "healthy plugin results survive a failing peer");

    // One failure per dispatched request: the seed and the discovery
    assert_eq!(failing_calls.load(Ordering::SeqCst), 2);
    let records = harness.exceptions.records.lock();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|(name, _)| name == "failing"));
}

#[tokio::test]
async fn test_inline_results_reported_as_defect_and_dropped() {
    let mut harness = start(vec![Arc::new(InlinePlugin)]);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    let summary = harness.runner.await.unwrap();

    assert!(found.is_empty(), "inline results must not be routed");
    assert!(summary.urls.is_empty());

    let records = harness.exceptions.records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "inline");
    assert!(records[0].1.contains("output channel"));
}

#[tokio::test]
async fn test_sentinel_waits_for_inflight_tasks() {
    let mut harness = start(vec![Arc::new(SlowEmitPlugin)]);
    harness.handle.push(get("http://host.tld/"));
    // Poison immediately: the in-flight discover() must still complete and
    // its result must be forwarded before the sentinel
    harness.handle.poison();

    let mut sequence = Vec::new();
    while let Some(item) = harness.out_rx.recv().await {
        match item {
            WorkItem::Request(request) => sequence.push(request.normalized_url()),
            WorkItem::PoisonPill => {
                sequence.push("<pill>".to_string());
                break;
            }
        }
    }
    harness.runner.await.unwrap();

    assert_eq!(
        sequence,
        vec!["http://host.tld/late".to_string(), "<pill>".to_string()]
    );
    // Channel closes after the dispatcher returns; no second sentinel
    assert!(harness.out_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_time_budget_skips_plugin_invocation() {
    let plugin = Arc::new(MapPlugin::new(
        "spider",
        &[("http://host.tld/", &["http://host.tld/found"][..])],
    ));
    let calls = plugin.calls.clone();

    let config = DiscoveryConfig {
        max_discovery_time_secs: 1,
        ..DiscoveryConfig::default()
    };
    let context = Arc::new(
        ScanContext::new(vec![Url::parse("http://host.tld/").unwrap()], vec![], config).unwrap(),
    );
    let status = Arc::new(ScanStatus::new());
    // Burn through the discovery budget before seeding
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let mut harness = start_with_status(vec![plugin], status.clone(), context);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    let summary = harness.runner.await.unwrap();

    assert!(found.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0, "plugin must not be invoked past the budget");
    assert!(summary.urls.is_empty());
    // The skipped task still counts as completed work
    assert_eq!(status.progress(), 1);
}

#[tokio::test]
async fn test_stop_request_skips_plugin_invocation() {
    let plugin = Arc::new(MapPlugin::new(
        "spider",
        &[("http://host.tld/", &["http://host.tld/found"][..])],
    ));
    let calls = plugin.calls.clone();

    let status = Arc::new(ScanStatus::new());
    status.stop();

    let mut harness = start_with_status(vec![plugin], status, context());
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    harness.runner.await.unwrap();

    assert!(found.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_out_of_scope_discoveries_are_dropped() {
    let plugin = Arc::new(MapPlugin::new(
        "spider",
        &[(
            "http://host.tld/",
            &["http://evil.tld/x", "http://host.tld/ok"][..],
        )],
    ));

    let mut harness = start(vec![plugin]);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    harness.runner.await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].normalized_url(), "http://host.tld/ok");
    assert_eq!(harness.knowledge.len(), 1);
}

#[tokio::test]
async fn test_empty_run_reports_no_urls() {
    let plugin = Arc::new(MapPlugin::new("spider", &[]));

    let mut harness = start(vec![plugin]);
    harness.handle.push(get("http://host.tld/"));

    let found = drain_downstream(&mut harness).await;
    let summary = harness.runner.await.unwrap();

    assert!(found.is_empty());
    assert!(summary.urls.is_empty());
    assert!(summary.fuzzable_requests.is_empty());
}

#[tokio::test]
async fn test_status_reflects_running_plugin() {
    let plugin = Arc::new(MapPlugin::new(
        "spider",
        &[("http://host.tld/", &["http://host.tld/found"][..])],
    ));

    let mut harness = start(vec![plugin]);
    harness.handle.push(get("http://host.tld/"));

    let _ = drain_downstream(&mut harness).await;
    harness.runner.await.unwrap();

    assert_eq!(harness.status.phase(), "crawl");
    assert_eq!(harness.status.running_plugin(), "spider");
    assert!(harness.status.current_request().is_some());
    assert!(harness.status.progress() >= 2);
}
