//! Start/stop lifecycle of a remote collection job and the poll loop that
//! renders its snapshots into the log view.

use crate::client::{CollectionRequest, ControlApi, parse_interval};
use crate::log_view::LogView;
use crate::output::EntrySink;
use crate::render::{LogEntry, render_snapshot};
use crate::snapshot::PollSnapshot;
use chrono::{Local, NaiveTime};
use futures::StreamExt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_stream::wrappers::IntervalStream;

/// Period of the poll loop. Independent of the interval sent to the server.
pub const POLL_PERIOD: Duration = Duration::from_millis(2000);

pub const STARTED_MESSAGE: &str = "Data collection started successfully...";
pub const STOPPED_MESSAGE: &str = "Data collection stopped.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionPhase {
    Idle,
    Collecting,
}

/// Enabled state of the start and stop controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl Affordances {
    pub const IDLE: Self = Self {
        start_enabled: true,
        stop_enabled: false,
    };
    pub const COLLECTING: Self = Self {
        start_enabled: false,
        stop_enabled: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelStatus {
    pub phase: CollectionPhase,
    pub affordances: Affordances,
    pub entries: usize,
}

/// Raw form fields as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionForm {
    pub target_url: String,
    pub interval: String,
}

impl CollectionForm {
    pub fn new(target_url: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            interval: interval.into(),
        }
    }

    pub fn to_request(&self) -> CollectionRequest {
        CollectionRequest::new(self.target_url.clone(), parse_interval(&self.interval))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Submit(CollectionForm),
    StopClicked,
}

#[derive(Default)]
struct CollectionState {
    active: bool,
    timer: Option<JoinHandle<()>>,
}

struct Panel {
    state: CollectionState,
    affordances: Affordances,
    log: LogView,
}

impl Panel {
    fn status(&self) -> PanelStatus {
        PanelStatus {
            phase: if self.state.active {
                CollectionPhase::Collecting
            } else {
                CollectionPhase::Idle
            },
            affordances: self.affordances,
            entries: self.log.len(),
        }
    }
}

struct Shared {
    panel: Mutex<Panel>,
    sink: Option<Arc<dyn EntrySink>>,
    status_watcher: watch::Sender<PanelStatus>,
}

impl Shared {
    async fn prepend(&self, block: Vec<LogEntry>) {
        let mut panel = self.panel.lock().await;
        if let Some(sink) = &self.sink {
            for entry in &block {
                if let Err(e) = sink.write(entry) {
                    log::warn!("Failed to write log entry: {}", e);
                }
            }
        }
        let evicted = panel.log.prepend_block(block);
        if !evicted.is_empty() {
            log::trace!("Evicted {} log entries", evicted.len());
        }
        self.status_watcher.send_replace(panel.status());
    }

    async fn append_status(&self, message: String) {
        self.prepend(vec![LogEntry::status(message, now())]).await;
    }

    async fn display_snapshot(&self, snapshot: &PollSnapshot) {
        self.prepend(render_snapshot(snapshot, now())).await;
    }
}

fn now() -> NaiveTime {
    Local::now().time()
}

/// Drives one collection job on a remote service.
///
/// Cloning yields another handle to the same panel.
#[derive(Clone)]
pub struct CollectionController {
    api: Arc<dyn ControlApi>,
    shared: Arc<Shared>,
}

impl CollectionController {
    pub fn new(api: Arc<dyn ControlApi>) -> Self {
        Self::build(api, None)
    }

    pub fn with_sink(api: Arc<dyn ControlApi>, sink: Arc<dyn EntrySink>) -> Self {
        Self::build(api, Some(sink))
    }

    fn build(api: Arc<dyn ControlApi>, sink: Option<Arc<dyn EntrySink>>) -> Self {
        let panel = Panel {
            state: CollectionState::default(),
            affordances: Affordances::IDLE,
            log: LogView::default(),
        };
        let (status_tx, _) = watch::channel(panel.status());

        Self {
            api,
            shared: Arc::new(Shared {
                panel: Mutex::new(panel),
                sink,
                status_watcher: status_tx,
            }),
        }
    }

    pub async fn handle(&self, event: PanelEvent) {
        match event {
            PanelEvent::Submit(form) => self.start_collection(form.to_request()).await,
            PanelEvent::StopClicked => self.stop_collection().await,
        }
    }

    pub async fn start_collection(&self, request: CollectionRequest) {
        log::info!(
            "Starting collection of {:?} (interval {:?})",
            request.target_url,
            request.interval
        );

        match self.api.start(&request).await {
            Ok(response) if response.is_success() => {
                {
                    let mut panel = self.shared.panel.lock().await;
                    panel.state.active = true;
                    panel.affordances = Affordances::COLLECTING;
                    let timer = self.spawn_poll_loop();
                    if let Some(previous) = panel.state.timer.replace(timer) {
                        previous.abort();
                    }
                }
                self.shared.append_status(STARTED_MESSAGE.to_string()).await;
            }
            Ok(response) => {
                let message = response.message_text();
                log::warn!("Service refused to start: {}", message);
                self.shared.append_status(format!("Error: {}", message)).await;
            }
            Err(e) => {
                log::error!("Start request failed: {}", e);
                self.shared
                    .append_status(format!("Error starting collection: {}", e))
                    .await;
            }
        }
    }

    /// Sends a stop request. Any completed response returns the panel to
    /// idle; the body is never inspected.
    pub async fn stop_collection(&self) {
        match self.api.stop().await {
            Ok(()) => {
                {
                    let mut panel = self.shared.panel.lock().await;
                    panel.state.active = false;
                    panel.affordances = Affordances::IDLE;
                    if let Some(timer) = panel.state.timer.take() {
                        timer.abort();
                    }
                }
                log::info!("Collection stopped");
                self.shared.append_status(STOPPED_MESSAGE.to_string()).await;
            }
            Err(e) => {
                log::error!("Stop request failed: {}", e);
                self.shared
                    .append_status(format!("Error stopping collection: {}", e))
                    .await;
            }
        }
    }

    pub async fn display_snapshot(&self, snapshot: &PollSnapshot) {
        self.shared.display_snapshot(snapshot).await;
    }

    pub async fn append_status(&self, message: impl Into<String>) {
        self.shared.append_status(message.into()).await;
    }

    pub async fn is_active(&self) -> bool {
        self.shared.panel.lock().await.state.active
    }

    pub async fn status(&self) -> PanelStatus {
        self.shared.panel.lock().await.status()
    }

    pub async fn timer_armed(&self) -> bool {
        let panel = self.shared.panel.lock().await;
        panel
            .state
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Newest first.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.shared.panel.lock().await.log.to_vec()
    }

    pub async fn log_html(&self) -> String {
        self.shared.panel.lock().await.log.to_html()
    }

    pub fn watch_status(&self) -> watch::Receiver<PanelStatus> {
        self.shared.status_watcher.subscribe()
    }

    fn spawn_poll_loop(&self) -> JoinHandle<()> {
        let api = self.api.clone();
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + POLL_PERIOD, POLL_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(interval);

            while ticks.next().await.is_some() {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                if !shared.panel.lock().await.state.active {
                    continue;
                }
                log::debug!("Poll tick");
                // Each fetch runs on its own; a slow one does not hold back the next tick.
                tokio::spawn(poll_once(api.clone(), shared));
            }
        })
    }
}

async fn poll_once(api: Arc<dyn ControlApi>, shared: Arc<Shared>) {
    let body = match api.fetch_data().await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Error fetching data: {}", e);
            return;
        }
    };

    match PollSnapshot::from_value(body) {
        Ok(Some(snapshot)) => shared.display_snapshot(&snapshot).await,
        Ok(None) => log::debug!("Empty snapshot, nothing to show"),
        Err(e) => log::warn!("Error fetching data: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StartResponse;
    use crate::error::{Error, Result};
    use crate::log_view::LOG_CAPACITY;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum StartReply {
        Success,
        Refused(&'static str),
        Unreachable,
    }

    struct FakeApi {
        start_reply: StartReply,
        start_delay: Duration,
        stop_fails: bool,
        fetch_delay: Duration,
        data: std::sync::Mutex<VecDeque<Value>>,
        requests: std::sync::Mutex<Vec<CollectionRequest>>,
        stop_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl FakeApi {
        fn new(start_reply: StartReply) -> Self {
            Self {
                start_reply,
                start_delay: Duration::ZERO,
                stop_fails: false,
                fetch_delay: Duration::ZERO,
                data: std::sync::Mutex::new(VecDeque::new()),
                requests: std::sync::Mutex::new(Vec::new()),
                stop_calls: AtomicUsize::new(0),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn with_data(self, bodies: Vec<Value>) -> Self {
            *self.data.lock().unwrap() = bodies.into();
            self
        }

        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ControlApi for FakeApi {
        async fn start(&self, request: &CollectionRequest) -> Result<StartResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if !self.start_delay.is_zero() {
                tokio::time::sleep(self.start_delay).await;
            }
            match self.start_reply {
                StartReply::Success => {
                    Ok(StartResponse::new("success", "Data collection started"))
                }
                StartReply::Refused(message) => Ok(StartResponse::new("error", message)),
                StartReply::Unreachable => Err(Error::Internal("connection refused".into())),
            }
        }

        async fn stop(&self) -> Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.stop_fails {
                Err(Error::Internal("connection reset".into()))
            } else {
                Ok(())
            }
        }

        async fn fetch_data(&self) -> Result<Value> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            Ok(self.data.lock().unwrap().pop_front().unwrap_or_else(|| json!({})))
        }
    }

    fn controller(api: FakeApi) -> (CollectionController, Arc<FakeApi>) {
        let api = Arc::new(api);
        (CollectionController::new(api.clone()), api)
    }

    fn messages(entries: &[LogEntry]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| match e {
                LogEntry::Status { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn request() -> CollectionRequest {
        CollectionRequest::new("http://x", Some(5))
    }

    #[tokio::test(start_paused = true)]
    async fn successful_start_arms_one_timer() {
        let (controller, api) = controller(FakeApi::new(StartReply::Success));
        let mut status_rx = controller.watch_status();

        controller.start_collection(request()).await;

        let status = controller.status().await;
        assert_eq!(status.phase, CollectionPhase::Collecting);
        assert_eq!(status.affordances, Affordances::COLLECTING);
        assert!(controller.timer_armed().await);
        assert_eq!(messages(&controller.entries().await), vec![STARTED_MESSAGE]);
        assert!(status_rx.has_changed().unwrap());
        assert_eq!(status_rx.borrow_and_update().phase, CollectionPhase::Collecting);

        advance(1900).await;
        assert_eq!(api.fetches(), 0);
        advance(200).await;
        assert_eq!(api.fetches(), 1);
        advance(4000).await;
        assert_eq!(api.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_start_stays_idle() {
        let (controller, api) = controller(FakeApi::new(StartReply::Refused("already running")));

        controller.start_collection(request()).await;

        assert!(!controller.is_active().await);
        assert!(!controller.timer_armed().await);
        assert_eq!(controller.status().await.affordances, Affordances::IDLE);
        assert_eq!(
            messages(&controller.entries().await),
            vec!["Error: already running"]
        );
        advance(5000).await;
        assert_eq!(api.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_start_reports_transport_error() {
        let (controller, _api) = controller(FakeApi::new(StartReply::Unreachable));

        controller.start_collection(request()).await;

        assert!(!controller.is_active().await);
        assert_eq!(
            messages(&controller.entries().await),
            vec!["Error starting collection: Internal error: connection refused"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_returns_to_idle_and_disarms_timer() {
        let (controller, api) = controller(FakeApi::new(StartReply::Success));
        controller.start_collection(request()).await;
        advance(2100).await;
        assert_eq!(api.fetches(), 1);

        controller.handle(PanelEvent::StopClicked).await;

        let status = controller.status().await;
        assert_eq!(status.phase, CollectionPhase::Idle);
        assert_eq!(status.affordances, Affordances::IDLE);
        assert!(!controller.timer_armed().await);
        assert_eq!(
            messages(&controller.entries().await),
            vec![STOPPED_MESSAGE, STARTED_MESSAGE]
        );
        advance(10_000).await;
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_still_logs_and_stays_idle() {
        let (controller, api) = controller(FakeApi::new(StartReply::Success));

        controller.stop_collection().await;

        assert_eq!(api.stop_calls.load(Ordering::SeqCst), 1);
        assert!(!controller.is_active().await);
        assert_eq!(messages(&controller.entries().await), vec![STOPPED_MESSAGE]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_stop_keeps_collecting() {
        let mut fake = FakeApi::new(StartReply::Success);
        fake.stop_fails = true;
        let (controller, api) = controller(fake);
        controller.start_collection(request()).await;

        controller.stop_collection().await;

        assert!(controller.is_active().await);
        assert!(controller.timer_armed().await);
        assert_eq!(
            messages(&controller.entries().await)[0],
            "Error stopping collection: Internal error: connection reset"
        );
        advance(2100).await;
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_polls_add_nothing() {
        let bodies = vec![
            json!({}),
            json!({ "visible_data": { "numeric_data": [1, 2, 3] } }),
            json!({}),
            json!({}),
            json!({ "network_data": { "requests": [1] } }),
        ];
        let (controller, api) = controller(FakeApi::new(StartReply::Success).with_data(bodies));
        controller.start_collection(request()).await;

        advance(10_100).await;

        assert_eq!(api.fetches(), 5);
        let entries = controller.entries().await;
        let data_blocks = entries
            .iter()
            .filter(|e| matches!(e, LogEntry::Data { .. }))
            .count();
        assert_eq!(data_blocks, 2);
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn oddly_typed_snapshot_still_renders_a_data_block() {
        let bodies = vec![json!({
            "visible_data": { "numeric_data": [1, 2, 3], "text_content": "abc" },
            "timestamp": "12:00:00"
        })];
        let (controller, _api) = controller(FakeApi::new(StartReply::Success).with_data(bodies));
        controller.start_collection(request()).await;

        advance(2100).await;

        let entries = controller.entries().await;
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            LogEntry::Data { summary, .. } => {
                assert_eq!(summary.numeric_values, "1, 2, 3");
                assert_eq!(summary.text_points, 3);
            }
            other => panic!("expected a data block, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn log_html_lists_newest_entry_first() {
        let (controller, _api) = controller(FakeApi::new(StartReply::Success));
        controller.append_status("first").await;
        controller.append_status("second").await;

        let html = controller.log_html().await;

        let second = html.find("second").unwrap();
        let first = html.find("first").unwrap();
        assert!(second < first);
        assert_eq!(html.matches("<div class=\"data-item\">").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_with_indicators_prepends_data_then_warning() {
        let (controller, _api) = controller(FakeApi::new(StartReply::Success));
        controller.append_status("older").await;

        let snapshot = PollSnapshot::from_value(json!({
            "encryption_analysis": { "encryption_indicators": ["AES", "RSA"] }
        }))
        .unwrap()
        .unwrap();
        controller.display_snapshot(&snapshot).await;

        let entries = controller.entries().await;
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0], LogEntry::Data { .. }));
        assert_eq!(
            entries[1],
            LogEntry::EncryptionWarning {
                indicators: "AES, RSA".into()
            }
        );
        assert_eq!(messages(&entries[2..]), vec!["older"]);
    }

    #[tokio::test(start_paused = true)]
    async fn log_is_capped() {
        let (controller, _api) = controller(FakeApi::new(StartReply::Success));
        let snapshot = PollSnapshot::from_value(json!({
            "encryption_analysis": { "encryption_indicators": ["AES"] }
        }))
        .unwrap()
        .unwrap();

        for n in 0..30 {
            controller.append_status(format!("status {}", n)).await;
            controller.display_snapshot(&snapshot).await;
            assert!(controller.entries().await.len() <= LOG_CAPACITY);
        }

        let entries = controller.entries().await;
        assert_eq!(entries.len(), LOG_CAPACITY);
        assert_eq!(controller.status().await.entries, LOG_CAPACITY);
        assert_eq!(messages(&entries)[0], "status 29");
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_replaces_the_timer() {
        let (controller, api) = controller(FakeApi::new(StartReply::Success));
        controller.start_collection(request()).await;
        controller.start_collection(request()).await;

        advance(6100).await;

        assert_eq!(api.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_forwards_form_and_polls_at_fixed_period() {
        let (controller, api) = controller(FakeApi::new(StartReply::Success));

        controller
            .handle(PanelEvent::Submit(CollectionForm::new("http://x", "5")))
            .await;

        assert_eq!(
            api.requests.lock().unwrap().as_slice(),
            &[CollectionRequest::new("http://x", Some(5))]
        );
        assert_eq!(controller.status().await.affordances, Affordances::COLLECTING);
        advance(2050).await;
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_numeric_interval_is_forwarded_as_nan() {
        let (controller, api) = controller(FakeApi::new(StartReply::Success));

        controller
            .handle(PanelEvent::Submit(CollectionForm::new("", "soon")))
            .await;

        assert_eq!(
            api.requests.lock().unwrap().as_slice(),
            &[CollectionRequest::new("", None)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_outstanding_start_is_not_guarded() {
        let mut fake = FakeApi::new(StartReply::Success);
        fake.start_delay = Duration::from_millis(1000);
        let (controller, _api) = controller(fake);

        let starter = controller.clone();
        let start = tokio::spawn(async move { starter.start_collection(request()).await });
        tokio::task::yield_now().await;

        controller.stop_collection().await;
        assert!(!controller.is_active().await);

        start.await.unwrap();
        assert!(controller.is_active().await);
        assert_eq!(
            messages(&controller.entries().await),
            vec![STARTED_MESSAGE, STOPPED_MESSAGE]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_polls_overlap_and_late_results_still_render() {
        let mut fake = FakeApi::new(StartReply::Success).with_data(vec![
            json!({ "visible_data": { "text_content": ["a"] } }),
            json!({ "visible_data": { "text_content": ["b"] } }),
        ]);
        fake.fetch_delay = Duration::from_millis(3000);
        let (controller, api) = controller(fake);
        controller.start_collection(request()).await;

        // Ticks at 2s and 4s; the first fetch is still outstanding at 4s.
        advance(4100).await;
        assert_eq!(api.fetches(), 2);

        controller.stop_collection().await;
        advance(5000).await;

        let data_blocks = controller
            .entries()
            .await
            .iter()
            .filter(|e| matches!(e, LogEntry::Data { .. }))
            .count();
        assert_eq!(data_blocks, 2);
        assert_eq!(api.fetches(), 2);
    }
}
