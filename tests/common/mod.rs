//! Shared test support: a scripted in-memory browser driver and helpers
//! for standing up a bridge on an ephemeral port.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use page_bridge::bridge::{self, Bridge};
use page_bridge::capability::{
    BrowserCapability, BrowserEvent, ConsoleLevel, ConsoleMessage, Operation, PageDescriptor,
    EVENT_CHANNEL_CAPACITY,
};
use page_bridge::error::{AutomationError, Result};
use page_bridge::inspect::{BoundingBox, ComputedStyles, ElementInfo, OverlayInfo};
use page_bridge::session::{SessionConfig, SessionManager};

/// Minimal PNG header, enough for the base64 transport tests.
pub const PNG_STUB: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn page(id: &str, url: &str) -> PageDescriptor {
    PageDescriptor {
        id: id.to_string(),
        url: url.to_string(),
        title: String::new(),
    }
}

/// Deterministic inspection payload for a selector. Two inspections of the
/// same element must serialize identically, so everything here is fixed.
pub fn element_info(selector: &str) -> ElementInfo {
    let mut attributes = IndexMap::new();
    attributes.insert("type".to_string(), "submit".to_string());
    attributes.insert("class".to_string(), "primary".to_string());
    ElementInfo {
        tag_name: "button".to_string(),
        id: selector.strip_prefix('#').map(str::to_string),
        classes: vec!["primary".to_string()],
        selector: selector.to_string(),
        description: "Button".to_string(),
        bounding_box: BoundingBox { x: 10, y: 20, width: 120, height: 32 },
        attributes,
        computed_styles: ComputedStyles {
            display: "inline-block".to_string(),
            position: "static".to_string(),
            width: "120px".to_string(),
            height: "32px".to_string(),
            margin: "0px".to_string(),
            padding: "4px 12px".to_string(),
            color: "rgb(255, 255, 255)".to_string(),
            background_color: "rgb(0, 123, 255)".to_string(),
            font: "14px sans-serif".to_string(),
        },
        text_content: "Submit".to_string(),
        parent_chain: Vec::new(),
        sibling_count: 2,
        child_count: 0,
        form_state: None,
        is_loading: None,
        framework: None,
        overlay: None,
        stacking: None,
        iframe: None,
        shadow_dom: None,
        scroll: None,
    }
}

/// In-memory driver with scripted failures and a call log. Every trait
/// method records itself so tests can assert how often (and whether) the
/// session manager reached the driver.
pub struct MockBrowser {
    pages: Mutex<Vec<PageDescriptor>>,
    connected: AtomicBool,
    attached: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    fail_connects: AtomicUsize,
    missing: Mutex<HashSet<String>>,
    rejected: Mutex<HashSet<String>>,
    console: Mutex<Vec<ConsoleMessage>>,
    click_delay: Mutex<Duration>,
    active_clicks: AtomicUsize,
    max_active_clicks: AtomicUsize,
    withheld: Mutex<HashSet<Operation>>,
    page_killed: AtomicBool,
    events: broadcast::Sender<BrowserEvent>,
}

impl MockBrowser {
    pub fn new() -> Arc<Self> {
        Self::with_pages(vec![page("page-1", "http://localhost:3000/")])
    }

    pub fn with_pages(pages: Vec<PageDescriptor>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            pages: Mutex::new(pages),
            connected: AtomicBool::new(false),
            attached: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            fail_connects: AtomicUsize::new(0),
            missing: Mutex::new(HashSet::new()),
            rejected: Mutex::new(HashSet::new()),
            console: Mutex::new(Vec::new()),
            click_delay: Mutex::new(Duration::ZERO),
            active_clicks: AtomicUsize::new(0),
            max_active_clicks: AtomicUsize::new(0),
            withheld: Mutex::new(HashSet::new()),
            page_killed: AtomicBool::new(false),
            events,
        })
    }

    // -- scripting knobs -----------------------------------------------------

    /// Fail the next `n` connect calls with `ConnectionFailed`.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Element-targeted calls on this selector report `ElementNotFound`.
    pub fn mark_missing(&self, selector: &str) {
        self.missing.lock().unwrap().insert(selector.to_string());
    }

    /// Element-targeted calls on this selector report `InvalidSelector`, as
    /// a real driver does when the page rejects the selector syntax.
    pub fn reject_selector(&self, selector: &str) {
        self.rejected.lock().unwrap().insert(selector.to_string());
    }

    pub fn set_click_delay(&self, delay: Duration) {
        *self.click_delay.lock().unwrap() = delay;
    }

    /// Treat `op` as unimplemented, on top of the built-in unsupported set.
    pub fn withhold(&self, op: Operation) {
        self.withheld.lock().unwrap().insert(op);
    }

    /// One-shot fault: the next liveness probe reports the page as gone.
    pub fn kill_attached_page(&self) {
        self.page_killed.store(true, Ordering::SeqCst);
    }

    pub fn set_pages(&self, pages: Vec<PageDescriptor>) {
        *self.pages.lock().unwrap() = pages;
    }

    pub fn push_console(&self, level: ConsoleLevel, text: &str) {
        self.console.lock().unwrap().push(ConsoleMessage {
            level,
            text: text.to_string(),
            source: "console".to_string(),
            line: None,
            column: None,
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            stack_trace: None,
        });
    }

    // -- observations --------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|entry| entry.starts_with(prefix)).count()
    }

    pub fn attached_page(&self) -> Option<String> {
        self.attached.lock().unwrap().clone()
    }

    /// Highest number of clicks observed in flight at once.
    pub fn max_concurrent_clicks(&self) -> usize {
        self.max_active_clicks.load(Ordering::SeqCst)
    }

    // -- internals -----------------------------------------------------------

    fn record(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    fn is_missing(&self, selector: &str) -> bool {
        self.missing.lock().unwrap().contains(selector)
    }

    fn require_attached(&self) -> Result<String> {
        self.attached
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AutomationError::ConnectionLost("no page attached".to_string()))
    }

    fn element_gate(&self, selector: &str) -> Result<()> {
        self.require_attached()?;
        if self.rejected.lock().unwrap().contains(selector) {
            return Err(AutomationError::InvalidSelector {
                selector: selector.to_string(),
                reason: "scripted syntax error".to_string(),
            });
        }
        if self.is_missing(selector) {
            Err(AutomationError::ElementNotFound(selector.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserCapability for MockBrowser {
    async fn connect(&self) -> Result<()> {
        self.record("connect".to_string());
        if self.fail_connects.load(Ordering::SeqCst) > 0 {
            self.fail_connects.fetch_sub(1, Ordering::SeqCst);
            return Err(AutomationError::ConnectionFailed("scripted refusal".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect".to_string());
        self.connected.store(false, Ordering::SeqCst);
        *self.attached.lock().unwrap() = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list_pages(&self) -> Result<Vec<PageDescriptor>> {
        self.record("list_pages".to_string());
        Ok(self.pages.lock().unwrap().clone())
    }

    async fn attach_page(&self, page_id: &str) -> Result<()> {
        self.record(format!("attach {}", page_id));
        let exists = self.pages.lock().unwrap().iter().any(|p| p.id == page_id);
        if !exists {
            return Err(AutomationError::PageNotFound(format!("no page with id {}", page_id)));
        }
        *self.attached.lock().unwrap() = Some(page_id.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        if self.page_killed.swap(false, Ordering::SeqCst) {
            return Err(AutomationError::ConnectionLost("page closed".to_string()));
        }
        let attached = self.require_attached()?;
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == attached)
            .map(|p| p.url.clone())
            .ok_or_else(|| AutomationError::ConnectionLost("attached page is gone".to_string()))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {}", url));
        let attached = self.require_attached()?;
        if let Some(page) = self.pages.lock().unwrap().iter_mut().find(|p| p.id == attached) {
            page.url = url.to_string();
        }
        let _ = self.events.send(BrowserEvent::Loaded { url: url.to_string() });
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload".to_string());
        self.require_attached()?;
        Ok(())
    }

    async fn inspect_selector(&self, selector: &str) -> Result<ElementInfo> {
        self.record(format!("inspect {}", selector));
        self.element_gate(selector)?;
        Ok(element_info(selector))
    }

    async fn inspect_point(&self, x: f64, y: f64) -> Result<ElementInfo> {
        self.record(format!("inspect_point {},{}", x, y));
        self.require_attached()?;
        // Point inspections land on a dialog overlay in this fixture.
        let mut info = element_info("div.modal");
        info.overlay = Some(OverlayInfo {
            overlay_type: "dialog".to_string(),
            can_dismiss: true,
        });
        Ok(info)
    }

    async fn highlight(&self, selector: &str, color: &str, duration_ms: u64) -> Result<()> {
        self.record(format!("highlight {} {} {}", selector, color, duration_ms));
        self.element_gate(selector)
    }

    async fn clear_highlights(&self) -> Result<()> {
        self.record("clear_highlights".to_string());
        self.require_attached()?;
        Ok(())
    }

    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>> {
        self.record(format!("screenshot {}", selector.unwrap_or("<page>")));
        if let Some(selector) = selector {
            self.element_gate(selector)?;
        } else {
            self.require_attached()?;
        }
        Ok(PNG_STUB.to_vec())
    }

    async fn console_logs(&self) -> Result<Vec<ConsoleMessage>> {
        self.record("console_logs".to_string());
        self.require_attached()?;
        Ok(self.console.lock().unwrap().clone())
    }

    async fn execute_script(&self, source: &str) -> Result<Value> {
        self.record(format!("evaluate {}", source));
        self.require_attached()?;
        Ok(json!({ "ok": true }))
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<()> {
        let in_flight = self.active_clicks.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_clicks.fetch_max(in_flight, Ordering::SeqCst);
        self.record(format!("click {}", selector));
        let delay = *self.click_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.element_gate(selector);
        self.active_clicks.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        _timeout: Duration,
    ) -> Result<()> {
        self.record(format!("type {} {:?} clear={}", selector, text, clear));
        self.element_gate(selector)
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("wait_for {}", selector));
        self.element_gate(selector)
    }

    fn supports(&self, op: Operation) -> bool {
        if self.withheld.lock().unwrap().contains(&op) {
            return false;
        }
        !matches!(
            op,
            Operation::DragAndDrop
                | Operation::WaitForResponse
                | Operation::AccessibilitySnapshot
                | Operation::SetDialogHandler
        )
    }

    fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    async fn fill(&self, selector: &str, value: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("fill {} {:?}", selector, value));
        self.element_gate(selector)
    }

    async fn select_option(&self, selector: &str, value: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("select_option {} {:?}", selector, value));
        self.element_gate(selector)
    }

    async fn hover(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("hover {}", selector));
        self.element_gate(selector)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(format!("press_key {}", key));
        self.require_attached()?;
        Ok(())
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<()> {
        self.record(format!("scroll {},{}", delta_x, delta_y));
        self.require_attached()?;
        Ok(())
    }

    async fn get_text(&self, selector: &str, _timeout: Duration) -> Result<String> {
        self.record(format!("get_text {}", selector));
        self.element_gate(selector)?;
        Ok("Submit".to_string())
    }

    async fn get_attribute(
        &self,
        selector: &str,
        name: &str,
        _timeout: Duration,
    ) -> Result<Option<String>> {
        self.record(format!("get_attribute {} {}", selector, name));
        self.element_gate(selector)?;
        Ok(if name == "data-missing" { None } else { Some("submit".to_string()) })
    }

    async fn is_visible(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.record(format!("is_visible {}", selector));
        self.element_gate(selector)?;
        Ok(true)
    }

    async fn is_enabled(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.record(format!("is_enabled {}", selector));
        self.element_gate(selector)?;
        Ok(true)
    }

    async fn is_checked(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.record(format!("is_checked {}", selector));
        self.element_gate(selector)?;
        Ok(false)
    }

    async fn go_back(&self) -> Result<()> {
        self.record("go_back".to_string());
        self.require_attached()?;
        Ok(())
    }

    async fn go_forward(&self) -> Result<()> {
        self.record("go_forward".to_string());
        self.require_attached()?;
        Ok(())
    }
}

/// Short budgets so retry exhaustion stays in test time.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        target_url: None,
        connect_attempts: 3,
        connect_delay: Duration::from_millis(10),
        op_retries: 2,
        retry_delay: Duration::from_millis(10),
        operation_timeout: Duration::from_millis(400),
        navigation_timeout: Duration::from_millis(800),
        staleness_probe: Duration::from_millis(200),
        console_read_limit: 100,
    }
}

pub fn manager_for(driver: Arc<MockBrowser>) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(driver, test_config()))
}

/// Serve the full router on an ephemeral loopback port and return its base
/// URL. The server task runs until the test process exits.
pub async fn spawn_bridge(bridge: Arc<Bridge>) -> (String, JoinHandle<()>) {
    let app = bridge::router(bridge);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server exited early");
    });
    (format!("http://{}", addr), handle)
}

/// Mock driver + manager + served bridge, wired together.
pub async fn spawn_stack() -> (Arc<MockBrowser>, Arc<SessionManager>, String) {
    let driver = MockBrowser::new();
    let manager = manager_for(Arc::clone(&driver));
    let bridge = Arc::new(Bridge::with_handler(Arc::clone(&manager)));
    let (base, _handle) = spawn_bridge(bridge).await;
    (driver, manager, base)
}
