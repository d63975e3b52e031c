//! Automation session manager.
//!
//! Owns the lifecycle of exactly one browser connection: connect, locate the
//! right page among every open browsing context, detect staleness, recover,
//! and serialize every caller onto that single connection. All page-touching
//! operations funnel through one async mutex, so two concurrent bridge
//! requests always execute against the browser in some total order.

pub mod page_match;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;

use crate::capability::{
    BrowserCapability, BrowserEvent, ConsoleLevel, ConsoleMessage, DialogAction, Operation,
    PageDescriptor, TargetOptions,
};
use crate::error::{AutomationError, Result};
use crate::inspect::ElementInfo;

/// Fallback highlight color when the caller does not pick one.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ff4444";
/// How long a highlight overlay stays up by default.
pub const DEFAULT_HIGHLIGHT_DURATION_MS: u64 = 3000;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Stale,
    Reconnecting,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Stale => "stale",
            SessionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", name)
    }
}

/// Tunable timeouts and retry budgets. The defaults match a local dev
/// server workflow: quick connect attempts, tolerant per-operation retries.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// URL of the page the session should attach to. Updated by `navigate`.
    pub target_url: Option<String>,
    /// Connect budget: attempts at locating a matching page.
    pub connect_attempts: u32,
    pub connect_delay: Duration,
    /// Per-operation retries after the first attempt.
    pub op_retries: u32,
    pub retry_delay: Duration,
    pub operation_timeout: Duration,
    /// Navigation gets a longer budget than other operations.
    pub navigation_timeout: Duration,
    /// Budget for the pre-operation page liveness probe.
    pub staleness_probe: Duration,
    /// Console messages returned per read unless the caller narrows it.
    pub console_read_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            connect_attempts: 3,
            connect_delay: Duration::from_millis(500),
            op_retries: 2,
            retry_delay: Duration::from_millis(250),
            operation_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
            staleness_probe: Duration::from_secs(2),
            console_read_limit: 100,
        }
    }
}

/// Snapshot returned by the `/state` operation. Recomputed on every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeState {
    pub connected: bool,
    pub current_url: String,
    pub last_inspected_element: Option<ElementInfo>,
    pub console_logs: Vec<ConsoleMessage>,
}

/// Private session state, guarded by the manager's single lock.
struct Session {
    state: SessionState,
    page: Option<PageDescriptor>,
    last_known_url: Option<String>,
    target_url: Option<String>,
}

/// Builds the descriptive error surfaced when an operation exhausts its
/// budget. Element operations point the agent at the inspection tools.
fn timeout_error(op: Operation, target: &str, timeout: Duration) -> AutomationError {
    let ms = timeout.as_millis();
    let message = if op.targets_element() {
        format!(
            "{} timeout: \"{}\" not found within {}ms. Run /inspect or /screenshot to see the current page.",
            op.display_name(),
            target,
            ms
        )
    } else {
        format!(
            "{} timeout: {} did not complete within {}ms. The browser may still finish it; check /state.",
            op.display_name(),
            target,
            ms
        )
    };
    AutomationError::Timeout(message)
}

/// The one live automation session per process.
pub struct SessionManager {
    driver: Arc<dyn BrowserCapability>,
    config: SessionConfig,
    session: Mutex<Session>,
    last_inspected: Mutex<Option<ElementInfo>>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn BrowserCapability>, config: SessionConfig) -> Self {
        let target_url = config.target_url.clone();
        Self {
            driver,
            config,
            session: Mutex::new(Session {
                state: SessionState::Disconnected,
                page: None,
                last_known_url: None,
                target_url,
            }),
            last_inspected: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Track driver lifecycle events so user-driven navigations keep the
    /// session's URL bookkeeping current. The task ends when the driver's
    /// event channel closes or the manager is dropped.
    pub fn spawn_event_listener(self: &Arc<Self>) {
        let mut events = self.driver.subscribe();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BrowserEvent::Navigated { url }) | Ok(BrowserEvent::Loaded { url }) => {
                        let Some(manager) = weak.upgrade() else { break };
                        let mut session = manager.session.lock().await;
                        session.last_known_url = Some(url);
                    }
                    Ok(BrowserEvent::PageError { message }) => {
                        debug!("page error event: {}", message);
                    }
                    Ok(BrowserEvent::Console { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("event stream lagged, {} events dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    // -- lifecycle -----------------------------------------------------------

    /// Connect eagerly instead of waiting for the first operation.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_session(&mut session).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Err(err) = self.driver.disconnect().await {
            debug!("driver disconnect: {}", err);
        }
        session.page = None;
        self.transition(&mut session, SessionState::Disconnected);
        Ok(())
    }

    /// Snapshot for `/state`. Never triggers a connect: an agent polling
    /// state should not drag a browser session into existence.
    pub async fn state(&self) -> BridgeState {
        let session = self.session.lock().await;
        let connected =
            session.state == SessionState::Connected && self.driver.is_connected().await;
        let mut current_url = session.last_known_url.clone().unwrap_or_default();
        let mut console_logs = Vec::new();
        if connected {
            if let Ok(Ok(url)) =
                tokio::time::timeout(self.config.staleness_probe, self.driver.current_url()).await
            {
                current_url = url;
            }
            if let Ok(Ok(logs)) =
                tokio::time::timeout(self.config.operation_timeout, self.driver.console_logs())
                    .await
            {
                let start = logs.len().saturating_sub(self.config.console_read_limit);
                console_logs = logs[start..].to_vec();
            }
        }
        BridgeState {
            connected,
            current_url,
            last_inspected_element: self.last_inspected.lock().await.clone(),
            console_logs,
        }
    }

    // -- required operations -------------------------------------------------

    /// Navigate the attached page, normalizing shorthand URLs first.
    /// Returns the normalized URL actually used.
    pub async fn navigate(&self, url: &str) -> Result<String> {
        let normalized = page_match::normalize_navigation_url(url);
        let mut session = self.session.lock().await;
        // The navigated URL becomes the page-matching target before the
        // connect runs, so a cold session attaches to the right page.
        session.target_url = Some(normalized.clone());
        let nav_url = normalized.clone();
        self.run_locked(
            &mut session,
            Operation::Navigate,
            &normalized,
            self.config.navigation_timeout,
            move |driver, _| {
                let url = nav_url.clone();
                async move { driver.navigate(&url).await }
            },
        )
        .await?;
        session.last_known_url = Some(normalized.clone());
        Ok(normalized)
    }

    pub async fn reload(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let target = session.last_known_url.clone().unwrap_or_else(|| "page".to_string());
        self.run_locked(
            &mut session,
            Operation::Reload,
            &target,
            self.config.navigation_timeout,
            |driver, _| async move { driver.reload().await },
        )
        .await
    }

    pub async fn inspect_selector(&self, selector: &str) -> Result<ElementInfo> {
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        let info = self
            .run_locked(
                &mut session,
                Operation::Inspect,
                selector,
                self.config.operation_timeout,
                move |driver, _| {
                    let sel = sel.clone();
                    async move { driver.inspect_selector(&sel).await }
                },
            )
            .await?;
        *self.last_inspected.lock().await = Some(info.clone());
        Ok(info)
    }

    pub async fn inspect_point(&self, x: f64, y: f64) -> Result<ElementInfo> {
        let mut session = self.session.lock().await;
        let target = format!("({}, {})", x, y);
        let info = self
            .run_locked(
                &mut session,
                Operation::Inspect,
                &target,
                self.config.operation_timeout,
                move |driver, _| async move { driver.inspect_point(x, y).await },
            )
            .await?;
        *self.last_inspected.lock().await = Some(info.clone());
        Ok(info)
    }

    pub async fn highlight(
        &self,
        selector: &str,
        color: Option<&str>,
        duration_ms: Option<u64>,
    ) -> Result<()> {
        let color = color.unwrap_or(DEFAULT_HIGHLIGHT_COLOR).to_string();
        let duration_ms = duration_ms.unwrap_or(DEFAULT_HIGHLIGHT_DURATION_MS);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        self.run_locked(
            &mut session,
            Operation::Highlight,
            selector,
            self.config.operation_timeout,
            move |driver, _| {
                let sel = sel.clone();
                let color = color.clone();
                async move { driver.highlight(&sel, &color, duration_ms).await }
            },
        )
        .await
    }

    pub async fn clear_highlights(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.run_locked(
            &mut session,
            Operation::ClearHighlights,
            "page",
            self.config.operation_timeout,
            |driver, _| async move { driver.clear_highlights().await },
        )
        .await
    }

    pub async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>> {
        let target = selector.unwrap_or("page").to_string();
        let mut session = self.session.lock().await;
        let sel: Option<String> = selector.map(str::to_string);
        self.run_locked(
            &mut session,
            Operation::Screenshot,
            &target,
            self.config.operation_timeout,
            move |driver, _| {
                let sel = sel.clone();
                async move { driver.screenshot(sel.as_deref()).await }
            },
        )
        .await
    }

    /// Read the console ring buffer, filtered by level, newest `limit`
    /// entries kept.
    pub async fn console(
        &self,
        level: Option<ConsoleLevel>,
        limit: Option<usize>,
    ) -> Result<Vec<ConsoleMessage>> {
        let mut session = self.session.lock().await;
        let logs = self
            .run_locked(
                &mut session,
                Operation::Console,
                "console",
                self.config.operation_timeout,
                |driver, _| async move { driver.console_logs().await },
            )
            .await?;
        let mut messages: Vec<ConsoleMessage> = match level {
            Some(level) => logs.into_iter().filter(|m| m.level == level).collect(),
            None => logs,
        };
        let limit = limit.unwrap_or(self.config.console_read_limit);
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    pub async fn click(&self, selector: &str, options: &TargetOptions) -> Result<()> {
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        self.run_locked(&mut session, Operation::Click, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            async move { driver.click(&sel, budget).await }
        })
        .await
    }

    pub async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        options: &TargetOptions,
    ) -> Result<()> {
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        let text = text.to_string();
        self.run_locked(&mut session, Operation::Type, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            let text = text.clone();
            async move { driver.type_text(&sel, &text, clear, budget).await }
        })
        .await
    }

    pub async fn wait_for(&self, selector: &str, options: &TargetOptions) -> Result<()> {
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        self.run_locked(&mut session, Operation::WaitFor, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            async move { driver.wait_for(&sel, budget).await }
        })
        .await
    }

    // -- capability-gated operations -----------------------------------------

    pub async fn fill(&self, selector: &str, value: &str, options: &TargetOptions) -> Result<()> {
        self.gate(Operation::Fill)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        let value = value.to_string();
        self.run_locked(&mut session, Operation::Fill, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            let value = value.clone();
            async move { driver.fill(&sel, &value, budget).await }
        })
        .await
    }

    pub async fn select_option(
        &self,
        selector: &str,
        value: &str,
        options: &TargetOptions,
    ) -> Result<()> {
        self.gate(Operation::SelectOption)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        let value = value.to_string();
        self.run_locked(
            &mut session,
            Operation::SelectOption,
            selector,
            timeout,
            move |driver, budget| {
                let sel = sel.clone();
                let value = value.clone();
                async move { driver.select_option(&sel, &value, budget).await }
            },
        )
        .await
    }

    pub async fn hover(&self, selector: &str, options: &TargetOptions) -> Result<()> {
        self.gate(Operation::Hover)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        self.run_locked(&mut session, Operation::Hover, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            async move { driver.hover(&sel, budget).await }
        })
        .await
    }

    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.gate(Operation::PressKey)?;
        let mut session = self.session.lock().await;
        let key_owned = key.to_string();
        self.run_locked(
            &mut session,
            Operation::PressKey,
            key,
            self.config.operation_timeout,
            move |driver, _| {
                let key = key_owned.clone();
                async move { driver.press_key(&key).await }
            },
        )
        .await
    }

    pub async fn drag_and_drop(
        &self,
        source: &str,
        target: &str,
        options: &TargetOptions,
    ) -> Result<()> {
        self.gate(Operation::DragAndDrop)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let label = format!("{} to {}", source, target);
        let mut session = self.session.lock().await;
        let source = source.to_string();
        let target = target.to_string();
        self.run_locked(
            &mut session,
            Operation::DragAndDrop,
            &label,
            timeout,
            move |driver, budget| {
                let source = source.clone();
                let target = target.clone();
                async move { driver.drag_and_drop(&source, &target, budget).await }
            },
        )
        .await
    }

    pub async fn scroll(&self, delta_x: f64, delta_y: f64) -> Result<()> {
        self.gate(Operation::Scroll)?;
        let mut session = self.session.lock().await;
        self.run_locked(
            &mut session,
            Operation::Scroll,
            "page",
            self.config.operation_timeout,
            move |driver, _| async move { driver.scroll_by(delta_x, delta_y).await },
        )
        .await
    }

    pub async fn wait_for_response(
        &self,
        url_pattern: &str,
        options: &TargetOptions,
    ) -> Result<Value> {
        self.gate(Operation::WaitForResponse)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let pattern = url_pattern.to_string();
        self.run_locked(
            &mut session,
            Operation::WaitForResponse,
            url_pattern,
            timeout,
            move |driver, budget| {
                let pattern = pattern.clone();
                async move { driver.wait_for_response(&pattern, budget).await }
            },
        )
        .await
    }

    pub async fn get_text(&self, selector: &str, options: &TargetOptions) -> Result<String> {
        self.gate(Operation::GetText)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        self.run_locked(&mut session, Operation::GetText, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            async move { driver.get_text(&sel, budget).await }
        })
        .await
    }

    pub async fn get_attribute(
        &self,
        selector: &str,
        name: &str,
        options: &TargetOptions,
    ) -> Result<Option<String>> {
        self.gate(Operation::GetAttribute)?;
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        let name = name.to_string();
        self.run_locked(
            &mut session,
            Operation::GetAttribute,
            selector,
            timeout,
            move |driver, budget| {
                let sel = sel.clone();
                let name = name.clone();
                async move { driver.get_attribute(&sel, &name, budget).await }
            },
        )
        .await
    }

    pub async fn is_visible(&self, selector: &str, options: &TargetOptions) -> Result<bool> {
        self.gate(Operation::IsVisible)?;
        self.element_flag(Operation::IsVisible, selector, options).await
    }

    pub async fn is_enabled(&self, selector: &str, options: &TargetOptions) -> Result<bool> {
        self.gate(Operation::IsEnabled)?;
        self.element_flag(Operation::IsEnabled, selector, options).await
    }

    pub async fn is_checked(&self, selector: &str, options: &TargetOptions) -> Result<bool> {
        self.gate(Operation::IsChecked)?;
        self.element_flag(Operation::IsChecked, selector, options).await
    }

    async fn element_flag(
        &self,
        op: Operation,
        selector: &str,
        options: &TargetOptions,
    ) -> Result<bool> {
        let timeout = options.timeout(self.config.operation_timeout);
        let mut session = self.session.lock().await;
        let sel = selector.to_string();
        self.run_locked(&mut session, op, selector, timeout, move |driver, budget| {
            let sel = sel.clone();
            async move {
                match op {
                    Operation::IsVisible => driver.is_visible(&sel, budget).await,
                    Operation::IsEnabled => driver.is_enabled(&sel, budget).await,
                    Operation::IsChecked => driver.is_checked(&sel, budget).await,
                    other => Err(AutomationError::Unexpected(format!(
                        "element_flag dispatched with non-flag operation {:?}",
                        other
                    ))),
                }
            }
        })
        .await
    }

    pub async fn evaluate(&self, script: &str) -> Result<Value> {
        self.gate(Operation::Evaluate)?;
        let mut session = self.session.lock().await;
        let src = script.to_string();
        self.run_locked(
            &mut session,
            Operation::Evaluate,
            "script",
            self.config.operation_timeout,
            move |driver, _| {
                let src = src.clone();
                async move { driver.execute_script(&src).await }
            },
        )
        .await
    }

    pub async fn accessibility_snapshot(&self) -> Result<Value> {
        self.gate(Operation::AccessibilitySnapshot)?;
        let mut session = self.session.lock().await;
        self.run_locked(
            &mut session,
            Operation::AccessibilitySnapshot,
            "page",
            self.config.operation_timeout,
            |driver, _| async move { driver.accessibility_snapshot().await },
        )
        .await
    }

    pub async fn go_back(&self) -> Result<()> {
        self.gate(Operation::GoBack)?;
        let mut session = self.session.lock().await;
        self.run_locked(
            &mut session,
            Operation::GoBack,
            "history",
            self.config.operation_timeout,
            |driver, _| async move { driver.go_back().await },
        )
        .await
    }

    pub async fn go_forward(&self) -> Result<()> {
        self.gate(Operation::GoForward)?;
        let mut session = self.session.lock().await;
        self.run_locked(
            &mut session,
            Operation::GoForward,
            "history",
            self.config.operation_timeout,
            |driver, _| async move { driver.go_forward().await },
        )
        .await
    }

    pub async fn set_dialog_handler(
        &self,
        action: DialogAction,
        prompt_text: Option<&str>,
    ) -> Result<()> {
        self.gate(Operation::SetDialogHandler)?;
        let mut session = self.session.lock().await;
        let prompt: Option<String> = prompt_text.map(str::to_string);
        self.run_locked(
            &mut session,
            Operation::SetDialogHandler,
            "dialog handler",
            self.config.operation_timeout,
            move |driver, _| {
                let prompt = prompt.clone();
                async move { driver.set_dialog_handler(action, prompt.as_deref()).await }
            },
        )
        .await
    }

    // -- internals -----------------------------------------------------------

    /// Reject an optional operation before any session work is queued.
    fn gate(&self, op: Operation) -> Result<()> {
        if self.driver.supports(op) {
            Ok(())
        } else {
            Err(AutomationError::Unsupported { op })
        }
    }

    /// Execute one operation under the session lock: ensure a live session,
    /// race each attempt against its timeout slice, retry transient
    /// failures, and convert an exhausted budget into a descriptive error.
    async fn run_locked<T, F, Fut>(
        &self,
        session: &mut Session,
        op: Operation,
        target: &str,
        timeout: Duration,
        call: F,
    ) -> Result<T>
    where
        F: Fn(Arc<dyn BrowserCapability>, Duration) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_session(session).await?;
        let attempts = self.config.op_retries + 1;
        let attempt_timeout = (timeout / attempts).max(Duration::from_millis(1));
        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(
                attempt_timeout,
                call(Arc::clone(&self.driver), attempt_timeout),
            )
            .await;
            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_retriable() => return Err(err),
                Ok(Err(err)) => {
                    debug!(
                        "{} attempt {}/{} failed: {}",
                        op.display_name(),
                        attempt,
                        attempts,
                        err
                    );
                    if err.is_session_recoverable() {
                        self.recover(session).await?;
                    }
                }
                Err(_) => {
                    debug!(
                        "{} attempt {}/{} timed out after {:?}",
                        op.display_name(),
                        attempt,
                        attempts,
                        attempt_timeout
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
        Err(timeout_error(op, target, timeout))
    }

    async fn ensure_session(&self, session: &mut Session) -> Result<()> {
        match session.state {
            SessionState::Connected => self.validate_page(session).await,
            SessionState::Disconnected | SessionState::Connecting => {
                self.establish(session).await
            }
            // Transient states resume their in-flight recovery path.
            SessionState::Stale | SessionState::Reconnecting => self.recover(session).await,
        }
    }

    /// Pre-operation liveness and identity check on the held page.
    async fn validate_page(&self, session: &mut Session) -> Result<()> {
        let probe =
            tokio::time::timeout(self.config.staleness_probe, self.driver.current_url()).await;
        match probe {
            Ok(Ok(url)) => {
                let wandered = session
                    .target_url
                    .as_deref()
                    .is_some_and(|target| !page_match::urls_equivalent(&url, target));
                if wandered {
                    if let Some(page) = self.find_better_page(session).await {
                        info!(
                            "held page drifted to {}; reattaching to {}",
                            url, page.url
                        );
                        self.transition(session, SessionState::Stale);
                        self.transition(session, SessionState::Reconnecting);
                        if self.driver.attach_page(&page.id).await.is_err() {
                            return self.recover(session).await;
                        }
                        session.last_known_url = Some(page.url.clone());
                        session.page = Some(page);
                        self.transition(session, SessionState::Connected);
                        return Ok(());
                    }
                }
                session.last_known_url = Some(url);
                Ok(())
            }
            Ok(Err(err)) => {
                warn!("held page failed its liveness probe: {}", err);
                self.transition(session, SessionState::Stale);
                self.recover(session).await
            }
            Err(_) => {
                // A slow page is not a dead one; keep it rather than churn.
                warn!(
                    "page liveness probe timed out after {:?}; keeping current page",
                    self.config.staleness_probe
                );
                Ok(())
            }
        }
    }

    /// When the held page's URL stops matching the target, an exact match
    /// on another page wins the session back. The fallback policy is not
    /// re-run here; only a strict match justifies moving.
    async fn find_better_page(&self, session: &Session) -> Option<PageDescriptor> {
        let target = session.target_url.as_deref()?;
        let pages = self.driver.list_pages().await.ok()?;
        let held_id = session.page.as_ref().map(|page| page.id.clone());
        page_match::locate_exact(target, &pages)
            .filter(|page| held_id.as_deref() != Some(page.id.as_str()))
            .cloned()
    }

    /// Full connect: transport, page search, attach. Bounded by the
    /// connect budget; exhaustion surfaces the last failure.
    async fn establish(&self, session: &mut Session) -> Result<()> {
        self.transition(session, SessionState::Connecting);
        let mut last_err: Option<AutomationError> = None;
        for attempt in 1..=self.config.connect_attempts {
            match self.try_connect_once(session).await {
                Ok(()) => {
                    self.transition(session, SessionState::Connected);
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        "connect attempt {}/{} failed: {}",
                        attempt, self.config.connect_attempts, err
                    );
                    last_err = Some(err);
                }
            }
            if attempt < self.config.connect_attempts {
                tokio::time::sleep(self.config.connect_delay).await;
            }
        }
        self.transition(session, SessionState::Disconnected);
        Err(last_err.unwrap_or_else(|| {
            AutomationError::ConnectionFailed("no connect attempts configured".to_string())
        }))
    }

    async fn try_connect_once(&self, session: &mut Session) -> Result<()> {
        self.driver.connect().await?;
        let pages = self.driver.list_pages().await?;
        let target = session.target_url.clone();
        let page = page_match::locate_page(target.as_deref(), &pages)?.clone();
        self.driver.attach_page(&page.id).await?;
        info!("attached to page {} ({})", page.id, page.url);
        session.last_known_url = Some(page.url.clone());
        session.page = Some(page);
        Ok(())
    }

    /// Stale-page recovery: re-run the page search on the live transport
    /// first, and only rebuild the transport when that fails.
    async fn recover(&self, session: &mut Session) -> Result<()> {
        self.transition(session, SessionState::Reconnecting);
        match self.relocate(session).await {
            Ok(()) => {
                self.transition(session, SessionState::Connected);
                Ok(())
            }
            Err(relocate_err) => {
                warn!(
                    "page relocation failed ({}); reconnecting transport",
                    relocate_err
                );
                if let Err(err) = self.driver.disconnect().await {
                    debug!("disconnect during recovery: {}", err);
                }
                session.page = None;
                self.establish(session).await
            }
        }
    }

    async fn relocate(&self, session: &mut Session) -> Result<()> {
        let pages = self.driver.list_pages().await?;
        let target = session.target_url.clone();
        let page = page_match::locate_page(target.as_deref(), &pages)?.clone();
        self.driver.attach_page(&page.id).await?;
        info!("relocated session to page {} ({})", page.id, page.url);
        session.last_known_url = Some(page.url.clone());
        session.page = Some(page);
        Ok(())
    }

    fn transition(&self, session: &mut Session, to: SessionState) {
        if session.state != to {
            info!("session state: {} -> {}", session.state, to);
            session.state = to;
        }
    }
}
