//! Chrome driver: implements the capability surface over an already
//! running browser's remote-debugging endpoint.
//!
//! The underlying CDP client is synchronous, so every call that touches the
//! browser runs inside `spawn_blocking`. Cancelled attempts (a timeout race
//! lost in the session manager) leave the blocking call to finish on its
//! own; the browser may still complete the action afterwards.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, Element, Tab};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::capability::{
    BrowserCapability, BrowserEvent, ConsoleMessage, EVENT_CHANNEL_CAPACITY, Operation,
    PageDescriptor,
};
use crate::error::{AutomationError, Result};
use crate::inspect::{self, ElementInfo, js_string};

use super::config::ChromeConfig;

/// In-page console ring buffer. Installed on attach and after navigations;
/// the guard at the top makes reinstallation a no-op.
const CONSOLE_HOOK_SCRIPT: &str = include_str!("console_hook.js");

/// In-page highlight helper with `show` and `clear` entry points.
const HIGHLIGHT_SCRIPT: &str = include_str!("highlight.js");

const HIGHLIGHT_SLOT: &str = "__pageBridgeHighlightV1";

const CONSOLE_READ: &str =
    "JSON.stringify(window.__pageBridgeConsoleV1 ? window.__pageBridgeConsoleV1.read() : [])";

/// Ceiling for individual CDP calls on the attached tab. Operation budgets
/// are enforced above this layer; the tab timeout only stops a wedged
/// browser from pinning a blocking thread forever.
const TAB_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// How long history traversal gets to settle before the call returns.
const HISTORY_SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonVersion {
    web_socket_debugger_url: String,
}

struct DriverState {
    browser: Arc<Browser>,
    tab: Option<Arc<Tab>>,
}

/// One connection to a Chrome-family browser over CDP.
pub struct ChromeDriver {
    config: ChromeConfig,
    state: Mutex<Option<DriverState>>,
    events: broadcast::Sender<BrowserEvent>,
}

impl ChromeDriver {
    pub fn new(config: ChromeConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { config, state: Mutex::new(None), events }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Option<DriverState>>> {
        self.state
            .lock()
            .map_err(|_| AutomationError::Unexpected("driver state lock poisoned".to_string()))
    }

    fn browser(&self) -> Result<Arc<Browser>> {
        let state = self.lock_state()?;
        state
            .as_ref()
            .map(|state| Arc::clone(&state.browser))
            .ok_or_else(|| AutomationError::ConnectionLost("not connected to a browser".to_string()))
    }

    fn attached_tab(&self) -> Result<Arc<Tab>> {
        let state = self.lock_state()?;
        state
            .as_ref()
            .and_then(|state| state.tab.clone())
            .ok_or_else(|| AutomationError::ConnectionLost("no page attached".to_string()))
    }

    async fn discover_ws_url(&self) -> Result<String> {
        let endpoint = format!("{}/json/version", self.config.endpoint());
        let response = reqwest::get(&endpoint).await.map_err(|err| {
            AutomationError::ConnectionFailed(format!(
                "browser not reachable at {}: {}",
                endpoint, err
            ))
        })?;
        let version: JsonVersion = response.json().await.map_err(|err| {
            AutomationError::ConnectionFailed(format!(
                "unexpected response from {}: {}",
                endpoint, err
            ))
        })?;
        Ok(version.web_socket_debugger_url)
    }
}

/// Run a synchronous CDP interaction off the async runtime.
async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| AutomationError::Unexpected(format!("blocking task failed: {}", err)))?
}

/// Map a CDP failure on an element-scoped call. Lookup failures become
/// `ElementNotFound` so the session manager retries them; transport
/// failures go through the shared classifier.
fn classify_element_error(err: anyhow::Error, selector: &str) -> AutomationError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("no element") || lower.contains("not found") {
        return AutomationError::ElementNotFound(selector.to_string());
    }
    AutomationError::from_driver(message)
}

fn eval_value(tab: &Tab, expression: &str) -> Result<Value> {
    let object = tab
        .evaluate(expression, false)
        .map_err(|err| AutomationError::from_driver(err.to_string()))?;
    Ok(object.value.unwrap_or(Value::Null))
}

fn eval_string(tab: &Tab, expression: &str, context: &str) -> Result<String> {
    let value = eval_value(tab, expression)?;
    serde_json::from_value(value).map_err(|err| {
        AutomationError::Script(format!("{} returned a non-string payload: {}", context, err))
    })
}

fn install_console_hook(tab: &Tab) -> Result<()> {
    tab.evaluate(CONSOLE_HOOK_SCRIPT, false)
        .map_err(|err| AutomationError::from_driver(err.to_string()))?;
    Ok(())
}

fn find_element<'a>(tab: &'a Tab, selector: &str, timeout: Duration) -> Result<Element<'a>> {
    tab.wait_for_element_with_custom_timeout(selector, timeout)
        .map_err(|err| classify_element_error(err, selector))
}

fn highlight_helper() -> String {
    format!("(window.{slot} || (window.{slot} = {HIGHLIGHT_SCRIPT}))", slot = HIGHLIGHT_SLOT)
}

fn highlight_expression(selector: &str, color: &str, duration_ms: u64) -> String {
    format!(
        "JSON.stringify({}.show({}, {}, {}))",
        highlight_helper(),
        js_string(selector),
        js_string(color),
        duration_ms
    )
}

fn clear_highlights_expression() -> String {
    format!("JSON.stringify({}.clear())", highlight_helper())
}

#[derive(Debug, Deserialize)]
struct JsOutcome {
    ok: bool,
    #[serde(default)]
    error: Option<JsFailure>,
}

#[derive(Debug, Deserialize)]
struct JsFailure {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Interpret a `{ok, error?}` JSON string from an in-page helper.
fn parse_js_outcome(tab: &Tab, expression: &str, target: &str) -> Result<()> {
    let payload = eval_string(tab, expression, "helper")?;
    let outcome: JsOutcome = serde_json::from_str(&payload).map_err(|err| {
        AutomationError::Script(format!("could not parse helper payload: {}", err))
    })?;
    if outcome.ok {
        return Ok(());
    }
    let failure = outcome.error.unwrap_or(JsFailure {
        code: "internal".to_string(),
        message: "helper failed without detail".to_string(),
    });
    match failure.code.as_str() {
        "not_found" => Err(AutomationError::ElementNotFound(target.to_string())),
        "invalid_selector" => Err(AutomationError::InvalidSelector {
            selector: target.to_string(),
            reason: failure.message,
        }),
        _ => Err(AutomationError::Script(failure.message)),
    }
}

/// Value assignment that works on framework-controlled inputs: go through
/// the prototype setter so the framework's own change tracking fires.
const FILL_FN: &str = r#"function(value) {
    const proto = this instanceof HTMLTextAreaElement
        ? HTMLTextAreaElement.prototype
        : HTMLInputElement.prototype;
    const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
    if (descriptor && descriptor.set) {
        descriptor.set.call(this, value);
    } else {
        this.value = value;
    }
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const CLEAR_FN: &str = r#"function() {
    const proto = this instanceof HTMLTextAreaElement
        ? HTMLTextAreaElement.prototype
        : HTMLInputElement.prototype;
    const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
    if (descriptor && descriptor.set) {
        descriptor.set.call(this, '');
    } else {
        this.value = '';
    }
    this.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
}"#;

/// Matches option values first, then visible labels.
const SELECT_OPTION_FN: &str = r#"function(value) {
    const options = Array.from(this.options || []);
    let match = options.find((option) => option.value === value);
    if (!match) {
        match = options.find((option) =>
            option.label.trim() === value || (option.textContent || '').trim() === value);
    }
    if (!match) {
        return false;
    }
    this.value = match.value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const GET_ATTRIBUTE_FN: &str = "function(name) { return this.getAttribute(name); }";

const IS_VISIBLE_FN: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    if (rect.width <= 0 || rect.height <= 0) {
        return false;
    }
    const style = window.getComputedStyle(this);
    return style.display !== 'none' && style.visibility !== 'hidden' && style.opacity !== '0';
}"#;

const IS_ENABLED_FN: &str =
    "function() { return !(this.disabled || this.closest('fieldset[disabled]') !== null); }";

const IS_CHECKED_FN: &str = "function() { return !!this.checked; }";

/// Absolute page-coordinate box, for screenshot clipping.
const ELEMENT_BOX_FN: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    return JSON.stringify({
        x: rect.x + window.scrollX,
        y: rect.y + window.scrollY,
        width: rect.width,
        height: rect.height
    });
}"#;

#[derive(Debug, Deserialize)]
struct ElementBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

fn call_element_fn(
    element: &Element<'_>,
    function: &str,
    args: Vec<Value>,
    selector: &str,
) -> Result<Value> {
    let object = element
        .call_js_fn(function, args, false)
        .map_err(|err| classify_element_error(err, selector))?;
    Ok(object.value.unwrap_or(Value::Null))
}

fn call_element_bool(
    element: &Element<'_>,
    function: &str,
    selector: &str,
) -> Result<bool> {
    let value = call_element_fn(element, function, Vec::new(), selector)?;
    value.as_bool().ok_or_else(|| {
        AutomationError::Script(format!("element check on {} did not return a boolean", selector))
    })
}

/// Wrap a user script so objects and promises come back as one JSON string.
fn evaluate_expression(source: &str) -> String {
    format!(
        "(() => {{ const __r = ({}); return Promise.resolve(__r).then((v) => {{ \
         try {{ return JSON.stringify(v === undefined ? null : v); }} \
         catch (_) {{ return JSON.stringify(String(v)); }} }}); }})()",
        source
    )
}

#[async_trait::async_trait]
impl BrowserCapability for ChromeDriver {
    async fn connect(&self) -> Result<()> {
        if self.is_connected().await {
            return Ok(());
        }
        let ws_url = match &self.config.ws_url {
            Some(url) => url.clone(),
            None => self.discover_ws_url().await?,
        };
        let browser = blocking(move || {
            Browser::connect(ws_url)
                .map_err(|err| AutomationError::ConnectionFailed(err.to_string()))
        })
        .await?;
        let mut state = self.lock_state()?;
        *state = Some(DriverState { browser: Arc::new(browser), tab: None });
        info!("connected to browser at {}", self.config.endpoint());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let dropped = { self.lock_state()?.take() };
        if dropped.is_some() {
            info!("disconnected from browser");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().map(|state| state.is_some()).unwrap_or(false)
    }

    async fn list_pages(&self) -> Result<Vec<PageDescriptor>> {
        let browser = self.browser()?;
        blocking(move || {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(|_| AutomationError::Unexpected("tab registry lock poisoned".to_string()))?
                .clone();
            // Titles would cost one JS round trip per tab, including dead
            // ones; the descriptors carry url and id only.
            Ok(tabs
                .iter()
                .map(|tab| PageDescriptor {
                    id: tab.get_target_id().to_string(),
                    url: tab.get_url(),
                    title: String::new(),
                })
                .collect())
        })
        .await
    }

    async fn attach_page(&self, page_id: &str) -> Result<()> {
        let browser = self.browser()?;
        let page_id = page_id.to_string();
        let tab = blocking(move || -> Result<Arc<Tab>> {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(|_| AutomationError::Unexpected("tab registry lock poisoned".to_string()))?
                .clone();
            let tab = tabs
                .into_iter()
                .find(|tab| tab.get_target_id().as_str() == page_id)
                .ok_or_else(|| {
                    AutomationError::PageNotFound(format!("no open page with id {}", page_id))
                })?;
            tab.set_default_timeout(TAB_CALL_TIMEOUT);
            install_console_hook(&tab)?;
            Ok(tab)
        })
        .await?;
        let mut state = self.lock_state()?;
        match state.as_mut() {
            Some(state) => {
                state.tab = Some(tab);
                Ok(())
            }
            None => Err(AutomationError::ConnectionLost(
                "not connected to a browser".to_string(),
            )),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let tab = self.attached_tab()?;
        blocking(move || {
            let value = eval_value(&tab, "window.location.href")?;
            value.as_str().map(str::to_string).ok_or_else(|| {
                AutomationError::Script("location.href did not return a string".to_string())
            })
        })
        .await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.attached_tab()?;
        let url = url.to_string();
        let events = self.events.clone();
        blocking(move || {
            tab.navigate_to(&url)
                .map_err(|err| AutomationError::from_driver(err.to_string()))?;
            let _ = events.send(BrowserEvent::Navigated { url: url.clone() });
            tab.wait_until_navigated()
                .map_err(|err| AutomationError::from_driver(err.to_string()))?;
            install_console_hook(&tab)?;
            let _ = events.send(BrowserEvent::Loaded { url });
            Ok(())
        })
        .await
    }

    async fn reload(&self) -> Result<()> {
        let tab = self.attached_tab()?;
        let events = self.events.clone();
        blocking(move || {
            tab.reload(false, None)
                .map_err(|err| AutomationError::from_driver(err.to_string()))?;
            tab.wait_until_navigated()
                .map_err(|err| AutomationError::from_driver(err.to_string()))?;
            install_console_hook(&tab)?;
            if let Ok(Value::String(url)) = eval_value(&tab, "window.location.href") {
                let _ = events.send(BrowserEvent::Loaded { url });
            }
            Ok(())
        })
        .await
    }

    async fn inspect_selector(&self, selector: &str) -> Result<ElementInfo> {
        let tab = self.attached_tab()?;
        let expression = inspect::selector_expression(selector);
        let target = selector.to_string();
        blocking(move || {
            let value = eval_value(&tab, &expression)?;
            inspect::parse_outcome(value, &target)
        })
        .await
    }

    async fn inspect_point(&self, x: f64, y: f64) -> Result<ElementInfo> {
        let tab = self.attached_tab()?;
        let expression = inspect::point_expression(x, y);
        let target = format!("({}, {})", x, y);
        blocking(move || {
            let value = eval_value(&tab, &expression)?;
            inspect::parse_outcome(value, &target)
        })
        .await
    }

    async fn highlight(&self, selector: &str, color: &str, duration_ms: u64) -> Result<()> {
        let tab = self.attached_tab()?;
        let expression = highlight_expression(selector, color, duration_ms);
        let target = selector.to_string();
        blocking(move || parse_js_outcome(&tab, &expression, &target)).await
    }

    async fn clear_highlights(&self) -> Result<()> {
        let tab = self.attached_tab()?;
        let expression = clear_highlights_expression();
        blocking(move || parse_js_outcome(&tab, &expression, "page")).await
    }

    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>> {
        let tab = self.attached_tab()?;
        let selector = selector.map(str::to_string);
        blocking(move || {
            let clip = match selector.as_deref() {
                Some(selector) => {
                    let element = find_element(&tab, selector, TAB_CALL_TIMEOUT)?;
                    element
                        .scroll_into_view()
                        .map_err(|err| classify_element_error(err, selector))?;
                    let payload = call_element_fn(&element, ELEMENT_BOX_FN, Vec::new(), selector)?;
                    let text: String = serde_json::from_value(payload).map_err(|err| {
                        AutomationError::Script(format!("element box was not a string: {}", err))
                    })?;
                    let bounds: ElementBox = serde_json::from_str(&text).map_err(|err| {
                        AutomationError::Script(format!("could not parse element box: {}", err))
                    })?;
                    Some(Page::Viewport {
                        x: bounds.x,
                        y: bounds.y,
                        width: bounds.width,
                        height: bounds.height,
                        scale: 1.0,
                    })
                }
                None => None,
            };
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, clip, true)
                .map_err(|err| AutomationError::from_driver(err.to_string()))
        })
        .await
    }

    async fn console_logs(&self) -> Result<Vec<ConsoleMessage>> {
        let tab = self.attached_tab()?;
        blocking(move || {
            // A navigation since the last read wipes the hook; reinstall so
            // capture resumes even when the read itself comes up short.
            install_console_hook(&tab)?;
            let payload = eval_string(&tab, CONSOLE_READ, "console read")?;
            serde_json::from_str(&payload).map_err(|err| {
                AutomationError::Script(format!("could not parse console payload: {}", err))
            })
        })
        .await
    }

    async fn execute_script(&self, source: &str) -> Result<Value> {
        let tab = self.attached_tab()?;
        let expression = evaluate_expression(source);
        blocking(move || {
            let object = tab.evaluate(&expression, true).map_err(|err| {
                match AutomationError::from_driver(err.to_string()) {
                    AutomationError::Unexpected(message) => AutomationError::Script(message),
                    other => other,
                }
            })?;
            let payload: String =
                serde_json::from_value(object.value.unwrap_or(Value::Null)).map_err(|err| {
                    AutomationError::Script(format!("script returned a non-string payload: {}", err))
                })?;
            serde_json::from_str(&payload).map_err(|err| {
                AutomationError::Script(format!("could not parse script result: {}", err))
            })
        })
        .await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            element
                .click()
                .map_err(|err| classify_element_error(err, &selector))?;
            debug!("clicked {}", selector);
            Ok(())
        })
        .await
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        timeout: Duration,
    ) -> Result<()> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        let text = text.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            if clear {
                call_element_fn(&element, CLEAR_FN, Vec::new(), &selector)?;
            }
            element
                .type_into(&text)
                .map_err(|err| classify_element_error(err, &selector))?;
            Ok(())
        })
        .await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            find_element(&tab, &selector, timeout)?;
            Ok(())
        })
        .await
    }

    fn supports(&self, op: Operation) -> bool {
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

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        let value = value.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            call_element_fn(&element, FILL_FN, vec![json!(value)], &selector)?;
            Ok(())
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        let value = value.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            let matched =
                call_element_fn(&element, SELECT_OPTION_FN, vec![json!(value)], &selector)?;
            if matched.as_bool() == Some(true) {
                Ok(())
            } else {
                Err(AutomationError::Unexpected(format!(
                    "no option with value or label {:?} in {}",
                    value, selector
                )))
            }
        })
        .await
    }

    async fn hover(&self, selector: &str, timeout: Duration) -> Result<()> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            element
                .scroll_into_view()
                .map_err(|err| classify_element_error(err, &selector))?;
            let point = element
                .get_midpoint()
                .map_err(|err| classify_element_error(err, &selector))?;
            tab.move_mouse_to_point(point)
                .map_err(|err| AutomationError::from_driver(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let tab = self.attached_tab()?;
        let key = key.to_string();
        blocking(move || {
            tab.press_key(&key)
                .map_err(|err| AutomationError::from_driver(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<()> {
        let tab = self.attached_tab()?;
        let expression = format!(
            "JSON.stringify((() => {{ window.scrollBy({}, {}); return {{ ok: true }}; }})())",
            delta_x, delta_y
        );
        blocking(move || parse_js_outcome(&tab, &expression, "page")).await
    }

    async fn get_text(&self, selector: &str, timeout: Duration) -> Result<String> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            element
                .get_inner_text()
                .map_err(|err| classify_element_error(err, &selector))
        })
        .await
    }

    async fn get_attribute(
        &self,
        selector: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        let name = name.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            let value = call_element_fn(&element, GET_ATTRIBUTE_FN, vec![json!(name)], &selector)?;
            match value {
                Value::Null => Ok(None),
                Value::String(text) => Ok(Some(text)),
                other => Err(AutomationError::Script(format!(
                    "attribute read returned {}",
                    other
                ))),
            }
        })
        .await
    }

    async fn is_visible(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            call_element_bool(&element, IS_VISIBLE_FN, &selector)
        })
        .await
    }

    async fn is_enabled(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            call_element_bool(&element, IS_ENABLED_FN, &selector)
        })
        .await
    }

    async fn is_checked(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = self.attached_tab()?;
        let selector = selector.to_string();
        blocking(move || {
            let element = find_element(&tab, &selector, timeout)?;
            call_element_bool(&element, IS_CHECKED_FN, &selector)
        })
        .await
    }

    async fn go_back(&self) -> Result<()> {
        self.traverse_history("window.history.back()").await
    }

    async fn go_forward(&self) -> Result<()> {
        self.traverse_history("window.history.forward()").await
    }
}

impl ChromeDriver {
    /// History traversal has no navigation promise to await; give the
    /// browser a moment to settle, then reinstall the console hook.
    async fn traverse_history(&self, call: &str) -> Result<()> {
        let tab = self.attached_tab()?;
        let expression = format!("(() => {{ {}; return true; }})()", call);
        let events = self.events.clone();
        blocking(move || {
            eval_value(&tab, &expression)?;
            std::thread::sleep(HISTORY_SETTLE);
            install_console_hook(&tab)?;
            if let Ok(Value::String(url)) = eval_value(&tab, "window.location.href") {
                let _ = events.send(BrowserEvent::Navigated { url });
            }
            Ok(())
        })
        .await
    }
}
