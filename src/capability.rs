//! The capability surface a browser driver exposes to the session manager.
//!
//! Required operations are plain trait methods every driver must implement.
//! Optional operations have default bodies that report
//! [`AutomationError::Unsupported`], and `supports` lets callers gate a
//! request before any session work is queued.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{AutomationError, Result};
use crate::inspect::ElementInfo;

/// Every operation the bridge can dispatch, required and optional alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    State,
    Navigate,
    Inspect,
    Highlight,
    ClearHighlights,
    Screenshot,
    Console,
    Reload,
    Click,
    Type,
    WaitFor,
    Fill,
    SelectOption,
    Hover,
    PressKey,
    DragAndDrop,
    Scroll,
    WaitForResponse,
    GetText,
    GetAttribute,
    IsVisible,
    IsEnabled,
    IsChecked,
    Evaluate,
    AccessibilitySnapshot,
    GoBack,
    GoForward,
    SetDialogHandler,
}

impl Operation {
    pub const ALL: [Operation; 28] = [
        Operation::State,
        Operation::Navigate,
        Operation::Inspect,
        Operation::Highlight,
        Operation::ClearHighlights,
        Operation::Screenshot,
        Operation::Console,
        Operation::Reload,
        Operation::Click,
        Operation::Type,
        Operation::WaitFor,
        Operation::Fill,
        Operation::SelectOption,
        Operation::Hover,
        Operation::PressKey,
        Operation::DragAndDrop,
        Operation::Scroll,
        Operation::WaitForResponse,
        Operation::GetText,
        Operation::GetAttribute,
        Operation::IsVisible,
        Operation::IsEnabled,
        Operation::IsChecked,
        Operation::Evaluate,
        Operation::AccessibilitySnapshot,
        Operation::GoBack,
        Operation::GoForward,
        Operation::SetDialogHandler,
    ];

    /// The HTTP path the bridge serves this operation on.
    pub fn path(&self) -> &'static str {
        match self {
            Operation::State => "/state",
            Operation::Navigate => "/navigate",
            Operation::Inspect => "/inspect",
            Operation::Highlight => "/highlight",
            Operation::ClearHighlights => "/clear-highlights",
            Operation::Screenshot => "/screenshot",
            Operation::Console => "/console",
            Operation::Reload => "/reload",
            Operation::Click => "/click",
            Operation::Type => "/type",
            Operation::WaitFor => "/wait-for",
            Operation::Fill => "/fill",
            Operation::SelectOption => "/select-option",
            Operation::Hover => "/hover",
            Operation::PressKey => "/press-key",
            Operation::DragAndDrop => "/drag-and-drop",
            Operation::Scroll => "/scroll",
            Operation::WaitForResponse => "/wait-for-response",
            Operation::GetText => "/get-text",
            Operation::GetAttribute => "/get-attribute",
            Operation::IsVisible => "/is-visible",
            Operation::IsEnabled => "/is-enabled",
            Operation::IsChecked => "/is-checked",
            Operation::Evaluate => "/evaluate",
            Operation::AccessibilitySnapshot => "/accessibility-snapshot",
            Operation::GoBack => "/go-back",
            Operation::GoForward => "/go-forward",
            Operation::SetDialogHandler => "/set-dialog-handler",
        }
    }

    /// Human-readable name used in timeout and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Operation::State => "State",
            Operation::Navigate => "Navigate",
            Operation::Inspect => "Inspect",
            Operation::Highlight => "Highlight",
            Operation::ClearHighlights => "Clear-highlights",
            Operation::Screenshot => "Screenshot",
            Operation::Console => "Console",
            Operation::Reload => "Reload",
            Operation::Click => "Click",
            Operation::Type => "Type",
            Operation::WaitFor => "Wait-for",
            Operation::Fill => "Fill",
            Operation::SelectOption => "Select-option",
            Operation::Hover => "Hover",
            Operation::PressKey => "Press-key",
            Operation::DragAndDrop => "Drag-and-drop",
            Operation::Scroll => "Scroll",
            Operation::WaitForResponse => "Wait-for-response",
            Operation::GetText => "Get-text",
            Operation::GetAttribute => "Get-attribute",
            Operation::IsVisible => "Is-visible",
            Operation::IsEnabled => "Is-enabled",
            Operation::IsChecked => "Is-checked",
            Operation::Evaluate => "Evaluate",
            Operation::AccessibilitySnapshot => "Accessibility-snapshot",
            Operation::GoBack => "Go-back",
            Operation::GoForward => "Go-forward",
            Operation::SetDialogHandler => "Set-dialog-handler",
        }
    }

    /// Required operations must exist on every driver; the rest are gated
    /// behind [`BrowserCapability::supports`].
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            Operation::State
                | Operation::Navigate
                | Operation::Inspect
                | Operation::Highlight
                | Operation::ClearHighlights
                | Operation::Screenshot
                | Operation::Console
                | Operation::Reload
                | Operation::Click
                | Operation::Type
                | Operation::WaitFor
        )
    }

    /// Whether the operation targets a single element, which changes how
    /// timeout messages are phrased.
    pub fn targets_element(&self) -> bool {
        matches!(
            self,
            Operation::Inspect
                | Operation::Highlight
                | Operation::Click
                | Operation::Type
                | Operation::WaitFor
                | Operation::Fill
                | Operation::SelectOption
                | Operation::Hover
                | Operation::DragAndDrop
                | Operation::GetText
                | Operation::GetAttribute
                | Operation::IsVisible
                | Operation::IsEnabled
                | Operation::IsChecked
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One open page (CDP target) reported by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDescriptor {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Severity of a captured console entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

/// One entry from the in-page console ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
    /// Where the entry came from: `console`, `javascript-error`, or
    /// `unhandled-rejection`.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// ISO 8601 timestamp recorded in the page.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// What a scripted dialog handler should do when a dialog fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogAction {
    Accept,
    Dismiss,
}

/// Lifecycle events fanned out to subscribers over a broadcast channel.
/// Slow subscribers lag and drop old events rather than blocking the driver.
#[derive(Debug, Clone)]
pub enum BrowserEvent {
    Navigated { url: String },
    Loaded { url: String },
    PageError { message: String },
    Console { message: ConsoleMessage },
}

/// Broadcast channel capacity for [`BrowserEvent`] fan-out.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// -- wire parameter shapes ---------------------------------------------------
//
// These are the request bodies the bridge accepts, shared here so drivers,
// tests and the bridge agree on field names. All JSON fields are camelCase.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectParams {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightParams {
    pub selector: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, alias = "duration")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleParams {
    #[serde(default)]
    pub level: Option<ConsoleLevel>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Options accepted by element-targeted operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOptions {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TargetOptions {
    /// Effective budget for the operation, falling back to the configured
    /// default when the caller did not override it.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickParams {
    pub selector: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeParams {
    pub selector: String,
    pub text: String,
    /// Clear the field before typing instead of appending.
    #[serde(default)]
    pub clear: bool,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForParams {
    pub selector: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillParams {
    pub selector: String,
    pub value: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptionParams {
    pub selector: String,
    /// Matched against option values first, then visible labels.
    pub value: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverParams {
    pub selector: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressKeyParams {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragAndDropParams {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollParams {
    pub delta_x: f64,
    pub delta_y: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForResponseParams {
    pub url_pattern: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTextParams {
    pub selector: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributeParams {
    pub selector: String,
    pub name: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorParams {
    pub selector: String,
    #[serde(default)]
    pub options: TargetOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub script: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDialogHandlerParams {
    pub action: DialogAction,
    #[serde(default)]
    pub prompt_text: Option<String>,
}

fn unsupported(op: Operation) -> AutomationError {
    AutomationError::Unsupported { op }
}

/// One browser connection as the session manager sees it.
///
/// Implementations must be safe to call from multiple tasks; the session
/// manager serializes operations, but lifecycle queries like `is_connected`
/// and `subscribe` can arrive at any time.
#[async_trait]
pub trait BrowserCapability: Send + Sync {
    // -- lifecycle -----------------------------------------------------------

    /// Establish the transport. Idempotent: succeeds immediately when a
    /// responsive connection already exists.
    async fn connect(&self) -> Result<()>;

    /// Tear down the transport and forget the attached page.
    async fn disconnect(&self) -> Result<()>;

    /// Cheap local check, no browser round trip.
    async fn is_connected(&self) -> bool;

    // -- pages ---------------------------------------------------------------

    async fn list_pages(&self) -> Result<Vec<PageDescriptor>>;

    async fn attach_page(&self, page_id: &str) -> Result<()>;

    /// Live URL of the attached page. Round-trips to the browser, so a
    /// success also proves the page is responsive.
    async fn current_url(&self) -> Result<String>;

    // -- navigation ----------------------------------------------------------

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    // -- inspection ----------------------------------------------------------

    async fn inspect_selector(&self, selector: &str) -> Result<ElementInfo>;

    async fn inspect_point(&self, x: f64, y: f64) -> Result<ElementInfo>;

    async fn highlight(&self, selector: &str, color: &str, duration_ms: u64) -> Result<()>;

    async fn clear_highlights(&self) -> Result<()>;

    // -- observation ---------------------------------------------------------

    /// PNG screenshot of the page, or of a single element when a selector
    /// is given.
    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>>;

    /// Snapshot of the in-page console ring buffer, oldest first.
    async fn console_logs(&self) -> Result<Vec<ConsoleMessage>>;

    /// Evaluate a script in the page and return its JSON value.
    async fn execute_script(&self, source: &str) -> Result<Value>;

    // -- input ---------------------------------------------------------------

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn type_text(&self, selector: &str, text: &str, clear: bool, timeout: Duration)
    -> Result<()>;

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    // -- capability registry -------------------------------------------------

    /// Whether the driver implements `op`. Callers must check this before
    /// dispatching an optional operation.
    fn supports(&self, op: Operation) -> bool;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<BrowserEvent>;

    // -- optional operations -------------------------------------------------

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let _ = (selector, value, timeout);
        Err(unsupported(Operation::Fill))
    }

    async fn select_option(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let _ = (selector, value, timeout);
        Err(unsupported(Operation::SelectOption))
    }

    async fn hover(&self, selector: &str, timeout: Duration) -> Result<()> {
        let _ = (selector, timeout);
        Err(unsupported(Operation::Hover))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let _ = key;
        Err(unsupported(Operation::PressKey))
    }

    async fn drag_and_drop(&self, source: &str, target: &str, timeout: Duration) -> Result<()> {
        let _ = (source, target, timeout);
        Err(unsupported(Operation::DragAndDrop))
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<()> {
        let _ = (delta_x, delta_y);
        Err(unsupported(Operation::Scroll))
    }

    async fn wait_for_response(&self, url_pattern: &str, timeout: Duration) -> Result<Value> {
        let _ = (url_pattern, timeout);
        Err(unsupported(Operation::WaitForResponse))
    }

    async fn get_text(&self, selector: &str, timeout: Duration) -> Result<String> {
        let _ = (selector, timeout);
        Err(unsupported(Operation::GetText))
    }

    async fn get_attribute(
        &self,
        selector: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let _ = (selector, name, timeout);
        Err(unsupported(Operation::GetAttribute))
    }

    async fn is_visible(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let _ = (selector, timeout);
        Err(unsupported(Operation::IsVisible))
    }

    async fn is_enabled(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let _ = (selector, timeout);
        Err(unsupported(Operation::IsEnabled))
    }

    async fn is_checked(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let _ = (selector, timeout);
        Err(unsupported(Operation::IsChecked))
    }

    async fn accessibility_snapshot(&self) -> Result<Value> {
        Err(unsupported(Operation::AccessibilitySnapshot))
    }

    async fn go_back(&self) -> Result<()> {
        Err(unsupported(Operation::GoBack))
    }

    async fn go_forward(&self) -> Result<()> {
        Err(unsupported(Operation::GoForward))
    }

    async fn set_dialog_handler(
        &self,
        action: DialogAction,
        prompt_text: Option<&str>,
    ) -> Result<()> {
        let _ = (action, prompt_text);
        Err(unsupported(Operation::SetDialogHandler))
    }
}
