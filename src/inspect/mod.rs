//! Element inspection pipeline.
//!
//! The heavy lifting happens inside the page: [`INSPECT_SCRIPT`] evaluates
//! to a collector object with `bySelector` and `atPoint` entry points, and
//! this module builds the call expressions and parses the JSON string the
//! collector returns. The collector is installed once per document under a
//! versioned window slot, so repeated inspections reuse the compiled
//! functions until a navigation replaces the document.

mod element_info;

pub use element_info::{
    AncestorInfo, BoundingBox, ComputedStyles, ElementInfo, FormState, FrameworkInfo, IframeInfo,
    OverlayInfo, ScrollInfo, ShadowInfo, StackingInfo,
};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AutomationError, Result};

/// In-page collector source. Evaluates to `{ bySelector, atPoint }`.
pub const INSPECT_SCRIPT: &str = include_str!("inspect.js");

/// Window slot caching the collector. Bump the suffix when the collector's
/// output shape changes.
const SCRIPT_SLOT: &str = "__pageBridgeInspectV1";

/// Escape a string into a JS string literal, including the quotes.
pub(crate) fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // Line separators are valid JSON but not valid inside JS string
            // literals, and control characters are rejected by the parser.
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn collector() -> String {
    format!("(window.{slot} || (window.{slot} = {INSPECT_SCRIPT}))", slot = SCRIPT_SLOT)
}

/// Expression inspecting the first element matching `selector`.
pub fn selector_expression(selector: &str) -> String {
    format!("JSON.stringify({}.bySelector({}))", collector(), js_string(selector))
}

/// Expression inspecting the topmost element at viewport point `(x, y)`.
pub fn point_expression(x: f64, y: f64) -> String {
    format!("JSON.stringify({}.atPoint({x}, {y}))", collector())
}

#[derive(Debug, Deserialize)]
struct InspectOutcome {
    ok: bool,
    #[serde(default)]
    element: Option<ElementInfo>,
    #[serde(default)]
    error: Option<InspectFailure>,
}

#[derive(Debug, Deserialize)]
struct InspectFailure {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Interpret the collector's JSON string for a call targeting `target`
/// (a selector, or a rendered point for coordinate lookups).
pub fn parse_outcome(value: Value, target: &str) -> Result<ElementInfo> {
    let payload: String = serde_json::from_value(value).map_err(|e| {
        AutomationError::Script(format!("inspection returned a non-string payload: {}", e))
    })?;
    let outcome: InspectOutcome = serde_json::from_str(&payload).map_err(|e| {
        AutomationError::Script(format!("could not parse inspection payload: {}", e))
    })?;
    if outcome.ok {
        return outcome.element.ok_or_else(|| {
            AutomationError::Script("inspection reported success without an element".to_string())
        });
    }
    let failure = outcome.error.unwrap_or(InspectFailure {
        code: "internal".to_string(),
        message: "inspection failed without detail".to_string(),
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
