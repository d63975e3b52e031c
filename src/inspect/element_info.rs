//! Typed shape of an inspection result.
//!
//! Everything here mirrors the JSON produced by the in-page collector, so
//! the field names on the wire are camelCase. Enrichment sections are
//! optional and only present when their detector produced a positive
//! signal, which keeps payloads small on plain static pages.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured description of one element, as seen by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Stable selector synthesised for this element: `#id` when one exists,
    /// otherwise tag plus classes plus a positional disambiguator.
    pub selector: String,
    /// Short human label such as "Button" or "Navigation".
    pub description: String,
    pub bounding_box: BoundingBox,
    /// Attributes in document order.
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    pub computed_styles: ComputedStyles,
    /// Trimmed text content, truncated to a fixed ceiling.
    #[serde(default)]
    pub text_content: String,
    /// Up to six ancestors, immediate parent first.
    #[serde(default)]
    pub parent_chain: Vec<AncestorInfo>,
    pub sibling_count: u32,
    pub child_count: u32,
    /// Form control state, present when the element is an input, select or
    /// textarea.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_state: Option<FormState>,
    /// Present (and true) when the element looks like it is still loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_loading: Option<bool>,

    // -- point-based enrichments, present only on a positive signal ----------
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacking: Option<StackingInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe: Option<IframeInfo>,
    #[serde(default, rename = "shadowDOM", skip_serializing_if = "Option::is_none")]
    pub shadow_dom: Option<ShadowInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<ScrollInfo>,
}

/// Viewport-relative box, rounded to integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Fixed subset of computed styles worth reporting to an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyles {
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub width: String,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub margin: String,
    #[serde(default)]
    pub padding: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub font: String,
}

/// One ancestor in the parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AncestorInfo {
    pub tag_name: String,
    pub selector: String,
    pub description: String,
}

/// Detected frontend framework and the owning component, when one of the
/// framework walks found internals attached to the element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkInfo {
    /// `react`, `vue`, `angular` or `svelte`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Source file hint from debug metadata, when the page ships it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Shallow serializable props, functions and nodes stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
}

/// State of a form control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    #[serde(default)]
    pub value: String,
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// First option labels of a select control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Overlay containment: the element sits inside a dialog, modal, drawer,
/// popover, tooltip or dropdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayInfo {
    #[serde(rename = "type")]
    pub overlay_type: String,
    /// Whether a dismiss affordance was found (close button, or an overlay
    /// kind that dismisses on outside interaction).
    pub can_dismiss: bool,
}

/// Stacking context summary for point-based inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackingInfo {
    /// Effective z-index, absent when every context resolves to `auto`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Descriptions of elements stacked at the inspected point, topmost
    /// first, capped to a short list.
    #[serde(default)]
    pub stack: Vec<String>,
}

/// Frame containment: the element is an `<iframe>`, or the inspected
/// document is itself embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IframeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_url: Option<String>,
}

/// Shadow DOM containment and the host that owns the shadow root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowInfo {
    pub host_selector: String,
    pub host_description: String,
    #[serde(default)]
    pub mode: String,
}

/// Scroll and viewport context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollInfo {
    pub scrollable: bool,
    pub scroll_x: i64,
    pub scroll_y: i64,
    /// Percentage of the element's area inside the viewport, 0 to 100.
    pub visible_percent: u8,
}
