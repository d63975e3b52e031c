//! Request body parsing and parameter validation.
//!
//! Parsing is two-stage so the agent can tell a typo from a schema mistake:
//! bytes that are not JSON at all become [`AutomationError::MalformedBody`],
//! JSON that fails the parameter schema becomes
//! [`AutomationError::InvalidParams`]. Selector validation additionally
//! pre-screens the jQuery pseudo-selectors coding agents habitually emit,
//! so they fail immediately with guidance instead of burning a retry budget
//! in the browser.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::capability::InspectParams;
use crate::error::{AutomationError, Result};

/// Pseudo-classes that exist in jQuery but not in CSS. Matched against the
/// whole identifier, so `:first-child` never trips the `:first` entry.
const JQUERY_PSEUDOS: &[&str] = &[
    "contains", "eq", "gt", "lt", "first", "last", "even", "odd", "input", "visible", "hidden",
    "checkbox", "radio", "selected",
];

/// Parse a request body into its parameter struct. An empty body is treated
/// as `{}` so operations with all-optional parameters accept a bare POST.
pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value: Value = if bytes.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_slice(bytes)
            .map_err(|err| AutomationError::MalformedBody(err.to_string()))?
    };
    serde_json::from_value(value).map_err(|err| AutomationError::InvalidParams(err.to_string()))
}

/// Reject missing or whitespace-only string parameters, returning the
/// trimmed value otherwise.
pub fn require_non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AutomationError::InvalidParams(format!(
            "{} must be a non-empty string",
            field
        )));
    }
    Ok(trimmed)
}

/// Validate a CSS selector before it reaches the browser. Returns the
/// trimmed selector. Real syntax errors are left for the browser to report;
/// this only catches the empty case and jQuery-only pseudo-classes.
pub fn validate_selector(selector: &str) -> Result<&str> {
    let trimmed = require_non_empty(selector, "selector")?;
    if let Some(pseudo) = jquery_pseudo(trimmed) {
        return Err(AutomationError::InvalidSelector {
            selector: trimmed.to_string(),
            reason: format!(
                ":{} is jQuery syntax, not CSS. Use a standard CSS selector \
                 such as an id, class, or attribute match instead.",
                pseudo
            ),
        });
    }
    Ok(trimmed)
}

/// Coordinates for point inspection must be finite and non-negative.
pub fn validate_point(x: f64, y: f64) -> Result<()> {
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return Err(AutomationError::InvalidParams(
            "x and y must be finite, non-negative numbers".to_string(),
        ));
    }
    Ok(())
}

/// The two ways `/inspect` can address an element.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectTarget {
    Selector(String),
    Point { x: f64, y: f64 },
}

/// Resolve `/inspect` parameters into exactly one addressing mode.
pub fn resolve_inspect_target(params: InspectParams) -> Result<InspectTarget> {
    match (params.selector, params.x, params.y) {
        (Some(selector), None, None) => {
            let selector = validate_selector(&selector)?.to_string();
            Ok(InspectTarget::Selector(selector))
        }
        (None, Some(x), Some(y)) => {
            validate_point(x, y)?;
            Ok(InspectTarget::Point { x, y })
        }
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(AutomationError::InvalidParams(
            "provide either selector or x/y coordinates, not both".to_string(),
        )),
        (None, Some(_), None) | (None, None, Some(_)) => Err(AutomationError::InvalidParams(
            "point inspection requires both x and y".to_string(),
        )),
        (None, None, None) => Err(AutomationError::InvalidParams(
            "inspect requires a selector or x/y coordinates".to_string(),
        )),
    }
}

/// Scan for a jQuery-only pseudo-class outside quoted sections. Identifiers
/// are compared whole, so CSS pseudo-classes sharing a prefix pass.
fn jquery_pseudo(selector: &str) -> Option<&'static str> {
    let bytes = selector.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b':' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'-')
                {
                    end += 1;
                }
                if end > start {
                    let ident = &selector[start..end];
                    if let Some(hit) = JQUERY_PSEUDOS
                        .iter()
                        .find(|pseudo| ident.eq_ignore_ascii_case(pseudo))
                    {
                        return Some(hit);
                    }
                }
                i = end.max(start);
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ClickParams, ConsoleParams};

    #[test]
    fn test_parse_body_distinguishes_malformed_from_invalid() {
        let err = parse_body::<ClickParams>(b"{not json").expect_err("malformed");
        assert!(matches!(err, AutomationError::MalformedBody(_)));

        let err = parse_body::<ClickParams>(b"{\"wrong\": 1}").expect_err("schema");
        assert!(matches!(err, AutomationError::InvalidParams(_)));
        assert!(err.to_string().contains("selector"));
    }

    #[test]
    fn test_parse_body_accepts_empty_body_for_optional_params() {
        let params: ConsoleParams = parse_body(b"").expect("empty body");
        assert!(params.level.is_none());
        assert!(params.limit.is_none());
    }

    #[test]
    fn test_selector_must_be_non_empty() {
        for bad in ["", "   ", "\t\n"] {
            let err = validate_selector(bad).expect_err("empty selector");
            assert!(matches!(err, AutomationError::InvalidParams(_)));
            assert_eq!(err.to_string(), "selector must be a non-empty string");
        }
    }

    #[test]
    fn test_selector_is_trimmed() {
        assert_eq!(validate_selector("  #app  ").expect("valid"), "#app");
    }

    #[test]
    fn test_jquery_pseudo_selectors_are_rejected_with_guidance() {
        let err = validate_selector("button:contains('Go')").expect_err("jquery");
        match err {
            AutomationError::InvalidSelector { selector, reason } => {
                assert_eq!(selector, "button:contains('Go')");
                assert!(reason.contains(":contains"));
                assert!(reason.contains("jQuery"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        for bad in ["li:eq(2)", "div:first", "tr:even", ":input", "div:visible"] {
            let err = validate_selector(bad).expect_err(bad);
            assert!(matches!(err, AutomationError::InvalidSelector { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_css_pseudo_classes_pass() {
        for good in [
            "li:first-child",
            "tr:nth-of-type(2)",
            "p:last-of-type",
            "a:hover",
            "input:checked",
            "div::before",
            "section:has(> h2)",
            "input:not([disabled])",
        ] {
            assert!(validate_selector(good).is_ok(), "{}", good);
        }
    }

    #[test]
    fn test_quoted_sections_are_ignored() {
        assert!(validate_selector("[data-label=\"first:contains\"]").is_ok());
        assert!(validate_selector("[title='12:30']").is_ok());
    }

    #[test]
    fn test_point_validation() {
        assert!(validate_point(0.0, 0.0).is_ok());
        assert!(validate_point(120.5, 48.0).is_ok());
        assert!(validate_point(f64::NAN, 10.0).is_err());
        assert!(validate_point(10.0, f64::INFINITY).is_err());
        assert!(validate_point(-1.0, 10.0).is_err());
    }

    #[test]
    fn test_inspect_target_resolution() {
        let target = resolve_inspect_target(InspectParams {
            selector: Some("#app".into()),
            x: None,
            y: None,
        })
        .expect("selector mode");
        assert_eq!(target, InspectTarget::Selector("#app".into()));

        let target = resolve_inspect_target(InspectParams {
            selector: None,
            x: Some(10.0),
            y: Some(20.0),
        })
        .expect("point mode");
        assert_eq!(target, InspectTarget::Point { x: 10.0, y: 20.0 });

        let err = resolve_inspect_target(InspectParams {
            selector: Some("#app".into()),
            x: Some(10.0),
            y: Some(20.0),
        })
        .expect_err("both modes");
        assert!(matches!(err, AutomationError::InvalidParams(_)));

        let err = resolve_inspect_target(InspectParams {
            selector: None,
            x: Some(10.0),
            y: None,
        })
        .expect_err("half a point");
        assert!(err.to_string().contains("both x and y"));

        let err = resolve_inspect_target(InspectParams::default()).expect_err("nothing");
        assert!(matches!(err, AutomationError::InvalidParams(_)));
    }
}
