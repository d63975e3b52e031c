//! # page-bridge
//!
//! A localhost JSON bridge that lets an AI coding agent observe and drive
//! the developer's live web page over the Chrome DevTools Protocol (CDP).
//!
//! ## Features
//!
//! - **Bridge protocol**: one HTTP path per operation on the loopback
//!   interface, uniform `{error}` responses, loopback-only CORS
//! - **Session management**: a single owned browser connection with
//!   page matching, staleness detection, bounded retries and recovery
//! - **Element inspection**: structured [`ElementInfo`] snapshots with
//!   computed styles, form state, framework ownership and overlay context
//! - **Chrome driver**: attaches to a browser already running with remote
//!   debugging enabled; it never launches or closes the browser itself
//!
//! ## Running the bridge
//!
//! ```bash
//! # Start your browser with remote debugging enabled
//! chromium --remote-debugging-port=9222
//!
//! # Serve the bridge, pointed at your dev server's page
//! cargo run --bin bridge-server -- --target-url http://localhost:5173
//! ```
//!
//! Then drive it over HTTP:
//!
//! ```bash
//! curl -s localhost:9333/inspect -d '{"selector": "#app"}'
//! curl -s localhost:9333/click -d '{"selector": "button.submit"}'
//! curl -s localhost:9333/console
//! ```
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use page_bridge::bridge::{self, Bridge};
//! use page_bridge::browser::{ChromeConfig, ChromeDriver};
//! use page_bridge::session::{SessionConfig, SessionManager};
//!
//! # async fn run() -> std::io::Result<()> {
//! let driver = Arc::new(ChromeDriver::new(ChromeConfig::default()));
//! let manager = Arc::new(SessionManager::new(driver, SessionConfig::default()));
//! manager.spawn_event_listener();
//!
//! let bridge = Arc::new(Bridge::with_handler(manager));
//! bridge::serve(bridge, bridge::DEFAULT_BRIDGE_PORT).await
//! # }
//! ```
//!
//! ## Module overview
//!
//! - [`bridge`]: the HTTP protocol layer (routing, validation, CORS)
//! - [`session`]: session lifecycle, retry budgets, page matching
//! - [`inspect`]: the element inspection pipeline and [`ElementInfo`]
//! - [`browser`]: the Chrome driver and its connection settings
//! - [`capability`]: the driver trait and shared wire parameter types
//! - [`error`]: the error taxonomy

pub mod bridge;
pub mod browser;
pub mod capability;
pub mod error;
pub mod inspect;
pub mod session;

pub use bridge::{Bridge, DEFAULT_BRIDGE_PORT};
pub use browser::{ChromeConfig, ChromeDriver};
pub use capability::{BrowserCapability, Operation};
pub use error::{AutomationError, Result};
pub use inspect::ElementInfo;
pub use session::{BridgeState, SessionConfig, SessionManager, SessionState};
