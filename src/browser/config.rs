//! Connection settings for the Chrome driver.

/// Where to find the browser's remote-debugging endpoint. The driver never
/// launches a browser; it attaches to one the developer already runs.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub host: String,
    pub port: u16,
    /// Explicit websocket URL. When set, `/json/version` discovery is
    /// skipped entirely.
    pub ws_url: Option<String>,
}

impl ChromeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into());
        self
    }

    /// HTTP endpoint used to discover the websocket debugger URL.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 9222, ws_url: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ChromeConfig::new().host("localhost").port(9223);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9223);
        assert_eq!(config.endpoint(), "http://localhost:9223");
        assert!(config.ws_url.is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config = ChromeConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9222);
        assert_eq!(config.endpoint(), "http://127.0.0.1:9222");
    }

    #[test]
    fn test_ws_url_override() {
        let config = ChromeConfig::new().ws_url("ws://127.0.0.1:9222/devtools/browser/abc");
        assert_eq!(
            config.ws_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
    }
}
