//! Engine configuration

#[cfg(feature = "tls")]
use crate::tls::TlsOptions;
use std::time::Duration;

/// Client engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on TCP connect (default: 30s)
    pub connect_timeout: Option<Duration>,
    /// Bound on the whole exchange (default: none)
    pub exchange_timeout: Option<Duration>,
    /// TCP_NODELAY on the client socket
    pub tcp_nodelay: bool,
    /// TCP keepalive idle time
    pub tcp_keepalive: Option<Duration>,
    /// Name of the worker thread
    pub thread_name: String,
    /// Options for the engine's own TLS context. `None` uses the
    /// process-wide context.
    #[cfg(feature = "tls")]
    pub tls: Option<TlsOptions>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            exchange_timeout: None,
            tcp_nodelay: true,
            tcp_keepalive: None,
            thread_name: "gale-reactor".to_string(),
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn exchange_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    pub fn tcp_keepalive(mut self, idle: Option<Duration>) -> Self {
        self.tcp_keepalive = idle;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Give the engine its own TLS context built from `options`
    #[cfg(feature = "tls")]
    pub fn tls(mut self, options: TlsOptions) -> Self {
        self.tls = Some(options);
        self
    }
}
