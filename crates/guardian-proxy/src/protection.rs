//! Enabling and disabling protection.
//!
//! [`Protection`] owns the running server and tells the operating system
//! about it through a [`SystemProxy`] collaborator. Registration is
//! platform glue outside this crate: its failures are logged and never take
//! the proxy down.

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::filter::ProxyFilter;
use crate::server::{self, ProxyHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Registers this proxy as the system's HTTP/HTTPS proxy.
pub trait SystemProxy: Send + Sync {
    /// Route system traffic through `host:port`.
    fn configure(&self, host: &str, port: u16) -> Result<()>;

    /// Remove the registration.
    fn disable(&self) -> Result<()>;
}

/// Collaborator that leaves system settings alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSystemProxy;

impl SystemProxy for NoopSystemProxy {
    fn configure(&self, host: &str, port: u16) -> Result<()> {
        info!(
            "Point your HTTP and HTTPS proxy settings at {}:{}",
            host, port
        );
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        Ok(())
    }
}

/// The proxy server plus its system registration.
pub struct Protection {
    config: ProxyConfig,
    filter: ProxyFilter,
    system_proxy: Arc<dyn SystemProxy>,
    handle: Option<ProxyHandle>,
}

impl Protection {
    #[must_use]
    pub fn new(config: ProxyConfig, filter: ProxyFilter, system_proxy: Arc<dyn SystemProxy>) -> Self {
        Self {
            config,
            filter,
            system_proxy,
            handle: None,
        }
    }

    /// Start the server and register it. Enabling twice is a no-op.
    ///
    /// Only a server start failure is returned.
    pub async fn enable(&mut self) -> Result<SocketAddr> {
        if let Some(handle) = &self.handle {
            return Ok(handle.local_addr());
        }

        let handle = server::start(self.config.clone(), self.filter.clone()).await?;
        let addr = handle.local_addr();
        if let Err(e) = self
            .system_proxy
            .configure(&addr.ip().to_string(), addr.port())
        {
            warn!("Failed to register system proxy: {}", e);
        }
        self.handle = Some(handle);
        info!("Protection enabled on {}", addr);
        Ok(addr)
    }

    /// Unregister and stop the server. Disabling twice is a no-op.
    pub async fn disable(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = self.system_proxy.disable() {
            warn!("Failed to unregister system proxy: {}", e);
        }
        handle.stop().await;
        info!("Protection disabled");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    /// Address of the running server, if enabled.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.as_ref().map(ProxyHandle::local_addr)
    }
}

impl std::fmt::Debug for Protection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protection")
            .field("config", &self.config)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use guardian::Classifier;
    use std::sync::Mutex;
    use tokio::net::TcpStream;

    /// Records calls and fails every one of them.
    #[derive(Default)]
    struct FailingSystemProxy {
        calls: Mutex<Vec<String>>,
    }

    impl SystemProxy for FailingSystemProxy {
        fn configure(&self, host: &str, port: u16) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("configure {}:{}", host, port));
            Err(ProxyError::SystemProxy("registry unavailable".to_string()))
        }

        fn disable(&self) -> Result<()> {
            self.calls.lock().unwrap().push("disable".to_string());
            Err(ProxyError::SystemProxy("registry unavailable".to_string()))
        }
    }

    fn config() -> ProxyConfig {
        ProxyConfig {
            bind_port: 0,
            drain_timeout_ms: Some(1_000),
            ..Default::default()
        }
    }

    fn filter() -> ProxyFilter {
        ProxyFilter::new(Arc::new(Classifier::default()))
    }

    #[tokio::test]
    async fn test_enable_survives_registration_failure() {
        let system = Arc::new(FailingSystemProxy::default());
        let mut protection = Protection::new(config(), filter(), system.clone());

        let addr = protection.enable().await.unwrap();
        assert!(protection.is_enabled());
        assert_eq!(protection.local_addr(), Some(addr));
        assert!(TcpStream::connect(addr).await.is_ok());

        protection.disable().await;
        assert!(!protection.is_enabled());
        assert!(protection.local_addr().is_none());

        let calls = system.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![format!("configure 127.0.0.1:{}", addr.port()), "disable".to_string()]
        );
    }

    #[tokio::test]
    async fn test_enable_and_disable_are_idempotent() {
        let system = Arc::new(FailingSystemProxy::default());
        let mut protection = Protection::new(config(), filter(), system.clone());

        let first = protection.enable().await.unwrap();
        let second = protection.enable().await.unwrap();
        assert_eq!(first, second);

        protection.disable().await;
        protection.disable().await;
        assert_eq!(system.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_noop_system_proxy() {
        let mut protection = Protection::new(config(), filter(), Arc::new(NoopSystemProxy));
        protection.enable().await.unwrap();
        protection.disable().await;
        assert!(!protection.is_enabled());
    }
}
