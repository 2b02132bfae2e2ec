//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Enable status poller
    pub enable_poller: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Poller worker options
    pub poller: poller::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            enable_socket_server: true,
            enable_poller: false,
            server: ServerOptions::default(),
            poller: poller::Options::default(),
        }
    }
}

impl AppOptions {
    /// Options derived from the settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            storage: StorageOptions { layout },
            enable_poller: settings.poller.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            poller: poller::Options {
                interval: Duration::from_secs(settings.poller.interval_secs),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout
    pub layout: StorageLayout,
}

/// Server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
