//! Listener and middleware settings for the translation server.

use std::net::{Ipv4Addr, SocketAddr};

/// Resolved settings for one server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket the listener binds to
    pub addr: SocketAddr,
    /// Largest accepted form body, in bytes
    pub max_body_size: usize,
    /// Attach the HTTP trace layer
    pub logging: bool,
    /// Attach the cross-origin policy layer
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            // 512 characters of UTF-8 form data fit many times over
            max_body_size: 64 * 1024,
            logging: true,
            cors_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Keep the host, change the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Listen on `0.0.0.0`, keeping the port
    pub fn bind_all(mut self) -> Self {
        self.addr.set_ip(Ipv4Addr::UNSPECIFIED.into());
        self
    }

    /// Replace the whole socket address
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Change the form body limit
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Skip the trace layer
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Skip the cross-origin layer
    pub fn without_cors(mut self) -> Self {
        self.cors_enabled = false;
        self
    }
}
