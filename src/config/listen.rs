//! Listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// One listening socket, optionally TLS-wrapped.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Address to bind to (e.g., "0.0.0.0:6667").
    pub address: SocketAddr,
    /// TLS material for this listener. Plaintext when absent.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format).
    pub key_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_deserialize_plain() {
        let toml_str = r#"
            address = "0.0.0.0:6667"
        "#;
        let cfg: ListenerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.address.port(), 6667);
        assert!(cfg.tls.is_none());
    }

    #[test]
    fn listener_deserialize_tls() {
        let toml_str = r#"
            address = "0.0.0.0:6697"

            [tls]
            cert_path = "/path/to/cert.pem"
            key_path = "/path/to/key.pem"
        "#;
        let cfg: ListenerConfig = toml::from_str(toml_str).unwrap();
        let tls = cfg.tls.unwrap();
        assert_eq!(tls.cert_path, "/path/to/cert.pem");
        assert_eq!(tls.key_path, "/path/to/key.pem");
    }
}
