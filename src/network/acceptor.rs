//! ConnectionAcceptor - owns the listening sockets and the shutdown path.
//!
//! Each configured address gets a listener (TLS-wrapped where configured)
//! whose accept loop funnels sockets into one channel. A single run loop
//! multiplexes that channel against OS termination signals, so acceptance
//! and shutdown share one fair wait point. Accept failures are logged and
//! the loop continues; bind failures are fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{BufReader, Cursor};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::config::{ListenerConfig, TlsConfig};
use crate::network::ClientSession;
use crate::state::Bouncer;

/// Pending accepted sockets between the accept loops and the run loop.
const ACCEPT_BACKLOG: usize = 64;

struct Listener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    address: SocketAddr,
}

/// Accepts incoming connections and turns each into a [`ClientSession`].
pub struct Acceptor {
    listeners: Vec<Listener>,
}

impl Acceptor {
    /// Bind every configured address. Any failure here is fatal.
    pub async fn bind(configs: &[ListenerConfig]) -> anyhow::Result<Self> {
        let mut listeners = Vec::with_capacity(configs.len());
        for cfg in configs {
            let tls = match &cfg.tls {
                Some(tls_cfg) => Some(Self::load_tls(tls_cfg)?),
                None => None,
            };
            let listener = TcpListener::bind(cfg.address).await?;
            info!(
                address = %cfg.address,
                tls = tls.is_some(),
                "Listener bound"
            );
            listeners.push(Listener {
                listener,
                tls,
                address: cfg.address,
            });
        }
        Ok(Self { listeners })
    }

    /// Load TLS certificates and create a TlsAcceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

        if certs.is_empty() {
            anyhow::bail!("No certificates found in {}", config.cert_path);
        }

        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let mut keys: Vec<PrivateKeyDer> = pkcs8_private_keys(key_reader)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PrivateKeyDer::from)
            .collect();

        if keys.is_empty() {
            anyhow::bail!("No private keys found in {}", config.key_path);
        }

        let key = keys.remove(0);

        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Run until a termination signal arrives, then close listeners and ask
    /// every network session to quit upstream before returning.
    pub async fn run(self, bouncer: Arc<Bouncer>) -> anyhow::Result<()> {
        let (conn_tx, mut conn_rx) = mpsc::channel(ACCEPT_BACKLOG);

        let mut accept_tasks: Vec<JoinHandle<()>> = Vec::with_capacity(self.listeners.len());
        for Listener {
            listener,
            tls,
            address,
        } in self.listeners
        {
            let tx = conn_tx.clone();
            accept_tasks.push(tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, peer)) => {
                            if tx.send((stream, peer, tls.clone())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            // Not fatal: log and keep accepting.
                            error!(address = %address, error = %e, "Failed to accept connection");
                        }
                    }
                }
            }));
        }
        drop(conn_tx);

        let mut signals = Signals::new()?;

        loop {
            tokio::select! {
                accepted = conn_rx.recv() => match accepted {
                    Some((stream, peer, tls)) => spawn_session(Arc::clone(&bouncer), stream, peer, tls),
                    None => break,
                },
                sig = signals.recv() => {
                    info!(signal = sig, "Termination signal received, shutting down");
                    break;
                }
            }
        }

        // Stop accepting before tearing down upstream links.
        for task in &accept_tasks {
            task.abort();
        }

        shutdown_networks(&bouncer).await;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Turn one accepted socket into a client session task. The TLS handshake,
/// when there is one, happens inside the task so a stalled handshake cannot
/// block the run loop.
fn spawn_session(
    bouncer: Arc<Bouncer>,
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
) {
    let id = bouncer.ids.next();
    tokio::spawn(async move {
        info!(%id, addr = %peer, "Client connected");
        let session = ClientSession::new(id, peer, bouncer);
        let result = match tls {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => session.run(tls_stream).await,
                Err(e) => {
                    warn!(addr = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            },
            None => session.run(stream).await,
        };
        if let Err(e) = result {
            warn!(%id, addr = %peer, error = %e, "Client connection error");
        }
        info!(%id, addr = %peer, "Client connection closed");
    });
}

/// Ask every network session to quit upstream. Part of the shutdown path;
/// failures here would be process-fatal, but sends to session tasks only
/// fail once those tasks are already gone.
async fn shutdown_networks(bouncer: &Bouncer) {
    for user in bouncer.users.all() {
        for network in user.networks_sorted() {
            network.shutdown().await;
        }
    }
}

/// The OS termination signals the bouncer quits on.
struct Signals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
    quit: Signal,
}

impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}
