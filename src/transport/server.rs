//! Acceptor (spec §4.8): listens on a configured endpoint and, per accepted
//! socket, spawns a short-lived bootstrap task that waits for the peer's
//! CER before handing the connection off to the caller (the node wires
//! this hand-off to peer-table lookup + PSM dispatch in `peer.rs`).
//!
//! The teacher's original acceptor spawned the per-connection task and then
//! unconditionally called `todo!()` right after — a leftover that would
//! panic the accept loop on the very first connection. This version returns
//! from `handle_peer` once the task is spawned, same as any fire-and-forget
//! accept loop.

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::transport::{spawn_reader, Codec, Connection};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// How long the bootstrap task waits for an incoming CER before giving up
/// on the connection (spec §4.8's `INCNX_TIMEOUT`).
pub const INCNX_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone, Default)]
pub struct AcceptorConfig {
    pub native_tls: Option<Arc<native_tls::Identity>>,
}

pub struct Acceptor {
    listener: TcpListener,
    config: AcceptorConfig,
    dict: Arc<Dictionary>,
}

impl Acceptor {
    pub async fn bind(addr: &str, config: AcceptorConfig, dict: Arc<Dictionary>) -> Result<Acceptor> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Acceptor {
            listener,
            config,
            dict,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, handing each bootstrapped peer to
    /// `on_bootstrap` once its CER has arrived. `on_bootstrap` receives the
    /// decoded CER, the `Connection` to reply on, and the inbound stream
    /// for every message after the CER.
    pub async fn listen<F, Fut>(&mut self, on_bootstrap: F) -> Result<()>
    where
        F: Fn(
                crate::diameter::DiameterMessage,
                Arc<Connection>,
                tokio::sync::mpsc::Receiver<crate::diameter::DiameterMessage>,
            ) -> Fut
            + Clone
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let dict = Arc::clone(&self.dict);
            let config = self.config.clone();
            let on_bootstrap = on_bootstrap.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::bootstrap(stream, peer_addr, config, dict, on_bootstrap).await {
                    log::warn!("[{}] bootstrap failed: {}", peer_addr, e);
                }
            });
        }
    }

    async fn bootstrap<F, Fut>(
        stream: TcpStream,
        peer_addr: SocketAddr,
        config: AcceptorConfig,
        dict: Arc<Dictionary>,
        on_bootstrap: F,
    ) -> Result<()>
    where
        F: Fn(
                crate::diameter::DiameterMessage,
                Arc<Connection>,
                tokio::sync::mpsc::Receiver<crate::diameter::DiameterMessage>,
            ) -> Fut
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        log::info!("[{}] connection accepted", peer_addr);

        let (cnx, mut rx) = match config.native_tls {
            Some(identity) => {
                let acceptor = native_tls::TlsAcceptor::new((*identity).clone())?;
                let acceptor = tokio_native_tls::TlsAcceptor::from(acceptor);
                let tls_stream = acceptor.accept(stream).await.map_err(|e| {
                    Error::ServerError(format!("TLS handshake failed: {}", e))
                })?;
                let (reader, writer) = tokio::io::split(tls_stream);
                let cnx = Arc::new(Connection::new(Box::new(writer), peer_addr));
                let rx = spawn_reader(Box::new(reader), Arc::clone(&dict), peer_addr);
                (cnx, rx)
            }
            None => {
                let (reader, writer) = tokio::io::split(stream);
                let cnx = Arc::new(Connection::new(Box::new(writer), peer_addr));
                let rx = spawn_reader(Box::new(reader), Arc::clone(&dict), peer_addr);
                (cnx, rx)
            }
        };

        let cer = tokio::time::timeout(INCNX_TIMEOUT, rx.recv())
            .await
            .map_err(|_| Error::ServerError("timed out waiting for CER".into()))?
            .ok_or_else(|| Error::ServerError("connection closed before CER".into()))?;

        if !cer.is_request() || cer.header.code != 257 {
            return Err(Error::ProtocolViolation(
                "first message on an incoming connection must be a CER".into(),
            ));
        }

        on_bootstrap(cer, cnx, rx).await;
        Ok(())
    }
}

/// Unused directly but kept for callers that want raw frame decode before
/// a `Connection`/`spawn_reader` pair exists (e.g. tests).
pub async fn decode_one(
    stream: &mut TcpStream,
    dict: &Dictionary,
) -> Result<crate::diameter::DiameterMessage> {
    Codec::decode(stream, dict).await
}
