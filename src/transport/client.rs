//! Client-initiated connection setup: dials a peer's TCP (optionally TLS)
//! endpoint and produces a [`Connection`] plus its inbound message stream.
//! This is the "client-connecting" CNX kind from spec §4.5; the PSM drives
//! it through WaitConnAck/WaitCEA once it has a `Connection` in hand.

use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::transport::{spawn_reader, Connection};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct ConnectConfig {
    pub use_tls: bool,
    pub verify_cert: bool,
}

pub async fn connect(
    addr: &str,
    config: &ConnectConfig,
    dict: Arc<Dictionary>,
) -> Result<(Arc<Connection>, mpsc::Receiver<crate::diameter::DiameterMessage>)> {
    let stream = TcpStream::connect(addr).await?;
    let peer_addr = stream.peer_addr()?;

    if config.use_tls {
        let connector = tokio_native_tls::TlsConnector::from(
            native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(!config.verify_cert)
                .build()?,
        );
        let tls_stream = connector.connect(addr, stream).await?;
        let (reader, writer) = tokio::io::split(tls_stream);
        let cnx = Arc::new(Connection::new(Box::new(writer), peer_addr));
        let rx = spawn_reader(Box::new(reader), dict, peer_addr);
        Ok((cnx, rx))
    } else {
        let (reader, writer) = tokio::io::split(stream);
        let cnx = Arc::new(Connection::new(Box::new(writer), peer_addr));
        let rx = spawn_reader(Box::new(reader), dict, peer_addr);
        Ok((cnx, rx))
    }
}
