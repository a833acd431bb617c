//! Connection Context (CNX, spec §4.5): a uniform framed-message interface
//! over TCP, optionally TLS. SCTP and multi-stream TLS are named in the
//! spec but not implemented here — see DESIGN.md for that simplification.

pub mod client;
pub mod server;

pub use crate::transport::client::{connect, ConnectConfig};
pub use crate::transport::server::{Acceptor, AcceptorConfig};

use crate::diameter::{DiameterMessage, MAX_MESSAGE_LENGTH};
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

/// Reads exactly one framed Diameter message from `reader`, rejecting any
/// declared length over the 2^16-1 inbound cap (spec §4.2/§4.5).
pub struct Codec {}

impl Codec {
    pub async fn decode<R>(reader: &mut R, dict: &Dictionary) -> Result<DiameterMessage>
    where
        R: AsyncRead + Unpin,
    {
        let mut b = [0; 4];
        reader.read_exact(&mut b).await?;
        let length = u32::from_be_bytes([0, b[1], b[2], b[3]]);

        if length > MAX_MESSAGE_LENGTH {
            return Err(Error::MessageTooLarge(length));
        }
        if (length as usize) < 20 {
            return Err(Error::DecodeError("message shorter than header".into()));
        }

        let mut buffer = Vec::with_capacity(length as usize);
        buffer.extend_from_slice(&b);
        buffer.resize(length as usize, 0);
        reader.read_exact(&mut buffer[4..]).await?;

        let mut cursor = Cursor::new(buffer);
        DiameterMessage::decode_from(&mut cursor, dict)
    }

    pub async fn encode<W>(writer: &mut W, msg: &DiameterMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut b = Vec::new();
        msg.encode_to(&mut b)?;
        writer.write_all(&b).await?;
        Ok(())
    }
}

/// The write half of an established connection, shared between the PSM
/// (which sends CER/CEA/DWR/DWA/DPR/DPA) and any outbound-message sender.
/// A `tokio::sync::Mutex` is used, not `std::sync::Mutex`, because the
/// critical section holds across the `.await` of the socket write — the
/// same tradeoff the teacher's own client writer handle makes.
pub struct Connection {
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pub peer_addr: SocketAddr,
}

impl Connection {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>, peer_addr: SocketAddr) -> Connection {
        Connection {
            writer: AsyncMutex::new(writer),
            peer_addr,
        }
    }

    pub async fn send(&self, msg: &DiameterMessage) -> Result<()> {
        let mut writer = self.writer.lock().await;
        Codec::encode(&mut *writer, msg).await
    }
}

/// Spawns the receive task for a connection: decodes frames in a loop and
/// forwards them on `tx`. The channel closing is how a PSM observes
/// connection loss — there is no separate `CnxEvent::Closed` variant,
/// since a dropped `Sender` already carries that information to `recv()`.
pub fn spawn_reader(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    dict: Arc<Dictionary>,
    peer_addr: SocketAddr,
) -> mpsc::Receiver<DiameterMessage> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            match Codec::decode(&mut reader, &dict).await {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    log::info!("[{}] connection closed: {}", peer_addr, e);
                    return;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::Avp;
    use crate::diameter::CommandFlags;

    #[tokio::test]
    async fn test_encode_decode_over_duplex() {
        let dict = Dictionary::new_default();
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut server_read, mut server_write) = tokio::io::split(server);

        let mut msg = DiameterMessage::new(257, 0, CommandFlags::request(), 1, 1);
        msg.add_avp(Avp::new_identity(264, None, true, "host.example.net"));

        Codec::encode(&mut client_write, &msg).await.unwrap();
        let decoded = Codec::decode(&mut server_read, &dict).await.unwrap();
        assert_eq!(decoded.header.code, 257);

        Codec::encode(&mut server_write, &decoded).await.unwrap();
        let looped_back = Codec::decode(&mut client_read, &dict).await.unwrap();
        assert_eq!(looped_back.avps.len(), 1);
    }
}
