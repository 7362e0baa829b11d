use std::io;
use std::net::SocketAddr;

use log::debug;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;

use crate::error::{Result, TransferError};
use crate::protocol::{self, Packet};
use crate::{CONNECT_TIMEOUT, PACKET_CHANNEL_CAPACITY};

/// Waits for exactly one peer to connect on the given port.
pub async fn listen_for_peer(port: u16) -> Result<(TcpStream, SocketAddr)> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    debug!("listening on port {}", port);

    let (stream, peer_addr) = listener.accept().await?;
    debug!("accepted connection from {}", peer_addr);

    Ok((stream, peer_addr))
}

/// Connects to a listening peer, giving up after the connect timeout.
pub async fn connect_to_peer(address: &str, port: u16) -> Result<TcpStream> {
    let target = format!("{}:{}", address, port);
    debug!("connecting to {}", target);

    match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransferError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connection to {} timed out", target),
        ))),
    }
}

/// Spawns the packet pump: a background task that keeps reading framed
/// packets off the stream and hands them, still encrypted, to the state
/// machine through a bounded channel.
///
/// The pump never writes to the connection and never touches the session
/// key. When the stream closes or a frame cannot be read it drops its end
/// of the channel; the consumer decides whether that closure was expected.
pub fn spawn_packet_pump(mut read_half: OwnedReadHalf) -> mpsc::Receiver<Packet> {
    let (packet_tx, packet_rx) = mpsc::channel::<Packet>(PACKET_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        loop {
            let packet_bytes = match protocol::read_packet_bytes(&mut read_half).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("packet pump stopping: {}", e);
                    break;
                }
            };

            let packet = match Packet::from_bytes(&packet_bytes) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("packet pump stopping: {}", e);
                    break;
                }
            };

            if packet_tx.send(packet).await.is_err() {
                // the state machine is gone, nobody cares anymore
                break;
            }
        }
    });

    packet_rx
}
