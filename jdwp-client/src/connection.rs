// JDWP connection management
//
// Handles TCP connection, handshake, and event loop startup

use crate::eventloop::{spawn_event_loop, EventLoopHandle};
use crate::events::EventSet;
use crate::protocol::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// A live JDWP connection. Clones share the socket and the packet id counter.
#[derive(Debug, Clone)]
pub struct JdwpConnection {
    event_loop: EventLoopHandle,
    next_id: Arc<AtomicU32>,
}

impl JdwpConnection {
    /// Connect to a JVM via JDWP
    pub async fn connect(host: &str, port: u16) -> JdwpResult<Self> {
        info!("Connecting to JDWP at {}:{}", host, port);

        let mut stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        Self::handshake(&mut stream).await?;

        let (reader, writer) = stream.into_split();
        let event_loop = spawn_event_loop(reader, writer);

        Ok(Self {
            event_loop,
            next_id: Arc::new(AtomicU32::new(1)),
        })
    }

    async fn handshake(stream: &mut TcpStream) -> JdwpResult<()> {
        debug!("Performing JDWP handshake");

        stream.write_all(JDWP_HANDSHAKE).await?;
        stream.flush().await?;

        let mut buf = vec![0u8; JDWP_HANDSHAKE.len()];
        stream.read_exact(&mut buf).await?;

        if buf != JDWP_HANDSHAKE {
            warn!("Invalid handshake response: {:?}", buf);
            return Err(JdwpError::InvalidHandshake);
        }

        info!("JDWP handshake successful");
        Ok(())
    }

    /// Send a command and wait for reply
    pub async fn send_command(&self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        debug!(
            "Sending command id={} set={} cmd={}",
            packet.id, packet.command_set, packet.command
        );
        self.event_loop.send_command(packet).await
    }

    /// Build a command with a fresh id, send it, and fail on a non-zero error code
    pub(crate) async fn request(
        &self,
        command_set: u8,
        command: u8,
        data: Vec<u8>,
    ) -> JdwpResult<ReplyPacket> {
        let mut packet = CommandPacket::new(self.next_id(), command_set, command);
        packet.data = data;

        let reply = self.send_command(packet).await?;
        reply.check_error()?;
        Ok(reply)
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        self.event_loop.try_recv_event().await
    }

    /// Wait for the next event. `None` once the transport has closed.
    pub async fn recv_event(&self) -> Option<EventSet> {
        self.event_loop.recv_event().await
    }

    pub fn is_closed(&self) -> bool {
        self.event_loop.is_closed()
    }

    /// Generate next packet ID
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}
