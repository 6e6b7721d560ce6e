// JDWP Event Loop
//
// One task owns the socket: it writes commands, routes replies back by packet
// id and forwards parsed event sets. When the socket closes every pending
// command fails with ConnectionClosed and the event channel is closed.

use crate::events::{parse_event_packet, EventSet};
use crate::protocol::{CommandPacket, JdwpError, JdwpResult, ReplyPacket, HEADER_SIZE, REPLY_FLAG};
use bytes::BytesMut;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Maximum allowed JDWP packet size (10MB)
const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Request to send a command and get reply
pub struct CommandRequest {
    pub packet: CommandPacket,
    pub reply_tx: oneshot::Sender<JdwpResult<ReplyPacket>>,
}

/// Handle to the event loop for sending commands and receiving events
#[derive(Clone, Debug)]
pub struct EventLoopHandle {
    command_tx: mpsc::Sender<CommandRequest>,
    event_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<EventSet>>>,
}

impl EventLoopHandle {
    pub async fn send_command(&self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        let (reply_tx, reply_rx) = oneshot::channel();

        let request = CommandRequest { packet, reply_tx };

        self.command_tx
            .send(request)
            .await
            .map_err(|_| JdwpError::ConnectionClosed)?;

        reply_rx.await.map_err(|_| JdwpError::ConnectionClosed)?
    }

    pub async fn try_recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.try_recv().ok()
    }

    pub async fn recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

/// Start the event loop task over any byte stream halves
pub fn spawn_event_loop<R, W>(reader: R, writer: W) -> EventLoopHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    // Events are never dropped: a full channel applies backpressure to the socket
    let (event_tx, event_rx) = mpsc::channel(256);

    let (packet_tx, packet_rx) = mpsc::channel(64);

    tokio::spawn(reader_task(reader, packet_tx));
    tokio::spawn(event_loop_task(writer, command_rx, packet_rx, event_tx));

    EventLoopHandle {
        command_tx,
        event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
    }
}

/// Reads whole packets off the socket. `read_exact` is not cancel safe, so
/// reading lives in its own task instead of a `select!` arm.
async fn reader_task<R>(mut reader: R, packet_tx: mpsc::Sender<JdwpResult<(bool, u32, Vec<u8>)>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let result = read_packet(&mut reader).await;
        let failed = result.is_err();
        if packet_tx.send(result).await.is_err() || failed {
            break;
        }
    }
}

async fn event_loop_task<W>(
    mut writer: W,
    mut command_rx: mpsc::Receiver<CommandRequest>,
    mut packet_rx: mpsc::Receiver<JdwpResult<(bool, u32, Vec<u8>)>>,
    event_tx: mpsc::Sender<EventSet>,
) where
    W: AsyncWrite + Unpin,
{
    info!("Event loop started");

    let mut pending_replies: HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>> =
        HashMap::new();

    loop {
        tokio::select! {
            Some(cmd) = command_rx.recv() => {
                let packet_id = cmd.packet.id;
                debug!("Sending command id={}", packet_id);

                let encoded = cmd.packet.encode();
                if let Err(e) = writer.write_all(&encoded).await {
                    error!("Failed to write command: {}", e);
                    cmd.reply_tx.send(Err(JdwpError::Io(e))).ok();
                    break;
                }

                if let Err(e) = writer.flush().await {
                    error!("Failed to flush command: {}", e);
                    cmd.reply_tx.send(Err(JdwpError::Io(e))).ok();
                    break;
                }

                pending_replies.insert(packet_id, cmd.reply_tx);
            }

            result = packet_rx.recv() => {
                let Some(result) = result else { break };
                match result {
                    Ok((is_reply, packet_id, data)) => {
                        if is_reply {
                            debug!("Received reply id={}", packet_id);

                            if let Some(tx) = pending_replies.remove(&packet_id) {
                                match ReplyPacket::decode(&data) {
                                    Ok(reply) => {
                                        tx.send(Ok(reply)).ok();
                                    }
                                    Err(e) => {
                                        warn!("Failed to decode reply: {}", e);
                                        tx.send(Err(e)).ok();
                                    }
                                }
                            } else {
                                warn!("Received reply for unknown command id={}", packet_id);
                            }
                        } else {
                            // Event packets carry command_set/command in the header
                            let event_data = &data[HEADER_SIZE..];

                            match parse_event_packet(event_data) {
                                Ok(event_set) => {
                                    debug!(
                                        "Parsed event set: {} events, suspend_policy={}",
                                        event_set.events.len(),
                                        event_set.suspend_policy
                                    );
                                    if event_tx.send(event_set).await.is_err() {
                                        warn!("Event receiver dropped, future events will be discarded");
                                    }
                                }
                                Err(e) => {
                                    warn!("Failed to parse event: {}", e);
                                }
                            }
                        }
                    }
                    Err(JdwpError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        info!("JDWP transport closed by target");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read packet: {}", e);
                        break;
                    }
                }
            }
        }
    }

    for (_, tx) in pending_replies.drain() {
        tx.send(Err(JdwpError::ConnectionClosed)).ok();
    }

    info!("Event loop shutting down");
}

/// Read a packet and report whether it is a reply
async fn read_packet<R>(reader: &mut R) -> JdwpResult<(bool, u32, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut header = BytesMut::with_capacity(HEADER_SIZE);
    header.resize(HEADER_SIZE, 0);

    reader
        .read_exact(&mut header)
        .await
        .map_err(JdwpError::Io)?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let packet_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let flags = header[8];

    if length < HEADER_SIZE {
        return Err(JdwpError::Protocol(format!(
            "Invalid packet length: {}",
            length
        )));
    }

    if length > MAX_PACKET_SIZE {
        return Err(JdwpError::Protocol(format!(
            "Packet too large: {} bytes (max: {} bytes)",
            length, MAX_PACKET_SIZE
        )));
    }

    let data_len = length - HEADER_SIZE;
    let mut full_packet = header.to_vec();

    if data_len > 0 {
        let mut data = vec![0u8; data_len];
        reader.read_exact(&mut data).await.map_err(JdwpError::Io)?;
        full_packet.extend_from_slice(&data);
    }

    let is_reply = flags == REPLY_FLAG;

    Ok((is_reply, packet_id, full_packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use tokio::io::duplex;

    fn reply_bytes(id: u32, error_code: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u32((HEADER_SIZE + payload.len()) as u32);
        buf.put_u32(id);
        buf.put_u8(REPLY_FLAG);
        buf.put_u16(error_code);
        buf.put_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_reply_routed_by_id() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let handle = spawn_event_loop(reader, writer);

        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.send_command(CommandPacket::new(7, 1, 1)).await }
        });

        let mut header = [0u8; HEADER_SIZE];
        server.read_exact(&mut header).await.unwrap();
        assert_eq!(&header[4..8], &[0, 0, 0, 7]);

        server.write_all(&reply_bytes(7, 0, &[1, 2])).await.unwrap();

        let reply = pending.await.unwrap().unwrap();
        assert_eq!(reply.id, 7);
        assert_eq!(reply.data(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_event_packet_forwarded() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let handle = spawn_event_loop(reader, writer);

        // Composite event: policy ALL, one VMDeath event
        let mut payload = Vec::new();
        payload.put_u8(2);
        payload.put_i32(1);
        payload.put_u8(99);
        payload.put_i32(0);

        let mut packet = Vec::new();
        packet.put_u32((HEADER_SIZE + payload.len()) as u32);
        packet.put_u32(1);
        packet.put_u8(0);
        packet.put_u8(64);
        packet.put_u8(100);
        packet.put_slice(&payload);
        server.write_all(&packet).await.unwrap();

        let event_set = handle.recv_event().await.unwrap();
        assert_eq!(event_set.suspend_policy, 2);
        assert_eq!(event_set.events.len(), 1);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_ends_events() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let handle = spawn_event_loop(reader, writer);

        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.send_command(CommandPacket::new(3, 1, 1)).await }
        });

        let mut header = [0u8; HEADER_SIZE];
        server.read_exact(&mut header).await.unwrap();
        drop(server);

        assert!(matches!(
            pending.await.unwrap(),
            Err(JdwpError::ConnectionClosed)
        ));
        assert!(handle.recv_event().await.is_none());
    }
}
