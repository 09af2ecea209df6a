//! VICI packet framing
//!
//! Format:
//! ```text
//! uint32    length          (big-endian, excludes itself)
//! byte      type
//! byte      name_len        (named types only)
//! byte[n]   name            (named types only)
//! byte[m]   message
//! ```

use bytes::{Buf, BufMut, BytesMut};
use swanmon_platform::{SwanmonError, SwanmonResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::{get_name, put_name, Message};
use crate::logging;

/// Maximum accepted frame size (512 KiB)
pub const MAX_FRAME_SIZE: usize = 512 * 1024;

/// Packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Named request message
    CmdRequest = 0,
    /// Unnamed response message for a request
    CmdResponse = 1,
    /// Unnamed response if requested command is unknown
    CmdUnknown = 2,
    /// Named event registration request
    EventRegister = 3,
    /// Named event deregistration request
    EventUnregister = 4,
    /// Unnamed response for successful event (de-)registration
    EventConfirm = 5,
    /// Unnamed response if event (de-)registration failed
    EventUnknown = 6,
    /// Named event message
    Event = 7,
}

impl PacketType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CmdRequest),
            1 => Some(Self::CmdResponse),
            2 => Some(Self::CmdUnknown),
            3 => Some(Self::EventRegister),
            4 => Some(Self::EventUnregister),
            5 => Some(Self::EventConfirm),
            6 => Some(Self::EventUnknown),
            7 => Some(Self::Event),
            _ => None,
        }
    }

    /// Whether packets of this type carry a name
    pub fn is_named(self) -> bool {
        matches!(
            self,
            Self::CmdRequest | Self::EventRegister | Self::EventUnregister | Self::Event
        )
    }

    /// Protocol name of the type
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CmdRequest => "CMD_REQUEST",
            Self::CmdResponse => "CMD_RESPONSE",
            Self::CmdUnknown => "CMD_UNKNOWN",
            Self::EventRegister => "EVENT_REGISTER",
            Self::EventUnregister => "EVENT_UNREGISTER",
            Self::EventConfirm => "EVENT_CONFIRM",
            Self::EventUnknown => "EVENT_UNKNOWN",
            Self::Event => "EVENT",
        }
    }
}

/// One VICI packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type
    pub packet_type: PacketType,
    /// Command or event name (named types only)
    pub name: Option<String>,
    /// Message payload
    pub message: Message,
}

impl Packet {
    /// Create a packet
    pub fn new(packet_type: PacketType, name: Option<String>, message: Message) -> Self {
        Self {
            packet_type,
            name,
            message,
        }
    }

    /// Command request
    pub fn request(command: &str, message: Message) -> Self {
        Self::new(PacketType::CmdRequest, Some(command.to_string()), message)
    }

    /// Event registration
    pub fn register(event: &str) -> Self {
        Self::new(PacketType::EventRegister, Some(event.to_string()), Message::new())
    }

    /// Event deregistration
    pub fn unregister(event: &str) -> Self {
        Self::new(PacketType::EventUnregister, Some(event.to_string()), Message::new())
    }

    /// Serialize including the length frame
    ///
    /// # Errors
    ///
    /// Returns an error if the packet is missing a required name, or the
    /// encoded packet exceeds [`MAX_FRAME_SIZE`].
    pub fn to_bytes(&self) -> SwanmonResult<Vec<u8>> {
        let mut body = BytesMut::new();
        body.put_u8(self.packet_type as u8);
        if self.packet_type.is_named() {
            let name = self.name.as_deref().ok_or_else(|| {
                SwanmonError::Protocol(format!("{} requires a name", self.packet_type.as_str()))
            })?;
            put_name(&mut body, name)?;
        }
        self.message.encode(&mut body)?;

        if body.len() > MAX_FRAME_SIZE {
            return Err(SwanmonError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                body.len(),
                MAX_FRAME_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(buf.to_vec())
    }

    /// Parse a packet body (the frame without its length prefix)
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Protocol` for empty bodies, unknown types and
    /// malformed names or messages.
    pub fn from_bytes(data: &[u8]) -> SwanmonResult<Self> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(SwanmonError::Protocol("Empty packet".into()));
        }
        let tag = buf.get_u8();
        let packet_type = PacketType::from_u8(tag)
            .ok_or_else(|| SwanmonError::Protocol(format!("Unknown packet type: {}", tag)))?;
        let name = if packet_type.is_named() {
            Some(get_name(&mut buf)?)
        } else {
            None
        };
        let message = Message::from_bytes(buf)?;
        Ok(Self::new(packet_type, name, message))
    }
}

/// Write one framed packet
///
/// # Errors
///
/// Returns an error on encoding or I/O failure.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> SwanmonResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.to_bytes()?;
    logging::log_packet_send(packet.packet_type.as_str(), packet.name.as_deref(), bytes.len());
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed packet
///
/// # Errors
///
/// Returns an error on I/O failure, oversized frames, or malformed packets.
pub async fn read_packet<R>(reader: &mut R) -> SwanmonResult<Packet>
where
    R: AsyncRead + Unpin,
{
    let length = reader.read_u32().await? as usize;
    if length > MAX_FRAME_SIZE {
        return Err(SwanmonError::Protocol(format!(
            "Frame too large: {} bytes (maximum {})",
            length, MAX_FRAME_SIZE
        )));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    let packet = Packet::from_bytes(&body)?;
    logging::log_packet_recv(packet.packet_type.as_str(), packet.name.as_deref(), length);
    Ok(packet)
}
