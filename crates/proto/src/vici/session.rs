//! VICI client session
//!
//! A session owns one socket connection to the daemon. Requests are strictly
//! sequential; the connection closes when the session is dropped.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use swanmon_platform::{SwanmonError, SwanmonResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::message::Message;
use super::packet::{read_packet, write_packet, Packet, PacketType};
use crate::logging;

/// Default daemon socket
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/charon.vici";

/// VICI socket address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path
    Unix(PathBuf),
    /// TCP `host:port`
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = SwanmonError;

    fn from_str(s: &str) -> SwanmonResult<Self> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(SwanmonError::Config(format!("missing socket path in '{}'", s)));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            let valid = addr
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(SwanmonError::Config(format!("expected tcp://host:port, got '{}'", s)));
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        Err(SwanmonError::Config(format!(
            "unsupported VICI address '{}' (use unix:// or tcp://)",
            s
        )))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from("/var/run/charon.vici"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Connected VICI session
pub struct Session {
    stream: Box<dyn Stream>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Connect to the daemon
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Timeout` if the connection is not established
    /// within `timeout`, or `SwanmonError::Connect` if it is refused.
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> SwanmonResult<Self> {
        let stream = tokio::time::timeout(timeout, dial(endpoint))
            .await
            .map_err(|_| SwanmonError::Timeout {
                operation: "VICI connect",
                after: timeout,
            })?
            .map_err(|source| SwanmonError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        logging::log_vici_connect(&endpoint.to_string());
        Ok(Self { stream })
    }

    /// Issue a command and wait for its response
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, an unknown command, an unexpected
    /// packet, or a response reporting `success = no`.
    pub async fn request(&mut self, command: &str, message: Message) -> SwanmonResult<Message> {
        write_packet(&mut self.stream, &Packet::request(command, message)).await?;
        let response = self.read_response(command, None, &mut Vec::new()).await?;
        logging::log_vici_request(command, 0);
        Ok(response)
    }

    /// Issue a command whose results are streamed as events
    ///
    /// Registers for `event`, sends `command`, collects every `event` packet
    /// until the command response, then unregisters.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails, on I/O failure, an unknown
    /// command, or a response reporting `success = no`.
    pub async fn streamed_request(
        &mut self,
        command: &str,
        event: &str,
        message: Message,
    ) -> SwanmonResult<Vec<Message>> {
        self.confirm(Packet::register(event)).await?;

        write_packet(&mut self.stream, &Packet::request(command, message)).await?;
        let mut events = Vec::new();
        let response = self.read_response(command, Some(event), &mut events).await?;

        self.confirm(Packet::unregister(event)).await?;
        response.check_success()?;
        logging::log_vici_request(command, events.len());
        Ok(events)
    }

    /// Send an event (un)registration and wait for its confirmation
    async fn confirm(&mut self, packet: Packet) -> SwanmonResult<()> {
        write_packet(&mut self.stream, &packet).await?;
        let event = packet.name.as_deref().unwrap_or_default();
        loop {
            let reply = read_packet(&mut self.stream).await?;
            match reply.packet_type {
                PacketType::EventConfirm => return Ok(()),
                PacketType::EventUnknown => {
                    return Err(SwanmonError::Protocol(format!("unknown event '{}'", event)))
                }
                // Late events for the stream being torn down
                PacketType::Event => continue,
                other => {
                    return Err(SwanmonError::Protocol(format!(
                        "unexpected {} during {} of '{}'",
                        other.as_str(),
                        packet.packet_type.as_str(),
                        event
                    )))
                }
            }
        }
    }

    async fn read_response(
        &mut self,
        command: &str,
        event: Option<&str>,
        events: &mut Vec<Message>,
    ) -> SwanmonResult<Message> {
        loop {
            let packet = read_packet(&mut self.stream).await?;
            match packet.packet_type {
                PacketType::CmdResponse => {
                    if event.is_none() {
                        packet.message.check_success()?;
                    }
                    return Ok(packet.message);
                }
                PacketType::CmdUnknown => {
                    return Err(SwanmonError::Protocol(format!("unknown command '{}'", command)))
                }
                PacketType::Event if event.is_some() && packet.name.as_deref() == event => {
                    events.push(packet.message);
                }
                other => {
                    return Err(SwanmonError::Protocol(format!(
                        "unexpected {} in response to '{}'",
                        other.as_str(),
                        command
                    )))
                }
            }
        }
    }
}

async fn dial(endpoint: &Endpoint) -> std::io::Result<Box<dyn Stream>> {
    match endpoint {
        Endpoint::Tcp(addr) => Ok(Box::new(TcpStream::connect(addr.as_str()).await?)),
        #[cfg(unix)]
        Endpoint::Unix(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            "unix:///var/run/charon.vici".parse::<Endpoint>().unwrap(),
            Endpoint::default()
        );
        assert_eq!(
            "tcp://127.0.0.1:4502".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:4502".to_string())
        );
        assert_eq!(Endpoint::default().to_string(), DEFAULT_ENDPOINT);

        for bad in ["unix://", "tcp://host", "tcp://:4502", "http://x:1", "/var/run/charon.vici"] {
            assert!(
                matches!(bad.parse::<Endpoint>(), Err(SwanmonError::Config(_))),
                "{} accepted",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::Tcp(addr.to_string());
        let err = Session::connect(&endpoint, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SwanmonError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_request_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_packet(&mut socket).await.unwrap();
            assert_eq!(request.name.as_deref(), Some("version"));
            let reply = Packet::new(
                PacketType::CmdResponse,
                None,
                Message::new().with_value("daemon", "charon"),
            );
            write_packet(&mut socket, &reply).await.unwrap();

            read_packet(&mut socket).await.unwrap();
            let unknown = Packet::new(PacketType::CmdUnknown, None, Message::new());
            write_packet(&mut socket, &unknown).await.unwrap();
        });

        let mut session = Session::connect(&endpoint, Duration::from_secs(1))
            .await
            .unwrap();
        let response = session.request("version", Message::new()).await.unwrap();
        assert_eq!(response.get_str("daemon").as_deref(), Some("charon"));

        let err = session.request("bogus", Message::new()).await.unwrap_err();
        assert!(matches!(err, SwanmonError::Protocol(ref msg) if msg.contains("bogus")));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_streamed_request_registration() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let register = read_packet(&mut socket).await.unwrap();
            assert_eq!(register.packet_type, PacketType::EventRegister);
            assert_eq!(register.name.as_deref(), Some("list-sa"));
            let confirm = Packet::new(PacketType::EventConfirm, None, Message::new());
            write_packet(&mut socket, &confirm).await.unwrap();

            let request = read_packet(&mut socket).await.unwrap();
            assert_eq!(request.name.as_deref(), Some("list-sas"));
            let event = Packet::new(
                PacketType::Event,
                Some("list-sa".to_string()),
                Message::new().with_value("uniqueid", "1"),
            );
            write_packet(&mut socket, &event).await.unwrap();
            let done = Packet::new(PacketType::CmdResponse, None, Message::new());
            write_packet(&mut socket, &done).await.unwrap();

            let unregister = read_packet(&mut socket).await.unwrap();
            assert_eq!(unregister.packet_type, PacketType::EventUnregister);
            assert_eq!(unregister.name.as_deref(), Some("list-sa"));
            write_packet(&mut socket, &confirm).await.unwrap();

            // A second registration for an event the daemon does not know
            read_packet(&mut socket).await.unwrap();
            let unknown = Packet::new(PacketType::EventUnknown, None, Message::new());
            write_packet(&mut socket, &unknown).await.unwrap();
        });

        let mut session = Session::connect(&endpoint, Duration::from_secs(1))
            .await
            .unwrap();
        let events = session
            .streamed_request("list-sas", "list-sa", Message::new())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_str("uniqueid").as_deref(), Some("1"));

        let err = session
            .streamed_request("list-conns", "list-conn", Message::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SwanmonError::Protocol(ref msg) if msg.contains("list-conn")));

        server.await.unwrap();
    }
}
