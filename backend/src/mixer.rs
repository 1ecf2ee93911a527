//! Mixer transport.
//!
//! The rest of the service only talks to [`MixerClient`]; [`TcpMixerClient`]
//! is the real console connection.

use crate::protocol::{hex, PreampCommand, ProtocolError};
use async_trait::async_trait;
use sqpatch_types::channel::PreampSocket;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Where to send commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerTarget {
    pub host: String,
    pub port: u16,
}

impl MixerTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for MixerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A command that did not reach the mixer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceCommandError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connect to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("write to {target}: {reason}")]
    Write { target: String, reason: String },
    #[error("{target} did not respond within {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

/// Sends single preamp commands to a mixer.
#[async_trait]
pub trait MixerClient: Send + Sync {
    async fn send(
        &self,
        target: &MixerTarget,
        socket: PreampSocket,
        command: PreampCommand,
    ) -> Result<(), DeviceCommandError>;
}

/// Opens one TCP connection per command, as the console expects.
#[derive(Debug, Clone)]
pub struct TcpMixerClient {
    timeout: Duration,
}

impl TcpMixerClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn write_packet(&self, target: &MixerTarget, packet: &[u8]) -> Result<(), DeviceCommandError> {
        let addr = target.to_string();
        let mut stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|e| DeviceCommandError::Connect {
                target: addr.clone(),
                reason: e.to_string(),
            })?;
        stream
            .write_all(packet)
            .await
            .map_err(|e| DeviceCommandError::Write {
                target: addr.clone(),
                reason: e.to_string(),
            })?;
        stream.shutdown().await.map_err(|e| DeviceCommandError::Write {
            target: addr,
            reason: e.to_string(),
        })
    }
}

impl Default for TcpMixerClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl MixerClient for TcpMixerClient {
    async fn send(
        &self,
        target: &MixerTarget,
        socket: PreampSocket,
        command: PreampCommand,
    ) -> Result<(), DeviceCommandError> {
        let packet = command.encode(socket)?;
        debug!("TX {} {}", target, hex(&packet));

        tokio::time::timeout(self.timeout, self.write_packet(target, &packet))
            .await
            .map_err(|_| DeviceCommandError::Timeout {
                target: target.to_string(),
                timeout: self.timeout,
            })??;

        info!("TX {} {}", socket, command);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use sqpatch_types::channel::PreampBus;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_client_writes_one_packet_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let mut packets = Vec::new();
            for _ in 0..2 {
                let (mut conn, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                conn.read_to_end(&mut buf).await.unwrap();
                packets.push(buf);
            }
            packets
        });

        let client = TcpMixerClient::default();
        let target = MixerTarget::new("127.0.0.1", port);
        let socket = PreampSocket::new(PreampBus::Local, 3);
        client.send(&target, socket, PreampCommand::Phantom(true)).await.unwrap();
        client.send(&target, socket, PreampCommand::Gain(10)).await.unwrap();

        let packets = server.await.unwrap();
        assert_eq!(packets[0], vec![0xF7, 0x0C, 0x0C, 0x0D, 0x02, 0x01, 0x01, 0x00]);
        assert_eq!(packets[1], vec![0xF7, 0x0C, 0x0C, 0x0C, 0x02, 0x01, 0x00, 0x8A]);
    }

    #[tokio::test]
    async fn test_line_socket_never_connects() {
        // Port 9 is never listened on in tests; a protocol error must come first
        let client = TcpMixerClient::new(Duration::from_millis(100));
        let target = MixerTarget::new("127.0.0.1", 9);
        let err = client
            .send(&target, PreampSocket::new(PreampBus::Local, 19), PreampCommand::Pad(true))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceCommandError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = TcpMixerClient::new(Duration::from_millis(500));
        let err = client
            .send(
                &MixerTarget::new("127.0.0.1", port),
                PreampSocket::new(PreampBus::Slink, 1),
                PreampCommand::Phantom(false),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceCommandError::Connect { .. } | DeviceCommandError::Timeout { .. }
        ));
    }
}
