//! Minimal Server List Ping client for the game server.
//!
//! Speaks just enough of the status handshake to answer the `status`,
//! `players`, and `version` commands. Every network or protocol failure is
//! collapsed into [`BotError::RemoteQueryFailed`]; callers surface it as a
//! short user-visible reply and never retry automatically.

use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{BotError, Result};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Status-query handshakes may use a wildcard protocol version.
const PROTOCOL_ANY: i32 = -1;
const MAX_STATUS_BYTES: i32 = 1024 * 1024;

/// Snapshot of the remote server as reported by a status ping.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub online: u32,
    pub max: u32,
    /// Sample of online player names; the server may omit or truncate it.
    pub players: Vec<String>,
    pub version: String,
}

/// Client bound to one configured host/port.
pub struct QueryClient {
    host: String,
    port: u16,
}

impl QueryClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Run one status query against the configured server.
    pub async fn status(&self) -> Result<ServerStatus> {
        match tokio::time::timeout(QUERY_TIMEOUT, self.fetch()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(BotError::RemoteQueryFailed {
                message: e.to_string(),
            }),
            Err(_) => Err(BotError::RemoteQueryFailed {
                message: format!("{}:{} did not answer within {:?}", self.host, self.port, QUERY_TIMEOUT),
            }),
        }
    }

    async fn fetch(&self) -> std::io::Result<ServerStatus> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        // Handshake with next-state = status, then the empty status request.
        let mut handshake = Vec::new();
        write_varint(&mut handshake, 0x00);
        write_varint(&mut handshake, PROTOCOL_ANY);
        write_varint(&mut handshake, self.host.len() as i32);
        handshake.extend_from_slice(self.host.as_bytes());
        handshake.extend_from_slice(&self.port.to_be_bytes());
        write_varint(&mut handshake, 0x01);

        let mut packet = Vec::new();
        write_varint(&mut packet, handshake.len() as i32);
        packet.extend_from_slice(&handshake);
        packet.extend_from_slice(&[0x01, 0x00]);
        stream.write_all(&packet).await?;
        stream.flush().await?;

        let _frame_len = read_varint(&mut stream).await?;
        let packet_id = read_varint(&mut stream).await?;
        if packet_id != 0x00 {
            return Err(protocol_error(format!(
                "unexpected status packet id {}",
                packet_id
            )));
        }

        let json_len = read_varint(&mut stream).await?;
        if !(0..=MAX_STATUS_BYTES).contains(&json_len) {
            return Err(protocol_error(format!("bad status length {}", json_len)));
        }
        let mut raw = vec![0u8; json_len as usize];
        stream.read_exact(&mut raw).await?;

        let response: StatusResponse = serde_json::from_slice(&raw)
            .map_err(|e| protocol_error(format!("bad status JSON: {}", e)))?;
        debug!(
            "Status query to {}:{} -> {}/{} online",
            self.host, self.port, response.players.online, response.players.max
        );
        Ok(response.into())
    }
}

fn protocol_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut remaining = value as u32;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<i32> {
    let mut value: u32 = 0;
    for shift in 0..5 {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7f) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(protocol_error("varint longer than 5 bytes".to_string()))
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    players: PlayersSection,
    #[serde(default)]
    version: VersionSection,
}

#[derive(Debug, Default, Deserialize)]
struct PlayersSection {
    #[serde(default)]
    online: u32,
    #[serde(default)]
    max: u32,
    #[serde(default)]
    sample: Vec<PlayerEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayerEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct VersionSection {
    name: String,
}

impl Default for VersionSection {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
        }
    }
}

impl From<StatusResponse> for ServerStatus {
    fn from(response: StatusResponse) -> Self {
        ServerStatus {
            online: response.players.online,
            max: response.players.max,
            players: response
                .players
                .sample
                .into_iter()
                .map(|entry| entry.name)
                .collect(),
            version: response.version.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(value: i32) -> i32 {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        read_varint(&mut &buf[..]).await.unwrap()
    }

    #[tokio::test]
    async fn test_varint_round_trip() {
        for value in [0, 1, 127, 128, 255, 300, 25565, i32::MAX, -1] {
            assert_eq!(round_trip(value).await, value);
        }
    }

    #[test]
    fn test_varint_known_encodings() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xac, 0x02]);

        buf.clear();
        write_varint(&mut buf, -1);
        assert_eq!(buf, vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[tokio::test]
    async fn test_varint_overlong_rejected() {
        let overlong = [0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(read_varint(&mut &overlong[..]).await.is_err());
    }

    #[test]
    fn test_status_json_full() {
        let raw = r#"{
            "version": {"name": "Paper 1.20.4", "protocol": 765},
            "players": {"online": 7, "max": 100, "sample": [{"name": "Steve", "id": "x"}, {"name": "Alex", "id": "y"}]},
            "description": {"text": "UnionCraft"}
        }"#;
        let status: ServerStatus = serde_json::from_str::<StatusResponse>(raw).unwrap().into();
        assert_eq!(status.online, 7);
        assert_eq!(status.max, 100);
        assert_eq!(status.players, vec!["Steve", "Alex"]);
        assert_eq!(status.version, "Paper 1.20.4");
    }

    #[test]
    fn test_status_json_minimal() {
        let status: ServerStatus = serde_json::from_str::<StatusResponse>("{}").unwrap().into();
        assert_eq!(status.online, 0);
        assert_eq!(status.max, 0);
        assert!(status.players.is_empty());
        assert_eq!(status.version, "unknown");
    }
}
