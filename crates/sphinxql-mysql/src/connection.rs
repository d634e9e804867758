//! Connection to a SphinxQL listener.
//!
//! One [`MySqlConnection`] runs the handshake, then serves any number of
//! multi-statement requests through the [`Transport`] cycle. Results are
//! materialized as soon as they are read; nothing is streamed lazily.
//!
//! After a socket failure the connection is broken for good: every later
//! call reports `ConnectionErrorKind::Disconnected`.

// Packet sizes fit in u32 (max 16MB) and auth responses in u8.
#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::io::{Read, Write};

use sphinxql_core::{
    ConnectionError, ConnectionErrorKind, Connector, Endpoint, Error, ProtocolError, QueryError,
    Result, ResultSet, StateErrorKind, Transport,
};

use crate::auth;
use crate::config::SphinxConfig;
use crate::library::LiveConnection;
use crate::protocol::writer::{command_payload, frame_payload};
use crate::protocol::{
    Command, ErrPacket, MAX_PACKET_SIZE, PacketHeader, PacketReader, PacketType, PacketWriter,
    capabilities, server_status,
};
use crate::stream::Stream;
use crate::types::ColumnDef;

/// Upper bound on the column count of a result set header. Anything larger
/// is a corrupt header, not a real result.
const MAX_COLUMNS: usize = 65_535;

/// Where the connection is in the request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Idle; a request may be sent
    Ready,
    /// Request written, nothing read yet
    Sent,
    /// Results of the current request are being read and more may follow
    Reading,
    /// A socket or framing error occurred; the connection is unusable
    Broken,
    /// Closed by the client
    Closed,
}

/// What the server announced in its handshake.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin: String,
    auth_data: Vec<u8>,
}

/// A connection speaking the MySQL text protocol to a SphinxQL listener.
pub struct MySqlConnection {
    stream: Stream,
    state: ConnectionState,
    endpoint: Endpoint,
    config: SphinxConfig,
    server: Option<ServerInfo>,
    /// Capabilities both sides agreed on
    capabilities: u32,
    /// Status of the last OK/EOF packet
    status_flags: u16,
    sequence_id: u8,
    /// Text of the request whose results are being read
    request: Option<String>,
    /// Result read but not yet stored
    current: Option<ResultSet>,
    _live: LiveConnection,
}

impl fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .field("connection_id", &self.connection_id())
            .finish_non_exhaustive()
    }
}

impl MySqlConnection {
    /// Connect to `endpoint` and run the handshake.
    ///
    /// The handshake runs under the connect timeout; afterwards the read
    /// and write timeouts apply to every socket operation.
    #[tracing::instrument(level = "debug", skip_all, fields(endpoint = %endpoint))]
    pub fn connect(endpoint: &Endpoint, config: SphinxConfig) -> Result<Self> {
        config.validate()?;
        config.protocol.check(endpoint)?;
        let stream = Stream::connect(endpoint, &config)?;

        let mut conn = Self {
            stream,
            state: ConnectionState::Connecting,
            endpoint: endpoint.clone(),
            config,
            server: None,
            capabilities: 0,
            status_flags: 0,
            sequence_id: 0,
            request: None,
            current: None,
            _live: LiveConnection::register(),
        };

        let server = conn.read_handshake()?;
        conn.send_handshake_response(&server)?;
        conn.server = Some(server);
        conn.authenticate()?;

        conn.stream
            .set_timeouts(conn.config.read_timeout, conn.config.write_timeout)
            .map_err(|e| lost(&e))?;
        conn.state = ConnectionState::Ready;
        tracing::debug!(
            connection_id = conn.connection_id(),
            server_version = conn.server_version().unwrap_or_default(),
            "Connected"
        );
        Ok(conn)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.server_version.as_str())
    }

    pub fn connection_id(&self) -> u32 {
        self.server.as_ref().map_or(0, |s| s.connection_id)
    }

    /// Check that the server still answers.
    ///
    /// Unread results of an earlier request are discarded first.
    pub fn ping(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.drain()?;
        self.sequence_id = 0;
        self.write_packet(&command_payload(Command::Ping, &[]))?;
        let payload = self.read_packet()?;
        match PacketType::of_response(&payload) {
            PacketType::Ok => Ok(()),
            PacketType::Error => Err(query_error(parse_err(&payload)?, None)),
            _ => Err(self.protocol_failure("Unexpected response to ping")),
        }
    }

    /// Send COM_QUIT and shut the socket down.
    pub fn close(mut self) {
        self.quit();
    }

    fn quit(&mut self) {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Broken) {
            return;
        }
        self.sequence_id = 0;
        // Best effort: the server may already be gone.
        let _ = self.write_packet(&command_payload(Command::Quit, &[]));
        self.stream.shutdown();
        self.state = ConnectionState::Closed;
        tracing::trace!(endpoint = %self.endpoint, "Connection closed");
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            ConnectionState::Broken | ConnectionState::Closed => {
                Err(Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Disconnected,
                    message: format!("Connection to {} is no longer usable", self.endpoint),
                    source: None,
                }))
            }
            _ => Ok(()),
        }
    }

    fn read_handshake(&mut self) -> Result<ServerInfo> {
        let payload = self.read_packet()?;
        if PacketType::of_response(&payload) == PacketType::Error {
            let err = parse_err(&payload)?;
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!(
                    "Server refused connection: {} ({})",
                    err.error_message, err.error_code
                ),
                source: None,
            }));
        }

        let mut reader = PacketReader::new(&payload);
        let protocol_version = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing protocol version"))?;
        if protocol_version != 10 {
            return Err(protocol_error(format!(
                "Unsupported protocol version: {}",
                protocol_version
            )));
        }
        let server_version = reader
            .read_null_string()
            .ok_or_else(|| protocol_error("Missing server version"))?;
        let connection_id = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("Missing connection ID"))?;
        let mut auth_data = reader
            .read_bytes(8)
            .ok_or_else(|| protocol_error("Missing auth data"))?
            .to_vec();
        reader.skip(1);
        let caps_lower = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing capability flags"))?;

        // Everything after the lower capability flags is optional.
        let charset = reader.read_u8().unwrap_or(self.config.charset);
        let status_flags = reader.read_u16_le().unwrap_or(0);
        let caps_upper = reader.read_u16_le().unwrap_or(0);
        let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);
        let auth_data_len = usize::from(reader.read_u8().unwrap_or(0));
        reader.skip(10);

        if capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len = auth_data_len.saturating_sub(8).max(13);
            let part = reader
                .read_bytes(len)
                .unwrap_or_else(|| reader.read_rest());
            auth_data.extend(part.strip_suffix(&[0]).unwrap_or(part));
        }
        let auth_plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_null_string().unwrap_or_default()
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(ServerInfo {
            protocol_version,
            server_version,
            connection_id,
            capabilities,
            charset,
            status_flags,
            auth_plugin,
            auth_data,
        })
    }

    fn send_handshake_response(&mut self, server: &ServerInfo) -> Result<()> {
        if server.capabilities & capabilities::CLIENT_PROTOCOL_41 == 0 {
            return Err(protocol_error("Server does not support protocol 4.1"));
        }
        self.capabilities = self.config.capability_flags() & server.capabilities;
        let password = self.config.password.as_deref().unwrap_or_default();
        let auth_response = auth::auth_response(&server.auth_plugin, password, &server.auth_data);

        let mut writer = PacketWriter::new();
        writer.write_u32_le(self.capabilities);
        writer.write_u32_le(self.config.max_packet_size);
        writer.write_u8(self.config.charset);
        writer.write_zeros(23);
        writer.write_null_string(&self.config.user);
        if self.capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            writer.write_u8(auth_response.len() as u8);
            writer.write_bytes(&auth_response);
        } else {
            writer.write_bytes(&auth_response);
            writer.write_u8(0);
        }
        if self.capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            writer.write_null_string(&server.auth_plugin);
        }
        self.write_packet(writer.as_bytes())
    }

    /// Read authentication results until the server accepts or rejects us,
    /// following plugin switches and the `caching_sha2_password` fast path.
    fn authenticate(&mut self) -> Result<()> {
        loop {
            let payload = self.read_packet()?;
            match payload.first() {
                Some(0x00) => {
                    if let Some(ok) = PacketReader::new(&payload).parse_ok_packet() {
                        self.status_flags = ok.status_flags;
                    }
                    return Ok(());
                }
                Some(0xFF) => {
                    let err = parse_err(&payload)?;
                    return Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Authentication,
                        message: format!(
                            "Authentication failed: {} ({})",
                            err.error_message, err.error_code
                        ),
                        source: None,
                    }));
                }
                Some(0xFE) => {
                    let mut reader = PacketReader::new(&payload[1..]);
                    let plugin = reader
                        .read_null_string()
                        .ok_or_else(|| protocol_error("Missing plugin name in auth switch"))?;
                    let seed = reader.read_rest();
                    let password = self.config.password.as_deref().unwrap_or_default();
                    let response = auth::auth_response(&plugin, password, seed);
                    tracing::trace!(plugin = %plugin, "Auth switch");
                    self.write_packet(&response)?;
                }
                Some(0x01) => match payload.get(1) {
                    Some(&auth::caching_sha2::FAST_AUTH_SUCCESS) => {}
                    Some(&auth::caching_sha2::PERFORM_FULL_AUTH) => {
                        return Err(Error::Connection(ConnectionError {
                            kind: ConnectionErrorKind::Authentication,
                            message: "Full caching_sha2_password authentication is not supported"
                                .to_string(),
                            source: None,
                        }));
                    }
                    _ => return Err(protocol_error("Unknown auth continuation")),
                },
                _ => return Err(protocol_error("Unexpected packet during authentication")),
            }
        }
    }

    /// Read every result still queued on the socket and throw it away.
    ///
    /// Statement errors of the abandoned request are ignored; socket errors
    /// are not.
    fn drain(&mut self) -> Result<()> {
        let mut drained = 0_usize;
        let mut pending = self.state == ConnectionState::Sent || self.has_more_results();
        while pending {
            match self.read_result() {
                Err(e) if e.is_connection_error() => return Err(e),
                _ => drained += 1,
            }
            pending = self.has_more_results();
        }
        self.current = None;
        if drained > 0 {
            tracing::debug!(drained, "Discarded unread results");
        }
        Ok(())
    }

    fn has_more_results(&self) -> bool {
        self.state == ConnectionState::Reading
            && self.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0
    }

    /// Read one complete result of the current request into `current`.
    fn read_result(&mut self) -> Result<()> {
        self.current = None;
        self.state = ConnectionState::Reading;
        let payload = self.read_packet()?;
        let result = match PacketType::of_response(&payload) {
            PacketType::Ok => {
                let ok = PacketReader::new(&payload)
                    .parse_ok_packet()
                    .ok_or_else(|| self.protocol_failure("Invalid OK packet"))?;
                self.status_flags = ok.status_flags;
                ResultSet::empty()
            }
            PacketType::Error => {
                let err = parse_err(&payload)?;
                return Err(self.statement_failed(err));
            }
            PacketType::LocalInfile => {
                return Err(self.protocol_failure("LOCAL INFILE requests are not supported"));
            }
            PacketType::Eof | PacketType::Data => self.read_result_set(&payload)?,
        };
        self.current = Some(result);
        if !self.has_more_results() {
            self.state = ConnectionState::Ready;
        }
        Ok(())
    }

    fn read_result_set(&mut self, header: &[u8]) -> Result<ResultSet> {
        let column_count = PacketReader::new(header)
            .read_lenenc_int()
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= MAX_COLUMNS)
            .ok_or_else(|| self.rejected("Invalid column count", header))?;

        let mut columns = Vec::new();
        for _ in 0..column_count {
            let payload = self.read_packet()?;
            columns.push(ColumnDef::parse(&payload).map_err(|e| self.broken(e))?);
        }
        let eof = self.read_packet()?;
        if PacketType::of_row(&eof) != PacketType::Eof {
            return Err(self.protocol_failure("Missing EOF after column definitions"));
        }

        let mut rows = Vec::new();
        loop {
            let payload = self.read_packet()?;
            match PacketType::of_row(&payload) {
                PacketType::Eof => {
                    let eof = PacketReader::new(&payload)
                        .parse_eof_packet()
                        .ok_or_else(|| self.protocol_failure("Invalid EOF packet"))?;
                    self.status_flags = eof.status_flags;
                    break;
                }
                PacketType::Error => {
                    let err = parse_err(&payload)?;
                    return Err(self.statement_failed(err));
                }
                _ => {
                    let mut reader = PacketReader::new(&payload);
                    let mut row = Vec::with_capacity(column_count);
                    for _ in 0..column_count {
                        let cell = reader
                            .read_cell()
                            .ok_or_else(|| self.protocol_failure("Truncated row"))?;
                        row.push(cell.map(|bytes| self.cell_text(bytes)).transpose()?);
                    }
                    rows.push(row);
                }
            }
        }

        let names = columns.into_iter().map(|c| c.name).collect();
        tracing::trace!(columns = column_count, rows = rows.len(), "Result set read");
        Ok(ResultSet::new(names, rows))
    }

    /// A statement failed: the server ends the request there.
    fn statement_failed(&mut self, err: ErrPacket) -> Error {
        self.status_flags &= !server_status::SERVER_MORE_RESULTS_EXISTS;
        self.state = ConnectionState::Ready;
        query_error(err, self.request.as_deref())
    }

    fn broken(&mut self, err: Error) -> Error {
        self.state = ConnectionState::Broken;
        err
    }

    fn protocol_failure(&mut self, message: &str) -> Error {
        self.broken(protocol_error(message))
    }

    /// Like `protocol_failure`, keeping the bytes that were refused.
    fn rejected(&mut self, message: &str, bytes: &[u8]) -> Error {
        self.broken(Error::Protocol(ProtocolError {
            message: message.to_string(),
            raw_data: Some(bytes.to_vec()),
        }))
    }

    /// Cells are handed out as text; bytes that are not UTF-8 are refused
    /// rather than rewritten.
    fn cell_text(&mut self, bytes: &[u8]) -> Result<String> {
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(e) => Err(self.rejected(&format!("Cell is not valid UTF-8: {}", e), bytes)),
        }
    }

    /// Read one logical packet, joining continuation packets.
    fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; PacketHeader::SIZE];
            self.stream.read_exact(&mut header).map_err(|e| {
                self.state = ConnectionState::Broken;
                lost(&e)
            })?;
            let header = PacketHeader::from_bytes(&header);
            let len = header.payload_length as usize;
            self.sequence_id = header.sequence_id.wrapping_add(1);

            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream.read_exact(&mut payload[start..]).map_err(|e| {
                self.state = ConnectionState::Broken;
                lost(&e)
            })?;
            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let (bytes, next) = frame_payload(payload, self.sequence_id);
        self.sequence_id = next;
        self.stream
            .write_all(&bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|e| {
                self.state = ConnectionState::Broken;
                gone(&e)
            })
    }
}

impl Transport for MySqlConnection {
    fn send_query(&mut self, sql: &str) -> Result<()> {
        self.ensure_usable()?;
        self.drain()?;
        self.sequence_id = 0;
        self.write_packet(&command_payload(Command::Query, sql.as_bytes()))?;
        self.request = Some(sql.to_string());
        self.state = ConnectionState::Sent;
        tracing::trace!(bytes = sql.len(), "Request sent");
        Ok(())
    }

    fn read_query_result(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.state != ConnectionState::Sent {
            return Err(Error::state(StateErrorKind::NotSent, "No request sent"));
        }
        self.read_result()
    }

    fn store_result(&mut self) -> Result<ResultSet> {
        self.current
            .take()
            .ok_or_else(|| Error::state(StateErrorKind::NoResult, "No result to store"))
    }

    fn more_results(&self) -> bool {
        self.has_more_results()
    }

    fn next_result(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if !self.has_more_results() {
            return Err(Error::state(StateErrorKind::NoResult, "No result returned"));
        }
        self.read_result()
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        self.quit();
    }
}

/// Opens [`MySqlConnection`]s with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector {
    config: SphinxConfig,
}

impl MySqlConnector {
    pub fn new(config: SphinxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SphinxConfig {
        &self.config
    }
}

impl Connector for MySqlConnector {
    type Transport = MySqlConnection;

    fn connect(&self, endpoint: &Endpoint) -> Result<MySqlConnection> {
        MySqlConnection::connect(endpoint, self.config.clone())
    }
}

// Helper functions for creating errors

fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
    })
}

fn lost(err: &std::io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::ServerLost,
        message: format!("Lost connection to SphinxQL server: {}", err),
        source: None,
    })
}

fn gone(err: &std::io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::ServerGone,
        message: format!("SphinxQL server has gone away: {}", err),
        source: None,
    })
}

fn parse_err(payload: &[u8]) -> Result<ErrPacket> {
    PacketReader::new(payload)
        .parse_err_packet()
        .ok_or_else(|| protocol_error("Invalid error packet"))
}

fn query_error(err: ErrPacket, sql: Option<&str>) -> Error {
    Error::Query(QueryError {
        code: err.error_code,
        sqlstate: (!err.sql_state.is_empty()).then_some(err.sql_state),
        message: err.error_message,
        sql: sql.map(str::to_string),
    })
}
