//! In-process SphinxQL listener for integration tests.
//!
//! Speaks the handshake, `mysql_native_password` authentication and
//! multi-statement `COM_QUERY` with multiple result sets, which is all the
//! client needs. Statements are answered from a script, the way searchd
//! answers from its indexes.

#![allow(dead_code, clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use sphinxql::Endpoint;
use sphinxql_mysql::auth;
use sphinxql_mysql::protocol::writer::frame_payload;
use sphinxql_mysql::protocol::{
    PacketHeader, PacketReader, PacketWriter, capabilities, server_status,
};

const SERVER_VERSION: &str = "2.2.11-id64-release (fake)";
pub const AUTOCOMMIT: u16 = server_status::SERVER_STATUS_AUTOCOMMIT;
const VAR_STRING: u8 = 0xFD;

#[derive(Debug, Clone)]
struct Table {
    fields: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default)]
struct Script {
    tables: HashMap<String, Table>,
    /// Packets written verbatim in answer to a statement
    raw: HashMap<String, Vec<Vec<u8>>>,
    meta: Vec<(String, String)>,
    password: Option<String>,
    /// Close the socket instead of answering a request containing this
    drop_on: Option<String>,
    /// Never answer a request containing this
    stall_on: Option<String>,
    /// Sleep before answering a request containing this
    delay_on: Option<(String, Duration)>,
    connections: usize,
    requests: Vec<String>,
    answered: Vec<String>,
}

enum Answer {
    Rows(Table),
    Raw(Vec<Vec<u8>>),
    Done,
    Failed(String),
}

/// Handle to a running fake listener. The listener lives until the test
/// process exits.
#[derive(Clone)]
pub struct FakeSphinx {
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
}

impl FakeSphinx {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake listener");
        let addr = listener.local_addr().expect("listener address");
        let script = Arc::new(Mutex::new(Script::default()));
        let shared = Arc::clone(&script);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let id = {
                    let mut script = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    script.connections += 1;
                    script.connections as u32
                };
                let session = Session {
                    stream,
                    script: Arc::clone(&shared),
                    seq: 0,
                };
                thread::spawn(move || {
                    let _ = session.serve(id);
                });
            }
        });
        Self { addr, script }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_table(self, statement: &str, fields: &[&str], rows: &[&[Option<&str>]]) -> Self {
        let table = Table {
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        };
        self.lock().tables.insert(normalize(statement), table);
        self
    }

    pub fn with_meta(self, pairs: &[(&str, &str)]) -> Self {
        self.lock().meta = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self
    }

    /// Answer `statement` with `packets` as they are, whatever they hold.
    pub fn with_raw_answer(self, statement: &str, packets: Vec<Vec<u8>>) -> Self {
        self.lock().raw.insert(normalize(statement), packets);
        self
    }

    pub fn with_password(self, password: &str) -> Self {
        self.lock().password = Some(password.to_string());
        self
    }

    pub fn drop_on(&self, needle: Option<&str>) {
        self.lock().drop_on = needle.map(str::to_string);
    }

    pub fn stall_on(&self, needle: Option<&str>) {
        self.lock().stall_on = needle.map(str::to_string);
    }

    pub fn delay_on(&self, needle: &str, delay: Duration) {
        self.lock().delay_on = Some((needle.to_string(), delay));
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::tcp("127.0.0.1", self.addr.port())
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// `COM_QUERY` texts received, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// `COM_QUERY` texts in the order their answers started going out.
    pub fn answered(&self) -> Vec<String> {
        self.lock().answered.clone()
    }
}

fn normalize(statement: &str) -> String {
    statement.trim().trim_end_matches(';').trim().to_string()
}

struct Session {
    stream: TcpStream,
    script: Arc<Mutex<Script>>,
    seq: u8,
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn serve(mut self, id: u32) -> io::Result<()> {
        let seed: Vec<u8> = (1..=20).collect();
        self.write_packet(&handshake(id, &seed))?;

        let response = self.read_packet()?;
        if !self.accepts(&response, &seed) {
            self.write_packet(&err_packet(1045, "28000", "Access denied"))?;
            return Ok(());
        }
        self.write_packet(&ok_packet(AUTOCOMMIT))?;

        loop {
            let Ok(packet) = self.read_packet() else {
                return Ok(());
            };
            match packet.first() {
                None | Some(0x01) => return Ok(()),
                Some(0x0e) => self.write_packet(&ok_packet(AUTOCOMMIT))?,
                Some(0x03) => {
                    let sql = String::from_utf8_lossy(&packet[1..]).into_owned();
                    let (drop, stall, delay) = {
                        let mut script = self.lock();
                        script.requests.push(sql.clone());
                        let hit = |needle: Option<&str>| needle.is_some_and(|n| sql.contains(n));
                        let delay = script
                            .delay_on
                            .as_ref()
                            .filter(|(needle, _)| sql.contains(needle.as_str()))
                            .map(|(_, delay)| *delay);
                        (
                            hit(script.drop_on.as_deref()),
                            hit(script.stall_on.as_deref()),
                            delay,
                        )
                    };
                    if drop {
                        self.stream.shutdown(Shutdown::Both)?;
                        return Ok(());
                    }
                    if stall {
                        continue;
                    }
                    if let Some(delay) = delay {
                        thread::sleep(delay);
                    }
                    self.lock().answered.push(sql.clone());
                    self.answer(&sql)?;
                }
                Some(_) => self.write_packet(&err_packet(1047, "08S01", "Unknown command"))?,
            }
        }
    }

    fn accepts(&self, response: &[u8], seed: &[u8]) -> bool {
        let Some(password) = self.lock().password.clone() else {
            return true;
        };
        let mut reader = PacketReader::new(response);
        reader.skip(4 + 4 + 1 + 23);
        if reader.read_null_string().is_none() {
            return false;
        }
        let len = usize::from(reader.read_u8().unwrap_or(0));
        let scramble = reader.read_bytes(len).unwrap_or_default();
        scramble == auth::mysql_native_password(&password, seed).as_slice()
    }

    fn answer(&mut self, sql: &str) -> io::Result<()> {
        let answers = {
            let script = self.lock();
            let mut answers = Vec::new();
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                let key = normalize(statement);
                if key.eq_ignore_ascii_case("SHOW META") {
                    answers.push(Answer::Rows(Table {
                        fields: vec!["Variable_name".to_string(), "Value".to_string()],
                        rows: script
                            .meta
                            .iter()
                            .map(|(k, v)| vec![Some(k.clone()), Some(v.clone())])
                            .collect(),
                    }));
                } else if let Some(packets) = script.raw.get(&key) {
                    answers.push(Answer::Raw(packets.clone()));
                } else if let Some(table) = script.tables.get(&key) {
                    answers.push(Answer::Rows(table.clone()));
                } else if key.to_ascii_uppercase().starts_with("SET ") {
                    answers.push(Answer::Done);
                } else {
                    answers.push(Answer::Failed(key));
                    break;
                }
            }
            answers
        };

        let last = answers.len().saturating_sub(1);
        for (i, answer) in answers.into_iter().enumerate() {
            let status = if i < last {
                AUTOCOMMIT | server_status::SERVER_MORE_RESULTS_EXISTS
            } else {
                AUTOCOMMIT
            };
            match answer {
                Answer::Rows(table) => self.write_result_set(&table, status)?,
                Answer::Done => self.write_packet(&ok_packet(status))?,
                Answer::Raw(packets) => {
                    for packet in &packets {
                        self.write_packet(packet)?;
                    }
                }
                Answer::Failed(statement) => {
                    let message = format!("sphinxql: syntax error near '{}'", statement);
                    self.write_packet(&err_packet(1064, "42000", &message))?;
                }
            }
        }
        self.stream.flush()
    }

    fn write_result_set(&mut self, table: &Table, status: u16) -> io::Result<()> {
        let mut count = PacketWriter::new();
        count.write_lenenc_int(table.fields.len() as u64);
        self.write_packet(count.as_bytes())?;

        for name in &table.fields {
            self.write_packet(&column_def(name))?;
        }
        self.write_packet(&eof_packet(AUTOCOMMIT))?;

        for row in &table.rows {
            let mut writer = PacketWriter::new();
            for cell in row {
                match cell {
                    Some(text) => writer.write_lenenc_string(text),
                    None => writer.write_u8(0xFB),
                }
            }
            self.write_packet(writer.as_bytes())?;
        }
        self.write_packet(&eof_packet(status))
    }

    fn read_packet(&mut self) -> io::Result<Vec<u8>> {
        let mut header = [0u8; PacketHeader::SIZE];
        self.stream.read_exact(&mut header)?;
        let header = PacketHeader::from_bytes(&header);
        let mut payload = vec![0u8; header.payload_length as usize];
        self.stream.read_exact(&mut payload)?;
        self.seq = header.sequence_id.wrapping_add(1);
        Ok(payload)
    }

    fn write_packet(&mut self, payload: &[u8]) -> io::Result<()> {
        let (bytes, next) = frame_payload(payload, self.seq);
        self.seq = next;
        self.stream.write_all(&bytes)
    }
}

fn handshake(connection_id: u32, seed: &[u8]) -> Vec<u8> {
    let caps = capabilities::CLIENT_LONG_PASSWORD
        | capabilities::CLIENT_PROTOCOL_41
        | capabilities::CLIENT_TRANSACTIONS
        | capabilities::CLIENT_SECURE_CONNECTION
        | capabilities::CLIENT_MULTI_STATEMENTS
        | capabilities::CLIENT_MULTI_RESULTS
        | capabilities::CLIENT_PLUGIN_AUTH;

    let mut w = PacketWriter::new();
    w.write_u8(10);
    w.write_null_string(SERVER_VERSION);
    w.write_u32_le(connection_id);
    w.write_bytes(&seed[..8]);
    w.write_u8(0);
    w.write_u16_le(caps as u16);
    w.write_u8(33);
    w.write_u16_le(AUTOCOMMIT);
    w.write_u16_le((caps >> 16) as u16);
    w.write_u8(21);
    w.write_zeros(10);
    w.write_bytes(&seed[8..]);
    w.write_u8(0);
    w.write_null_string(auth::plugins::MYSQL_NATIVE_PASSWORD);
    w.into_bytes()
}

pub fn column_def(name: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_lenenc_string("def");
    w.write_lenenc_string("");
    w.write_lenenc_string("idx");
    w.write_lenenc_string("idx");
    w.write_lenenc_string(name);
    w.write_lenenc_string(name);
    w.write_lenenc_int(0x0c);
    w.write_u16_le(33);
    w.write_u32_le(255);
    w.write_u8(VAR_STRING);
    w.write_u16_le(0);
    w.write_u8(0);
    w.write_zeros(2);
    w.into_bytes()
}

fn ok_packet(status: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0x00);
    w.write_lenenc_int(0);
    w.write_lenenc_int(0);
    w.write_u16_le(status);
    w.write_u16_le(0);
    w.into_bytes()
}

pub fn eof_packet(status: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFE);
    w.write_u16_le(0);
    w.write_u16_le(status);
    w.into_bytes()
}

fn err_packet(code: u16, sqlstate: &str, message: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFF);
    w.write_u16_le(code);
    w.write_u8(b'#');
    w.write_bytes(sqlstate.as_bytes());
    w.write_bytes(message.as_bytes());
    w.into_bytes()
}
