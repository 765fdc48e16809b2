//! In-process server, speaking enough of IPROTO to run client against it.
//!
//! Stores tuples in memory and serves `_vspace` / `_vindex` views from its own
//! catalog. Lua is not interpreted, only a handful of expressions is understood
//! (see [`MockServer`] for the list).

#![allow(dead_code)]

use std::{
    cmp::Ordering,
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use maplit::hashmap;
use parking_lot::Mutex;
use rmpv::Value;
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener,
    },
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
};

pub const CREW_SPACE_ID: u32 = 512;
pub const VSPACE_ID: u32 = 281;
pub const VINDEX_ID: u32 = 289;

const SALT: &[u8; 32] = b"DS9-Defiant-Rio-Grande-Ganges-00";

mod codes {
    pub const TUPLE_FOUND: u32 = 3;
    pub const NO_SUCH_INDEX: u32 = 35;
    pub const PROC_LUA: u32 = 32;
    pub const NO_SUCH_PROC: u32 = 33;
    pub const NO_SUCH_SPACE: u32 = 36;
    pub const CREDS_MISMATCH: u32 = 47;
    pub const UNSUPPORTED: u32 = 5;
}

type Tuple = Vec<Value>;

#[derive(Debug)]
struct ServerError {
    code: u32,
    message: String,
}

impl ServerError {
    fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MockIndex {
    pub id: u32,
    pub name: String,
    pub parts: Vec<usize>,
    pub unique: bool,
}

#[derive(Clone, Debug)]
pub struct MockSpace {
    pub id: u32,
    pub name: String,
    pub indexes: Vec<MockIndex>,
    pub tuples: Vec<Tuple>,
}

impl MockSpace {
    fn index(&self, id: u32) -> Result<&MockIndex, ServerError> {
        self.indexes.iter().find(|x| x.id == id).ok_or_else(|| {
            ServerError::new(
                codes::NO_SUCH_INDEX,
                format!("No index #{} is defined in space '{}'", id, self.name),
            )
        })
    }

    fn primary(&self) -> &MockIndex {
        &self.indexes[0]
    }

    fn sort(&mut self) {
        let parts = self.primary().parts.clone();
        self.tuples
            .sort_by(|l, r| compare_keys(&key_of(l, &parts), &key_of(r, &parts)));
    }

    fn select(
        &self,
        index_id: u32,
        iterator: u64,
        key: &[Value],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Tuple>, ServerError> {
        let parts = &self.index(index_id)?.parts;
        let mut rows: Vec<Tuple> = self.tuples.clone();
        rows.sort_by(|l, r| compare_keys(&key_of(l, parts), &key_of(r, parts)));
        let cmp = |t: &Tuple| compare_keys(&key_of(t, &parts[..key.len().min(parts.len())]), key);
        let mut rows: Vec<Tuple> = match iterator {
            // EQ / REQ / ALL
            0 | 1 | 2 if key.is_empty() => rows,
            0 | 2 => rows.into_iter().filter(|t| cmp(t) == Ordering::Equal).collect(),
            1 => rows
                .into_iter()
                .rev()
                .filter(|t| cmp(t) == Ordering::Equal)
                .collect(),
            // GE / GT
            5 => rows.into_iter().filter(|t| cmp(t) != Ordering::Less).collect(),
            6 => rows
                .into_iter()
                .filter(|t| cmp(t) == Ordering::Greater)
                .collect(),
            rest => {
                return Err(ServerError::new(
                    codes::UNSUPPORTED,
                    format!("Iterator {rest} is not supported by test server"),
                ))
            }
        };
        if iterator == 1 && key.is_empty() {
            rows.reverse();
        }
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn find(&self, index_id: u32, key: &[Value]) -> Result<Option<usize>, ServerError> {
        let parts = &self.index(index_id)?.parts;
        Ok(self
            .tuples
            .iter()
            .position(|t| compare_keys(&key_of(t, parts), key) == Ordering::Equal))
    }

    fn insert(&mut self, tuple: Tuple) -> Result<Tuple, ServerError> {
        for index in self.indexes.iter().filter(|x| x.unique) {
            let key = key_of(&tuple, &index.parts);
            if let Some(old) = self
                .tuples
                .iter()
                .find(|t| compare_keys(&key_of(t, &index.parts), &key) == Ordering::Equal)
            {
                return Err(ServerError::new(
                    codes::TUPLE_FOUND,
                    format!(
                        "Duplicate key exists in unique index \"{}\" in space \"{}\" with old tuple - {} and new tuple - {}",
                        index.name,
                        self.name,
                        Value::Array(old.clone()),
                        Value::Array(tuple.clone())
                    ),
                ));
            }
        }
        self.tuples.push(tuple.clone());
        self.sort();
        Ok(tuple)
    }

    fn replace(&mut self, tuple: Tuple) -> Result<Tuple, ServerError> {
        let key = key_of(&tuple, &self.primary().parts);
        if let Some(pos) = self.find(0, &key)? {
            self.tuples.remove(pos);
        }
        self.insert(tuple)
    }

    fn delete(&mut self, index_id: u32, key: &[Value]) -> Result<Option<Tuple>, ServerError> {
        Ok(self.find(index_id, key)?.map(|pos| self.tuples.remove(pos)))
    }

    fn update(
        &mut self,
        index_id: u32,
        key: &[Value],
        ops: &[Value],
        base: i64,
    ) -> Result<Option<Tuple>, ServerError> {
        let Some(pos) = self.find(index_id, key)? else {
            return Ok(None);
        };
        let mut tuple = self.tuples[pos].clone();
        apply_ops(&mut tuple, ops, base)?;
        self.tuples[pos] = tuple.clone();
        self.sort();
        Ok(Some(tuple))
    }

    fn upsert(&mut self, tuple: Tuple, ops: &[Value], base: i64) -> Result<(), ServerError> {
        let key = key_of(&tuple, &self.primary().parts);
        match self.find(0, &key)? {
            Some(pos) => {
                let mut existing = self.tuples[pos].clone();
                // Errors of UPSERT operations are not reported to client
                if apply_ops(&mut existing, ops, base).is_ok() {
                    self.tuples[pos] = existing;
                }
            }
            None => {
                self.insert(tuple)?;
            }
        }
        Ok(())
    }
}

fn key_of(tuple: &[Value], parts: &[usize]) -> Vec<Value> {
    parts
        .iter()
        .map(|x| tuple.get(*x).cloned().unwrap_or(Value::Nil))
        .collect()
}

fn compare_values(l: &Value, r: &Value) -> Ordering {
    match (l, r) {
        (Value::Integer(l), Value::Integer(r)) => {
            let l = l.as_i64().map(i128::from).or(l.as_u64().map(i128::from));
            let r = r.as_i64().map(i128::from).or(r.as_u64().map(i128::from));
            l.cmp(&r)
        }
        (Value::String(l), Value::String(r)) => l.as_bytes().cmp(r.as_bytes()),
        (Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (l, r) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(l, r)| l.partial_cmp(&r))
            .unwrap_or(Ordering::Equal),
    }
}

fn compare_keys(l: &[Value], r: &[Value]) -> Ordering {
    l.iter()
        .zip(r)
        .map(|(l, r)| compare_values(l, r))
        .find(|x| x.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn apply_ops(tuple: &mut Tuple, ops: &[Value], base: i64) -> Result<(), ServerError> {
    let invalid = |msg: String| ServerError::new(codes::UNSUPPORTED, msg);
    for op in ops {
        let items = op
            .as_array()
            .ok_or_else(|| invalid(format!("Illegal parameters, update operation must be an array, got {op}")))?;
        let opcode = items.first().and_then(Value::as_str).unwrap_or("");
        let field = items
            .get(1)
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid(format!("Illegal parameters, field number expected in {op}")))?;
        let idx = if field < 0 {
            tuple.len() as i64 + field
        } else {
            field - base
        };
        let idx = usize::try_from(idx).map_err(|_| invalid(format!("Field {field} was not found in the tuple")))?;
        let arg = items.get(2).cloned().unwrap_or(Value::Nil);
        let current = tuple.get(idx).cloned();
        let missing = || invalid(format!("Field {field} was not found in the tuple"));
        match opcode {
            "=" if idx == tuple.len() => tuple.push(arg),
            "=" => *tuple.get_mut(idx).ok_or_else(missing)? = arg,
            "+" | "-" => {
                let current = current.ok_or_else(missing)?;
                let sign = if opcode == "+" { 1 } else { -1 };
                tuple[idx] = match (current.as_i64(), arg.as_i64()) {
                    (Some(l), Some(r)) => Value::from(l + sign * r),
                    _ => match (current.as_f64(), arg.as_f64()) {
                        (Some(l), Some(r)) => Value::from(l + sign as f64 * r),
                        _ => return Err(invalid(format!("Argument type in operation '{opcode}' on field {field} does not match field type: expected a number"))),
                    },
                };
            }
            "&" | "|" | "^" => {
                let l = current.as_ref().and_then(Value::as_u64).ok_or_else(missing)?;
                let r = arg
                    .as_u64()
                    .ok_or_else(|| invalid(format!("Argument type in operation '{opcode}' on field {field} does not match field type: expected a positive integer")))?;
                tuple[idx] = Value::from(match opcode {
                    "&" => l & r,
                    "|" => l | r,
                    _ => l ^ r,
                });
            }
            "!" if idx <= tuple.len() => tuple.insert(idx, arg),
            "!" => return Err(missing()),
            "#" => {
                let count = arg.as_u64().unwrap_or(1) as usize;
                if idx >= tuple.len() {
                    return Err(missing());
                }
                let end = (idx + count).min(tuple.len());
                tuple.drain(idx..end);
            }
            ":" => {
                let s: Vec<char> = current
                    .as_ref()
                    .and_then(Value::as_str)
                    .ok_or_else(missing)?
                    .chars()
                    .collect();
                let offset = arg.as_i64().unwrap_or(1);
                let length = items.get(3).and_then(Value::as_i64).unwrap_or(0).max(0) as usize;
                let replacement = items.get(4).and_then(Value::as_str).unwrap_or("");
                let start = if offset > 0 {
                    (offset - 1) as usize
                } else {
                    (s.len() as i64 + offset).max(0) as usize
                }
                .min(s.len());
                let end = (start + length).min(s.len());
                let result: String = s[..start]
                    .iter()
                    .chain(replacement.chars().collect::<Vec<_>>().iter())
                    .chain(s[end..].iter())
                    .collect();
                tuple[idx] = Value::from(result);
            }
            rest => return Err(invalid(format!("Unknown UPDATE operation #{rest:?}"))),
        }
    }
    Ok(())
}

fn crew_space() -> MockSpace {
    let crew = [
        (1u32, "Benjamin Sisko", "Commander", "Commanding Officer"),
        (2, "Kira Nerys", "Major", "First Officer"),
        (3, "Jadzia Dax", "Lieutenant", "Science Officer"),
        (4, "Julian Bashir", "Lieutenant", "Chief Medical Officer"),
        (5, "Miles O'Brien", "Senior Chief Petty Officer", "Chief of Operations"),
        (6, "Worf", "Lieutenant Commander", "Strategic Operations Officer"),
        (7, "Odo", "Constable", "Chief of Security"),
    ];
    MockSpace {
        id: CREW_SPACE_ID,
        name: "ds9_crew".into(),
        indexes: vec![
            MockIndex {
                id: 0,
                name: "idx_id".into(),
                parts: vec![0],
                unique: true,
            },
            MockIndex {
                id: 1,
                name: "idx_name".into(),
                parts: vec![1],
                unique: true,
            },
            MockIndex {
                id: 2,
                name: "idx_rank".into(),
                parts: vec![2],
                unique: false,
            },
        ],
        tuples: crew
            .iter()
            .map(|(id, name, rank, occupation)| {
                vec![
                    Value::from(*id),
                    Value::from(*name),
                    Value::from(*rank),
                    Value::from(*occupation),
                ]
            })
            .collect(),
    }
}

fn clients_space() -> MockSpace {
    MockSpace {
        id: CREW_SPACE_ID + 1,
        name: "clients".into(),
        indexes: vec![MockIndex {
            id: 0,
            name: "primary".into(),
            parts: vec![0],
            unique: true,
        }],
        tuples: Vec::new(),
    }
}

/// Snapshot of state of server.
#[derive(Default)]
struct State {
    users: HashMap<String, String>,
    spaces: Vec<MockSpace>,
    requests: HashMap<u8, usize>,
    catalog_lookups: usize,
    evals: Vec<String>,
    accepted: usize,
    connections: Vec<AbortHandle>,
}

impl State {
    fn space_mut(&mut self, id: u32) -> Result<&mut MockSpace, ServerError> {
        self.spaces
            .iter_mut()
            .find(|x| x.id == id)
            .ok_or_else(|| ServerError::new(codes::NO_SUCH_SPACE, format!("Space '{id}' does not exist")))
    }

    fn vspace(&self) -> MockSpace {
        let row = |id: u32, name: &str, engine: &str| {
            vec![
                Value::from(id),
                Value::from(1),
                Value::from(name),
                Value::from(engine),
                Value::from(0),
                Value::Map(vec![]),
                Value::Array(vec![]),
            ]
        };
        let mut tuples = vec![
            row(VSPACE_ID, "_vspace", "sysview"),
            row(VINDEX_ID, "_vindex", "sysview"),
        ];
        tuples.extend(self.spaces.iter().map(|x| row(x.id, &x.name, "memtx")));
        MockSpace {
            id: VSPACE_ID,
            name: "_vspace".into(),
            indexes: vec![
                MockIndex {
                    id: 0,
                    name: "primary".into(),
                    parts: vec![0],
                    unique: true,
                },
                MockIndex {
                    id: 1,
                    name: "owner".into(),
                    parts: vec![1],
                    unique: false,
                },
                MockIndex {
                    id: 2,
                    name: "name".into(),
                    parts: vec![2],
                    unique: true,
                },
            ],
            tuples,
        }
    }

    fn vindex(&self) -> MockSpace {
        let tuples = self
            .spaces
            .iter()
            .flat_map(|space| {
                space.indexes.iter().map(move |index| {
                    vec![
                        Value::from(space.id),
                        Value::from(index.id),
                        Value::from(index.name.as_str()),
                        Value::from("tree"),
                        Value::Map(vec![(Value::from("unique"), Value::from(index.unique))]),
                        Value::Array(
                            index
                                .parts
                                .iter()
                                .map(|x| {
                                    Value::Array(vec![Value::from(*x as u64), Value::from("scalar")])
                                })
                                .collect(),
                        ),
                    ]
                })
            })
            .collect();
        MockSpace {
            id: VINDEX_ID,
            name: "_vindex".into(),
            indexes: vec![
                MockIndex {
                    id: 0,
                    name: "primary".into(),
                    parts: vec![0, 1],
                    unique: true,
                },
                MockIndex {
                    id: 2,
                    name: "name".into(),
                    parts: vec![0, 2],
                    unique: true,
                },
            ],
            tuples,
        }
    }
}

/// Test server on random local port.
///
/// Understood `eval` expressions:
///
/// * `return ...` returns arguments;
/// * `require('fiber').sleep(N)` responds after `N` seconds;
/// * `error('message')` fails with `message`;
/// * batch scripts (`local items = ...` with loop over `items`), executed
///   against in-memory spaces, with `box.begin()` rolling everything back on failure.
///
/// Understood functions for `call`: `station_name` and `fail` (returns `nil, "failure"`).
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    accept_handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Bind test server");
        let addr = listener.local_addr().expect("Local address of test server");
        let state = Arc::new(Mutex::new(State {
            users: hashmap! {
                "Sisko".to_owned() => "A-4-7-1".to_owned(),
                "guest".to_owned() => String::new(),
            },
            spaces: vec![crew_space(), clients_space()],
            ..Default::default()
        }));
        let accept_handle = tokio::spawn(accept_loop(listener, state.clone()));
        Self {
            addr,
            state,
            accept_handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connection string `host:port`.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Number of received requests of type (`1` is SELECT, `8` is EVAL, etc.).
    pub fn requests(&self, request_type: u8) -> usize {
        self.state
            .lock()
            .requests
            .get(&request_type)
            .copied()
            .unwrap_or(0)
    }

    /// Number of SELECTs from `_vspace` and `_vindex`.
    pub fn catalog_lookups(&self) -> usize {
        self.state.lock().catalog_lookups
    }

    pub fn evals(&self) -> Vec<String> {
        self.state.lock().evals.clone()
    }

    /// Number of accepted TCP connections.
    pub fn accepted(&self) -> usize {
        self.state.lock().accepted
    }

    pub fn tuples(&self, space_id: u32) -> Vec<Tuple> {
        self.state
            .lock()
            .space_mut(space_id)
            .map(|x| x.tuples.clone())
            .unwrap_or_default()
    }

    /// Close all accepted connections, server keeps accepting new ones.
    pub fn drop_connections(&self) {
        for handle in self.state.lock().connections.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_handle.abort();
        self.drop_connections();
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<Mutex<State>>) {
    while let Ok((stream, _)) = listener.accept().await {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(write_half, rx));
        let reader = tokio::spawn(read_loop(read_half, tx, state.clone()));
        let mut guard = state.lock();
        guard.accepted += 1;
        guard.connections.push(writer.abort_handle());
        guard.connections.push(reader.abort_handle());
    }
}

async fn write_loop(mut stream: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    if stream.write_all(&greeting()).await.is_err() {
        return;
    }
    while let Some(frame) = rx.recv().await {
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

async fn read_loop(
    mut stream: OwnedReadHalf,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    state: Arc<Mutex<State>>,
) {
    while let Ok(frame) = read_frame(&mut stream).await {
        let mut reader = frame.as_slice();
        let Ok(header) = rmpv::decode::read_value(&mut reader) else {
            return;
        };
        let body = if reader.is_empty() {
            Value::Map(vec![])
        } else {
            match rmpv::decode::read_value(&mut reader) {
                Ok(x) => x,
                Err(_) => return,
            }
        };
        let request_type = get(&header, 0x00).and_then(Value::as_u64).unwrap_or(0) as u8;
        let sync = get(&header, 0x01).and_then(Value::as_u64).unwrap_or(0);
        *state.lock().requests.entry(request_type).or_default() += 1;

        if let Some(delay) = sleep_request(request_type, &body) {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(encode_response(sync, Ok(Value::Array(vec![]))));
            });
            continue;
        }

        let result = handle(&state, request_type, &body);
        if tx.send(encode_response(sync, result)).is_err() {
            return;
        }
    }
}

async fn read_frame(stream: &mut OwnedReadHalf) -> std::io::Result<Vec<u8>> {
    let marker = stream.read_u8().await?;
    let length = match marker {
        0x00..=0x7f => marker as usize,
        0xcc => stream.read_u8().await? as usize,
        0xcd => stream.read_u16().await? as usize,
        0xce => stream.read_u32().await? as usize,
        rest => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected length marker {rest:#x}"),
            ))
        }
    };
    let mut frame = vec![0u8; length];
    stream.read_exact(&mut frame).await?;
    Ok(frame)
}

fn greeting() -> Vec<u8> {
    let mut buf = vec![b' '; 128];
    let line1 = b"Tarantool 2.11.0 (Binary) 5f4e3d2c-1b0a-4987-8654-3210fedcba98";
    buf[..line1.len()].copy_from_slice(line1);
    buf[63] = b'\n';
    let salt = STANDARD.encode(SALT);
    buf[64..64 + salt.len()].copy_from_slice(salt.as_bytes());
    buf[127] = b'\n';
    buf
}

fn get(map: &Value, key: u8) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key as u64))
        .map(|(_, v)| v)
}

fn get_u32(map: &Value, key: u8) -> Result<u32, ServerError> {
    get(map, key)
        .and_then(Value::as_u64)
        .and_then(|x| u32::try_from(x).ok())
        .ok_or_else(|| ServerError::new(codes::UNSUPPORTED, format!("Missing key {key:#x} in request")))
}

fn get_array(map: &Value, key: u8) -> Vec<Value> {
    get(map, key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn sleep_request(request_type: u8, body: &Value) -> Option<Duration> {
    if request_type != 8 {
        return None;
    }
    let expr = get(body, 0x27)?.as_str()?;
    let (_, rest) = expr.split_once("fiber').sleep(")?;
    let (secs, _) = rest.split_once(')')?;
    secs.trim().parse::<f64>().ok().map(Duration::from_secs_f64)
}

fn encode_response(sync: u64, result: Result<Value, ServerError>) -> Vec<u8> {
    let (code, body) = match result {
        Ok(data) => (0, Value::Map(vec![(Value::from(0x30), data)])),
        Err(err) => (
            0x8000 + err.code,
            Value::Map(vec![(Value::from(0x31), Value::from(err.message))]),
        ),
    };
    let header = Value::Map(vec![
        (Value::from(0x00), Value::from(code)),
        (Value::from(0x01), Value::from(sync)),
        (Value::from(0x05), Value::from(1)),
    ]);
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, &header).expect("Encode header");
    rmpv::encode::write_value(&mut payload, &body).expect("Encode body");
    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(0xce);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

fn handle(state: &Mutex<State>, request_type: u8, body: &Value) -> Result<Value, ServerError> {
    let mut state = state.lock();
    let base = get(body, 0x15).and_then(Value::as_i64).unwrap_or(0);
    match request_type {
        // PING
        64 => Ok(Value::Nil),
        // AUTH
        7 => {
            let user = get(body, 0x23).and_then(Value::as_str).unwrap_or("");
            let scramble = get_array(body, 0x21)
                .get(1)
                .and_then(|x| x.as_slice().map(<[u8]>::to_vec))
                .unwrap_or_default();
            match state.users.get(user) {
                Some(password) if check_scramble(password, &scramble) => Ok(Value::Nil),
                _ => Err(ServerError::new(
                    codes::CREDS_MISMATCH,
                    "User not found or supplied credentials are invalid",
                )),
            }
        }
        // SELECT
        1 => {
            let space_id = get_u32(body, 0x10)?;
            let index_id = get_u32(body, 0x11).unwrap_or(0);
            let space = match space_id {
                VSPACE_ID => {
                    state.catalog_lookups += 1;
                    state.vspace()
                }
                VINDEX_ID => {
                    state.catalog_lookups += 1;
                    state.vindex()
                }
                _ => state.space_mut(space_id)?.clone(),
            };
            let rows = space.select(
                index_id,
                get(body, 0x14).and_then(Value::as_u64).unwrap_or(0),
                &get_array(body, 0x20),
                get(body, 0x13).and_then(Value::as_u64).unwrap_or(0) as usize,
                get(body, 0x12).and_then(Value::as_u64).unwrap_or(u64::MAX) as usize,
            )?;
            Ok(Value::Array(rows.into_iter().map(Value::Array).collect()))
        }
        // INSERT / REPLACE
        2 | 3 => {
            let space = state.space_mut(get_u32(body, 0x10)?)?;
            let tuple = get_array(body, 0x21);
            let row = if request_type == 2 {
                space.insert(tuple)?
            } else {
                space.replace(tuple)?
            };
            Ok(Value::Array(vec![Value::Array(row)]))
        }
        // UPDATE
        4 => {
            let index_id = get_u32(body, 0x11).unwrap_or(0);
            let space = state.space_mut(get_u32(body, 0x10)?)?;
            let row = space.update(index_id, &get_array(body, 0x20), &get_array(body, 0x21), base)?;
            Ok(Value::Array(row.into_iter().map(Value::Array).collect()))
        }
        // DELETE
        5 => {
            let index_id = get_u32(body, 0x11).unwrap_or(0);
            let space = state.space_mut(get_u32(body, 0x10)?)?;
            let row = space.delete(index_id, &get_array(body, 0x20))?;
            Ok(Value::Array(row.into_iter().map(Value::Array).collect()))
        }
        // UPSERT
        9 => {
            let space = state.space_mut(get_u32(body, 0x10)?)?;
            space.upsert(get_array(body, 0x21), &get_array(body, 0x28), base)?;
            Ok(Value::Array(vec![]))
        }
        // CALL
        10 => match get(body, 0x22).and_then(Value::as_str).unwrap_or("") {
            "station_name" => Ok(Value::Array(vec![Value::from("Deep Space 9")])),
            "fail" => Ok(Value::Array(vec![Value::Nil, Value::from("failure")])),
            rest => Err(ServerError::new(
                codes::NO_SUCH_PROC,
                format!("Procedure '{rest}' is not defined"),
            )),
        },
        // EVAL
        8 => {
            let expr = get(body, 0x27).and_then(Value::as_str).unwrap_or("").to_owned();
            state.evals.push(expr.clone());
            let args = get_array(body, 0x21);
            if expr.trim() == "return ..." {
                Ok(Value::Array(args))
            } else if let Some(message) = expr
                .strip_prefix("error('")
                .and_then(|x| x.strip_suffix("')"))
            {
                Err(ServerError::new(codes::PROC_LUA, message))
            } else if expr.starts_with("local items = ...") {
                run_batch(&mut state, &expr, args)
            } else {
                Err(ServerError::new(
                    codes::PROC_LUA,
                    format!("Expression is not supported by test server: {expr}"),
                ))
            }
        }
        rest => Err(ServerError::new(
            codes::UNSUPPORTED,
            format!("Unknown request type {rest}"),
        )),
    }
}

fn check_scramble(password: &str, scramble: &[u8]) -> bool {
    let hash_1 = Sha1::digest(password.as_bytes());
    let hash_2 = Sha1::digest(&hash_1);
    let mut hasher = Sha1::new();
    hasher.update(&SALT[..20]);
    hasher.update(&hash_2);
    let step_3 = hasher.finalize();
    let restored: Vec<u8> = scramble.iter().zip(step_3).map(|(l, r)| l ^ r).collect();
    Sha1::digest(&restored).as_slice() == hash_2.as_slice()
}

/// Execute script, produced for `insert_many`, `replace_many` and `delete_many`.
fn run_batch(state: &mut State, expr: &str, args: Vec<Value>) -> Result<Value, ServerError> {
    let unsupported = || ServerError::new(codes::PROC_LUA, format!("Unsupported batch script: {expr}"));
    let in_transaction = expr.contains("box.begin()");
    let collect = expr.contains("return results");
    let call = expr
        .lines()
        .map(str::trim)
        .find(|x| x.ends_with("(item)"))
        .ok_or_else(unsupported)?;
    let call = call.strip_prefix("local t = ").unwrap_or(call);
    let (target, method) = call
        .strip_suffix("(item)")
        .and_then(|x| x.rsplit_once(':'))
        .ok_or_else(unsupported)?;
    let (space_id, index_id) = parse_target(target).ok_or_else(unsupported)?;
    let items = args
        .into_iter()
        .next()
        .and_then(|x| x.as_array().cloned())
        .unwrap_or_default();

    let snapshot = state.spaces.clone();
    let mut results = Vec::new();
    let run = || -> Result<(), ServerError> {
        let space = state.space_mut(space_id)?;
        for item in items {
            let item = item.as_array().cloned().unwrap_or_else(|| vec![item]);
            let row = match method {
                "insert" => Some(space.insert(item)?),
                "replace" => Some(space.replace(item)?),
                "delete" => space.delete(index_id, &item)?,
                _ => return Err(unsupported()),
            };
            results.extend(row.map(Value::Array));
        }
        Ok(())
    };
    match run() {
        Ok(()) if collect => Ok(Value::Array(vec![Value::Array(results)])),
        Ok(()) => Ok(Value::Array(vec![])),
        Err(err) => {
            if in_transaction {
                state.spaces = snapshot;
            }
            Err(err)
        }
    }
}

/// Parse `box.space[ID]` or `box.space[ID].index[ID]`.
fn parse_target(target: &str) -> Option<(u32, u32)> {
    let rest = target.strip_prefix("box.space[")?;
    let (space, rest) = rest.split_once(']')?;
    let index = match rest.strip_prefix(".index[") {
        Some(x) => x.strip_suffix(']')?.parse().ok()?,
        None if rest.is_empty() => 0,
        None => return None,
    };
    Some((space.parse().ok()?, index))
}
