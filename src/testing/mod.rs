//! In-process store used by the test suite.
//!
//! `FakeServer` binds an ephemeral port and speaks enough of the store
//! protocol for the client to be exercised end to end: authentication, db
//! selection, strings with TTLs, lists, `CONFIG` for the notification flags,
//! and pub/sub. Key changes publish `__keyevent@<db>__:<event>` messages
//! according to the configured flags, and a background sweeper expires keys
//! and publishes `expired` the same way the real store does.

mod backend;

pub(crate) use backend::FakeBackend;

use crate::config::ConnectionSettings;
use crate::protocol::{RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Password every fake server expects
pub(crate) const PASSWORD: &str = "secret";

const SWEEP_INTERVAL: Duration = Duration::from_millis(10);
const MAX_DB: i64 = 15;
const FLAG_ALPHABET: &str = "KEg$lshzxetmdnA";

pub(crate) struct FakeServer {
    addr: String,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
}

impl FakeServer {
    /// Binds an ephemeral local port and starts serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr").to_string();
        let state = Arc::new(ServerState::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(listener, Arc::clone(&state), shutdown.clone()));
        tokio::spawn(sweeper_loop(Arc::clone(&state), shutdown.clone()));
        debug!(addr = %addr, "Fake server listening");

        Self {
            addr,
            state,
            shutdown,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Settings pointing at this server with short test timeouts.
    pub fn settings(&self) -> ConnectionSettings {
        Self::settings_for(&self.addr)
    }

    pub fn settings_for(addr: &str) -> ConnectionSettings {
        ConnectionSettings {
            addr: addr.to_string(),
            user: None,
            password: PASSWORD.to_string(),
            db: 0,
            dial_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            pool_size: 4,
            pool_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(2),
        }
    }

    /// Publishes a message; returns the number of receivers.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        self.state.publish(channel, payload)
    }

    /// Current `notify-keyspace-events` value.
    pub fn notify_flags(&self) -> String {
        self.state.notify_flags.lock().unwrap().clone()
    }

    /// Stops accepting and drops every open connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Subscriber {
    id: u64,
    channels: HashSet<String>,
    tx: mpsc::UnboundedSender<RespValue>,
}

#[derive(Default)]
struct ServerState {
    dbs: Mutex<HashMap<i64, HashMap<String, Entry>>>,
    notify_flags: Mutex<String>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

impl ServerState {
    fn publish(&self, channel: &str, payload: &str) -> usize {
        let frame = RespValue::array(vec![
            RespValue::bulk_string("message"),
            RespValue::bulk_string(channel.to_string()),
            RespValue::bulk_string(payload.to_string()),
        ]);

        let mut delivered = 0;
        self.subscribers.lock().unwrap().retain(|sub| {
            if !sub.channels.contains(channel) {
                return !sub.tx.is_closed();
            }
            let alive = sub.tx.send(frame.clone()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }

    fn notify(&self, db: i64, events: Vec<(&'static str, String)>) {
        if events.is_empty() {
            return;
        }
        let flags = self.notify_flags.lock().unwrap().clone();
        for (event, key) in events {
            if event_enabled(&flags, event) {
                let channel = format!("__keyevent@{}__:{}", db, event);
                trace!(channel = %channel, key = %key, "Publishing keyevent");
                self.publish(&channel, &key);
            }
        }
    }

    fn subscribe(&self, id: u64, channels: &HashSet<String>, tx: &mpsc::UnboundedSender<RespValue>) {
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.iter_mut().find(|sub| sub.id == id) {
            Some(sub) => sub.channels = channels.clone(),
            None => subscribers.push(Subscriber {
                id,
                channels: channels.clone(),
                tx: tx.clone(),
            }),
        }
    }

    fn data_command(&self, db: i64, name: &str, args: &[String]) -> RespValue {
        let (reply, events) = {
            let mut dbs = self.dbs.lock().unwrap();
            let mut keyspace = Keyspace {
                entries: dbs.entry(db).or_default(),
                events: Vec::new(),
            };
            let reply = match name {
                "GET" => keyspace.get(args),
                "SET" => keyspace.set(args),
                "DEL" => keyspace.del(args),
                "EXISTS" => keyspace.exists(args),
                "TTL" => keyspace.ttl(args),
                "EXPIRE" => keyspace.expire(args),
                "LPUSH" => keyspace.push(args, true),
                "RPUSH" => keyspace.push(args, false),
                "LPOP" => keyspace.pop(args, true),
                "RPOP" => keyspace.pop(args, false),
                "LRANGE" => keyspace.lrange(args),
                "LLEN" => keyspace.llen(args),
                _ => RespValue::error(format!("ERR unknown command '{}'", name)),
            };
            (reply, keyspace.events)
        };
        self.notify(db, events);
        reply
    }

    fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<(i64, Vec<(&'static str, String)>)> = {
            let mut dbs = self.dbs.lock().unwrap();
            dbs.iter_mut()
                .map(|(db, entries)| {
                    let keys: Vec<String> = entries
                        .iter()
                        .filter(|(_, e)| e.is_expired(now))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in &keys {
                        entries.remove(key);
                    }
                    (*db, keys.into_iter().map(|k| ("expired", k)).collect())
                })
                .collect()
        };

        for (db, events) in expired {
            self.notify(db, events);
        }
    }
}

fn event_enabled(flags: &str, event: &str) -> bool {
    if !flags.contains('E') {
        return false;
    }
    let class = match event {
        "set" => '$',
        "del" | "expire" => 'g',
        "expired" => 'x',
        "lpush" | "rpush" | "lpop" | "rpop" => 'l',
        _ => return false,
    };
    flags.contains('A') || flags.contains(class)
}

/// One db's entries plus the keyevents a command produced.
struct Keyspace<'a> {
    entries: &'a mut HashMap<String, Entry>,
    events: Vec<(&'static str, String)>,
}

impl Keyspace<'_> {
    fn purge_if_expired(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| e.is_expired(Instant::now()));
        if expired {
            self.entries.remove(key);
            self.events.push(("expired", key.to_string()));
        }
    }

    fn get(&mut self, args: &[String]) -> RespValue {
        let [key] = args else {
            return wrong_args("get");
        };
        self.purge_if_expired(key);
        match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Str(s)) => RespValue::bulk_string(s.clone()),
            Some(Value::List(_)) => wrong_type(),
            None => RespValue::null(),
        }
    }

    fn set(&mut self, args: &[String]) -> RespValue {
        if args.len() < 2 {
            return wrong_args("set");
        }
        let (key, value) = (&args[0], &args[1]);

        let mut ttl = None;
        let mut options = args[2..].iter();
        while let Some(option) = options.next() {
            let unit_ms = match option.to_uppercase().as_str() {
                "EX" => 1000,
                "PX" => 1,
                _ => return RespValue::error("ERR syntax error"),
            };
            match options.next().and_then(|n| n.parse::<u64>().ok()) {
                Some(amount) if amount > 0 => ttl = Some(Duration::from_millis(amount * unit_ms)),
                _ => return RespValue::error("ERR invalid expire time in 'set' command"),
            }
        }

        self.entries.insert(
            key.clone(),
            Entry {
                value: Value::Str(value.clone()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        self.events.push(("set", key.clone()));
        if ttl.is_some() {
            self.events.push(("expire", key.clone()));
        }
        RespValue::ok()
    }

    fn del(&mut self, args: &[String]) -> RespValue {
        if args.is_empty() {
            return wrong_args("del");
        }
        let mut removed = 0;
        for key in args {
            self.purge_if_expired(key);
            if self.entries.remove(key).is_some() {
                removed += 1;
                self.events.push(("del", key.clone()));
            }
        }
        RespValue::integer(removed)
    }

    fn exists(&mut self, args: &[String]) -> RespValue {
        if args.is_empty() {
            return wrong_args("exists");
        }
        let mut count = 0;
        for key in args {
            self.purge_if_expired(key);
            if self.entries.contains_key(key) {
                count += 1;
            }
        }
        RespValue::integer(count)
    }

    fn ttl(&mut self, args: &[String]) -> RespValue {
        let [key] = args else {
            return wrong_args("ttl");
        };
        self.purge_if_expired(key);
        let seconds = match self.entries.get(key) {
            None => -2,
            Some(Entry {
                expires_at: None, ..
            }) => -1,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let ms = at.saturating_duration_since(Instant::now()).as_millis() as i64;
                (ms + 500) / 1000
            }
        };
        RespValue::integer(seconds)
    }

    fn expire(&mut self, args: &[String]) -> RespValue {
        let [key, seconds] = args else {
            return wrong_args("expire");
        };
        let Ok(seconds) = seconds.parse::<i64>() else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        self.purge_if_expired(key);

        let Some(entry) = self.entries.get_mut(key) else {
            return RespValue::integer(0);
        };
        if seconds <= 0 {
            self.entries.remove(key);
            self.events.push(("del", key.clone()));
        } else {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds as u64));
            self.events.push(("expire", key.clone()));
        }
        RespValue::integer(1)
    }

    fn push(&mut self, args: &[String], front: bool) -> RespValue {
        if args.len() < 2 {
            return wrong_args(if front { "lpush" } else { "rpush" });
        }
        let key = &args[0];
        self.purge_if_expired(key);

        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let Value::List(list) = &mut entry.value else {
            return wrong_type();
        };
        for value in &args[1..] {
            if front {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        let len = list.len();

        self.events
            .push((if front { "lpush" } else { "rpush" }, key.clone()));
        RespValue::integer(len as i64)
    }

    fn pop(&mut self, args: &[String], front: bool) -> RespValue {
        let [key] = args else {
            return wrong_args(if front { "lpop" } else { "rpop" });
        };
        self.purge_if_expired(key);

        let Some(entry) = self.entries.get_mut(key) else {
            return RespValue::null();
        };
        let Value::List(list) = &mut entry.value else {
            return wrong_type();
        };
        let popped = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        let emptied = list.is_empty();
        if emptied {
            self.entries.remove(key);
        }

        match popped {
            Some(value) => {
                self.events
                    .push((if front { "lpop" } else { "rpop" }, key.clone()));
                if emptied {
                    self.events.push(("del", key.clone()));
                }
                RespValue::bulk_string(value)
            }
            None => RespValue::null(),
        }
    }

    fn lrange(&mut self, args: &[String]) -> RespValue {
        let [key, start, stop] = args else {
            return wrong_args("lrange");
        };
        let (Ok(start), Ok(stop)) = (start.parse::<i64>(), stop.parse::<i64>()) else {
            return RespValue::error("ERR value is not an integer or out of range");
        };
        self.purge_if_expired(key);

        let list = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::List(list)) => list,
            Some(Value::Str(_)) => return wrong_type(),
            None => return RespValue::array(Vec::new()),
        };

        let len = list.len() as i64;
        let normalize = |i: i64| if i < 0 { (len + i).max(0) } else { i };
        let (start, stop) = (normalize(start), normalize(stop).min(len - 1));
        if start > stop || start >= len {
            return RespValue::array(Vec::new());
        }

        RespValue::array(
            list.iter()
                .skip(start as usize)
                .take((stop - start + 1) as usize)
                .map(|v| RespValue::bulk_string(v.clone()))
                .collect(),
        )
    }

    fn llen(&mut self, args: &[String]) -> RespValue {
        let [key] = args else {
            return wrong_args("llen");
        };
        self.purge_if_expired(key);
        match self.entries.get(key).map(|e| &e.value) {
            Some(Value::List(list)) => RespValue::integer(list.len() as i64),
            Some(Value::Str(_)) => wrong_type(),
            None => RespValue::integer(0),
        }
    }
}

fn wrong_args(command: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}

fn wrong_type() -> RespValue {
    RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

/// Per-connection state.
struct Session {
    state: Arc<ServerState>,
    authenticated: bool,
    db: i64,
    subscriber_id: u64,
    channels: HashSet<String>,
    push_tx: Option<mpsc::UnboundedSender<RespValue>>,
    push_rx: Option<mpsc::UnboundedReceiver<RespValue>>,
}

impl Session {
    fn new(state: Arc<ServerState>) -> Self {
        let subscriber_id = state.next_subscriber.fetch_add(1, Ordering::Relaxed);
        Self {
            state,
            authenticated: false,
            db: 0,
            subscriber_id,
            channels: HashSet::new(),
            push_tx: None,
            push_rx: None,
        }
    }

    async fn execute(&mut self, args: Vec<String>) -> Vec<RespValue> {
        let Some(name) = args.first().map(|s| s.to_uppercase()) else {
            return vec![RespValue::error("ERR empty command")];
        };
        let args = &args[1..];

        if !self.authenticated && name != "AUTH" {
            return vec![RespValue::error("NOAUTH Authentication required.")];
        }

        let reply = match name.as_str() {
            "AUTH" => self.cmd_auth(args),
            "SELECT" => self.cmd_select(args),
            "PING" => match args.first() {
                Some(message) => RespValue::bulk_string(message.clone()),
                None => RespValue::simple_string("PONG"),
            },
            "SUBSCRIBE" => return self.cmd_subscribe(args),
            "PUBLISH" => match args {
                [channel, payload] => {
                    RespValue::integer(self.state.publish(channel, payload) as i64)
                }
                _ => wrong_args("publish"),
            },
            "CONFIG" => self.cmd_config(args),
            "DEBUG" => cmd_debug(args).await,
            _ => self.state.data_command(self.db, &name, args),
        };
        vec![reply]
    }

    fn cmd_auth(&mut self, args: &[String]) -> RespValue {
        let password = match args {
            [password] | [_, password] => password,
            _ => return wrong_args("auth"),
        };
        if password == PASSWORD {
            self.authenticated = true;
            RespValue::ok()
        } else {
            RespValue::error("WRONGPASS invalid username-password pair or user is disabled.")
        }
    }

    fn cmd_select(&mut self, args: &[String]) -> RespValue {
        let [db] = args else {
            return wrong_args("select");
        };
        match db.parse::<i64>() {
            Ok(db) if (0..=MAX_DB).contains(&db) => {
                self.db = db;
                RespValue::ok()
            }
            Ok(_) => RespValue::error("ERR DB index is out of range"),
            Err(_) => RespValue::error("ERR value is not an integer or out of range"),
        }
    }

    fn cmd_subscribe(&mut self, args: &[String]) -> Vec<RespValue> {
        if args.is_empty() {
            return vec![wrong_args("subscribe")];
        }
        if self.push_tx.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            self.push_tx = Some(tx);
            self.push_rx = Some(rx);
        }

        let mut confirmations = Vec::with_capacity(args.len());
        for channel in args {
            self.channels.insert(channel.clone());
            confirmations.push(RespValue::array(vec![
                RespValue::bulk_string("subscribe"),
                RespValue::bulk_string(channel.clone()),
                RespValue::integer(self.channels.len() as i64),
            ]));
        }
        if let Some(tx) = &self.push_tx {
            self.state.subscribe(self.subscriber_id, &self.channels, tx);
        }
        confirmations
    }

    fn cmd_config(&mut self, args: &[String]) -> RespValue {
        let Some(subcommand) = args.first().map(|s| s.to_uppercase()) else {
            return wrong_args("config");
        };
        match (subcommand.as_str(), &args[1..]) {
            ("SET", [parameter, value]) => {
                if !parameter.eq_ignore_ascii_case("notify-keyspace-events") {
                    return RespValue::error(format!(
                        "ERR Unknown option or number of arguments for CONFIG SET - '{}'",
                        parameter
                    ));
                }
                if !value.chars().all(|c| FLAG_ALPHABET.contains(c)) {
                    return RespValue::error(
                        "ERR CONFIG SET failed (possibly related to argument 'notify-keyspace-events') - Invalid event class character",
                    );
                }
                *self.state.notify_flags.lock().unwrap() = value.clone();
                RespValue::ok()
            }
            ("GET", [pattern]) => {
                if pattern == "*" || pattern.eq_ignore_ascii_case("notify-keyspace-events") {
                    let flags = self.state.notify_flags.lock().unwrap().clone();
                    RespValue::array(vec![
                        RespValue::bulk_string("notify-keyspace-events"),
                        RespValue::bulk_string(flags),
                    ])
                } else {
                    RespValue::array(Vec::new())
                }
            }
            _ => RespValue::error(format!("ERR unknown CONFIG subcommand '{}'", subcommand)),
        }
    }
}

/// `DEBUG SLEEP <seconds>` holds the reply back, for timeout tests.
async fn cmd_debug(args: &[String]) -> RespValue {
    match args {
        [sub, seconds] if sub.eq_ignore_ascii_case("SLEEP") => match seconds.parse::<f64>() {
            Ok(seconds) if seconds >= 0.0 => {
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                RespValue::ok()
            }
            _ => RespValue::error("ERR value is not a valid float"),
        },
        _ => RespValue::error("ERR unknown DEBUG subcommand"),
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>, shutdown: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => {
                tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&state),
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                debug!(error = %e, "Fake server accept failed");
                return;
            }
        }
    }
}

async fn sweeper_loop(state: Arc<ServerState>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => state.sweep(),
        }
    }
}

enum Step {
    Shutdown,
    Push(RespValue),
    Read(std::io::Result<usize>),
}

async fn next_push(rx: &mut Option<mpsc::UnboundedReceiver<RespValue>>) -> Option<RespValue> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<ServerState>, shutdown: CancellationToken) {
    let mut session = Session::new(state);
    let mut parser = RespParser::new();
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let step = tokio::select! {
            _ = shutdown.cancelled() => Step::Shutdown,
            Some(frame) = next_push(&mut session.push_rx) => Step::Push(frame),
            read = stream.read_buf(&mut buffer) => Step::Read(read),
        };

        match step {
            Step::Shutdown | Step::Read(Ok(0)) | Step::Read(Err(_)) => return,
            Step::Push(frame) => {
                if stream.write_all(&frame.serialize()).await.is_err() {
                    return;
                }
            }
            Step::Read(Ok(_)) => loop {
                let (frame, consumed) = match parser.parse(&buffer) {
                    Ok(Some(parsed)) => parsed,
                    Ok(None) => break,
                    Err(_) => return,
                };
                buffer.advance(consumed);

                let args = frame
                    .into_array()
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(RespValue::into_string)
                    .collect();

                let mut out = Vec::new();
                for reply in session.execute(args).await {
                    reply.serialize_into(&mut out);
                }
                if stream.write_all(&out).await.is_err() {
                    return;
                }
            },
        }
    }
}
