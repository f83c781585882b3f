//! TCP command channel.
//!
//! One client at a time. The channel thread walks an explicit state machine:
//!
//! ```text
//! Unbound -> Listening -> Connected -> Reconnecting -> Listening -> ...
//!                                  \-> Terminated (shutdown, from any state)
//! ```
//!
//! A zero-byte read, a socket error or `read_timeout` without traffic is a
//! disconnect and rebuilds the listener. `app_ping` is answered directly
//! on the channel thread. Every other decoded command is queued for the task
//! state machine as an `Envelope`.

pub mod protocol;

use anyhow::{anyhow, bail, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::actuator::TelemetrySource;

pub use protocol::{
    joint_records, parse_line, Command, Decision, ExpressiveMotion, JointRecord, Notification,
    OrderRequest,
};

pub const DEFAULT_ADDR: &str = "0.0.0.0:20002";
pub const MAX_MESSAGE_BYTES: usize = 1024;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_POLL: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub addr: String,
    /// No traffic for this long counts as a lost connection.
    pub read_timeout: Duration,
    pub bind_retry_initial: Duration,
    pub bind_retry_max: Duration,
    pub send_retries: u32,
    pub send_retry_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            read_timeout: Duration::from_secs(10),
            bind_retry_initial: Duration::from_millis(250),
            bind_retry_max: Duration::from_secs(5),
            send_retries: 3,
            send_retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Unbound,
    Listening,
    Connected,
    Reconnecting,
    Terminated,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A decoded command and when it arrived.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub command: Command,
    pub received_at: Instant,
}

/// Receiving end of the command queue.
pub struct Inbound {
    rx: Receiver<Envelope>,
}

impl Inbound {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => Some(envelope),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    pub fn try_recv(&self) -> Option<Envelope> {
        match self.rx.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// A bare command queue, for driving the task state machine without a socket.
pub fn inbound_queue() -> (Sender<Envelope>, Inbound) {
    let (tx, rx) = mpsc::channel();
    (tx, Inbound { rx })
}

// ----------------------------------------------------------------------------
// Outbound
// ----------------------------------------------------------------------------

pub trait NotificationSink: Send + Sync {
    /// Deliver one notification. An error means it was dropped.
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Best-effort writer onto whichever client is currently connected.
#[derive(Clone)]
pub struct Notifier {
    client: Arc<Mutex<Option<TcpStream>>>,
    retries: u32,
    retry_delay: Duration,
}

impl Notifier {
    fn new(retries: u32, retry_delay: Duration) -> Self {
        Self {
            client: Arc::new(Mutex::new(None)),
            retries,
            retry_delay,
        }
    }

    fn attach(&self, stream: TcpStream) {
        *lock(&self.client) = Some(stream);
    }

    fn detach(&self) {
        if let Some(stream) = lock(&self.client).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn write_once(&self, bytes: &[u8]) -> Result<()> {
        let mut client = lock(&self.client);
        let Some(stream) = client.as_mut() else {
            bail!("no client connected");
        };
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }
}

impl NotificationSink for Notifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let line = notification.encode();
        let mut last_err = anyhow!("notification not sent");
        for attempt in 0..=self.retries {
            match self.write_once(line.as_bytes()) {
                Ok(()) => {
                    log::debug!("sent {}", line.trim_end());
                    return Ok(());
                }
                Err(err) => {
                    log::debug!("send attempt {} failed: {}", attempt + 1, err);
                    last_err = err;
                }
            }
            if attempt < self.retries {
                std::thread::sleep(self.retry_delay);
            }
        }
        Err(last_err.context(format!("dropped notification {}", line.trim_end())))
    }
}

// ----------------------------------------------------------------------------
// CommandChannel
// ----------------------------------------------------------------------------

pub struct CommandChannel {
    cfg: ChannelConfig,
    telemetry: Arc<dyn TelemetrySource>,
}

pub struct ChannelHandle {
    state: Arc<Mutex<ChannelState>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
    notifier: Notifier,
    inbound: Option<Inbound>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    /// Address of the current listener, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// The command queue. Handed out once.
    pub fn take_inbound(&mut self) -> Option<Inbound> {
        self.inbound.take()
    }

    /// Block until the channel reaches `wanted`, or fail after `timeout`.
    pub fn wait_for(&self, wanted: ChannelState, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.state();
            if current == wanted {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("channel still {:?} after {:?}, wanted {:?}", current, timeout, wanted);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("command channel thread panicked"))?;
        }
        Ok(())
    }
}

impl CommandChannel {
    pub fn new(cfg: ChannelConfig, telemetry: Arc<dyn TelemetrySource>) -> Self {
        Self { cfg, telemetry }
    }

    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<ChannelHandle> {
        let configured: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid channel address '{}': {}", self.cfg.addr, e))?;
        let (tx, inbound) = inbound_queue();
        let notifier = Notifier::new(self.cfg.send_retries, self.cfg.send_retry_delay);
        let state = Arc::new(Mutex::new(ChannelState::Unbound));
        let local_addr = Arc::new(Mutex::new(None));

        let mut worker = Worker {
            cfg: self.cfg,
            configured,
            telemetry: self.telemetry,
            tx,
            notifier: notifier.clone(),
            state: state.clone(),
            local_addr: local_addr.clone(),
            shutdown: shutdown.clone(),
            listener: None,
            client: None,
        };
        let join = std::thread::Builder::new()
            .name("command-channel".to_string())
            .spawn(move || worker.run())?;

        Ok(ChannelHandle {
            state,
            local_addr,
            notifier,
            inbound: Some(inbound),
            shutdown,
            join: Some(join),
        })
    }
}

struct Client {
    stream: TcpStream,
    peer: SocketAddr,
    pending: Vec<u8>,
    last_traffic: Instant,
}

struct Worker {
    cfg: ChannelConfig,
    configured: SocketAddr,
    telemetry: Arc<dyn TelemetrySource>,
    tx: Sender<Envelope>,
    notifier: Notifier,
    state: Arc<Mutex<ChannelState>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
    shutdown: Arc<AtomicBool>,
    listener: Option<TcpListener>,
    client: Option<Client>,
}

impl Worker {
    fn run(&mut self) {
        let mut backoff = self.cfg.bind_retry_initial;
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.current() {
                ChannelState::Unbound | ChannelState::Reconnecting => match self.bind() {
                    Ok(addr) => {
                        log::info!("command channel listening on {}", addr);
                        backoff = self.cfg.bind_retry_initial;
                        self.transition(ChannelState::Listening);
                    }
                    Err(err) => {
                        log::warn!("command channel bind failed, retrying in {:?}: {}", backoff, err);
                        self.sleep_unless_shutdown(backoff);
                        backoff = (backoff * 2).min(self.cfg.bind_retry_max);
                    }
                },
                ChannelState::Listening => {
                    if !self.poll_accept() {
                        std::thread::sleep(ACCEPT_POLL);
                    }
                }
                ChannelState::Connected => {
                    self.poll_accept();
                    self.poll_read();
                }
                ChannelState::Terminated => break,
            }
        }
        self.drop_client();
        self.listener = None;
        self.transition(ChannelState::Terminated);
        log::info!("command channel stopped");
    }

    fn current(&self) -> ChannelState {
        *lock(&self.state)
    }

    fn transition(&self, next: ChannelState) {
        let mut state = lock(&self.state);
        if *state != next {
            log::debug!("command channel {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    fn sleep_unless_shutdown(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while Instant::now() < deadline && !self.shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(ACCEPT_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Bind (or rebind) the listener. Rebinds keep the first bound port.
    fn bind(&mut self) -> Result<SocketAddr> {
        self.listener = None;
        let target = (*lock(&self.local_addr)).unwrap_or(self.configured);
        let listener = TcpListener::bind(target)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        *lock(&self.local_addr) = Some(addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Accept a pending client if there is one. A new client replaces the old.
    fn poll_accept(&mut self) -> bool {
        let Some(listener) = self.listener.as_ref() else {
            self.transition(ChannelState::Reconnecting);
            return false;
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = self.attach(stream, peer) {
                    log::warn!("command channel client {} rejected: {}", peer, err);
                    return false;
                }
                true
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => false,
            Err(err) => {
                log::warn!("command channel accept failed: {}", err);
                self.drop_client();
                self.transition(ChannelState::Reconnecting);
                false
            }
        }
    }

    fn attach(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let writer = stream.try_clone()?;
        if let Some(old) = self.client.take() {
            log::info!("client {} replaced by {}", old.peer, peer);
            let _ = old.stream.shutdown(Shutdown::Both);
        }
        self.notifier.attach(writer);
        self.client = Some(Client {
            stream,
            peer,
            pending: Vec::new(),
            last_traffic: Instant::now(),
        });
        log::info!("command channel client connected: {}", peer);
        self.transition(ChannelState::Connected);
        Ok(())
    }

    fn drop_client(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.stream.shutdown(Shutdown::Both);
        }
        self.notifier.detach();
    }

    fn disconnect(&mut self, reason: &str) {
        if let Some(client) = self.client.as_ref() {
            log::info!("command channel client {} gone: {}", client.peer, reason);
        }
        self.drop_client();
        self.listener = None;
        self.transition(ChannelState::Reconnecting);
    }

    fn poll_read(&mut self) {
        let Some(client) = self.client.as_mut() else {
            self.transition(ChannelState::Reconnecting);
            return;
        };
        let mut buf = [0u8; MAX_MESSAGE_BYTES];
        let (messages, timed_out) = match client.stream.read(&mut buf) {
            Ok(0) => {
                self.disconnect("connection closed");
                return;
            }
            Ok(n) => {
                client.last_traffic = Instant::now();
                client.pending.extend_from_slice(&buf[..n]);
                (take_messages(&mut client.pending, false), false)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                // An unterminated message is complete once the client goes quiet.
                let messages = take_messages(&mut client.pending, true);
                (messages, client.last_traffic.elapsed() >= self.cfg.read_timeout)
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => return,
            Err(err) => {
                self.disconnect(&err.to_string());
                return;
            }
        };
        for message in messages {
            self.dispatch(&message);
        }
        if timed_out {
            let reason = format!("no traffic for {:?}", self.cfg.read_timeout);
            self.disconnect(&reason);
        }
    }

    fn dispatch(&self, message: &str) {
        let Some(command) = parse_line(message) else {
            if !message.trim().is_empty() {
                log::debug!("ignored message: {:?}", message);
            }
            return;
        };
        match command {
            Command::Ping => self.reply_ping(),
            Command::Unsupported(kind) => {
                log::warn!("unsupported order type {:?}", kind);
                self.send(&Notification::Error("wrong msg received".to_string()));
            }
            command => {
                log::info!("command received: {:?}", command);
                let envelope = Envelope {
                    command,
                    received_at: Instant::now(),
                };
                if self.tx.send(envelope).is_err() {
                    log::warn!("command dropped: task loop is gone");
                }
            }
        }
    }

    fn reply_ping(&self) {
        match self.telemetry.joint_telemetry() {
            Ok(telemetry) => self.send(&Notification::Telemetry(joint_records(&telemetry))),
            Err(err) => log::warn!("telemetry unavailable for ping: {}", err),
        }
    }

    fn send(&self, notification: &Notification) {
        if let Err(err) = self.notifier.notify(notification) {
            log::warn!("{:#}", err);
        }
    }
}

/// Split complete messages off `pending`. With `flush`, a trailing partial
/// message is taken as well. Oversized partials are always taken.
fn take_messages(pending: &mut Vec<u8>, flush: bool) -> Vec<String> {
    let mut messages = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        messages.push(String::from_utf8_lossy(&line[..pos]).into_owned());
    }
    if !pending.is_empty() && (flush || pending.len() >= MAX_MESSAGE_BYTES) {
        messages.push(String::from_utf8_lossy(pending).into_owned());
        pending.clear();
    }
    messages
        .into_iter()
        .map(|m| m.trim_end_matches('\r').to_string())
        .collect()
}
