//! The connection driver.
//!
//! One task per client. It owns the live link, the pending requests, the
//! auto-ack queue and every timer, and reacts to three sources in a
//! single `select!` loop: commands from client handles, signals from the
//! link tasks, and timer expiries.
//!
//! Each link attempt gets a new epoch. Signals carry the epoch of the
//! link that produced them, so anything from a torn-down link is ignored.

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, info, trace, warn};

use super::{ClientOptions, Command, LifecycleEvent, Outbound, Ready};
use crate::context::Context;
use crate::correlation::{Correlator, Probe, Resolution, Settle, Waiter};
use crate::error::EnzoError;
use crate::frame::Frame;
use crate::message::MessageType;
use crate::router::Router;
use crate::state::{Backoff, ConnectionState};
use crate::transport::{Connection, Connector};

/// What the link tasks report back.
enum Signal {
    Opened { epoch: u64, connection: Connection },
    OpenFailed { epoch: u64, error: EnzoError },
    Message { epoch: u64, bytes: Bytes },
    Closed { epoch: u64, error: Option<EnzoError> },
}

/// The writer queue and reader task of one open link.
struct Link {
    writer: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
}

type Timer = Option<Pin<Box<Sleep>>>;

pub(crate) struct Driver {
    options: Arc<ClientOptions>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: Outbound,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signals: mpsc::UnboundedReceiver<Signal>,
    router: Arc<Router>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
    shutdown: CancellationToken,

    correlator: Correlator,
    acks: DelayQueue<Context>,
    epoch: u64,
    opening: Option<JoinHandle<()>>,
    link: Option<Link>,
    backoff: Backoff,
    /// Connect deadline while Connecting, retry delay while Reconnecting.
    deadline: Timer,
    heartbeat: Timer,
    /// Token of the outstanding liveness probe.
    probe: Option<String>,
    waiters: Vec<Ready>,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        options: Arc<ClientOptions>,
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<Command>,
        outbound: Outbound,
        router: Arc<Router>,
        state: watch::Sender<ConnectionState>,
        events: broadcast::Sender<LifecycleEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let (signal_tx, signals) = mpsc::unbounded_channel();
        let backoff = Backoff::new(options.backoff.clone());
        Self {
            options,
            connector,
            commands,
            outbound,
            signal_tx,
            signals,
            router,
            state,
            events,
            shutdown,
            correlator: Correlator::new(),
            acks: DelayQueue::new(),
            epoch: 0,
            opening: None,
            link: None,
            backoff,
            deadline: None,
            heartbeat: None,
            probe: None,
            waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(command) = self.commands.recv() => self.on_command(command),
                Some(signal) = self.signals.recv() => self.on_signal(signal),
                Some(token) = poll_fn(|cx| self.correlator.poll_expired(cx)) => {
                    self.on_request_expired(token);
                }
                Some(expired) = poll_fn(|cx| self.acks.poll_expired(cx)) => {
                    self.on_ack_due(expired.into_inner());
                }
                _ = fire(&mut self.deadline) => self.on_deadline(),
                _ = fire(&mut self.heartbeat) => self.on_heartbeat(),
                else => break,
            }
        }

        debug!(address = %self.options.address, "client dropped, stopping driver");
        self.close_link();
        self.teardown(|| EnzoError::ConnectionClosed);
        self.settle_waiters(|| Err(EnzoError::ConnectionClosed));
    }

    // ── Commands ─────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(waiter) => self.connect(waiter),
            Command::Reconnect(waiter) => self.reconnect(waiter),
            Command::Disconnect(done) => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Send { frame, on_settle } => self.send(frame, on_settle),
        }
    }

    fn connect(&mut self, waiter: Option<Ready>) {
        let state = self.current();
        if state.is_connected() {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Ok(()));
            }
            return;
        }
        self.waiters.extend(waiter);
        match state {
            ConnectionState::Connecting => {}
            // Skip the rest of the backoff delay.
            ConnectionState::Reconnecting => self.open(),
            _ => {
                self.backoff.reset();
                self.open();
            }
        }
    }

    fn reconnect(&mut self, waiter: Ready) {
        let was_connected = self.current().is_connected();
        self.close_link();
        self.teardown(|| EnzoError::ConnectionLost);
        if was_connected {
            self.emit(LifecycleEvent::Closed {
                reason: "reconnect requested".into(),
            });
        }
        if !self.current().is_idle() {
            self.set_state(ConnectionState::Disconnected);
        }
        self.waiters.push(waiter);
        self.backoff.reset();
        self.open();
    }

    fn disconnect(&mut self) {
        let was_connected = self.current().is_connected();
        self.close_link();
        let failed = self.teardown(|| EnzoError::ConnectionClosed);
        if failed > 0 {
            debug!(failed, "pending requests failed by disconnect");
        }
        if was_connected {
            self.emit(LifecycleEvent::Closed {
                reason: "closed by user".into(),
            });
        }
        self.set_state(ConnectionState::ClosedByUser);
        self.settle_waiters(|| Err(EnzoError::ConnectionClosed));
        self.backoff.reset();
    }

    fn send(&mut self, frame: Frame, on_settle: Option<Settle>) {
        // Replies and other fire-and-forget frames go out on any attached
        // link, including one still waiting for its handshake Pong.
        let Some(settle) = on_settle else {
            if let Err(e) = self.transmit(&frame) {
                debug!(message_type = %frame.message_type, error = %e, "frame dropped");
            }
            return;
        };

        if !self.current().is_connected() {
            settle(Err(EnzoError::NotConnected));
            return;
        }

        if !frame.message_type.expects_response() {
            let result = self.transmit(&frame);
            settle(Err(result.err().unwrap_or_else(|| {
                EnzoError::Other(format!("{} frames get no reply", frame.message_type))
            })));
            return;
        }

        let token = frame.token();
        let timeout = (!frame.long_running).then(|| self.options.request_timeout());
        if let Err((error, waiter)) = self.correlator.register(token.clone(), timeout, Waiter::Request(settle)) {
            if let Waiter::Request(settle) = waiter {
                settle(Err(error));
            }
            return;
        }
        trace!(%token, key = frame.key().unwrap_or_default(), "request sent");
        if let Err(e) = self.transmit(&frame) {
            self.correlator.resolve(&token, Err(e));
        }
    }

    // ── Link management ──────────────────────────────────────────

    /// Start a connection attempt on a fresh epoch.
    fn open(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        self.deadline = Some(Box::pin(sleep(self.options.connect_timeout())));

        let connector = self.connector.clone();
        let address = self.options.address.clone();
        let signals = self.signal_tx.clone();
        info!(%address, attempt = self.backoff.attempts(), "connecting");
        self.opening = Some(tokio::spawn(async move {
            let signal = match connector.connect(&address).await {
                Ok(connection) => Signal::Opened { epoch, connection },
                Err(error) => Signal::OpenFailed { epoch, error },
            };
            let _ = signals.send(signal);
        }));
    }

    /// Spawn the writer and reader tasks for a freshly opened link.
    fn attach(&mut self, epoch: u64, connection: Connection) {
        let Connection { mut sink, mut stream } = connection;

        let (writer, mut queue) = mpsc::unbounded_channel::<Bytes>();
        let signals = self.signal_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                if let Err(e) = sink.send(message).await {
                    let _ = signals.send(Signal::Closed {
                        epoch,
                        error: Some(e),
                    });
                    return;
                }
            }
            if let Err(e) = sink.close().await {
                debug!(error = %e, "error closing link");
            }
        });

        let signals = self.signal_tx.clone();
        let reader = tokio::spawn(async move {
            let error = loop {
                match stream.recv().await {
                    Some(Ok(bytes)) => {
                        if signals.send(Signal::Message { epoch, bytes }).is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            };
            let _ = signals.send(Signal::Closed { epoch, error });
        });

        self.opening = None;
        self.link = Some(Link { writer, reader });
        self.send_probe(Probe::Handshake, None);
    }

    /// Queue a Close frame so the writer sends it before closing the sink.
    fn close_link(&mut self) {
        if self.link.is_some() {
            if let Err(e) = self.transmit(&Frame::close()) {
                debug!(error = %e, "could not queue close frame");
            }
        }
    }

    /// Drop the link and everything tied to it. Returns the number of
    /// pending requests that were failed.
    fn teardown(&mut self, error: impl Fn() -> EnzoError) -> usize {
        self.epoch += 1;
        if let Some(task) = self.opening.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            // Dropping the writer queue lets the writer flush and close.
            link.reader.abort();
        }
        self.acks.clear();
        self.probe = None;
        self.deadline = None;
        self.heartbeat = None;
        self.correlator.fail_all(error)
    }

    /// The link failed or could not be opened.
    fn on_link_lost(&mut self, error: EnzoError) {
        let was_connected = self.current().is_connected();
        let failed = self.teardown(|| EnzoError::ConnectionLost);
        let reason = error.to_string();
        warn!(%reason, failed, "link lost");
        if was_connected {
            self.emit(LifecycleEvent::Closed {
                reason: reason.clone(),
            });
        }

        if error.is_fatal() || !self.options.always_reconnect {
            self.set_state(ConnectionState::Disconnected);
            self.settle_waiters(|| Err(EnzoError::ConnectFailed(reason.clone())));
            return;
        }

        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        self.set_state(ConnectionState::Reconnecting);
        self.deadline = Some(Box::pin(sleep(delay)));
        info!(attempt, ?delay, "reconnect scheduled");
        self.emit(LifecycleEvent::Reconnecting { attempt, delay });
    }

    fn on_handshake(&mut self) {
        if self.current() != ConnectionState::Connecting {
            return;
        }
        self.deadline = None;
        self.backoff.reset();
        self.set_state(ConnectionState::Connected);
        self.heartbeat = Some(Box::pin(sleep(self.options.heartbeat_interval())));
        self.emit(LifecycleEvent::Connected);
        self.settle_waiters(|| Ok(()));
    }

    // ── Signals ──────────────────────────────────────────────────

    fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Opened { epoch, connection } if epoch == self.epoch => {
                self.attach(epoch, connection);
            }
            Signal::Opened { mut connection, .. } => {
                tokio::spawn(async move {
                    let _ = connection.sink.close().await;
                });
            }
            Signal::OpenFailed { epoch, error } if epoch == self.epoch => {
                self.opening = None;
                self.on_link_lost(error);
            }
            Signal::Message { epoch, bytes } if epoch == self.epoch => self.on_message(bytes),
            Signal::Closed { epoch, error } if epoch == self.epoch => {
                self.on_link_lost(error.unwrap_or(EnzoError::ConnectionLost));
            }
            _ => trace!("stale link signal ignored"),
        }
    }

    fn on_message(&mut self, bytes: Bytes) {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat
                .as_mut()
                .reset(Instant::now() + self.options.heartbeat_interval());
        }

        let frame = match Frame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "dropping malformed frame");
                self.emit(LifecycleEvent::MalformedFrame {
                    reason: e.to_string(),
                });
                return;
            }
        };
        debug!(message_type = %frame.message_type, id = %frame.id, "frame received");

        match frame.message_type {
            MessageType::Back | MessageType::Pong => {
                let token = frame.token();
                let reply = Context::reply(frame, self.outbound.clone());
                match self.correlator.resolve(&token, Ok(reply)) {
                    Resolution::Probe(Probe::Handshake) => self.on_handshake(),
                    Resolution::Probe(Probe::Liveness) => {
                        self.probe = None;
                        trace!("liveness probe answered");
                    }
                    Resolution::Settled => {}
                    Resolution::Unknown => debug!(%token, "reply for unknown request"),
                }
            }
            MessageType::Ping => {
                if let Err(e) = self.transmit(&Frame::pong(frame.id)) {
                    debug!(error = %e, "could not answer ping");
                }
            }
            MessageType::Close => {
                info!("peer sent close");
                self.on_link_lost(EnzoError::ConnectionLost);
            }
            MessageType::Post | MessageType::Plugin => {
                let ctx = Context::incoming(frame, self.outbound.clone());
                if !ctx.is_long_running() {
                    self.acks.insert(ctx.clone(), self.options.auto_ack());
                }
                if !self.router.dispatch(ctx) {
                    debug!("no handler registered for push");
                }
            }
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    fn on_request_expired(&mut self, token: String) {
        match self.correlator.expire(&token) {
            Resolution::Settled => {
                debug!(%token, "request timed out");
                if self.current().is_connected() && self.probe.is_none() {
                    self.send_probe(Probe::Liveness, Some(self.options.ping_timeout()));
                }
            }
            Resolution::Probe(probe) => {
                warn!(?probe, "ping went unanswered");
                self.on_link_lost(EnzoError::Timeout(self.options.ping_timeout()));
            }
            Resolution::Unknown => {}
        }
    }

    fn on_ack_due(&mut self, ctx: Context) {
        if !ctx.claim_reply() {
            return;
        }
        debug!(key = ctx.key(), id = %ctx.id(), "auto-acknowledging");
        if let Err(e) = self.transmit(&ctx.auto_reply()) {
            debug!(error = %e, "could not send auto-ack");
        }
    }

    fn on_deadline(&mut self) {
        self.deadline = None;
        match self.current() {
            ConnectionState::Connecting => {
                warn!(timeout = ?self.options.connect_timeout(), "connect attempt timed out");
                self.on_link_lost(EnzoError::Timeout(self.options.connect_timeout()));
            }
            ConnectionState::Reconnecting => self.open(),
            _ => {}
        }
    }

    fn on_heartbeat(&mut self) {
        self.heartbeat = Some(Box::pin(sleep(self.options.heartbeat_interval())));
        if self.probe.is_none() {
            self.send_probe(Probe::Liveness, Some(self.options.ping_timeout()));
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn send_probe(&mut self, probe: Probe, timeout: Option<Duration>) {
        let frame = Frame::ping();
        let token = frame.token();
        if let Err((e, _)) = self.correlator.register(token.clone(), timeout, Waiter::Probe(probe)) {
            warn!(error = %e, "could not register ping");
            return;
        }
        if probe == Probe::Liveness {
            self.probe = Some(token);
        }
        if let Err(e) = self.transmit(&frame) {
            warn!(error = %e, "could not send ping");
        }
    }

    fn transmit(&self, frame: &Frame) -> Result<(), EnzoError> {
        let link = self.link.as_ref().ok_or(EnzoError::NotConnected)?;
        let bytes = frame.encode()?;
        trace!(message_type = %frame.message_type, len = bytes.len(), "frame queued");
        link.writer.send(bytes)?;
        Ok(())
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, next: ConnectionState) {
        let mut state = self.current();
        if state == next {
            return;
        }
        let previous = state;
        if let Err(e) = state.transition(next) {
            warn!(error = %e, "forcing state change");
        }
        info!(from = %previous, to = %next, "connection state changed");
        self.state.send_replace(next);
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn settle_waiters(&mut self, result: impl Fn() -> Result<(), EnzoError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result());
        }
    }
}

/// Wait for an optional timer; never completes when it is unset.
async fn fire(timer: &mut Timer) {
    match timer {
        Some(delay) => delay.as_mut().await,
        None => std::future::pending().await,
    }
}
