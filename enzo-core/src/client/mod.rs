//! The public client handle.
//!
//! A `Client` is a cheap, cloneable handle onto one driver task. Every
//! call is turned into a [`Command`] and queued to the driver, which owns
//! the link, the pending requests and all timers. Dropping the last
//! handle stops the driver and closes the link.

mod driver;
mod options;

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::coerce::IntoPayload;
use crate::context::Context;
use crate::correlation::Settle;
use crate::error::EnzoError;
use crate::frame::Frame;
use crate::message::MessageType;
use crate::plugin::{Plugin, PluginHost};
use crate::router::{HandlerId, Router};
use crate::state::ConnectionState;
use crate::transport::{Connector, DefaultConnector};

pub use options::ClientOptions;

use driver::Driver;

/// Capacity of the lifecycle event channel; slow subscribers lag.
const EVENT_CAPACITY: usize = 64;

// ── Lifecycle events ─────────────────────────────────────────────

/// Notifications about the connection, delivered by [`Client::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The handshake on a new link completed.
    Connected,
    /// An established link went away.
    Closed { reason: String },
    /// A retry is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// An inbound message could not be decoded and was dropped.
    MalformedFrame { reason: String },
}

// ── Commands ─────────────────────────────────────────────────────

type Ready = oneshot::Sender<Result<(), EnzoError>>;

pub(crate) enum Command {
    Connect(Option<Ready>),
    Reconnect(Ready),
    Disconnect(oneshot::Sender<()>),
    Send {
        frame: Frame,
        on_settle: Option<Settle>,
    },
}

/// Queues frames to the driver. Held by contexts and plugin hosts.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    commands: mpsc::UnboundedSender<Command>,
}

impl Outbound {
    /// An outbound handle whose commands land in the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    fn command(&self, command: Command) -> Result<(), EnzoError> {
        self.commands
            .send(command)
            .map_err(|_| EnzoError::ChannelClosed)
    }

    pub(crate) fn send(&self, frame: Frame, on_settle: Option<Settle>) -> Result<(), EnzoError> {
        self.command(Command::Send { frame, on_settle })
    }

    /// Send `frame` and wait for whatever settles it.
    pub(crate) async fn request(&self, frame: Frame) -> Result<Context, EnzoError> {
        let (tx, rx) = oneshot::channel();
        let settle: Settle = Box::new(move |result| {
            let _ = tx.send(result);
        });
        self.send(frame, Some(settle))?;
        rx.await?
    }
}

// ── Client ───────────────────────────────────────────────────────

/// Handle onto a protocol client. Clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    options: Arc<ClientOptions>,
    outbound: Outbound,
    router: Arc<Router>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
    plugins: Mutex<HashSet<String>>,
    _shutdown: DropGuard,
}

impl Client {
    /// Create a client using the transport picked from the address scheme.
    ///
    /// Must be called inside a Tokio runtime. With `auto_connect` set the
    /// first connection attempt starts immediately.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_connector(options, DefaultConnector)
    }

    /// Create a client on a custom transport.
    pub fn with_connector(options: ClientOptions, connector: impl Connector) -> Self {
        let options = Arc::new(options);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let outbound = Outbound { commands };
        let router = Arc::new(Router::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shutdown = CancellationToken::new();

        let driver = Driver::new(
            options.clone(),
            Arc::new(connector),
            command_rx,
            outbound.clone(),
            router.clone(),
            state_tx,
            events.clone(),
            shutdown.clone(),
        );
        tokio::spawn(driver.run());

        if options.auto_connect {
            // The driver holds its own command sender, so this cannot fail.
            let _ = outbound.command(Command::Connect(None));
        }

        Self {
            inner: Arc::new(Inner {
                options,
                outbound,
                router,
                state: state_rx,
                events,
                plugins: Mutex::new(HashSet::new()),
                _shutdown: shutdown.drop_guard(),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Connect, or wait for the connection in progress.
    ///
    /// Resolves once the handshake completes. Fails if the address is
    /// unusable, if the attempt fails with reconnection disabled, or if
    /// `disconnect` is called first.
    pub async fn connect(&self) -> Result<Client, EnzoError> {
        let (tx, rx) = oneshot::channel();
        self.inner.outbound.command(Command::Connect(Some(tx)))?;
        rx.await??;
        Ok(self.clone())
    }

    /// Close the link and stop reconnecting. Pending requests fail with
    /// [`EnzoError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.outbound.command(Command::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Drop the current link and connect again right away.
    pub async fn reconnect(&self) -> Result<Client, EnzoError> {
        let (tx, rx) = oneshot::channel();
        self.inner.outbound.command(Command::Reconnect(tx))?;
        rx.await??;
        Ok(self.clone())
    }

    pub fn connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    // ── Handlers ─────────────────────────────────────────────────

    /// Register a handler for pushes with `key`.
    ///
    /// Handlers for one message run in registration order. A handler that
    /// does not call [`Context::write`] within the auto-ack window gets
    /// an empty reply sent on its behalf.
    pub fn on<F, Fut>(&self, key: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.router.on(key, handler)
    }

    pub fn off(&self, key: &str, id: HandlerId) -> bool {
        self.inner.router.off(key, id)
    }

    pub fn remove_all_handlers(&self) {
        self.inner.router.clear();
    }

    // ── Traffic ──────────────────────────────────────────────────

    /// Send a request and wait for its reply, up to the request timeout.
    pub async fn emit(&self, key: &str, data: impl IntoPayload) -> Result<Context, EnzoError> {
        let frame = Frame::post(key, data.into_payload()?);
        self.inner.outbound.request(frame).await
    }

    /// Send a request that has no deadline.
    pub async fn emit_long_running(
        &self,
        key: &str,
        data: impl IntoPayload,
    ) -> Result<Context, EnzoError> {
        let frame = Frame::post(key, data.into_payload()?).with_long_running(true);
        self.inner.outbound.request(frame).await
    }

    /// Queue a prebuilt frame.
    ///
    /// `on_settle` is called exactly once: with the reply for Post, Plugin
    /// and Ping frames, or with an error for frames that get no reply.
    pub fn write(&self, frame: Frame, on_settle: Option<Settle>) -> Result<(), EnzoError> {
        self.inner.outbound.send(frame, on_settle)
    }

    // ── Plugins ──────────────────────────────────────────────────

    /// Install `plugin` once; a second plugin with the same name is refused.
    pub fn install<P: Plugin + ?Sized>(&self, plugin: &mut P) -> Result<(), EnzoError> {
        let name = plugin.name().to_string();
        {
            let mut plugins = self
                .inner
                .plugins
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if !plugins.insert(name.clone()) {
                return Err(EnzoError::PluginAlreadyInstalled(name));
            }
        }
        tracing::debug!(plugin = %name, "installing plugin");
        let host = PluginHost::new(
            name,
            self.inner.outbound.clone(),
            self.inner.router.clone(),
            MessageType::Plugin,
        );
        plugin.install(host, MessageType::Plugin);
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.inner.options.address)
            .field("state", &self.state())
            .finish()
    }
}
