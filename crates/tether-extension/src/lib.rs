//! # tether-extension
//!
//! The extension runtime: connects to the proxy host's control channel,
//! answers the control protocol, and drives intercepted game packets
//! through registered handlers.
//!
//! A single reader task consumes host frames in arrival order and
//! dispatches each intercept serially through the global pre-handlers and
//! the per-header handler lists. Spontaneous sends from any task are
//! funneled through one writer task, so frames never interleave.
//!
//! ## Example
//!
//! ```no_run
//! use tether_extension::{ExtInfo, Extension};
//! use tether_protocol::{Direction, Identifier};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ext = Extension::new(ExtInfo {
//!         title: "Example".into(),
//!         author: "tether".into(),
//!         version: "1.0".into(),
//!         description: "logs chat".into(),
//!         ..Default::default()
//!     });
//!
//!     ext.intercept([Identifier::new(Direction::Out, "Chat")])
//!         .with(|e| {
//!             e.packet.skip::<i32>()?;
//!             println!("chat: {}", e.packet.read_string()?);
//!             Ok(())
//!         })
//!         .unwrap();
//!
//!     if let Err(err) = ext.run().await {
//!         eprintln!("{err}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod args;
mod dispatch;
pub mod error;
pub mod events;
pub mod intercept;
pub mod recv;

use std::io::ErrorKind;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use tether_protocol::frame::{self, ext as ext_op, host as host_op, InterceptMeta};
use tether_protocol::{
    ClientInfo, ClientType, Compose, Direction, Header, Headers, Identifier, MsgInfo, Packet,
    Result as ProtocolResult,
};

pub use args::ExtArgs;
pub use error::{ExtError, Result};
pub use events::Event;
pub use intercept::{HandlerResult, Intercept, InterceptBuilder, InterceptRef};
pub use recv::{Recv, RecvHandle};

use dispatch::Tables;
use intercept::GlobalRegistration;

/// Information the extension reports to the host.
#[derive(Debug, Clone, Default)]
pub struct ExtInfo {
    pub title: String,
    pub author: String,
    pub version: String,
    pub description: String,
    pub show_event_button: bool,
    pub is_installed: bool,
    pub filename: String,
    pub cookie: String,
    pub show_leave: bool,
    pub show_delete: bool,
}

impl Compose for ExtInfo {
    fn compose(&self, p: &mut Packet) -> ProtocolResult<()> {
        p.write(&self.title)?
            .write(&self.author)?
            .write(&self.version)?
            .write(&self.description)?
            .write(&self.show_event_button)?
            .write(&self.is_installed)?
            .write(&self.filename)?
            .write(&self.cookie)?
            .write(&self.show_leave)?
            .write(&self.show_delete)?;
        Ok(())
    }
}

/// Arguments of the initialization event.
#[derive(Debug, Clone, Copy)]
pub struct InitArgs {
    /// Whether a game connection was already active when the extension
    /// attached.
    pub connected: bool,
}

/// A connection-scoped cancellation signal, fired when the game
/// connection ends.
#[derive(Debug, Clone)]
pub struct ConnectionToken {
    rx: watch::Receiver<bool>,
}

impl ConnectionToken {
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the connection ends.
    pub async fn closed(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Arguments of the connection-established event.
#[derive(Clone)]
pub struct ConnectArgs {
    pub host: String,
    pub port: i32,
    pub client: ClientInfo,
    pub messages: Vec<MsgInfo>,
    pub token: ConnectionToken,
}

#[derive(Default)]
struct ConnState {
    is_connected: bool,
    packet_info: bool,
    client: ClientInfo,
    remote_host: String,
    remote_port: i32,
    token_tx: Option<watch::Sender<bool>>,
    token_rx: Option<watch::Receiver<bool>>,
}

pub(crate) struct Core {
    info: Mutex<ExtInfo>,
    pub(crate) headers: Arc<RwLock<Headers>>,
    conn: RwLock<ConnState>,
    write_tx: Mutex<Option<mpsc::UnboundedSender<Packet>>>,

    initialized: Event<InitArgs>,
    activated: Event<()>,
    connected: Event<ConnectArgs>,
    disconnected: Event<()>,

    pub(crate) globals: Mutex<Vec<Arc<GlobalRegistration>>>,
    pub(crate) tables: Mutex<Tables>,
}

/// An extension attached to the proxy host.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Extension {
    core: Arc<Core>,
}

impl Extension {
    /// Creates a new extension with the provided info.
    pub fn new(info: ExtInfo) -> Self {
        Self {
            core: Arc::new(Core {
                info: Mutex::new(info),
                headers: Arc::new(RwLock::new(Headers::new())),
                conn: RwLock::new(ConnState::default()),
                write_tx: Mutex::new(None),
                initialized: Event::new(),
                activated: Event::new(),
                connected: Event::new(),
                disconnected: Event::new(),
                globals: Mutex::new(Vec::new()),
                tables: Mutex::new(Tables::default()),
            }),
        }
    }

    pub(crate) fn core(&self) -> &Core {
        &self.core
    }

    /* state */

    /// Whether a game connection is currently active.
    pub fn is_connected(&self) -> bool {
        self.core.conn.read().is_connected
    }

    /// Info about the game client behind the current connection.
    pub fn client(&self) -> ClientInfo {
        self.core.conn.read().client.clone()
    }

    /// The remote host of the game server.
    pub fn remote_host(&self) -> String {
        self.core.conn.read().remote_host.clone()
    }

    /// The remote port of the game server.
    pub fn remote_port(&self) -> i32 {
        self.core.conn.read().remote_port
    }

    /// The header registry for the current connection.
    pub fn headers(&self) -> Arc<RwLock<Headers>> {
        Arc::clone(&self.core.headers)
    }

    /// Resolves an identifier against the current connection's registry.
    pub fn resolve(&self, identifier: &Identifier) -> Result<Header> {
        self.core.resolve(identifier)
    }

    /// The cancellation token of the current connection, if any.
    pub fn connection_token(&self) -> Option<ConnectionToken> {
        self.core
            .conn
            .read()
            .token_rx
            .clone()
            .map(|rx| ConnectionToken { rx })
    }

    /* lifecycle events */

    /// Registers a handler invoked when the host initializes the
    /// extension.
    pub fn on_initialized(&self, handler: impl Fn(&InitArgs) + Send + Sync + 'static) {
        self.core.initialized.register(handler);
    }

    /// Registers a handler invoked when the user activates the extension.
    pub fn on_activated(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.core.activated.register(move |_: &()| handler());
    }

    /// Registers a handler invoked when a game connection is established.
    pub fn on_connected(&self, handler: impl Fn(&ConnectArgs) + Send + Sync + 'static) {
        self.core.connected.register(handler);
    }

    /// Registers a handler invoked when the game connection is lost.
    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.core.disconnected.register(move |_: &()| handler());
    }

    /* intercepts */

    /// Configures an intercept registration for the given identifiers.
    pub fn intercept(&self, identifiers: impl IntoIterator<Item = Identifier>) -> InterceptBuilder {
        InterceptBuilder {
            ext: self.clone(),
            identifiers: identifiers.into_iter().collect(),
            transient: false,
        }
    }

    /// Registers a handler invoked for every intercepted packet, before
    /// any per-header handlers.
    pub fn intercept_all(
        &self,
        handler: impl Fn(&mut Intercept) -> HandlerResult + Send + Sync + 'static,
    ) {
        self.core.add_global(Arc::new(handler));
    }

    /// Configures an inline receiver for the given identifiers.
    pub fn recv(&self, identifiers: impl IntoIterator<Item = Identifier>) -> Recv {
        Recv::new(self.clone(), identifiers.into_iter().collect())
    }

    /* sending */

    /// Builds a packet for the given identifier and writes `values` to it.
    pub fn new_packet<T: Compose + ?Sized>(
        &self,
        identifier: Identifier,
        values: &T,
    ) -> Result<Packet> {
        let header = self.core.resolve(&identifier)?;
        let client = self.core.conn.read().client.client_type;
        let mut packet = Packet::new(client, header);
        packet.write(values)?;
        Ok(packet)
    }

    /// Sends a message to the client or server, based on the identifier's
    /// direction.
    pub fn send<T: Compose + ?Sized>(&self, identifier: Identifier, values: &T) -> Result<()> {
        let packet = self.new_packet(identifier, values)?;
        self.send_packet(packet)
    }

    /// Sends a packet to the client or server, based on its header
    /// direction.
    pub fn send_packet(&self, packet: Packet) -> Result<()> {
        match packet.header.dir {
            Direction::In | Direction::Out => {}
            Direction::Unknown => return Err(ExtError::MissingDirection),
        }
        self.core.send_raw(frame::wrap_packet(&packet)?)
    }

    /// Writes a line to the host's extension console.
    pub fn console_log(&self, message: impl AsRef<str>) -> Result<()> {
        let title = self.core.info.lock().title.clone();
        let mut packet = Packet::new(
            ClientType::Unknown,
            Header::new(Direction::Out, ext_op::CONSOLE_LOG),
        );
        packet.write_string(&format!("{} --> {}", title, message.as_ref()))?;
        self.core.send_raw(packet)
    }

    /* processing loop */

    /// Connects to the host using the process arguments (`-p`, `-c`,
    /// `-f`) and runs the processing loop until the host closes the
    /// channel.
    pub async fn run(&self) -> Result<()> {
        let ext_args = ExtArgs::from_env()?;
        {
            let mut info = self.core.info.lock();
            if let Some(cookie) = &ext_args.cookie {
                info.cookie = cookie.clone();
            }
            if let Some(filename) = &ext_args.filename {
                info.filename = filename.clone();
                info.is_installed = true;
                info.show_delete = true;
            }
            info.show_leave = true;
        }
        tracing::debug!(host = %ext_args.host, port = ext_args.port, "connecting to host");
        let stream = TcpStream::connect((ext_args.host.as_str(), ext_args.port)).await?;
        self.run_with(stream).await
    }

    /// Runs the processing loop over an established control-channel
    /// stream. Returns `Ok` when the host closes the channel.
    pub async fn run_with<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        {
            let mut info = self.core.info.lock();
            info.show_event_button = self.core.activated.has_handlers();
        }

        let (mut reader, mut writer) = tokio::io::split(stream);

        let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();
        {
            let mut guard = self.core.write_tx.lock();
            if guard.is_some() {
                return Err(ExtError::AlreadyRunning);
            }
            *guard = Some(tx);
        }
        let writer_task = tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                let frame = frame::encode_frame(packet.header.value, packet.data());
                if let Err(err) = writer.write_all(&frame).await {
                    tracing::error!(error = %err, "control channel write failed");
                    break;
                }
            }
        });

        let result = self.read_loop(&mut reader).await;

        // Dropping the sender lets the writer drain queued frames and
        // exit.
        *self.core.write_tx.lock() = None;
        let _ = writer_task.await;
        result
    }

    async fn read_loop<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<()> {
        let mut len_buf = [0u8; 4];
        loop {
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                // Host closed the channel; normal termination.
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
                Err(err) => return Err(err.into()),
            }
            let frame_len = u32::from_be_bytes(len_buf);
            if frame_len < 2 || frame_len as usize > frame::READ_BUFFER_SIZE {
                return Err(tether_protocol::ProtocolError::InvalidFrameLength(frame_len).into());
            }

            let mut buf = vec![0u8; frame_len as usize];
            reader.read_exact(&mut buf).await?;
            let header = u16::from_be_bytes([buf[0], buf[1]]);
            let payload = buf.split_off(2);

            match header {
                host_op::INFO_REQUEST => self.handle_info_request()?,
                host_op::INIT => self.handle_init(payload)?,
                host_op::ACTIVATED => {
                    tracing::debug!("extension activated");
                    self.core.activated.dispatch(&());
                }
                host_op::CONNECTION_START => self.handle_connection_start(payload)?,
                host_op::CONNECTION_END => self.handle_connection_end(),
                host_op::INTERCEPT => {
                    if let Err(err) = self.handle_intercept(payload) {
                        match err {
                            // Handler failures are contained; the loop
                            // survives.
                            ExtError::Handler(_) => {
                                tracing::error!(error = %err, "intercept handler failed")
                            }
                            other => return Err(other),
                        }
                    }
                }
                host_op::FLAGS_CHECK => {}
                other => tracing::debug!(header = other, "ignoring unknown control frame"),
            }
        }
    }

    fn handle_info_request(&self) -> Result<()> {
        let info = self.core.info.lock().clone();
        tracing::debug!(title = %info.title, "extension info requested");
        let mut packet = Packet::new(ClientType::Unknown, Header::new(Direction::Out, ext_op::INFO));
        packet.write(&info)?;
        self.core.send_raw(packet)
    }

    fn handle_init(&self, payload: Vec<u8>) -> Result<()> {
        let mut packet =
            Packet::with_data(ClientType::Unknown, Header::new(Direction::In, 0), payload);
        let connected = if packet.is_empty() {
            false
        } else {
            packet.read_bool()?
        };
        tracing::debug!(connected, "extension initialized");
        self.core.initialized.dispatch(&InitArgs { connected });
        Ok(())
    }

    fn handle_connection_start(&self, payload: Vec<u8>) -> Result<()> {
        let mut packet =
            Packet::with_data(ClientType::Unknown, Header::new(Direction::In, 0), payload);
        let host: String = packet.read()?;
        let port: i32 = packet.read()?;
        let client: ClientInfo = packet.read()?;
        let messages: Vec<MsgInfo> = packet.read()?;

        tracing::debug!(
            host = %host,
            port,
            client = %client.client_type,
            messages = messages.len(),
            "game connection established"
        );

        {
            let mut headers = self.core.headers.write();
            headers.clear();
            headers.populate(&messages);
        }

        let (token_tx, token_rx) = watch::channel(false);
        {
            let mut conn = self.core.conn.write();
            conn.is_connected = true;
            conn.packet_info = true;
            conn.remote_host = host.clone();
            conn.remote_port = port;
            conn.client = client.clone();
            conn.token_tx = Some(token_tx);
            conn.token_rx = Some(token_rx.clone());
        }

        self.core.flush_registrations()?;

        self.core.connected.dispatch(&ConnectArgs {
            host,
            port,
            client,
            messages,
            token: ConnectionToken { rx: token_rx },
        });
        Ok(())
    }

    fn handle_connection_end(&self) {
        {
            let mut conn = self.core.conn.write();
            conn.is_connected = false;
            conn.packet_info = false;
            if let Some(token_tx) = conn.token_tx.take() {
                let _ = token_tx.send(true);
            }
            conn.token_rx = None;
        }
        self.core.clear_bindings();
        self.core.headers.write().clear();

        tracing::debug!("game connection ended");
        self.core.disconnected.dispatch(&());
    }

    fn handle_intercept(&self, mut payload: Vec<u8>) -> Result<()> {
        let client = self.core.conn.read().client.client_type;
        let meta = InterceptMeta::parse(&payload, client)?;
        let packet = meta.packet_from(&payload);

        let pre_header = packet.header;
        let pre_len = packet.len();
        let pre_crc = if !meta.modified {
            crc32fast::hash(packet.data())
        } else {
            0
        };

        let mut intercept = Intercept::new(
            packet,
            meta.dir,
            meta.sequence,
            meta.blocked,
            Arc::clone(&self.core.headers),
        );

        let mut handler_err = None;
        match self.core.dispatch_globals(&mut intercept) {
            Ok(()) => {
                if let Err(err) = self.core.dispatch_per_header(&mut intercept) {
                    handler_err = Some(err);
                }
            }
            Err(err) => handler_err = Some(err),
        }

        let mut modified = meta.modified;
        if !modified {
            modified = pre_header != intercept.packet.header
                || pre_len != intercept.packet.len()
                || pre_crc != crc32fast::hash(intercept.packet.data());
        }

        meta.reserialize(
            &mut payload,
            &intercept.packet,
            intercept.is_blocked(),
            modified,
        );
        self.core.send_raw(Packet::with_data(
            ClientType::Unknown,
            Header::new(Direction::Out, ext_op::MANIPULATED_PACKET),
            payload,
        ))?;

        match handler_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Core {
    pub(crate) fn send_raw(&self, packet: Packet) -> Result<()> {
        match self.write_tx.lock().as_ref() {
            Some(tx) => tx.send(packet).map_err(|_| ExtError::NotRunning),
            None => Err(ExtError::NotRunning),
        }
    }
}
