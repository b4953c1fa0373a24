//! A [Socket] wraps a connected byte stream and turns it into a callback-driven, tagged-operation
//!  API:
//!
//! * Application code installs read operations ('give me the next 12 bytes', 'give me the next
//!   line'), each with a tag. When enough data arrived to satisfy an operation, its content is
//!   delivered to the [SocketDelegate] together with the tag.
//! * Writes are appended to a write queue and flushed by the socket as the transport accepts
//!   data, preserving order across partial writes.
//! * Failures are reported to the delegate as an [Info] in [SOCKET_INFO_DOMAIN], after which the
//!   socket closes.
//!
//! The `Socket` itself is a cheap handle. All I/O and all delegate callbacks happen in a single
//!  tokio task per socket that owns the transport and all buffers, and handles talk to that task
//!  through a command channel. So a socket is never accessed concurrently, and callbacks for a
//!  socket are strictly sequential.
//!
//! Dropping the last handle closes the socket like [Socket::stop].

use std::fmt::{Debug, Formatter};
use std::io;
use std::io::ErrorKind;
use std::sync::{Arc, Weak};
use bytes::{Buf, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tracing::{debug, span, trace, warn, Instrument, Level};

use crate::buffers::byte_buffer::ByteBuffer;
use crate::config::SocketConfig;
use crate::info::Info;
use crate::read_operation::{OperationContent, OperationKind, PendingOperation, ReadMode};
use crate::socket_delegate::SocketDelegate;
use crate::socket_transport::SocketTransport;

pub const SOCKET_INFO_DOMAIN: &str = "SocketInfoDomain";

/// The `code` of socket [Info] records
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum SocketErrorCode {
    /// the peer closed the connection
    ReadClosed = 0,
    Read = 1,
    /// more data is buffered (or requested) than the configured maximum read size
    ReadFull = 2,
    /// the transport accepted no more data
    WriteClosed = 3,
    Write = 4,
    Connect = 5,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SocketState {
    Connecting,
    Open,
    /// shutdown was initiated, either by a call to `stop()` or because of an error
    Closing,
    /// terminal - buffers are released, and nothing is delivered any more
    Closed,
}

impl SocketState {
    fn is_active(&self) -> bool {
        matches!(self, SocketState::Connecting | SocketState::Open)
    }
}

enum Command {
    Send(ByteBuffer),
    SetGlobalOperation(PendingOperation),
    RemoveGlobalOperation,
    ScheduleOperation(PendingOperation),
    SetDelegate(Option<Weak<dyn SocketDelegate>>),
    /// NB: the state is changed by the handle, this is only a wake-up call for the driver
    Stop,
}

#[derive(Clone)]
pub struct Socket {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<watch::Sender<SocketState>>,
}

impl Debug for Socket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state())
            .finish()
    }
}

impl Socket {
    /// Starts connecting to a TCP peer in the background and returns immediately with a socket
    ///  in `Connecting` state. Writes and read operations can be issued right away, they take
    ///  effect once the connection is established.
    ///
    /// A failure to connect is reported to the delegate with [SocketErrorCode::Connect].
    ///
    /// This must be called from inside a tokio runtime.
    pub fn connect(host: impl Into<String>, port: u16, config: Arc<SocketConfig>, delegate: Option<Weak<dyn SocketDelegate>>) -> anyhow::Result<Socket> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let host = host.into();
        let span = span!(Level::DEBUG, "socket", peer = %format!("{}:{}", host, port));

        let (socket, mut driver) = SocketDriver::new(SocketState::Connecting, config, delegate);
        runtime.spawn(async move {
            if let Some(stream) = driver.connect(&host, port).await {
                driver.run(stream).await;
            }
        }.instrument(span));
        Ok(socket)
    }

    /// Wraps an already connected TCP stream, e.g. one returned by a `TcpListener`
    pub fn from_stream(stream: TcpStream, config: Arc<SocketConfig>, delegate: Option<Weak<dyn SocketDelegate>>) -> anyhow::Result<Socket> {
        Self::from_transport(stream, config, delegate)
    }

    pub fn from_transport<T: SocketTransport>(transport: T, config: Arc<SocketConfig>, delegate: Option<Weak<dyn SocketDelegate>>) -> anyhow::Result<Socket> {
        config.validate()?;
        let runtime = Handle::try_current()?;

        let span = span!(Level::DEBUG, "socket", peer = %transport.peer_description());

        let (socket, driver) = SocketDriver::new(SocketState::Open, config, delegate);
        runtime.spawn(driver.run(transport).instrument(span));
        Ok(socket)
    }

    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    /// Completes when the socket reached `Closed` state
    pub async fn closed(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver.wait_for(|s| *s == SocketState::Closed).await;
    }

    /// Copies `data` to the write queue. Returns `false` if the socket is closing or closed,
    ///  in which case the data is discarded.
    pub fn send_bytes(&self, data: &[u8]) -> bool {
        self.send_buffer(data.into())
    }

    /// Appends `data` to the write queue without copying.
    pub fn send(&self, data: Bytes) -> bool {
        self.send_buffer(data.into())
    }

    /// Appends the entire contents of a buffer to the write queue.
    pub fn send_buffer(&self, buffer: ByteBuffer) -> bool {
        if buffer.is_empty() {
            return self.state().is_active();
        }
        self.post(Command::Send(buffer))
    }

    /// Installs a read operation that stays in place after it is satisfied, replacing a previous
    ///  global operation. If one-shot operations are scheduled, they take precedence and the
    ///  global operation takes over when they are all satisfied.
    pub fn set_global_operation(&self, kind: OperationKind, tag: u64) {
        if Self::is_valid(kind) {
            self.post(Command::SetGlobalOperation(PendingOperation { kind, tag }));
        }
    }

    pub fn remove_global_operation(&self) {
        self.post(Command::RemoveGlobalOperation);
    }

    /// Appends a one-shot read operation. One-shot operations are satisfied in the order they
    ///  were scheduled.
    pub fn schedule_operation(&self, kind: OperationKind, tag: u64) {
        if Self::is_valid(kind) {
            self.post(Command::ScheduleOperation(PendingOperation { kind, tag }));
        }
    }

    pub fn set_delegate(&self, delegate: Option<Weak<dyn SocketDelegate>>) {
        self.post(Command::SetDelegate(delegate));
    }

    /// Initiates an orderly shutdown: The socket goes to `Closing` state immediately, and to
    ///  `Closed` once the I/O task released the transport. Pending writes are discarded, and no
    ///  error is reported for an explicit stop.
    ///
    /// Calling this more than once, or on a socket that is closed already, has no effect.
    pub fn stop(&self) {
        let was_active = self.state.send_if_modified(|s| {
            if s.is_active() {
                *s = SocketState::Closing;
                true
            }
            else {
                false
            }
        });

        if was_active {
            debug!("stopping socket");
            let _ = self.commands.send(Command::Stop);
        }
    }

    fn is_valid(kind: OperationKind) -> bool {
        if kind == OperationKind::Data(0) {
            warn!("ignoring read operation for 0 bytes");
            return false;
        }
        true
    }

    fn post(&self, command: Command) -> bool {
        if !self.state().is_active() {
            trace!("socket is closing or closed - ignoring call");
            return false;
        }
        self.commands.send(command).is_ok()
    }
}


struct SocketFailure {
    code: SocketErrorCode,
    cause: Option<io::Error>,
}
impl SocketFailure {
    fn new(code: SocketErrorCode, cause: Option<io::Error>) -> SocketFailure {
        SocketFailure { code, cause }
    }
}

enum ConnectEvent {
    Connected(io::Result<TcpStream>),
    Command(Option<Command>),
}

enum DriverEvent {
    Command(Option<Command>),
    Readable(io::Result<()>),
    Writable(io::Result<()>),
}

/// owns a socket's transport and buffers, running in the socket's I/O task
struct SocketDriver {
    config: Arc<SocketConfig>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// NB: weak so that dropping all handles closes the socket
    command_sender: mpsc::WeakUnboundedSender<Command>,
    state: Arc<watch::Sender<SocketState>>,
    delegate: Option<Weak<dyn SocketDelegate>>,

    read_buffer: ByteBuffer,
    /// Data is read into this and split off, so consecutive reads share an allocation. Small
    ///  reads are copied by the receive buffer and do not pin it.
    read_area: BytesMut,
    read_mode: ReadMode,
    write_buffer: ByteBuffer,
}

impl SocketDriver {
    fn new(initial_state: SocketState, config: Arc<SocketConfig>, delegate: Option<Weak<dyn SocketDelegate>>) -> (Socket, SocketDriver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(watch::Sender::new(initial_state));

        let driver = SocketDriver {
            config,
            commands: receiver,
            command_sender: sender.downgrade(),
            state: state.clone(),
            delegate,
            read_buffer: ByteBuffer::new(),
            read_area: BytesMut::new(),
            read_mode: ReadMode::default(),
            write_buffer: ByteBuffer::new(),
        };
        let socket = Socket {
            commands: sender,
            state,
        };
        (socket, driver)
    }

    async fn connect(&mut self, host: &str, port: u16) -> Option<TcpStream> {
        debug!("connecting");

        let connect = TcpStream::connect((host, port));
        tokio::pin!(connect);

        loop {
            let event = select! {
                result = &mut connect => ConnectEvent::Connected(result),
                command = self.commands.recv() => ConnectEvent::Command(command),
            };

            match event {
                ConnectEvent::Connected(Ok(stream)) => {
                    let is_open = self.state.send_if_modified(|s| {
                        if *s == SocketState::Connecting {
                            *s = SocketState::Open;
                            true
                        }
                        else {
                            false
                        }
                    });
                    if is_open {
                        return Some(stream);
                    }
                    self.teardown();
                    return None;
                }
                ConnectEvent::Connected(Err(e)) => {
                    // NB: a failed connect goes to `Closed` without passing through `Closing`
                    if !self.is_stopping() {
                        self.report(SocketFailure::new(SocketErrorCode::Connect, Some(e))).await;
                    }
                    self.teardown();
                    return None;
                }
                ConnectEvent::Command(Some(command)) => {
                    self.on_command(command);
                    if self.is_stopping() {
                        self.teardown();
                        return None;
                    }
                }
                ConnectEvent::Command(None) => {
                    debug!("all socket handles were dropped while connecting");
                    self.teardown();
                    return None;
                }
            }
        }
    }

    async fn run<T: SocketTransport>(mut self, transport: T) {
        debug!("socket open");

        // operations may have been installed while connecting
        let mut result = self.process_read_buffer().await;

        while result.is_ok() && !self.is_stopping() {
            let has_pending_writes = !self.write_buffer.is_empty();

            let event = select! {
                biased;
                command = self.commands.recv() => DriverEvent::Command(command),
                // NB: writes go before reads, a peer that sends continuously must not stall the write queue
                r = transport.writable(), if has_pending_writes => DriverEvent::Writable(r),
                r = transport.readable() => DriverEvent::Readable(r),
            };

            result = match event {
                DriverEvent::Command(Some(command)) => {
                    if self.on_command(command) {
                        self.process_read_buffer().await
                    }
                    else {
                        Ok(())
                    }
                }
                DriverEvent::Command(None) => {
                    debug!("all socket handles were dropped - closing");
                    break;
                }
                DriverEvent::Readable(Ok(())) => self.on_readable(&transport).await,
                DriverEvent::Readable(Err(e)) => Err(SocketFailure::new(SocketErrorCode::Read, Some(e))),
                DriverEvent::Writable(Ok(())) => self.on_writable(&transport).await,
                DriverEvent::Writable(Err(e)) => Err(SocketFailure::new(SocketErrorCode::Write, Some(e))),
            };
        }

        if let Err(failure) = result {
            if !self.is_stopping() {
                self.state.send_replace(SocketState::Closing);
                self.report(failure).await;
            }
        }
        self.teardown();
        drop(transport);
    }

    /// returns `true` if the read configuration changed
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Send(buffer) => {
                trace!("enqueueing {} bytes for sending", buffer.len());
                self.write_buffer.append_buffer(buffer);
                false
            }
            Command::SetGlobalOperation(op) => {
                self.read_mode.set_global(op);
                true
            }
            Command::RemoveGlobalOperation => {
                self.read_mode.remove_global();
                true
            }
            Command::ScheduleOperation(op) => {
                self.read_mode.schedule(op);
                true
            }
            Command::SetDelegate(delegate) => {
                self.delegate = delegate;
                false
            }
            Command::Stop => false,
        }
    }

    async fn on_readable(&mut self, transport: &impl SocketTransport) -> Result<(), SocketFailure> {
        let mut is_end_of_stream = false;
        let mut read_error = None;

        while self.read_buffer.len() <= self.config.max_read_size {
            if self.read_area.is_empty() {
                self.read_area = BytesMut::zeroed(self.config.read_chunk_size);
            }
            match transport.try_read(&mut self.read_area) {
                Ok(0) => {
                    is_end_of_stream = true;
                    break;
                }
                Ok(n) => {
                    trace!("read {} bytes", n);
                    let data = self.read_area.split_to(n).freeze();
                    self.read_buffer.append_back_compacting(data);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }

        // data that arrived before the stream ended or failed is still delivered
        self.process_read_buffer().await?;

        if let Some(e) = read_error {
            return Err(SocketFailure::new(SocketErrorCode::Read, Some(e)));
        }
        if is_end_of_stream {
            return Err(SocketFailure::new(SocketErrorCode::ReadClosed, None));
        }
        Ok(())
    }

    /// delivers buffered data for as long as it satisfies the current operation
    async fn process_read_buffer(&mut self) -> Result<(), SocketFailure> {
        while !self.is_stopping() {
            let Some(op) = self.read_mode.current() else {
                break;
            };

            let content = match op.kind {
                OperationKind::Data(size) => {
                    if size > self.config.max_read_size {
                        warn!("read operation for {} bytes exceeds the maximum read size of {}", size, self.config.max_read_size);
                        return Err(SocketFailure::new(SocketErrorCode::ReadFull, None));
                    }
                    if self.read_buffer.len() < size {
                        break;
                    }
                    OperationContent::Data(self.read_buffer.split_front(size))
                }
                OperationKind::Line => {
                    match self.read_buffer.find_and_slice_up_to(&self.config.line_terminator, false) {
                        Some(line) => OperationContent::Line(line),
                        None => break,
                    }
                }
            };

            self.read_mode.on_delivered();
            self.deliver(op.tag, content).await;
        }

        if !self.is_stopping() && self.read_buffer.len() > self.config.max_read_size {
            warn!("{} bytes in the receive buffer without satisfying a read operation", self.read_buffer.len());
            return Err(SocketFailure::new(SocketErrorCode::ReadFull, None));
        }
        Ok(())
    }

    async fn deliver(&mut self, tag: u64, content: OperationContent) {
        match (self.delegate(), self.handle()) {
            (Some(delegate), Some(socket)) => {
                trace!("operation {} satisfied with {} bytes", tag, content.bytes().len());
                delegate.operation_available(&socket, tag, content).await;
            }
            _ => debug!("no delegate - discarding content for operation {}", tag),
        }
    }

    async fn on_writable(&mut self, transport: &impl SocketTransport) -> Result<(), SocketFailure> {
        if let (Some(delegate), Some(socket)) = (self.delegate(), self.handle()) {
            delegate.run_pending_write(&socket).await;

            // apply what the delegate did before flushing
            while let Ok(command) = self.commands.try_recv() {
                if self.on_command(command) {
                    self.process_read_buffer().await?;
                }
            }
            if self.is_stopping() {
                return Ok(());
            }
        }

        while !self.write_buffer.is_empty() {
            match transport.try_write(self.write_buffer.chunk()) {
                Ok(0) => return Err(SocketFailure::new(SocketErrorCode::WriteClosed, None)),
                Ok(n) => {
                    trace!("wrote {} bytes", n);
                    self.write_buffer.advance(n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SocketFailure::new(SocketErrorCode::Write, Some(e))),
            }
        }
        Ok(())
    }

    async fn report(&mut self, failure: SocketFailure) {
        let mut info = Info::error(SOCKET_INFO_DOMAIN, failure.code);
        if let Some(cause) = &failure.cause {
            info = info.with_context(cause.to_string());
        }

        match failure.code {
            SocketErrorCode::ReadClosed => debug!("peer closed the connection"),
            _ => warn!("socket failed: {}", info),
        }

        if let (Some(delegate), Some(socket)) = (self.delegate(), self.handle()) {
            delegate.error(&socket, info).await;
        }
    }

    fn teardown(&mut self) {
        self.commands.close();
        self.read_mode.clear();
        self.read_buffer.clear();
        self.read_area = BytesMut::new();
        self.write_buffer.clear();
        self.delegate = None;

        self.state.send_replace(SocketState::Closed);
        debug!("socket closed");
    }

    fn is_stopping(&self) -> bool {
        !self.state.borrow().is_active()
    }

    fn delegate(&self) -> Option<Arc<dyn SocketDelegate>> {
        self.delegate.as_ref()
            .and_then(|d| d.upgrade())
    }

    /// a handle to pass to delegate callbacks, `None` if all handles were dropped
    fn handle(&self) -> Option<Socket> {
        self.command_sender.upgrade()
            .map(|commands| Socket {
                commands,
                state: self.state.clone(),
            })
    }
}
