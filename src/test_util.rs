use std::cmp::min;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, Weak};
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::info::Info;
use crate::read_operation::OperationContent;
use crate::socket::{Socket, SocketErrorCode};
use crate::socket_delegate::SocketDelegate;
use crate::socket_transport::SocketTransport;

pub enum ReadStep {
    Data(Vec<u8>),
    Eof,
    Error(io::ErrorKind),
}

/// consumed one per `try_write` call; with no step queued, writes are accepted in full
pub enum WriteStep {
    Accept(usize),
    /// blocks writes until [ScriptedTransport::unblock_writes] is called
    WouldBlock,
    Closed,
    Error(io::ErrorKind),
}

#[derive(Default)]
struct ScriptedState {
    reads: VecDeque<ReadStep>,
    writes: VecDeque<WriteStep>,
    is_write_blocked: bool,
    written: Vec<u8>,
    write_calls: Vec<Vec<u8>>,
}

#[derive(Default)]
struct ScriptedShared {
    state: Mutex<ScriptedState>,
    readable: Notify,
    writable: Notify,
    written: Notify,
}

/// An in-memory transport that is fed by the test. Clones share the same state, so a test
///  keeps a clone to feed data after handing the transport to a socket.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<ScriptedShared>,
}

impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        Default::default()
    }

    pub fn push_read(&self, step: ReadStep) {
        self.shared.state.lock().unwrap()
            .reads.push_back(step);
        self.shared.readable.notify_one();
    }

    pub fn push_data(&self, data: &[u8]) {
        self.push_read(ReadStep::Data(data.to_vec()));
    }

    pub fn push_write_step(&self, step: WriteStep) {
        self.shared.state.lock().unwrap()
            .writes.push_back(step);
    }

    pub fn unblock_writes(&self) {
        self.shared.state.lock().unwrap()
            .is_write_blocked = false;
        self.shared.writable.notify_one();
    }

    pub fn written(&self) -> Vec<u8> {
        self.shared.state.lock().unwrap()
            .written.clone()
    }

    /// the buffers passed to successful `try_write` calls
    pub fn write_calls(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().unwrap()
            .write_calls.clone()
    }

    pub async fn wait_for_written(&self, len: usize) -> Vec<u8> {
        loop {
            let notified = self.shared.written.notified();
            let written = self.written();
            if written.len() >= len {
                return written;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl SocketTransport for ScriptedTransport {
    async fn readable(&self) -> io::Result<()> {
        loop {
            let notified = self.shared.readable.notified();
            if !self.shared.state.lock().unwrap().reads.is_empty() {
                return Ok(());
            }
            notified.await;
        }
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.state.lock().unwrap();
        match state.reads.pop_front() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Data(mut data)) => {
                let n = min(buf.len(), data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    state.reads.push_front(ReadStep::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(ReadStep::Eof) => {
                state.reads.push_front(ReadStep::Eof);
                Ok(0)
            }
            Some(ReadStep::Error(kind)) => Err(kind.into()),
        }
    }

    async fn writable(&self) -> io::Result<()> {
        loop {
            let notified = self.shared.writable.notified();
            if !self.shared.state.lock().unwrap().is_write_blocked {
                return Ok(());
            }
            notified.await;
        }
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.state.lock().unwrap();
        if state.is_write_blocked {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let n = match state.writes.pop_front() {
            None => buf.len(),
            Some(WriteStep::Accept(n)) => min(n, buf.len()),
            Some(WriteStep::WouldBlock) => {
                state.is_write_blocked = true;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            Some(WriteStep::Closed) => return Ok(0),
            Some(WriteStep::Error(kind)) => return Err(kind.into()),
        };

        state.written.extend_from_slice(&buf[..n]);
        state.write_calls.push(buf.to_vec());
        drop(state);
        self.shared.written.notify_one();
        Ok(n)
    }

    fn peer_description(&self) -> String {
        "scripted".to_string()
    }
}


#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DelegateEvent {
    Operation(u64, OperationContent),
    Error(SocketErrorCode, Option<String>),
    PendingWrite,
}

/// A delegate that forwards every callback to a channel for the test to inspect
pub struct CollectingDelegate {
    events: mpsc::UnboundedSender<DelegateEvent>,
    pending_writes: Mutex<VecDeque<Vec<u8>>>,
}

impl CollectingDelegate {
    pub fn new() -> (Arc<CollectingDelegate>, mpsc::UnboundedReceiver<DelegateEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let delegate = CollectingDelegate {
            events,
            pending_writes: Default::default(),
        };
        (Arc::new(delegate), receiver)
    }

    pub fn weak(self: &Arc<Self>) -> Option<Weak<dyn SocketDelegate>> {
        let weak: Weak<CollectingDelegate> = Arc::downgrade(self);
        Some(weak)
    }

    /// data that is sent from the next `run_pending_write` callback
    pub fn add_pending_write(&self, data: &[u8]) {
        self.pending_writes.lock().unwrap()
            .push_back(data.to_vec());
    }
}

#[async_trait]
impl SocketDelegate for CollectingDelegate {
    async fn operation_available(&self, _socket: &Socket, tag: u64, content: OperationContent) {
        self.events.send(DelegateEvent::Operation(tag, content)).ok();
    }

    async fn error(&self, _socket: &Socket, info: Info) {
        let code = SocketErrorCode::try_from(info.code).unwrap();
        self.events.send(DelegateEvent::Error(code, info.context)).ok();
    }

    async fn run_pending_write(&self, socket: &Socket) {
        self.events.send(DelegateEvent::PendingWrite).ok();
        let data = self.pending_writes.lock().unwrap().pop_front();
        if let Some(data) = data {
            socket.send_bytes(&data);
        }
    }
}

pub fn data_op(tag: u64, data: &[u8]) -> DelegateEvent {
    DelegateEvent::Operation(tag, OperationContent::Data(bytes::Bytes::copy_from_slice(data)))
}

pub fn line_op(tag: u64, line: &[u8]) -> DelegateEvent {
    DelegateEvent::Operation(tag, OperationContent::Line(bytes::Bytes::copy_from_slice(line)))
}
