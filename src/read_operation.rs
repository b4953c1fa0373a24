use std::collections::VecDeque;
use bytes::Bytes;

/// What a read operation waits for
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperationKind {
    /// exactly this number of bytes
    Data(usize),
    /// everything up to the socket's configured line terminator
    Line,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    /// opaque to the socket, handed back to the delegate with the operation's content
    pub tag: u64,
}

/// The content delivered for a satisfied operation, tagged with the kind of operation.
///
/// For `Line` operations, the line terminator is stripped.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OperationContent {
    Data(Bytes),
    Line(Bytes),
}

impl OperationContent {
    pub fn bytes(&self) -> &Bytes {
        match self {
            OperationContent::Data(b) => b,
            OperationContent::Line(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            OperationContent::Data(b) => b,
            OperationContent::Line(b) => b,
        }
    }

    pub fn is_line(&self) -> bool {
        matches!(self, OperationContent::Line(_))
    }
}

/// A socket's read configuration. There is either no operation, a global operation that stays
///  in place after it was satisfied, or a queue of one-shot operations that are satisfied in
///  order.
///
/// A global operation can be installed while one-shot operations are pending. It then waits
///  behind them and takes over once the queue is drained, so the operation that is 'current'
///  is always well-defined.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub(crate) enum ReadMode {
    #[default]
    Idle,
    Global(PendingOperation),
    /// NB: `queue` is never empty
    Scheduled {
        queue: VecDeque<PendingOperation>,
        then_global: Option<PendingOperation>,
    },
}

impl ReadMode {
    /// the operation that the next data in the receive buffer goes to
    pub fn current(&self) -> Option<PendingOperation> {
        match self {
            ReadMode::Idle => None,
            ReadMode::Global(op) => Some(*op),
            ReadMode::Scheduled { queue, .. } => queue.front().cloned(),
        }
    }

    pub fn set_global(&mut self, op: PendingOperation) {
        *self = match std::mem::take(self) {
            ReadMode::Idle | ReadMode::Global(_) => ReadMode::Global(op),
            ReadMode::Scheduled { queue, .. } => ReadMode::Scheduled { queue, then_global: Some(op) },
        };
    }

    pub fn remove_global(&mut self) {
        *self = match std::mem::take(self) {
            ReadMode::Idle | ReadMode::Global(_) => ReadMode::Idle,
            ReadMode::Scheduled { queue, .. } => ReadMode::Scheduled { queue, then_global: None },
        };
    }

    pub fn schedule(&mut self, op: PendingOperation) {
        *self = match std::mem::take(self) {
            ReadMode::Idle => ReadMode::Scheduled { queue: VecDeque::from([op]), then_global: None },
            ReadMode::Global(global) => ReadMode::Scheduled { queue: VecDeque::from([op]), then_global: Some(global) },
            ReadMode::Scheduled { mut queue, then_global } => {
                queue.push_back(op);
                ReadMode::Scheduled { queue, then_global }
            }
        };
    }

    /// to be called after the current operation was satisfied: one-shot operations are used up,
    ///  a global operation re-arms
    pub fn on_delivered(&mut self) {
        if let ReadMode::Scheduled { queue, then_global } = self {
            queue.pop_front();
            if queue.is_empty() {
                *self = match then_global.take() {
                    Some(global) => ReadMode::Global(global),
                    None => ReadMode::Idle,
                };
            }
        }
    }

    pub fn clear(&mut self) {
        *self = ReadMode::Idle;
    }
}
