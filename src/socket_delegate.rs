use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

use crate::info::Info;
use crate::read_operation::OperationContent;
use crate::socket::Socket;

/// Application code's side of a [Socket]. All callbacks for a given socket are called
///  sequentially from the socket's I/O task, never concurrently.
///
/// A socket holds its delegate by weak reference, so a delegate that is dropped simply stops
///  receiving callbacks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SocketDelegate: Send + Sync + 'static {
    /// A read operation was satisfied. `tag` is the tag the operation was installed with.
    async fn operation_available(&self, socket: &Socket, tag: u64, content: OperationContent);

    /// The socket failed and is being closed. This is called at most once per socket, and it
    ///  is not called if the socket was stopped explicitly.
    async fn error(&self, _socket: &Socket, _info: Info) {}

    /// The socket is about to flush its write queue. This is the place to append data that
    ///  should go out in the same flush.
    async fn run_pending_write(&self, _socket: &Socket) {}
}
