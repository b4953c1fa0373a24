//! Callback-driven asynchronous I/O building blocks on top of tokio:
//!
//! * [buffers::byte_buffer::ByteBuffer] is a chunked FIFO byte queue with zero-copy transfer of
//!   chunks and delimiter search across chunk boundaries
//! * [socket::Socket] drives a connected byte stream, delivering tagged read operations ('the
//!   next N bytes', 'the next line') and flushing a write queue
//! * [operations_queue::OperationsQueue] sequences asynchronous steps with cooperative
//!   cancellation

pub mod buffers;
pub mod config;
pub mod info;
pub mod operations_queue;
pub mod read_operation;
pub mod socket;
pub mod socket_delegate;
pub mod socket_transport;

#[cfg(test)] mod test_util;
