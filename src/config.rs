use anyhow::bail;
use bytes::Bytes;

pub struct SocketConfig {
    /// This is the terminator for [crate::read_operation::OperationKind::Line] operations. It is
    ///  consumed when a line is delivered, but never part of the delivered content.
    pub line_terminator: Bytes,

    /// The size of the chunks in which data is read from the transport. Each chunk is read in
    ///  a single non-blocking call and then handed over to the receive buffer without copying,
    ///  so this is a trade-off between per-call overhead and memory wasted on partially filled
    ///  chunks.
    pub read_chunk_size: usize,

    /// This is a hard upper bound for the number of bytes that are buffered on the receiving side
    ///  waiting for an operation to be satisfied. It protects against a misbehaving peer (or a
    ///  line that never terminates) exhausting memory.
    ///
    /// A `Data` operation requesting more than this is rejected with a `ReadFull` error, and so is
    ///  a receive buffer that grows beyond this without satisfying the current operation.
    pub max_read_size: usize,
}

impl SocketConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.line_terminator.is_empty() {
            bail!("line terminator must not be empty");
        }
        if self.read_chunk_size == 0 {
            bail!("read chunk size must be positive");
        }
        if self.max_read_size < self.read_chunk_size {
            bail!("maximum read size {} is smaller than the read chunk size {}", self.max_read_size, self.read_chunk_size);
        }

        Ok(())
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            line_terminator: Bytes::from_static(b"\r\n"),
            read_chunk_size: 4096,
            max_read_size: 16*1024*1024,
        }
    }
}
