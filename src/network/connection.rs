use crate::error::Result;
use crate::protocol::resp::{write_resp_value, RespValue};
use crate::protocol::{CommandExecutor, RespParser};
use std::net::SocketAddr;
use tracing::trace;

/// Queued reply bytes above which the reactor stops reading from a client
pub const MAX_PENDING_WRITES: usize = 4 * 1024 * 1024;

/// Per-client protocol state
///
/// Holds the inbound accumulator (bytes that do not yet form a complete
/// request) and the outbound queue of encoded replies. Socket I/O stays
/// in the reactor; this type only turns bytes into replies.
pub struct Connection {
    pub connection_id: usize,
    pub client_addr: Option<SocketAddr>,
    pub commands_processed: u64,

    parser: RespParser,

    // Single consolidated write buffer
    write_buffer: Vec<u8>,
    write_position: usize,

    /// Whether WRITABLE interest is currently registered for this socket
    pub(crate) write_interest: bool,

    /// Reads stopped with input possibly left in the socket
    pub(crate) reads_paused: bool,

    closed: bool,
}

impl Connection {
    pub fn new(connection_id: usize, buffer_size: usize, addr: Option<SocketAddr>) -> Self {
        Self {
            connection_id,
            client_addr: addr,
            commands_processed: 0,
            parser: RespParser::with_capacity(buffer_size),
            write_buffer: Vec::with_capacity(buffer_size),
            write_position: 0,
            write_interest: false,
            reads_paused: false,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Bytes buffered toward an incomplete request
    pub fn pending_input(&self) -> usize {
        self.parser.pending()
    }

    /// Feed newly read bytes and execute every complete request, in order
    ///
    /// A framing error leaves the stream unsynchronized: it queues an error
    /// reply, marks the connection closed and is returned. Requests decoded
    /// before it have already been answered.
    pub fn process_read(&mut self, data: &[u8], executor: &mut CommandExecutor) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.parser.feed(data);

        // Only clear buffer if all previous writes have been consumed
        if self.write_position >= self.write_buffer.len() {
            self.write_buffer.clear();
            self.write_position = 0;
        }

        loop {
            match self.parser.parse_next() {
                Ok(Some(args)) => {
                    self.commands_processed += 1;
                    let response = executor.dispatch(args);
                    write_resp_value(&mut self.write_buffer, &response);
                }
                Ok(None) => {
                    trace!(
                        "Connection {} waiting for more data ({} bytes buffered)",
                        self.connection_id,
                        self.parser.pending()
                    );
                    return Ok(());
                }
                Err(e) => {
                    write_resp_value(&mut self.write_buffer, &RespValue::Error(e.reply_text()));
                    self.closed = true;
                    return Err(e);
                }
            }
        }
    }

    /// Get pending write data as a single buffer slice
    pub fn pending_writes(&self) -> Option<&[u8]> {
        if self.write_position < self.write_buffer.len() {
            Some(&self.write_buffer[self.write_position..])
        } else {
            None
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        self.write_position < self.write_buffer.len()
    }

    /// Whether the client has fallen too far behind reading its replies
    pub fn write_backlogged(&self) -> bool {
        self.write_buffer.len() - self.write_position >= MAX_PENDING_WRITES
    }

    /// Mark bytes as written
    pub fn consume_writes(&mut self, n: usize) {
        self.write_position = (self.write_position + n).min(self.write_buffer.len());
        if self.write_position == self.write_buffer.len() {
            self.write_buffer.clear();
            self.write_position = 0;
        }
    }
}
