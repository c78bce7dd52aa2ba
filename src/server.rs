use crate::error::{Error, Result};
use crate::network::Connection;
use crate::protocol::CommandExecutor;
use crate::store::Store;
use crate::Config;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT: usize = 2;

/// Single-threaded Redis-compatible server
///
/// One mio poll multiplexes the listener and every client socket. The
/// store and the append-only file are owned here and only ever touched
/// from the thread calling [`Server::run`].
pub struct Server {
    config: Config,
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    executor: CommandExecutor,
    connections: HashMap<Token, (TcpStream, Connection)>,
    next_token: usize,
    read_buffer: Vec<u8>,
}

/// Wakes a running server and makes [`Server::run`] return
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Signal the server to shut down gracefully
    pub fn shutdown(&self) {
        info!("Initiating server shutdown");
        if let Err(e) = self.waker.wake() {
            error!("Failed to wake event loop: {}", e);
        }
    }
}

impl Server {
    /// Replay the append-only file, then bind the listener
    ///
    /// Fails if the log cannot be opened: the server never runs without
    /// durability.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let executor = CommandExecutor::open(&config.aof_path)?;

        let mut listener = bind_listener(&config.listen_addr())?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let read_buffer = vec![0u8; config.read_buffer_size];

        Ok(Self {
            config,
            poll,
            listener,
            waker,
            executor,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT,
            read_buffer,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Get the number of active client connections
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn store(&self) -> &Store {
        self.executor.store()
    }

    /// Run the event loop until a [`ShutdownHandle`] fires
    ///
    /// Blocks in the readiness wait with no timeout.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        info!("Server listening on {}", self.local_addr()?);

        let mut shutting_down = false;
        while !shutting_down {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_connections(),
                    WAKER => shutting_down = true,
                    token => self.handle_client_event(token, event),
                }
            }
        }

        // Cleanup
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_connection(token);
        }
        self.executor.sync()?;

        info!(
            "Server shutting down after {} commands",
            self.executor.commands_processed()
        );
        Ok(())
    }

    /// Readiness is edge-triggered, so accept until the backlog is empty
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.register_connection(stream, addr) {
                        error!("Error registering connection from {}: {}", addr, e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    break;
                }
            }
        }
    }

    fn register_connection(&mut self, mut stream: TcpStream, addr: SocketAddr) -> io::Result<()> {
        stream.set_nodelay(self.config.tcp_nodelay)?;

        let token = Token(self.next_token);
        self.next_token += 1;

        self.poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)?;

        let connection = Connection::new(token.0, self.config.read_buffer_size, Some(addr));
        self.connections.insert(token, (stream, connection));

        debug!(
            "New connection from {} ({} active)",
            addr,
            self.active_connections()
        );
        Ok(())
    }

    fn handle_client_event(&mut self, token: Token, event: &Event) {
        // Connections closed earlier in this batch may still have events queued
        let Some((stream, connection)) = self.connections.get_mut(&token) else {
            return;
        };

        let mut should_close = false;
        let mut read = event.is_readable() || connection.reads_paused;

        // Edge-triggered: a paused reader gets no new READABLE event, so
        // resume as soon as flushing frees room in the reply queue
        loop {
            if read {
                should_close =
                    read_and_dispatch(stream, connection, &mut self.executor, &mut self.read_buffer);
            }

            if let Err(e) = flush_writes(stream, connection) {
                if e.kind() != ErrorKind::ConnectionReset && e.kind() != ErrorKind::BrokenPipe {
                    error!("Error writing: {}", e);
                }
                should_close = true;
            }

            read = connection.reads_paused && !connection.write_backlogged();
            if should_close || !read {
                break;
            }
        }

        if event.is_read_closed() && !event.is_readable() {
            should_close = true;
        }

        if should_close || connection.is_closed() {
            self.close_connection(token);
            return;
        }

        if let Err(e) = update_interest(self.poll.registry(), stream, token, connection) {
            error!("Error updating interest: {}", e);
            self.close_connection(token);
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some((mut stream, mut connection)) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut stream);
            connection.close();
            debug!(
                "Closed connection {} from {:?} ({} commands, {} bytes of partial input dropped, {} active)",
                connection.connection_id,
                connection.client_addr,
                connection.commands_processed,
                connection.pending_input(),
                self.active_connections()
            );
        }
    }
}

/// Drain the socket into the connection until it would block
///
/// Stops early, setting `reads_paused`, while the client has too many
/// unread replies queued. Returns whether the connection should be closed.
fn read_and_dispatch(
    stream: &mut TcpStream,
    connection: &mut Connection,
    executor: &mut CommandExecutor,
    buffer: &mut [u8],
) -> bool {
    connection.reads_paused = false;
    loop {
        if connection.write_backlogged() {
            trace!(
                "Pausing reads on connection {} until replies drain",
                connection.connection_id
            );
            connection.reads_paused = true;
            return false;
        }

        match stream.read(buffer) {
            Ok(0) => {
                debug!("Connection {} closed by peer", connection.connection_id);
                return true;
            }
            Ok(n) => {
                if let Err(e) = connection.process_read(&buffer[..n], executor) {
                    warn!("Closing connection {}: {}", connection.connection_id, e);
                    return true;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if e.kind() != ErrorKind::ConnectionReset {
                    error!("Error reading: {}", e);
                }
                return true;
            }
        }
    }
}

/// Write queued replies until drained or the socket would block
fn flush_writes(stream: &mut TcpStream, connection: &mut Connection) -> io::Result<()> {
    while let Some(data) = connection.pending_writes() {
        match stream.write(data) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => connection.consume_writes(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Ask for WRITABLE only while replies are queued
fn update_interest(
    registry: &Registry,
    stream: &mut TcpStream,
    token: Token,
    connection: &mut Connection,
) -> io::Result<()> {
    let wants_write = connection.has_pending_writes();
    if wants_write == connection.write_interest {
        return Ok(());
    }

    let interest = if wants_write {
        Interest::READABLE | Interest::WRITABLE
    } else {
        Interest::READABLE
    };
    registry.reregister(stream, token, interest)?;
    connection.write_interest = wants_write;
    Ok(())
}

/// Bind the first resolved address that accepts a listener
fn bind_listener(addr: &str) -> Result<TcpListener> {
    let mut last_err = None;

    for sock_addr in addr.to_socket_addrs()? {
        match TcpListener::bind(sock_addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!("Could not bind {}: {}", sock_addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => Error::Io(e),
        None => Error::Config(format!("{} did not resolve to any address", addr)),
    })
}
