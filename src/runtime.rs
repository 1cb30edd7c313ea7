// Reconnecting command loop with auto-stop
// Note: the server sends discrete pulses, not a stream. Every motion is cut off after
// the motion window so a lost connection or a missing follow-up can't leave the car driving.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

// local imports
use crate::config::{ClientConfig, STOP_RETRY_INTERVAL};
use crate::messages::Message;
use crate::motor::{GpioError, LineAssignment, MotionActuator, OutputLines, SysfsLines};

/// Opens the stream to the command server
pub trait Connector {
    type Stream: AsyncRead + Unpin;

    fn connect(&mut self, addr: SocketAddr) -> impl Future<Output = io::Result<Self::Stream>>;
}

/// Plain TCP, no handshake
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&mut self, addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// Everything that sends the loop back to Disconnected
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Connection refused by {addr}")]
    Refused {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Read error: {0}")]
    Read(#[source] io::Error),

    #[error("Command is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("Actuator error: {0}")]
    Actuator(#[from] GpioError),
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Server sent `q`
    Quit,
    /// Shutdown signal (ctrl-c)
    Interrupted,
}

enum LinkState<S> {
    Disconnected,
    Connected(S),
    Terminated(Exit),
}

/// Outcome of handling one read on an open connection
enum Served {
    Continue,
    Closed,
    Quit,
}

pub struct CommandLoop<L: OutputLines, C: Connector> {
    config: ClientConfig,
    actuator: MotionActuator<L>,
    connector: C,
    state: LinkState<C::Stream>,
    buf: Vec<u8>,
    connect_attempts: u64,
}

impl<L: OutputLines, C: Connector> CommandLoop<L, C> {
    pub fn new(config: ClientConfig, actuator: MotionActuator<L>, connector: C) -> Self {
        let buf = vec![0u8; config.read_buffer_size.max(1)];
        Self {
            config,
            actuator,
            connector,
            state: LinkState::Disconnected,
            buf,
            connect_attempts: 0,
        }
    }

    pub fn actuator(&self) -> &MotionActuator<L> {
        &self.actuator
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    pub fn exit(&self) -> Option<Exit> {
        match self.state {
            LinkState::Terminated(exit) => Some(exit),
            _ => None,
        }
    }

    /// Run until the server sends `q`
    pub async fn run(&mut self) -> Exit {
        info!(
            "Command loop started: server {}, {}ms motion window, {}s retry delay",
            self.config.server,
            self.config.motion_window.as_millis(),
            self.config.retry_delay.as_secs_f32()
        );
        loop {
            if let Some(exit) = self.step().await {
                return exit;
            }
        }
    }

    /// Run until quit or until `shutdown` resolves, then release the actuator
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Exit {
        let exit = tokio::select! {
            exit = self.run() => exit,
            _ = shutdown => {
                info!("Interrupted, shutting down");
                Exit::Interrupted
            }
        };
        self.teardown(exit)
    }

    /// Close any open connection and release the lines
    fn teardown(&mut self, exit: Exit) -> Exit {
        self.state = LinkState::Terminated(exit);
        if let Err(e) = self.actuator.release() {
            warn!("Failed to release actuator: {}", e);
        }
        exit
    }

    /// Perform one state transition, returning the exit reason once terminated.
    ///
    /// Cancelling the returned future drops any connection it holds.
    pub async fn step(&mut self) -> Option<Exit> {
        let state = std::mem::replace(&mut self.state, LinkState::Disconnected);

        self.state = match state {
            LinkState::Disconnected => match self.connect().await {
                Ok(stream) => LinkState::Connected(stream),
                Err(e) => {
                    self.report(&e);
                    sleep(self.config.retry_delay).await;
                    LinkState::Disconnected
                }
            },
            LinkState::Connected(mut stream) => match self.serve(&mut stream).await {
                Ok(Served::Continue) => LinkState::Connected(stream),
                Ok(Served::Closed) => {
                    info!("Server closed the connection, reconnecting");
                    LinkState::Disconnected
                }
                Ok(Served::Quit) => {
                    info!("Quit received, closing connection");
                    LinkState::Terminated(Exit::Quit)
                }
                Err(e) => {
                    drop(stream);
                    self.report(&e);
                    self.stop_and_back_off().await;
                    LinkState::Disconnected
                }
            },
            LinkState::Terminated(exit) => LinkState::Terminated(exit),
        };

        self.exit()
    }

    /// Wait out the retry delay, re-sending stop until the lines take it
    async fn stop_and_back_off(&mut self) {
        let deadline = Instant::now() + self.config.retry_delay;
        loop {
            match self.actuator.stop() {
                Ok(()) => break,
                Err(e) => warn!("Failed to stop motors: {}", e),
            }
            if Instant::now() + STOP_RETRY_INTERVAL >= deadline {
                break;
            }
            sleep(STOP_RETRY_INTERVAL).await;
        }
        sleep_until(deadline).await;
    }

    fn report(&self, e: &LinkError) {
        match e {
            LinkError::Refused { addr, .. } => warn!(
                "Cannot reach server {}, retrying in {:?}",
                addr, self.config.retry_delay
            ),
            _ => warn!(
                "Connection error: {}, retrying in {:?}",
                e, self.config.retry_delay
            ),
        }
    }

    async fn connect(&mut self) -> Result<C::Stream, LinkError> {
        let addr = self.config.server;
        self.connect_attempts += 1;
        debug!("Connecting to {} (attempt {})", addr, self.connect_attempts);

        match self.connector.connect(addr).await {
            Ok(stream) => {
                info!("Connected to server {}", addr);
                Ok(stream)
            }
            Err(source) if source.kind() == io::ErrorKind::ConnectionRefused => {
                Err(LinkError::Refused { addr, source })
            }
            Err(source) => Err(LinkError::Connect { addr, source }),
        }
    }

    /// Read one payload and act on it
    async fn serve(&mut self, stream: &mut C::Stream) -> Result<Served, LinkError> {
        let n = stream.read(&mut self.buf).await.map_err(LinkError::Read)?;
        if n == 0 {
            return Ok(Served::Closed);
        }

        let payload = std::str::from_utf8(&self.buf[..n])?;
        info!("Received command: {:?}", payload);

        match Message::parse(payload) {
            Message::Quit => {
                if let Err(e) = self.actuator.release() {
                    warn!("Failed to release actuator: {}", e);
                }
                return Ok(Served::Quit);
            }
            Message::Motion(cmd) => {
                self.actuator.perform(cmd)?;
            }
            Message::Unrecognized(text) => {
                debug!("Ignoring unrecognized command {:?}", text);
            }
        }

        // Reads pause for the whole window, later commands wait in the socket
        sleep(self.config.motion_window).await;
        self.actuator.stop()?;
        Ok(Served::Continue)
    }
}

/// Drive the car from the configured server until quit or ctrl-c
pub async fn run() -> Result<Exit, GpioError> {
    let config = ClientConfig::default();

    let lines = SysfsLines::open(LineAssignment::default())?;
    let actuator = MotionActuator::new(lines)?;
    let mut command_loop = CommandLoop::new(config, actuator, TcpConnector);

    let exit = command_loop
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Command loop finished: {:?}", exit);
    Ok(exit)
}
