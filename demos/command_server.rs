// Keyboard command server: W/S forward/back, A/D turn, Space stop, Q quit
//
// Point the client at this machine (config::SERVER_IP) and drive it from the
// terminal. Each key press sends one command byte.

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Send car commands from the keyboard")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8888")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let listener = TcpListener::bind(args.bind).await?;
    info!("Waiting for the car on {}...", args.bind);
    let (mut stream, peer) = listener.accept().await?;
    info!("Car connected from {}", peer);
    info!("Controls: W/S=forward/back, A/D=left/right, Space=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&mut stream).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    stream: &mut TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let command = match code {
            KeyCode::Char('w') => b'f',
            KeyCode::Char('s') => b'b',
            KeyCode::Char('a') => b'l',
            KeyCode::Char('d') => b'r',
            KeyCode::Char(' ') => b's',
            KeyCode::Char('q') | KeyCode::Esc => b'q',
            _ => continue,
        };

        stream.write_all(&[command]).await?;
        if command == b'q' {
            info!("Sent quit");
            return Ok(());
        }
    }
}
