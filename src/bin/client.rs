//! PipeKV Client Binary
//!
//! Connects to a running server through its registration pipe and issues
//! the commands read from stdin. Notifications are printed as they arrive.

use std::fs::OpenOptions;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;

use clap::Parser;
use pipekv::client::{parse_client_line, ClientCommand, FifoConnector, KvsClient};
use pipekv::protocol::{render_notification, ConnectRequest, ResponseCode};
use pipekv::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// PipeKV Client
#[derive(Parser, Debug)]
#[command(name = "pipekv-client")]
#[command(about = "Client for the PipeKV key-value store")]
#[command(version)]
struct Args {
    /// Unique id used to name this client's pipes
    client_id: String,

    /// Registration pipe of the server
    register_pipe: PathBuf,

    /// Directory the client's pipes are created in
    #[arg(long, default_value = "/tmp")]
    pipe_dir: PathBuf,
}

fn main() {
    // Logs go to stderr; stdout carries results and notifications
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let args = Args::parse();
    let request = connect_request(&args.pipe_dir, &args.client_id);

    let outcome = run(&args.register_pipe, &request);
    FifoConnector::remove(&request);

    if let Err(e) = outcome {
        tracing::error!("Client {} failed: {}", args.client_id, e);
        std::process::exit(1);
    }
}

fn connect_request(dir: &Path, client_id: &str) -> ConnectRequest {
    let channel = |prefix: &str| {
        dir.join(format!("{}-{}", prefix, client_id))
            .to_string_lossy()
            .into_owned()
    };
    ConnectRequest {
        request_channel: channel("req"),
        response_channel: channel("resp"),
        notification_channel: channel("notif"),
    }
}

fn run(register_pipe: &Path, request: &ConnectRequest) -> Result<()> {
    FifoConnector::create(request)?;

    let mut registration = OpenOptions::new().write(true).open(register_pipe)?;
    let mut client = KvsClient::connect(&mut registration, request, &FifoConnector, |n| {
        println!("{}", render_notification(&n))
    })?;
    drop(registration);
    report(ResponseCode::ConnectOk, "connect");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let command = match parse_client_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Invalid command: {}", e);
                continue;
            }
        };

        match command {
            ClientCommand::Subscribe(key) => report(client.subscribe(&key)?, "subscribe"),
            ClientCommand::Unsubscribe(key) => report(client.unsubscribe(&key)?, "unsubscribe"),
            ClientCommand::Delay(delay) => {
                if !delay.is_zero() {
                    println!("Waiting...");
                    thread::sleep(delay);
                }
            }
            ClientCommand::Remote(line) => {
                let (code, output) = client.command(&line)?;
                report(code, "command");
                print!("{}", output);
            }
            ClientCommand::Disconnect => break,
        }
    }

    report(client.disconnect()?, "disconnect");
    println!("Disconnected from server.");
    Ok(())
}

fn report(code: ResponseCode, operation: &str) {
    println!(
        "Server returned {} for operation: {}",
        String::from_utf8_lossy(&code.as_bytes()),
        operation
    );
}
