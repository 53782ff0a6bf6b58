//! Headless console for the client embedding API (§6.2). Stands in for
//! the graphical front end out of scope for this crate: one line of
//! stdin per command, one line of stdout per event.

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use callifornia_client::{ClientApp, ClientEventListener};
use callifornia_protocol::ErrorKind;

#[derive(Parser, Debug)]
#[command(author, version, about = "Callifornia client console", long_about = None)]
struct Args {
    /// Rendezvous server address, e.g. 203.0.113.1:7777
    server: SocketAddr,
    /// Local address to bind the client's socket on.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,
}

struct ConsoleListener;

fn err_suffix(err: Option<ErrorKind>) -> String {
    match err {
        Some(kind) => format!(" ({kind})"),
        None => String::new(),
    }
}

impl ClientEventListener for ConsoleListener {
    fn on_authorization_result(&self, ok: bool, err: Option<ErrorKind>) {
        if ok {
            println!("authorized");
        } else {
            println!("authorization failed{}", err_suffix(err));
        }
    }

    fn on_incoming_call(&self, peer_nickname: &str) {
        println!("incoming call from {peer_nickname}");
    }

    fn on_incoming_call_expired(&self, peer_nickname: &str, err: Option<ErrorKind>) {
        println!("incoming call from {peer_nickname} expired{}", err_suffix(err));
    }

    fn on_outgoing_call_accepted(&self, peer_nickname: &str) {
        println!("{peer_nickname} accepted the call");
    }

    fn on_outgoing_call_declined(&self, peer_nickname: &str, err: Option<ErrorKind>) {
        println!("{peer_nickname} declined the call{}", err_suffix(err));
    }

    fn on_outgoing_call_timeout(&self, peer_nickname: &str, err: Option<ErrorKind>) {
        println!("call to {peer_nickname} timed out{}", err_suffix(err));
    }

    fn on_call_ended_by_remote(&self, peer_nickname: &str, err: Option<ErrorKind>) {
        println!("call with {peer_nickname} ended{}", err_suffix(err));
    }

    fn on_call_participant_connection_down(&self, peer_nickname: &str) {
        println!("{peer_nickname}'s connection is down");
    }

    fn on_call_participant_connection_restored(&self, peer_nickname: &str) {
        println!("{peer_nickname}'s connection is restored");
    }

    fn on_connection_down(&self) {
        println!("connection to server is down, reconnecting");
    }

    fn on_connection_restored(&self) {
        println!("connection to server restored");
    }

    fn on_connection_restored_authorization_needed(&self) {
        println!("connection restored but the session expired, authorize again");
    }

    fn on_incoming_voice(&self, peer_nickname: &str, pcm: &[u8]) {
        println!("received {} bytes of voice from {peer_nickname}", pcm.len());
    }

    fn on_incoming_screen(&self, peer_nickname: &str, frame: &[u8]) {
        println!("received {} byte screen frame from {peer_nickname}", frame.len());
    }

    fn on_incoming_camera(&self, peer_nickname: &str, frame: &[u8]) {
        println!("received {} byte camera frame from {peer_nickname}", frame.len());
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let client = match ClientApp::connect(args.bind, args.server, ConsoleListener) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("failed to start client: {err}");
            std::process::exit(1);
        }
    };

    println!("commands: authorize <nick> | logout | call <nick> | stop-call | accept <nick> | decline <nick> | end | quit");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("authorize"), Some(nick)) => {
                if let Err(err) = client.authorize(nick) {
                    println!("authorize failed: {err}");
                }
            }
            (Some("logout"), _) => client.logout(),
            (Some("call"), Some(nick)) => {
                if !client.start_outgoing_call(nick) {
                    println!("cannot start a call right now");
                }
            }
            (Some("stop-call"), _) => {
                if !client.stop_outgoing_call() {
                    println!("no outgoing call to stop");
                }
            }
            (Some("accept"), Some(nick)) => {
                if !client.accept_call(nick) {
                    println!("no incoming call from {nick}");
                }
            }
            (Some("decline"), Some(nick)) => {
                if !client.decline_call(nick) {
                    println!("no incoming call from {nick}");
                }
            }
            (Some("end"), _) => {
                if !client.end_call() {
                    println!("no active call to end");
                }
            }
            (Some("quit"), _) => break,
            (Some(other), _) => println!("unknown command: {other}"),
            (None, _) => {}
        }
        let _ = io::stdout().flush();
    }

    client.logout();
}
