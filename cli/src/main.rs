//! electrumrpc CLI — query Electrum servers from the terminal.
//!
//! Usage:
//! ```bash
//! # One-shot call
//! electrumrpc call --host electrum.blockstream.info --port 50002 --protocol tls \
//!     --method blockchain.relayfee
//!
//! # Follow new block headers until Ctrl-C
//! electrumrpc subscribe --host electrum.blockstream.info --port 50002 --protocol tls \
//!     --method blockchain.headers.subscribe
//! ```

mod telemetry;

use std::env;
use std::process;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use electrumrpc_client::{
    Client, ClientOptions, ConnectionEvent, PersistencePolicy, Protocol, TlsOptions,
};
use electrumrpc_core::LogLevel;

use crate::telemetry::LogConfig;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "call" => cmd_call(&args[2..]).await,
        "subscribe" => cmd_subscribe(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("electrumrpc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("electrumrpc {}", env!("CARGO_PKG_VERSION"));
    println!("Query Electrum servers over TCP, TLS or WebSocket\n");
    println!("USAGE:");
    println!("    electrumrpc <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    call       Send one request and print the result");
    println!("    subscribe  Subscribe and print notifications until Ctrl-C");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --host <HOST>          Server host  [required]");
    println!("    --port <PORT>          Server port  [required]");
    println!("    --protocol <PROTO>     tcp | tls | ssl | ws | wss  [default: tcp]");
    println!("    --method <METHOD>      Electrum method name  [required]");
    println!("    --params <JSON>        JSON array of parameters  [default: []]");
    println!("    --insecure             Accept self-signed / invalid certificates");
    println!("    --log-level <LEVEL>    debug | info | warn | error | none");
}

/// Flags shared by every networked command.
struct Target {
    host: String,
    port: u16,
    protocol: Protocol,
    method: String,
    params: Vec<Value>,
    insecure: bool,
}

impl Target {
    fn parse(args: &[String]) -> Result<Self> {
        let host = parse_flag(args, "--host").ok_or_else(|| anyhow!("--host is required"))?;
        let port = parse_flag(args, "--port")
            .ok_or_else(|| anyhow!("--port is required"))?
            .parse::<u16>()
            .context("--port must be a number between 1 and 65535")?;
        let protocol = match parse_flag(args, "--protocol") {
            Some(p) => p.parse::<Protocol>().map_err(|e| anyhow!(e))?,
            None => Protocol::Tcp,
        };
        let method = parse_flag(args, "--method").ok_or_else(|| anyhow!("--method is required"))?;
        let params = match parse_flag(args, "--params") {
            Some(raw) => parse_params(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            host,
            port,
            protocol,
            method,
            params,
            insecure: has_flag(args, "--insecure"),
        })
    }

    fn client(&self) -> Client {
        let options = ClientOptions {
            tls: TlsOptions {
                accept_invalid_certs: self.insecure,
            },
            ..ClientOptions::default()
        };
        Client::new(self.host.clone(), self.port, self.protocol, options)
    }

    fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

fn init_logging(args: &[String]) -> Result<()> {
    let level = parse_flag(args, "--log-level")
        .map(|l| l.parse::<LogLevel>().map_err(|e| anyhow!(e)))
        .transpose()?;
    telemetry::init_tracing(&LogConfig { level });
    Ok(())
}

async fn cmd_call(args: &[String]) -> Result<()> {
    init_logging(args)?;
    let target = Target::parse(args)?;
    let client = target.client();

    // one-shot: no reconnects
    client.connect(Some(PersistencePolicy::new(0))).await;
    if !client.is_connected() {
        bail!("could not connect to {}", target.endpoint());
    }

    let result = client.request(&target.method, target.params.clone()).await;
    client.close().await;

    let result = result.with_context(|| format!("{} failed", target.method))?;
    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
    Ok(())
}

async fn cmd_subscribe(args: &[String]) -> Result<()> {
    init_logging(args)?;
    let target = Target::parse(args)?;
    let client = target.client();

    // servers push notifications under the subscribe method's name
    client.on_notification(target.method.clone(), |params| {
        println!("{}", serde_json::to_string_pretty(params).unwrap_or_default());
    });

    client.connect(None).await;
    if !client.is_connected() {
        bail!("could not connect to {}", target.endpoint());
    }
    let mut events = client.events();

    let initial = client
        .request(&target.method, target.params.clone())
        .await
        .with_context(|| format!("{} failed", target.method))?;
    println!("{}", serde_json::to_string_pretty(&initial).unwrap_or_default());
    eprintln!("Waiting for notifications on {} (Ctrl-C to stop)...", target.method);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                // subscriptions do not survive a reconnect
                Ok(ConnectionEvent::Connected) => {
                    match client.request(&target.method, target.params.clone()).await {
                        Ok(status) => {
                            tracing::info!("resubscribed after reconnect");
                            println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
                        }
                        Err(e) => tracing::warn!(error = %e, "resubscribe failed"),
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.close().await;
    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_params(raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(raw).context("--params is not valid JSON")? {
        Value::Array(params) => Ok(params),
        other => bail!("--params must be a JSON array, got {other}"),
    }
}
