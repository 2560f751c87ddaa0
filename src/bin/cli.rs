//! resplink CLI Client
//!
//! Command-line interface for talking to a RESP backend.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use resplink::network::TcpConnector;
use resplink::{BackendConfig, Config, HandlerRef, OwnerId, ProtocolService, Reply, ReplyHandler, Role};
use tracing_subscriber::{fmt, EnvFilter};

/// resplink CLI
#[derive(Parser, Debug)]
#[command(name = "resplink-cli")]
#[command(about = "CLI for RESP key-value backends")]
#[command(version)]
struct Args {
    /// Backend host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Backend port
    #[arg(short, long, default_value = "6379")]
    port: u16,

    /// Database index
    #[arg(short = 'n', long, default_value = "0")]
    db: u32,

    /// Client name announced on connect
    #[arg(long, default_value = "resplink-cli")]
    client_name: String,

    /// Read timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single command and print its reply
    Exec {
        /// Command name followed by its arguments
        #[arg(required = true, num_args = 1..)]
        args: Vec<String>,
    },

    /// Print messages published to the given channels
    Subscribe {
        #[arg(required = true, num_args = 1..)]
        channels: Vec<String>,
    },
}

/// Keeps the last reply, or prints every message in streaming mode
#[derive(Default)]
struct CliHandler {
    stream: bool,
    outcome: Option<Result<Reply, String>>,
}

impl ReplyHandler for CliHandler {
    fn on_result(&mut self, reply: &Reply) {
        if self.stream {
            println!("{}", format_reply(reply, 0));
        } else {
            self.outcome = Some(Ok(reply.clone()));
        }
    }

    fn on_error(&mut self, reason: &str) {
        if self.stream {
            eprintln!("(error) {}", reason);
        }
        self.outcome = Some(Err(reason.to_string()));
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .backend(BackendConfig::new("cli", &args.host, args.port, args.db))
        .client_name(&args.client_name)
        .read_timeout_ms(args.timeout_ms)
        .build();

    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    let factory = Rc::new(TcpConnector::new(&config));
    let mut service = ProtocolService::new(config.backends[0].clone(), &config, factory);
    let owner = OwnerId::new("resplink-cli");

    let code = match args.command {
        Commands::Exec { args } => exec(&mut service, &owner, &args),
        Commands::Subscribe { channels } => subscribe(&mut service, &owner, &channels),
    };
    std::process::exit(code);
}

fn exec(service: &mut ProtocolService, owner: &OwnerId, args: &[String]) -> i32 {
    let handler = Rc::new(RefCell::new(CliHandler::default()));

    if let Err(e) = service.send(Some(HandlerRef::new(owner.clone(), &handler)), args) {
        eprintln!("{}", e);
        return 1;
    }

    loop {
        if let Some(outcome) = handler.borrow_mut().outcome.take() {
            return match outcome {
                Ok(reply) => {
                    println!("{}", format_reply(&reply, 0));
                    0
                }
                Err(reason) => {
                    println!("(error) {}", reason);
                    1
                }
            };
        }

        if let Err(e) = service.block_and_process() {
            eprintln!("{}", e);
            return 1;
        }
        if !service.is_connected(Role::Command) && handler.borrow().outcome.is_none() {
            eprintln!("connection closed before a reply arrived");
            return 1;
        }
    }
}

fn subscribe(service: &mut ProtocolService, owner: &OwnerId, channels: &[String]) -> i32 {
    let handler = Rc::new(RefCell::new(CliHandler {
        stream: true,
        outcome: None,
    }));

    for channel in channels {
        if let Err(e) = service.subscribe(HandlerRef::new(owner.clone(), &handler), channel) {
            eprintln!("{}", e);
            return 1;
        }
    }

    loop {
        service.poll();
        if !service.is_connected(Role::Subscriber) {
            eprintln!("subscribe connection lost");
            return 1;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Render a reply the way redis-cli does
fn format_reply(reply: &Reply, indent: usize) -> String {
    match reply {
        Reply::Status(text) => text.clone(),
        Reply::Error(text) => format!("(error) {}", text),
        Reply::Integer(i) => format!("(integer) {}", i),
        Reply::Bulk(None) => "(nil)".to_string(),
        Reply::Bulk(Some(data)) => format!("{:?}", String::from_utf8_lossy(data)),
        Reply::Multi(items) if items.is_empty() => "(empty array)".to_string(),
        Reply::Multi(items) => {
            let width = items.len().to_string().len();
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let prefix = format!("{:>width$}) ", i + 1, width = width);
                    let pad = if i == 0 { String::new() } else { " ".repeat(indent) };
                    format!("{}{}{}", pad, prefix, format_reply(item, indent + prefix.len()))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
