//! redisgk-watch - Prints key lifecycle events from a Redis-compatible store
//!
//! Connects with the given credentials, enables keyevent notifications and
//! prints every event until Ctrl+C.

use redisgk::{ConnectionConfig, EventType, KeyEvent, RedisGk};
use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable read when `--password` is not given
const PASSWORD_ENV: &str = "REDISGK_PASSWORD";

/// Watcher configuration
struct Config {
    /// Store host
    host: String,
    /// Store port
    port: u32,
    /// ACL user name
    user: Option<String>,
    /// Store password
    password: String,
    /// Database index
    db: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: redisgk::DEFAULT_HOST.to_string(),
            port: redisgk::DEFAULT_PORT,
            user: None,
            password: std::env::var(PASSWORD_ENV).unwrap_or_default(),
            db: 0,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = value_of(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = value_of(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--user" | "-u" => {
                    config.user = Some(value_of(&args, i, "--user"));
                    i += 2;
                }
                "--password" | "-a" => {
                    config.password = value_of(&args, i, "--password");
                    i += 2;
                }
                "--db" | "-n" => {
                    config.db = value_of(&args, i, "--db").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid db index");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("redisgk-watch version {}", redisgk::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(&self.host, self.port, &self.password).with_db(self.db);
        if let Some(user) = &self.user {
            config = config.with_user(user);
        }
        config
    }
}

/// Returns the argument following `args[i]`, or exits with an error.
fn value_of(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
redisgk-watch - Print key lifecycle events from a Redis-compatible store

USAGE:
    redisgk-watch [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Store host (default: 127.0.0.1)
    -p, --port <PORT>          Store port (default: 6379)
    -u, --user <USER>          ACL user name
    -a, --password <PASSWORD>  Store password (default: ${})
    -n, --db <DB>              Database index (default: 0)
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    redisgk-watch --password secret
    REDISGK_PASSWORD=secret redisgk-watch --port 6380 --db 2
"#,
        PASSWORD_ENV
    );
}

fn print_event(event: &KeyEvent) {
    let marker = match event.event_type {
        EventType::Created | EventType::Updated => "+",
        EventType::Deleted => "-",
        EventType::Expired => "x",
        EventType::ExpiredNotice => "~",
        EventType::Unknown => "?",
    };
    println!("{} {}", marker, event);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; RUST_LOG overrides the default level
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let gk = RedisGk::connect(&config.connection_config()).await?;
    info!(
        "Watching {}:{} db {} (Ctrl+C to stop)",
        config.host, config.port, config.db
    );

    let events = gk.events();
    let mut printer = tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(event) = events.recv().await {
            print_event(&event);
            count += 1;
        }
        count
    });

    // Set up graceful shutdown
    let finished = tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received, closing...");
            None
        }
        done = &mut printer => {
            warn!("Event stream ended, closing...");
            Some(done)
        }
    };

    gk.close().await?;
    let printed = match finished {
        Some(done) => done?,
        None => printer.await?,
    };

    let stats = gk.store().stats();
    info!(
        events = printed,
        connections = stats.connections_opened.load(Ordering::Relaxed),
        commands = stats.commands_sent.load(Ordering::Relaxed),
        "Watcher shutdown complete"
    );
    Ok(())
}
