//! Status change observer
//!
//! Connects to a status change notifier, subscribes to the given event kinds
//! and logs every event received.

use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scn_observer::{Observer, ObserverConfig};

/// Command line configuration
struct Config {
    /// Notifier address; falls back to the environment when absent
    endpoint: Option<String>,
    /// Event kinds to subscribe to
    events: Vec<String>,
    /// Connect attempts before giving up
    retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            events: Vec::new(),
            retries: 10,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" | "-e" => {
                if i + 1 < args.len() {
                    config.endpoint = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("error: --endpoint requires a value");
                    std::process::exit(1);
                }
            }
            "--event" | "-k" => {
                if i + 1 < args.len() {
                    config.events.push(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("error: --event requires a value");
                    std::process::exit(1);
                }
            }
            "--retries" | "-r" => {
                if i + 1 < args.len() {
                    config.retries = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid retry count: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("error: --retries requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn print_help() {
    println!(
        r#"scn-observe - status change notifier observer

USAGE:
    scn-observe [OPTIONS] --event <KIND>...

OPTIONS:
    -e, --endpoint <ADDR>    Notifier host:port or ws:// URL
                             [default: $CONCORD_STATUS_CHANGE_NOTIFIER_HOST]
    -k, --event <KIND>       Event kind to subscribe to (repeatable)
    -r, --retries <N>        Connect attempts before giving up [default: 10]
    -h, --help               Print help information
"#
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();
    if args.events.is_empty() {
        eprintln!("error: at least one --event is required");
        std::process::exit(1);
    }

    let config = match args.endpoint {
        Some(endpoint) => ObserverConfig::new(endpoint),
        None => ObserverConfig::from_env()?,
    };

    let mut observer = Observer::new(config, args.events.clone());
    for kind in &args.events {
        let kind_name = kind.clone();
        observer.add_listener(kind.as_str(), move |meta: &[u8]| {
            info!(kind = %kind_name, meta = %String::from_utf8_lossy(meta), "event");
        })?;
    }

    let attempts = args.retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match observer.connect() {
            Ok(()) => break,
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(attempt, error = %err, "connect failed, retrying");
                thread::sleep(Duration::from_secs(1));
            }
            Err(err) => {
                error!(attempt, error = %err, "giving up");
                return Err(err.into());
            }
        }
    }

    let (tx, rx) = observer.frame_channel();
    let registry = observer.listeners();
    let dispatcher = thread::Builder::new()
        .name("scn-dispatch".to_string())
        .spawn(move || registry.handle_events(rx))?;

    let result = observer.read_frames(&tx);
    drop(tx);
    if dispatcher.join().is_err() {
        error!("dispatch thread panicked");
    }

    let stats = observer.stats();
    info!(
        dispatched = stats.dispatched,
        unmatched = stats.unmatched,
        malformed = stats.malformed,
        "observer stopped"
    );

    result.map(|_| ()).map_err(Into::into)
}
