//! kiln cache server binary.

use clap::Parser;
use kiln_cache::ThreadSafeCache;
use kiln_server::config::{Config, parse_size};
use kiln_server::{acceptor, banner, logging, signal};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kiln-server")]
#[command(about = "In-memory LRU key/value cache server")]
struct Args {
    /// Path to configuration file
    config: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Override the listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the cache budget (e.g. "64MB")
    #[arg(long)]
    cache_size: Option<String>,
}

fn main() {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return;
    }

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Some(listen) = args.listen {
        config.listener.address = listen;
    }
    if let Some(ref size) = args.cache_size {
        match parse_size(size) {
            Ok(bytes) => config.cache.max_bytes = bytes,
            Err(e) => {
                eprintln!("Invalid --cache-size: {}", e);
                std::process::exit(1);
            }
        }
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    logging::init(&config.logging);
    signal::ignore_sigpipe();
    let shutdown = signal::install_signal_handler();

    banner::print_banner(&config);

    let cache = ThreadSafeCache::new(config.cache.max_bytes);
    if let Err(e) = acceptor::run(&config, cache, shutdown) {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn print_default_config() {
    let config = r#"# kiln Server Configuration

[listener]
# Address to listen on
address = "127.0.0.1:11211"

[cache]
# Total byte budget for keys and values (e.g., "64MB", "4GB")
max_bytes = "64MB"

[limits]
# Maximum concurrently served connections; extra sockets are closed
max_connections = 1024

# Idle read timeout in seconds before a connection is closed
read_timeout_secs = 5

[pool]
# Minimum pooled threads kept alive when idle (default: number of CPUs)
# low_watermark = 4

# Maximum pooled threads
high_watermark = 1024

# Maximum queued tasks awaiting a thread
max_queue = 128

# How long a surplus idle thread lingers before exiting, in milliseconds
idle_timeout_ms = 30000

[logging]
# Log level filter: "trace", "debug", "info", "warn", "error"
level = "info"

# Output format: "pretty", "json", or "compact"
format = "pretty"

# Include timestamps
timestamps = true
"#;
    print!("{}", config);
}
