//! Startup banner utilities.

use crate::config::{Config, format_size};
use std::fmt::Write;

/// Print a startup banner to stdout.
pub fn print_banner(config: &Config) {
    let mut output = String::with_capacity(512);

    let name = "kiln-server";
    let version = env!("CARGO_PKG_VERSION");
    writeln!(output, "{} v{}", name, version).unwrap();
    writeln!(output, "{}", "=".repeat(name.len() + version.len() + 2)).unwrap();
    writeln!(output).unwrap();

    writeln!(output, "Listen:      {}", config.listener.address).unwrap();
    writeln!(output, "Cache:       {} LRU", format_size(config.cache.max_bytes)).unwrap();
    writeln!(
        output,
        "Workers:     {}..{} threads, queue {}",
        config.low_watermark(),
        config.pool.high_watermark,
        config.pool.max_queue
    )
    .unwrap();
    writeln!(
        output,
        "Connections: {} max, {}s read timeout",
        config.limits.max_connections, config.limits.read_timeout_secs
    )
    .unwrap();
    writeln!(output, "Log level:   {}", config.logging.level).unwrap();

    println!("{}", output);
}
