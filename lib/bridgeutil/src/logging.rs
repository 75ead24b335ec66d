//! Structured logging, built on `slog`. Every component gets its own `Logger`
//! derived from a process-wide root via `log.new(o!("component" => ...))` so
//! log lines carry their origin without each call site repeating it.

pub use slog::{debug, error, info, o, trace, warn, Logger};

use serdeconv;
use sloggers::{Build, Config, LoggerConfig};
use std::path::Path;

/// Builds the root logger from a TOML logging config file, falling back to a
/// debug-level terminal logger on stderr if no config is supplied.
pub fn init<P: AsRef<Path>>(config_path: Option<P>) -> Logger {
    let config: LoggerConfig = match config_path {
        Some(path) => serdeconv::from_toml_file(path).expect("error loading logging configuration"),
        None => serdeconv::from_toml_str(DEFAULT_CONFIG).expect("error parsing default logging configuration"),
    };

    config.build_logger().expect("error constructing logger")
}

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_logger() {
        let log = init::<&str>(None);
        info!(log, "logger constructed"; "component" => "test");
    }
}
