use log::info;
use simplelog::*;
use std::fs::File;

/// Installs a terminal logger and, when `log_file` is given, a file logger next to it.
/// Only the first call in a process takes effect; later calls are ignored.
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(filename) = log_file {
        if let Ok(file) = File::create(filename) {
            loggers.push(WriteLogger::new(level, Config::default(), file));
        }
    }
    if CombinedLogger::init(loggers).is_ok() {
        info!("logger started with level {}", level);
    }
}

/// Parses "off" | "error" | "warn" | "info" | "debug" | "trace" (any case).
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    level.parse::<LevelFilter>().ok()
}
