/// Initialize tracing/logging for the application.
///
/// Every event carries its source file and line so failures logged by the
/// publisher point back at the stage that produced them.
pub fn init(default_level: &str) {
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    // try_init so tests and embedding applications can call this repeatedly
    let _ = tracing_subscriber::fmt()
        .with_max_level(lvl)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
