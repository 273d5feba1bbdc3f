use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the log subscriber. Only warnings are shown unless `verbose`.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let mut subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if verbose {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    if let Err(err) = tracing::subscriber::set_global_default(subscriber.finish()) {
        eprintln!("Failed to install log subscriber: {}", err);
    }
}
