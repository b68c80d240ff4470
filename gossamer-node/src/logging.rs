//! Tracing setup for the node binary.

use tracing_subscriber::FmtSubscriber;

use crate::settings::LoggingSettings;

pub fn configure(settings: LoggingSettings) {
    let fmt_subscriber = FmtSubscriber::builder()
        .with_ansi(true)
        .with_env_filter(settings.filter)
        .finish();
    // Set the previously created subscriber as the global subscriber
    tracing::subscriber::set_global_default(fmt_subscriber).expect("failed to setup tracing");
    // Redirect normal log messages to the tracing subscriber
    tracing_log::LogTracer::init().unwrap();
}
