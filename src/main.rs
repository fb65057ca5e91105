use std::process;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};
use w2v_trainer::Run;

fn main() {

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    if let Err(e) = Run::run() {
        error!("{}", e);
        process::exit(1);
    }
}
