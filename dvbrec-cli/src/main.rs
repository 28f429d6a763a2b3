mod cli;
mod schedule;

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use capture_core::{CaptureConfig, CaptureWindow};
use cli::Args;

// Exit codes: 0 capture completed, 1 usage error, 2 invalid
// configuration, 3 fatal error during capture.
const EXIT_USAGE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_FATAL: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_logging(args.verbose, args.quiet);

    let config = match args.to_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("configuration error: {message}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let window = schedule::plan(args.start, args.end);
    run(config, window).await
}

#[cfg(target_os = "linux")]
async fn run(config: CaptureConfig, window: CaptureWindow) -> ExitCode {
    use capture_core::{Session, SessionOutcome};
    use std::sync::Arc;
    use tracing::info;

    let backend = Arc::new(dvb::LinuxBackend);
    let session = Session::new(config, backend);

    // Ctrl-C ends the window early; the session still drains and
    // reports Completed, so an interrupted recording is kept.
    let token = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping capture");
            token.cancel();
        }
    });

    match session.run(window).await {
        SessionOutcome::Completed => ExitCode::SUCCESS,
        SessionOutcome::Fatal => ExitCode::from(EXIT_FATAL),
    }
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: CaptureConfig, _window: CaptureWindow) -> ExitCode {
    eprintln!("configuration error: DVB device capture requires Linux");
    ExitCode::from(EXIT_CONFIG)
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
