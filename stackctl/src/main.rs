mod cli;
mod session;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use session::{EXIT_CONFIG, EXIT_SOFTWARE, SessionOutcome, SupervisionSession};
use stackctl_core::SessionConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cli::Cli::parse();

    let config = match SessionConfig::load(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    if cli.check {
        // Building the session expands the log globs without launching
        // anything, which is exactly the validation --check promises.
        if let Err(e) = SupervisionSession::build(&config) {
            error!("{e}");
            std::process::exit(EXIT_CONFIG);
        }
        println!("configuration OK: {} unit(s)", config.units.len());
        return;
    }

    let session = match SupervisionSession::build(&config) {
        Ok(session) => session,
        Err(e) => {
            error!("{e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    match session.run().await {
        Ok(SessionOutcome::Signalled(sig)) => reraise(sig),
        Ok(outcome) => {
            let code = outcome.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!("supervision failed: {e}");
            std::process::exit(EXIT_SOFTWARE);
        }
    }
}

/// Die by the same signal that stopped the stack, so the caller observes the
/// conventional 128+signo status rather than a plain exit code.
fn reraise(sig: stackctl_core::Signal) -> ! {
    use nix::sys::signal::{self, SigHandler};

    unsafe {
        let _ = signal::signal(sig, SigHandler::SigDfl);
    }
    let _ = signal::raise(sig);
    // The default disposition should have killed us; keep the observable
    // status if it somehow did not.
    std::process::exit(128 + sig as i32);
}
