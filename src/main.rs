use clap::Parser;
use hrm_osc_bridge::ble::DiscoveryError;
use hrm_osc_bridge::ble::bluer::BluerCentral;
use hrm_osc_bridge::config::{ConfigError, Options, Settings};
use hrm_osc_bridge::output::Publisher;
use hrm_osc_bridge::output::osc::OscPublisher;
use hrm_osc_bridge::session::{self, Disconnect, Outcome, RunError, Timings};
use std::future::Future;
use std::io;
use std::panic::{self, PanicHookInfo};
use std::pin::Pin;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(feature = "bluer"))]
compile_error!("the binary needs the `bluer` feature for Bluetooth access");

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Faults that stop the process before or outside a session.
#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to open OSC socket: {0}")]
    Osc(#[from] io::Error),
    #[error("Bluetooth unavailable: {0}")]
    Bluetooth(#[from] DiscoveryError),
    #[error(transparent)]
    Run(#[from] RunError),
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,hrm_osc_bridge={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves on Ctrl+C. If the handler cannot be installed the run is simply
/// not interruptible.
async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Await `work` unless `shutdown` resolves first.
///
/// Polling `shutdown` here is what installs the Ctrl+C handler, so it is
/// checked before `work` on every wakeup.
async fn unless_interrupted<T, F>(
    work: impl Future<Output = T>,
    shutdown: Pin<&mut F>,
) -> Option<T>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = shutdown => None,
        value = work => Some(value),
    }
}

/// Only a failed connection attempt fails the run. A session that ended on a
/// transport fault has already been logged and released.
fn exit_code(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::NotFound | Outcome::Cancelled | Outcome::Disconnected(_) => EXIT_SUCCESS,
        Outcome::Failed(_) => EXIT_ERROR,
    }
}

/// Resolve settings, open the publisher and the Bluetooth adapter, then run
/// one session.
///
/// The Ctrl+C handler is armed before the adapter is opened, so an interrupt
/// during adapter power-on ends the run as [`Outcome::Cancelled`].
///
/// # Arguments
/// * `options` - Command-line options parsed from user input
///
/// # Errors
/// Returns `StartupError` if the configuration is invalid, the OSC socket
/// cannot be opened, the Bluetooth adapter is unavailable or discovery fails
async fn run(options: Options) -> Result<Outcome, StartupError> {
    let settings = Settings::resolve(&options)?;
    info!(?settings, "configuration");

    let publisher = match &settings.osc_target {
        Some(target) => {
            let publisher = OscPublisher::connect(&target.host, target.port)?;
            info!(destination = %publisher.destination()?, path = %settings.osc_path, "OSC destination");
            Some(publisher)
        }
        None => {
            warn!("OSC destination address and port not set, OSC sending will not be performed");
            None
        }
    };

    let shutdown = interrupted();
    tokio::pin!(shutdown);

    let Some(central) = unless_interrupted(BluerCentral::new(), shutdown.as_mut()).await else {
        return Ok(Outcome::Cancelled);
    };
    let central = central?;

    let outcome = session::run(
        &settings,
        &central,
        publisher.as_ref().map(|p| p as &dyn Publisher),
        &Timings::default(),
        shutdown,
    )
    .await?;

    Ok(outcome)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_logging(options.verbose);

    match run(options).await {
        Ok(outcome) => {
            match &outcome {
                Outcome::NotFound => info!("exiting, no matching device"),
                Outcome::Cancelled | Outcome::Disconnected(Disconnect::Normal) => {
                    info!("program terminated")
                }
                Outcome::Failed(why) => error!(error = %why, "failed to connect"),
                Outcome::Disconnected(Disconnect::Error(why)) => {
                    warn!(error = %why, "session ended by a transport fault")
                }
            }
            std::process::exit(exit_code(&outcome));
        }
        Err(why) => {
            error!(error = %why, "startup failed");
            std::process::exit(EXIT_ERROR);
        }
    }
}
