use std::process::ExitCode;

use gator_core::{storage, Command, FeedFetcher, GatorError, Registry, Session, State};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run() -> Result<(), GatorError> {
    let session = Session::load()?;
    debug!(path = %session.path().display(), "loaded config");

    let registry = Registry::builtin();

    let store = storage::open(&session.config().db_url)
        .await
        .map_err(GatorError::persistence("open database"))?;
    let fetcher =
        FeedFetcher::new(session.config().max_body_bytes()).map_err(GatorError::HttpClient)?;

    let command = Command::from_args(std::env::args().skip(1)).ok_or(GatorError::MissingCommand)?;

    let mut state = State::new(session, store, fetcher);
    registry
        .dispatch_until(&mut state, &command, ctrl_c())
        .await
}

/// Resolves on the first Ctrl-C. If the handler cannot be installed the
/// default signal behaviour stays in place, so this never resolves.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("interrupt received"),
        Err(e) => {
            debug!(error = %e, "unable to listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}
