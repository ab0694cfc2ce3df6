//! Joins a workspace, sends a ping, and logs everything that happens until
//! Ctrl-C or until the session ends.
//!
//! ```text
//! workspace-echo <server-uri> <access-code> [credential]
//! ```
//!
//! `HWORKSPACE_URI`, `HWORKSPACE_CODE` and `HWORKSPACE_TOKEN` fill in any
//! missing argument. Log verbosity follows `RUST_LOG` (default `info`).

use hworkspace::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    server_uri: String,
    access_code: String,
    credential: Option<String>,
}

impl Args {
    fn parse(
        mut args: impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let server_uri = args
            .next()
            .or_else(|| env("HWORKSPACE_URI"))
            .ok_or("missing server URI (argument 1 or HWORKSPACE_URI)")?;
        let access_code = args
            .next()
            .or_else(|| env("HWORKSPACE_CODE"))
            .ok_or("missing access code (argument 2 or HWORKSPACE_CODE)")?;
        let credential = args.next().or_else(|| env("HWORKSPACE_TOKEN"));

        Ok(Self {
            server_uri,
            access_code,
            credential,
        })
    }
}

// ---------------------------------------------------------------------------
// Echo session
// ---------------------------------------------------------------------------

/// Runs one session until `shutdown` resolves or the session terminates.
async fn run(args: Args, shutdown: impl Future<Output = ()>) -> Result<(), ClientError> {
    let builder = ClientBuilder::new(&args.server_uri);
    let mut client = match args.credential {
        Some(credential) => builder.authenticated(credential, &args.access_code)?,
        None => builder.anonymous(&args.access_code)?,
    };
    let mut events = client.subscribe();

    client
        .connect(|message: Value| tracing::info!(%message, "message received"))
        .await?;
    client.send_message(json!({ "type": "ping" }))?;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                client.disconnect();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Terminated { reason }) => {
                    tracing::info!(?reason, "session terminated");
                    return Ok(());
                }
                Ok(event) => tracing::info!(?event, writable = client.is_writable(), "session event"),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event subscriber lagged"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse(std::env::args().skip(1), |key| std::env::var(key).ok())?;
    tracing::info!(server = %args.server_uri, "starting workspace-echo");

    run(args, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
