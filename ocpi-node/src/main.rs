//! OCPI Node - CLI for the OCPI bootstrap client
//!
//! Discovers a peer's versions and endpoints and runs the credentials
//! handshake. Trust records are kept in a JSON file so later runs can
//! rotate or revoke.
//!
//! # Usage
//!
//! ```bash
//! # List versions advertised by the peer
//! ocpi-node --peer-url https://cpo.example/ocpi/versions --token TOKEN_A versions
//!
//! # Register (Token A -> Token B -> Token C)
//! ocpi-node --peer-url https://cpo.example/ocpi/versions --token TOKEN_A \
//!     --own-url https://emsp.example/ocpi/versions --country NL --party EKM register
//!
//! # Rotate our token with a registered peer
//! ocpi-node --peer-url https://cpo.example/ocpi/versions --state parties.json rotate
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ocpi_client::{
    AccessToken, CallOptions, ClientConfig, CredentialsClient, JsonFilePartyStore, ModuleId,
    OwnPartyConfig, PartyStore, RegisterOptions, RetryPolicy, Role, TracingObserver, VersionId,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

/// OCPI bootstrap client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Peer versions URL
    #[arg(long)]
    peer_url: Url,

    /// Initial token (Token A); ignored once a trust record exists
    #[arg(short, long, default_value = "")]
    token: String,

    /// Our versions URL
    #[arg(long, default_value = "http://localhost:8080/ocpi/versions")]
    own_url: Url,

    /// Our country code
    #[arg(long, default_value = "NL")]
    country: String,

    /// Our party id
    #[arg(long, default_value = "EKM")]
    party: String,

    /// Our business name
    #[arg(long, default_value = "Elektrokombinacija")]
    business_name: String,

    /// Role of the peer
    #[arg(long, default_value = "CPO")]
    remote_role: Role,

    /// Trust record file
    #[arg(long, default_value = "ocpi-parties.json")]
    state: String,

    /// Send tokens base64-encoded
    #[arg(long)]
    base64: bool,

    /// Number of retransmissions per request
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List versions advertised by the peer
    Versions,
    /// Show endpoints of a version
    Detail {
        #[arg(long)]
        version: Option<String>,
    },
    /// Resolve the URL of a module
    Endpoint {
        module: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// GET the credentials the peer holds for us
    Fetch,
    /// Run the registration handshake
    Register {
        #[arg(long)]
        version: Option<String>,
    },
    /// Hand the peer a new token
    Rotate,
    /// Revoke our registration at the peer
    Revoke,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = Arc::new(JsonFilePartyStore::new(&args.state));
    let existing = store
        .list()
        .await?
        .into_iter()
        .find(|p| p.remote_versions_url == args.peer_url);

    // Build configuration
    let own = OwnPartyConfig::new(
        args.own_url.clone(),
        &args.country,
        &args.party,
        &args.business_name,
    );
    let retry = RetryPolicy::default()
        .with_max_retries(args.retries)
        .with_backoff(Duration::from_millis(500), Duration::from_secs(10));
    let mut config = ClientConfig::new(args.peer_url.clone(), args.token.clone(), own)
        .with_remote_role(args.remote_role)
        .with_base64_tokens(args.base64)
        .with_request_timeout(Duration::from_secs(args.timeout))
        .with_retry(retry);

    if let Some(record) = &existing {
        info!("Using trust record for {}", record.key());
        config.peer.initial_token = record.remote_token.clone();
        config = config.with_remote_party(record.key());
    } else if args.token.is_empty() {
        warn!("No trust record for {} and no --token given", args.peer_url);
    }

    let client = CredentialsClient::builder(config)
        .store(store.clone())
        .observer(Arc::new(TracingObserver))
        .build()?;
    if let Some(record) = &existing {
        client.directory().select_version(record.selected_version.clone());
    }

    let call = CallOptions::default();
    match args.command {
        Command::Versions => {
            let versions = client.list_versions(&call).await?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }

        Command::Detail { version } => {
            let version = version.map(VersionId::new);
            let detail = client
                .get_version_detail(version.as_ref(), false, &call)
                .await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }

        Command::Endpoint { module, version } => {
            let version = version.map(VersionId::new);
            let url = client
                .resolve_endpoint_url(&ModuleId::new(module), version.as_ref(), &call)
                .await?;
            println!("{}", url);
        }

        Command::Fetch => {
            let credentials = client.fetch_credentials(None, &call).await?;
            println!(
                "{}*{} {} ({})",
                credentials.country_code,
                credentials.party_id,
                credentials.business_details.name,
                credentials.url
            );
        }

        Command::Register { version } => {
            let mut options = RegisterOptions::default().with_remote_role(args.remote_role);
            if let Some(version) = version {
                options = options.with_version(version.as_str());
            }

            let peer = client.register(options, &call).await?;
            let committed = client
                .last_registration()
                .map_or(false, |r| r.is_registered());
            if !committed {
                warn!("Peer accepted registration but the trust record was not saved");
            }
            println!(
                "Registered with {}*{} ({})",
                peer.country_code, peer.party_id, peer.business_details.name
            );
        }

        Command::Rotate => {
            let token = AccessToken::generate(client.config().own.token_length);
            let credentials = client.own_credentials(token);
            let peer = client.rotate_credentials(&credentials, None, None, &call).await?;
            println!("Rotated credentials with {}*{}", peer.country_code, peer.party_id);
        }

        Command::Revoke => {
            client.revoke_credentials(None, &call).await?;
            println!("Credentials revoked");
        }
    }

    for (operation, tally) in client.counters().snapshot() {
        if tally.succeeded + tally.failed > 0 {
            info!("{}: {} ok, {} failed", operation, tally.succeeded, tally.failed);
        }
    }

    Ok(())
}
