//! CLI for the Mercure hub
//!
//! Subcommands:
//! - `serve`: run the hub (the default when no subcommand is given)
//! - `generate-jwt`: print a token signed with the configured key
//! - `debug-config`: print the resolved configuration

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mercure_hub::config::{Settings, load_config};
use mercure_hub::security::Claim;
use mercure_hub::security::jwt::sign;
use mercure_hub::server::Hub;
use mercure_hub::utils::error::{HubError, HubResult};
use mercure_hub::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mercure-hub", version, about = "A Mercure publish/subscribe hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the hub
    Serve(ServeArgs),
    /// Print a signed token for publishers and/or subscribers
    GenerateJwt(GenerateJwtArgs),
    /// Print the resolved configuration, secrets masked
    DebugConfig,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Listen address, e.g. 0.0.0.0:3000
    #[arg(long)]
    addr: Option<String>,
    #[arg(long)]
    transport_url: Option<String>,
    #[arg(long)]
    storage_url: Option<String>,
    #[arg(long)]
    metrics_url: Option<String>,
    /// Key used to verify both publisher and subscriber tokens
    #[arg(long)]
    jwt_key: Option<String>,
    #[arg(long)]
    jwt_algorithm: Option<String>,
    /// Accept subscribers without a token
    #[arg(long)]
    allow_anonymous: bool,
    /// Enable subscription events and the subscriptions API
    #[arg(long)]
    subscriptions: bool,
    #[arg(long)]
    cors_allowed_origins: Option<String>,
    #[arg(long)]
    publish_allowed_origins: Option<String>,
    #[arg(long)]
    log_level: Option<String>,
}

impl ServeArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(addr) = self.addr {
            settings.server.addr = addr;
        }
        if let Some(url) = self.transport_url {
            settings.hub.transport_url = url;
        }
        if self.storage_url.is_some() {
            settings.hub.storage_url = self.storage_url;
        }
        if self.metrics_url.is_some() {
            settings.hub.metrics_url = self.metrics_url;
        }
        if self.jwt_key.is_some() {
            settings.jwt.key = self.jwt_key;
        }
        if let Some(algorithm) = self.jwt_algorithm {
            settings.jwt.algorithm = algorithm;
        }
        if self.allow_anonymous {
            settings.hub.allow_anonymous = true;
        }
        if self.subscriptions {
            settings.hub.subscriptions = true;
        }
        if let Some(origins) = self.cors_allowed_origins {
            settings.server.cors_allowed_origins = origins;
        }
        if let Some(origins) = self.publish_allowed_origins {
            settings.server.publish_allowed_origins = origins;
        }
        if let Some(level) = self.log_level {
            settings.server.log_level = level;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Publisher,
    Subscriber,
    Both,
}

#[derive(Args)]
struct GenerateJwtArgs {
    #[arg(long, value_enum, default_value = "both")]
    target: Target,
    /// Topic selector the token may publish to (repeatable, defaults to `*`)
    #[arg(long)]
    publish: Vec<String>,
    #[arg(long)]
    publish_exclude: Vec<String>,
    /// Topic selector the token may subscribe to (repeatable, defaults to `*`)
    #[arg(long)]
    subscribe: Vec<String>,
    #[arg(long)]
    subscribe_exclude: Vec<String>,
    /// Lifetime in seconds; the token never expires when omitted
    #[arg(long)]
    ttl: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            args.apply(&mut settings);
            logging::init(&settings.server.log_level);
            run_server(settings).await
        }
        Command::GenerateJwt(args) => generate_jwt(&settings, args).map(|token| println!("{token}")),
        Command::DebugConfig => {
            print_config(&settings);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(settings: Settings) -> HubResult<()> {
    let mut hub = Hub::new(settings);
    let signal = hub.run().await?;
    info!("Hub stopped ({:?})", signal);
    Ok(())
}

fn generate_jwt(settings: &Settings, args: GenerateJwtArgs) -> HubResult<String> {
    let publisher = matches!(args.target, Target::Publisher | Target::Both);
    let subscriber = matches!(args.target, Target::Subscriber | Target::Both);
    let or_wildcard = |selectors: Vec<String>| {
        if selectors.is_empty() {
            vec!["*".to_string()]
        } else {
            selectors
        }
    };

    let claim = Claim {
        publish: publisher.then(|| or_wildcard(args.publish)),
        publish_exclude: args.publish_exclude,
        subscribe: subscriber.then(|| or_wildcard(args.subscribe)),
        subscribe_exclude: args.subscribe_exclude,
        payload: None,
    };

    let jwt = &settings.jwt;
    let (key, algorithm) = if args.target == Target::Subscriber {
        (jwt.subscriber_key(), jwt.subscriber_algorithm())
    } else {
        (jwt.publisher_key(), jwt.publisher_algorithm())
    };
    let key = key.ok_or_else(|| HubError::Config("no JWT key is configured".to_string()))?;
    sign(&claim, key, algorithm, args.ttl)
}

fn mask(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "********",
        None => "(unset)",
    }
}

fn print_config(settings: &Settings) {
    let hub = &settings.hub;
    let jwt = &settings.jwt;
    let rows = [
        ("server.addr", settings.server.addr.clone()),
        ("server.cors_allowed_origins", settings.server.cors_allowed_origins.clone()),
        ("server.publish_allowed_origins", settings.server.publish_allowed_origins.clone()),
        ("server.log_level", settings.server.log_level.clone()),
        ("hub.transport_url", hub.transport_url.clone()),
        ("hub.storage_url", hub.storage_dsn().to_string()),
        ("hub.metrics_url", hub.metrics_dsn().to_string()),
        ("hub.allow_anonymous", hub.allow_anonymous.to_string()),
        ("hub.subscriptions", hub.subscriptions.to_string()),
        ("jwt.publisher_key", mask(jwt.publisher_key()).to_string()),
        ("jwt.publisher_algorithm", jwt.publisher_algorithm().to_string()),
        ("jwt.subscriber_key", mask(jwt.subscriber_key()).to_string()),
        ("jwt.subscriber_algorithm", jwt.subscriber_algorithm().to_string()),
    ];

    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in rows {
        println!("{name:<width$}  {value}");
    }
}
