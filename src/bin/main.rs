use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use drink_service::auth::{
    DEFAULT_AUTHORIZATION_TIMEOUT_MS, DEFAULT_CACHE_TTL_SECONDS, DEFAULT_JWKS_TIMEOUT_MS,
    KeyDirectory,
};
use drink_service::{AuthConfig, create_app};
use jsonwebtoken::Algorithm;
use std::str::FromStr;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drink-service")]
#[command(about = "Drink menu REST backend with bearer-token authorization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST server
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, env = "DRINKS_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Fetch the authority's JWKS once and print the usable key ids
    CheckKeys {
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args)]
struct AuthArgs {
    /// Authority domain, e.g. tenant.eu.auth0.com
    #[arg(long, env = "DRINKS_AUTH_DOMAIN")]
    domain: String,
    /// Expected token audience
    #[arg(long, env = "DRINKS_API_AUDIENCE")]
    audience: String,
    /// Accepted signing algorithms, comma-separated
    #[arg(
        long,
        env = "DRINKS_AUTH_ALGORITHMS",
        value_delimiter = ',',
        default_value = "RS256",
        value_parser = parse_algorithm
    )]
    algorithms: Vec<Algorithm>,
    /// Override the JWKS URL (defaults to https://<domain>/.well-known/jwks.json)
    #[arg(long, env = "DRINKS_JWKS_URL")]
    jwks_url: Option<String>,
    /// Override the expected issuer (defaults to https://<domain>/)
    #[arg(long, env = "DRINKS_AUTH_ISSUER")]
    issuer: Option<String>,
    #[arg(long, env = "DRINKS_JWKS_CACHE_SECONDS", default_value_t = DEFAULT_CACHE_TTL_SECONDS)]
    jwks_cache_seconds: u64,
    #[arg(long, env = "DRINKS_JWKS_TIMEOUT_MS", default_value_t = DEFAULT_JWKS_TIMEOUT_MS)]
    jwks_timeout_ms: u64,
    #[arg(
        long,
        env = "DRINKS_AUTHORIZATION_TIMEOUT_MS",
        default_value_t = DEFAULT_AUTHORIZATION_TIMEOUT_MS
    )]
    authorization_timeout_ms: u64,
    /// Clock skew tolerated on exp and nbf
    #[arg(long, env = "DRINKS_AUTH_LEEWAY_SECONDS", default_value_t = 0)]
    leeway_seconds: u64,
    /// Keep serving cached keys for a while if the JWKS endpoint fails
    #[arg(long, env = "DRINKS_ALLOW_STALE_JWKS", default_value_t = false)]
    allow_stale_jwks: bool,
}

impl AuthArgs {
    fn into_config(self) -> AuthConfig {
        let mut config = AuthConfig::for_domain(self.domain, self.audience)
            .with_algorithms(self.algorithms);
        if let Some(url) = self.jwks_url {
            config = config.with_jwks_url(url);
        }
        if let Some(issuer) = self.issuer {
            config = config.with_issuer(issuer);
        }
        config.jwks_cache_seconds = self.jwks_cache_seconds;
        config.jwks_timeout_ms = self.jwks_timeout_ms;
        config.authorization_timeout_ms = self.authorization_timeout_ms;
        config.leeway_seconds = self.leeway_seconds;
        config.allow_stale_jwks = self.allow_stale_jwks;
        config
    }
}

fn parse_algorithm(value: &str) -> Result<Algorithm, String> {
    Algorithm::from_str(value.trim()).map_err(|_| format!("unknown algorithm '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("drink_service=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, auth } => {
            let config = auth.into_config();
            info!(
                "Authorizing tokens from issuer {} for audience {}",
                config.issuer(),
                config.audience
            );
            info!("Signing keys from {}", config.jwks_url());

            let app = create_app(&config)?;
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Drink service listening on http://{}", bind);

            axum::serve(listener, app).await?;
        }
        Commands::CheckKeys { auth } => {
            let config = auth.into_config();
            config.validate()?;
            let directory = KeyDirectory::from_config(&config)?;

            let keys = directory.fetch().await?;
            println!("JWKS: {}", directory.jwks_url());
            println!("Found {} signing keys:", keys.len());
            for kid in keys.key_ids() {
                if let Some(key) = keys.get(kid.as_str()) {
                    let alg = key
                        .algorithm()
                        .map(|a| format!("{:?}", a))
                        .unwrap_or_else(|| "-".to_string());
                    println!("  {:<40} {:<8} {:?}", kid.as_str(), alg, key.family());
                }
            }
        }
    }

    Ok(())
}
