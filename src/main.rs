use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use yahoo_oauth::config::load_config;
use yahoo_oauth::{ClientConfig, OAuthClient, TokenState};

#[derive(Parser)]
#[command(name = "yahoo-oauth", about = "Yahoo OAuth 2.0 Client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file with client settings (environment variables take precedence).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the authorization URL
    AuthorizationUrl,
    /// Exchange authorization code for access token
    ExchangeCode {
        /// Authorization code
        code: String,
    },
    /// Get user information
    GetUserinfo,
    /// Revoke the grant
    RevokeGrant,
    /// Show whether the stored token is valid or expired
    TokenStatus,
    /// Refresh the stored access token now
    RefreshToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("yahoo_oauth={}", cli.log_level).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let file = match &cli.config {
        Some(path) => Some(
            load_config(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
        ),
        None => None,
    };
    let config = ClientConfig::from_env(file).context("Invalid configuration")?;

    info!(
        token_file = %config.token_file.display(),
        info_file = %config.info_file.display(),
        api_base_url = %config.api_base_url,
        "Configuration loaded"
    );

    let client = OAuthClient::new(config).context("Failed to initialize HTTP client")?;

    match cli.command {
        Commands::AuthorizationUrl => {
            let request = client.authorization_url();
            debug!(state = %request.state, "Generated anti-forgery state");
            println!("Authorization URL: {}", request.url);
        }
        Commands::ExchangeCode { code } => {
            let token = client
                .exchange_code(&code)
                .await
                .context("Failed to exchange authorization code")?;
            println!("Token: {}", serde_json::to_string(&token)?);
        }
        Commands::GetUserinfo => {
            let userinfo = client
                .get_user_info()
                .await
                .context("Failed to get user info")?;
            println!("User Info: {}", serde_json::to_string(&userinfo)?);
        }
        Commands::RevokeGrant => {
            let revoked = client
                .revoke_grant()
                .await
                .context("Failed to revoke grant")?;
            println!("Revoke Grant Success: {}", revoked);
        }
        Commands::TokenStatus => {
            let state = client.token_state().context("Failed to read token")?;
            match state.record().and_then(|token| token.expires_at) {
                Some(expires_at) => println!(
                    "Token Status: {} (expires at {})",
                    state.label(),
                    expires_at.to_rfc3339()
                ),
                None => println!("Token Status: {}", state.label()),
            }
            if matches!(state, TokenState::Stale(_)) {
                info!("Run `refresh-token` or any authenticated command to refresh");
            }
        }
        Commands::RefreshToken => {
            let token = client
                .refresh_stored()
                .await
                .context("Failed to refresh token")?;
            println!("Token: {}", serde_json::to_string(&token)?);
        }
    }

    Ok(())
}
