use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use erp_dashboard::portal::{Credentials, DashboardService, LogoutOutcome};
use erp_dashboard::{config_from_env, init_tracing};

#[derive(Parser)]
#[command(name = "erp-dashboard")]
#[command(about = "Fetch and normalize an ERP portal student dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a captcha and the session id it is bound to
    Captcha {
        /// Write the data URI here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Sign a session in
    Login {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
        #[arg(long, env = "ERP_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        captcha: String,
    },
    /// Print the dashboard snapshot as JSON
    Dashboard {
        #[arg(long)]
        session: String,
        /// Use an already-saved dashboard page instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Log the session out and drop its cached snapshot
    Logout {
        #[arg(long)]
        session: String,
    },
    /// Remove expired cache entries
    ClearCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = config_from_env().context("failed to load portal config")?;
    let service = DashboardService::from_config(&config)?;

    match cli.command {
        Commands::Captcha { out } => {
            let captcha = service.captcha().await?;
            println!("session: {}", captcha.session_id.as_deref().unwrap_or("-"));
            match out {
                Some(path) => {
                    std::fs::write(&path, &captcha.image_data_uri)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("captcha written to {}", path.display());
                }
                None => println!("{}", captcha.image_data_uri),
            }
        }
        Commands::Login {
            session,
            user,
            password,
            captcha,
        } => {
            let credentials = Credentials {
                user_id: user,
                password,
                captcha,
            };
            let outcome = service.login(&credentials, &session).await?;
            println!("{:?}", outcome);
        }
        Commands::Dashboard { session, html } => {
            let snapshot = match html {
                Some(path) => {
                    let page = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    service.dashboard_from_html(&session, &page).await?
                }
                None => service.dashboard(&session).await?,
            };
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Logout { session } => match service.logout(&session).await? {
            LogoutOutcome::LoggedOut => println!("Logged out successfully."),
            LogoutOutcome::NoActiveSession => println!("No active session or already logged out."),
        },
        Commands::ClearCache => {
            let removed = service.clear_expired().await?;
            println!("Removed {removed} expired cache entries.");
        }
    }

    Ok(())
}
