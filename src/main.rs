//! Caro Consulting portal: HTTP server plus local administration commands.

use anyhow::Context;
use caro_portal::auth::AuthService;
use caro_portal::backend::Backend;
use caro_portal::config::PortalConfig;
use caro_portal::facades::{ClientDirectory, SiteContentStore};
use caro_portal::logging::init_tracing;
use caro_portal::models::{CreateClientPayload, UserRole};
use caro_portal::session::SessionContext;
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "caro-portal")]
#[command(about = "Client portal for Caro Consulting")]
#[command(version)]
struct Args {
    /// Config file (TOML or YAML). Defaults to `portal.*` in the working directory.
    #[arg(short, long, global = true, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the site and API (default).
    Serve,
    /// Register a login.
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_USER_PASSWORD")]
        password: String,
        /// Grant admin-panel access instead of a tenant login.
        #[arg(long)]
        operator: bool,
    },
    /// Create a tenant, optionally linked to an existing login.
    CreateClient {
        #[arg(long)]
        name: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        service_level: Option<String>,
        /// Subscription end date, YYYY-MM-DD.
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Email of the member login that owns this tenant.
        #[arg(long)]
        user_email: Option<String>,
    },
    /// Write every site-content key as one JSON object.
    ExportContent {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upsert every top-level key of a JSON file.
    ImportContent { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = PortalConfig::load(args.config.as_deref())?;
    init_tracing(&config.log_dir()).map_err(anyhow::Error::msg)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => caro_portal::run(config).await,
        Command::CreateUser {
            email,
            password,
            operator,
        } => {
            let backend = Backend::open(&config)?;
            let auth = AuthService::new(backend.shared_db(), Duration::hours(i64::from(config.session_ttl_hours)));
            let role = if operator { UserRole::Operator } else { UserRole::Member };
            let user = auth.register(&email, &password, role)?;
            println!("{} {} ({})", user.id, user.email, role.as_str());
            Ok(())
        }
        Command::CreateClient {
            name,
            status,
            service_level,
            end_date,
            user_email,
        } => {
            let backend = Backend::open(&config)?;
            let auth_user_id = match user_email {
                Some(email) => {
                    let (user, _) = backend
                        .db()
                        .find_user_by_email(&email.trim().to_lowercase())?
                        .with_context(|| format!("no login registered for {}", email))?;
                    Some(user.id)
                }
                None => None,
            };
            let directory = ClientDirectory::new(backend, SessionContext::maintenance());
            let client = directory.create(CreateClientPayload {
                company_name: name,
                subscription_status: status,
                service_level,
                subscription_end_date: end_date,
                auth_user_id,
            })?;
            println!("{} {}", client.id, client.company_name);
            Ok(())
        }
        Command::ExportContent { output } => {
            let backend = Backend::open(&config)?;
            let exported = SiteContentStore::new(backend, SessionContext::maintenance()).export_all()?;
            let json = serde_json::to_string_pretty(&exported)?;
            match output {
                Some(path) => std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", json),
            }
            Ok(())
        }
        Command::ImportContent { file } => {
            let backend = Backend::open(&config)?;
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let outcome = SiteContentStore::new(backend, SessionContext::maintenance()).import_all(&raw)?;
            for key in &outcome.succeeded {
                println!("imported {}", key);
            }
            for failure in &outcome.failed {
                eprintln!("failed {}: {}", failure.item, failure.error);
            }
            if outcome.is_complete() {
                Ok(())
            } else {
                anyhow::bail!("{} content keys failed to import", outcome.failed.len())
            }
        }
    }
}
