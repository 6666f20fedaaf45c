//! Token-management CLI: the operator control surface for provisioning
//! providers and workers against the `users` table.
//!
//! `add` mints a fresh request token and prints both the raw token and its
//! Basic-auth-ready form, `remove` is idempotent (silently succeeds if the
//! name was never registered), `list` prints every user sorted by name.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use banyan_core::identity::{authorization_key, make_token};
use banyan_db::config::DbConfig;
use banyan_db::models::Role;
use banyan_db::pool;
use banyan_db::queries::users;

#[derive(Parser)]
#[command(name = "banyan-access", about = "Manage provider/worker access tokens")]
struct Cli {
    /// Database URL (overrides BANYAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Provider,
    Worker,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Provider => Role::Provider,
            RoleArg::Worker => Role::Worker,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new provider or worker and print its access token
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: RoleArg,
    },
    /// Remove a user by name (a no-op if the name is unknown)
    Remove {
        #[arg(long)]
        name: String,
    },
    /// List every registered user
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_config = match cli.database_url {
        Some(url) => DbConfig::new(url),
        None => DbConfig::from_env(),
    };
    let db_pool = pool::create_pool(&db_config).await?;

    let result = run(&cli.command, &db_pool).await;
    db_pool.close().await;
    result
}

async fn run(command: &Commands, pool: &sqlx::PgPool) -> Result<()> {
    match command {
        Commands::Add { name, role } => {
            let token = make_token();
            let role: Role = (*role).into();
            match users::insert_user(pool, name, role, &token, None).await {
                Ok(_) => {
                    println!("name:              {name}");
                    println!("role:              {role}");
                    println!("token:             {token}");
                    println!("authorization key: {}", authorization_key(&token));
                }
                Err(err) => {
                    eprintln!("failed to add user '{name}': {err:#}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Remove { name } => {
            users::delete_user(pool, name).await?;
            println!("user '{name}' removed (if it existed).");
        }
        Commands::List => {
            for user in users::list_users(pool).await? {
                println!(
                    "{:36}  {:9}  {}",
                    user.name,
                    user.role.to_string(),
                    authorization_key(&user.request_token)
                );
            }
        }
    }
    Ok(())
}
