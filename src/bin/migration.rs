use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use storefront_orders::{config, db, migrator::Migrator};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "migration", about = "Apply or roll back the storefront schema")]
struct Cli {
    /// Overrides the configured database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Roll back the given number of migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Print applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config()?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg).await?;

    let result = match cli.command.unwrap_or(Command::Up) {
        Command::Up => Migrator::up(&pool, None).await,
        Command::Down { steps } => Migrator::down(&pool, Some(steps)).await,
        Command::Status => Migrator::status(&pool).await,
    };

    match result {
        Ok(()) => {
            info!("Migration command completed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Migration command failed");
            Err(e.into())
        }
    }
}
