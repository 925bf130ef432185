use chrono::Utc;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use proptoken::application::Services;
use proptoken::config::{Cli, Command, Config};
use proptoken::domain::ports::{DatabaseRef, LedgerClientRef, PaymentGatewayRef};
use proptoken::infrastructure::gateway::PaystackGateway;
use proptoken::infrastructure::in_memory::InMemoryDatabase;
use proptoken::infrastructure::ledger::HttpLedger;
use proptoken::interfaces::csv::payout_writer::PayoutWriter;
use proptoken::interfaces::http::{AppState, create_router};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn open_database(config: &Config) -> Result<DatabaseRef> {
    match &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            use proptoken::infrastructure::rocksdb::RocksDbDatabase;
            let db = RocksDbDatabase::open(db_path).into_diagnostic()?;
            info!(path = %db_path.display(), "using RocksDB storage");
            Ok(Arc::new(db))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryDatabase::new()))
        }
        None => Ok(Arc::new(InMemoryDatabase::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay machine readable.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("proptoken=info".parse().into_diagnostic()?),
        )
        .init();

    let cli = Cli::parse();
    let db = open_database(&cli.config)?;
    let gateway: PaymentGatewayRef = Arc::new(PaystackGateway::new(cli.config.gateway()));
    let ledger: LedgerClientRef = Arc::new(HttpLedger::new(cli.config.ledger()));
    let services = Services::new(db, gateway, ledger, cli.config.settings());

    match cli.command {
        Command::Serve {
            bind,
            sweep_interval,
        } => {
            tokio::spawn(
                services
                    .reservations
                    .clone()
                    .run_every(Duration::from_secs(sweep_interval.max(1))),
            );
            let app = create_router(AppState::new(services));
            let listener = tokio::net::TcpListener::bind(bind).await.into_diagnostic()?;
            info!(%bind, "serving HTTP API");
            axum::serve(listener, app).await.into_diagnostic()?;
        }
        Command::SweepReservations => {
            let released = services
                .reservations
                .sweep(Utc::now())
                .await
                .into_diagnostic()?;
            info!(count = released.len(), "sweep finished");
            for investment in released {
                println!("{}", investment.id);
            }
        }
        Command::ProcessDistribution { distribution_id } => {
            let distribution = services
                .dividends
                .process_distribution(distribution_id, Utc::now())
                .await
                .into_diagnostic()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&distribution).into_diagnostic()?
            );
        }
        Command::ExportPayouts { distribution_id } => {
            services
                .dividends
                .get(distribution_id)
                .await
                .into_diagnostic()?;
            let payments = services
                .dividends
                .payments(distribution_id)
                .await
                .into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = PayoutWriter::new(stdout.lock());
            writer.write_payments(&payments).into_diagnostic()?;
        }
    }

    Ok(())
}
