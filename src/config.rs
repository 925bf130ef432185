//! Command line and environment configuration.

use crate::application::Settings;
use crate::infrastructure::gateway::GatewayConfig;
use crate::infrastructure::ledger::LedgerConfig;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API with a background reservation sweeper
    Serve {
        #[arg(long, env = "PROPTOKEN_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Seconds between reservation sweeps
        #[arg(long, env = "PROPTOKEN_SWEEP_INTERVAL", default_value_t = 60)]
        sweep_interval: u64,
    },
    /// Release every expired reservation once and print the released ids
    SweepReservations,
    /// Pay out every unpaid row of a dividend distribution
    ProcessDistribution { distribution_id: Uuid },
    /// Write the payout rows of a distribution as CSV to stdout
    ExportPayouts { distribution_id: Uuid },
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "PROPTOKEN_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Minutes a reservation holds its units
    #[arg(long, global = true, env = "PROPTOKEN_RESERVATION_TTL", default_value_t = 15)]
    pub reservation_ttl: i64,

    #[arg(
        long,
        global = true,
        env = "PAYSTACK_BASE_URL",
        default_value = "https://api.paystack.co"
    )]
    pub gateway_url: String,

    #[arg(
        long,
        global = true,
        env = "PAYSTACK_SECRET_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub gateway_secret: String,

    /// Checkout return URL handed to the gateway
    #[arg(long, global = true, env = "PROPTOKEN_CALLBACK_URL")]
    pub callback_url: Option<String>,

    /// Signing relay for ledger writes
    #[arg(
        long,
        global = true,
        env = "LEDGER_RELAY_URL",
        default_value = "http://127.0.0.1:7300"
    )]
    pub ledger_relay_url: String,

    /// Mirror node REST API for ledger reads
    #[arg(
        long,
        global = true,
        env = "LEDGER_MIRROR_URL",
        default_value = "https://testnet.mirrornode.hedera.com"
    )]
    pub mirror_url: String,

    /// Ledger topic for audit events; auditing is off when unset
    #[arg(long, global = true, env = "LEDGER_AUDIT_TOPIC")]
    pub audit_topic: Option<String>,
}

impl Config {
    pub fn settings(&self) -> Settings {
        Settings {
            reservation_ttl: chrono::Duration::minutes(self.reservation_ttl.max(1)),
            callback_url: self.callback_url.clone(),
            audit_topic: self.audit_topic.clone(),
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig::new(self.gateway_url.clone(), self.gateway_secret.clone())
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig::new(self.ledger_relay_url.clone(), self.mirror_url.clone())
    }
}
