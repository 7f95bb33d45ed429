// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : etc_client — line-delimited JSON client for an ETC exchange simulator
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Connects to the exchange over TCP, tracks our own orders and
          positions through ack/fill/out/reject, reconciles resting order
          layouts, runs the bond / market-making / arbitrage strategies,
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use clap::{ArgGroup, Parser, ValueEnum};
use dotenvy::dotenv;
use thiserror::Error;

pub const DEFAULT_TEAM: &str = "MANKEY";
const PRODUCTION_HOST: &str = "production";
const PRODUCTION_PORT: u16 = 25000;
const TEST_BASE_PORT: u16 = 22000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Test exchanges, each on its own port offset.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestExchange {
    ProdLike,
    Slower,
    Empty,
}

impl TestExchange {
    fn port_offset(self) -> u16 {
        match self {
            TestExchange::ProdLike => 0,
            TestExchange::Slower => 1,
            TestExchange::Empty => 2,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "etc_client", about = "Trade on an ETC exchange!")]
#[command(group(
    ArgGroup::new("exchange")
        .required(true)
        .args(["production", "test", "specific_address"])
))]
pub struct Cli {
    /// Connect to the production exchange.
    #[arg(long)]
    pub production: bool,

    /// Connect to a test exchange.
    #[arg(long, value_enum)]
    pub test: Option<TestExchange>,

    #[arg(long, value_name = "HOST:PORT", hide = true)]
    pub specific_address: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid address {0:?}, expected HOST:PORT")]
    Address(String),
    #[error("no exchange selected")]
    NoExchange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub team: String,
    pub exchange: Exchange,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16, // 0 = off
}

#[derive(Clone, Debug)]
pub struct Limits {
    pub position_limits: HashMap<String, i64>,
    pub default_position_limit: i64,
    pub order_cooldown: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        let position_limits = [
            ("BOND", 100),
            ("XLF", 100),
            ("WFC", 100),
            ("GS", 100),
            ("MS", 100),
            ("VALE", 10),
            ("VALBZ", 10),
        ]
        .into_iter()
        .map(|(s, l)| (s.to_string(), l))
        .collect();
        Self { position_limits, default_position_limit: 100, order_cooldown: Duration::from_millis(100) }
    }
}

impl Limits {
    pub fn position_limit(&self, symbol: &str) -> i64 {
        self.position_limits.get(symbol).copied().unwrap_or(self.default_position_limit)
    }
}

/// Map the CLI selection onto a concrete host/port. `team` is already upper-cased.
pub fn resolve_exchange(cli: &Cli, team: &str) -> Result<Exchange, ConfigError> {
    if cli.production {
        return Ok(Exchange {
            host: PRODUCTION_HOST.to_string(),
            port: PRODUCTION_PORT,
            connect_timeout: Some(CONNECT_TIMEOUT),
        });
    }
    if let Some(test) = cli.test {
        // exchange "empty" bisa diam lama, jangan pakai timeout
        let connect_timeout = (test != TestExchange::Empty).then_some(CONNECT_TIMEOUT);
        return Ok(Exchange {
            host: format!("test-exch-{team}"),
            port: TEST_BASE_PORT + test.port_offset(),
            connect_timeout,
        });
    }
    if let Some(addr) = &cli.specific_address {
        let (host, port) = addr.rsplit_once(':').ok_or_else(|| ConfigError::Address(addr.clone()))?;
        let port = port.parse().map_err(|_| ConfigError::Address(addr.clone()))?;
        if host.is_empty() {
            return Err(ConfigError::Address(addr.clone()));
        }
        return Ok(Exchange { host: host.to_string(), port, connect_timeout: Some(CONNECT_TIMEOUT) });
    }
    Err(ConfigError::NoExchange)
}

pub fn load() -> Result<(Args, Limits), ConfigError> {
    // Pastikan .env dibaca (TEAM_NAME, RECORD_FILE, dll)
    let _ = dotenv();
    let cli = Cli::parse();

    let team = env::var("TEAM_NAME")
        .ok()
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TEAM.to_string());
    let exchange = resolve_exchange(&cli, &team)?;

    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.is_empty());
    let metrics_port = env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(0);

    let mut limits = Limits::default();
    if let Some(ms) = env::var("ORDER_COOLDOWN_MS").ok().and_then(|s| s.parse().ok()) {
        limits.order_cooldown = Duration::from_millis(ms);
    }

    let args = Args { team, exchange, record_file, metrics_port };
    Ok((args, limits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("etc_client").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn production_target() {
        let ex = resolve_exchange(&parse(&["--production"]), "MANKEY").unwrap();
        assert_eq!(ex, Exchange { host: "production".into(), port: 25000, connect_timeout: Some(CONNECT_TIMEOUT) });
    }

    #[test]
    fn test_targets_use_team_host_and_offsets() {
        let slower = resolve_exchange(&parse(&["--test", "slower"]), "MANKEY").unwrap();
        assert_eq!(slower.host, "test-exch-MANKEY");
        assert_eq!(slower.port, 22001);

        let empty = resolve_exchange(&parse(&["--test", "empty"]), "MANKEY").unwrap();
        assert_eq!(empty.port, 22002);
        assert_eq!(empty.connect_timeout, None);

        let prod_like = resolve_exchange(&parse(&["--test", "prod-like"]), "MANKEY").unwrap();
        assert_eq!(prod_like.port, 22000);
    }

    #[test]
    fn specific_address_is_split() {
        let ex = resolve_exchange(&parse(&["--specific-address", "127.0.0.1:9000"]), "X").unwrap();
        assert_eq!((ex.host.as_str(), ex.port), ("127.0.0.1", 9000));

        let bad = resolve_exchange(&parse(&["--specific-address", "nohost"]), "X");
        assert_eq!(bad, Err(ConfigError::Address("nohost".into())));
    }

    #[test]
    fn exchange_selection_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["etc_client"]).is_err());
        assert!(Cli::try_parse_from(["etc_client", "--production", "--test", "empty"]).is_err());
    }

    #[test]
    fn default_limits() {
        let l = Limits::default();
        assert_eq!(l.position_limit("VALBZ"), 10);
        assert_eq!(l.position_limit("BOND"), 100);
        assert_eq!(l.position_limit("ZZZ"), 100);
    }
}
