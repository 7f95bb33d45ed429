// ===============================
// src/risk.rs
// ===============================
//
// Pre-trade policy used by the strategy layer. The ledger itself never
// checks limits.
//
use std::time::{Duration, Instant};

use ahash::AHashMap as HashMap;
use thiserror::Error;

use crate::config::Limits;
use crate::domain::Dir;
use crate::ledger::OrderLedger;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RiskError {
    #[error("position limit for {symbol}: position {position} {dir} {size} breaches ±{limit}")]
    PositionLimit { symbol: String, dir: Dir, size: i64, position: i64, limit: i64 },
    #[error("cooldown active for {0}")]
    Cooldown(String),
}

/// Would `size` more in `dir` keep |position| within the symbol's limit?
pub fn check_position_limit(
    ledger: &OrderLedger,
    limits: &Limits,
    symbol: &str,
    dir: Dir,
    size: i64,
) -> Result<(), RiskError> {
    let position = ledger.position_for(symbol);
    let limit = limits.position_limit(symbol);
    let ok = match dir {
        Dir::Buy => position + size <= limit,
        Dir::Sell => position - size >= -limit,
    };
    if ok {
        Ok(())
    } else {
        Err(RiskError::PositionLimit { symbol: symbol.to_string(), dir, size, position, limit })
    }
}

/// Throttle per key (symbol, atau nama strategi seperti "VALE_ARB").
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    last: HashMap<String, Instant>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self { Self { interval, last: HashMap::new() } }

    /// First call for a key always passes. A passing call restarts the key's clock.
    pub fn try_acquire(&mut self, key: &str, now: Instant) -> Result<(), RiskError> {
        match self.last.get(key) {
            Some(prev) if now.duration_since(*prev) < self.interval => Err(RiskError::Cooldown(key.to_string())),
            _ => {
                self.last.insert(key.to_string(), now);
                Ok(())
            }
        }
    }
}
