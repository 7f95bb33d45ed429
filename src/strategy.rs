// ===============================
// src/strategy.rs
// ===============================
//
// Strategy callbacks, all state explicit in `StrategyState`:
// 1) Startup      : rest a BOND bid (999 x 10) via reconcile
// 2) Bond MR      : lean position back toward flat, 1 lot at 999 / 1001
// 3) Market making: quote around the last-5-trades average
//                   XLF spread 3, WFC/GS/MS spread 1
// 4) VALE/VALBZ   : VALE rich vs VALBZ by > 30 -> buy VALBZ, convert, sell VALE
//                   (traded leg's own cooldown first, then VALE_ARB)
// 5) XLF basket   : 10·XLF + fee < 3·BOND + 2·GS + 3·MS + 2·WFC -> convert XLF out
//
// Every add goes through the position-limit check in risk.rs. Cooldowns are
// keyed per symbol (or per arbitrage name) and consumed on the attempt.
//
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use ahash::AHashMap as HashMap;
use tracing::{debug, info};

use crate::config::Limits;
use crate::domain::{BookLevel, Dir, OrderId};
use crate::ledger::OrderLedger;
use crate::reconcile::reconcile;
use crate::risk::{check_position_limit, Cooldown};
use crate::transport::TransportError;

const HISTORY_LEN: usize = 5;
const MIN_SAMPLES: usize = 3;
const TRACKED: [&str; 6] = ["XLF", "WFC", "GS", "MS", "VALE", "VALBZ"];

const BOND_FAIR: i64 = 1000;
const BOND_BAND: i64 = 5;

const VALE_ARB_THRESHOLD: f64 = 30.0;
const XLF_CONVERSION_FEE: i64 = 100;
const XLF_MAX_CONVERT: i64 = 10;
/// Components of 10 XLF.
const XLF_BASKET: [(&str, i64); 4] = [("BOND", 3), ("GS", 2), ("MS", 3), ("WFC", 2)];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quote {
    pub bid: Option<i64>,
    pub ask: Option<i64>,
}

pub struct StrategyState {
    limits: Limits,
    cooldown: Cooldown,
    history: HashMap<String, VecDeque<i64>>,
    quotes: HashMap<String, Quote>,
}

impl StrategyState {
    pub fn new(limits: Limits) -> Self {
        let history = TRACKED.iter().map(|s| (s.to_string(), VecDeque::with_capacity(HISTORY_LEN))).collect();
        Self { cooldown: Cooldown::new(limits.order_cooldown), limits, history, quotes: HashMap::new() }
    }

    fn record_trade(&mut self, symbol: &str, price: i64) {
        if let Some(win) = self.history.get_mut(symbol) {
            if win.len() == HISTORY_LEN {
                win.pop_front();
            }
            win.push_back(price);
        }
    }

    /// `None` until at least three trades were seen (or for untracked symbols).
    pub fn moving_average(&self, symbol: &str) -> Option<f64> {
        let win = self.history.get(symbol)?;
        if win.len() < MIN_SAMPLES {
            return None;
        }
        Some(win.iter().sum::<i64>() as f64 / win.len() as f64)
    }

    pub fn quote(&self, symbol: &str) -> Quote {
        self.quotes.get(symbol).copied().unwrap_or_default()
    }

    /// Limit-checked add. Ok(None) when the limit would be breached.
    fn place(
        &self,
        ledger: &mut OrderLedger,
        symbol: &str,
        dir: Dir,
        price: i64,
        size: i64,
    ) -> Result<Option<OrderId>, TransportError> {
        if let Err(e) = check_position_limit(ledger, &self.limits, symbol, dir, size) {
            debug!(reason = %e, "order skipped");
            return Ok(None);
        }
        ledger.submit_order(symbol, dir, price, size).map(Some)
    }

    pub fn on_startup(&mut self, ledger: &mut OrderLedger) -> Result<(), TransportError> {
        let target = BTreeMap::from([(BOND_FAIR - 1, 10)]);
        let report = reconcile(ledger, "BOND", Dir::Buy, &target)?;
        info!(added = report.added.len(), "startup bond bid placed");
        Ok(())
    }

    pub fn on_trade(&mut self, ledger: &mut OrderLedger, symbol: &str, price: i64, now: Instant) -> Result<(), TransportError> {
        self.record_trade(symbol, price);
        match symbol {
            "BOND" => self.bond_mean_reversion(ledger, now),
            "XLF" => self.make_market(ledger, symbol, 3, now),
            "WFC" | "GS" | "MS" => self.make_market(ledger, symbol, 1, now),
            "VALE" | "VALBZ" => self.vale_arbitrage(ledger, symbol, now),
            _ => Ok(()),
        }
    }

    fn bond_mean_reversion(&mut self, ledger: &mut OrderLedger, now: Instant) -> Result<(), TransportError> {
        if self.cooldown.try_acquire("BOND", now).is_err() {
            return Ok(());
        }
        let pos = ledger.position_for("BOND");
        if pos < -BOND_BAND {
            self.place(ledger, "BOND", Dir::Buy, BOND_FAIR - 1, 1)?;
        } else if pos > BOND_BAND {
            self.place(ledger, "BOND", Dir::Sell, BOND_FAIR + 1, 1)?;
        }
        Ok(())
    }

    fn make_market(&mut self, ledger: &mut OrderLedger, symbol: &str, spread: i64, now: Instant) -> Result<(), TransportError> {
        let Some(avg) = self.moving_average(symbol) else { return Ok(()) };
        if self.cooldown.try_acquire(symbol, now).is_err() {
            return Ok(());
        }
        let avg = avg as i64;
        self.place(ledger, symbol, Dir::Buy, avg - spread, 1)?;
        self.place(ledger, symbol, Dir::Sell, avg + spread, 1)?;
        Ok(())
    }

    fn vale_arbitrage(&mut self, ledger: &mut OrderLedger, symbol: &str, now: Instant) -> Result<(), TransportError> {
        // the traded leg has to pass its own cooldown before the arbitrage one
        if self.moving_average(symbol).is_none() || self.cooldown.try_acquire(symbol, now).is_err() {
            return Ok(());
        }
        let (Some(vale), Some(valbz)) = (self.moving_average("VALE"), self.moving_average("VALBZ")) else {
            return Ok(());
        };
        if vale - valbz <= VALE_ARB_THRESHOLD || self.cooldown.try_acquire("VALE_ARB", now).is_err() {
            return Ok(());
        }
        if self.place(ledger, "VALBZ", Dir::Buy, valbz as i64, 1)?.is_none() {
            return Ok(());
        }
        info!(vale, valbz, "VALE/VALBZ arbitrage");
        let id = ledger.next_order_id();
        ledger.submit_conversion(id, "VALBZ", Dir::Sell, 1)?;
        self.place(ledger, "VALE", Dir::Sell, (vale - 5.0) as i64, 1)?;
        Ok(())
    }

    pub fn on_book(
        &mut self,
        ledger: &mut OrderLedger,
        symbol: &str,
        buy: &[BookLevel],
        sell: &[BookLevel],
        now: Instant,
    ) -> Result<(), TransportError> {
        // level pertama = harga terbaik
        let quote = Quote { bid: buy.first().map(BookLevel::price), ask: sell.first().map(BookLevel::price) };
        self.quotes.insert(symbol.to_string(), quote);

        if symbol == "XLF" {
            self.xlf_basket_arbitrage(ledger, now)?;
        }
        Ok(())
    }

    fn xlf_basket_arbitrage(&mut self, ledger: &mut OrderLedger, now: Instant) -> Result<(), TransportError> {
        let Some(xlf_bid) = self.quote("XLF").bid else { return Ok(()) };
        let mut basket_value = 0;
        let mut component_bids = Vec::with_capacity(XLF_BASKET.len());
        for (component, weight) in XLF_BASKET {
            let Some(bid) = self.quote(component).bid else { return Ok(()) };
            basket_value += weight * bid;
            component_bids.push((component, weight, bid));
        }

        if xlf_bid * 10 + XLF_CONVERSION_FEE >= basket_value {
            return Ok(());
        }
        let holdings = ledger.position_for("XLF");
        if holdings <= 0 || self.cooldown.try_acquire("XLF_ARB", now).is_err() {
            return Ok(());
        }

        info!(xlf_bid, basket_value, holdings, "XLF basket arbitrage");
        let id = ledger.next_order_id();
        ledger.submit_conversion(id, "XLF", Dir::Sell, holdings.min(XLF_MAX_CONVERT))?;
        for (component, weight, bid) in component_bids {
            self.place(ledger, component, Dir::Sell, bid, weight)?;
        }
        Ok(())
    }

    pub fn on_fill(&mut self, symbol: &str, dir: Dir, price: i64, size: i64) {
        debug!(%symbol, %dir, price, size, avg = ?self.moving_average(symbol), "strategy saw fill");
    }
}
