// ===============================
// src/reconcile.rs
// ===============================
//
// Moves the live layout for one symbol/direction toward a target layout
// (price -> desired quantity) using only the ledger's public operations.
//
// Per price level in (desired ∪ current):
//   current == desired -> nothing
//   current <  desired -> one add for the difference, existing orders untouched
//   current >  desired -> cancel every live order at the level, then one add
//                         for the full desired quantity if it is non-zero
//
// Shrinking a level to a non-zero size leaves a short gap with nothing
// resting there, since the wire protocol has no partial cancel.
//
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::{Dir, OrderId};
use crate::ledger::OrderLedger;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Added { pub order_id: OrderId, pub price: i64, pub size: i64 }

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cancelled: Vec<OrderId>,
    pub added: Vec<Added>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool { self.cancelled.is_empty() && self.added.is_empty() }
}

/// Panics if any desired quantity is negative.
pub fn reconcile(
    ledger: &mut OrderLedger,
    symbol: &str,
    dir: Dir,
    desired: &BTreeMap<i64, i64>,
) -> Result<ReconcileReport, TransportError> {
    let current = ledger.live_orders_by_price(symbol, dir);
    let levels: BTreeSet<i64> = desired.keys().chain(current.keys()).copied().collect();
    let mut report = ReconcileReport::default();

    for price in levels {
        let orders = current.get(&price);
        let current_qty: i64 = orders.map(|o| o.values().map(|ord| ord.size).sum()).unwrap_or(0);
        let desired_qty = desired.get(&price).copied().unwrap_or(0);
        assert!(desired_qty >= 0, "desired quantity at {price} is negative: {desired_qty}");

        if current_qty == desired_qty {
            continue;
        }

        if current_qty < desired_qty {
            let size = desired_qty - current_qty;
            let order_id = ledger.submit_order(symbol, dir, price, size)?;
            report.added.push(Added { order_id, price, size });
            continue;
        }

        // all-or-nothing at this level
        for order_id in orders.into_iter().flat_map(|o| o.keys()) {
            ledger.cancel_order(*order_id)?;
            report.cancelled.push(*order_id);
        }
        if desired_qty != 0 {
            let order_id = ledger.submit_order(symbol, dir, price, desired_qty)?;
            report.added.push(Added { order_id, price, size: desired_qty });
        }
    }

    if !report.is_noop() {
        debug!(%symbol, %dir, cancelled = report.cancelled.len(), added = report.added.len(), "reconciled");
    }
    Ok(report)
}
