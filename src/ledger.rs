// ===============================
// src/ledger.rs (order lifecycle + positions)
// ===============================
//
// Single source of truth for our own orders and per-symbol positions.
//
//   submit ──> Unacknowledged ──ack──> Open ──out──> (removed)
//                    │                   │
//                    └──reject──> (removed)
//
// PendingCancel is an overlay on Unacknowledged/Open: the id sits in
// `pending_cancels` until the order is finally removed. Orders in that set
// are excluded from `live_orders_by_price` before the exchange confirms
// the cancel (optimistic removal).
//
// Events for ids we no longer track (ack/fill/reject/out racing a removal)
// are dropped silently; they never escalate.
//
use std::collections::BTreeMap;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{Dir, Order, OrderId, OrderKind, OrderState, OutboundMessage, SymbolPosition};
use crate::metrics::{LIVE_ORDERS, POSITION, STALE_EVENTS};
use crate::transport::TransportError;

/// price -> (order id -> order)
pub type PriceLevels = BTreeMap<i64, BTreeMap<OrderId, Order>>;

pub struct OrderLedger {
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
    next_id: OrderId,
    positions: HashMap<String, i64>,
    unacked: HashMap<OrderId, Order>,
    open: HashMap<OrderId, Order>,
    pending_cancels: HashSet<OrderId>,
    greeted: bool,
}

impl OrderLedger {
    /// `out_tx` is the send side of the transport writer.
    pub fn new(out_tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            out_tx,
            next_id: 0,
            positions: HashMap::new(),
            unacked: HashMap::new(),
            open: HashMap::new(),
            pending_cancels: HashSet::new(),
            greeted: false,
        }
    }

    fn send(&self, msg: OutboundMessage) -> Result<(), TransportError> {
        self.out_tx.send(msg).map_err(|_| TransportError::WriterGone)
    }

    fn publish_live(&self) {
        LIVE_ORDERS.set((self.unacked.len() + self.open.len()) as i64);
    }

    /// Ids start at 0 and are never reused for the lifetime of the ledger.
    pub fn next_order_id(&mut self) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn position_for(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn positions(&self) -> BTreeMap<String, i64> {
        self.positions.iter().map(|(s, p)| (s.clone(), *p)).collect()
    }

    pub fn on_hello(&mut self, symbols: &[SymbolPosition]) {
        if self.greeted {
            warn!("duplicate hello ignored");
            return;
        }
        self.greeted = true;
        for sp in symbols {
            self.positions.insert(sp.symbol.clone(), sp.position);
            POSITION.with_label_values(&[sp.symbol.as_str()]).set(sp.position);
        }
        info!(symbols = symbols.len(), "positions initialised from hello");
    }

    /// Records a new limit order as Unacknowledged and sends the add. No
    /// position-limit check here, that is strategy policy.
    pub fn submit_order(&mut self, symbol: &str, dir: Dir, price: i64, size: i64) -> Result<OrderId, TransportError> {
        let order_id = self.next_order_id();
        self.unacked.insert(
            order_id,
            Order { symbol: symbol.to_string(), dir, price, size, kind: OrderKind::Limit },
        );
        self.publish_live();
        debug!(order_id, %symbol, %dir, price, size, "submit add");
        self.send(OutboundMessage::Add { order_id, symbol: symbol.to_string(), dir, price, size })?;
        Ok(order_id)
    }

    /// Caller supplies the id, normally from `next_order_id`.
    pub fn submit_conversion(&mut self, order_id: OrderId, symbol: &str, dir: Dir, size: i64) -> Result<(), TransportError> {
        self.unacked.insert(
            order_id,
            Order { symbol: symbol.to_string(), dir, price: 0, size, kind: OrderKind::Convert },
        );
        self.publish_live();
        debug!(order_id, %symbol, %dir, size, "submit convert");
        self.send(OutboundMessage::Convert { order_id, symbol: symbol.to_string(), dir, size })
    }

    /// Marks the order pending-cancel and sends the cancel. Calling twice sends
    /// two cancels but the ledger state is unchanged by the second call.
    pub fn cancel_order(&mut self, order_id: OrderId) -> Result<(), TransportError> {
        if self.unacked.contains_key(&order_id) || self.open.contains_key(&order_id) {
            self.pending_cancels.insert(order_id);
        } else {
            debug!(order_id, "cancel for untracked order, sending anyway");
        }
        self.send(OutboundMessage::Cancel { order_id })
    }

    /// Unacknowledged -> Open. Returns false for stale ids.
    pub fn on_ack(&mut self, order_id: OrderId) -> bool {
        match self.unacked.remove(&order_id) {
            Some(order) => {
                self.open.insert(order_id, order);
                true
            }
            None => {
                STALE_EVENTS.with_label_values(&["ack"]).inc();
                debug!(order_id, "ack for untracked order");
                false
            }
        }
    }

    /// Applies a fill to an Open order and its symbol's position, together.
    /// Returns false (and changes nothing) when the order is not Open.
    pub fn on_fill(&mut self, order_id: OrderId, dir: Dir, size: i64) -> bool {
        let Some(order) = self.open.get_mut(&order_id) else {
            STALE_EVENTS.with_label_values(&["fill"]).inc();
            debug!(order_id, size, "fill for untracked order dropped");
            return false;
        };

        if size > order.size {
            warn!(order_id, size, remaining = order.size, "fill larger than remaining size");
        }
        order.size = (order.size - size).max(0);
        let remaining = order.size;
        let symbol = order.symbol.clone();

        let pos = self.positions.entry(symbol.clone()).or_insert(0);
        *pos += dir.sign() * size;
        POSITION.with_label_values(&[symbol.as_str()]).set(*pos);

        info!(order_id, %symbol, %dir, size, remaining, position = *pos, "fill");
        true
    }

    /// Drops an Unacknowledged order. Returns false for anything else.
    pub fn on_reject(&mut self, order_id: OrderId) -> bool {
        if self.unacked.remove(&order_id).is_some() {
            self.pending_cancels.remove(&order_id);
            self.publish_live();
            true
        } else {
            STALE_EVENTS.with_label_values(&["reject"]).inc();
            false
        }
    }

    /// Terminal transition for Open orders (filled out, cancelled or expired).
    pub fn on_out(&mut self, order_id: OrderId) -> bool {
        if self.open.remove(&order_id).is_some() {
            self.pending_cancels.remove(&order_id);
            self.publish_live();
            true
        } else {
            STALE_EVENTS.with_label_values(&["out"]).inc();
            debug!(order_id, "out for untracked order");
            false
        }
    }

    pub fn state_of(&self, order_id: OrderId) -> Option<OrderState> {
        let tracked = self.unacked.contains_key(&order_id) || self.open.contains_key(&order_id);
        if !tracked {
            None
        } else if self.pending_cancels.contains(&order_id) {
            Some(OrderState::PendingCancel)
        } else if self.open.contains_key(&order_id) {
            Some(OrderState::Open)
        } else {
            Some(OrderState::Unacknowledged)
        }
    }

    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.open.get(&order_id).or_else(|| self.unacked.get(&order_id)).cloned()
    }

    pub fn live_order_count(&self) -> usize {
        self.open
            .keys()
            .chain(self.unacked.keys())
            .filter(|id| !self.pending_cancels.contains(*id))
            .count()
    }

    /// Ids with a cancel in flight that the ledger still tracks.
    pub fn pending_cancel_count(&self) -> usize {
        self.pending_cancels.len()
    }

    /// Current layout for one symbol/direction: Unacknowledged and Open orders,
    /// minus anything pending cancel, grouped by price.
    pub fn live_orders_by_price(&self, symbol: &str, dir: Dir) -> PriceLevels {
        let mut out = PriceLevels::new();
        for (id, order) in self.open.iter().chain(self.unacked.iter()) {
            if order.symbol == symbol && order.dir == dir && !self.pending_cancels.contains(id) {
                out.entry(order.price).or_default().insert(*id, order.clone());
            }
        }
        out
    }
}
