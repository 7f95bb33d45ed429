//! Property tests for the order ledger and reconciler.
//!
//! Random fill sequences and random price layouts, checked against the
//! lifecycle and reconcile invariants.

use std::collections::BTreeMap;

use etc_client::domain::{Dir, OrderId, OutboundMessage, SymbolPosition};
use etc_client::ledger::OrderLedger;
use etc_client::reconcile::reconcile;
use proptest::prelude::*;
use tokio::sync::mpsc;

fn ledger() -> (OrderLedger, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OrderLedger::new(tx), rx)
}

fn any_dir() -> impl Strategy<Value = Dir> {
    prop_oneof![Just(Dir::Buy), Just(Dir::Sell)]
}

/// Live quantity per price, zero levels left out.
fn live_qty(l: &OrderLedger, symbol: &str, dir: Dir) -> BTreeMap<i64, i64> {
    l.live_orders_by_price(symbol, dir)
        .into_iter()
        .map(|(price, orders)| (price, orders.values().map(|o| o.size).sum()))
        .collect()
}

proptest! {
    /// submit -> ack -> fill x N -> out: remaining size only goes down,
    /// position is the signed sum of fills, the order is gone after out.
    #[test]
    fn fills_shrink_remaining_and_sum_into_position(
        fills in prop::collection::vec(1i64..20, 1..12),
        slack in 0i64..5,
        dir in any_dir(),
        start in -50i64..50,
    ) {
        let (mut l, _rx) = ledger();
        l.on_hello(&[SymbolPosition { symbol: "GS".into(), position: start }]);

        let total: i64 = fills.iter().sum();
        let id = l.submit_order("GS", dir, 5000, total + slack).unwrap();
        prop_assert!(l.on_ack(id));

        let mut remaining = total + slack;
        let mut filled = 0;
        for size in &fills {
            prop_assert!(l.on_fill(id, dir, *size));
            filled += size;
            let now = l.order(id).unwrap().size;
            prop_assert!(now < remaining);
            prop_assert_eq!(now, total + slack - filled);
            prop_assert_eq!(l.position_for("GS"), start + dir.sign() * filled);
            remaining = now;
        }

        prop_assert!(l.on_out(id));
        prop_assert_eq!(l.state_of(id), None);
        prop_assert!(l.live_orders_by_price("GS", dir).is_empty());

        // a late fill changes nothing
        prop_assert!(!l.on_fill(id, dir, 1));
        prop_assert_eq!(l.position_for("GS"), start + dir.sign() * total);
    }

    /// Reconciling to the same target twice is a no-op the second time, and
    /// the live layout matches the target before and after the exchange
    /// confirms everything.
    #[test]
    fn reconcile_reaches_target_and_is_idempotent(
        resting in prop::collection::vec((95i64..105, 1i64..10, any::<bool>()), 0..8),
        target in prop::collection::btree_map(95i64..105, 0i64..20, 0..6),
        dir in any_dir(),
    ) {
        let (mut l, _rx) = ledger();
        for (price, size, acked) in &resting {
            let id = l.submit_order("BOND", dir, *price, *size).unwrap();
            if *acked {
                l.on_ack(id);
            }
        }

        let expected: BTreeMap<i64, i64> = target.iter().filter(|(_, q)| **q > 0).map(|(p, q)| (*p, *q)).collect();

        let report = reconcile(&mut l, "BOND", dir, &target).unwrap();
        prop_assert_eq!(live_qty(&l, "BOND", dir), expected.clone());
        prop_assert!(reconcile(&mut l, "BOND", dir, &target).unwrap().is_noop());

        // exchange acks the adds and takes the cancelled orders out
        for added in &report.added {
            prop_assert!(l.on_ack(added.order_id));
        }
        let cancelled: Vec<OrderId> = report.cancelled.clone();
        for id in cancelled {
            l.on_ack(id);
            prop_assert!(l.on_out(id));
        }
        prop_assert_eq!(l.pending_cancel_count(), 0);
        prop_assert_eq!(live_qty(&l, "BOND", dir), expected);
        prop_assert!(reconcile(&mut l, "BOND", dir, &target).unwrap().is_noop());
    }
}
