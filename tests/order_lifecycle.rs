use std::collections::BTreeMap;

use etc_client::domain::{Dir, OrderState, OutboundMessage, SymbolPosition};
use etc_client::ledger::OrderLedger;
use etc_client::reconcile::reconcile;
use tokio::sync::mpsc;

fn ledger() -> (OrderLedger, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OrderLedger::new(tx), rx)
}

#[test]
fn xlf_buy_partially_filled_then_out() {
    let (mut l, mut rx) = ledger();
    l.on_hello(&[SymbolPosition { symbol: "XLF".into(), position: 0 }]);
    assert_eq!(l.position_for("XLF"), 0);

    let id = l.submit_order("XLF", Dir::Buy, 50, 10).unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        OutboundMessage::Add { order_id: id, symbol: "XLF".into(), dir: Dir::Buy, price: 50, size: 10 }
    );

    assert!(l.on_ack(id));
    assert_eq!(l.state_of(id), Some(OrderState::Open));

    l.on_fill(id, Dir::Buy, 4);
    assert_eq!(l.position_for("XLF"), 4);
    assert_eq!(l.order(id).unwrap().size, 6);

    l.on_fill(id, Dir::Buy, 6);
    assert!(l.on_out(id));

    assert_eq!(l.state_of(id), None);
    assert!(l.live_orders_by_price("XLF", Dir::Buy).is_empty());
    assert_eq!(l.position_for("XLF"), 10);

    // late fill for the removed order
    assert!(!l.on_fill(id, Dir::Buy, 6));
    assert_eq!(l.position_for("XLF"), 10);
}

#[test]
fn reconcile_then_exchange_confirms_cancel() {
    let (mut l, mut rx) = ledger();
    let first = reconcile(&mut l, "BOND", Dir::Sell, &BTreeMap::from([(1001, 5)])).unwrap();
    let old = first.added[0].order_id;
    l.on_ack(old);

    let second = reconcile(&mut l, "BOND", Dir::Sell, &BTreeMap::from([(1001, 2)])).unwrap();
    assert_eq!(second.cancelled, vec![old]);
    let new = second.added[0].order_id;
    assert!(new > old);

    // exchange: cancel confirmed, replacement acked
    assert!(l.on_out(old));
    assert!(l.on_ack(new));

    let levels = l.live_orders_by_price("BOND", Dir::Sell);
    assert_eq!(levels[&1001].keys().copied().collect::<Vec<_>>(), vec![new]);

    let third = reconcile(&mut l, "BOND", Dir::Sell, &BTreeMap::from([(1001, 2)])).unwrap();
    assert!(third.is_noop());

    let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|m| m.kind()).collect();
    assert_eq!(kinds, vec!["add", "cancel", "add"]);
}
