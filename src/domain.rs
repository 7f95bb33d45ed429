// ===============================
// src/domain.rs
// ===============================
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dir {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Dir {
    pub fn sign(&self) -> i64 { match self { Dir::Buy => 1, Dir::Sell => -1 } }
    pub fn as_str(&self) -> &'static str { match self { Dir::Buy => "BUY", Dir::Sell => "SELL" } }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Dir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Dir::Buy),
            "SELL" => Ok(Dir::Sell),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind { Limit, Convert }

/// Lifecycle of an order still tracked by the ledger. `Removed` is not a
/// variant: removed orders are simply no longer tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState { Unacknowledged, Open, PendingCancel }

/// Snapshot of a tracked order. `size` is the remaining size; `price` is 0 for converts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order { pub symbol: String, pub dir: Dir, pub price: i64, pub size: i64, pub kind: OrderKind }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolPosition { pub symbol: String, pub position: i64 }

/// One `[price, size]` entry of a book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel(pub i64, pub i64);

impl BookLevel {
    pub fn price(&self) -> i64 { self.0 }
    pub fn size(&self) -> i64 { self.1 }
}

/// Everything the exchange can send us, decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Hello { symbols: Vec<SymbolPosition> },
    Ack { order_id: OrderId },
    Fill {
        order_id: OrderId,
        symbol: String,
        dir: Dir,
        #[serde(default)]
        price: i64,
        size: i64,
    },
    Reject {
        order_id: OrderId,
        #[serde(default)]
        error: Option<String>,
    },
    Out { order_id: OrderId },
    Trade { symbol: String, price: i64, size: i64 },
    Book {
        symbol: String,
        #[serde(default)]
        buy: Vec<BookLevel>,
        #[serde(default)]
        sell: Vec<BookLevel>,
    },
    Error {
        #[serde(default)]
        error: String,
    },
    Close {
        #[serde(default)]
        symbols: Vec<String>,
    },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Hello { .. } => "hello",
            InboundMessage::Ack { .. } => "ack",
            InboundMessage::Fill { .. } => "fill",
            InboundMessage::Reject { .. } => "reject",
            InboundMessage::Out { .. } => "out",
            InboundMessage::Trade { .. } => "trade",
            InboundMessage::Book { .. } => "book",
            InboundMessage::Error { .. } => "error",
            InboundMessage::Close { .. } => "close",
            InboundMessage::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Hello { team: String },
    Add { order_id: OrderId, symbol: String, dir: Dir, price: i64, size: i64 },
    Convert { order_id: OrderId, symbol: String, dir: Dir, size: i64 },
    Cancel { order_id: OrderId },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Hello { .. } => "hello",
            OutboundMessage::Add { .. } => "add",
            OutboundMessage::Convert { .. } => "convert",
            OutboundMessage::Cancel { .. } => "cancel",
        }
    }
}

// Recorder events (JSONL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    In { ts_ns: i64, msg: InboundMessage },
    Out { ts_ns: i64, msg: OutboundMessage },
    Note(String),
}
