// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Wire traffic --------
pub static MESSAGES_IN: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("exchange_messages_in_total", "inbound messages by type"), &["type"]).unwrap()
});

pub static MESSAGES_OUT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("exchange_messages_out_total", "outbound messages by type"), &["type"]).unwrap()
});

pub static RATE_ADVISORIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("send_rate_advisories_total", "500 sends inside 1s detected").unwrap()
});

// -------- Ledger --------
pub static POSITION: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("position", "net position per symbol"), &["symbol"]).unwrap()
});

pub static LIVE_ORDERS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("live_orders", "unacked + open orders tracked").unwrap());

pub static STALE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stale_order_events_total", "events for order ids no longer tracked"),
        &["type"],
    )
    .unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(MESSAGES_IN.clone())),
        REGISTRY.register(Box::new(MESSAGES_OUT.clone())),
        REGISTRY.register(Box::new(RATE_ADVISORIES.clone())),
        REGISTRY.register(Box::new(POSITION.clone())),
        REGISTRY.register(Box::new(LIVE_ORDERS.clone())),
        REGISTRY.register(Box::new(STALE_EVENTS.clone())),
    ] {
        // AlreadyReg is fine (init dipanggil lebih dari sekali di test)
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_names_registered_families() {
        init();
        MESSAGES_OUT.with_label_values(&["add"]).inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("exchange_messages_out_total"));
    }
}
