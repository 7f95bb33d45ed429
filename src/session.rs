// ===============================
// src/session.rs (receive -> dispatch loop)
// ===============================
//
//   send hello ─> read hello ─> ledger.on_hello ─> strategy.on_startup ─> loop
//
// One task reads and dispatches; every ledger mutation and strategy call
// happens on it, in message order. Outbound messages go through an
// unbounded channel to a writer task that owns the socket's write half, so
// the wire order equals the order the ledger issued them. If the writer
// dies, the session ends with its error.
//
use std::collections::BTreeMap;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::{Args, Limits};
use crate::domain::{Event, InboundMessage, OutboundMessage};
use crate::ledger::OrderLedger;
use crate::recorder;
use crate::strategy::StrategyState;
use crate::transport::{self, ConnectionError, FrameReader, FrameWriter, ProtocolError, ReceiveError, TransportError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<ReceiveError> for SessionError {
    fn from(e: ReceiveError) -> Self {
        match e {
            ReceiveError::Transport(t) => SessionError::Transport(t),
            ReceiveError::Protocol(p) => SessionError::Protocol(p),
        }
    }
}

/// What a cleanly closed session leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub messages: u64,
    pub positions: BTreeMap<String, i64>,
}

enum Flow {
    Continue,
    Close,
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    rec_tx: mpsc::Sender<Event>,
) -> Result<(), TransportError> {
    while let Some(msg) = out_rx.recv().await {
        writer.send(&msg).await?;
        let _ = rec_tx.try_send(recorder::outbound(&msg));
    }
    Ok(())
}

fn writer_exit(joined: Result<Result<(), TransportError>, JoinError>) -> TransportError {
    match joined {
        Ok(Err(e)) => e,
        Ok(Ok(())) => TransportError::WriterGone,
        Err(e) => {
            warn!(?e, "writer task failed");
            TransportError::WriterGone
        }
    }
}

/// A failed ledger send only says the writer is gone. The writer task holds
/// the actual cause, so wait for it and report that instead.
async fn root_cause(
    err: SessionError,
    writer_task: &mut JoinHandle<Result<(), TransportError>>,
    writer_done: &mut bool,
) -> SessionError {
    match err {
        SessionError::Transport(TransportError::WriterGone) if !*writer_done => {
            *writer_done = true;
            writer_exit(writer_task.await).into()
        }
        other => other,
    }
}

fn dispatch(ledger: &mut OrderLedger, strategy: &mut StrategyState, msg: InboundMessage) -> Result<Flow, TransportError> {
    let now = Instant::now();
    match msg {
        InboundMessage::Close { .. } => {
            info!("the round has ended");
            return Ok(Flow::Close);
        }
        InboundMessage::Error { error } => warn!(%error, "exchange error"),
        InboundMessage::Reject { order_id, error } => {
            ledger.on_reject(order_id);
            warn!(order_id, ?error, "order rejected");
        }
        InboundMessage::Fill { order_id, symbol, dir, price, size } => {
            ledger.on_fill(order_id, dir, size);
            strategy.on_fill(&symbol, dir, price, size);
        }
        InboundMessage::Trade { symbol, price, .. } => strategy.on_trade(ledger, &symbol, price, now)?,
        InboundMessage::Ack { order_id } => {
            ledger.on_ack(order_id);
        }
        InboundMessage::Out { order_id } => {
            ledger.on_out(order_id);
        }
        InboundMessage::Book { symbol, buy, sell } => strategy.on_book(ledger, &symbol, &buy, &sell, now)?,
        InboundMessage::Hello { .. } => warn!("hello after session start ignored"),
        InboundMessage::Unknown => debug!("unknown message type ignored"),
    }
    Ok(Flow::Continue)
}

/// Runs one trading session over an already-open stream until `close`.
pub async fn run<R, W>(
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    team: &str,
    mut strategy: StrategyState,
    rec_tx: mpsc::Sender<Event>,
) -> Result<SessionSummary, SessionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let hello = OutboundMessage::Hello { team: team.to_string() };
    writer.send(&hello).await?;
    let _ = rec_tx.try_send(recorder::outbound(&hello));

    let first = reader.receive().await?;
    let _ = rec_tx.try_send(recorder::inbound(&first));
    let InboundMessage::Hello { symbols } = &first else {
        return Err(ProtocolError::ExpectedHello(first.kind()).into());
    };
    info!(?symbols, "first message from exchange");

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(write_loop(writer, out_rx, rec_tx.clone()));
    let mut ledger = OrderLedger::new(out_tx);
    ledger.on_hello(symbols);

    let mut messages: u64 = 1;
    let mut writer_done = false;

    let outcome: Result<(), SessionError> = match strategy.on_startup(&mut ledger) {
        Err(e) => Err(e.into()),
        Ok(()) => loop {
            let received = tokio::select! {
                res = reader.receive() => res,
                joined = &mut writer_task => {
                    writer_done = true;
                    break Err(writer_exit(joined).into());
                }
            };
            let msg = match received {
                Ok(m) => m,
                Err(e) => break Err(e.into()),
            };
            messages += 1;
            let _ = rec_tx.try_send(recorder::inbound(&msg));

            match dispatch(&mut ledger, &mut strategy, msg) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        },
    };

    let outcome = match outcome {
        Err(e) => Err(root_cause(e, &mut writer_task, &mut writer_done).await),
        ok => ok,
    };

    let positions = ledger.positions();
    // drop sender supaya writer menghabiskan antrean lalu selesai
    drop(ledger);

    match outcome {
        Ok(()) => {
            if !writer_done {
                match writer_task.await {
                    Ok(Ok(())) => {}
                    other => warn!(error = %writer_exit(other), "writer failed while draining after close"),
                }
            }
            info!(messages, ?positions, "session closed");
            Ok(SessionSummary { messages, positions })
        }
        Err(e) => {
            if !writer_done {
                writer_task.abort();
            }
            Err(e)
        }
    }
}

/// Connect once and run a session with the configured strategy.
pub async fn connect_and_run(
    args: &Args,
    limits: Limits,
    rec_tx: mpsc::Sender<Event>,
) -> Result<SessionSummary, SessionError> {
    let ex = &args.exchange;
    let conn = transport::connect(&ex.host, ex.port, ex.connect_timeout).await?;
    run(conn.reader, conn.writer, &args.team, StrategyState::new(limits), rec_tx).await
}
