use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{error_body, GatewayError};
use crate::upstream_client::TransportError;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// SSE comment line: content-free, safe to interleave between events.
pub const HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";

/// One frame on the wire to the client. `Data` preserves upstream chunk
/// boundaries; `End` and `Error` are terminal and occur exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Heartbeat,
    Data(Bytes),
    End,
    Error(String),
}

/// Multiplexes upstream chunks and heartbeat ticks onto a single frame
/// channel whose consumer is the lone writer to the client.
///
/// The select loop is the single-writer discipline: at any instant exactly
/// one of {upstream read, heartbeat tick, deadline} produces the next
/// frame, and a data chunk is sent whole or not at all. Breaking the loop
/// drops `upstream_rx`, which cancels the upstream pump; a failed send
/// means the client is gone and has the same effect.
pub fn spawn_relay(
    mut upstream_rx: mpsc::Receiver<Result<Bytes, TransportError>>,
    deadline: Instant,
) -> mpsc::Receiver<RelayFrame> {
    let (tx, rx) = mpsc::channel::<RelayFrame>(32);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate tick; the first heartbeat follows the interval.
        ticker.tick().await;
        let deadline_sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline_sleep);

        loop {
            tokio::select! {
                maybe_chunk = upstream_rx.recv() => {
                    match maybe_chunk {
                        Some(Ok(chunk)) => {
                            if tx.send(RelayFrame::Data(chunk)).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            let _ = tx.send(RelayFrame::Error(err.message)).await;
                            break;
                        }
                        None => {
                            let _ = tx.send(RelayFrame::End).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(RelayFrame::Heartbeat).await.is_err() {
                        break;
                    }
                }
                _ = &mut deadline_sleep => {
                    let _ = tx
                        .send(RelayFrame::Error(GatewayError::DeadlineExceeded.to_string()))
                        .await;
                    break;
                }
            }
        }
    });
    rx
}

/// Channel pre-loaded with a single buffered payload, for the non-streaming
/// model-listing case. The relay's timer still runs defensively over it.
pub fn buffered_source(payload: Bytes) -> mpsc::Receiver<Result<Bytes, TransportError>> {
    let (tx, rx) = mpsc::channel(1);
    // Capacity 1 and an immediately dropped sender: the payload is followed
    // by end-of-stream.
    let _ = tx.try_send(Ok(payload));
    rx
}

/// Encodes frames for the client body. The byte stream ends when the frame
/// channel closes, which the relay task does exactly once, right after the
/// terminal frame.
pub fn frame_byte_stream(
    rx: mpsc::Receiver<RelayFrame>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    ReceiverStream::new(rx).filter_map(|frame| async move {
        match frame {
            RelayFrame::Heartbeat => Some(Ok(Bytes::from_static(HEARTBEAT_FRAME))),
            RelayFrame::Data(chunk) => Some(Ok(chunk)),
            RelayFrame::End => None,
            RelayFrame::Error(reason) => Some(Ok(Bytes::from(error_body(&reason)))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream_client::TransportErrorKind;

    fn upstream_channel() -> (
        mpsc::Sender<Result<Bytes, TransportError>>,
        mpsc::Receiver<Result<Bytes, TransportError>>,
    ) {
        mpsc::channel(16)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(10 * 60)
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_flow_while_upstream_is_silent() {
        let (_tx, upstream_rx) = upstream_channel();
        let mut frames = spawn_relay(upstream_rx, far_deadline());

        for _ in 0..3 {
            assert_eq!(frames.recv().await, Some(RelayFrame::Heartbeat));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn data_chunks_arrive_whole_and_in_order() {
        let (tx, upstream_rx) = upstream_channel();
        let mut frames = spawn_relay(upstream_rx, far_deadline());

        tx.send(Ok(Bytes::from_static(b"data: hello "))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"data: world"))).await.unwrap();
        drop(tx);

        let mut reassembled = Vec::new();
        let mut terminal = None;
        while let Some(frame) = frames.recv().await {
            match frame {
                RelayFrame::Data(chunk) => reassembled.extend_from_slice(&chunk),
                RelayFrame::Heartbeat => {}
                other => {
                    terminal = Some(other);
                    break;
                }
            }
        }
        assert_eq!(reassembled, b"data: hello data: world");
        assert_eq!(terminal, Some(RelayFrame::End));
        // Closed exactly once: nothing after the terminal frame.
        assert_eq!(frames.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_error_yields_one_error_frame_then_close() {
        let (tx, upstream_rx) = upstream_channel();
        let mut frames = spawn_relay(upstream_rx, far_deadline());

        tx.send(Err(TransportError {
            kind: TransportErrorKind::Connect,
            message: "connection reset".to_string(),
        }))
        .await
        .unwrap();

        loop {
            match frames.recv().await {
                Some(RelayFrame::Heartbeat) => {}
                Some(RelayFrame::Error(reason)) => {
                    assert_eq!(reason, "connection reset");
                    break;
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(frames.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upstream_is_cut_exactly_at_the_deadline() {
        let (tx, upstream_rx) = upstream_channel();
        let deadline = Instant::now() + Duration::from_secs(10 * 60);
        let mut frames = spawn_relay(upstream_rx, deadline);

        let mut heartbeats = 0u32;
        let terminal = loop {
            match frames.recv().await {
                Some(RelayFrame::Heartbeat) => heartbeats += 1,
                Some(other) => break other,
                None => panic!("stream closed without a terminal frame"),
            }
        };
        assert_eq!(
            terminal,
            RelayFrame::Error(GatewayError::DeadlineExceeded.to_string())
        );
        // Not earlier: the full ten minutes of heartbeats came through first.
        assert!(heartbeats >= 599, "only {heartbeats} heartbeats before cut");
        assert!(Instant::now() >= deadline);
        assert_eq!(frames.recv().await, None);
        // The upstream read was cancelled with the relay.
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn client_disconnect_cancels_the_upstream_read() {
        let (tx, upstream_rx) = upstream_channel();
        let frames = spawn_relay(upstream_rx, far_deadline());
        drop(frames);

        // The relay notices the dropped consumer on its next frame and
        // releases the upstream receiver. The send itself may already fail
        // if a heartbeat tick got there first.
        let _ = tx.send(Ok(Bytes::from_static(b"chunk"))).await;
        tokio::task::yield_now().await;
        let mut closed = false;
        for _ in 0..10 {
            if tx.is_closed() {
                closed = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(closed, "upstream channel still open after client disconnect");
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_source_emits_payload_then_end() {
        let rx = buffered_source(Bytes::from_static(b"{\"object\":\"list\"}"));
        let mut frames = spawn_relay(rx, far_deadline());

        let mut data = Vec::new();
        loop {
            match frames.recv().await {
                Some(RelayFrame::Heartbeat) => {}
                Some(RelayFrame::Data(chunk)) => data.extend_from_slice(&chunk),
                Some(RelayFrame::End) => break,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(data, b"{\"object\":\"list\"}");
    }
}
