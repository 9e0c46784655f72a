//! Integration tests for vdplink.
//!
//! These tests exercise the full path: frames serialized by the codec,
//! pushed through the streaming parser, and routed by the engine over a
//! mock transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use vdplink::protocol::{command, Frame, FrameBuffer, ParseOutcome, ResponseStatus};
use vdplink::transport::MockTransport;
use vdplink::ProtocolEngine;

fn request(ecu: u8, cmd: u8, data: &[u8]) -> Frame {
    Frame::from_parts(ecu, cmd, data)
}

/// Round-trip: everything the serializer emits, the parser accepts,
/// across the payload size range and sentinel-heavy payloads.
#[test]
fn test_serialize_parse_roundtrip() {
    let payloads: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x00],
        vec![0x7E, 0x7F],
        (0..=246).collect(),
        vec![0x7E; 100],
    ];

    for payload in payloads {
        let frame = request(0x12, command::WRITE_DATA, &payload);
        let wire = frame.serialize().unwrap();

        let mut parser = FrameBuffer::new();
        parser.feed(&wire);
        let outcomes = parser.extract();

        assert_eq!(outcomes.len(), 1, "payload len {}", payload.len());
        match &outcomes[0] {
            ParseOutcome::Success { frame: parsed, raw } => {
                assert_eq!(parsed, &frame);
                assert_eq!(&raw[..], &wire[..]);
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }
}

/// A well-formed frame behind arbitrary garbage is always recovered
/// once enough of the stream has arrived. The trailing padding flushes
/// prefixes whose bytes masquerade as a long frame header (a stray 0x7E
/// makes the parser wait for the phantom frame it announces).
#[test]
fn test_resynchronization_across_garbage() {
    let frame = request(0x01, command::READ_DATA, &[0xAA]);
    let wire = frame.serialize().unwrap();

    let prefixes: Vec<Vec<u8>> = vec![
        vec![0xDE, 0xAD, 0xBE, 0xEF],
        vec![0x7E],                   // lone start sentinel
        vec![0x7E, 0x06, 0x01],       // plausible header, wrong body
        vec![0x7F, 0x7F, 0x7F],
        vec![0x7E, 0x00],             // bad length
    ];

    for prefix in prefixes {
        let mut parser = FrameBuffer::with_max_buffered(4096);
        let mut stream = prefix.clone();
        stream.extend_from_slice(&wire);
        stream.extend_from_slice(&[0u8; 253]);
        parser.feed(&stream);

        let outcomes = parser.extract();
        let successes: Vec<_> = outcomes
            .iter()
            .filter_map(|o| o.frame())
            .collect();
        assert_eq!(successes.len(), 1, "prefix {prefix:?}");
        assert_eq!(successes[0], &frame, "prefix {prefix:?}");
    }
}

/// Feeding a multi-frame stream in every chunking produces the same
/// substantive outcomes as feeding it whole.
#[test]
fn test_streaming_invariance() {
    let mut stream = Vec::new();
    for i in 0..5u8 {
        let frame = request(i + 1, command::WRITE_DATA, &[i, i ^ 0xFF]);
        stream.extend_from_slice(&frame.serialize().unwrap());
    }

    let whole = {
        let mut parser = FrameBuffer::new();
        parser.feed(&stream);
        parser.extract()
    };
    assert_eq!(whole.len(), 5);

    for chunk_size in 1..=stream.len() {
        let mut parser = FrameBuffer::new();
        let mut outcomes = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            parser.feed(chunk);
            outcomes.extend(parser.extract());
        }
        outcomes.retain(|o| !matches!(o, ParseOutcome::Incomplete { .. }));
        assert_eq!(outcomes, whole, "chunk size {chunk_size}");
    }
}

/// Request, scripted response, and NAK flows through the engine.
#[tokio::test]
async fn test_engine_request_response_cycle() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    // Peer answers the read with a success status and two data bytes.
    let response = request(0x81, command::READ_DATA, &[0x00, 0x12, 0x34]);
    transport.queue_response(&response.serialize().unwrap());

    let outcome = engine
        .send_and_wait(
            request(0x01, command::READ_DATA, &[]),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    let frame = outcome.frame().expect("should carry the response frame");
    assert_eq!(frame.ecu_id, 0x81);
    assert_eq!(frame.data(), &[0x00, 0x12, 0x34]);
    assert_eq!(engine.pending_count(), 0);
}

/// A NAK from the peer resolves the pending request with its reason.
#[tokio::test]
async fn test_engine_nak_cycle() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let seq = engine
        .send(
            request(0x03, command::ECU_RESET, &[]),
            move |outcome| {
                assert!(matches!(
                    outcome,
                    ParseOutcome::Nack {
                        reason: ResponseStatus::InvalidData,
                        ..
                    }
                ));
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();

    let nak = Frame::nak(0x03, seq, ResponseStatus::InvalidData);
    transport.inject(&nak.serialize().unwrap());

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(engine.pending_count(), 0);
}

/// Fragmented delivery: a response split into single bytes still
/// completes the transaction.
#[tokio::test]
async fn test_engine_fragmented_response() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    engine
        .send(
            request(0x05, command::CLEAR_CODES, &[]),
            move |outcome| {
                assert!(outcome.is_success());
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();

    let response = request(0x85, command::CLEAR_CODES, &[0x00]);
    for byte in response.serialize().unwrap() {
        transport.inject(&[byte]);
    }

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Corrupted traffic between two healthy frames: the first and the
/// recovery frame both route; the corruption never reaches a handler.
#[tokio::test]
async fn test_engine_survives_corrupt_interleaving() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    let outcomes = Arc::new(Mutex::new(Vec::new()));

    for ecu in [0x01u8, 0x02] {
        let sink = outcomes.clone();
        engine
            .send(
                request(ecu, command::READ_DATA, &[]),
                move |outcome| sink.lock().unwrap().push(outcome),
                None,
            )
            .unwrap();
    }

    let first = request(0x81, command::READ_DATA, &[0x00]);
    let second = request(0x82, command::READ_DATA, &[0x00]);

    let mut stream = first.serialize().unwrap();
    stream.extend_from_slice(&[0x7E, 0x06, 0x99, 0x99, 0x99, 0x99]); // broken frame
    stream.extend_from_slice(&[0x11, 0x22, 0x33]); // line noise
    stream.extend_from_slice(&second.serialize().unwrap());
    transport.inject(&stream);

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(engine.pending_count(), 0);
}

/// Timeouts and live requests coexist: only the expired entry fires.
#[tokio::test]
async fn test_engine_mixed_timeout_and_response() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    let timed_out = Arc::new(AtomicUsize::new(0));
    let answered = Arc::new(AtomicUsize::new(0));

    let counter = timed_out.clone();
    engine
        .send(
            request(0x01, command::READ_DATA, &[]),
            move |outcome| {
                assert_eq!(outcome, ParseOutcome::Timeout);
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Some(Duration::from_millis(10)),
        )
        .unwrap();

    let counter = answered.clone();
    engine
        .send(
            request(0x02, command::WRITE_DATA, &[0x01]),
            move |outcome| {
                assert!(outcome.is_success());
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Some(Duration::from_secs(5)),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = request(0x82, command::WRITE_DATA, &[0x00]);
    transport.inject(&response.serialize().unwrap());

    assert_eq!(timed_out.load(Ordering::SeqCst), 1);
    assert_eq!(answered.load(Ordering::SeqCst), 1);
    assert_eq!(engine.pending_count(), 0);
}

/// The engine loops its own request back through a loopback transport.
/// Matching ignores the response bit (data frames carry no direction
/// marker beyond the ECU high bit), so the echo resolves the request it
/// mirrors; the unsolicited sink stays quiet.
#[tokio::test]
async fn test_engine_loopback_resolves_own_echo() {
    let transport = Arc::new(MockTransport::loopback());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let engine = ProtocolEngine::builder(transport.clone())
        .on_unsolicited(move |frame| sink.lock().unwrap().push(frame))
        .connect("mock")
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let sent = request(0x07, command::WRITE_DATA, &[0x55]);
    let expected = sent.clone();
    engine
        .send(
            sent,
            move |outcome| {
                assert_eq!(outcome.frame(), Some(&expected));
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(engine.pending_count(), 0);
    assert!(seen.lock().unwrap().is_empty());
}

/// Engine-level byte conservation: every injected valid frame routes
/// exactly once even when duplicated.
#[tokio::test]
async fn test_engine_duplicate_response_routes_once() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    engine
        .send(
            request(0x01, command::READ_DATA, &[]),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();

    let response = request(0x81, command::READ_DATA, &[0x00]).serialize().unwrap();
    transport.inject(&response);
    transport.inject(&response); // duplicate becomes unsolicited, dropped

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Concurrent sends, intake, and timeout sweeps from independent OS
/// threads against one shared engine: every request resolves exactly
/// once, none are lost, none are duplicated.
#[test]
fn test_concurrent_threads_share_one_engine() {
    const THREADS: usize = 5;
    const PER_THREAD: usize = 20;

    let transport = Arc::new(MockTransport::new());
    let engine = Arc::new(
        ProtocolEngine::builder(transport.clone())
            .connect("mock")
            .unwrap(),
    );

    let resolved = Arc::new(Mutex::new(Vec::new()));

    // Each ECU id is used by exactly one request, so each response can
    // match exactly one entry and duplication is observable.
    let mut senders = Vec::new();
    for t in 0..THREADS {
        let engine = engine.clone();
        let resolved = resolved.clone();
        senders.push(std::thread::spawn(move || {
            for i in 0..PER_THREAD {
                let ecu = (t * PER_THREAD + i + 1) as u8;
                let sink = resolved.clone();
                engine
                    .send(
                        Frame::new(ecu, command::READ_DATA, Bytes::new()),
                        move |outcome| {
                            assert!(outcome.is_success());
                            sink.lock()
                                .unwrap()
                                .push(outcome.frame().unwrap().request_ecu());
                        },
                        Some(Duration::from_secs(10)),
                    )
                    .unwrap();
            }
        }));
    }

    // A sweeper races the senders. Nothing is due for 10 seconds, so it
    // must never complete an entry.
    let sweep_engine = engine.clone();
    let sweeper = std::thread::spawn(move || {
        for _ in 0..100 {
            sweep_engine.check_timeouts();
            std::thread::yield_now();
        }
    });

    for handle in senders {
        handle.join().unwrap();
    }
    sweeper.join().unwrap();
    assert_eq!(engine.pending_count(), THREADS * PER_THREAD);
    assert!(resolved.lock().unwrap().is_empty());

    // Answer every request from several intake threads at once. Each
    // inject delivers one whole frame into the shared parser.
    let mut responders = Vec::new();
    for t in 0..THREADS {
        let transport = transport.clone();
        responders.push(std::thread::spawn(move || {
            for i in 0..PER_THREAD {
                let ecu = (t * PER_THREAD + i + 1) as u8;
                let response = Frame::from_parts(ecu | 0x80, command::READ_DATA, &[0x00]);
                transport.inject(&response.serialize().unwrap());
            }
        }));
    }
    for handle in responders {
        handle.join().unwrap();
    }

    let mut resolved = resolved.lock().unwrap().clone();
    resolved.sort_unstable();
    let expected: Vec<u8> = (1..=(THREADS * PER_THREAD) as u8).collect();
    assert_eq!(resolved, expected);
    assert_eq!(engine.pending_count(), 0);
}

/// Many outstanding requests resolve independently by sequence.
#[tokio::test]
async fn test_many_outstanding_acks() {
    let transport = Arc::new(MockTransport::new());
    let engine = ProtocolEngine::builder(transport.clone())
        .connect("mock")
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let mut seqs = Vec::new();

    for ecu in 1..=20u8 {
        let counter = fired.clone();
        let seq = engine
            .send(
                Frame::new(ecu, command::KEEP_ALIVE, Bytes::new()),
                move |outcome| {
                    assert!(outcome.is_success());
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Some(Duration::from_secs(5)),
            )
            .unwrap();
        seqs.push((ecu, seq));
    }
    assert_eq!(engine.pending_count(), 20);

    // Acknowledge in reverse order to show routing is by sequence, not
    // arrival order.
    for (ecu, seq) in seqs.into_iter().rev() {
        transport.inject(&Frame::ack(ecu, seq).serialize().unwrap());
    }

    assert_eq!(fired.load(Ordering::SeqCst), 20);
    assert_eq!(engine.pending_count(), 0);
}
