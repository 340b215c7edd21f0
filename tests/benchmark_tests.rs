//! Performance benchmarks for hot protocol paths

use server::network::{Encoder, NonceWindow};
use server::connection::Outbound;
use shared::{read_messages, GameCode, GameOptions, MessageReader, MessageWriter};
use std::time::Instant;

/// Benchmarks packed integer encoding and decoding
#[test]
fn benchmark_packed_integers() {
    let iterations = 100_000u32;
    let start = Instant::now();

    let mut writer = MessageWriter::new();
    for i in 0..iterations {
        writer.write_packed_u32(i.wrapping_mul(2_654_435_761));
    }
    let bytes = writer.into_bytes();

    let mut reader = MessageReader::new(0, &bytes);
    for i in 0..iterations {
        assert_eq!(reader.read_packed_u32().unwrap(), i.wrapping_mul(2_654_435_761));
    }

    let duration = start.elapsed();
    println!(
        "Packed integers: {} values in {:?} ({:.2} ns/value)",
        iterations,
        duration,
        duration.as_nanos() as f64 / f64::from(iterations)
    );

    // Should complete in under 500ms for 100k values
    assert!(duration.as_millis() < 500);
}

/// Benchmarks splitting a payload into messages, the first thing done with
/// every inbound datagram
#[test]
fn benchmark_message_framing() {
    let mut writer = MessageWriter::new();
    for tag in 0..50u8 {
        writer.start_message(tag);
        writer.write_packed_u32(u32::from(tag));
        writer.write_string("movement");
        writer.end_message();
    }
    let payload = writer.into_bytes();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let count = read_messages(&payload).filter(Result::is_ok).count();
        assert_eq!(count, 50);
    }

    let duration = start.elapsed();
    println!(
        "Message framing: {} payloads in {:?} ({:.2} μs/payload)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks game code generation and parsing
#[test]
fn benchmark_game_codes() {
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let code = GameCode::random();
        assert_eq!(GameCode::parse(&code.to_string()), Some(code));
    }

    let duration = start.elapsed();
    println!("Game codes: {} round trips in {:?}", iterations, duration);

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks game options decoding as done for every HostGame request
#[test]
fn benchmark_options_decoding() {
    let bytes = GameOptions::default().to_bytes();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let options = GameOptions::deserialize(&bytes).unwrap();
        assert_eq!(options.max_players, 10);
    }

    let duration = start.elapsed();
    println!(
        "Options decoding: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Stress tests duplicate detection and datagram encoding for one connection
#[test]
fn stress_test_reliable_traffic() {
    let mut window = NonceWindow::new();
    let mut encoder = Encoder::default();

    let iterations = 100_000u32;
    let start = Instant::now();

    let mut fresh = 0;
    for i in 0..iterations {
        // Every nonce arrives twice, as a retransmission would
        let nonce = (i / 2) as u16;
        if window.first_seen(nonce) {
            fresh += 1;
        }
        let datagram = encoder.encode(Outbound::Data {
            bytes: vec![0; 16],
            reliable: true,
        });
        assert_eq!(datagram.len(), 19);
    }

    let duration = start.elapsed();
    println!("Reliable traffic: {} datagrams in {:?}", iterations, duration);

    assert_eq!(fresh, iterations / 2);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
