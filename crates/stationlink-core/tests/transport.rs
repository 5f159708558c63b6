use pretty_assertions::assert_eq;
use stationlink_core::transport::{
    ConnectionState, SerialConfig, SerialTransport, SimulatedSerial, Timeout, TransportError,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn open_with(sim: &SimulatedSerial, timeout: Timeout) -> SerialTransport {
    let config = SerialConfig::new("SIM0", 4800).with_timeout(timeout);
    let transport = SerialTransport::with_platform(config, Box::new(sim.clone()));
    transport.open().unwrap();
    transport
}

#[test]
fn test_read_waits_for_the_deadline() {
    let sim = SimulatedSerial::new();
    let transport = open_with(&sim, Timeout::simple(100));

    let start = Instant::now();
    let data = transport.read(4).unwrap();
    let elapsed = start.elapsed();

    assert!(data.is_empty());
    assert!(elapsed >= Duration::from_millis(90), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn test_multiplier_extends_the_deadline() {
    let sim = SimulatedSerial::new();
    let transport = open_with(&sim, Timeout::new(Timeout::MAX, 10, 20, 0, 0));

    let start = Instant::now();
    assert!(transport.read(5).unwrap().is_empty());
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_inter_byte_gap_ends_read() {
    let sim = SimulatedSerial::new();
    let transport = open_with(&sim, Timeout::new(20, 5_000, 0, 5_000, 0));
    sim.push_rx(b"abc");

    let start = Instant::now();
    let data = transport.read(10).unwrap();
    assert_eq!(data, b"abc");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_gap_check_disabled_collects_late_bytes() {
    let sim = SimulatedSerial::new();
    let transport = open_with(&sim, Timeout::simple(2_000));
    sim.push_rx(b"ab");

    let pusher = sim.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        pusher.push_rx(b"cd");
    });
    let data = transport.read(4).unwrap();
    handle.join().unwrap();
    assert_eq!(data, b"abcd");
}

#[test]
fn test_zero_deadline_returns_buffered_bytes_only() {
    let sim = SimulatedSerial::new();
    let transport = open_with(&sim, Timeout::default());

    let start = Instant::now();
    assert!(transport.read(8).unwrap().is_empty());
    assert!(start.elapsed() < Duration::from_secs(1));

    sim.push_rx(b"xy");
    assert_eq!(transport.read(8).unwrap(), b"xy");
}

#[test]
fn test_full_duplex() {
    let sim = SimulatedSerial::new();
    sim.set_responder(|request| {
        if request == b"ping" {
            b"pong!".to_vec()
        } else {
            Vec::new()
        }
    });
    let transport = Arc::new(open_with(&sim, Timeout::simple(3_000)));

    let reader = Arc::clone(&transport);
    let handle = thread::spawn(move || reader.read(5));

    // The write must not queue behind the pending read
    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    assert_eq!(transport.write(b"ping").unwrap(), 4);
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(handle.join().unwrap().unwrap(), b"pong!");
}

#[test]
fn test_fault_then_recover() {
    let sim = SimulatedSerial::new();
    let transport = open_with(&sim, Timeout::simple(50));

    sim.fail_io(true);
    let err = transport.write(b"*PX0\r").unwrap_err();
    assert!(matches!(err, TransportError::Io { .. }));
    assert_eq!(transport.state(), ConnectionState::Faulted);
    assert!(matches!(transport.flush(), Err(TransportError::NotOpen)));
    assert!(matches!(transport.purge(), Err(TransportError::NotOpen)));

    sim.fail_io(false);
    transport.close();
    transport.open().unwrap();
    assert_eq!(transport.state(), ConnectionState::Open);
}

#[test]
fn test_open_failure_reports_io_error() {
    let sim = SimulatedSerial::new();
    sim.failing_opens(1);
    let transport =
        SerialTransport::with_platform(SerialConfig::new("SIM7", 4800), Box::new(sim.clone()));

    match transport.open() {
        Err(TransportError::Io { port, kind, .. }) => {
            assert_eq!(port, "SIM7");
            assert_eq!(kind, std::io::ErrorKind::NotFound);
        }
        other => panic!("expected an I/O error, got {:?}", other),
    }
    assert_eq!(transport.state(), ConnectionState::Closed);
    transport.open().unwrap();
}

#[test]
fn test_drop_releases_handle() {
    let sim = SimulatedSerial::new();
    {
        let _transport = open_with(&sim, Timeout::simple(10));
    }
    assert_eq!(sim.journal().closes, 1);
}
