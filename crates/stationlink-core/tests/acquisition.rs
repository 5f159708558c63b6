use pretty_assertions::assert_eq;
use stationlink_core::acquisition::{Acquisition, AcquisitionConfig, AcquisitionError, Protocol};
use stationlink_core::datalog::MemorySink;
use stationlink_core::demo::simulated_device;
use stationlink_core::transport::{SimulatedSerial, Timeout, TransportError};
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config(protocol: Protocol) -> AcquisitionConfig {
    let mut config = AcquisitionConfig::for_protocol(protocol);
    config.serial.port = "SIM0".to_string();
    config.serial.timeout = Timeout::simple(300);
    config.sleep_ms = 1;
    config.idle_sleep_ms = 1;
    config
}

/// Device that streams `lines` once, then cancels `token` and goes quiet
fn scripted_station(lines: &[&str], token: &CancellationToken) -> SimulatedSerial {
    let sim = SimulatedSerial::new();
    let mut queue: VecDeque<Vec<u8>> = lines.iter().map(|l| l.as_bytes().to_vec()).collect();
    let token = token.clone();
    sim.set_source(move || match queue.pop_front() {
        Some(line) => line,
        None => {
            token.cancel();
            Vec::new()
        }
    });
    sim
}

#[test]
fn test_weather_run_counts_every_outcome() {
    let token = CancellationToken::new();
    let sim = scripted_station(
        &[
            "$WIMDA,30.2269,I,1.0236,B,13.8,C,,,45.9,,2.3,C,80.6,T,69.7,M,1.2,N,0.6,M*53\r",
            "$GPGSA,A,3,12,5,29,24,21,2,25,20,31,,,,1.7,1.0,1.4*3D\r",
            "$WIMDA,30.2,I,1.02,B\r",
            "garbage\r",
            "$$WIMDA,30.2269,I,1.0250,B,14.1,C,,,44.0,,2.3,C,82.0,T,71.1,M,1.4,N,0.7,M*53\r",
        ],
        &token,
    );
    let sink = MemorySink::new();
    let mut acquisition = Acquisition::with_platform(
        fast_config(Protocol::Weather),
        sink.clone(),
        Box::new(sim.clone()),
    )
    .unwrap();

    let stats = acquisition.run(&token).unwrap();
    assert_eq!(stats.lines, 5);
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.decode_errors, 2);

    let contents = sink.contents();
    let records: Vec<&str> = contents.split_terminator("\r\n").collect();
    assert_eq!(records.len(), 2);
    assert!(records[0].starts_with("1.0236;13.8;45.9;80.6;0.6;"));
    assert!(records[1].starts_with("1.025;14.1;44;82;0.7;"));

    assert_eq!(sink.flush_count(), 1);
    assert_eq!(sim.journal().closes, 1);
    assert!(!acquisition.transport().is_open());
}

#[test]
fn test_nozzle_run_polls_both_commands() {
    let token = CancellationToken::new();
    let sim = SimulatedSerial::new();
    let canceller = token.clone();
    let mut activity_polls = 0;
    sim.set_responder(move |request| match request {
        b"*PX0\r" => b"*PX0:X100,E50,F0\r".to_vec(),
        b"*BX0\r" => {
            activity_polls += 1;
            if activity_polls == 2 {
                canceller.cancel();
            }
            b"*BX0\r\n*BX0:10011\r\r\n".to_vec()
        }
        _ => Vec::new(),
    });

    let sink = MemorySink::new();
    let mut acquisition = Acquisition::with_platform(
        fast_config(Protocol::Nozzle),
        sink.clone(),
        Box::new(sim.clone()),
    )
    .unwrap();
    let stats = acquisition.run(&token).unwrap();

    assert_eq!(stats.samples, 4);
    assert_eq!(stats.decode_errors, 0);
    assert_eq!(sim.take_tx(), b"*PX0\r*BX0\r*PX0\r*BX0\r");

    let contents = sink.contents();
    let records: Vec<&str> = contents.split_terminator('\r').collect();
    assert_eq!(records.len(), 12);

    let params: Vec<&str> = records[0].split(';').collect();
    assert_eq!(&params[2..], ["100", "50", "0"]);

    let nozzles: Vec<(String, String)> = records[1..6]
        .iter()
        .map(|r| {
            let f: Vec<&str> = r.split(';').collect();
            (f[2].to_string(), f[3].to_string())
        })
        .collect();
    let expected: Vec<(String, String)> = [("-10", "1"), ("-5", "0"), ("0", "0"), ("5", "1"), ("10", "1")]
        .iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect();
    assert_eq!(nozzles, expected);
}

#[test]
fn test_open_failure_still_flushes_sink() {
    let sim = SimulatedSerial::new();
    sim.failing_opens(1);
    let sink = MemorySink::new();
    let mut acquisition = Acquisition::with_platform(
        fast_config(Protocol::Weather),
        sink.clone(),
        Box::new(sim),
    )
    .unwrap();

    let result = acquisition.run(&CancellationToken::new());
    assert!(matches!(
        result,
        Err(AcquisitionError::Transport(TransportError::Io { .. }))
    ));
    assert_eq!(sink.flush_count(), 1);
    assert_eq!(acquisition.stats().samples, 0);

    // Shutdown already ran; dropping must not flush again
    drop(acquisition);
    assert_eq!(sink.flush_count(), 1);
}

#[test]
fn test_sleep_longer_than_timeout_rejected() {
    let mut config = fast_config(Protocol::Weather);
    config.sleep_ms = 600;
    config.serial.timeout = Timeout::simple(500);
    let result = Acquisition::with_platform(config, MemorySink::new(), Box::new(SimulatedSerial::new()));
    assert!(matches!(
        result,
        Err(AcquisitionError::Transport(TransportError::InvalidConfig(_)))
    ));
}

#[test]
fn test_demo_station_produces_samples() {
    let token = CancellationToken::new();
    let sink = MemorySink::new();
    let mut acquisition = Acquisition::with_platform(
        fast_config(Protocol::Weather),
        sink.clone(),
        Box::new(simulated_device(Protocol::Weather, Some(7))),
    )
    .unwrap();

    let canceller = token.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        canceller.cancel();
    });
    let stats = acquisition.run(&token).unwrap();
    handle.join().unwrap();

    assert!(stats.samples > 0);
    assert_eq!(stats.decode_errors, 0);
    assert_eq!(
        sink.contents().split_terminator("\r\n").count() as u64,
        stats.samples
    );
}

#[test]
fn test_demo_controller_produces_samples() {
    let token = CancellationToken::new();
    let sink = MemorySink::new();
    let mut acquisition = Acquisition::with_platform(
        fast_config(Protocol::Nozzle),
        sink.clone(),
        Box::new(simulated_device(Protocol::Nozzle, Some(7))),
    )
    .unwrap();

    let canceller = token.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        canceller.cancel();
    });
    let stats = acquisition.run(&token).unwrap();
    handle.join().unwrap();

    assert!(stats.samples >= 2);
    assert_eq!(stats.samples % 2, 0);
    assert_eq!(stats.decode_errors, 0);
}

#[test]
fn test_nozzle_config_file_polls_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weedit.json");
    std::fs::write(
        &path,
        r#"{"protocol":"nozzle","serial":{"port":"SIM0","baud_rate":38400,
            "timeout":{"inter_byte":4294967295,"read_constant":1000,"read_multiplier":0,
                       "write_constant":1000,"write_multiplier":0}},
            "sleep_ms":1,"idle_sleep_ms":1}"#,
    )
    .unwrap();
    let config = AcquisitionConfig::from_file(&path).unwrap();
    assert!(!config.synchronize);

    let token = CancellationToken::new();
    let canceller = token.clone();
    let sim = SimulatedSerial::new();
    sim.set_responder(move |request| match request {
        b"*PX0\r" => b"*PX0:X90,E40,F10\r".to_vec(),
        b"*BX0\r" => {
            canceller.cancel();
            b"*BX0\r\n*BX0:01\r\r\n".to_vec()
        }
        _ => Vec::new(),
    });

    let sink = MemorySink::new();
    let mut acquisition =
        Acquisition::with_platform(config, sink.clone(), Box::new(sim.clone())).unwrap();
    let stats = acquisition.run(&token).unwrap();

    assert_eq!(stats.samples, 2);
    assert_eq!(sim.take_tx(), b"*PX0\r*BX0\r");
    assert_eq!(sim.journal().opened.len(), 1);
    let contents = sink.contents();
    let records: Vec<&str> = contents.split_terminator('\r').collect();
    assert_eq!(records.len(), 3);
    assert!(records[0].ends_with(";90;40;10"));
}
