use pretty_assertions::assert_eq;
use stationlink_core::protocol::{
    Command, CommandDecoder, ControlSample, DecodeError, Decoded, DecodedSample, LineDecoder,
    NozzleEntry, SentenceDecoder, WeatherSample, MIN_FIELDS,
};

const DOUBLED: &str =
    "$$WIMDA,30.2269,I,1.0236,B,13.8,C,,,45.9,,2.3,C,80.6,T,69.7,M,1.2,N,0.6,M*53";

#[test]
fn test_doubled_marker_sentence() {
    let decoded = SentenceDecoder::wimda().decode(DOUBLED).unwrap();
    assert_eq!(
        decoded,
        Decoded::Sample(DecodedSample::Weather(WeatherSample {
            bar_pressure: Some(1.0236),
            air_temp: Some(13.8),
            rel_humidity: Some(45.9),
            wind_dir_true: Some(80.6),
            wind_speed: Some(0.6),
        }))
    );
}

#[test]
fn test_unparsable_field_does_not_abort_line() {
    let line = "$WIMDA,30.2269,I,n/a,B,13.8,C,,,45.9,,2.3,C,,T,69.7,M,1.2,N,0.6,M*53\r";
    match SentenceDecoder::wimda().decode(line).unwrap() {
        Decoded::Sample(DecodedSample::Weather(sample)) => {
            assert_eq!(sample.bar_pressure, None);
            assert_eq!(sample.wind_dir_true, None);
            assert_eq!(sample.air_temp, Some(13.8));
        }
        other => panic!("expected a weather sample, got {:?}", other),
    }
}

#[test]
fn test_other_sentence_is_discarded() {
    let decoded = SentenceDecoder::wimda()
        .decode("$WIMWV,214.8,R,0.1,K,A*28\r")
        .unwrap();
    assert_eq!(decoded, Decoded::Ignored("WIMWV".to_string()));
}

#[test]
fn test_custom_tag() {
    let decoder = SentenceDecoder::new("WIMWV", "\r\n");
    assert_eq!(decoder.tag(), "WIMWV");
    assert_eq!(
        decoder.decode("$WIMWV,214.8,R,0.1,K,A*28\r\n"),
        Err(DecodeError::ColumnCountMismatch {
            expected: MIN_FIELDS,
            found: 5
        })
    );
}

#[test]
fn test_nineteen_fields_rejected() {
    let line = format!("$WIMDA{}\r", ",1".repeat(MIN_FIELDS - 1));
    assert_eq!(
        SentenceDecoder::wimda().decode(&line),
        Err(DecodeError::ColumnCountMismatch {
            expected: MIN_FIELDS,
            found: MIN_FIELDS - 1
        })
    );
}

#[test]
fn test_param_report_with_missing_key() {
    let decoder = CommandDecoder::new(Command::ParamReport, "\r");
    assert_eq!(decoder.command(), Command::ParamReport);
    assert_eq!(
        decoder.decode("*PX0:X100,E50,F0\r").unwrap(),
        Decoded::Sample(DecodedSample::Control(ControlSample::ParamReport {
            x: 100,
            e: 50,
            f: 0
        }))
    );
    assert_eq!(
        decoder.decode("*PX0:X12,F3\r").unwrap(),
        Decoded::Sample(DecodedSample::Control(ControlSample::ParamReport {
            x: 12,
            e: 100,
            f: 3
        }))
    );
}

#[test]
fn test_nozzle_positions_are_centred() {
    let decoder = CommandDecoder::new(Command::NozzleActivity, "\r");
    let decoded = decoder.decode("*BX0:10011\r").unwrap();
    assert_eq!(
        decoded,
        Decoded::Sample(DecodedSample::Control(ControlSample::NozzleReport {
            entries: vec![
                NozzleEntry { position: -10, active: true },
                NozzleEntry { position: -5, active: false },
                NozzleEntry { position: 0, active: false },
                NozzleEntry { position: 5, active: true },
                NozzleEntry { position: 10, active: true },
            ],
            invalid: Vec::new(),
        }))
    );
}

#[test]
fn test_wrong_command_echoed() {
    let decoder = CommandDecoder::new(Command::ParamReport, "\r");
    assert!(matches!(
        decoder.decode("*BX0:0101\r"),
        Err(DecodeError::UnexpectedCommand { .. })
    ));
    assert_eq!(decoder.decode("X100,E50\r"), Err(DecodeError::MissingCommandId));
}
