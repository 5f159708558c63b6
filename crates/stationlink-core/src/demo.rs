//! Demo Mode - Simulated instruments for trying the pipeline without hardware
//!
//! The weather station drifts slowly around a mild spring day and sprinkles
//! in the sentence types a real station also emits. The nozzle controller
//! answers `*PX0` / `*BX0` with a boom whose nozzles switch at random.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::acquisition::Protocol;
use crate::protocol::{Command, WIMDA};
use crate::transport::SimulatedSerial;

const INHG_PER_BAR: f64 = 29.5300;
const KNOTS_PER_MS: f64 = 1.943_84;
const MAGNETIC_DECLINATION: f64 = 10.9;

/// XOR of every byte between `$` and `*`
pub fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Simulated weather station
pub struct WeatherSimulator {
    rng: StdRng,
    pressure_bar: f64,
    air_temp: f64,
    humidity: f64,
    wind_dir: f64,
    wind_speed: f64,
    sent: u64,
}

impl Default for WeatherSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherSimulator {
    /// Create a simulator seeded from entropy
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            pressure_bar: 1.0236,
            air_temp: 13.8,
            humidity: 45.9,
            wind_dir: 80.6,
            wind_speed: 0.6,
            sent: 0,
        }
    }

    fn drift(&mut self) {
        self.pressure_bar =
            (self.pressure_bar + self.rng.gen_range(-0.0005..0.0005)).clamp(0.95, 1.06);
        self.air_temp = (self.air_temp + self.rng.gen_range(-0.2..0.2)).clamp(-20.0, 45.0);
        self.humidity = (self.humidity + self.rng.gen_range(-0.5..0.5)).clamp(5.0, 100.0);
        self.wind_dir = (self.wind_dir + self.rng.gen_range(-8.0..8.0)).rem_euclid(360.0);
        self.wind_speed = (self.wind_speed + self.rng.gen_range(-0.3..0.3)).clamp(0.0, 30.0);
    }

    /// Next line the station sends, carriage return included
    pub fn next_line(&mut self) -> String {
        self.sent += 1;
        if self.sent % 7 == 0 {
            return sentence("GPGSA,A,3,12,5,29,24,21,2,25,20,31,,,,1.7,1.0,1.4");
        }

        self.drift();
        let dew_point = self.air_temp - (100.0 - self.humidity) / 5.0;
        let body = format!(
            "{},{:.4},I,{:.4},B,{:.1},C,,,{:.1},,{:.1},C,{:.1},T,{:.1},M,{:.1},N,{:.1},M",
            WIMDA,
            self.pressure_bar * INHG_PER_BAR,
            self.pressure_bar,
            self.air_temp,
            self.humidity,
            dew_point,
            self.wind_dir,
            (self.wind_dir - MAGNETIC_DECLINATION).rem_euclid(360.0),
            self.wind_speed * KNOTS_PER_MS,
            self.wind_speed,
        );
        let line = sentence(&body);
        // Real stations occasionally double the start marker
        if self.sent % 19 == 0 {
            format!("${}", line)
        } else {
            line
        }
    }
}

fn sentence(body: &str) -> String {
    format!("${}*{:02X}\r", body, nmea_checksum(body))
}

/// Simulated nozzle controller
pub struct NozzleSimulator {
    rng: StdRng,
    nozzles: usize,
    params: (i32, i32, i32),
}

impl NozzleSimulator {
    /// Controller driving a boom of `nozzles` nozzles
    pub fn new(nozzles: usize) -> Self {
        Self::from_rng(StdRng::from_entropy(), nozzles)
    }

    /// Reproducible controller
    pub fn with_seed(seed: u64, nozzles: usize) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), nozzles)
    }

    fn from_rng(rng: StdRng, nozzles: usize) -> Self {
        Self {
            rng,
            nozzles,
            params: (100, 100, 100),
        }
    }

    /// Reply to one request written by the host
    pub fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        let request = String::from_utf8_lossy(request);
        let id = request.trim_end_matches(['\r', '\n']);

        if id == Command::ParamReport.id() {
            if self.rng.gen_bool(0.2) {
                self.params = (
                    self.rng.gen_range(50..=150),
                    self.rng.gen_range(0..=100),
                    self.rng.gen_range(0..=100),
                );
            }
            let (x, e, f) = self.params;
            format!("{}:X{},E{},F{}\r", id, x, e, f).into_bytes()
        } else if id == Command::NozzleActivity.id() {
            let bits: String = (0..self.nozzles)
                .map(|_| if self.rng.gen_bool(0.6) { '1' } else { '0' })
                .collect();
            format!("{}\r\n{}:{}\r\r\n", id, id, bits).into_bytes()
        } else {
            Vec::new()
        }
    }
}

/// Simulated device speaking `protocol`
pub fn simulated_device(protocol: Protocol, seed: Option<u64>) -> SimulatedSerial {
    let device = SimulatedSerial::new();
    match protocol {
        Protocol::Weather => {
            let mut station = seed.map_or_else(WeatherSimulator::new, WeatherSimulator::with_seed);
            device.set_source(move || station.next_line().into_bytes());
        }
        Protocol::Nozzle => {
            let mut controller = match seed {
                Some(seed) => NozzleSimulator::with_seed(seed, 13),
                None => NozzleSimulator::new(13),
            };
            device.set_responder(move |request| controller.respond(request));
        }
    }
    device
}
