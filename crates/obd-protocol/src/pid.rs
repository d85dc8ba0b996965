//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs (PIDs) the dashboard can poll, their
//! decoding formulas, and the single unit each decoded value is expressed in.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Short-term fuel trim bank 1 (0x06)
    ShortFuelTrim = 0x06,
    /// Long-term fuel trim bank 1 (0x07)
    LongFuelTrim = 0x07,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Intake air temperature (0x0F)
    IntakeTemp = 0x0F,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Oxygen sensor voltage bank 1, sensor 1 (0x14)
    O2Voltage = 0x14,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
}

impl Pid {
    /// Every PID this crate can decode
    pub const ALL: [Pid; 12] = [
        Pid::EngineLoad,
        Pid::CoolantTemp,
        Pid::ShortFuelTrim,
        Pid::LongFuelTrim,
        Pid::IntakeManifoldPressure,
        Pid::Rpm,
        Pid::Speed,
        Pid::IntakeTemp,
        Pid::Maf,
        Pid::ThrottlePosition,
        Pid::O2Voltage,
        Pid::FuelLevel,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Rpm | Pid::Maf | Pid::O2Voltage => 2,
            _ => 1,
        }
    }

    /// Unit every decoded value of this PID is expressed in
    pub fn unit(&self) -> &'static str {
        match self {
            Pid::Rpm => "rpm",
            Pid::Speed => "km/h",
            Pid::CoolantTemp | Pid::IntakeTemp => "°C",
            Pid::EngineLoad
            | Pid::ThrottlePosition
            | Pid::FuelLevel
            | Pid::ShortFuelTrim
            | Pid::LongFuelTrim => "%",
            Pid::Maf => "g/s",
            Pid::IntakeManifoldPressure => "kPa",
            Pid::O2Voltage => "V",
        }
    }

    /// Physically representable range of the decoded value, inclusive
    pub fn valid_range(&self) -> (f64, f64) {
        match self {
            Pid::Rpm => (0.0, 16383.75),
            Pid::Speed | Pid::IntakeManifoldPressure => (0.0, 255.0),
            Pid::CoolantTemp | Pid::IntakeTemp => (-40.0, 215.0),
            Pid::EngineLoad | Pid::ThrottlePosition | Pid::FuelLevel => (0.0, 100.0),
            Pid::ShortFuelTrim | Pid::LongFuelTrim => (-100.0, 99.22),
            Pid::Maf => (0.0, 655.35),
            Pid::O2Voltage => (0.0, 1.275),
        }
    }

    /// Decode the data bytes of a response using this PID's formula
    pub fn decode_value(&self, bytes: &[u8]) -> Result<f64, ObdError> {
        if bytes.len() < self.response_bytes() {
            return Err(ObdError::InvalidResponse(format!(
                "PID {:02X} expects {} data bytes, got {}",
                self.as_hex(),
                self.response_bytes(),
                bytes.len()
            )));
        }

        let a = bytes[0] as f64;
        let value = match self {
            // ((A*256)+B)/4
            Pid::Rpm => ((a * 256.0) + bytes[1] as f64) / 4.0,
            // A
            Pid::Speed | Pid::IntakeManifoldPressure => a,
            // A - 40
            Pid::CoolantTemp | Pid::IntakeTemp => a - 40.0,
            // A * 100 / 255
            Pid::EngineLoad | Pid::ThrottlePosition | Pid::FuelLevel => a * 100.0 / 255.0,
            // ((A*256)+B) / 100
            Pid::Maf => ((a * 256.0) + bytes[1] as f64) / 100.0,
            // (A - 128) * 100 / 128
            Pid::ShortFuelTrim | Pid::LongFuelTrim => (a - 128.0) * 100.0 / 128.0,
            // A / 200, B is the trim and is ignored
            Pid::O2Voltage => a / 200.0,
        };
        Ok(value)
    }
}

/// Response from a PID query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidResponse {
    /// The PID that was queried
    pub pid: Pid,
    /// Timestamp when the response was received (Unix ms)
    pub timestamp_ms: u64,
    /// Decoded value, in `pid.unit()`
    pub value: f64,
    /// Raw data bytes from the response
    pub raw_bytes: Vec<u8>,
}

impl PidResponse {
    /// Create a new PID response by decoding raw bytes
    pub fn decode(pid: Pid, raw_bytes: Vec<u8>, timestamp_ms: u64) -> Result<Self, ObdError> {
        let value = pid.decode_value(&raw_bytes)?;
        Ok(Self {
            pid,
            timestamp_ms,
            value,
            raw_bytes,
        })
    }
}
