//! # Wire schema v1
//!
//! Two frame kinds share the serial line. Both are fixed-size and
//! little-endian; neither carries a length field or a checksum.
//!
//! ## Parameter frame (42 bytes)
//!
//! Sent by the host to program the device, and echoed back unchanged by the
//! device to confirm receipt.
//!
//! | offset | field                    | type |
//! |-------:|--------------------------|------|
//! | 0      | sync marker `0x16`       | u8   |
//! | 1      | schema version `0x01`    | u8   |
//! | 2      | mode code (1-8)          | u8   |
//! | 3      | Lower Rate Limit         | u8   |
//! | 4      | Upper Rate Limit         | u8   |
//! | 5      | Atrial Amplitude         | f32  |
//! | 9      | Atrial Pulse Width       | f32  |
//! | 13     | Atrial Sensitivity       | f32  |
//! | 17     | Ventricular Amplitude    | f32  |
//! | 21     | Ventricular Pulse Width  | f32  |
//! | 25     | Ventricular Sensitivity  | f32  |
//! | 29     | VRP                      | u16  |
//! | 31     | ARP                      | u16  |
//! | 33     | PVARP                    | u16  |
//! | 35     | Maximum Sensor Rate      | u8   |
//! | 36     | Reaction Time            | u8   |
//! | 37     | Response Factor          | u8   |
//! | 38     | Recovery Time            | u8   |
//! | 39     | Activity Threshold (1-7) | u8   |
//! | 40     | Hysteresis               | u8   |
//! | 41     | Rate Smoothing           | u8   |
//!
//! ## Telemetry frame (81 bytes)
//!
//! Streamed by the device: prologue `0xAA`, then 20 `f32`. The first 10 are
//! atrial samples, the last 10 ventricular samples, oldest first.

use crate::constants::{
    PARAMETER_FRAME_SIZE, PARAMETER_PROLOGUE, TELEMETRY_FLOATS, TELEMETRY_FRAME_SIZE, TELEMETRY_PROLOGUE,
    TELEMETRY_SAMPLES_PER_CHANNEL,
};
use crate::error::PacerError;
use crate::mode::Mode;
use crate::parameters::{Parameter, ParameterSet, Value};
use crate::sink::Sample;
use bytes::Bytes;
use zerocopy::byteorder::little_endian::{F32, U16};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ParameterFrameRaw {
    pub prologue: [u8; 2],
    pub mode: u8,
    pub lower_rate_limit: u8,
    pub upper_rate_limit: u8,
    pub atrial_amplitude: F32,        // V
    pub atrial_pulse_width: F32,      // ms
    pub atrial_sensitivity: F32,      // mV
    pub ventricular_amplitude: F32,   // V
    pub ventricular_pulse_width: F32, // ms
    pub ventricular_sensitivity: F32, // mV
    pub vrp: U16,                     // ms
    pub arp: U16,                     // ms
    pub pvarp: U16,                   // ms
    pub maximum_sensor_rate: u8,
    pub reaction_time: u8,  // s
    pub response_factor: u8,
    pub recovery_time: u8,  // min
    pub activity_threshold: u8,
    pub hysteresis: u8,
    pub rate_smoothing: u8, // %
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TelemetryFrameRaw {
    pub prologue: u8,
    pub samples: [F32; TELEMETRY_FLOATS],
}

const _: () = assert!(size_of::<ParameterFrameRaw>() == PARAMETER_FRAME_SIZE);
const _: () = assert!(size_of::<TelemetryFrameRaw>() == TELEMETRY_FRAME_SIZE);

/// The two frame kinds that can appear on the inbound stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Parameter frame echoed back by the device
    Echo,
    /// Egram samples
    Telemetry,
}

impl FrameKind {
    pub fn prologue(&self) -> &'static [u8] {
        match self {
            FrameKind::Echo => &PARAMETER_PROLOGUE,
            FrameKind::Telemetry => &[TELEMETRY_PROLOGUE],
        }
    }

    /// Total frame size, prologue included
    pub fn size(&self) -> usize {
        match self {
            FrameKind::Echo => PARAMETER_FRAME_SIZE,
            FrameKind::Telemetry => TELEMETRY_FRAME_SIZE,
        }
    }

    /// Bytes following the prologue
    pub fn payload_len(&self) -> usize {
        self.size() - self.prologue().len()
    }
}

/// A parameter frame read back from the device
#[derive(Debug, Clone, PartialEq)]
pub struct EchoFrame {
    /// Mode byte as received; not guaranteed to be a known mode
    pub mode_code: u8,
    /// Every canonical field, decoded as-is
    pub parameters: ParameterSet,
    /// The frame exactly as it came off the wire
    pub raw: Bytes,
}

impl EchoFrame {
    pub fn mode(&self) -> Option<Mode> {
        Mode::try_from(self.mode_code).ok()
    }

    /// Whether the device echoed back exactly the given outbound frame.
    pub fn confirms(&self, sent: &[u8]) -> bool {
        self.raw.as_ref() == sent
    }
}

/// One decoded telemetry frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub atrial: [f32; TELEMETRY_SAMPLES_PER_CHANNEL],
    pub ventricular: [f32; TELEMETRY_SAMPLES_PER_CHANNEL],
}

impl TelemetryFrame {
    /// The newest value of each channel
    pub fn latest(&self) -> Sample {
        Sample {
            atrial: self.atrial[TELEMETRY_SAMPLES_PER_CHANNEL - 1],
            ventricular: self.ventricular[TELEMETRY_SAMPLES_PER_CHANNEL - 1],
        }
    }

    /// All sample pairs carried by the frame, oldest first
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.atrial
            .iter()
            .zip(self.ventricular.iter())
            .map(|(&atrial, &ventricular)| Sample { atrial, ventricular })
    }
}

/// A complete inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Echo(EchoFrame),
    Telemetry(TelemetryFrame),
}

impl InboundFrame {
    pub fn decode(kind: FrameKind, bytes: &[u8]) -> Result<Self, PacerError> {
        match kind {
            FrameKind::Echo => decode_echo(bytes).map(InboundFrame::Echo),
            FrameKind::Telemetry => decode_telemetry(bytes).map(InboundFrame::Telemetry),
        }
    }
}

fn narrow_u8(n: f64) -> u8 {
    // float -> int casts saturate, NaN becomes 0
    n.round() as u8
}

fn narrow_u16(n: f64) -> u16 {
    n.round() as u16
}

/// Build the outbound parameter frame for `mode`.
///
/// Total over any parameter set: parameters the mode does not use, and
/// parameters that are absent, are written as 0.
pub fn encode(mode: Mode, parameters: &ParameterSet) -> Bytes {
    let mut raw = ParameterFrameRaw::new_zeroed();
    raw.prologue = PARAMETER_PROLOGUE;
    raw.mode = mode.code();

    for &parameter in mode.parameters() {
        if let Some(value) = parameters.get(parameter) {
            write_field(&mut raw, parameter, value);
        }
    }

    Bytes::copy_from_slice(raw.as_bytes())
}

fn write_field(raw: &mut ParameterFrameRaw, parameter: Parameter, value: &Value) {
    use Parameter::*;

    let n = value.as_number().unwrap_or(0.0);
    match parameter {
        LowerRateLimit => raw.lower_rate_limit = narrow_u8(n),
        UpperRateLimit => raw.upper_rate_limit = narrow_u8(n),
        AtrialAmplitude => raw.atrial_amplitude = F32::new(n as f32),
        AtrialPulseWidth => raw.atrial_pulse_width = F32::new(n as f32),
        AtrialSensitivity => raw.atrial_sensitivity = F32::new(n as f32),
        VentricularAmplitude => raw.ventricular_amplitude = F32::new(n as f32),
        VentricularPulseWidth => raw.ventricular_pulse_width = F32::new(n as f32),
        VentricularSensitivity => raw.ventricular_sensitivity = F32::new(n as f32),
        Vrp => raw.vrp = U16::new(narrow_u16(n)),
        Arp => raw.arp = U16::new(narrow_u16(n)),
        Pvarp => raw.pvarp = U16::new(narrow_u16(n)),
        MaximumSensorRate => raw.maximum_sensor_rate = narrow_u8(n),
        ReactionTime => raw.reaction_time = narrow_u8(n),
        ResponseFactor => raw.response_factor = narrow_u8(n),
        RecoveryTime => raw.recovery_time = narrow_u8(n),
        Hysteresis => raw.hysteresis = narrow_u8(n),
        RateSmoothing => raw.rate_smoothing = narrow_u8(n),
        ActivityThreshold => {
            raw.activity_threshold = match value {
                Value::Label(label) => crate::parameters::ActivityThreshold::code_for_label(label),
                Value::Number(n) => narrow_u8(*n),
            }
        }
    }
}

fn read_field(raw: &ParameterFrameRaw, parameter: Parameter) -> Value {
    use Parameter::*;
    let n = match parameter {
        LowerRateLimit => raw.lower_rate_limit as f64,
        UpperRateLimit => raw.upper_rate_limit as f64,
        AtrialAmplitude => raw.atrial_amplitude.get() as f64,
        AtrialPulseWidth => raw.atrial_pulse_width.get() as f64,
        AtrialSensitivity => raw.atrial_sensitivity.get() as f64,
        VentricularAmplitude => raw.ventricular_amplitude.get() as f64,
        VentricularPulseWidth => raw.ventricular_pulse_width.get() as f64,
        VentricularSensitivity => raw.ventricular_sensitivity.get() as f64,
        Vrp => raw.vrp.get() as f64,
        Arp => raw.arp.get() as f64,
        Pvarp => raw.pvarp.get() as f64,
        MaximumSensorRate => raw.maximum_sensor_rate as f64,
        ReactionTime => raw.reaction_time as f64,
        ResponseFactor => raw.response_factor as f64,
        RecoveryTime => raw.recovery_time as f64,
        Hysteresis => raw.hysteresis as f64,
        RateSmoothing => raw.rate_smoothing as f64,
        ActivityThreshold => {
            return match crate::parameters::ActivityThreshold::from_code(raw.activity_threshold) {
                Some(level) => Value::from(level),
                None => Value::Number(raw.activity_threshold as f64),
            };
        }
    };
    Value::Number(n)
}

/// Decode a parameter echo. Bytes beyond the frame size are ignored.
pub fn decode_echo(bytes: &[u8]) -> Result<EchoFrame, PacerError> {
    if bytes.len() < PARAMETER_FRAME_SIZE {
        return Err(PacerError::MalformedFrame {
            expected: PARAMETER_FRAME_SIZE,
            actual: bytes.len(),
        });
    }
    let (raw, _) = ParameterFrameRaw::ref_from_prefix(bytes)
        .map_err(|_| PacerError::InvalidFrame("failed to parse parameter frame".to_string()))?;

    if raw.prologue != PARAMETER_PROLOGUE {
        return Err(PacerError::InvalidFrame(format!(
            "parameter frame prologue {:02x?} (expected {:02x?})",
            raw.prologue, PARAMETER_PROLOGUE
        )));
    }

    let parameters = Parameter::ALL
        .into_iter()
        .map(|p| (p, read_field(raw, p)))
        .collect();

    Ok(EchoFrame {
        mode_code: raw.mode,
        parameters,
        raw: Bytes::copy_from_slice(&bytes[..PARAMETER_FRAME_SIZE]),
    })
}

/// Decode a telemetry frame. Bytes beyond the frame size are ignored.
pub fn decode_telemetry(bytes: &[u8]) -> Result<TelemetryFrame, PacerError> {
    if bytes.len() < TELEMETRY_FRAME_SIZE {
        return Err(PacerError::MalformedFrame {
            expected: TELEMETRY_FRAME_SIZE,
            actual: bytes.len(),
        });
    }
    let (raw, _) = TelemetryFrameRaw::ref_from_prefix(bytes)
        .map_err(|_| PacerError::InvalidFrame("failed to parse telemetry frame".to_string()))?;

    if raw.prologue != TELEMETRY_PROLOGUE {
        return Err(PacerError::InvalidFrame(format!(
            "telemetry prologue {:#04x} (expected {:#04x})",
            raw.prologue, TELEMETRY_PROLOGUE
        )));
    }

    let mut frame = TelemetryFrame {
        atrial: [0.0; TELEMETRY_SAMPLES_PER_CHANNEL],
        ventricular: [0.0; TELEMETRY_SAMPLES_PER_CHANNEL],
    };
    let (atrial, ventricular) = raw.samples.split_at(TELEMETRY_SAMPLES_PER_CHANNEL);
    for (dst, src) in frame.atrial.iter_mut().zip(atrial) {
        *dst = src.get();
    }
    for (dst, src) in frame.ventricular.iter_mut().zip(ventricular) {
        *dst = src.get();
    }
    Ok(frame)
}

/// Serialize a telemetry frame the way the device firmware does.
pub fn encode_telemetry(frame: &TelemetryFrame) -> Bytes {
    let mut raw = TelemetryFrameRaw::new_zeroed();
    raw.prologue = TELEMETRY_PROLOGUE;
    for (dst, &src) in raw.samples.iter_mut().zip(frame.atrial.iter().chain(frame.ventricular.iter())) {
        *dst = F32::new(src);
    }
    Bytes::copy_from_slice(raw.as_bytes())
}
