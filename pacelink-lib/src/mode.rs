use crate::parameters::Parameter;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display;

use Parameter::*;

/// Pacing mode. The discriminant is the code carried in the mode byte of a parameter frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Mode {
    Aoo = 1,
    Voo = 2,
    Aai = 3,
    Vvi = 4,
    Aoor = 5,
    Voor = 6,
    Aair = 7,
    Vvir = 8,
}

const AOO_PARAMETERS: &[Parameter] = &[LowerRateLimit, UpperRateLimit, AtrialAmplitude, AtrialPulseWidth];

const VOO_PARAMETERS: &[Parameter] = &[LowerRateLimit, UpperRateLimit, VentricularAmplitude, VentricularPulseWidth];

const AAI_PARAMETERS: &[Parameter] = &[
    LowerRateLimit,
    UpperRateLimit,
    AtrialAmplitude,
    AtrialPulseWidth,
    AtrialSensitivity,
    Arp,
    Pvarp,
    Hysteresis,
    RateSmoothing,
];

const VVI_PARAMETERS: &[Parameter] = &[
    LowerRateLimit,
    UpperRateLimit,
    VentricularAmplitude,
    VentricularPulseWidth,
    VentricularSensitivity,
    Vrp,
    Hysteresis,
    RateSmoothing,
];

const AOOR_PARAMETERS: &[Parameter] = &[
    LowerRateLimit,
    UpperRateLimit,
    MaximumSensorRate,
    AtrialAmplitude,
    AtrialPulseWidth,
    ActivityThreshold,
    ReactionTime,
    ResponseFactor,
    RecoveryTime,
];

const VOOR_PARAMETERS: &[Parameter] = &[
    LowerRateLimit,
    UpperRateLimit,
    MaximumSensorRate,
    VentricularAmplitude,
    VentricularPulseWidth,
    ActivityThreshold,
    ReactionTime,
    ResponseFactor,
    RecoveryTime,
];

const AAIR_PARAMETERS: &[Parameter] = &[
    LowerRateLimit,
    UpperRateLimit,
    MaximumSensorRate,
    AtrialAmplitude,
    AtrialPulseWidth,
    AtrialSensitivity,
    Arp,
    Pvarp,
    Hysteresis,
    RateSmoothing,
    ActivityThreshold,
    ReactionTime,
    ResponseFactor,
    RecoveryTime,
];

const VVIR_PARAMETERS: &[Parameter] = &[
    LowerRateLimit,
    UpperRateLimit,
    MaximumSensorRate,
    VentricularAmplitude,
    VentricularPulseWidth,
    VentricularSensitivity,
    Vrp,
    Hysteresis,
    RateSmoothing,
    ActivityThreshold,
    ReactionTime,
    ResponseFactor,
    RecoveryTime,
];

impl Mode {
    pub const ALL: [Mode; 8] = [
        Mode::Aoo,
        Mode::Voo,
        Mode::Aai,
        Mode::Vvi,
        Mode::Aoor,
        Mode::Voor,
        Mode::Aair,
        Mode::Vvir,
    ];

    /// Wire code of this mode (1-8)
    pub fn code(&self) -> u8 {
        (*self).into()
    }

    /// Parameters that are meaningful in this mode, in the order an operator edits them.
    pub fn parameters(&self) -> &'static [Parameter] {
        match self {
            Mode::Aoo => AOO_PARAMETERS,
            Mode::Voo => VOO_PARAMETERS,
            Mode::Aai => AAI_PARAMETERS,
            Mode::Vvi => VVI_PARAMETERS,
            Mode::Aoor => AOOR_PARAMETERS,
            Mode::Voor => VOOR_PARAMETERS,
            Mode::Aair => AAIR_PARAMETERS,
            Mode::Vvir => VVIR_PARAMETERS,
        }
    }

    pub fn uses(&self, parameter: Parameter) -> bool {
        self.parameters().contains(&parameter)
    }

    /// Rate-adaptive modes drive the accelerometer sensor parameters
    pub fn is_rate_adaptive(&self) -> bool {
        matches!(self, Mode::Aoor | Mode::Voor | Mode::Aair | Mode::Vvir)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown pacing mode '{}'", s))
    }
}
