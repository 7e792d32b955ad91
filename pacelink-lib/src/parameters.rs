//! Programmable pacing parameters and the value sets exchanged with the
//! parameter store and the frame codec.
//!
//! A [`ParameterSet`] serializes as a JSON object keyed by the display names
//! the console uses (`"Lower Rate Limit"`, `"ARP"`, ...). Numbers are kept as
//! `f64` regardless of the parameter's wire width; the codec decides how each
//! one is narrowed on the wire.

use crate::mode::Mode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::Display;

/// Every programmable parameter, declared in canonical wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
pub enum Parameter {
    #[strum(to_string = "Lower Rate Limit")]
    #[serde(rename = "Lower Rate Limit")]
    LowerRateLimit,
    #[strum(to_string = "Upper Rate Limit")]
    #[serde(rename = "Upper Rate Limit")]
    UpperRateLimit,
    #[strum(to_string = "Atrial Amplitude")]
    #[serde(rename = "Atrial Amplitude")]
    AtrialAmplitude,
    #[strum(to_string = "Atrial Pulse Width")]
    #[serde(rename = "Atrial Pulse Width")]
    AtrialPulseWidth,
    #[strum(to_string = "Atrial Sensitivity")]
    #[serde(rename = "Atrial Sensitivity")]
    AtrialSensitivity,
    #[strum(to_string = "Ventricular Amplitude")]
    #[serde(rename = "Ventricular Amplitude")]
    VentricularAmplitude,
    #[strum(to_string = "Ventricular Pulse Width")]
    #[serde(rename = "Ventricular Pulse Width")]
    VentricularPulseWidth,
    #[strum(to_string = "Ventricular Sensitivity")]
    #[serde(rename = "Ventricular Sensitivity")]
    VentricularSensitivity,
    #[strum(to_string = "VRP")]
    #[serde(rename = "VRP")]
    Vrp,
    #[strum(to_string = "ARP")]
    #[serde(rename = "ARP")]
    Arp,
    #[strum(to_string = "PVARP")]
    #[serde(rename = "PVARP")]
    Pvarp,
    #[strum(to_string = "Maximum Sensor Rate")]
    #[serde(rename = "Maximum Sensor Rate")]
    MaximumSensorRate,
    #[strum(to_string = "Reaction Time")]
    #[serde(rename = "Reaction Time")]
    ReactionTime,
    #[strum(to_string = "Response Factor")]
    #[serde(rename = "Response Factor")]
    ResponseFactor,
    #[strum(to_string = "Recovery Time")]
    #[serde(rename = "Recovery Time")]
    RecoveryTime,
    #[strum(to_string = "Activity Threshold")]
    #[serde(rename = "Activity Threshold")]
    ActivityThreshold,
    #[strum(to_string = "Hysteresis")]
    #[serde(rename = "Hysteresis")]
    Hysteresis,
    #[strum(to_string = "Rate Smoothing")]
    #[serde(rename = "Rate Smoothing")]
    RateSmoothing,
}

/// What a parameter measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Pacing rate in pulses per minute
    Rate,
    /// Amplitude or sensing threshold
    Voltage,
    /// Pulse width, refractory period or sensor timing
    Time,
    /// Plain integer count or percentage
    Count,
    /// One of the labeled [`ActivityThreshold`] levels
    Level,
}

/// Width of a field on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    U16,
    F32,
}

impl WireType {
    pub fn size(&self) -> usize {
        match self {
            WireType::U8 => 1,
            WireType::U16 => 2,
            WireType::F32 => 4,
        }
    }
}

impl Parameter {
    pub const ALL: [Parameter; 18] = [
        Parameter::LowerRateLimit,
        Parameter::UpperRateLimit,
        Parameter::AtrialAmplitude,
        Parameter::AtrialPulseWidth,
        Parameter::AtrialSensitivity,
        Parameter::VentricularAmplitude,
        Parameter::VentricularPulseWidth,
        Parameter::VentricularSensitivity,
        Parameter::Vrp,
        Parameter::Arp,
        Parameter::Pvarp,
        Parameter::MaximumSensorRate,
        Parameter::ReactionTime,
        Parameter::ResponseFactor,
        Parameter::RecoveryTime,
        Parameter::ActivityThreshold,
        Parameter::Hysteresis,
        Parameter::RateSmoothing,
    ];

    /// Look a parameter up by the display name the console stores it under.
    pub fn from_name(name: &str) -> Option<Parameter> {
        Parameter::ALL.into_iter().find(|p| p.to_string() == name)
    }

    pub fn kind(&self) -> ParameterKind {
        use Parameter::*;
        match self {
            LowerRateLimit | UpperRateLimit | MaximumSensorRate | Hysteresis => ParameterKind::Rate,
            AtrialAmplitude | VentricularAmplitude | AtrialSensitivity | VentricularSensitivity => {
                ParameterKind::Voltage
            }
            AtrialPulseWidth | VentricularPulseWidth | Vrp | Arp | Pvarp | ReactionTime | RecoveryTime => {
                ParameterKind::Time
            }
            ResponseFactor | RateSmoothing => ParameterKind::Count,
            ActivityThreshold => ParameterKind::Level,
        }
    }

    pub fn wire_type(&self) -> WireType {
        use Parameter::*;
        match self {
            AtrialAmplitude | AtrialPulseWidth | AtrialSensitivity | VentricularAmplitude
            | VentricularPulseWidth | VentricularSensitivity => WireType::F32,
            Vrp | Arp | Pvarp => WireType::U16,
            _ => WireType::U8,
        }
    }

    pub fn unit(&self) -> &'static str {
        use Parameter::*;
        match self {
            LowerRateLimit | UpperRateLimit | MaximumSensorRate | Hysteresis => "ppm",
            AtrialAmplitude | VentricularAmplitude => "V",
            AtrialSensitivity | VentricularSensitivity => "mV",
            AtrialPulseWidth | VentricularPulseWidth | Vrp | Arp | Pvarp => "ms",
            ReactionTime => "s",
            RecoveryTime => "min",
            RateSmoothing => "%",
            ResponseFactor | ActivityThreshold => "",
        }
    }

    /// Programmable range `(low, high)`. The device is the final authority; this
    /// range is only used to flag suspicious values before sending.
    pub fn range(&self) -> (f64, f64) {
        use Parameter::*;
        match self {
            LowerRateLimit => (30.0, 175.0),
            UpperRateLimit => (50.0, 175.0),
            AtrialAmplitude | VentricularAmplitude => (0.5, 7.0),
            AtrialPulseWidth | VentricularPulseWidth => (0.05, 1.9),
            AtrialSensitivity => (0.25, 10.0),
            VentricularSensitivity => (1.0, 10.0),
            Vrp | Arp | Pvarp => (150.0, 500.0),
            MaximumSensorRate => (50.0, 175.0),
            ReactionTime => (10.0, 50.0),
            ResponseFactor => (1.0, 16.0),
            RecoveryTime => (2.0, 16.0),
            ActivityThreshold => (1.0, 7.0),
            Hysteresis => (0.0, 175.0),
            RateSmoothing => (0.0, 25.0),
        }
    }

    /// Value used when no operator value is known.
    pub fn nominal(&self) -> Value {
        use Parameter::*;
        match self {
            LowerRateLimit => Value::Number(60.0),
            UpperRateLimit => Value::Number(120.0),
            AtrialAmplitude | VentricularAmplitude => Value::Number(5.0),
            AtrialPulseWidth | VentricularPulseWidth => Value::Number(1.0),
            AtrialSensitivity => Value::Number(0.75),
            VentricularSensitivity => Value::Number(2.5),
            Vrp => Value::Number(320.0),
            Arp | Pvarp => Value::Number(250.0),
            MaximumSensorRate => Value::Number(120.0),
            ReactionTime => Value::Number(30.0),
            ResponseFactor => Value::Number(8.0),
            RecoveryTime => Value::Number(5.0),
            ActivityThreshold => Value::Label(self::ActivityThreshold::Med.to_string()),
            Hysteresis | RateSmoothing => Value::Number(0.0),
        }
    }
}

/// Accelerometer activity threshold, stored by the console as a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum ActivityThreshold {
    #[strum(to_string = "V-Low")]
    VLow = 1,
    #[strum(to_string = "Low")]
    Low = 2,
    #[strum(to_string = "Med-Low")]
    MedLow = 3,
    #[strum(to_string = "Med")]
    Med = 4,
    #[strum(to_string = "Med-High")]
    MedHigh = 5,
    #[strum(to_string = "High")]
    High = 6,
    #[strum(to_string = "V-High")]
    VHigh = 7,
}

impl ActivityThreshold {
    pub const ALL: [ActivityThreshold; 7] = [
        ActivityThreshold::VLow,
        ActivityThreshold::Low,
        ActivityThreshold::MedLow,
        ActivityThreshold::Med,
        ActivityThreshold::MedHigh,
        ActivityThreshold::High,
        ActivityThreshold::VHigh,
    ];

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        ActivityThreshold::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        ActivityThreshold::ALL.into_iter().find(|t| t.to_string() == label.trim())
    }

    /// Wire code for a stored label. Unknown labels fall back to `Med` so a
    /// cosmetic mismatch never blocks a send.
    pub fn code_for_label(label: &str) -> u8 {
        Self::from_label(label).unwrap_or(ActivityThreshold::Med).code()
    }
}

/// A stored parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Label(String),
}

impl Value {
    /// Numeric view of the value; labels resolve only if they name an activity level.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Label(l) => ActivityThreshold::from_label(l).map(|t| t.code() as f64),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<ActivityThreshold> for Value {
    fn from(t: ActivityThreshold) -> Self {
        Value::Label(t.to_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Label(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Label(l) => f.write_str(l),
        }
    }
}

/// Parameter values keyed by parameter, iterated in canonical wire order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<Parameter, Value>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A full set holding every parameter's nominal value.
    pub fn nominal() -> Self {
        Parameter::ALL.into_iter().map(|p| (p, p.nominal())).collect()
    }

    /// Builder-style insert
    pub fn with(mut self, parameter: Parameter, value: impl Into<Value>) -> Self {
        self.insert(parameter, value);
        self
    }

    pub fn insert(&mut self, parameter: Parameter, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(parameter, value.into())
    }

    pub fn get(&self, parameter: Parameter) -> Option<&Value> {
        self.values.get(&parameter)
    }

    pub fn number(&self, parameter: Parameter) -> Option<f64> {
        self.get(parameter).and_then(Value::as_number)
    }

    pub fn contains(&self, parameter: Parameter) -> bool {
        self.values.contains_key(&parameter)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Parameter, &Value)> {
        self.values.iter().map(|(p, v)| (*p, v))
    }

    /// Parameters `mode` needs that this set does not hold with a usable value.
    ///
    /// A label on a numeric parameter counts as missing. Activity Threshold
    /// takes any label, unknown ones are sent as the middle level.
    pub fn missing_for(&self, mode: Mode) -> Vec<Parameter> {
        mode.parameters()
            .iter()
            .copied()
            .filter(|p| match self.get(*p) {
                None => true,
                Some(_) if p.kind() == ParameterKind::Level => false,
                Some(v) => v.as_number().is_none(),
            })
            .collect()
    }

    /// Copy of this set holding only what `mode` uses.
    pub fn restricted_to(&self, mode: Mode) -> Self {
        self.iter()
            .filter(|(p, _)| mode.uses(*p))
            .map(|(p, v)| (p, v.clone()))
            .collect()
    }

    /// Numeric values that fall outside their parameter's programmable range.
    pub fn out_of_range(&self) -> Vec<(Parameter, f64)> {
        self.iter()
            .filter_map(|(p, v)| {
                let n = v.as_number()?;
                let (low, high) = p.range();
                (n < low || n > high).then_some((p, n))
            })
            .collect()
    }
}

impl FromIterator<(Parameter, Value)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (Parameter, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_matches_declaration() {
        let mut sorted = Parameter::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Parameter::ALL.to_vec());
    }

    #[test]
    fn test_names_round_trip() {
        for p in Parameter::ALL {
            assert_eq!(Parameter::from_name(&p.to_string()), Some(p));
        }
        assert_eq!(Parameter::from_name("Lower Rate Limit"), Some(Parameter::LowerRateLimit));
        assert_eq!(Parameter::from_name("Pulse Rate"), None);
    }

    #[test]
    fn test_activity_threshold_labels() {
        assert_eq!(ActivityThreshold::code_for_label("V-Low"), 1);
        assert_eq!(ActivityThreshold::code_for_label("Med-High"), 5);
        assert_eq!(ActivityThreshold::code_for_label("V-High"), 7);
        // unknown labels fall back to the middle level
        assert_eq!(ActivityThreshold::code_for_label("Medium"), 4);
        assert_eq!(ActivityThreshold::from_code(3), Some(ActivityThreshold::MedLow));
        assert_eq!(ActivityThreshold::from_code(0), None);
    }

    #[test]
    fn test_parameter_set_json_layout() {
        let json = r#"{"Lower Rate Limit": 60, "Atrial Amplitude": 3.5, "Activity Threshold": "High"}"#;
        let set: ParameterSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.number(Parameter::LowerRateLimit), Some(60.0));
        assert_eq!(set.number(Parameter::AtrialAmplitude), Some(3.5));
        assert_eq!(set.get(Parameter::ActivityThreshold), Some(&Value::Label("High".into())));
        assert_eq!(set.number(Parameter::ActivityThreshold), Some(6.0));

        let back = serde_json::to_value(&set).unwrap();
        assert_eq!(back["Lower Rate Limit"], 60.0);
    }

    #[test]
    fn test_missing_and_restricted() {
        let set = ParameterSet::new()
            .with(Parameter::LowerRateLimit, 60.0)
            .with(Parameter::UpperRateLimit, 120.0)
            .with(Parameter::AtrialAmplitude, 3.5)
            .with(Parameter::Vrp, 320.0);

        assert_eq!(set.missing_for(Mode::Aoo), vec![Parameter::AtrialPulseWidth]);
        let restricted = set.restricted_to(Mode::Aoo);
        assert!(!restricted.contains(Parameter::Vrp));
        assert_eq!(restricted.len(), 3);
    }

    #[test]
    fn test_labels_on_numeric_parameters_are_missing() {
        let set = ParameterSet::nominal()
            .with(Parameter::LowerRateLimit, Value::Label("sixty".into()))
            .with(Parameter::UpperRateLimit, Value::Label(String::new()))
            .with(Parameter::ActivityThreshold, Value::Label("Medium".into()));

        assert_eq!(
            set.missing_for(Mode::Aai),
            vec![Parameter::LowerRateLimit, Parameter::UpperRateLimit]
        );
        assert!(set.missing_for(Mode::Aair).contains(&Parameter::LowerRateLimit));
        assert!(!set.missing_for(Mode::Aair).contains(&Parameter::ActivityThreshold));
    }

    #[test]
    fn test_nominal_activity_threshold_is_med() {
        assert_eq!(Parameter::ActivityThreshold.nominal(), Value::Label("Med".into()));
        assert_eq!(Parameter::ActivityThreshold.nominal().as_number(), Some(4.0));
        assert_eq!(Parameter::LowerRateLimit.nominal(), Value::Number(60.0));
    }

    #[test]
    fn test_nominal_set_is_in_range() {
        let set = ParameterSet::nominal();
        assert_eq!(set.len(), Parameter::ALL.len());
        assert!(set.out_of_range().is_empty());

        let bad = set.with(Parameter::Arp, 900.0);
        assert_eq!(bad.out_of_range(), vec![(Parameter::Arp, 900.0)]);
    }
}
