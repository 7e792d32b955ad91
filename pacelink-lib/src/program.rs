use crate::error::PacerError;
use crate::frame::EchoFrame;
use crate::mode::Mode;
use crate::parameters::{Parameter, ParameterSet, Value};
use crate::session::{Session, Transmission};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Where the active mode and the saved parameters come from.
///
/// Programming only ever reads from the store.
pub trait ParameterStore {
    fn active_mode(&self, user: &str) -> Option<Mode>;

    fn parameters(&self, user: &str, mode: Mode) -> Option<ParameterSet>;
}

/// Store held in memory, mostly for tests and scripted programming
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    modes: HashMap<String, Mode>,
    parameters: HashMap<(String, Mode), ParameterSet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_mode(&mut self, user: &str, mode: Mode) {
        self.modes.insert(user.to_string(), mode);
    }

    pub fn save_parameters(&mut self, user: &str, mode: Mode, parameters: ParameterSet) {
        self.parameters.insert((user.to_string(), mode), parameters);
    }
}

impl ParameterStore for MemoryStore {
    fn active_mode(&self, user: &str) -> Option<Mode> {
        self.modes.get(user).copied()
    }

    fn parameters(&self, user: &str, mode: Mode) -> Option<ParameterSet> {
        self.parameters.get(&(user.to_string(), mode)).cloned()
    }
}

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    parameters: HashMap<String, HashMap<String, HashMap<String, Value>>>,
    #[serde(default)]
    states: HashMap<String, String>,
}

/// Read-only view of the clinician console's JSON data file.
///
/// ```json
/// {
///   "parameters": { "alice": { "VVI": { "Lower Rate Limit": "60", "VRP": 320 } } },
///   "states": { "alice": "VVI" }
/// }
/// ```
///
/// Parameters are looked up under the mode's name, then under `"default"`.
/// Numeric strings are read as numbers and unknown keys are skipped. Other
/// top-level sections of the file are ignored.
#[derive(Debug, Default)]
pub struct JsonStore {
    file: StoreFile,
}

impl JsonStore {
    pub fn from_json(json: &str) -> Result<Self, PacerError> {
        Ok(Self {
            file: serde_json::from_str(json)?,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PacerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PacerError::Store(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_json(&text)?;
        info!("Loaded parameter store {} ({} user(s))", path.display(), store.file.states.len());
        Ok(store)
    }
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Label(s) => match s.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => value.clone(),
        },
        Value::Number(_) => value.clone(),
    }
}

impl ParameterStore for JsonStore {
    fn active_mode(&self, user: &str) -> Option<Mode> {
        let name = self.file.states.get(user)?;
        match name.parse() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Stored mode for {} is not usable: {}", user, e);
                None
            }
        }
    }

    fn parameters(&self, user: &str, mode: Mode) -> Option<ParameterSet> {
        let saved = self.file.parameters.get(user)?;
        let raw = saved.get(&mode.to_string()).or_else(|| saved.get("default"))?;

        let mut set = ParameterSet::new();
        for (name, value) in raw {
            match Parameter::from_name(name) {
                Some(p) => {
                    set.insert(p, normalize(value));
                }
                None => debug!("Skipping unknown stored parameter {:?}", name),
            }
        }
        Some(set)
    }
}

fn as_hex<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// One programming attempt that reached the wire
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub mode: Mode,
    pub parameters: ParameterSet,
    #[serde(serialize_with = "as_hex")]
    pub frame: Bytes,
    pub port: Option<String>,
}

/// Receives a record for every parameter frame sent to the device
pub trait AuditLog: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Writes audit records as `tracing` events under the `pacelink::audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditLog for TracingAudit {
    fn record(&self, record: &AuditRecord) {
        let parameters = serde_json::to_string(&record.parameters).unwrap_or_default();
        info!(
            target: "pacelink::audit",
            timestamp = %record.timestamp.to_rfc3339(),
            user = %record.user,
            mode = %record.mode,
            port = record.port.as_deref().unwrap_or("-"),
            frame = %hex::encode(&record.frame),
            parameters = %parameters,
            "Programmed device"
        );
    }
}

/// Result of programming with echo confirmation
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub frame: Bytes,
    pub echo: EchoFrame,
    /// The device read back exactly the bytes that were sent
    pub matches: bool,
}

/// "Program the device with the stored parameters of the selected mode."
///
/// Validation happens before anything touches the link: a request that fails
/// validation writes no bytes.
pub struct ProgrammingRequest<'a> {
    session: &'a Session,
    audit: Option<&'a dyn AuditLog>,
}

impl<'a> ProgrammingRequest<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session, audit: None }
    }

    pub fn with_audit(mut self, audit: &'a dyn AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Resolve and check the snapshot for `user` without sending anything.
    pub fn prepare(store: &dyn ParameterStore, user: &str) -> Result<(Mode, ParameterSet), PacerError> {
        let mode = store.active_mode(user).ok_or(PacerError::NoModeSelected)?;
        let saved = store.parameters(user, mode).unwrap_or_default();

        let missing = saved.missing_for(mode);
        if !missing.is_empty() {
            return Err(PacerError::MissingParameters { mode, missing });
        }

        let parameters = saved.restricted_to(mode);
        if let (Some(lower), Some(upper)) = (
            parameters.number(Parameter::LowerRateLimit),
            parameters.number(Parameter::UpperRateLimit),
        ) {
            if lower > upper {
                return Err(PacerError::RateLimitsInverted { lower, upper });
            }
        }

        for (p, n) in parameters.out_of_range() {
            let (low, high) = p.range();
            warn!("{} = {} {} is outside {}..={}", p, n, p.unit(), low, high);
        }

        Ok((mode, parameters))
    }

    fn transmit(&self, store: &dyn ParameterStore, user: &str) -> Result<Transmission, PacerError> {
        let (mode, parameters) = Self::prepare(store, user)?;
        if !self.session.is_connected() {
            return Err(PacerError::NotConnected);
        }

        let sent = self.session.send(mode, &parameters)?;
        if let Some(audit) = self.audit {
            audit.record(&AuditRecord {
                timestamp: Utc::now(),
                user: user.to_string(),
                mode,
                parameters,
                frame: sent.frame.clone(),
                port: self.session.port_name(),
            });
        }
        Ok(sent)
    }

    /// Send the stored parameters of `user`'s active mode. Returns the frame
    /// as written.
    pub fn program(&self, store: &dyn ParameterStore, user: &str) -> Result<Bytes, PacerError> {
        Ok(self.transmit(store, user)?.frame)
    }

    /// Like [`ProgrammingRequest::program`], then wait for the device to
    /// echo the frame back.
    pub async fn program_and_confirm(
        &self,
        store: &dyn ParameterStore,
        user: &str,
    ) -> Result<Confirmation, PacerError> {
        let sent = self.transmit(store, user)?;
        let frame = sent.frame.clone();
        let echo = self.session.await_echo(sent).await?;
        let matches = echo.confirms(&frame);
        if matches {
            info!("Device confirmed {} parameters", echo.mode().map_or("?".to_string(), |m| m.to_string()));
        } else {
            warn!(
                "Echo differs from sent frame: sent {}, got {}",
                hex::encode(&frame),
                hex::encode(&echo.raw)
            );
        }
        Ok(Confirmation { frame, echo, matches })
    }
}
