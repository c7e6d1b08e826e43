use std::{fmt, str::FromStr};

use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Datapoint codes
//
// The Ally cloud exposes every device attribute as a flat `{code, value}` pair.
// Temperatures are integers in tenths of a degree: 215 = 21.5 °C.
// ---------------------------------------------------------------------------

pub const SWITCH: &str = "switch";
pub const MODE: &str = "mode";
pub const TEMP_SET: &str = "temp_set";
pub const LOWER_TEMP: &str = "lower_temp";
pub const UPPER_TEMP: &str = "upper_temp";
pub const CHILD_LOCK: &str = "child_lock";
pub const FACTORY_RESET: &str = "factory_reset";
pub const TEMP_CURRENT: &str = "temp_current";
pub const WINDOW_STATE: &str = "window_state";
pub const BATTERY_PERCENTAGE: &str = "battery_percentage";

const MODE_LITERALS: &[&str] = &["holiday", "manual"];
const WINDOW_STATE_LITERALS: &[&str] = &["close", "open"];

/// Every datapoint the schema knows about, with its value domain.
///
/// Codes missing from this table are passed through as `Generic` datapoints.
pub const DATAPOINTS: &[DatapointSpec] = &[
    DatapointSpec::writable(SWITCH, Domain::Bool),
    DatapointSpec::writable(MODE, Domain::Literal(MODE_LITERALS)),
    DatapointSpec::writable(TEMP_SET, Domain::integer(50, 350, 5)),
    DatapointSpec::writable(LOWER_TEMP, Domain::integer(50, 200, 5)),
    DatapointSpec::writable(UPPER_TEMP, Domain::integer(200, 350, 5)),
    DatapointSpec::writable(CHILD_LOCK, Domain::Bool),
    DatapointSpec::writable(FACTORY_RESET, Domain::Bool),
    DatapointSpec::read_only(TEMP_CURRENT, Domain::integer(-100, 500, 1)),
    DatapointSpec::read_only(WINDOW_STATE, Domain::Literal(WINDOW_STATE_LITERALS)),
    DatapointSpec::read_only(BATTERY_PERCENTAGE, Domain::integer(0, 100, 1)),
];

/// Look up the schema entry for `code`.
pub fn lookup(code: &str) -> Option<&'static DatapointSpec> {
    DATAPOINTS.iter().find(|spec| spec.code == code)
}

/// Check `value` against the domain registered for `code`.
///
/// Unknown codes are unconstrained apart from rejecting non-finite floats.
pub fn validate(code: &str, value: &DpValue) -> Result<(), DatapointError> {
    match lookup(code) {
        Some(spec) => spec.check(value).map(|_| ()),
        None => check_unconstrained(code, value),
    }
}

/// Like [`validate`], but also rejects read-only codes.
pub fn validate_command(code: &str, value: &DpValue) -> Result<(), DatapointError> {
    match lookup(code) {
        Some(spec) if spec.access == Access::ReadOnly => {
            Err(DatapointError::new(code, value.clone(), Violation::ReadOnly))
        }
        Some(spec) => spec.check(value).map(|_| ()),
        None => check_unconstrained(code, value),
    }
}

/// Unknown codes accept any value JSON can carry. NaN and infinities cannot
/// be written as JSON numbers.
fn check_unconstrained(code: &str, value: &DpValue) -> Result<(), DatapointError> {
    match value {
        DpValue::Float(v) if !v.is_finite() => Err(DatapointError::new(
            code,
            value.clone(),
            Violation::NonFinite,
        )),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// DpValue: the untyped value carried on the wire
//
// Bool MUST come before the numeric variants and Integer before Float, so that
// `true` stays a bool and `215` stays an integer under #[serde(untagged)].
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DpValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl DpValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DpValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DpValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DpValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for DpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpValue::Bool(v) => write!(f, "{v}"),
            DpValue::Integer(v) => write!(f, "{v}"),
            DpValue::Float(v) => write!(f, "{v}"),
            DpValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for DpValue {
    fn from(v: bool) -> Self {
        DpValue::Bool(v)
    }
}

impl From<i64> for DpValue {
    fn from(v: i64) -> Self {
        DpValue::Integer(v)
    }
}

impl From<f64> for DpValue {
    fn from(v: f64) -> Self {
        DpValue::Float(v)
    }
}

impl From<&str> for DpValue {
    fn from(v: &str) -> Self {
        DpValue::Text(v.to_owned())
    }
}

impl From<String> for DpValue {
    fn from(v: String) -> Self {
        DpValue::Text(v)
    }
}

/// A datapoint exactly as it appears on the wire: `{"code": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawDatapoint {
    pub code: String,
    pub value: DpValue,
}

impl RawDatapoint {
    pub fn new(code: impl Into<String>, value: impl Into<DpValue>) -> Self {
        Self {
            code: code.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema table entries
// ---------------------------------------------------------------------------

/// The primitive type of a datapoint and the constraint its value must meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Bool,
    /// Inclusive range; valid values are `min + k * step`.
    Integer { min: i64, max: i64, step: i64 },
    /// One of a fixed set of string literals.
    Literal(&'static [&'static str]),
}

impl Domain {
    const fn integer(min: i64, max: i64, step: i64) -> Self {
        Domain::Integer { min, max, step }
    }

    /// Name of the primitive type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Domain::Bool => "boolean",
            Domain::Integer { .. } => "integer",
            Domain::Literal(_) => "enum",
        }
    }

    fn check(&self, value: &DpValue) -> Result<Checked, Violation> {
        match (self, value) {
            (Domain::Bool, DpValue::Bool(v)) => Ok(Checked::Bool(*v)),
            (Domain::Integer { min, max, step }, DpValue::Integer(v)) => {
                if v < min || v > max {
                    Err(Violation::OutOfRange {
                        min: *min,
                        max: *max,
                    })
                } else if (v - min) % step != 0 {
                    Err(Violation::OffStep { step: *step })
                } else {
                    Ok(Checked::Integer(*v))
                }
            }
            (Domain::Literal(allowed), DpValue::Text(v)) => allowed
                .iter()
                .copied()
                .find(|literal| *literal == v.as_str())
                .map(Checked::Literal)
                .ok_or(Violation::NotAllowed { allowed: *allowed }),
            _ => Err(Violation::TypeMismatch {
                expected: self.kind(),
            }),
        }
    }
}

/// Whether a client may write the datapoint or only the device reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatapointSpec {
    pub code: &'static str,
    pub domain: Domain,
    pub access: Access,
}

impl DatapointSpec {
    const fn writable(code: &'static str, domain: Domain) -> Self {
        Self {
            code,
            domain,
            access: Access::ReadWrite,
        }
    }

    const fn read_only(code: &'static str, domain: Domain) -> Self {
        Self {
            code,
            domain,
            access: Access::ReadOnly,
        }
    }

    fn check(&self, value: &DpValue) -> Result<Checked, DatapointError> {
        self.domain
            .check(value)
            .map_err(|reason| DatapointError::new(self.code, value.clone(), reason))
    }
}

/// A value that passed its domain check, reduced to the primitive it holds.
enum Checked {
    Bool(bool),
    Integer(i64),
    Literal(&'static str),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a value was rejected by its domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("expected a {expected} value")]
    TypeMismatch { expected: &'static str },

    #[error("value outside [{min}, {max}]")]
    OutOfRange { min: i64, max: i64 },

    #[error("value is not on a step of {step}")]
    OffStep { step: i64 },

    #[error("value is not one of {allowed:?}")]
    NotAllowed { allowed: &'static [&'static str] },

    #[error("datapoint is read-only")]
    ReadOnly,

    #[error("value is not a finite number")]
    NonFinite,
}

/// A datapoint whose value violates the domain of its code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid datapoint {code}={value}: {reason}")]
pub struct DatapointError {
    pub code: String,
    pub value: DpValue,
    pub reason: Violation,
}

impl DatapointError {
    fn new(code: impl Into<String>, value: DpValue, reason: Violation) -> Self {
        Self {
            code: code.into(),
            value,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Literal enums
// ---------------------------------------------------------------------------

/// Thermostat operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Energy-saving setpoint while the home is empty.
    Holiday,
    /// Fixed setpoint chosen by the user.
    Manual,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Holiday => "holiday",
            Mode::Manual => "manual",
        }
    }
}

impl FromStr for Mode {
    type Err = Violation;

    fn from_str(s: &str) -> Result<Self, Violation> {
        match s {
            "holiday" => Ok(Self::Holiday),
            "manual" => Ok(Self::Manual),
            _ => Err(Violation::NotAllowed {
                allowed: MODE_LITERALS,
            }),
        }
    }
}

/// Open-window detection state, inferred by the TRV from a sudden temperature drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowState {
    Close,
    Open,
}

impl WindowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowState::Close => "close",
            WindowState::Open => "open",
        }
    }
}

impl FromStr for WindowState {
    type Err = Violation;

    fn from_str(s: &str) -> Result<Self, Violation> {
        match s {
            "close" => Ok(Self::Close),
            "open" => Ok(Self::Open),
            _ => Err(Violation::NotAllowed {
                allowed: WINDOW_STATE_LITERALS,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Status: every datapoint the cloud may report
// ---------------------------------------------------------------------------

/// A datapoint reported by a device.
///
/// Known codes are parsed into typed variants whose values have passed the
/// schema check; anything else lands in `Generic`.
///
/// Equality compares the wire form, so a hand-built `Generic` carrying a
/// known code equals its typed variant.
#[derive(Debug, Clone)]
pub enum Status {
    Switch(bool),
    Mode(Mode),
    /// Target setpoint in tenths of °C.
    TempSet(i64),
    LowerTemp(i64),
    UpperTemp(i64),
    ChildLock(bool),
    FactoryReset(bool),
    /// Measured room temperature in tenths of °C.
    TempCurrent(i64),
    WindowState(WindowState),
    BatteryPercentage(i64),
    Generic { code: String, value: DpValue },
}

impl Status {
    pub fn code(&self) -> &str {
        match self {
            Status::Switch(_) => SWITCH,
            Status::Mode(_) => MODE,
            Status::TempSet(_) => TEMP_SET,
            Status::LowerTemp(_) => LOWER_TEMP,
            Status::UpperTemp(_) => UPPER_TEMP,
            Status::ChildLock(_) => CHILD_LOCK,
            Status::FactoryReset(_) => FACTORY_RESET,
            Status::TempCurrent(_) => TEMP_CURRENT,
            Status::WindowState(_) => WINDOW_STATE,
            Status::BatteryPercentage(_) => BATTERY_PERCENTAGE,
            Status::Generic { code, .. } => code,
        }
    }

    pub fn value(&self) -> DpValue {
        match self {
            Status::Switch(v) | Status::ChildLock(v) | Status::FactoryReset(v) => DpValue::Bool(*v),
            Status::TempSet(v)
            | Status::LowerTemp(v)
            | Status::UpperTemp(v)
            | Status::TempCurrent(v)
            | Status::BatteryPercentage(v) => DpValue::Integer(*v),
            Status::Mode(v) => DpValue::from(v.as_str()),
            Status::WindowState(v) => DpValue::from(v.as_str()),
            Status::Generic { value, .. } => value.clone(),
        }
    }

    pub fn to_raw(&self) -> RawDatapoint {
        RawDatapoint::new(self.code(), self.value())
    }

    /// Re-check the value against the schema.
    ///
    /// Typed variants can be built directly with any integer, so this is also
    /// run before serialising.
    pub fn validate(&self) -> Result<(), DatapointError> {
        validate(self.code(), &self.value())
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code() && self.value() == other.value()
    }
}

impl TryFrom<RawDatapoint> for Status {
    type Error = DatapointError;

    fn try_from(raw: RawDatapoint) -> Result<Self, DatapointError> {
        let Some(spec) = lookup(&raw.code) else {
            return Ok(Self::Generic {
                code: raw.code,
                value: raw.value,
            });
        };

        let mismatch = |raw: RawDatapoint| {
            DatapointError::new(
                raw.code,
                raw.value,
                Violation::TypeMismatch {
                    expected: spec.domain.kind(),
                },
            )
        };
        let literal_error = |raw: &RawDatapoint, reason: Violation| {
            DatapointError::new(raw.code.clone(), raw.value.clone(), reason)
        };

        let status = match (spec.code, spec.check(&raw.value)?) {
            (SWITCH, Checked::Bool(v)) => Self::Switch(v),
            (CHILD_LOCK, Checked::Bool(v)) => Self::ChildLock(v),
            (FACTORY_RESET, Checked::Bool(v)) => Self::FactoryReset(v),
            (TEMP_SET, Checked::Integer(v)) => Self::TempSet(v),
            (LOWER_TEMP, Checked::Integer(v)) => Self::LowerTemp(v),
            (UPPER_TEMP, Checked::Integer(v)) => Self::UpperTemp(v),
            (TEMP_CURRENT, Checked::Integer(v)) => Self::TempCurrent(v),
            (BATTERY_PERCENTAGE, Checked::Integer(v)) => Self::BatteryPercentage(v),
            (MODE, Checked::Literal(v)) => {
                Self::Mode(v.parse().map_err(|reason| literal_error(&raw, reason))?)
            }
            (WINDOW_STATE, Checked::Literal(v)) => {
                Self::WindowState(v.parse().map_err(|reason| literal_error(&raw, reason))?)
            }
            _ => return Err(mismatch(raw)),
        };

        Ok(status)
    }
}

impl From<Command> for Status {
    fn from(command: Command) -> Self {
        match command {
            Command::Switch(v) => Status::Switch(v),
            Command::Mode(v) => Status::Mode(v),
            Command::TempSet(v) => Status::TempSet(v),
            Command::LowerTemp(v) => Status::LowerTemp(v),
            Command::UpperTemp(v) => Status::UpperTemp(v),
            Command::ChildLock(v) => Status::ChildLock(v),
            Command::FactoryReset(v) => Status::FactoryReset(v),
            Command::Generic { code, value } => Status::Generic { code, value },
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.validate().map_err(ser::Error::custom)?;
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDatapoint::deserialize(deserializer)?;
        Self::try_from(raw).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Command: the writable subset
// ---------------------------------------------------------------------------

/// A datapoint a client may write to a device.
///
/// Like [`Status`], equality compares the wire form.
#[derive(Debug, Clone)]
pub enum Command {
    /// Heating enabled (`true`) or disabled.
    Switch(bool),
    Mode(Mode),
    /// Target setpoint in tenths of °C, `[50, 350]` step 5.
    TempSet(i64),
    /// Lowest setpoint a user may choose, `[50, 200]` step 5.
    LowerTemp(i64),
    /// Highest setpoint a user may choose, `[200, 350]` step 5.
    UpperTemp(i64),
    ChildLock(bool),
    /// `true` wipes the device configuration. Irreversible.
    FactoryReset(bool),
    /// Escape hatch for codes the schema does not model.
    Generic { code: String, value: DpValue },
}

impl Command {
    /// Build a command from an arbitrary code/value pair.
    ///
    /// Known codes are checked and turned into their typed variant; unknown
    /// codes become `Generic`.
    pub fn generic(code: impl Into<String>, value: impl Into<DpValue>) -> Result<Self, DatapointError> {
        Self::try_from(RawDatapoint::new(code, value))
    }

    /// Setpoint command from degrees Celsius, e.g. `21.5` → `temp_set = 215`.
    pub fn temp_set_celsius(celsius: f64) -> Result<Self, DatapointError> {
        if !celsius.is_finite() {
            return Err(DatapointError::new(
                TEMP_SET,
                DpValue::Float(celsius),
                Violation::NonFinite,
            ));
        }
        let command = Command::TempSet((celsius * 10.0).round() as i64);
        command.validate()?;
        Ok(command)
    }

    pub fn code(&self) -> &str {
        match self {
            Command::Switch(_) => SWITCH,
            Command::Mode(_) => MODE,
            Command::TempSet(_) => TEMP_SET,
            Command::LowerTemp(_) => LOWER_TEMP,
            Command::UpperTemp(_) => UPPER_TEMP,
            Command::ChildLock(_) => CHILD_LOCK,
            Command::FactoryReset(_) => FACTORY_RESET,
            Command::Generic { code, .. } => code,
        }
    }

    pub fn value(&self) -> DpValue {
        match self {
            Command::Switch(v) | Command::ChildLock(v) | Command::FactoryReset(v) => {
                DpValue::Bool(*v)
            }
            Command::TempSet(v) | Command::LowerTemp(v) | Command::UpperTemp(v) => {
                DpValue::Integer(*v)
            }
            Command::Mode(v) => DpValue::from(v.as_str()),
            Command::Generic { value, .. } => value.clone(),
        }
    }

    pub fn to_raw(&self) -> RawDatapoint {
        RawDatapoint::new(self.code(), self.value())
    }

    /// Check the command against the schema, including a `Generic` that
    /// carries a known code.
    pub fn validate(&self) -> Result<(), DatapointError> {
        validate_command(self.code(), &self.value())
    }

    /// `true` for commands whose effect cannot be undone (factory reset).
    pub fn is_destructive(&self) -> bool {
        self.code() == FACTORY_RESET && self.value() == DpValue::Bool(true)
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code() && self.value() == other.value()
    }
}

impl TryFrom<Status> for Command {
    type Error = DatapointError;

    fn try_from(status: Status) -> Result<Self, DatapointError> {
        match status {
            Status::Switch(v) => Ok(Command::Switch(v)),
            Status::Mode(v) => Ok(Command::Mode(v)),
            Status::TempSet(v) => Ok(Command::TempSet(v)),
            Status::LowerTemp(v) => Ok(Command::LowerTemp(v)),
            Status::UpperTemp(v) => Ok(Command::UpperTemp(v)),
            Status::ChildLock(v) => Ok(Command::ChildLock(v)),
            Status::FactoryReset(v) => Ok(Command::FactoryReset(v)),
            Status::Generic { code, value } => Ok(Command::Generic { code, value }),
            read_only @ (Status::TempCurrent(_)
            | Status::WindowState(_)
            | Status::BatteryPercentage(_)) => Err(DatapointError::new(
                read_only.code(),
                read_only.value(),
                Violation::ReadOnly,
            )),
        }
    }
}

impl TryFrom<RawDatapoint> for Command {
    type Error = DatapointError;

    fn try_from(raw: RawDatapoint) -> Result<Self, DatapointError> {
        Status::try_from(raw)?.try_into()
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.validate().map_err(ser::Error::custom)?;
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDatapoint::deserialize(deserializer)?;
        Self::try_from(raw).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
