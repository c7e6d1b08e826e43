use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::datapoint::{
    Command, DatapointError, Mode, RawDatapoint, Status, WindowState, TEMP_CURRENT, TEMP_SET,
};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Response envelope
//
// Every successful Ally API response wraps its payload the same way:
//
//   { "result": <T>, "t": 1700000000000 }
//
// Errors use a problem-detail body instead:
//
//   { "type": "...", "title": "...", "status": 401, "detail": "...", "message_id": "..." }
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AllyResponse<T> {
    pub result: T,

    /// 13-digit Unix timestamp in milliseconds returned by the server.
    pub t: i64,
}

impl<T> AllyResponse<T> {
    /// Server timestamp, if it is a representable instant.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.t).single()
    }

    pub(crate) fn try_map<U>(
        self,
        f: impl FnOnce(T) -> Result<U, DatapointError>,
    ) -> Result<AllyResponse<U>, DatapointError> {
        Ok(AllyResponse {
            result: f(self.result)?,
            t: self.t,
        })
    }
}

/// Structured error body. Every field is optional because the body is only
/// used to enrich an error that already carries the HTTP status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProblemDetail {
    #[serde(rename = "type")]
    pub problem_type: Option<String>,
    pub title: Option<String>,
    pub status: Option<u16>,
    pub detail: Option<String>,
    pub message_id: Option<String>,
}

impl ProblemDetail {
    /// Parse an error body, returning `None` when it is not a problem detail.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|p| p.title.is_some() || p.detail.is_some() || p.problem_type.is_some())
    }
}

// ---------------------------------------------------------------------------
// Token: POST /oauth2/token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessToken {
    /// Bearer token passed to every device call.
    pub access_token: String,

    /// Normally `"Bearer"`.
    pub token_type: String,

    /// Validity period in **seconds**.
    pub expires_in: i64,
}

impl AccessToken {
    /// `Authorization` header value, e.g. `"Bearer abc123"`.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// When the token stops being accepted, given when it was issued.
    ///
    /// `None` if `expires_in` is too large to represent as an instant.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        TimeDelta::try_seconds(self.expires_in).and_then(|ttl| issued_at.checked_add_signed(ttl))
    }

    /// A token whose expiry cannot be represented never expires.
    pub fn is_expired(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expires_at(issued_at).is_some_and(|at| now >= at)
    }
}

// ---------------------------------------------------------------------------
// Devices: GET /ally/devices, GET /ally/devices/{id}
// ---------------------------------------------------------------------------

/// A device as it appears on the wire, before its datapoints are checked.
#[derive(Debug, Deserialize)]
pub struct DeviceRecord {
    id: String,
    name: String,
    online: bool,
    active_time: i64,
    create_time: i64,
    update_time: i64,
    time_zone: String,
    sub: bool,
    device_type: String,
    #[serde(default)]
    status: Vec<RawDatapoint>,
}

/// A device owned by the account, with a snapshot of its datapoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub online: bool,
    /// Unix timestamp in seconds of the last activation.
    pub active_time: i64,
    pub create_time: i64,
    pub update_time: i64,
    /// UTC offset, e.g. `"+01:00"`.
    pub time_zone: String,
    /// `true` if the device sits behind a gateway.
    pub sub: bool,
    pub device_type: String,
    pub status: Vec<Status>,
}

impl Device {
    /// First reported datapoint with the given code.
    pub fn status(&self, code: &str) -> Option<&Status> {
        self.status.iter().find(|dp| dp.code() == code)
    }

    pub fn active_at(&self) -> Option<DateTime<Utc>> {
        unix_seconds(self.active_time)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        unix_seconds(self.create_time)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        unix_seconds(self.update_time)
    }
}

impl TryFrom<DeviceRecord> for Device {
    type Error = DatapointError;

    fn try_from(record: DeviceRecord) -> Result<Self, DatapointError> {
        Ok(Self {
            id: record.id,
            name: record.name,
            online: record.online,
            active_time: record.active_time,
            create_time: record.create_time,
            update_time: record.update_time,
            time_zone: record.time_zone,
            sub: record.sub,
            device_type: record.device_type,
            status: parse_status(record.status)?,
        })
    }
}

/// Check every raw datapoint against the schema, failing on the first bad one.
pub(crate) fn parse_status(raw: Vec<RawDatapoint>) -> Result<Vec<Status>, DatapointError> {
    raw.into_iter().map(Status::try_from).collect()
}

// ---------------------------------------------------------------------------
// Sub-devices: GET /ally/devices/{id}/sub-devices
// ---------------------------------------------------------------------------

/// The reduced device projection listed under a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub online: bool,
    pub active_time: i64,
    pub create_time: i64,
}

// ---------------------------------------------------------------------------
// Commands: POST /ally/devices/{id}/commands
// ---------------------------------------------------------------------------

/// Request body sent to the commands endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct SendCommandRequest<'a> {
    pub commands: &'a [Command],
}

// ---------------------------------------------------------------------------
// Typed thermostat status
//
// Built from a slice of datapoints via TryFrom rather than deserialised
// directly, so devices reporting extra or undocumented codes still map.
// ---------------------------------------------------------------------------

/// Typed view of an Ally radiator thermostat.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatStatus {
    /// Raw value: 215 → 21.5 °C.
    pub temp_set: i64,
    /// Raw value: 198 → 19.8 °C.
    pub temp_current: i64,
    pub switch: Option<bool>,
    pub mode: Option<Mode>,
    pub lower_temp: Option<i64>,
    pub upper_temp: Option<i64>,
    pub child_lock: Option<bool>,
    pub window_state: Option<WindowState>,
    pub battery_percentage: Option<i64>,
}

impl ThermostatStatus {
    /// Target setpoint in °C.
    pub fn temp_set_celsius(&self) -> f64 {
        self.temp_set as f64 / 10.0
    }

    /// Measured room temperature in °C.
    pub fn temp_current_celsius(&self) -> f64 {
        self.temp_current as f64 / 10.0
    }

    pub fn window_open(&self) -> bool {
        self.window_state == Some(WindowState::Open)
    }
}

impl TryFrom<&[Status]> for ThermostatStatus {
    type Error = Error;

    fn try_from(dps: &[Status]) -> Result<Self, Error> {
        let mut view = PartialThermostat::default();
        for dp in dps {
            match *dp {
                Status::TempSet(v) => view.temp_set = Some(v),
                Status::TempCurrent(v) => view.temp_current = Some(v),
                Status::Switch(v) => view.switch = Some(v),
                Status::Mode(v) => view.mode = Some(v),
                Status::LowerTemp(v) => view.lower_temp = Some(v),
                Status::UpperTemp(v) => view.upper_temp = Some(v),
                Status::ChildLock(v) => view.child_lock = Some(v),
                Status::WindowState(v) => view.window_state = Some(v),
                Status::BatteryPercentage(v) => view.battery_percentage = Some(v),
                Status::FactoryReset(_) | Status::Generic { .. } => {}
            }
        }

        Ok(Self {
            temp_set: view.temp_set.ok_or(Error::MissingDatapoint { code: TEMP_SET })?,
            temp_current: view
                .temp_current
                .ok_or(Error::MissingDatapoint { code: TEMP_CURRENT })?,
            switch: view.switch,
            mode: view.mode,
            lower_temp: view.lower_temp,
            upper_temp: view.upper_temp,
            child_lock: view.child_lock,
            window_state: view.window_state,
            battery_percentage: view.battery_percentage,
        })
    }
}

#[derive(Default)]
struct PartialThermostat {
    temp_set: Option<i64>,
    temp_current: Option<i64>,
    switch: Option<bool>,
    mode: Option<Mode>,
    lower_temp: Option<i64>,
    upper_temp: Option<i64>,
    child_lock: Option<bool>,
    window_state: Option<WindowState>,
    battery_percentage: Option<i64>,
}

fn unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
