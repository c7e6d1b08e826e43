//! Client for the Danfoss Ally™ cloud API.
//!
//! Obtain a token with [`AllyClient::acquire_token`], then pass it to the
//! device calls. Commands and reported status are typed through the
//! [`datapoint`](ally::datapoint) schema, which rejects values outside a
//! datapoint's domain before they reach a thermostat.

pub mod ally;
pub mod config;
pub mod error;

pub use ally::{
    datapoint::{Command, DatapointError, DpValue, Mode, Status, WindowState},
    models::{AccessToken, AllyResponse, Device, DeviceInfo, ProblemDetail, ThermostatStatus},
    AllyClient,
};
pub use config::Config;
pub use error::{Error, Operation};
