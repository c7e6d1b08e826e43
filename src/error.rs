use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::ally::{datapoint::DatapointError, models::ProblemDetail};

/// The Ally API call an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AcquireToken,
    ListDevices,
    GetDeviceDetail,
    QueryLatestStatus,
    QueryDevicesUnderGateway,
    IssueCommand,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::AcquireToken => "acquire_token",
            Operation::ListDevices => "list_devices",
            Operation::GetDeviceDetail => "get_device_detail",
            Operation::QueryLatestStatus => "query_latest_status",
            Operation::QueryDevicesUnderGateway => "query_devices_under_gateway",
            Operation::IssueCommand => "issue_command",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the Ally client can report.
///
/// Nothing is retried; each variant carries enough context (status code,
/// offending datapoint) to diagnose the failure from a log line.
#[derive(Debug, Error)]
pub enum Error {
    /// The token endpoint rejected the client credentials.
    #[error("token exchange rejected (HTTP {status} {status_text})")]
    Auth { status: u16, status_text: String },

    /// A device endpoint answered with a non-2xx status.
    #[error("{operation} failed (HTTP {status} {status_text}){}", problem_suffix(.problem))]
    Api {
        operation: Operation,
        status: u16,
        status_text: String,
        problem: Option<ProblemDetail>,
    },

    /// A 2xx body did not have the expected shape.
    #[error("{operation}: malformed response: {message}")]
    MalformedResponse { operation: Operation, message: String },

    /// A datapoint value is outside the domain of its code.
    #[error(transparent)]
    InvalidDatapoint(#[from] DatapointError),

    /// The request never produced an HTTP response.
    #[error("{operation}: transport error: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    /// A typed status view needs a datapoint the device did not report.
    #[error("missing required datapoint {code:?}")]
    MissingDatapoint { code: &'static str },

    /// The request URL could not be built from the base URL and device id.
    #[error("{operation}: invalid request url: {message}")]
    InvalidUrl { operation: Operation, message: String },
}

impl Error {
    /// Returns `true` if fetching a new token might resolve this error.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth { .. } => true,
            Self::Api { status, .. } => *status == StatusCode::UNAUTHORIZED.as_u16(),
            _ => false,
        }
    }

    /// HTTP status of the failed call, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn transport(operation: Operation) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { operation, source }
    }

    pub(crate) fn malformed(operation: Operation, err: impl fmt::Display) -> Self {
        Self::MalformedResponse {
            operation,
            message: err.to_string(),
        }
    }
}

fn problem_suffix(problem: &Option<ProblemDetail>) -> String {
    let Some(problem) = problem else {
        return String::new();
    };
    match (&problem.title, &problem.detail) {
        (Some(title), Some(detail)) => format!(": {title}: {detail}"),
        (Some(text), None) | (None, Some(text)) => format!(": {text}"),
        (None, None) => String::new(),
    }
}

/// Reason phrase for a status code, e.g. `"Unauthorized"` for 401.
pub(crate) fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_owned()
}
