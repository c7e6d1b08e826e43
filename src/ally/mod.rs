pub mod datapoint;
pub mod models;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, RequestBuilder, Response, Url,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{status_text, Error, Operation},
};

use self::{
    datapoint::{Command, RawDatapoint, Status},
    models::{
        parse_status, AccessToken, AllyResponse, Device, DeviceInfo, DeviceRecord, ProblemDetail,
        SendCommandRequest,
    },
};

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api.danfoss.com";

/// Client for the Danfoss Ally cloud API.
///
/// Holds no credentials and no token: callers fetch a token with
/// [`acquire_token`](Self::acquire_token) and pass it to each device call.
/// Cloning is cheap and clones share the connection pool.
#[derive(Debug, Clone)]
pub struct AllyClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
}

impl AllyClient {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.base_url)
    }

    /// Point the client at another host, e.g. a mock server in tests.
    pub fn with_base_url(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_owned(),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // -----------------------------------------------------------------------
    // Token
    // -----------------------------------------------------------------------

    /// Exchange client credentials for a bearer token.
    ///
    /// Every call performs a fresh exchange; nothing is cached.
    pub async fn acquire_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AccessToken, Error> {
        let op = Operation::AcquireToken;
        let url = self.endpoint(op, &["oauth2", "token"])?;
        debug!(url = %url, "Requesting Ally access token");

        let resp = self
            .inner
            .http
            .post(url)
            .header(AUTHORIZATION, basic_authorization(client_id, client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(Error::transport(op))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Ally token exchange rejected");
            return Err(Error::Auth {
                status: status.as_u16(),
                status_text: status_text(status),
            });
        }

        let bytes = resp.bytes().await.map_err(Error::transport(op))?;
        let token = serde_json::from_slice::<AccessToken>(&bytes)
            .map_err(|e| Error::malformed(op, e))?;

        info!(expires_in = token.expires_in, "Obtained Ally access token");
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Devices
    // -----------------------------------------------------------------------

    /// List every device owned by the account.
    pub async fn list_devices(&self, token: &str) -> Result<AllyResponse<Vec<Device>>, Error> {
        let op = Operation::ListDevices;
        let url = self.endpoint(op, &["ally", "devices"])?;
        let resp: AllyResponse<Vec<DeviceRecord>> = self.get(op, token, url).await?;

        let devices: AllyResponse<Vec<Device>> = resp.try_map(|records| {
            records
                .into_iter()
                .map(Device::try_from)
                .collect::<Result<Vec<_>, _>>()
        })?;
        debug!(count = devices.result.len(), "Listed Ally devices");
        Ok(devices)
    }

    /// Fetch a single device by id.
    pub async fn get_device_detail(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AllyResponse<Device>, Error> {
        let op = Operation::GetDeviceDetail;
        let url = self.device_endpoint(op, device_id, None)?;
        let resp: AllyResponse<DeviceRecord> = self.get(op, token, url).await?;

        Ok(resp.try_map(Device::try_from)?)
    }

    /// Fetch the current datapoint snapshot of a device.
    pub async fn query_latest_status(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AllyResponse<Vec<Status>>, Error> {
        let op = Operation::QueryLatestStatus;
        let url = self.device_endpoint(op, device_id, Some("status"))?;
        let resp: AllyResponse<Vec<RawDatapoint>> = self.get(op, token, url).await?;

        Ok(resp.try_map(parse_status)?)
    }

    /// List the devices paired under a gateway.
    pub async fn query_devices_under_gateway(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AllyResponse<Vec<DeviceInfo>>, Error> {
        let op = Operation::QueryDevicesUnderGateway;
        let url = self.device_endpoint(op, device_id, Some("sub-devices"))?;
        self.get(op, token, url).await
    }

    /// Send a batch of commands to a device.
    ///
    /// Every command is checked against the datapoint schema first; one bad
    /// command rejects the whole batch before anything is sent.
    ///
    /// The API may answer 2xx with `result: false` when the device did not
    /// accept the batch. That is returned as `Ok` with `result == false`, not
    /// as an error, so callers must inspect `result`.
    pub async fn issue_command(
        &self,
        token: &str,
        device_id: &str,
        commands: &[Command],
    ) -> Result<AllyResponse<bool>, Error> {
        let op = Operation::IssueCommand;
        let url = self.device_endpoint(op, device_id, Some("commands"))?;

        for command in commands {
            command.validate()?;
        }

        for command in commands.iter().filter(|c| c.is_destructive()) {
            warn!(device_id = %device_id, code = %command.code(), "Sending destructive command");
        }

        debug!(device_id = %device_id, count = commands.len(), "Sending commands to device");

        let request = self
            .request(self.inner.http.post(url), token)
            .json(&SendCommandRequest { commands });
        let resp: AllyResponse<bool> = self.send(op, request).await?;

        if !resp.result {
            warn!(device_id = %device_id, "Ally accepted the request but reported result=false");
        }
        Ok(resp)
    }

    // -----------------------------------------------------------------------
    // Transport helpers
    // -----------------------------------------------------------------------

    /// Append `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, op: Operation, segments: &[&str]) -> Result<Url, Error> {
        let invalid = |message: String| Error::InvalidUrl {
            operation: op,
            message,
        };

        let mut url = Url::parse(&self.inner.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid(format!("{} cannot carry a path", self.inner.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `/ally/devices/{device_id}[/{tail}]`.
    ///
    /// The id always stays a single path segment: `/`, `?` and `#` are
    /// escaped, and ids that would collapse the path are refused.
    fn device_endpoint(
        &self,
        op: Operation,
        device_id: &str,
        tail: Option<&str>,
    ) -> Result<Url, Error> {
        if matches!(device_id, "" | "." | "..") {
            return Err(Error::InvalidUrl {
                operation: op,
                message: format!("device id {device_id:?} is not a usable path segment"),
            });
        }

        match tail {
            Some(tail) => self.endpoint(op, &["ally", "devices", device_id, tail]),
            None => self.endpoint(op, &["ally", "devices", device_id]),
        }
    }

    fn request(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {token}"))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        op: Operation,
        token: &str,
        url: Url,
    ) -> Result<AllyResponse<T>, Error> {
        debug!(operation = %op, url = %url, "GET");

        let request = self.request(self.inner.http.get(url), token);
        self.send(op, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        op: Operation,
        request: RequestBuilder,
    ) -> Result<AllyResponse<T>, Error> {
        let resp = request.send().await.map_err(Error::transport(op))?;
        parse_envelope(op, resp).await
    }
}

/// Turn a response into the `{result, t}` envelope, or the matching error.
async fn parse_envelope<T: DeserializeOwned>(
    op: Operation,
    resp: Response,
) -> Result<AllyResponse<T>, Error> {
    let status = resp.status();

    if !status.is_success() {
        // An unreadable error body still reports the status.
        let problem = match resp.bytes().await {
            Ok(body) => ProblemDetail::parse(&body),
            Err(e) => {
                debug!(operation = %op, error = %e, "Could not read error body");
                None
            }
        };
        warn!(operation = %op, status = status.as_u16(), "Ally API returned error status");
        return Err(Error::Api {
            operation: op,
            status: status.as_u16(),
            status_text: status_text(status),
            problem,
        });
    }

    let bytes = resp.bytes().await.map_err(Error::transport(op))?;
    serde_json::from_slice::<AllyResponse<T>>(&bytes).map_err(|e| Error::malformed(op, e))
}

/// `Basic base64(client_id:client_secret)` header value.
pub(crate) fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    let credentials = STANDARD.encode(format!("{client_id}:{client_secret}"));
    format!("Basic {credentials}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_authorization_encodes_id_and_secret() {
        // base64("client:secret")
        assert_eq!(
            basic_authorization("client", "secret"),
            "Basic Y2xpZW50OnNlY3JldA=="
        );
    }

    #[test]
    fn basic_authorization_keeps_colons_in_secret() {
        let header = basic_authorization("id", "a:b");
        let encoded = header.strip_prefix("Basic ").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, b"id:a:b");
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = AllyClient::with_base_url("https://api.danfoss.com/");
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(
            client
                .endpoint(Operation::ListDevices, &["ally", "devices"])
                .unwrap()
                .as_str(),
            "https://api.danfoss.com/ally/devices"
        );
    }

    #[test]
    fn device_id_stays_one_path_segment() {
        let client = AllyClient::with_base_url(DEFAULT_BASE_URL);
        let url = client
            .device_endpoint(Operation::QueryLatestStatus, "a/b?c#d", Some("status"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.danfoss.com/ally/devices/a%2Fb%3Fc%23d/status"
        );
    }

    #[test]
    fn path_collapsing_device_ids_are_refused() {
        let client = AllyClient::with_base_url(DEFAULT_BASE_URL);
        for id in ["", ".", ".."] {
            let err = client
                .device_endpoint(Operation::IssueCommand, id, Some("commands"))
                .unwrap_err();
            assert!(
                matches!(err, Error::InvalidUrl { operation: Operation::IssueCommand, .. }),
                "{id:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn unparseable_base_url_is_invalid_url() {
        let client = AllyClient::with_base_url("not a url");
        let err = client
            .endpoint(Operation::ListDevices, &["ally", "devices"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }
}
