// REST reader client
//
// Wraps `reqwest::Client` with the reader's local REST surface:
// basic-auth login that returns a bearer token, then bearer-authenticated
// start/stop of the inventory connector.

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::ReaderTransport;
use crate::auth::{Credentials, SessionToken};
use crate::error::{Error, body_preview};
use crate::transport::TransportConfig;

const LOGIN_PATH: &str = "/cloud/localRestLogin";
const START_PATH: &str = "/cloud/start";
const STOP_PATH: &str = "/cloud/stop";

/// Login response: the token is carried in `message`.
#[derive(Deserialize)]
struct LoginResponse {
    message: String,
}

/// HTTP client for one reader's REST API.
#[derive(Debug, Clone)]
pub struct HttpReader {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpReader {
    /// Create a reader client from a `TransportConfig`.
    ///
    /// `base_url` is the reader root, e.g. `https://192.168.1.50`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
        })
    }

    /// Create a reader client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The reader base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(Error::InvalidUrl)
    }

    /// Issue a bearer-authenticated `PUT` to a connector control path.
    async fn control(&self, path: &str, token: &SessionToken) -> Result<StatusCode, Error> {
        let url = self.endpoint(path)?;
        debug!("PUT {}", url);

        let resp = self
            .http
            .put(url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(Error::from_send)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(status);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(Error::Conflict {
                message: body_preview(&body),
            });
        }
        Err(Error::Device {
            status: status.as_u16(),
            message: body_preview(&body),
        })
    }
}

impl ReaderTransport for HttpReader {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, Error> {
        let url = self.endpoint(LOGIN_PATH)?;
        debug!("logging in at {}", url);

        let resp = self
            .http
            .get(url)
            .basic_auth(&credentials.username, Some(credentials.password()))
            .send()
            .await
            .map_err(Error::from_send)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                message: format!("login refused (HTTP {status}): {}", body_preview(&body)),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Device {
                status: status.as_u16(),
                message: body_preview(&body),
            });
        }

        let body = resp.text().await.map_err(Error::from_send)?;
        let login: LoginResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: format!("{e} (body preview: {:?})", body_preview(&body)),
                body: body.clone(),
            })?;

        if login.message.trim().is_empty() {
            return Err(Error::Rejected {
                message: "login returned an empty token".into(),
            });
        }

        debug!("login successful");
        Ok(SessionToken::new(login.message.trim()))
    }

    async fn start(&self, token: &SessionToken) -> Result<(), Error> {
        self.control(START_PATH, token).await?;
        Ok(())
    }

    async fn stop(&self, token: &SessionToken) -> Result<(), Error> {
        match self.control(STOP_PATH, token).await {
            Ok(_) => Ok(()),
            // Nothing running on the device: the stop already holds.
            Err(Error::Conflict { message }) => {
                debug!(%message, "stop on idle reader");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
