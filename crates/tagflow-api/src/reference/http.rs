// HTTP reference source
//
// Fetches the tabulated reference sheet from an HTTP endpoint. When the
// sheet sits behind an identity provider, the caller supplies an already
// acquired bearer token; acquiring it is not this client's concern.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use super::{ReferenceSource, ReferenceTable};
use crate::error::{Error, body_preview};
use crate::transport::TransportConfig;

#[derive(Debug, Clone)]
pub struct HttpReferenceSource {
    http: reqwest::Client,
    url: Url,
    bearer: Option<SecretString>,
}

impl HttpReferenceSource {
    pub fn new(url: Url, bearer: Option<SecretString>, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            url,
            bearer,
        })
    }

    pub fn with_client(http: reqwest::Client, url: Url, bearer: Option<SecretString>) -> Self {
        Self { http, url, bearer }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ReferenceSource for HttpReferenceSource {
    async fn fetch_all(&self) -> Result<ReferenceTable, Error> {
        debug!("GET {}", self.url);

        let mut builder = self.http.get(self.url.clone());
        if let Some(ref token) = self.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let resp = builder.send().await.map_err(Error::from_send)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::SourceUnavailable {
                message: format!("HTTP {status}: {}", body_preview(&body)),
            });
        }

        let body = resp.bytes().await.map_err(Error::from_send)?;
        ReferenceTable::from_json(&body)
    }
}
