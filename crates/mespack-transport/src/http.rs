//! HTTP repository reads

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use mespack_auth::{Credential, Secret};

use crate::error::TransportError;
use crate::Result;

/// Read-only client for a repository served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpRepository {
    base: Url,
    client: reqwest::Client,
    credential: Option<Credential>,
}

impl HttpRepository {
    pub fn new(base: Url, credential: Option<Credential>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mespack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base,
            client,
            credential,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of `name` below the base, regardless of a trailing `/` on the base.
    pub fn file_url(&self, name: &str) -> Result<Url> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(name.trim_start_matches('/'))
            .map_err(|e| TransportError::Http(format!("invalid file name {name}: {e}")))
    }

    /// `GET <base>/<name>`. `Ok(None)` on 404.
    pub async fn get_file(&self, name: &str) -> Result<Option<(Url, Vec<u8>)>> {
        let url = self.file_url(name)?;
        let mut request = self.client.get(url.clone());
        request = match self.credential.as_ref().map(|c| &c.secret) {
            Some(Secret::Basic {
                username, password, ..
            }) => request.basic_auth(username, Some(password)),
            Some(Secret::Bearer { token }) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(url = %url, "not found on http repository");
                Ok(None)
            }
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                debug!(url = %url, bytes = bytes.len(), "downloaded from http repository");
                Ok(Some((url, bytes.to_vec())))
            }
            status => Err(TransportError::Http(format!("GET {url} returned {status}"))),
        }
    }
}
