// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Delegated-access authorization for uploads.
//!
//! Uploads are authorized by an upload URI: the URL of the destination object
//! with a short-lived, write-only signature in its query string. Applications
//! obtain these URIs from a backend they trust, and the client asks for a new
//! one every time it retries a failed request.
//!
//! [HttpTokenProvider] implements the common case, where the backend serves
//! the URI as the body of a `GET` request. Applications with other needs can
//! implement [TokenProvider] directly.

use crate::error::HttpError;
use crate::{Error, Result, block::BlockId};
use url::Url;

/// A delegated-access upload URI.
///
/// The query string carries the signature, so it is omitted from the `Debug`
/// output.
#[derive(Clone, PartialEq)]
pub struct Authorization {
    endpoint: Url,
}

impl Authorization {
    /// Parses an upload URI as returned by the token backend.
    ///
    /// Leading and trailing whitespace is ignored. The URI must be an absolute
    /// `http` or `https` URL.
    ///
    /// # Example
    /// ```
    /// # use azure_blob_upload::authorization::Authorization;
    /// let auth = Authorization::parse(
    ///     "https://account.blob.core.windows.net/videos/clip.mp4?sv=2020-08-04&sig=abc\n",
    /// )?;
    /// assert_eq!(auth.object_url().path(), "/videos/clip.mp4");
    /// # Ok::<(), azure_blob_upload::Error>(())
    /// ```
    pub fn parse(uri: &str) -> Result<Self> {
        let endpoint = Url::parse(uri.trim()).map_err(Error::token_fetch)?;
        match endpoint.scheme() {
            "http" | "https" => Ok(Self { endpoint }),
            scheme => Err(Error::token_fetch(format!(
                "the upload URI must use http or https, got {scheme}"
            ))),
        }
    }

    /// The full upload URI, including the signature.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The URL of the destination object, without the signature.
    pub fn object_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        url
    }

    pub(crate) fn block_url(&self, id: &BlockId) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", id.as_str());
        url
    }

    pub(crate) fn block_list_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("comp", "blocklist");
        url
    }
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let query = self.endpoint.query().map(|_| "[censored]");
        f.debug_struct("Authorization")
            .field("object_url", &self.object_url().as_str())
            .field("query", &query)
            .finish()
    }
}

/// Obtains upload URIs for an object.
///
/// The client calls [fetch][TokenProvider::fetch] once before the first
/// request, and again before each retry attempt.
#[async_trait::async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    /// Returns a fresh upload URI for `object_name`.
    async fn fetch(&self, object_name: &str) -> Result<Authorization>;
}

/// A [TokenProvider] backed by an HTTP endpoint.
///
/// The provider sends `GET {endpoint}/{object_name}/` and expects the upload
/// URI as the body of a `200 OK` or `201 Created` response.
///
/// # Example
/// ```
/// # use azure_blob_upload::authorization::HttpTokenProvider;
/// let provider = HttpTokenProvider::new("https://example.com/home/getbyid")?;
/// # Ok::<(), azure_blob_upload::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenProvider {
    /// Creates a provider for the given backend endpoint.
    pub fn new<T: AsRef<str>>(endpoint: T) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref()).map_err(Error::binding)?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::binding(format!(
                "the token endpoint must be a hierarchical URL, got {endpoint}"
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::binding)?;
        Ok(Self { client, endpoint })
    }

    /// Uses `client` to send the token requests.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn request_url(&self, object_name: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::binding("the token endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(object_name)
            .push("");
        Ok(url)
    }
}

#[async_trait::async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch(&self, object_name: &str) -> Result<Authorization> {
        let url = self.request_url(object_name)?;
        tracing::debug!("fetching upload authorization for {object_name}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Error::token_fetch)?;
        match response.status().as_u16() {
            200 | 201 => {
                let body = response.text().await.map_err(Error::token_fetch)?;
                Authorization::parse(&body)
            }
            _ => Err(Error::token_fetch(
                HttpError::from_response(response).await,
            )),
        }
    }
}
