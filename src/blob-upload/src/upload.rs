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

use crate::authorization::TokenProvider;
use crate::backoff_policy::{BackoffPolicy, BackoffPolicyArg};
use crate::block::DEFAULT_BLOCK_SIZE;
use crate::retry_policy::{RetryPolicy, RetryPolicyArg};
use crate::session::{Progress, SessionState, publish_state};
use crate::source::{BlockSource, IntoBlockSource};
use crate::transport::Transport;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

mod block_uploader;
mod commit;
mod scheduler;

/// The content type used when the application does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Uploads blobs using delegated-access tokens.
///
/// The client is cheap to clone, and clones share the same connection pool.
///
/// # Example
/// ```no_run
/// # use azure_blob_upload::client::Uploader;
/// # use azure_blob_upload::authorization::HttpTokenProvider;
/// # async fn sample() -> anyhow::Result<()> {
/// let uploader = Uploader::builder().build()?;
/// let tokens = HttpTokenProvider::new("https://example.com/home/getbyid")?;
/// let outcome = uploader
///     .upload_blob(tokens, "greeting.txt", "hello world")
///     .with_content_type("text/plain")
///     .send()
///     .await?;
/// println!("uploaded {}", outcome.url());
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct Uploader {
    inner: Arc<UploaderInner>,
}

#[derive(Debug)]
struct UploaderInner {
    transport: Transport,
    block_size: u64,
    block_retry_policy: Arc<dyn RetryPolicy>,
    block_backoff_policy: Arc<dyn BackoffPolicy>,
    commit_retry_policy: Arc<dyn RetryPolicy>,
    commit_backoff_policy: Arc<dyn BackoffPolicy>,
}

impl Uploader {
    /// Returns a builder for [Uploader].
    ///
    /// # Example
    /// ```
    /// # use azure_blob_upload::client::Uploader;
    /// let uploader = Uploader::builder().build()?;
    /// # Ok::<(), azure_blob_upload::Error>(())
    /// ```
    pub fn builder() -> UploaderBuilder {
        UploaderBuilder::new()
    }

    /// Starts building an upload for `object_name`.
    ///
    /// The upload does not start until [send][UploadBlob::send] is called.
    ///
    /// # Parameters
    /// * `provider` - obtains the upload URIs, typically a
    ///   [HttpTokenProvider][crate::authorization::HttpTokenProvider].
    /// * `object_name` - the name sent to the token provider.
    /// * `source` - the data to upload.
    pub fn upload_blob<P, N, S>(
        &self,
        provider: P,
        object_name: N,
        source: S,
    ) -> UploadBlob<S::Source>
    where
        P: TokenProvider + 'static,
        N: Into<String>,
        S: IntoBlockSource,
    {
        UploadBlob::new(
            self.inner.clone(),
            Arc::new(provider),
            object_name.into(),
            source.into_block_source(),
        )
    }
}

/// A builder for [Uploader].
///
/// # Example
/// ```
/// # use azure_blob_upload::client::Uploader;
/// # use azure_blob_upload::retry_policy::{Recommended, RetryPolicyExt};
/// use std::time::Duration;
/// let uploader = Uploader::builder()
///     .with_block_size(4 * 1024 * 1024)
///     .with_commit_retry_policy(Recommended.with_time_limit(Duration::from_secs(600)))
///     .build()?;
/// # Ok::<(), azure_blob_upload::Error>(())
/// ```
#[derive(Debug)]
pub struct UploaderBuilder {
    block_size: u64,
    block_retry_policy: Option<RetryPolicyArg>,
    block_backoff_policy: Option<BackoffPolicyArg>,
    commit_retry_policy: Option<RetryPolicyArg>,
    commit_backoff_policy: Option<BackoffPolicyArg>,
    client: Option<reqwest::Client>,
}

impl UploaderBuilder {
    pub(crate) fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_retry_policy: None,
            block_backoff_policy: None,
            commit_retry_policy: None,
            commit_backoff_policy: None,
            client: None,
        }
    }

    /// Creates a new client.
    ///
    /// Fails if the block size is zero, or if the HTTP client cannot be
    /// initialized.
    pub fn build(self) -> Result<Uploader> {
        if self.block_size == 0 {
            return Err(Error::binding("the block size must be greater than zero"));
        }
        let client = match self.client {
            Some(c) => c,
            None => reqwest::Client::builder().build().map_err(Error::binding)?,
        };
        let inner = UploaderInner {
            transport: Transport::new(client),
            block_size: self.block_size,
            block_retry_policy: self
                .block_retry_policy
                .map(|p| p.0)
                .unwrap_or_else(|| Arc::new(crate::retry_policy::default_block_retry())),
            block_backoff_policy: self
                .block_backoff_policy
                .map(|p| p.0)
                .unwrap_or_else(|| Arc::new(crate::backoff_policy::default_block_backoff())),
            commit_retry_policy: self
                .commit_retry_policy
                .map(|p| p.0)
                .unwrap_or_else(|| Arc::new(crate::retry_policy::default_commit_retry())),
            commit_backoff_policy: self
                .commit_backoff_policy
                .map(|p| p.0)
                .unwrap_or_else(|| Arc::new(crate::backoff_policy::default_commit_backoff())),
        };
        Ok(Uploader {
            inner: Arc::new(inner),
        })
    }

    /// Changes the block size, the default is 1 MiB.
    ///
    /// Each block is kept in memory until the service confirms it, so larger
    /// blocks use more memory. The service limits the number of blocks in an
    /// object, and this client supports at most
    /// [MAX_BLOCK_COUNT][crate::block::MAX_BLOCK_COUNT] blocks.
    pub fn with_block_size(mut self, v: u64) -> Self {
        self.block_size = v;
        self
    }

    /// The retry policy for block writes.
    ///
    /// The default gives up after 5 attempts for the same block.
    pub fn with_block_retry_policy<V: Into<RetryPolicyArg>>(mut self, v: V) -> Self {
        self.block_retry_policy = Some(v.into());
        self
    }

    /// The backoff policy for block writes.
    ///
    /// The default waits 5 seconds after the first failure, and triples the
    /// delay after each subsequent failure.
    pub fn with_block_backoff_policy<V: Into<BackoffPolicyArg>>(mut self, v: V) -> Self {
        self.block_backoff_policy = Some(v.into());
        self
    }

    /// The retry policy for the block list commit.
    ///
    /// The default retries until the commit succeeds or the upload is
    /// cancelled.
    pub fn with_commit_retry_policy<V: Into<RetryPolicyArg>>(mut self, v: V) -> Self {
        self.commit_retry_policy = Some(v.into());
        self
    }

    /// The backoff policy for the block list commit, a constant 5 seconds by
    /// default.
    pub fn with_commit_backoff_policy<V: Into<BackoffPolicyArg>>(mut self, v: V) -> Self {
        self.commit_backoff_policy = Some(v.into());
        self
    }

    /// Uses `client` for the storage requests.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }
}

/// A request builder for block blob uploads.
pub struct UploadBlob<S> {
    inner: Arc<UploaderInner>,
    provider: Arc<dyn TokenProvider>,
    object_name: String,
    content_type: String,
    source: S,
    cancel: CancellationToken,
    progress: watch::Sender<Progress>,
}

impl<S> UploadBlob<S>
where
    S: BlockSource,
{
    fn new(
        inner: Arc<UploaderInner>,
        provider: Arc<dyn TokenProvider>,
        object_name: String,
        source: S,
    ) -> Self {
        let progress = watch::Sender::new(Progress::new(source.size()));
        Self {
            inner,
            provider,
            object_name,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            source,
            cancel: CancellationToken::new(),
            progress,
        }
    }

    /// Sets the content type of the committed object.
    ///
    /// The value must be a valid HTTP header value. [send][Self::send] checks
    /// it before any request, and fails with a binding error otherwise.
    pub fn with_content_type<V: Into<String>>(mut self, v: V) -> Self {
        self.content_type = v.into();
        self
    }

    /// Stops the upload when `token` is cancelled.
    ///
    /// The client checks the token before each block and each commit attempt,
    /// and while waiting between attempts. Blocks written before the
    /// cancellation are never committed.
    ///
    /// # Example
    /// ```no_run
    /// # use azure_blob_upload::client::Uploader;
    /// # use azure_blob_upload::authorization::HttpTokenProvider;
    /// # async fn sample(uploader: Uploader, tokens: HttpTokenProvider) -> anyhow::Result<()> {
    /// use tokio_util::sync::CancellationToken;
    /// let cancel = CancellationToken::new();
    /// let trigger = cancel.clone();
    /// tokio::spawn(async move {
    ///     let _ = tokio::signal::ctrl_c().await;
    ///     trigger.cancel();
    /// });
    /// let result = uploader
    ///     .upload_blob(tokens, "greeting.txt", "hello world")
    ///     .with_cancellation(cancel)
    ///     .send()
    ///     .await;
    /// if let Err(e) = &result {
    ///     if e.is_cancelled() { println!("upload cancelled"); }
    /// }
    /// # Ok(()) }
    /// ```
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a channel to observe the upload progress.
    ///
    /// The channel receives a new [Progress] snapshot after each state change,
    /// including every confirmed block.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Uploads the data and commits the object.
    pub async fn send(self) -> Result<UploadOutcome> {
        let object_name = self.object_name.clone();
        let progress = self.progress.clone();
        let result = scheduler::upload(
            &self.inner,
            self.provider.as_ref(),
            &self.cancel,
            self.object_name,
            self.content_type,
            self.source,
            self.progress,
        )
        .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                publish_state(&progress, SessionState::Failed);
                tracing::error!("upload of {object_name} failed: {e}");
                Err(e)
            }
        }
    }
}

impl<S> std::fmt::Debug for UploadBlob<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadBlob")
            .field("provider", &self.provider)
            .field("object_name", &self.object_name)
            .field("content_type", &self.content_type)
            .field("progress", &*self.progress.borrow())
            .finish()
    }
}

/// The result of a successful upload.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadOutcome {
    object_name: String,
    size: u64,
    block_count: u64,
    url: Url,
}

impl UploadOutcome {
    /// The object name used to request the upload URIs.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// The number of bytes uploaded.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The number of blocks in the committed object.
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// The URL of the committed object, without the upload signature.
    pub fn url(&self) -> &Url {
        &self.url
    }
}
