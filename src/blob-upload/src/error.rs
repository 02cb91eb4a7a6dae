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

//! Errors returned by the upload client.
//!
//! All functions in this crate return [Error]. The type offers a series of
//! predicates to determine what went wrong, and an accessor for the HTTP status
//! code when the service (or the token backend) rejected a request. Most
//! applications only need [is_exhausted][Error::is_exhausted] and
//! [is_cancelled][Error::is_cancelled]: transient failures are retried by the
//! client and never reach the application unless the retry policy gives up.

use bytes::Bytes;
use http::HeaderMap;
use std::error::Error as StdError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// The error type for all upload operations.
///
/// # Example
/// ```
/// use azure_blob_upload::Error;
/// fn handle(e: Error) {
///     if e.is_exhausted() {
///         println!("giving up on the upload: {e}");
///     } else if let Some(code) = e.http_status_code() {
///         println!("the service rejected the request with {code}: {e}");
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<BoxError>,
}

impl Error {
    /// Creates an error representing a failure to obtain an upload URI.
    pub fn token_fetch<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::TokenFetch, source)
    }

    /// The client could not obtain a delegated-access token from the backend.
    ///
    /// The backend may be unreachable, may have rejected the request, or may
    /// have returned something that is not an absolute URI.
    ///
    /// # Troubleshooting
    ///
    /// Verify the token endpoint is reachable from the client, and that it
    /// authorizes uploads for the object name used in the request.
    pub fn is_token_fetch(&self) -> bool {
        matches!(self.kind, ErrorKind::TokenFetch)
    }

    /// Creates an error representing a failed block write.
    pub fn block_upload<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::BlockUpload, source)
    }

    /// A single block write failed.
    ///
    /// These errors are retried by the client. Applications only observe them
    /// as the [source][std::error::Error::source] of an exhausted error.
    pub fn is_block_upload(&self) -> bool {
        matches!(self.kind, ErrorKind::BlockUpload)
    }

    /// Creates an error representing a failed block list commit.
    pub fn commit<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Commit, source)
    }

    /// The block list commit failed.
    ///
    /// With the default policies these errors are retried until the commit
    /// succeeds or the upload is cancelled.
    pub fn is_commit(&self) -> bool {
        matches!(self.kind, ErrorKind::Commit)
    }

    /// Creates an error representing an exhausted retry policy.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use azure_blob_upload::Error;
    /// let error = Error::exhausted(Error::block_upload("simulated failure"));
    /// assert!(error.is_exhausted());
    /// assert!(error.source().is_some());
    /// ```
    pub fn exhausted<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Exhausted, source)
    }

    /// The retry policy stopped the upload.
    ///
    /// With the default policies this happens after five failed attempts to
    /// write the same block. The [source][std::error::Error::source] is the
    /// error from the last attempt.
    ///
    /// # Troubleshooting
    ///
    /// The most common causes are network outages longer than the retry
    /// policy, and a token backend that issues tokens without write
    /// permissions. Any blocks written before the failure remain uncommitted
    /// and the service discards them eventually. Restart the upload from the
    /// beginning.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }

    /// Creates an error representing a cancelled upload.
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            source: None,
        }
    }

    /// The application cancelled the upload.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates an error representing a failure to read the upload data.
    pub fn read<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Read, source)
    }

    /// The client could not read the data to upload.
    ///
    /// This is always a local error, and it is never retried.
    pub fn is_read(&self) -> bool {
        matches!(self.kind, ErrorKind::Read)
    }

    /// Creates an error representing an invalid configuration or request.
    pub fn binding<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Binding, source)
    }

    /// The request or the client configuration is invalid.
    ///
    /// For example, a block size of zero, an upload requiring more blocks
    /// than the block ids can represent, or an endpoint that is not a valid
    /// URL.
    pub fn is_binding(&self) -> bool {
        matches!(self.kind, ErrorKind::Binding)
    }

    /// The HTTP status code, if any, associated with this error.
    ///
    /// The client searches the chain of sources, so this also returns the
    /// status code of the last attempt in exhausted errors.
    ///
    /// # Example
    /// ```
    /// use azure_blob_upload::Error;
    /// use azure_blob_upload::error::HttpError;
    /// let http = HttpError::new(403, http::HeaderMap::new(), bytes::Bytes::new());
    /// let error = Error::exhausted(Error::block_upload(http));
    /// assert_eq!(error.http_status_code(), Some(403));
    /// ```
    pub fn http_status_code(&self) -> Option<u16> {
        self.http_error().map(HttpError::status_code)
    }

    /// The HTTP error details, if any, associated with this error.
    pub fn http_error(&self) -> Option<&HttpError> {
        let mut next = self
            .source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static));
        while let Some(e) = next {
            if let Some(http) = e.downcast_ref::<HttpError>() {
                return Some(http);
            }
            if let Some(inner) = e.downcast_ref::<Error>() {
                return inner.http_error();
            }
            next = e.source();
        }
        None
    }

    fn new<T: Into<BoxError>>(kind: ErrorKind, source: T) -> Self {
        Self {
            kind,
            source: Some(source.into()),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.source) {
            (ErrorKind::TokenFetch, Some(e)) => {
                write!(f, "cannot fetch the upload authorization: {e}")
            }
            (ErrorKind::BlockUpload, Some(e)) => write!(f, "cannot upload the block: {e}"),
            (ErrorKind::Commit, Some(e)) => write!(f, "cannot commit the block list: {e}"),
            (ErrorKind::Exhausted, Some(e)) => {
                write!(f, "the retry policy is exhausted, last error: {e}")
            }
            (ErrorKind::Read, Some(e)) => write!(f, "cannot read the upload data: {e}"),
            (ErrorKind::Binding, Some(e)) => write!(f, "invalid upload request: {e}"),
            (ErrorKind::Cancelled, _) => write!(f, "the upload was cancelled"),
            (_, None) => unreachable!("no constructor allows this"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error))
    }
}

/// The type of error held by an [Error] instance.
#[derive(Debug)]
enum ErrorKind {
    TokenFetch,
    BlockUpload,
    Commit,
    Exhausted,
    Cancelled,
    Read,
    Binding,
}

/// An unsuccessful HTTP response.
///
/// Returned as the source of an [Error] when the storage service or the token
/// backend respond with an unexpected status code.
#[derive(Clone, Debug)]
pub struct HttpError {
    status_code: u16,
    headers: HeaderMap,
    payload: Bytes,
}

impl HttpError {
    /// Creates a new instance, mostly useful in tests.
    pub fn new(status_code: u16, headers: HeaderMap, payload: Bytes) -> Self {
        Self {
            status_code,
            headers,
            payload,
        }
    }

    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status_code = response.status().as_u16();
        let headers = response.headers().clone();
        // The payload is only used for troubleshooting, losing it is not fatal.
        let payload = response.bytes().await.unwrap_or_default();
        Self::new(status_code, headers, payload)
    }

    /// The HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The response headers.
    ///
    /// The storage service includes a request id (`x-ms-request-id`) and an
    /// error code (`x-ms-error-code`) in most error responses.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The response payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the service responded with HTTP status {}", self.status_code)?;
        if let Some(code) = self
            .headers
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
        {
            write!(f, " ({code})")?;
        }
        if !self.payload.is_empty() {
            write!(f, ": {}", String::from_utf8_lossy(&self.payload))?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}
