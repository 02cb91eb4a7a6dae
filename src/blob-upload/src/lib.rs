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

//! Block blob uploads authorized with delegated-access tokens.
//!
//! This crate uploads large files to a blob storage service by splitting them
//! into fixed-size blocks. Each block is written with a single `PUT` request,
//! authorized by a short-lived token embedded in the upload URI. Once all the
//! blocks are written, the client commits the block list, and the service
//! assembles the blocks into a single object.
//!
//! The client never holds long-lived storage credentials. Instead, it asks a
//! [TokenProvider][authorization::TokenProvider] for a fresh upload URI at the
//! start of the upload, and again before each retry attempt. This allows the
//! upload to continue after a token expires mid-transfer.
//!
//! # Example
//! ```no_run
//! # async fn sample() -> anyhow::Result<()> {
//! use azure_blob_upload::authorization::HttpTokenProvider;
//! use azure_blob_upload::client::Uploader;
//! use azure_blob_upload::source::FileSource;
//!
//! let uploader = Uploader::builder().build()?;
//! let tokens = HttpTokenProvider::new("https://example.com/home/getbyid")?;
//! let source = FileSource::open("my-video.mp4").await?;
//! let outcome = uploader
//!     .upload_blob(tokens, "my-video.mp4", source)
//!     .with_content_type("video/mp4")
//!     .send()
//!     .await?;
//! println!("uploaded {} blocks", outcome.block_count());
//! # Ok(()) }
//! ```
//!
//! Only one block is in flight at any time. Failed blocks are retried with
//! exponential backoff, and the final commit is retried until it succeeds.
//! Both behaviors can be changed with the [retry_policy] and
//! [backoff_policy] types.

pub mod authorization;
pub mod backoff_policy;
pub mod block;
pub mod error;
pub mod retry_policy;
pub mod session;
pub mod source;

mod retry_loop;
mod transport;
mod upload;

pub use error::Error;

/// The result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The client used to upload blobs.
pub mod client {
    pub use crate::upload::{DEFAULT_CONTENT_TYPE, UploadOutcome, Uploader, UploaderBuilder};
}

/// Request builders.
pub mod builder {
    pub use crate::upload::UploadBlob;
}
