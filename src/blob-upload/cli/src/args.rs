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

use anyhow::bail;
use azure_blob_upload::client::DEFAULT_CONTENT_TYPE;
use clap::Parser;
use humantime::parse_duration;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line options.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = super::DESCRIPTION)]
pub struct Args {
    /// The backend serving upload URIs.
    ///
    /// The program sends `GET {token-endpoint}/{object-name}/` before the
    /// upload starts, and again before each retry.
    #[arg(long, env = "BLOB_UPLOAD_TOKEN_ENDPOINT")]
    pub token_endpoint: String,

    /// The file to upload.
    #[arg(long)]
    pub file: PathBuf,

    /// The object name sent to the token backend, defaults to the file name.
    #[arg(long)]
    pub object_name: Option<String>,

    /// The content type of the committed object.
    #[arg(long, default_value = DEFAULT_CONTENT_TYPE)]
    pub content_type: String,

    /// The size of each block, for example `4MiB`.
    #[arg(long, env = "BLOB_UPLOAD_BLOCK_SIZE", value_parser = parse_size_arg, default_value = "1MiB")]
    pub block_size: u64,

    /// Stop retrying the commit after this long, for example `10m`.
    ///
    /// By default the program retries the commit until it succeeds or the
    /// upload is interrupted.
    #[arg(long, value_parser = parse_duration)]
    pub max_commit_duration: Option<Duration>,
}

impl Args {
    /// Validates the arguments after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.block_size == 0 {
            bail!("invalid block size, should be > 0")
        }
        if self.content_type.is_empty() {
            bail!("invalid content type, should not be empty")
        }
        Ok(())
    }

    /// The object name, from the command line or from the file name.
    pub fn object_name(&self) -> anyhow::Result<String> {
        if let Some(name) = &self.object_name {
            return Ok(name.clone());
        }
        match self.file.file_name().and_then(|n| n.to_str()) {
            Some(name) => Ok(name.to_string()),
            None => bail!(
                "cannot derive an object name from {}, use --object-name",
                self.file.display()
            ),
        }
    }
}

fn parse_size_arg(arg: &str) -> anyhow::Result<u64> {
    let value = parse_size::parse_size(arg)?;
    Ok(value)
}
