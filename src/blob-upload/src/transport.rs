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

use crate::authorization::Authorization;
use crate::block::{Block, BlockList};
use crate::error::HttpError;
use crate::{Error, Result};
use bytes::Bytes;
use reqwest::header::HeaderValue;

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const BLOB_CONTENT_TYPE_HEADER: &str = "x-ms-blob-content-type";

/// Sends the storage service requests.
///
/// Requests carry no `Authorization` header, the signature in the upload URI
/// authorizes them.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Writes a single block.
    pub async fn put_block(
        &self,
        authorization: &Authorization,
        block: &Block,
        data: Bytes,
    ) -> Result<()> {
        let response = self
            .client
            .put(authorization.block_url(block.id()))
            .header(BLOB_TYPE_HEADER, HeaderValue::from_static("BlockBlob"))
            .body(data)
            .send()
            .await
            .map_err(Error::block_upload)?;
        if !response.status().is_success() {
            return Err(Error::block_upload(HttpError::from_response(response).await));
        }
        Ok(())
    }

    /// Commits the block list, creating (or replacing) the object.
    pub async fn put_block_list(
        &self,
        authorization: &Authorization,
        list: &BlockList,
        content_type: &HeaderValue,
    ) -> Result<()> {
        let response = self
            .client
            .put(authorization.block_list_url())
            .header(BLOB_CONTENT_TYPE_HEADER, content_type.clone())
            .body(list.to_xml())
            .send()
            .await
            .map_err(Error::commit)?;
        if !response.status().is_success() {
            return Err(Error::commit(HttpError::from_response(response).await));
        }
        Ok(())
    }
}
