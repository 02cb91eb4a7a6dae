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

use super::UploaderInner;
use crate::Result;
use crate::authorization::TokenProvider;
use crate::block::Block;
use crate::retry_loop::retry_loop;
use crate::session::{SessionState, UploadSession};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Writes one block, retrying with a fresh authorization after each failure.
///
/// Every attempt sends the same block id and the same bytes.
pub(super) async fn upload_block(
    inner: &UploaderInner,
    provider: &dyn TokenProvider,
    cancel: &CancellationToken,
    session: &mut UploadSession,
    block: &Block,
    data: Bytes,
) -> Result<()> {
    let object_name = session.object_name().to_string();
    retry_loop(
        async |attempt| {
            session.set_state(SessionState::UploadingBlock {
                index: block.index(),
                attempt,
            });
            if attempt > 1 {
                tracing::info!("refreshing the upload authorization for {object_name}");
                *session.authorization_mut() = provider.fetch(&object_name).await?;
            }
            inner
                .transport
                .put_block(session.authorization(), block, data.clone())
                .await
        },
        async |delay| tokio::time::sleep(delay).await,
        inner.block_retry_policy.clone(),
        inner.block_backoff_policy.clone(),
        cancel,
        |attempt, error, delay| {
            tracing::warn!(
                "attempt {attempt} to upload block {} of {object_name} failed, retrying in {delay:?}: {error}",
                block.index()
            );
        },
    )
    .await
}
