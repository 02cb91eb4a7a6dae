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
use crate::authorization::TokenProvider;
use crate::retry_loop::retry_loop;
use crate::session::{SessionState, UploadSession};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Commits the block list of a session with all its blocks confirmed.
pub(super) async fn commit(
    inner: &UploaderInner,
    provider: &dyn TokenProvider,
    cancel: &CancellationToken,
    session: &mut UploadSession,
) -> Result<()> {
    let list = session.block_list().ok_or_else(|| {
        Error::commit(format!(
            "cannot commit {} with {} bytes still pending",
            session.object_name(),
            session.bytes_remaining()
        ))
    })?;
    let object_name = session.object_name().to_string();
    let content_type = session.content_type().clone();
    retry_loop(
        async |attempt| {
            session.set_state(SessionState::Committing { attempt });
            if attempt > 1 {
                tracing::info!("refreshing the upload authorization for {object_name}");
                *session.authorization_mut() = provider.fetch(&object_name).await?;
            }
            inner
                .transport
                .put_block_list(session.authorization(), &list, &content_type)
                .await
        },
        async |delay| tokio::time::sleep(delay).await,
        inner.commit_retry_policy.clone(),
        inner.commit_backoff_policy.clone(),
        cancel,
        |attempt, error, delay| {
            tracing::warn!(
                "attempt {attempt} to commit {object_name} failed, retrying in {delay:?}: {error}"
            );
        },
    )
    .await
}
