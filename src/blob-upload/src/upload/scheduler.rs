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

use super::{UploadOutcome, UploaderInner, block_uploader, commit};
use crate::authorization::TokenProvider;
use crate::block::BlockPlan;
use crate::session::{Progress, SessionState, UploadSession, publish_state};
use crate::source::BlockSource;
use crate::{Error, Result};
use reqwest::header::HeaderValue;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Runs an upload from the initial token fetch to the commit.
///
/// Blocks are read and written one at a time. A block is read once, and its
/// bytes are reused for every retry of that block.
pub(super) async fn upload<S>(
    inner: &UploaderInner,
    provider: &dyn TokenProvider,
    cancel: &CancellationToken,
    object_name: String,
    content_type: String,
    mut source: S,
    progress: watch::Sender<Progress>,
) -> Result<UploadOutcome>
where
    S: BlockSource,
{
    let content_type = HeaderValue::from_str(&content_type).map_err(|e| {
        Error::binding(format!("invalid content type {content_type:?}: {e}"))
    })?;
    let plan = BlockPlan::new(source.size(), inner.block_size)?;
    if cancel.is_cancelled() {
        return Err(Error::cancelled());
    }

    publish_state(&progress, SessionState::FetchingToken);
    let authorization = tokio::select! {
        r = provider.fetch(&object_name) => r?,
        _ = cancel.cancelled() => return Err(Error::cancelled()),
    };
    tracing::info!(
        "starting upload of {object_name}: {} bytes in {} blocks",
        plan.size(),
        plan.count()
    );

    let mut session = UploadSession::new(object_name, content_type, plan, authorization, progress);
    while let Some(block) = session.next_block() {
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        let data = source
            .read_range(block.range())
            .await
            .map_err(Error::read)?;
        block_uploader::upload_block(inner, provider, cancel, &mut session, &block, data).await?;
        session.confirm(&block);
        tracing::debug!(
            "confirmed block {} of {} for {}, cursor at {}, {} bytes remaining",
            session.block_index(),
            session.block_count(),
            session.object_name(),
            session.cursor(),
            session.bytes_remaining()
        );
    }

    commit::commit(inner, provider, cancel, &mut session).await?;
    session.set_state(SessionState::Done);
    tracing::info!("committed {}", session.object_name());
    Ok(UploadOutcome {
        object_name: session.object_name().to_string(),
        size: session.size(),
        block_count: session.block_count(),
        url: session.authorization().object_url(),
    })
}
