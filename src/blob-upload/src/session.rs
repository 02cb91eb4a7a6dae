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

//! The state of an upload and its progress.
//!
//! Applications observe uploads through [Progress] snapshots, published on a
//! [tokio::sync::watch] channel after every state change. See
//! [UploadBlob::progress][crate::builder::UploadBlob::progress].

use crate::authorization::Authorization;
use crate::block::{Block, BlockList, BlockPlan};
use reqwest::header::HeaderValue;
use tokio::sync::watch;

/// The state of an upload session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// The upload has not started.
    Idle,
    /// Waiting for the initial upload URI.
    FetchingToken,
    /// Writing the block at `index`. `attempt` starts at 1.
    UploadingBlock { index: u64, attempt: u32 },
    /// Committing the block list. `attempt` starts at 1.
    Committing { attempt: u32 },
    /// The object is committed.
    Done,
    /// The upload stopped with an error.
    Failed,
}

impl SessionState {
    /// Returns true if the upload has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// A snapshot of the upload progress.
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    size: u64,
    bytes_remaining: u64,
    state: SessionState,
}

impl Progress {
    pub(crate) fn new(size: u64) -> Self {
        Self {
            size,
            bytes_remaining: size,
            state: SessionState::Idle,
        }
    }

    /// The total size of the upload.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The number of bytes not yet confirmed by the service.
    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_remaining
    }

    /// The number of bytes confirmed by the service.
    pub fn bytes_uploaded(&self) -> u64 {
        self.size - self.bytes_remaining
    }

    /// The percentage of the data confirmed by the service, from 0 to 100.
    ///
    /// Empty uploads report 0 until they are committed.
    ///
    /// # Example
    /// ```
    /// # use azure_blob_upload::session::Progress;
    /// fn report(p: &Progress) {
    ///     println!("{:.1}% uploaded, state={:?}", p.percent_uploaded(), p.state());
    /// }
    /// ```
    pub fn percent_uploaded(&self) -> f64 {
        if self.size == 0 {
            return match self.state {
                SessionState::Done => 100.0,
                _ => 0.0,
            };
        }
        100.0 - (self.bytes_remaining as f64 / self.size as f64) * 100.0
    }

    /// The session state when this snapshot was taken.
    pub fn state(&self) -> SessionState {
        self.state
    }
}

/// Publishes a state change without touching the byte counters.
pub(crate) fn publish_state(progress: &watch::Sender<Progress>, state: SessionState) {
    progress.send_modify(|p| p.state = state);
}

/// The mutable state of a single upload.
///
/// Created once the initial authorization is available, and owned by the
/// scheduler until the upload finishes.
#[derive(Debug)]
pub(crate) struct UploadSession {
    object_name: String,
    content_type: HeaderValue,
    plan: BlockPlan,
    cursor: u64,
    bytes_remaining: u64,
    block_index: u64,
    authorization: Authorization,
    progress: watch::Sender<Progress>,
}

impl UploadSession {
    pub fn new(
        object_name: String,
        content_type: HeaderValue,
        plan: BlockPlan,
        authorization: Authorization,
        progress: watch::Sender<Progress>,
    ) -> Self {
        let bytes_remaining = plan.size();
        Self {
            object_name,
            content_type,
            plan,
            cursor: 0,
            bytes_remaining,
            block_index: 0,
            authorization,
            progress,
        }
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.plan.size()
    }

    pub fn block_count(&self) -> u64 {
        self.plan.count()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_remaining
    }

    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    pub fn authorization_mut(&mut self) -> &mut Authorization {
        &mut self.authorization
    }

    /// The next block to upload, `None` once all blocks are confirmed.
    pub fn next_block(&self) -> Option<Block> {
        self.plan.block(self.block_index)
    }

    /// Records a block as written by the service.
    pub fn confirm(&mut self, block: &Block) {
        debug_assert_eq!(block.index(), self.block_index, "{block:?}");
        debug_assert_eq!(block.range().start, self.cursor, "{block:?}");
        self.cursor = block.range().end;
        self.bytes_remaining = self.plan.size() - self.cursor;
        self.block_index += 1;
        let bytes_remaining = self.bytes_remaining;
        self.progress
            .send_modify(|p| p.bytes_remaining = bytes_remaining);
    }

    pub fn set_state(&self, state: SessionState) {
        publish_state(&self.progress, state);
    }

    /// The manifest to commit, only available after all blocks are confirmed.
    pub fn block_list(&self) -> Option<BlockList> {
        if self.bytes_remaining != 0 || self.block_index != self.plan.count() {
            return None;
        }
        Some(BlockList::with_count(self.block_index))
    }
}
