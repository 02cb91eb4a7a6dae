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

//! Blocks and block lists.
//!
//! A block blob is uploaded as a sequence of blocks. Each block has an id,
//! and the final object is assembled from the blocks named in the committed
//! block list, in the order they appear in that list.

use crate::{Error, Result};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use std::ops::Range;

/// The default size for each block: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// The number of decimal digits encoded in each block id.
///
/// The service requires all the block ids in a blob to have the same length.
pub const BLOCK_ID_WIDTH: usize = 6;

/// The maximum number of blocks representable with [BLOCK_ID_WIDTH] digits.
pub const MAX_BLOCK_COUNT: u64 = 1_000_000;

/// The id of a block.
///
/// The id is the base64 encoding of the zero-padded block index. For example,
/// block `0` has id `MDAwMDAw`, the encoding of `000000`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(String);

impl BlockId {
    /// Creates the id for the block at `index`.
    ///
    /// # Example
    /// ```
    /// # use azure_blob_upload::block::BlockId;
    /// assert_eq!(BlockId::new(0).as_str(), "MDAwMDAw");
    /// assert_eq!(BlockId::new(1).as_str(), "MDAwMDAx");
    /// ```
    pub fn new(index: u64) -> Self {
        let digits = format!("{index:0width$}", width = BLOCK_ID_WIDTH);
        Self(BASE64_STANDARD.encode(digits))
    }

    /// The encoded id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contiguous range of the source data, uploaded in a single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    index: u64,
    range: Range<u64>,
    id: BlockId,
}

impl Block {
    /// The zero-based position of this block in the blob.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The byte range of the source covered by this block.
    pub fn range(&self) -> Range<u64> {
        self.range.clone()
    }

    /// The number of bytes in this block.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Returns true if the block has no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The id of this block.
    pub fn id(&self) -> &BlockId {
        &self.id
    }
}

/// Splits an object of known size into blocks.
#[derive(Clone, Debug)]
pub(crate) struct BlockPlan {
    size: u64,
    block_size: u64,
}

impl BlockPlan {
    pub fn new(size: u64, block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::binding("the block size must be greater than zero"));
        }
        let plan = Self { size, block_size };
        if plan.count() > MAX_BLOCK_COUNT {
            return Err(Error::binding(format!(
                "the upload requires {} blocks of {block_size} bytes, the maximum is {MAX_BLOCK_COUNT}",
                plan.count()
            )));
        }
        Ok(plan)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The number of blocks, zero for empty objects.
    pub fn count(&self) -> u64 {
        self.size.div_ceil(self.block_size)
    }

    /// Returns the block at `index`, or `None` past the end of the object.
    pub fn block(&self, index: u64) -> Option<Block> {
        if index >= self.count() {
            return None;
        }
        let start = index * self.block_size;
        let end = std::cmp::min(start.saturating_add(self.block_size), self.size);
        Some(Block {
            index,
            range: start..end,
            id: BlockId::new(index),
        })
    }
}

/// The ordered list of blocks committed to form the blob.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockList {
    ids: Vec<BlockId>,
}

impl BlockList {
    /// Creates the list for the first `count` blocks.
    pub fn with_count(count: u64) -> Self {
        Self {
            ids: (0..count).map(BlockId::new).collect(),
        }
    }

    /// The block ids, in commit order.
    pub fn ids(&self) -> &[BlockId] {
        &self.ids
    }

    /// Formats the list as the XML document expected by the service.
    ///
    /// # Example
    /// ```
    /// # use azure_blob_upload::block::BlockList;
    /// let xml = BlockList::with_count(1).to_xml();
    /// assert_eq!(
    ///     xml,
    ///     r#"<?xml version="1.0" encoding="utf-8"?><BlockList><Latest>MDAwMDAw</Latest></BlockList>"#
    /// );
    /// ```
    pub fn to_xml(&self) -> String {
        // Block ids are base64 strings, they never require XML escaping.
        let latest = self
            .ids
            .iter()
            .map(|id| format!("<Latest>{id}</Latest>"))
            .collect::<String>();
        format!(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>{latest}</BlockList>"#)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, "MDAwMDAw")]
    #[test_case(1, "MDAwMDAx")]
    #[test_case(2, "MDAwMDAy")]
    #[test_case(42, "MDAwMDQy")]
    #[test_case(999_999, "OTk5OTk5")]
    fn block_id(index: u64, want: &str) {
        assert_eq!(BlockId::new(index).as_str(), want);
    }

    #[test]
    fn block_id_fixed_width() {
        let want = BlockId::new(0).as_str().len();
        for index in [1, 9, 10, 99, 100, 12_345, 999_999] {
            let id = BlockId::new(index);
            assert_eq!(id.as_str().len(), want, "{id}");
            assert!(
                id.as_str().chars().all(|c| c.is_ascii_alphanumeric()),
                "{id}"
            );
        }
    }

    fn padded(id: &BlockId) -> anyhow::Result<String> {
        let decoded = BASE64_STANDARD.decode(id.as_str())?;
        Ok(String::from_utf8(decoded)?)
    }

    #[test]
    fn block_id_order() -> anyhow::Result<()> {
        let boundaries = [0, 9, 99, 999, 9_999, 99_999, 999_998];
        for i in boundaries.into_iter().flat_map(|b| b..b + 2) {
            let (lhs, rhs) = (BlockId::new(i), BlockId::new(i + 1));
            assert_eq!(padded(&lhs)?, format!("{i:06}"));
            assert!(padded(&lhs)? < padded(&rhs)?, "{lhs} {rhs}");
            assert_ne!(lhs, rhs);
        }
        Ok(())
    }

    #[test]
    fn block_id_unique() {
        let ids = (0..20_000)
            .map(|i| BlockId::new(i).as_str().to_string())
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(ids.len(), 20_000);
    }

    #[test]
    fn plan_exact_multiple() -> anyhow::Result<()> {
        let plan = BlockPlan::new(3 * 1024, 1024)?;
        assert_eq!(plan.count(), 3);
        let ranges = (0..3)
            .filter_map(|i| plan.block(i))
            .map(|b| b.range())
            .collect::<Vec<_>>();
        assert_eq!(ranges, vec![0..1024, 1024..2048, 2048..3072]);
        assert!(plan.block(3).is_none());
        Ok(())
    }

    #[test]
    fn plan_short_tail() -> anyhow::Result<()> {
        let size = 2 * DEFAULT_BLOCK_SIZE + DEFAULT_BLOCK_SIZE / 2;
        let plan = BlockPlan::new(size, DEFAULT_BLOCK_SIZE)?;
        assert_eq!(plan.count(), 3);
        let last = plan.block(2).expect("the plan has three blocks");
        assert_eq!(last.len(), DEFAULT_BLOCK_SIZE / 2);
        assert_eq!(last.range().end, size);
        assert_eq!(last.id(), &BlockId::new(2));
        Ok(())
    }

    #[test]
    fn plan_empty() -> anyhow::Result<()> {
        let plan = BlockPlan::new(0, DEFAULT_BLOCK_SIZE)?;
        assert_eq!(plan.count(), 0);
        assert!(plan.block(0).is_none());
        Ok(())
    }

    #[test]
    fn plan_near_max_size() -> anyhow::Result<()> {
        let block_size = u64::MAX / 2 + 1;
        let plan = BlockPlan::new(u64::MAX, block_size)?;
        assert_eq!(plan.count(), 2);
        let last = plan.block(1).expect("the plan has two blocks");
        assert_eq!(last.range(), block_size..u64::MAX);
        assert_eq!(last.len(), u64::MAX - block_size);
        Ok(())
    }

    #[test]
    fn plan_zero_block_size() {
        let err = BlockPlan::new(1024, 0).unwrap_err();
        assert!(err.is_binding(), "{err:?}");
    }

    #[test]
    fn plan_too_many_blocks() {
        let plan = BlockPlan::new(MAX_BLOCK_COUNT, 1);
        assert!(plan.is_ok(), "{plan:?}");
        let err = BlockPlan::new(MAX_BLOCK_COUNT + 1, 1).unwrap_err();
        assert!(err.is_binding(), "{err:?}");
    }

    #[test]
    fn block_list_xml() {
        let got = BlockList::with_count(3).to_xml();
        let want = concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            "<BlockList>",
            "<Latest>MDAwMDAw</Latest>",
            "<Latest>MDAwMDAx</Latest>",
            "<Latest>MDAwMDAy</Latest>",
            "</BlockList>"
        );
        assert_eq!(got, want);
    }

    #[test]
    fn block_list_empty() {
        let got = BlockList::with_count(0);
        assert!(got.ids().is_empty());
        assert_eq!(
            got.to_xml(),
            r#"<?xml version="1.0" encoding="utf-8"?><BlockList></BlockList>"#
        );
    }
}
