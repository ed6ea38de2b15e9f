//! Output naming templates.
//!
//! A [`NamingConfig`] is an ordered list of blocks that are rendered and
//! joined with `_` to form the output file stem. The list is never empty.

use serde::{Deserialize, Serialize};

/// Default token length for a freshly added random block.
pub const DEFAULT_RANDOM_LENGTH: u8 = 8;
/// Accepted random token lengths.
pub const RANDOM_LENGTH_RANGE: std::ops::RangeInclusive<u8> = 4..=32;
/// Text used by a prefix block that has no value yet.
pub const DEFAULT_PREFIX: &str = "file";

const DEFAULT_BLOCK_ID: &str = "default-original";

/// What a naming block renders to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// The input file stem.
    Original,
    /// Fixed text.
    Prefix { value: String },
    /// Random `[a-z0-9]` token.
    Random { length: u8 },
    /// Local timestamp with millisecond precision.
    Date,
}

/// One entry of a naming template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingBlock {
    pub id: String,
    #[serde(flatten)]
    pub kind: BlockKind,
}

impl NamingBlock {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
        }
    }

    pub fn with_id(id: impl Into<String>, kind: BlockKind) -> Self {
        Self { id: id.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    pub blocks: Vec<NamingBlock>,
    #[serde(default)]
    pub sanitize_enabled: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            blocks: vec![NamingBlock::with_id(DEFAULT_BLOCK_ID, BlockKind::Original)],
            sanitize_enabled: false,
        }
    }
}

impl NamingConfig {
    /// Append a block and return its id.
    pub fn add_block(&mut self, kind: BlockKind) -> String {
        let kind = match kind {
            BlockKind::Random { length } => BlockKind::Random {
                length: clamp_random_length(length),
            },
            other => other,
        };
        let block = NamingBlock::new(kind);
        let id = block.id.clone();
        self.blocks.push(block);
        id
    }

    /// Remove a block by id. Removing the only remaining block is a no-op.
    pub fn remove_block(&mut self, id: &str) -> bool {
        if self.blocks.len() <= 1 {
            return false;
        }
        let before = self.blocks.len();
        self.blocks.retain(|b| b.id != id);
        self.blocks.len() < before
    }

    /// Move the block at `from` so that it ends up at index `to`.
    pub fn move_block(&mut self, from: usize, to: usize) -> bool {
        if from >= self.blocks.len() || to >= self.blocks.len() || from == to {
            return false;
        }
        let block = self.blocks.remove(from);
        self.blocks.insert(to, block);
        true
    }

    /// Set the text of a prefix block.
    pub fn set_prefix(&mut self, id: &str, value: impl Into<String>) -> bool {
        match self.block_mut(id) {
            Some(BlockKind::Prefix { value: v }) => {
                *v = value.into();
                true
            }
            _ => false,
        }
    }

    /// Set the length of a random block, clamped to [`RANDOM_LENGTH_RANGE`].
    pub fn set_random_length(&mut self, id: &str, length: u8) -> bool {
        match self.block_mut(id) {
            Some(BlockKind::Random { length: l }) => {
                *l = clamp_random_length(length);
                true
            }
            _ => false,
        }
    }

    pub fn set_sanitize(&mut self, enabled: bool) {
        self.sanitize_enabled = enabled;
    }

    fn block_mut(&mut self, id: &str) -> Option<&mut BlockKind> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .map(|b| &mut b.kind)
    }
}

fn clamp_random_length(length: u8) -> u8 {
    length.clamp(*RANDOM_LENGTH_RANGE.start(), *RANDOM_LENGTH_RANGE.end())
}
