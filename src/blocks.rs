//! Document blocks and the flattened reading order
//!
//! Blocks are produced server-side when a document is processed. This module
//! only reads them: it indexes the flattened sequence so that the progress
//! tracker can resolve a block id to its ordinal position and a position back
//! to a page without scanning.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A point in page-local units
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Bounding polygon of a block, in page-local units
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(pub Vec<Point>);

impl Polygon {
    /// Axis-aligned bounds as `(x0, y0, x1, y1)`, or `None` for an empty polygon
    #[must_use]
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.0.first()?;
        let init = (first.x, first.y, first.x, first.y);
        Some(self.0.iter().fold(init, |(x0, y0, x1, y1), p| {
            (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
        }))
    }
}

/// A structural content unit of a document (paragraph, heading, figure)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    /// 0-indexed page the block sits on
    #[serde(alias = "page_number")]
    pub page: usize,
    /// Rich-text markup
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub polygon: Polygon,
}

impl Block {
    pub fn new(id: impl Into<String>, page: usize, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page,
            content: content.into(),
            polygon: Polygon::default(),
        }
    }
}

/// Blocks in stable reading order, indexed by id
#[derive(Clone, Debug, Default)]
pub struct BlockSequence {
    blocks: Vec<Block>,
    positions: HashMap<String, usize>,
}

impl BlockSequence {
    /// Build the sequence from blocks already in reading order.
    ///
    /// If an id appears more than once, the first occurrence wins.
    #[must_use]
    pub fn new(blocks: Vec<Block>) -> Self {
        let mut positions = HashMap::with_capacity(blocks.len());
        for (position, block) in blocks.iter().enumerate() {
            if positions.contains_key(&block.id) {
                log::warn!("Duplicate block id {} at position {position}", block.id);
                continue;
            }
            positions.insert(block.id.clone(), position);
        }
        Self { blocks, positions }
    }

    /// Ordinal position of a block in the reading order
    #[must_use]
    pub fn position_of(&self, block_id: &str) -> Option<usize> {
        self.positions.get(block_id).copied()
    }

    #[must_use]
    pub fn get(&self, block_id: &str) -> Option<&Block> {
        self.position_of(block_id).map(|pos| &self.blocks[pos])
    }

    #[must_use]
    pub fn at(&self, position: usize) -> Option<&Block> {
        self.blocks.get(position)
    }

    /// Page of the block at `position`, if the position is in bounds
    #[must_use]
    pub fn page_at(&self, position: usize) -> Option<usize> {
        self.at(position).map(|b| b.page)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }
}

impl FromIterator<Block> for BlockSequence {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
