use std::collections::BTreeMap;

use crate::page_table::TableId;

pub type FrameId = usize;

/// The (table, page) pair occupying a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameOwner {
    pub table: TableId,
    pub page: usize,
}

/// Reverse mapping from physical frame to its owning page.
///
/// Holds exactly one entry per occupied, bound frame. Iteration is in
/// ascending frame order, which eviction scans rely on for tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct FrameOwnerIndex {
    owners: BTreeMap<FrameId, FrameOwner>,
}

impl FrameOwnerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` as the occupant of `frame`, returning the previous one
    pub fn insert(&mut self, frame: FrameId, owner: FrameOwner) -> Option<FrameOwner> {
        self.owners.insert(frame, owner)
    }

    pub fn remove(&mut self, frame: FrameId) -> Option<FrameOwner> {
        self.owners.remove(&frame)
    }

    pub fn owner(&self, frame: FrameId) -> Option<FrameOwner> {
        self.owners.get(&frame).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, FrameOwner)> + '_ {
        self.owners.iter().map(|(&f, &o)| (f, o))
    }
}
