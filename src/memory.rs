use std::collections::VecDeque;

use crate::error::Fault;
use crate::frame_index::{FrameId, FrameOwner, FrameOwnerIndex};
use crate::page_table::TableArena;

/// Victim selection used once every frame is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReplacementPolicy {
    /// Round-robin by allocation age
    #[default]
    Fifo,
    /// Least recently accessed page, ties to the lowest frame id
    Lru,
}

impl std::fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplacementPolicy::Fifo => write!(f, "FIFO"),
            ReplacementPolicy::Lru => write!(f, "LRU"),
        }
    }
}

/// A frame handed out by [`PhysicalMemoryPool::acquire_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub frame: FrameId,
    /// Page that was evicted to make room, if any
    pub evicted: Option<FrameOwner>,
}

/// Fixed set of physical frames shared by every segment
pub struct PhysicalMemoryPool {
    occupied: Vec<bool>,
    // allocation order; cycles on FIFO eviction
    order: VecDeque<FrameId>,
    policy: ReplacementPolicy,
    clock: u64,
}

impl PhysicalMemoryPool {
    /// Create a pool of `frames` free frames
    pub fn new(frames: usize, policy: ReplacementPolicy) -> Self {
        PhysicalMemoryPool {
            occupied: vec![false; frames],
            order: VecDeque::with_capacity(frames),
            policy,
            clock: 0,
        }
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.occupied.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().filter(|&&o| o).count()
    }

    pub fn free_count(&self) -> usize {
        self.frame_count() - self.occupied_count()
    }

    pub fn is_free(&self, frame: FrameId) -> bool {
        self.occupied.get(frame).is_some_and(|&o| !o)
    }

    #[inline]
    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    /// Current logical time
    #[inline]
    pub fn now(&self) -> u64 {
        self.clock
    }

    /// Advance the logical clock by one request and return the new time
    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Frames in allocation order, oldest first
    pub fn allocation_order(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.order.iter().copied()
    }

    /// Produce an occupied frame for a page that is about to be bound.
    ///
    /// A free frame is preferred. Otherwise a victim is chosen per policy; its
    /// page is invalidated and its index entry dropped. The returned frame is
    /// always marked occupied.
    pub fn acquire_frame(
        &mut self,
        index: &mut FrameOwnerIndex,
        tables: &mut TableArena,
    ) -> Result<Allocation, Fault> {
        if let Some(frame) = self.occupied.iter().position(|&o| !o) {
            self.occupied[frame] = true;
            self.order.push_back(frame);
            log::trace!("allocated free frame {}", frame);
            return Ok(Allocation { frame, evicted: None });
        }

        log::debug!("no free frames, running {} replacement", self.policy);
        let Some(victim) = self.select_victim(index, tables) else {
            log::warn!(
                "page replacement failed ({} frames, {} owned)",
                self.frame_count(),
                index.len()
            );
            return Err(Fault::ReplacementFailure);
        };

        let evicted = index.remove(victim);
        if let Some(owner) = evicted {
            log::debug!(
                "evicting page {} of table {} from frame {}",
                owner.page,
                owner.table,
                victim
            );
            if let Some(table) = tables.get_mut(owner.table) {
                table.invalidate(owner.page);
            }
        }
        self.occupied[victim] = true;

        Ok(Allocation { frame: victim, evicted })
    }

    fn select_victim(&mut self, index: &FrameOwnerIndex, tables: &TableArena) -> Option<FrameId> {
        match self.policy {
            ReplacementPolicy::Fifo => {
                let victim = self.order.pop_front()?;
                self.order.push_back(victim);
                log::debug!("FIFO victim: frame {}", victim);
                Some(victim)
            }
            ReplacementPolicy::Lru => {
                let victim = index
                    .iter()
                    .filter_map(|(frame, owner)| {
                        tables.owner_entry(owner).map(|e| (e.last_access, frame))
                    })
                    .min()
                    .map(|(_, frame)| frame)?;
                log::debug!("LRU victim: frame {}", victim);
                Some(victim)
            }
        }
    }

    /// Return `frame` to the free set, dropping and invalidating its owner
    pub fn release_frame(
        &mut self,
        frame: FrameId,
        index: &mut FrameOwnerIndex,
        tables: &mut TableArena,
    ) -> Option<FrameOwner> {
        let slot = self.occupied.get_mut(frame)?;
        *slot = false;
        self.order.retain(|&f| f != frame);

        let owner = index.remove(frame)?;
        if let Some(table) = tables.get_mut(owner.table) {
            table.invalidate(owner.page);
        }
        log::trace!("released frame {}", frame);
        Some(owner)
    }

    /// Percentage of occupied frames, 0 for an empty pool
    pub fn utilization(&self) -> f64 {
        if self.occupied.is_empty() {
            return 0.0;
        }
        self.occupied_count() as f64 / self.frame_count() as f64 * 100.0
    }
}
