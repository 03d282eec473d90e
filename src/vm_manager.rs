//! Memory Manager - segment registry and the translation engine
//!
//! Owns every segment with its page directory, the table arena, the frame
//! owner index and the physical frame pool. Callers only go through the
//! public operations here.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::*;
use crate::error::{ConfigError, Fault, ProtectionScope};
use crate::frame_index::{FrameId, FrameOwner, FrameOwnerIndex};
use crate::memory::{PhysicalMemoryPool, ReplacementPolicy};
use crate::page_table::{Access, PageDirectory, PageLookup, PageTable, Protection, TableArena, TableId};
use crate::translation::{LogicalAddress, Request, Translation};

/// How page protection is assigned when a table is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageProtection {
    /// Every page starts with its segment's protection
    #[default]
    Inherit,
    /// Each page is read-only or read/write with equal probability
    Randomized,
}

/// Construction parameters for a [`MemoryManager`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerConfig {
    pub frames: usize,
    pub page_size: usize,
    pub policy: ReplacementPolicy,
    /// Seed for latency and page-protection randomness; OS entropy when absent
    pub seed: Option<u64>,
    pub page_protection: PageProtection,
}

impl ManagerConfig {
    pub fn new(frames: usize, page_size: usize, policy: ReplacementPolicy) -> Self {
        ManagerConfig {
            frames,
            page_size,
            policy,
            seed: None,
            page_protection: PageProtection::Inherit,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_page_protection(mut self, page_protection: PageProtection) -> Self {
        self.page_protection = page_protection;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_FRAMES, DEFAULT_PAGE_SIZE, ReplacementPolicy::Fifo)
    }
}

/// Immutable description of a registered segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub id: u32,
    pub base: usize,
    pub limit: usize,
    pub protection: Protection,
}

struct Segment {
    descriptor: SegmentDescriptor,
    directory: PageDirectory,
}

/// One occupied frame as seen by diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub frame: FrameId,
    pub table: TableId,
    pub segment: u32,
    pub directory_index: usize,
    pub page: usize,
    pub last_access: u64,
}

pub struct MemoryManager {
    segments: BTreeMap<u32, Segment>,
    tables: TableArena,
    index: FrameOwnerIndex,
    pool: PhysicalMemoryPool,
    page_size: usize,
    page_protection: PageProtection,
    rng: StdRng,
}

impl MemoryManager {
    pub fn new(config: ManagerConfig) -> Result<Self, ConfigError> {
        if config.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        // every frame * page_size + offset must fit in a usize
        if config.frames.checked_mul(config.page_size).is_none() {
            return Err(ConfigError::AddressSpaceOverflow {
                frames: config.frames,
                page_size: config.page_size,
            });
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        log::info!(
            "memory manager: {} frames of {} units, {} replacement",
            config.frames,
            config.page_size,
            config.policy
        );
        Ok(MemoryManager {
            segments: BTreeMap::new(),
            tables: TableArena::new(),
            index: FrameOwnerIndex::new(),
            pool: PhysicalMemoryPool::new(config.frames, config.policy),
            page_size: config.page_size,
            page_protection: config.page_protection,
            rng,
        })
    }

    /// Register segment `id` and provision `directory_entries` tables of
    /// `table_entries` pages each, at directory indices `0..directory_entries`.
    pub fn add_segment(
        &mut self,
        id: u32,
        base: usize,
        limit: usize,
        protection: Protection,
        directory_entries: usize,
        table_entries: usize,
    ) -> Result<(), ConfigError> {
        if self.segments.contains_key(&id) {
            return Err(ConfigError::DuplicateSegment(id));
        }
        if directory_entries > 0 && table_entries == 0 {
            return Err(ConfigError::EmptyTable { segment: id });
        }

        let mut directory = PageDirectory::new();
        for index in 0..directory_entries {
            let protections = self.page_protections(protection, table_entries);
            directory.add_table(&mut self.tables, id, index, protections, self.page_size)?;
        }

        let descriptor = SegmentDescriptor { id, base, limit, protection };
        self.segments.insert(id, Segment { descriptor, directory });
        log::info!(
            "added segment {} ({}, {} tables x {} pages)",
            id,
            protection,
            directory_entries,
            table_entries
        );
        Ok(())
    }

    /// Provision a table at `index` in an existing segment's directory
    pub fn add_table(&mut self, segment: u32, index: usize, pages: usize) -> Result<TableId, ConfigError> {
        let seg = self.segments.get(&segment).ok_or(ConfigError::UnknownSegment(segment))?;
        if seg.directory.get_table(index).is_some() {
            return Err(ConfigError::DuplicateTable { segment, index });
        }
        let protection = seg.descriptor.protection;
        let protections = self.page_protections(protection, pages);

        let Some(seg) = self.segments.get_mut(&segment) else {
            return Err(ConfigError::UnknownSegment(segment));
        };
        let id = seg
            .directory
            .add_table(&mut self.tables, segment, index, protections, self.page_size)?;
        log::debug!("segment {}: table {} added at directory index {}", segment, id, index);
        Ok(id)
    }

    fn page_protections(&mut self, segment: Protection, pages: usize) -> Vec<Protection> {
        match self.page_protection {
            PageProtection::Inherit => vec![segment; pages],
            PageProtection::Randomized => (0..pages)
                .map(|_| {
                    if self.rng.random_bool(0.5) {
                        Protection::ReadWrite
                    } else {
                        Protection::ReadOnly
                    }
                })
                .collect(),
        }
    }

    pub fn translate_request(&mut self, request: &Request) -> Translation {
        self.translate(request.address, request.access)
    }

    /// Translate `address` for `access`.
    ///
    /// Validation order: segment, segment protection, directory index, page
    /// range, offset, then page protection and presence. A page that is not
    /// present is faulted in, evicting a victim if the pool is full; only a
    /// failed replacement is reported to the caller.
    pub fn translate(&mut self, address: LogicalAddress, access: Access) -> Translation {
        let now = self.pool.tick();
        let mut translation = Translation {
            result: Err(Fault::ReplacementFailure),
            latency: self.rng.random_range(BASE_LATENCY_MIN..=BASE_LATENCY_MAX),
            time: now,
            page_fault: false,
            evicted: None,
        };
        let result = self.resolve(address, access, now, &mut translation);
        translation.result = result;

        match translation.result {
            Ok(pa) => log::trace!("t={} {} {} -> {}", now, address, access, pa),
            Err(fault) => log::debug!("t={} {} {} -> {}", now, address, access, fault),
        }
        translation
    }

    fn resolve(
        &mut self,
        address: LogicalAddress,
        access: Access,
        now: u64,
        translation: &mut Translation,
    ) -> Result<usize, Fault> {
        let segment = u32::try_from(address.segment)
            .ok()
            .and_then(|id| self.segments.get(&id))
            .ok_or(Fault::SegmentationFault { segment: address.segment })?;

        if !segment.descriptor.protection.permits(access) {
            return Err(Fault::ProtectionViolation { scope: ProtectionScope::Segment });
        }

        let table_id = usize::try_from(address.directory)
            .ok()
            .and_then(|index| segment.directory.get_table(index))
            .ok_or(Fault::DirectoryFault { index: address.directory })?;
        let table = self
            .tables
            .get_mut(table_id)
            .ok_or(Fault::DirectoryFault { index: address.directory })?;

        let page = usize::try_from(address.page)
            .ok()
            .filter(|&p| p < table.len())
            .ok_or(Fault::PageFault { page: address.page })?;
        let offset = usize::try_from(address.offset)
            .ok()
            .filter(|&o| o < table.page_size())
            .ok_or(Fault::OffsetFault { offset: address.offset })?;
        let page_size = table.page_size();

        let frame = match table.resolve(page, access, now) {
            PageLookup::Hit(frame) => frame,
            PageLookup::ProtectionViolation => {
                return Err(Fault::ProtectionViolation { scope: ProtectionScope::Page });
            }
            PageLookup::OutOfRange => return Err(Fault::PageFault { page: address.page }),
            PageLookup::NotPresent => {
                let protection = table.entry(page).map_or(Protection::ReadWrite, |e| e.protection);
                translation.page_fault = true;
                translation.latency += PAGE_FAULT_PENALTY;
                log::debug!("page fault on {}, handling", address);

                let allocation = self.pool.acquire_frame(&mut self.index, &mut self.tables)?;
                translation.evicted = allocation.evicted;
                if let Some(table) = self.tables.get_mut(table_id) {
                    table.bind(page, allocation.frame, protection, now, &mut self.index);
                }
                allocation.frame
            }
        };

        Ok(frame * page_size + offset)
    }

    /// Free `frame`, invalidating whatever page occupied it
    pub fn release_frame(&mut self, frame: FrameId) -> Option<FrameOwner> {
        self.pool.release_frame(frame, &mut self.index, &mut self.tables)
    }

    /// Occupied, bound frames in ascending frame order
    pub fn snapshot(&self) -> Vec<FrameSnapshot> {
        self.index
            .iter()
            .filter_map(|(frame, owner)| {
                let table = self.tables.get(owner.table)?;
                let entry = table.entry(owner.page)?;
                Some(FrameSnapshot {
                    frame,
                    table: owner.table,
                    segment: table.segment(),
                    directory_index: table.directory_index(),
                    page: owner.page,
                    last_access: entry.last_access,
                })
            })
            .collect()
    }

    pub fn utilization(&self) -> f64 {
        self.pool.utilization()
    }

    /// Current logical time (number of requests served)
    pub fn now(&self) -> u64 {
        self.pool.now()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn frame_count(&self) -> usize {
        self.pool.frame_count()
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.pool.policy()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, id: u32) -> Option<&SegmentDescriptor> {
        self.segments.get(&id).map(|s| &s.descriptor)
    }

    pub fn segments(&self) -> impl Iterator<Item = &SegmentDescriptor> {
        self.segments.values().map(|s| &s.descriptor)
    }

    pub fn directory(&self, segment: u32) -> Option<&PageDirectory> {
        self.segments.get(&segment).map(|s| &s.directory)
    }

    pub fn table(&self, id: TableId) -> Option<&PageTable> {
        self.tables.get(id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &PageTable> {
        self.tables.iter()
    }

    /// Displayable report of utilization, time and frame occupancy
    pub fn memory_map(&self) -> MemoryMap<'_> {
        MemoryMap { manager: self }
    }
}

pub struct MemoryMap<'a> {
    manager: &'a MemoryManager,
}

impl fmt::Display for MemoryMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Memory Map ---")?;
        writeln!(f, "Physical Memory Utilization: {:.2}%", self.manager.utilization())?;
        writeln!(f, "Current Time: {}", self.manager.now())?;
        writeln!(f, "Frames in Use:")?;
        for s in self.manager.snapshot() {
            writeln!(
                f,
                "  [Frame {:>2}]: Segment {} Dir {} Page {:>2} (Last Access: {})",
                s.frame, s.segment, s.directory_index, s.page, s.last_access
            )?;
        }
        write!(f, "-------------------")
    }
}
