use std::collections::BTreeMap;

use crate::constants::*;
use crate::error::ConfigError;
use crate::frame_index::{FrameId, FrameOwner, FrameOwnerIndex};

/// Protection bits carried by segments and pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protection {
    ReadOnly,
    ReadWrite,
}

impl Protection {
    /// Decode a config-file flag (1 = read/write, anything else read-only)
    pub fn from_flag(flag: i64) -> Self {
        if flag == PROTECTION_RW_FLAG {
            Protection::ReadWrite
        } else {
            Protection::ReadOnly
        }
    }

    #[inline]
    pub fn permits(self, access: Access) -> bool {
        !(access == Access::Write && self == Protection::ReadOnly)
    }
}

impl std::fmt::Display for Protection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protection::ReadOnly => write!(f, "RO"),
            Protection::ReadWrite => write!(f, "RW"),
        }
    }
}

/// Kind of memory access requested by a translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    /// Decode an access flag (0 = read, 1 = write)
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            ACCESS_READ_FLAG => Some(Access::Read),
            ACCESS_WRITE_FLAG => Some(Access::Write),
            _ => None,
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "Read"),
            Access::Write => write!(f, "Write"),
        }
    }
}

/// Mapping state of one page slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub frame: Option<FrameId>,
    pub present: bool,
    pub protection: Protection,
    pub last_access: u64,
}

impl PageEntry {
    pub fn new(protection: Protection) -> Self {
        PageEntry {
            frame: None,
            present: false,
            protection,
            last_access: 0,
        }
    }
}

/// Arena-assigned identity of a page table. Stays valid when directories grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub usize);

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Outcome of looking up one page for one access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLookup {
    Hit(FrameId),
    ProtectionViolation,
    NotPresent,
    OutOfRange,
}

/// Fixed-length sequence of page entries sharing one page size
#[derive(Debug, Clone)]
pub struct PageTable {
    id: TableId,
    segment: u32,
    directory_index: usize,
    entries: Vec<PageEntry>,
    page_size: usize,
}

impl PageTable {
    /// Create a table with one entry per supplied protection, none present
    pub fn new(
        id: TableId,
        segment: u32,
        directory_index: usize,
        protections: Vec<Protection>,
        page_size: usize,
    ) -> Self {
        PageTable {
            id,
            segment,
            directory_index,
            entries: protections.into_iter().map(PageEntry::new).collect(),
            page_size,
        }
    }

    #[inline]
    pub fn segment(&self) -> u32 {
        self.segment
    }

    #[inline]
    pub fn directory_index(&self) -> usize {
        self.directory_index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn entry(&self, page: usize) -> Option<&PageEntry> {
        self.entries.get(page)
    }

    /// Look up `page` for `access` at logical time `now`.
    ///
    /// Checks run in order: range, protection, presence. Only a hit
    /// refreshes `last_access`.
    pub fn resolve(&mut self, page: usize, access: Access, now: u64) -> PageLookup {
        let Some(entry) = self.entries.get_mut(page) else {
            return PageLookup::OutOfRange;
        };
        if !entry.protection.permits(access) {
            return PageLookup::ProtectionViolation;
        }
        match (entry.present, entry.frame) {
            (true, Some(frame)) => {
                entry.last_access = now;
                PageLookup::Hit(frame)
            }
            _ => PageLookup::NotPresent,
        }
    }

    /// Map `page` onto `frame` and record the ownership in `index`.
    /// Out-of-range pages are ignored.
    pub fn bind(
        &mut self,
        page: usize,
        frame: FrameId,
        protection: Protection,
        now: u64,
        index: &mut FrameOwnerIndex,
    ) {
        let Some(entry) = self.entries.get_mut(page) else {
            return;
        };
        entry.frame = Some(frame);
        entry.present = true;
        entry.protection = protection;
        entry.last_access = now;
        index.insert(frame, FrameOwner { table: self.id, page });
    }

    /// Clear the mapping of `page`. The frame owner index is left alone;
    /// whoever evicts or releases the frame drops that entry.
    pub fn invalidate(&mut self, page: usize) {
        if let Some(entry) = self.entries.get_mut(page) {
            entry.frame = None;
            entry.present = false;
        }
    }
}

/// Owns every page table; tables are addressed by [`TableId`]
#[derive(Debug, Default)]
pub struct TableArena {
    tables: Vec<PageTable>,
}

impl TableArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new table and return its id
    pub fn insert(
        &mut self,
        segment: u32,
        directory_index: usize,
        protections: Vec<Protection>,
        page_size: usize,
    ) -> TableId {
        let id = TableId(self.tables.len());
        self.tables
            .push(PageTable::new(id, segment, directory_index, protections, page_size));
        id
    }

    pub fn get(&self, id: TableId) -> Option<&PageTable> {
        self.tables.get(id.0)
    }

    pub fn get_mut(&mut self, id: TableId) -> Option<&mut PageTable> {
        self.tables.get_mut(id.0)
    }

    /// Page entry that `owner` refers to, if the owner still names a valid slot
    pub fn owner_entry(&self, owner: FrameOwner) -> Option<&PageEntry> {
        self.get(owner.table)?.entry(owner.page)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTable> {
        self.tables.iter()
    }
}

/// Sparse mapping from directory index to page table
#[derive(Debug, Clone, Default)]
pub struct PageDirectory {
    tables: BTreeMap<usize, TableId>,
}

impl PageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_table(&self, index: usize) -> Option<TableId> {
        self.tables.get(&index).copied()
    }

    /// Provision a fresh table at `index`; an occupied index is an error
    pub fn add_table(
        &mut self,
        arena: &mut TableArena,
        segment: u32,
        index: usize,
        protections: Vec<Protection>,
        page_size: usize,
    ) -> Result<TableId, ConfigError> {
        if self.tables.contains_key(&index) {
            return Err(ConfigError::DuplicateTable { segment, index });
        }
        if protections.is_empty() {
            return Err(ConfigError::EmptyTable { segment });
        }
        let id = arena.insert(segment, index, protections, page_size);
        self.tables.insert(index, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Provisioned directory indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.tables.keys().copied()
    }

    pub fn table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pages: usize, protection: Protection) -> PageTable {
        PageTable::new(TableId(0), 0, 0, vec![protection; pages], 16)
    }

    // =========================================================================
    // PageTable
    // =========================================================================

    #[test]
    fn test_new_table_has_no_present_pages() {
        let t = table(4, Protection::ReadWrite);
        assert_eq!(t.len(), 4);
        assert_eq!(t.page_size(), 16);
        for p in 0..4 {
            let e = t.entry(p).unwrap();
            assert!(!e.present);
            assert_eq!(e.frame, None);
            assert_eq!(e.last_access, 0);
        }
    }

    #[test]
    fn test_resolve_out_of_range() {
        let mut t = table(4, Protection::ReadWrite);
        assert_eq!(t.resolve(4, Access::Read, 1), PageLookup::OutOfRange);
    }

    #[test]
    fn test_resolve_not_present() {
        let mut t = table(4, Protection::ReadWrite);
        assert_eq!(t.resolve(2, Access::Write, 1), PageLookup::NotPresent);
    }

    #[test]
    fn test_bind_then_hit_updates_last_access() {
        let mut t = table(4, Protection::ReadWrite);
        let mut index = FrameOwnerIndex::new();
        t.bind(1, 7, Protection::ReadWrite, 3, &mut index);

        assert_eq!(index.owner(7), Some(FrameOwner { table: TableId(0), page: 1 }));
        assert_eq!(t.entry(1).unwrap().last_access, 3);

        assert_eq!(t.resolve(1, Access::Read, 10), PageLookup::Hit(7));
        assert_eq!(t.entry(1).unwrap().last_access, 10);
    }

    #[test]
    fn test_protection_checked_before_presence() {
        let mut t = table(2, Protection::ReadOnly);
        // not present, still a protection violation
        assert_eq!(t.resolve(0, Access::Write, 1), PageLookup::ProtectionViolation);

        // present, still a protection violation, and recency untouched
        let mut index = FrameOwnerIndex::new();
        t.bind(0, 0, Protection::ReadOnly, 2, &mut index);
        assert_eq!(t.resolve(0, Access::Write, 5), PageLookup::ProtectionViolation);
        assert_eq!(t.entry(0).unwrap().last_access, 2);
        assert_eq!(t.resolve(0, Access::Read, 6), PageLookup::Hit(0));
    }

    #[test]
    fn test_bind_invalidate_resolve_is_not_present() {
        let mut t = table(3, Protection::ReadWrite);
        let mut index = FrameOwnerIndex::new();
        t.bind(2, 5, Protection::ReadWrite, 1, &mut index);
        t.invalidate(2);
        t.invalidate(2);
        assert_eq!(t.resolve(2, Access::Read, 2), PageLookup::NotPresent);
        // the index entry is the evictor's to drop
        assert!(index.owner(5).is_some());
    }

    #[test]
    fn test_bind_out_of_range_is_ignored() {
        let mut t = table(2, Protection::ReadWrite);
        let mut index = FrameOwnerIndex::new();
        t.bind(9, 1, Protection::ReadWrite, 1, &mut index);
        assert!(index.is_empty());
    }

    // =========================================================================
    // PageDirectory / TableArena
    // =========================================================================

    #[test]
    fn test_directory_add_and_get() {
        let mut arena = TableArena::new();
        let mut dir = PageDirectory::new();

        let a = dir.add_table(&mut arena, 3, 0, vec![Protection::ReadWrite; 8], 16).unwrap();
        let b = dir.add_table(&mut arena, 3, 5, vec![Protection::ReadOnly; 2], 16).unwrap();

        assert_eq!(dir.get_table(0), Some(a));
        assert_eq!(dir.get_table(5), Some(b));
        assert_eq!(dir.get_table(1), None);
        assert_eq!(dir.indices().collect::<Vec<_>>(), vec![0, 5]);

        let tb = arena.get(b).unwrap();
        assert_eq!(tb.segment(), 3);
        assert_eq!(tb.directory_index(), 5);
        assert_eq!(tb.len(), 2);
    }

    #[test]
    fn test_directory_rejects_duplicate_index() {
        let mut arena = TableArena::new();
        let mut dir = PageDirectory::new();
        dir.add_table(&mut arena, 1, 2, vec![Protection::ReadWrite; 4], 16).unwrap();

        let err = dir
            .add_table(&mut arena, 1, 2, vec![Protection::ReadWrite; 4], 16)
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateTable { segment: 1, index: 2 });
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_table_ids_stable_across_growth() {
        let mut arena = TableArena::new();
        let mut dir = PageDirectory::new();
        let first = dir.add_table(&mut arena, 0, 0, vec![Protection::ReadWrite; 4], 16).unwrap();
        for i in 1..50 {
            dir.add_table(&mut arena, 0, i, vec![Protection::ReadWrite; 4], 16).unwrap();
        }
        assert_eq!(dir.get_table(0), Some(first));
        assert_eq!(arena.get(first).unwrap().directory_index(), 0);
    }

    #[test]
    fn test_flags() {
        assert_eq!(Protection::from_flag(1), Protection::ReadWrite);
        assert_eq!(Protection::from_flag(0), Protection::ReadOnly);
        assert_eq!(Protection::from_flag(7), Protection::ReadOnly);
        assert_eq!(Access::from_flag(0), Some(Access::Read));
        assert_eq!(Access::from_flag(1), Some(Access::Write));
        assert_eq!(Access::from_flag(2), None);
        assert!(!Protection::ReadOnly.permits(Access::Write));
        assert!(Protection::ReadOnly.permits(Access::Read));
        assert!(Protection::ReadWrite.permits(Access::Write));
    }
}
