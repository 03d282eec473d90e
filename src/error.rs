//! Error types for the translation engine and its drivers.
//!
//! Translation faults are ordinary values carried inside a
//! [`Translation`](crate::translation::Translation); `ConfigError` and
//! `VmError` are the failures that abort an operation.

use std::path::PathBuf;

use thiserror::Error;

/// Where a protection violation was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionScope {
    Segment,
    Page,
}

impl std::fmt::Display for ProtectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtectionScope::Segment => write!(f, "segment"),
            ProtectionScope::Page => write!(f, "page"),
        }
    }
}

/// Fault raised while translating a logical address.
///
/// A page that is valid but not resident is not a fault from the caller's
/// point of view: the engine resolves it by allocating or evicting a frame.
/// Only `ReplacementFailure` escapes from that path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("Segmentation Fault: invalid segment {segment}")]
    SegmentationFault { segment: i64 },

    #[error("Protection Violation: cannot write to read-only {scope}")]
    ProtectionViolation { scope: ProtectionScope },

    #[error("Directory Fault: no page table at directory index {index}")]
    DirectoryFault { index: i64 },

    #[error("Page Fault: page number {page} exceeds table size")]
    PageFault { page: i64 },

    #[error("Offset Fault: offset {offset} exceeds page size")]
    OffsetFault { offset: i64 },

    #[error("Replacement Failure: no frame could be allocated or evicted")]
    ReplacementFailure,
}

/// Rejected change to the segment/directory layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("segment {0} is already registered")]
    DuplicateSegment(u32),

    #[error("segment {0} is not registered")]
    UnknownSegment(u32),

    #[error("segment {segment} already has a page table at directory index {index}")]
    DuplicateTable { segment: u32, index: usize },

    #[error("page size must be greater than zero")]
    ZeroPageSize,

    #[error("{frames} frames of {page_size} units exceed the physical address space")]
    AddressSpaceOverflow { frames: usize, page_size: usize },

    #[error("page table for segment {segment} must hold at least one page")]
    EmptyTable { segment: u32 },
}

/// Crate-level error returned by loaders, drivers and the CLI.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no segments loaded or initialized")]
    NoSegments,
}

pub type VmResult<T> = Result<T, VmError>;
