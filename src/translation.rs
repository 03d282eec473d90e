use crate::error::Fault;
use crate::frame_index::FrameOwner;
use crate::page_table::Access;

/// Logical address as supplied by a caller: (segment, directory index, page, offset).
///
/// Components are signed so that negative input reaches the engine and is
/// reported as the matching fault instead of being lost in parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalAddress {
    pub segment: i64,
    pub directory: i64,
    pub page: i64,
    pub offset: i64,
}

impl LogicalAddress {
    pub fn new(segment: i64, directory: i64, page: i64, offset: i64) -> Self {
        LogicalAddress { segment, directory, page, offset }
    }
}

impl std::fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{},{})", self.segment, self.directory, self.page, self.offset)
    }
}

/// One translation request: an address and the access it performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub address: LogicalAddress,
    pub access: Access,
}

impl Request {
    pub fn new(address: LogicalAddress, access: Access) -> Self {
        Request { address, access }
    }
}

/// Result of one `translate` call plus its modeled latency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub result: Result<usize, Fault>,
    pub latency: u32,
    /// Logical time at which the request was served
    pub time: u64,
    /// Whether a not-present page was resolved (or attempted) on this request
    pub page_fault: bool,
    /// Page evicted to resolve the fault, if any
    pub evicted: Option<FrameOwner>,
}

impl Translation {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn physical_address(&self) -> Option<usize> {
        self.result.ok()
    }

    pub fn fault(&self) -> Option<Fault> {
        self.result.err()
    }

    /// "OK" or "FAULT", as written to the translation log
    pub fn status(&self) -> &'static str {
        if self.is_ok() { "OK" } else { "FAULT" }
    }

    /// Physical address, or the fault text for failed requests
    pub fn outcome_text(&self) -> String {
        match self.result {
            Ok(pa) => pa.to_string(),
            Err(fault) => fault.to_string(),
        }
    }
}

impl std::fmt::Display for Translation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.result {
            Ok(pa) => write!(f, "Physical {} (Latency: {})", pa, self.latency),
            Err(fault) => write!(f, "FAULT ({}) (Latency: {})", fault, self.latency),
        }
    }
}
