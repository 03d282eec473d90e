pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_NUM_FRAMES: usize = 16;

// latency model, in abstract time units
pub const BASE_LATENCY_MIN: u32 = 1;
pub const BASE_LATENCY_MAX: u32 = 5;
pub const PAGE_FAULT_PENALTY: u32 = 100;

// geometry used when segments are generated instead of loaded
pub const RANDOM_DIR_ENTRIES: usize = 4;
pub const RANDOM_TABLE_ENTRIES: usize = 16;

pub const STRESS_REQUESTS: usize = 200;
pub const STRESS_VALID_RATIO: f64 = 0.7;

pub const CSV_HEADER: &str = "Time,LogicalAddress,Access,Status,PhysicalAddress,Latency";

// access flag values used by batch and interactive input
pub const ACCESS_READ_FLAG: i64 = 0;
pub const ACCESS_WRITE_FLAG: i64 = 1;
pub const PROTECTION_RW_FLAG: i64 = 1;
