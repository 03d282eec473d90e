pub mod constants;
pub mod error;
pub mod frame_index;
pub mod io;
pub mod logger;
pub mod memory;
pub mod page_table;
pub mod simulation;
pub mod translation;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use error::{ConfigError, Fault, VmError, VmResult};
pub use memory::ReplacementPolicy;
pub use page_table::{Access, Protection};
pub use translation::{LogicalAddress, Request, Translation};
pub use vm_manager::{ManagerConfig, MemoryManager, PageProtection};
