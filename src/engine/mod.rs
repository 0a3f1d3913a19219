mod processor;
mod shared;

pub use processor::EqProcessor;
pub use shared::EqShared;

/// Mono analysis scratch size when the host reports no maximum block size
pub const FALLBACK_BLOCK_SIZE: usize = 4096;
