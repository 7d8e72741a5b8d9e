//! Storage module
//!
//! Block bookkeeping and hash checks for pieces, plus the sinks verified
//! pieces are written to.

pub mod backend;
pub mod file;
pub mod piece;

// Re-export backend types
pub use backend::{MemorySink, PieceSink};

// Re-export file storage types
pub use file::FileSink;

// Re-export piece types
pub use piece::{block_requests, verify_piece, Block, PieceBuffer, BLOCK_SIZE};
