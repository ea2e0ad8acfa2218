mod payload_splitter;
pub use payload_splitter::*;

mod latch;
pub use latch::*;

mod time_utils;
pub use time_utils::*;
