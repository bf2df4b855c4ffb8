//! Wire encoding and batch assembly
//!
//! `codec` writes and reads the binary bulk-load format; `buffer` accumulates
//! records per label and turns them into ready-to-send batches.

pub mod buffer;
pub mod codec;

pub use buffer::{Batch, EdgeState, ImportBuffer, LabelBlob, LabelCount, PendingEdge};
