//! Export of detection results.
//!
//! Results are written as JSON Lines: one complete JSON object per input URL,
//! in input order, suitable for piping to `jq` or loading into other tools.

mod jsonl;
mod pipe;

pub use jsonl::{export_jsonl, write_jsonl};
