//! Record sources.

mod jsonl;

pub use jsonl::{records, JsonlRecordSource};
