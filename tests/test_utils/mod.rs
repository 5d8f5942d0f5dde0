#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod shared_buffer;

pub use fixtures::{Harness, drain, harness, harness_with, wait_until};
pub use shared_buffer::{Gate, GatedBuf, SharedBuf};
