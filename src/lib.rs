#![doc = include_str!("../README.md")]
#![deny(missing_debug_implementations, missing_docs)]

mod map;
mod raw;

pub use map::{FullError, HashMap, HashMapBuilder, HashMapRef, ResizeMode, DEFAULT_CAPACITY};
pub use seize::{Guard, LocalGuard, OwnedGuard};
