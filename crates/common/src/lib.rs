//! Small text helpers shared across stemsplit crates.

pub mod text;

pub use text::truncate_chars;
