// Export modules for use in tests
pub mod blocks;
pub mod pages;
pub mod progress;
pub mod settings;
pub mod words;

pub use blocks::{Block, BlockSequence, Point, Polygon};
pub use words::count_words;
