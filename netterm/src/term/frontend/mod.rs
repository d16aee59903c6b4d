
pub mod raw;

pub use raw::RawTerminal;
