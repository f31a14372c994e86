/// Journal data model, record assembly and listing filters
pub mod assemble;
mod filter;
mod types;

pub use filter::JournalFilter;
pub use types::*;
