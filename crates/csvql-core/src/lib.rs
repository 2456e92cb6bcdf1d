pub mod error;
pub mod metadata;
pub mod source;

pub use error::{Error, Result};
pub use metadata::{FileMetadata, MetadataColumn};
pub use source::{CsvRowSource, MemoryRowSource, RowSource};
