//! Database access: schema, table handles, cursor and bulk writer

pub mod bulk;
pub mod cursor;
pub mod init;
pub mod metadata_table;
pub mod monitor;
pub mod reading_table;
pub mod registry;
pub mod schema;

pub use bulk::{BulkWriteReport, BulkWriter};
pub use cursor::ReadingCursor;
pub use init::Database;
pub use metadata_table::MetadataStore;
pub use reading_table::ReadingStore;
pub use registry::{Registry, Tables};
