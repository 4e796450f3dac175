//! Output formatters for runs and stored duplicate groups.
//!
//! - JSON for automation and scripting
//! - CSV for spreadsheet import
//! - Plain text for terminals
//!
//! # Example
//!
//! ```no_run
//! use dupfinder::duplicates::group_by_full_hash;
//! use dupfinder::output::TextOutput;
//! use dupfinder::store::{RecordStore, SqliteStore};
//! use std::path::Path;
//!
//! let store = SqliteStore::open(Path::new("file_hashes.db")).unwrap();
//! let records = store.all_records().unwrap();
//! let groups = group_by_full_hash(&records);
//! print!("{}", TextOutput::from_groups(&groups).render());
//! ```

pub mod csv;
pub mod json;
pub mod text;

pub use self::csv::CsvOutput;
pub use json::JsonOutput;
pub use text::TextOutput;
