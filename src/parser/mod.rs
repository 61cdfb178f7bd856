//! Identifier extraction from bibliographic exports.
//!
//! # Current Support
//!
//! - Web of Science plain-text exports (`*.txt`, tagged records ending in `ER`)
//! - DOI validation against `10.<registrant>/<suffix>`
//! - Archive-wide coverage checks with per-file missing records and duplicates
//!
//! # Example
//!
//! ```
//! use doihive_core::parser::dois_from_text;
//!
//! let dois = dois_from_text("PT J\nDI 10.1000/xyz123\nER\n\nEF\n");
//! assert_eq!(dois, ["10.1000/xyz123"]);
//! ```

mod archive;
mod error;
mod wos;

pub use archive::{
    ArchiveCheck, FileCheck, MissingRecord, archive_files, check_archive, extract_archive_dois,
    read_archive_text,
};
pub use error::ArchiveError;
pub use wos::{doi_from_record, dois_from_text, is_valid_doi, parse_wos_records};
