//! Reader and extractor for mission-asset bank archives.
//!
//! The archive is a flat entry table (null-terminated name plus five
//! little-endian `u32` fields per entry, closed by an empty name), an opaque
//! properties block closed by `00 00`, and the payloads concatenated in table
//! order.  Only stored entries (`packing_method == 0`) are materialized;
//! anything else is reported so the caller can defer to an external tool.

pub mod entry;
pub mod table;
pub mod sanitize;
pub mod progress;
pub mod extract;

pub use entry::{EntryDescriptor, PackingMethod};
pub use table::{parse, parse_file, ArchiveTable, ParseError, TableReader};
pub use sanitize::{sanitize_entry_path, PathError, SanitizedPath};
pub use progress::Progress;
pub use extract::{
    extract, extract_with_options, DuplicatePolicy, ExtractError, ExtractOptions, ExtractReport,
    Extractor, FaultKind, SizePolicy,
};
