//! Entry-table reader.
//!
//! An archive starts with a run of `(name, 20-byte header)` records closed by
//! a sentinel record whose name is empty.  The sentinel's header fields are
//! never read.  A properties block follows, closed by two consecutive null
//! bytes, and then the concatenated payloads in table order.
//!
//! [`TableReader`] consumes exactly the table and the properties block, so
//! that once [`TableReader::read_table`] returns the inner stream sits on the
//! first payload byte.  [`TableReader::into_inner`] hands that stream back to
//! the caller.
//!
//! # Name decoding
//! Names are meant to be ASCII.  Decoding never fails: bytes `0x01..=0x7F`
//! map to the same character and every byte `>= 0x80` maps to U+FFFD.  Only
//! the null terminator is structurally significant.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::entry::{EntryDescriptor, ENTRY_HEADER_SIZE};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("truncated archive: end of stream inside entry name starting at offset {offset}")]
    TruncatedName { offset: u64 },
    #[error("truncated archive: header of entry '{name}' at offset {offset} is shorter than 20 bytes")]
    TruncatedHeader { name: String, offset: u64 },
    #[error("truncated archive: properties block starting at offset {offset} has no terminator")]
    TruncatedProperties { offset: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── ArchiveTable ─────────────────────────────────────────────────────────────

/// The parsed entry table of one archive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveTable {
    pub entries:     Vec<EntryDescriptor>,
    /// Raw properties block, terminator included.  Never interpreted.
    #[serde(skip)]
    pub properties:  Vec<u8>,
    /// Absolute offset of the first payload byte.
    pub data_offset: u64,
}

impl ArchiveTable {
    pub fn entries(&self) -> &[EntryDescriptor] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn properties(&self) -> &[u8] { &self.properties }

    pub fn data_offset(&self) -> u64 { self.data_offset }

    /// Sum of `data_size` over every entry.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.data_size as u64).sum()
    }

    /// Entries this crate cannot materialize (nonzero packing method).
    pub fn packed_entries(&self) -> impl Iterator<Item = &EntryDescriptor> {
        self.entries.iter().filter(|e| !e.is_stored())
    }

    pub fn is_fully_stored(&self) -> bool {
        self.packed_entries().next().is_none()
    }
}

// ── TableReader ──────────────────────────────────────────────────────────────

pub struct TableReader<R: Read> {
    reader: R,
    offset: u64,
}

impl<R: Read> TableReader<R> {
    /// `reader` must be positioned at offset 0 of the archive.
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 { self.offset }

    pub fn into_inner(self) -> R { self.reader }

    /// Parse the entry table and skip the properties block.
    pub fn read_table(&mut self) -> Result<ArchiveTable, ParseError> {
        let mut entries = Vec::new();
        loop {
            let name = self.read_name()?;
            if name.is_empty() {
                break;
            }
            let entry = self.read_header(name)?;
            log::debug!(
                "table entry '{}' packing={} data_size={}",
                entry.name, entry.packing(), entry.data_size
            );
            entries.push(entry);
        }
        let properties = self.read_properties()?;
        Ok(ArchiveTable { entries, properties, data_offset: self.offset })
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// `Ok(None)` at end of stream.
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0)  => return Ok(None),
                Ok(_)  => {
                    self.offset += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn read_name(&mut self) -> Result<String, ParseError> {
        let start = self.offset;
        let mut raw = Vec::new();
        loop {
            match self.read_byte()? {
                Some(0)    => return Ok(decode_name(&raw)),
                Some(byte) => raw.push(byte),
                None       => return Err(ParseError::TruncatedName { offset: start }),
            }
        }
    }

    fn read_header(&mut self, name: String) -> Result<EntryDescriptor, ParseError> {
        let start = self.offset;
        let mut fields = [0u8; ENTRY_HEADER_SIZE];
        match self.reader.read_exact(&mut fields) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ParseError::TruncatedHeader { name, offset: start });
            }
            Err(e) => return Err(e.into()),
        }
        self.offset += ENTRY_HEADER_SIZE as u64;
        Ok(EntryDescriptor::read_fields(name, &fields[..])?)
    }

    fn read_properties(&mut self) -> Result<Vec<u8>, ParseError> {
        let start = self.offset;
        let mut props = Vec::new();
        while !props.ends_with(&[0, 0]) {
            match self.read_byte()? {
                Some(byte) => props.push(byte),
                None       => return Err(ParseError::TruncatedProperties { offset: start }),
            }
        }
        Ok(props)
    }
}

/// Parse the table from a stream positioned at the start of an archive.
pub fn parse<R: Read>(reader: R) -> Result<ArchiveTable, ParseError> {
    TableReader::new(reader).read_table()
}

/// Open `path` and parse its table.
pub fn parse_file(path: &Path) -> Result<ArchiveTable, ParseError> {
    parse(BufReader::new(File::open(path)?))
}

/// Lossy ASCII decode: non-ASCII bytes become U+FFFD, one per byte.
pub fn decode_name(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect()
}
