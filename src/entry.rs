//! Entry descriptors: the fixed-size header that follows every name in the
//! archive's entry table.
//!
//! # Layout
//! Each descriptor is five little-endian `u32` fields, 20 bytes in total,
//! written immediately after the entry's null-terminated name:
//!
//! | Field            | Meaning                                       |
//! |------------------|-----------------------------------------------|
//! | `packing_method` | `0` = stored verbatim, anything else = encoded |
//! | `original_size`  | decoded payload size                          |
//! | `reserved`       | unused                                        |
//! | `timestamp`      | unused by extraction                          |
//! | `data_size`      | payload bytes physically present              |

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read};

/// Size of the fixed fields following each entry name.
pub const ENTRY_HEADER_SIZE: usize = 20;

/// `packing_method` value of a stored (uncompressed) entry.
pub const PACKING_STORED:     u32 = 0x0000_0000;
/// "Cprs": LZSS-compressed payload.
pub const PACKING_COMPRESSED: u32 = 0x4370_7273;
/// "Encr": encrypted payload.
pub const PACKING_ENCRYPTED:  u32 = 0x456e_6372;
/// "Vers": version/header marker entry.
pub const PACKING_VERSION:    u32 = 0x5665_7273;

// ── PackingMethod ────────────────────────────────────────────────────────────

/// Display classification of a raw `packing_method` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingMethod {
    Stored,
    Compressed,
    Encrypted,
    Version,
    Unknown(u32),
}

impl From<u32> for PackingMethod {
    fn from(code: u32) -> Self {
        match code {
            PACKING_STORED     => PackingMethod::Stored,
            PACKING_COMPRESSED => PackingMethod::Compressed,
            PACKING_ENCRYPTED  => PackingMethod::Encrypted,
            PACKING_VERSION    => PackingMethod::Version,
            other              => PackingMethod::Unknown(other),
        }
    }
}

impl PackingMethod {
    pub fn name(self) -> &'static str {
        match self {
            PackingMethod::Stored     => "stored",
            PackingMethod::Compressed => "compressed",
            PackingMethod::Encrypted  => "encrypted",
            PackingMethod::Version    => "version",
            PackingMethod::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for PackingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackingMethod::Unknown(code) => write!(f, "unknown ({code:#010x})"),
            other                        => f.write_str(other.name()),
        }
    }
}

// ── EntryDescriptor ──────────────────────────────────────────────────────────

/// One archived file, as described by the entry table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryDescriptor {
    /// Archive-internal path with `\` separators.
    pub name:           String,
    pub packing_method: u32,
    pub original_size:  u32,
    pub reserved:       u32,
    pub timestamp:      u32,
    pub data_size:      u32,
}

impl EntryDescriptor {
    /// Read the 20 fixed bytes that follow `name` in the table.
    pub fn read_fields<R: Read>(name: String, mut reader: R) -> io::Result<Self> {
        Ok(Self {
            name,
            packing_method: reader.read_u32::<LittleEndian>()?,
            original_size:  reader.read_u32::<LittleEndian>()?,
            reserved:       reader.read_u32::<LittleEndian>()?,
            timestamp:      reader.read_u32::<LittleEndian>()?,
            data_size:      reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn packing(&self) -> PackingMethod {
        PackingMethod::from(self.packing_method)
    }

    #[inline]
    pub fn is_stored(&self) -> bool {
        self.packing_method == PACKING_STORED
    }
}
