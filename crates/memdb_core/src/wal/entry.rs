//! Persisted WAL entry format.
//!
//! Each committed change is stored as one entry:
//!
//! ```text
//! | magic "MDBW" (4) | version u16 | flags u8 | sequence u64 | batch u64 |
//! | table_len u16 | table | key_len u32 | key | payload_len u32 | payload |
//! | crc32 (4) |
//! ```
//!
//! Integers are little-endian. `payload_len` and `payload` are present only
//! when the tombstone flag is clear. The CRC covers every preceding byte.

use crate::error::{CoreError, CoreResult};
use crate::schema::{DBSchema, Record, TableSchema};
use crate::transaction::Change;
use crate::types::{IndexKey, SequenceNumber};
use std::sync::Arc;

/// Magic bytes at the start of every entry.
pub const ENTRY_MAGIC: [u8; 4] = *b"MDBW";

/// Current entry format version.
pub const ENTRY_VERSION: u16 = 1;

/// File name suffix of entries.
pub const ENTRY_SUFFIX: &str = ".wal";

/// Width of the zero-padded sequence number in entry names.
const NAME_DIGITS: usize = 20;

const FLAG_TOMBSTONE: u8 = 0b01;
const FLAG_LAST_IN_BATCH: u8 = 0b10;

/// magic (4) + version (2) + flags (1) + sequence (8) + batch (8)
const HEADER_SIZE: usize = 23;
const CRC_SIZE: usize = 4;

/// Position of an entry in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Sequence number of this entry.
    pub sequence: SequenceNumber,
    /// Sequence number of the first entry of the commit batch.
    pub batch: SequenceNumber,
    /// True on the final entry of the batch.
    pub last_in_batch: bool,
}

/// The durable form of one [`Change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntry {
    /// Table name.
    pub table: String,
    /// Primary key bytes.
    pub primary_key: Vec<u8>,
    /// Encoded record, `None` for a tombstone.
    pub payload: Option<Vec<u8>>,
}

impl PersistedEntry {
    /// Encodes a change with its table's codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded.
    pub fn from_change<R: Record>(change: &Change<R>, table: &TableSchema<R>) -> CoreResult<Self> {
        let payload = match change.record() {
            Some(record) => Some(table.codec().encode(record)?),
            None => None,
        };
        Ok(Self {
            table: change.table().to_string(),
            primary_key: change.primary_key().as_bytes().to_vec(),
            payload,
        })
    }

    /// Decodes the payload with the schema and rebuilds the change.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown or the payload does not
    /// decode.
    pub fn into_change<R: Record>(self, schema: &DBSchema<R>) -> CoreResult<Change<R>> {
        let table = schema
            .table(&self.table)
            .ok_or_else(|| CoreError::unknown_table(&self.table))?;
        let primary_key = IndexKey::from(self.primary_key);
        Ok(match self.payload {
            Some(payload) => {
                let record = table.codec().decode(&payload)?;
                Change::insert(self.table, primary_key, Arc::new(record))
            }
            None => Change::delete(self.table, primary_key),
        })
    }

    /// Returns true if this entry deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Serializes the entry with its header and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name, key or payload exceeds its length
    /// field.
    pub fn encode(&self, header: EntryHeader) -> CoreResult<Vec<u8>> {
        let table_len = u16::try_from(self.table.len())
            .map_err(|_| CoreError::invalid_operation("table name too long for WAL entry"))?;
        let key_len = u32::try_from(self.primary_key.len())
            .map_err(|_| CoreError::invalid_operation("primary key too large for WAL entry"))?;

        let payload_size = self.payload.as_ref().map_or(0, |p| 4 + p.len());
        let mut data = Vec::with_capacity(
            HEADER_SIZE + 2 + self.table.len() + 4 + self.primary_key.len() + payload_size + CRC_SIZE,
        );

        let mut flags = 0;
        if self.is_tombstone() {
            flags |= FLAG_TOMBSTONE;
        }
        if header.last_in_batch {
            flags |= FLAG_LAST_IN_BATCH;
        }

        data.extend_from_slice(&ENTRY_MAGIC);
        data.extend_from_slice(&ENTRY_VERSION.to_le_bytes());
        data.push(flags);
        data.extend_from_slice(&header.sequence.as_u64().to_le_bytes());
        data.extend_from_slice(&header.batch.as_u64().to_le_bytes());

        data.extend_from_slice(&table_len.to_le_bytes());
        data.extend_from_slice(self.table.as_bytes());
        data.extend_from_slice(&key_len.to_le_bytes());
        data.extend_from_slice(&self.primary_key);

        if let Some(payload) = &self.payload {
            let payload_len = u32::try_from(payload.len())
                .map_err(|_| CoreError::invalid_operation("record too large for WAL entry"))?;
            data.extend_from_slice(&payload_len.to_le_bytes());
            data.extend_from_slice(payload);
        }

        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Parses and verifies an entry.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` if the CRC does not match and
    /// `WalCorruption` for any other malformation.
    pub fn decode(data: &[u8]) -> CoreResult<(EntryHeader, Self)> {
        if data.len() < HEADER_SIZE + CRC_SIZE {
            return Err(CoreError::wal_corruption(format!(
                "entry too short: {} bytes",
                data.len()
            )));
        }

        let (body, crc_bytes) = data.split_at(data.len() - CRC_SIZE);
        let mut expected = [0u8; CRC_SIZE];
        expected.copy_from_slice(crc_bytes);
        let expected = u32::from_le_bytes(expected);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let mut reader = Reader::new(body);
        if reader.take(4)? != ENTRY_MAGIC {
            return Err(CoreError::wal_corruption("invalid entry magic"));
        }
        let version = reader.u16()?;
        if version != ENTRY_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported entry version {version}"
            )));
        }
        let flags = reader.u8()?;
        if flags & !(FLAG_TOMBSTONE | FLAG_LAST_IN_BATCH) != 0 {
            return Err(CoreError::wal_corruption(format!(
                "unknown entry flags {flags:#04x}"
            )));
        }
        let header = EntryHeader {
            sequence: SequenceNumber::new(reader.u64()?),
            batch: SequenceNumber::new(reader.u64()?),
            last_in_batch: flags & FLAG_LAST_IN_BATCH != 0,
        };
        if header.batch > header.sequence {
            return Err(CoreError::wal_corruption(format!(
                "batch {} starts after entry {}",
                header.batch, header.sequence
            )));
        }

        let table_len = usize::from(reader.u16()?);
        let table = std::str::from_utf8(reader.take(table_len)?)
            .map_err(|_| CoreError::wal_corruption("table name is not UTF-8"))?
            .to_string();
        let key_len = reader.len_u32()?;
        let primary_key = reader.take(key_len)?.to_vec();

        let payload = if flags & FLAG_TOMBSTONE == 0 {
            let payload_len = reader.len_u32()?;
            Some(reader.take(payload_len)?.to_vec())
        } else {
            None
        };

        if !reader.is_at_end() {
            return Err(CoreError::wal_corruption("trailing bytes after entry"));
        }

        Ok((
            header,
            Self {
                table,
                primary_key,
                payload,
            },
        ))
    }
}

/// Returns the storage name of the entry with this sequence number.
///
/// Names are fixed width so lexicographic order is sequence order.
#[must_use]
pub fn entry_name(sequence: SequenceNumber) -> String {
    format!("{:0width$}{}", sequence.as_u64(), ENTRY_SUFFIX, width = NAME_DIGITS)
}

/// Parses an entry name back to its sequence number.
#[must_use]
pub fn parse_entry_name(name: &str) -> Option<SequenceNumber> {
    let digits = name.strip_suffix(ENTRY_SUFFIX)?;
    if digits.len() != NAME_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(SequenceNumber::new)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CoreError::wal_corruption("unexpected end of entry"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> CoreResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn len_u32(&mut self) -> CoreResult<usize> {
        let len = u32::from_le_bytes(self.array()?);
        usize::try_from(len).map_err(|_| CoreError::wal_corruption("length does not fit in memory"))
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}
