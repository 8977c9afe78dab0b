//! Program container format: a packed header followed by three sections
//! (§3, §4.1).

use crate::consts::{HEADER_SIZE, PROGRAM_MAGIC};
use crate::error::VerifyError;

/// The packed header prefixing every program container.
///
/// Field order matches the wire format exactly: `magic`, `version`,
/// `flags`, `data_len`, `rodata_len`, `text_len`, `functions_count`, each a
/// little-endian `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    magic: u32,
    version: u32,
    flags: u32,
    data_len: u32,
    rodata_len: u32,
    text_len: u32,
    functions_count: u32,
}

impl Header {
    fn parse(buf: &[u8]) -> Result<Self, VerifyError> {
        if buf.len() < HEADER_SIZE {
            return Err(VerifyError::IllegalLen);
        }
        let word = |i: usize| -> u32 {
            let o = i * 4;
            u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
        };
        let header = Header {
            magic: word(0),
            version: word(1),
            flags: word(2),
            data_len: word(3),
            rodata_len: word(4),
            text_len: word(5),
            functions_count: word(6),
        };
        if header.magic != PROGRAM_MAGIC {
            return Err(VerifyError::IllegalLen);
        }
        Ok(header)
    }

    /// Container format version.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Header flag bits (e.g. `NO_RETURN`).
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Length in bytes of the mutable `data` section.
    pub const fn data_len(&self) -> u32 {
        self.data_len
    }

    /// Length in bytes of the read-only `rodata` section.
    pub const fn rodata_len(&self) -> u32 {
        self.rodata_len
    }

    /// Length in bytes of the `text` (instruction) section.
    pub const fn text_len(&self) -> u32 {
        self.text_len
    }

    /// Number of callable entry points recorded in the header.
    pub const fn functions_count(&self) -> u32 {
        self.functions_count
    }
}

/// Header flag bit requesting that the verifier not require a trailing
/// `EXIT` instruction.
pub const FLAG_NO_RETURN: u32 = 0x0100;

/// A parsed program: the header plus borrowed views into its three
/// sections, all backed by the caller's original byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct Program<'a> {
    header: Header,
    data: &'a [u8],
    rodata: &'a [u8],
    text: &'a [u8],
}

impl<'a> Program<'a> {
    /// Parse `blob` into a header and its three sections.
    ///
    /// Fails if the magic number does not match, the blob is shorter than
    /// the header claims, or any section length overflows `usize` on this
    /// platform.
    pub fn parse(blob: &'a [u8]) -> Result<Self, VerifyError> {
        let header = Header::parse(blob)?;

        let data_len = header.data_len as usize;
        let rodata_len = header.rodata_len as usize;
        let text_len = header.text_len as usize;

        let data_start = HEADER_SIZE;
        let rodata_start = data_start + data_len;
        let text_start = rodata_start + rodata_len;
        let text_end = text_start + text_len;

        if blob.len() < text_end {
            return Err(VerifyError::IllegalLen);
        }

        Ok(Self {
            header,
            data: &blob[data_start..rodata_start],
            rodata: &blob[rodata_start..text_start],
            text: &blob[text_start..text_end],
        })
    }

    /// The parsed header.
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// The mutable `data` section, as it existed in the container blob.
    ///
    /// Callers that intend to execute this program must copy this into
    /// their own writable buffer; the interpreter never mutates the
    /// original container bytes.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The read-only `rodata` section.
    pub const fn rodata(&self) -> &'a [u8] {
        self.rodata
    }

    /// The `text` (instruction) section.
    pub const fn text(&self) -> &'a [u8] {
        self.text
    }
}
