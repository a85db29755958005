use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read};

use crate::error::{Result, XarError};
use crate::hash::HashKind;

/// XAR magic number: "xar!" (0x78617221)
pub const XAR_MAGIC: u32 = 0x78617221;
/// Size of the fixed header fields
pub const XAR_HEADER_SIZE: u16 = 28;
/// Highest format version understood
pub const XAR_VERSION_MAX: u16 = 1;
/// Smallest plausible uncompressed TOC
pub const TOC_MIN_SIZE: u64 = 16;
/// Upper bound for both the compressed and uncompressed TOC
pub const TOC_MAX_SIZE: u64 = 4 * 1024 * 1024;

/// XAR archive header (28 bytes, big-endian)
#[derive(Debug, Clone)]
pub struct XarHeader {
    pub magic: u32,
    pub header_size: u16,
    pub version: u16,
    pub toc_compressed_len: u64,
    pub toc_uncompressed_len: u64,
    pub hash_kind: HashKind,
}

/// Parse and validate the XAR header, skipping any padding after it.
pub fn parse_header<R: Read>(reader: &mut R) -> Result<XarHeader> {
    let magic = reader.read_u32::<BigEndian>()?;
    let header_size = reader.read_u16::<BigEndian>()?;
    let version = reader.read_u16::<BigEndian>()?;
    let toc_compressed_len = reader.read_u64::<BigEndian>()?;
    let toc_uncompressed_len = reader.read_u64::<BigEndian>()?;
    let hash_id = reader.read_u32::<BigEndian>()?;

    if magic != XAR_MAGIC {
        return Err(XarError::BadMagic(magic));
    }
    if header_size < XAR_HEADER_SIZE {
        return Err(XarError::BadHeaderSize(header_size));
    }
    if version > XAR_VERSION_MAX {
        return Err(XarError::UnsupportedVersion(version));
    }
    if toc_uncompressed_len < TOC_MIN_SIZE {
        return Err(XarError::TocTooSmall(toc_uncompressed_len));
    }
    if toc_uncompressed_len > TOC_MAX_SIZE {
        return Err(XarError::TocTooBig(toc_uncompressed_len));
    }
    if toc_compressed_len > TOC_MAX_SIZE {
        return Err(XarError::TocTooBigCompressed(toc_compressed_len));
    }
    let hash_kind =
        HashKind::from_header_id(hash_id).ok_or(XarError::UnsupportedHashFunction(hash_id))?;

    // Skip any extra header bytes beyond the 28 we read
    let extra = u64::from(header_size - XAR_HEADER_SIZE);
    if extra > 0 {
        let skipped = io::copy(&mut reader.by_ref().take(extra), &mut io::sink())?;
        if skipped != extra {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
    }

    Ok(XarHeader {
        magic,
        header_size,
        version,
        toc_compressed_len,
        toc_uncompressed_len,
        hash_kind,
    })
}

/// Check whether a reader starts with the XAR magic.
/// Consumes four bytes; returns `false` on a short read.
pub fn is_xar<R: Read>(reader: &mut R) -> Result<bool> {
    match reader.read_u32::<BigEndian>() {
        Ok(magic) => Ok(magic == XAR_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
