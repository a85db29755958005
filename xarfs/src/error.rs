use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::hash::HashKind;

/// Broad classification of a [`XarError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed header, TOC or data element. Fatal to the whole stream.
    Format,
    /// Digest mismatch or unconsumed/truncated entry data.
    Integrity,
    /// Valid archive using a feature this reader does not handle.
    Unsupported,
    /// Caller misuse: out-of-order reads, backwards access on forward input.
    Usage,
    /// Error reported by the underlying input.
    Io,
}

#[derive(Error, Debug, Clone)]
pub enum XarError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("invalid XAR magic: 0x{0:08X} (expected 0x78617221)")]
    BadMagic(u32),

    #[error("XAR header size {0} is smaller than the 28 byte header")]
    BadHeaderSize(u16),

    #[error("unsupported XAR version {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported XAR hash function {0}")]
    UnsupportedHashFunction(u32),

    #[error("TOC too small: {0} bytes")]
    TocTooSmall(u64),

    #[error("TOC too big: {0} bytes")]
    TocTooBig(u64),

    #[error("compressed TOC too big: {0} bytes")]
    TocTooBigCompressed(u64),

    #[error("TOC decompression failed: {0}")]
    TocDecompressionFailed(String),

    #[error("TOC size mismatch: header says {expected} bytes, inflated {actual}")]
    TocSizeMismatch { expected: u64, actual: u64 },

    #[error("TOC XML parse error: {0}")]
    TocXmlParseError(String),

    #[error("no <toc> element under <xar>")]
    TocElementMissing,

    #[error("<toc> element has sibling elements")]
    TocElementHasSiblings,

    #[error("bad TOC checksum element: {0}")]
    BadChecksumElement(String),

    #[error("hash function mismatch: header uses {header:?}, TOC checksum uses {toc:?}")]
    HashFunctionMismatch { header: HashKind, toc: HashKind },

    #[error("TOC digest mismatch")]
    TocDigestMismatch,

    #[error("input is not seekable")]
    NotStreamable,

    #[error("missing <name> element")]
    MissingNameElement,

    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("missing <type> element")]
    MissingTypeElement,

    #[error("unknown file type: {0:?}")]
    UnknownFileType(String),

    #[error("missing <data> element")]
    MissingDataElement,

    #[error("missing <offset> element")]
    MissingOffsetElement,

    #[error("bad <offset> element: {0:?}")]
    BadOffsetElement(String),

    #[error("missing <size> element")]
    MissingSizeElement,

    #[error("bad <size> element: {0:?}")]
    BadSizeElement(String),

    #[error("missing <length> element")]
    MissingLengthElement,

    #[error("bad <length> element: {0:?}")]
    BadLengthElement(String),

    #[error("missing <encoding> element")]
    MissingEncodingElement,

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unsupported checksum style: {0:?}")]
    UnsupportedChecksumStyle(String),

    #[error("bad {kind:?} digest: {value:?}")]
    BadDigest { kind: HashKind, value: String },

    #[error("bad <{element}> element: {value:?}")]
    BadMetadataElement { element: &'static str, value: String },

    #[error("stored entry has archived size {archived} but extracted size {extracted}")]
    ArchivedExtractedSizeMismatch { archived: u64, extracted: u64 },

    #[error("archived data digest mismatch")]
    ArchivedHashMismatch,

    #[error("extracted data digest mismatch")]
    ExtractedHashMismatch,

    #[error("extracted data exceeds the declared size of {0} bytes")]
    ExtractedSizeExceeded(u64),

    #[error("decompressor finished before all archived data was consumed")]
    UnusedArchivedData,

    #[error("end of file")]
    Eof,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("file not found: {0}")]
    FileNotFound(String),
}

impl XarError {
    pub fn kind(&self) -> ErrorKind {
        use XarError::*;
        match self {
            Io(_) => ErrorKind::Io,
            ArchivedHashMismatch | ExtractedHashMismatch | ExtractedSizeExceeded(_)
            | UnusedArchivedData | TocDigestMismatch => ErrorKind::Integrity,
            UnsupportedVersion(_) | UnsupportedHashFunction(_) | UnsupportedEncoding(_)
            | UnsupportedChecksumStyle(_) | UnknownFileType(_) | NotImplemented(_) => {
                ErrorKind::Unsupported
            }
            NotStreamable | InvalidParameter(_) | Eof | FileNotFound(_) => ErrorKind::Usage,
            _ => ErrorKind::Format,
        }
    }
}

impl From<io::Error> for XarError {
    fn from(err: io::Error) -> Self {
        // Errors raised by our own streams travel through flate2 wrapped in
        // an io::Error; hand them back unchanged.
        if !err.get_ref().is_some_and(|inner| inner.is::<XarError>()) {
            return XarError::Io(Arc::new(err));
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<XarError>()) {
            Some(Ok(xar)) => *xar,
            _ => XarError::Io(Arc::new(io::Error::from(kind))),
        }
    }
}

impl From<XarError> for io::Error {
    fn from(err: XarError) -> Self {
        match err {
            XarError::Io(inner) => io::Error::new(inner.kind(), inner),
            XarError::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, XarError::Eof),
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, XarError>;
