//! The filesystem stream: walks the TOC and hands out one entry at a time.

use log::{debug, trace, warn};
use std::cell::RefCell;
use std::io::{self, Read, Seek};
use std::rc::Rc;

use crate::data::{Encoding, MAX_DATA_VALUE, parse_data_element};
use crate::decomp::XarDecompStream;
use crate::error::{Result, XarError};
use crate::hash::HashKind;
use crate::header::{XarHeader, parse_header};
use crate::input::{HostInput, SharedInput};
use crate::object::{EntryKind, ObjInfo, VfsObject, XarBaseObject, XarSymlink};
use crate::stream::{HashState, XarFile, XarIoStream};
use crate::toc::{NodeId, TocDocument, read_toc};
use crate::walker::{TocWalker, full_path, validate_name};

/// Archive-level facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub version: u16,
    pub hash_kind: HashKind,
    pub toc_compressed_len: u64,
    pub toc_uncompressed_len: u64,
    /// Digest of the compressed TOC bytes (empty when the hash is none)
    pub toc_digest: Vec<u8>,
    /// Absolute offset of the first heap byte in the host input
    pub data_offset: u64,
}

/// An entry returned by [`XarFsStream::next_entry`]
pub struct XarEntry {
    /// Slash separated path from the archive root
    pub path: String,
    pub kind: EntryKind,
    pub object: XarObject,
}

impl XarEntry {
    pub fn query_info(&self) -> Result<ObjInfo> {
        self.object.query_info()
    }
}

impl Read for XarEntry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.object.read(buf)
    }
}

/// Concrete object behind an entry
pub enum XarObject {
    Directory(XarBaseObject),
    Symlink(XarSymlink),
    /// Stored data on a seekable input
    File(XarFile),
    /// Stored data on a forward-only input
    IoStream(XarIoStream),
    /// Gzip or zlib compressed data
    Decompressed(XarDecompStream),
}

impl XarObject {
    pub fn kind(&self) -> EntryKind {
        match self {
            XarObject::Directory(obj) => obj.kind(),
            XarObject::Symlink(obj) => obj.kind(),
            XarObject::File(obj) => obj.kind(),
            XarObject::IoStream(obj) => obj.kind(),
            XarObject::Decompressed(obj) => obj.kind(),
        }
    }

    pub fn query_info(&self) -> Result<ObjInfo> {
        match self {
            XarObject::Directory(obj) => obj.query_info(),
            XarObject::Symlink(obj) => obj.query_info(),
            XarObject::File(obj) => obj.query_info(),
            XarObject::IoStream(obj) => obj.query_info(),
            XarObject::Decompressed(obj) => obj.query_info(),
        }
    }

    /// Digest progress of data entries; `None` for directories and symlinks
    pub fn hash_state(&self) -> Option<HashState> {
        match self {
            XarObject::Directory(_) | XarObject::Symlink(_) => None,
            XarObject::File(obj) => Some(obj.hash_state()),
            XarObject::IoStream(obj) => Some(obj.hash_state()),
            XarObject::Decompressed(obj) => Some(obj.hash_state()),
        }
    }

    /// Read the remaining data and fail unless every digest was verified.
    /// Seekable files are rewound first.
    pub fn read_to_end_verified(&mut self) -> Result<Vec<u8>> {
        if let XarObject::File(file) = self {
            file.seek_to(io::SeekFrom::Start(0))?;
        }
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        match self.hash_state() {
            Some(HashState::Ok) => Ok(out),
            Some(state) => {
                state.check()?;
                Err(XarError::InvalidParameter(
                    "entry was not read from the start, digests not verified".into(),
                ))
            }
            None => Err(XarError::InvalidParameter("entry has no data".into())),
        }
    }
}

impl Read for XarObject {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            XarObject::File(obj) => obj.read(buf),
            XarObject::IoStream(obj) => obj.read(buf),
            XarObject::Decompressed(obj) => obj.read(buf),
            XarObject::Directory(_) | XarObject::Symlink(_) => {
                Err(XarError::InvalidParameter("entry has no data".into()).into())
            }
        }
    }
}

/// Read-only filesystem stream over a XAR archive.
///
/// Entries come out in TOC pre-order. A format error while producing an
/// entry is fatal: it is returned by that call and every later one.
pub struct XarFsStream {
    input: SharedInput,
    header: XarHeader,
    toc: Rc<TocDocument>,
    toc_digest: Vec<u8>,
    /// Archive start in the host input plus the end of the TOC
    data_base: u64,
    walker: TocWalker,
    fatal: Option<XarError>,
}

impl XarFsStream {
    /// Open an archive on a forward-only input. Entries are handed out as
    /// streams and must be read before the next entry is requested.
    pub fn open<R: Read + 'static>(reader: R) -> Result<Self> {
        Self::open_input(HostInput::forward(reader))
    }

    /// Open an archive on a seekable input positioned at the archive start.
    /// Stored entries can be read in any order and seeked.
    pub fn open_seekable<R: Read + Seek + 'static>(reader: R) -> Result<Self> {
        Self::open_input(HostInput::seekable(reader))
    }

    fn open_input(mut input: HostInput) -> Result<Self> {
        let start = input.position()?;
        let header = parse_header(&mut input)?;
        debug!(
            "xar: header v{} size {} toc {}/{} hash {:?}",
            header.version,
            header.header_size,
            header.toc_compressed_len,
            header.toc_uncompressed_len,
            header.hash_kind
        );
        let (toc, toc_digest) = read_toc(&mut input, &header)?;
        let data_base = start + u64::from(header.header_size) + header.toc_compressed_len;

        let fss = XarFsStream {
            input: Rc::new(RefCell::new(input)),
            header,
            toc: Rc::new(toc),
            toc_digest,
            data_base,
            walker: TocWalker::new(),
            fatal: None,
        };
        fss.verify_toc_checksum()?;
        Ok(fss)
    }

    /// Compare the digest stored in the heap with the one computed over the
    /// compressed TOC.
    fn verify_toc_checksum(&self) -> Result<()> {
        let doc = &*self.toc;
        let hash = self.header.hash_kind;
        let Some(checksum) = doc.child(doc.toc(), "checksum") else {
            if hash == HashKind::None {
                return Ok(());
            }
            return Err(XarError::BadChecksumElement("missing <checksum> element".into()));
        };

        let style = doc.attr(checksum, "style").unwrap_or_default();
        let toc_kind = HashKind::from_style(style)
            .ok_or_else(|| XarError::UnsupportedChecksumStyle(style.to_string()))?;
        if toc_kind != hash {
            return Err(XarError::HashFunctionMismatch { header: hash, toc: toc_kind });
        }
        if hash == HashKind::None {
            return Ok(());
        }

        let value = |name: &str| -> Result<u64> {
            let text = doc
                .child_text(checksum, name)
                .ok_or_else(|| XarError::BadChecksumElement(format!("missing <{name}>")))?;
            text.trim()
                .parse::<u64>()
                .map_err(|_| XarError::BadChecksumElement(format!("bad <{name}>: {text:?}")))
        };
        let offset = value("offset")?;
        if offset >= MAX_DATA_VALUE {
            return Err(XarError::BadChecksumElement(format!("offset {offset} out of range")));
        }
        let size = value("size")?;
        if size != hash.digest_len() as u64 {
            return Err(XarError::BadChecksumElement(format!(
                "size {size} does not match the {} digest length",
                hash.style()
            )));
        }

        let mut input = self.input.borrow_mut();
        if offset != 0 && !input.is_seekable() {
            return Err(XarError::NotStreamable);
        }
        let mut stored = vec![0u8; size as usize];
        input.read_exact_at(self.data_base + offset, &mut stored)?;
        if stored != self.toc_digest {
            return Err(XarError::TocDigestMismatch);
        }
        debug!("xar: TOC {} digest verified", hash.style());
        Ok(())
    }

    pub fn header(&self) -> &XarHeader {
        &self.header
    }

    pub fn toc(&self) -> &TocDocument {
        &self.toc
    }

    pub fn query_info(&self) -> ArchiveInfo {
        ArchiveInfo {
            version: self.header.version,
            hash_kind: self.header.hash_kind,
            toc_compressed_len: self.header.toc_compressed_len,
            toc_uncompressed_len: self.header.toc_uncompressed_len,
            toc_digest: self.toc_digest.clone(),
            data_offset: self.data_base,
        }
    }

    /// Produce the next entry, or `Ok(None)` at the end of the archive.
    pub fn next_entry(&mut self) -> Result<Option<XarEntry>> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }
        self.advance().inspect_err(|err| {
            warn!("xar: stream failed: {err}");
            self.fatal = Some(err.clone());
        })
    }

    /// Walk entries until one with the given path shows up.
    pub fn find_file(&mut self, path: &str) -> Result<XarEntry> {
        let path = path.trim_matches('/');
        while let Some(entry) = self.next_entry()? {
            if entry.path == path {
                return Ok(entry);
            }
        }
        Err(XarError::FileNotFound(path.to_string()))
    }

    fn advance(&mut self) -> Result<Option<XarEntry>> {
        let Some(node) = self.walker.advance(&self.toc) else {
            trace!("xar: end of TOC");
            return Ok(None);
        };
        let doc = &*self.toc;

        let name = doc.child_text(node, "name").ok_or(XarError::MissingNameElement)?;
        validate_name(name)?;
        let file_type = doc.child_text(node, "type").ok_or(XarError::MissingTypeElement)?;
        let path = full_path(doc, node, self.walker.depth())?;

        let object = match file_type {
            "directory" => XarObject::Directory(self.base(node, EntryKind::Directory, None)),
            "symlink" => XarObject::Symlink(XarSymlink::new(self.base(
                node,
                EntryKind::Symlink,
                None,
            ))),
            "file" => self.open_file(node)?,
            other => return Err(XarError::UnknownFileType(other.to_string())),
        };
        trace!("xar: entry {path} ({:?}) depth {}", object.kind(), self.walker.depth());

        Ok(Some(XarEntry { path, kind: object.kind(), object }))
    }

    fn base(&self, node: NodeId, kind: EntryKind, sizes: Option<(u64, u64)>) -> XarBaseObject {
        XarBaseObject::new(self.toc.clone(), node, kind, sizes)
    }

    fn open_file(&self, node: NodeId) -> Result<XarObject> {
        let data = parse_data_element(&self.toc, node, self.data_base)?;
        let sizes = Some((data.archived_size, data.extracted_size));
        let base = self.base(node, EntryKind::File, sizes);
        let input = self.input.clone();
        let seekable = input.borrow().is_seekable();

        let object = match &data.encoding {
            Encoding::Store if seekable => XarObject::File(XarFile::new(base, input, data)),
            Encoding::Store => XarObject::IoStream(XarIoStream::new(base, input, data, false)),
            Encoding::Gzip => XarObject::Decompressed(XarDecompStream::new(base, input, data)),
            Encoding::Unsupported(style) => {
                return Err(XarError::UnsupportedEncoding(style.clone()));
            }
        };
        debug!(
            "xar: file node {node} served as {}",
            match object {
                XarObject::File(_) => "seekable file",
                XarObject::IoStream(_) => "forward stream",
                _ => "decompressing stream",
            }
        );
        Ok(object)
    }
}
