//! Metadata-only objects (directories, symlinks) and the object info shared
//! by every entry kind.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::rc::Rc;

use crate::error::{Result, XarError};
use crate::toc::{NodeId, TocDocument};

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;
/// Permission bits used when a `<mode>` element is absent
pub const DEFAULT_MODE: u32 = 0o755;

/// Entry type in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    pub fn type_bits(self) -> u32 {
        match self {
            EntryKind::File => S_IFREG,
            EntryKind::Directory => S_IFDIR,
            EntryKind::Symlink => S_IFLNK,
        }
    }
}

/// Metadata of an entry, as recorded in its `<file>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjInfo {
    pub kind: EntryKind,
    /// Extracted size in bytes (0 for non-files)
    pub size: u64,
    /// Archived size in bytes (0 for non-files)
    pub allocated: u64,
    /// POSIX mode including the file type bits
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub user: Option<String>,
    pub group: Option<String>,
    /// The `id` attribute of the `<file>` element
    pub inode: u64,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
}

/// Capabilities every entry object has
pub trait VfsObject {
    fn kind(&self) -> EntryKind;

    fn query_info(&self) -> Result<ObjInfo>;
}

/// Parse a XAR timestamp such as `2013-04-05T10:20:30Z`.
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    let naive = text.strip_suffix('Z').unwrap_or(text);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|time| time.and_utc())
}

fn parse_u32(
    doc: &TocDocument,
    node: NodeId,
    element: &'static str,
    radix: u32,
) -> Result<Option<u32>> {
    match doc.child_text(node, element) {
        None => Ok(None),
        Some(text) => u32::from_str_radix(text.trim(), radix)
            .map(Some)
            .map_err(|_| XarError::BadMetadataElement { element, value: text.to_string() }),
    }
}

fn parse_timestamp(
    doc: &TocDocument,
    node: NodeId,
    element: &'static str,
) -> Result<DateTime<Utc>> {
    match doc.child_text(node, element) {
        None => Ok(DateTime::<Utc>::UNIX_EPOCH),
        Some(text) => parse_time(text)
            .ok_or_else(|| XarError::BadMetadataElement { element, value: text.to_string() }),
    }
}

/// Directory, symlink or the metadata part of a file entry.
///
/// Holds the TOC node it was created from; metadata is parsed on demand.
#[derive(Debug, Clone)]
pub struct XarBaseObject {
    toc: Rc<TocDocument>,
    node: NodeId,
    kind: EntryKind,
    /// (archived, extracted) sizes for file entries
    sizes: Option<(u64, u64)>,
}

impl XarBaseObject {
    pub(crate) fn new(
        toc: Rc<TocDocument>,
        node: NodeId,
        kind: EntryKind,
        sizes: Option<(u64, u64)>,
    ) -> Self {
        XarBaseObject { toc, node, kind, sizes }
    }

    /// The entry's name component
    pub fn name(&self) -> &str {
        self.toc.child_text(self.node, "name").unwrap_or_default()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl VfsObject for XarBaseObject {
    fn kind(&self) -> EntryKind {
        self.kind
    }

    fn query_info(&self) -> Result<ObjInfo> {
        let doc = &*self.toc;
        let node = self.node;

        let perms = parse_u32(doc, node, "mode", 8)?.unwrap_or(DEFAULT_MODE);
        let inode = match doc.attr(node, "id") {
            None => 0,
            Some(id) => id.trim().parse::<u64>().map_err(|_| XarError::BadMetadataElement {
                element: "id",
                value: id.to_string(),
            })?,
        };
        let (allocated, size) = self.sizes.unwrap_or((0, 0));

        Ok(ObjInfo {
            kind: self.kind,
            size,
            allocated,
            mode: (perms & !S_IFMT) | self.kind.type_bits(),
            uid: parse_u32(doc, node, "uid", 10)?.unwrap_or(0),
            gid: parse_u32(doc, node, "gid", 10)?.unwrap_or(0),
            user: doc.child_text(node, "user").map(str::to_string),
            group: doc.child_text(node, "group").map(str::to_string),
            inode,
            atime: parse_timestamp(doc, node, "atime")?,
            mtime: parse_timestamp(doc, node, "mtime")?,
            ctime: parse_timestamp(doc, node, "ctime")?,
        })
    }
}

/// A symbolic link entry
#[derive(Debug, Clone)]
pub struct XarSymlink {
    base: XarBaseObject,
}

impl XarSymlink {
    pub(crate) fn new(base: XarBaseObject) -> Self {
        XarSymlink { base }
    }

    /// The on-disk encoding of link targets is not handled yet, so this
    /// always fails with [`XarError::NotImplemented`].
    pub fn read_link(&self) -> Result<String> {
        Err(XarError::NotImplemented("reading XAR symlink targets"))
    }
}

impl VfsObject for XarSymlink {
    fn kind(&self) -> EntryKind {
        EntryKind::Symlink
    }

    fn query_info(&self) -> Result<ObjInfo> {
        self.base.query_info()
    }
}
