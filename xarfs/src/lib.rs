//! # xarfs
//!
//! Read-only filesystem stream over XAR archives, the container format of
//! macOS `.pkg` installers and of some disk image bundles.
//!
//! The archive is consumed in a single pass: the header and the zlib
//! compressed XML table of contents are read and verified when the stream
//! is opened, then [`XarFsStream::next_entry`] hands out directories,
//! symlinks and files in pre-order. File data is checked against the
//! archived and extracted digests recorded in the TOC as it is read.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = BufReader::new(File::open("installer.pkg").unwrap());
//! let mut fss = xarfs::XarFsStream::open_seekable(file).unwrap();
//!
//! while let Some(mut entry) = fss.next_entry().unwrap() {
//!     if entry.kind == xarfs::EntryKind::File {
//!         let data = entry.object.read_to_end_verified().unwrap();
//!         println!("{} {} bytes", entry.path, data.len());
//!     }
//! }
//! ```
//!
//! Inputs that cannot seek are opened with [`XarFsStream::open`]; entries
//! then have to be read in archive order, before the next one is requested.

pub mod data;
pub mod decomp;
pub mod error;
pub mod fss;
pub mod hash;
pub mod header;
pub mod input;
pub mod object;
pub mod stream;
pub mod toc;
pub mod walker;

#[cfg(test)]
mod testutil;

pub use data::{DataAttributes, Encoding};
pub use decomp::XarDecompStream;
pub use error::{ErrorKind, Result, XarError};
pub use fss::{ArchiveInfo, XarEntry, XarFsStream, XarObject};
pub use hash::HashKind;
pub use header::{XarHeader, is_xar};
pub use object::{EntryKind, ObjInfo, VfsObject, XarBaseObject, XarSymlink};
pub use stream::{HashState, XarFile, XarIoStream};
pub use toc::TocDocument;
