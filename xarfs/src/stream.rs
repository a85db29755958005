//! Raw entry streams over the archive's data region.
//!
//! Every delivered byte is fed to the archived digest (and to the extracted
//! digest when no decoder sits on top). Digests are finalized once the whole
//! declared range has been fed; a mismatch poisons the stream and is reported
//! by the next read.

use log::warn;
use std::io::{self, Read, Seek, SeekFrom};

use crate::data::DataAttributes;
use crate::error::{Result, XarError};
use crate::hash::Hasher;
use crate::input::SharedInput;
use crate::object::{EntryKind, ObjInfo, VfsObject, XarBaseObject};

/// Digest verification progress of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashState {
    Pending,
    Ok,
    FailedArchived,
    FailedExtracted,
}

impl HashState {
    pub(crate) fn check(self) -> Result<()> {
        match self {
            HashState::FailedArchived => Err(XarError::ArchivedHashMismatch),
            HashState::FailedExtracted => Err(XarError::ExtractedHashMismatch),
            HashState::Pending | HashState::Ok => Ok(()),
        }
    }
}

/// Forward-only stream over an entry's archived bytes
pub struct XarIoStream {
    base: XarBaseObject,
    input: SharedInput,
    data: DataAttributes,
    position: u64,
    end_of_stream: bool,
    /// Bytes `[0, hashed)` have been fed to the digests
    hashed: u64,
    archived_hasher: Option<Hasher>,
    extracted_hasher: Option<Hasher>,
    hash_state: HashState,
    seekable: bool,
}

impl XarIoStream {
    /// `decoded` is true when a decompressor consumes this stream and
    /// takes care of the extracted digest itself.
    pub(crate) fn new(
        base: XarBaseObject,
        input: SharedInput,
        data: DataAttributes,
        decoded: bool,
    ) -> Self {
        let archived_hasher = Some(Hasher::new(data.archived_digest.kind));
        let extracted_hasher = (!decoded).then(|| Hasher::new(data.extracted_digest.kind));
        XarIoStream {
            base,
            input,
            data,
            position: 0,
            end_of_stream: false,
            hashed: 0,
            archived_hasher,
            extracted_hasher,
            hash_state: HashState::Pending,
            seekable: false,
        }
    }

    pub fn data(&self) -> &DataAttributes {
        &self.data
    }

    pub fn hash_state(&self) -> HashState {
        self.hash_state
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Read at `offset` (or the current position). Returns fewer bytes than
    /// requested at the end of the entry, and 0 once there is nothing left.
    pub fn read_at(&mut self, offset: Option<u64>, buf: &mut [u8]) -> Result<usize> {
        self.read_impl(offset, buf, true)
    }

    /// Like [`read_at`](Self::read_at) but fails with [`XarError::Eof`]
    /// instead of returning a short read.
    pub fn read_exact_at(&mut self, offset: Option<u64>, buf: &mut [u8]) -> Result<()> {
        self.read_impl(offset, buf, false).map(|_| ())
    }

    fn read_impl(&mut self, offset: Option<u64>, buf: &mut [u8], partial: bool) -> Result<usize> {
        self.finalize_if_complete();
        self.hash_state.check()?;

        let size = self.data.archived_size;
        let off = match offset {
            None => self.position,
            Some(off) if !self.seekable && off < self.position => {
                return Err(XarError::InvalidParameter(format!(
                    "offset {off} is behind the stream position {}",
                    self.position
                )));
            }
            Some(off) => off,
        };

        if off >= size {
            self.position = size;
            self.end_of_stream = true;
            return if partial || buf.is_empty() { Ok(0) } else { Err(XarError::Eof) };
        }

        let left = size - off;
        let mut len = buf.len();
        if len as u64 > left {
            if !partial {
                return Err(XarError::Eof);
            }
            len = left as usize;
        }

        let buf = &mut buf[..len];
        self.input.borrow_mut().read_exact_at(self.data.offset + off, buf)?;
        self.feed(off, buf);

        self.position = off + len as u64;
        self.end_of_stream = self.position >= size;
        Ok(len)
    }

    /// Hash the part of `[off, off + bytes.len())` not hashed before.
    /// Reads that leave a gap are not hashed and keep the verdict pending.
    fn feed(&mut self, off: u64, bytes: &[u8]) {
        if self.hash_state != HashState::Pending || off > self.hashed {
            return;
        }
        let skip = (self.hashed - off) as usize;
        if skip >= bytes.len() {
            return;
        }
        let fresh = &bytes[skip..];
        if let Some(hasher) = self.archived_hasher.as_mut() {
            hasher.update(fresh);
        }
        if let Some(hasher) = self.extracted_hasher.as_mut() {
            hasher.update(fresh);
        }
        self.hashed += fresh.len() as u64;
        self.finalize_if_complete();
    }

    fn finalize_if_complete(&mut self) {
        if self.hash_state != HashState::Pending || self.hashed < self.data.archived_size {
            return;
        }
        let Some(archived) = self.archived_hasher.take() else {
            return;
        };

        let extracted_ok = self
            .extracted_hasher
            .take()
            .is_none_or(|extracted| self.data.extracted_digest.matches(&extracted.finalize()));
        self.hash_state = if !self.data.archived_digest.matches(&archived.finalize()) {
            HashState::FailedArchived
        } else if !extracted_ok {
            HashState::FailedExtracted
        } else {
            HashState::Ok
        };
        if self.hash_state != HashState::Ok {
            warn!("xar: {} digest mismatch for {:?}", self.base.name(), self.hash_state);
        }
    }
}

impl VfsObject for XarIoStream {
    fn kind(&self) -> EntryKind {
        EntryKind::File
    }

    fn query_info(&self) -> Result<ObjInfo> {
        self.base.query_info()
    }
}

impl Read for XarIoStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_at(None, buf)?)
    }
}

/// Seekable view of a stored (uncompressed) entry on a seekable input
pub struct XarFile {
    stream: XarIoStream,
}

impl XarFile {
    pub(crate) fn new(base: XarBaseObject, input: SharedInput, data: DataAttributes) -> Self {
        let mut stream = XarIoStream::new(base, input, data, false);
        stream.seekable = true;
        XarFile { stream }
    }

    pub fn data(&self) -> &DataAttributes {
        self.stream.data()
    }

    pub fn hash_state(&self) -> HashState {
        self.stream.hash_state()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.stream.end_of_stream
    }

    pub fn query_size(&self) -> u64 {
        self.stream.data.archived_size
    }

    pub fn tell(&self) -> u64 {
        self.stream.position
    }

    /// Read at any offset inside the entry, or at the current position.
    pub fn read_at(&mut self, offset: Option<u64>, buf: &mut [u8]) -> Result<usize> {
        self.stream.read_at(offset, buf)
    }

    pub fn read_exact_at(&mut self, offset: Option<u64>, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact_at(offset, buf)
    }

    /// Move the position. Targets past the end clamp to the end and mark
    /// end-of-stream; targets inside the entry clear it.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        let size = self.query_size();
        let target = match pos {
            SeekFrom::Start(off) => i128::from(off),
            SeekFrom::Current(delta) => i128::from(self.stream.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(size) + i128::from(delta),
        };
        if target < 0 {
            return Err(XarError::InvalidParameter(format!("seek to negative offset {target}")));
        }
        if target >= i128::from(size) {
            self.stream.position = size;
            self.stream.end_of_stream = true;
        } else {
            self.stream.position = target as u64;
            self.stream.end_of_stream = false;
        }
        Ok(self.stream.position)
    }
}

impl VfsObject for XarFile {
    fn kind(&self) -> EntryKind {
        EntryKind::File
    }

    fn query_info(&self) -> Result<ObjInfo> {
        self.stream.query_info()
    }
}

impl Read for XarFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.stream.read_at(None, buf)?)
    }
}

impl Seek for XarFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }
}
