//! The byte source underneath a XAR stream.
//!
//! A forward-only source can only move ahead: gaps are skipped by reading
//! and discarding. A seekable source supports random access, which is what
//! lets entries be handed out as seekable files.

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::error::{Result, XarError};

/// `Read + Seek` as a single object-safe trait
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

pub enum HostInput {
    Forward { reader: Box<dyn Read>, position: u64 },
    Seekable { reader: Box<dyn ReadSeek> },
}

/// Input shared between the filesystem stream and the entries it returns
pub type SharedInput = Rc<RefCell<HostInput>>;

impl HostInput {
    pub fn forward<R: Read + 'static>(reader: R) -> Self {
        HostInput::Forward { reader: Box::new(reader), position: 0 }
    }

    pub fn seekable<R: Read + Seek + 'static>(reader: R) -> Self {
        HostInput::Seekable { reader: Box::new(reader) }
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, HostInput::Seekable { .. })
    }

    /// Current absolute position
    pub fn position(&mut self) -> Result<u64> {
        match self {
            HostInput::Forward { position, .. } => Ok(*position),
            HostInput::Seekable { reader } => Ok(reader.stream_position()?),
        }
    }

    /// Fill `buf` from absolute offset `offset`.
    ///
    /// Forward inputs skip ahead as needed and fail with
    /// [`XarError::NotStreamable`] when asked to go back.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            HostInput::Forward { reader, position } => {
                if offset < *position {
                    return Err(XarError::NotStreamable);
                }
                let gap = offset - *position;
                if gap > 0 {
                    let skipped = io::copy(&mut reader.by_ref().take(gap), &mut io::sink())?;
                    *position += skipped;
                    if skipped != gap {
                        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                    }
                }
                reader.read_exact(buf)?;
                *position += buf.len() as u64;
            }
            HostInput::Seekable { reader } => {
                reader.seek(SeekFrom::Start(offset))?;
                reader.read_exact(buf)?;
            }
        }
        Ok(())
    }
}

impl Read for HostInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            HostInput::Forward { reader, position } => {
                let n = reader.read(buf)?;
                *position += n as u64;
                Ok(n)
            }
            HostInput::Seekable { reader } => reader.read(buf),
        }
    }
}
