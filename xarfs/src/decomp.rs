//! Decompressing front-end for `application/x-gzip` entries.

use flate2::bufread::{GzDecoder, ZlibDecoder};
use log::{debug, warn};
use std::io::{self, BufRead, BufReader, Read};

use crate::data::DataAttributes;
use crate::error::{Result, XarError};
use crate::hash::Hasher;
use crate::input::SharedInput;
use crate::object::{EntryKind, ObjInfo, VfsObject, XarBaseObject};
use crate::stream::{HashState, XarIoStream};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

enum Decoder {
    /// Container not sniffed yet
    Pending(BufReader<XarIoStream>),
    Gzip(GzDecoder<BufReader<XarIoStream>>),
    Zlib(ZlibDecoder<BufReader<XarIoStream>>),
}

impl Decoder {
    fn raw(&self) -> &BufReader<XarIoStream> {
        match self {
            Decoder::Pending(raw) => raw,
            Decoder::Gzip(dec) => dec.get_ref(),
            Decoder::Zlib(dec) => dec.get_ref(),
        }
    }
}

/// Stream of the decoded bytes of a gzip or zlib compressed entry.
///
/// The extracted digest is computed here over the decoded output; the
/// chained raw stream verifies the archived digest.
pub struct XarDecompStream {
    base: XarBaseObject,
    decoder: Option<Decoder>,
    extracted_size: u64,
    hasher: Option<Hasher>,
    data: DataAttributes,
    position: u64,
    finished: bool,
    hash_state: HashState,
    failure: Option<XarError>,
}

impl XarDecompStream {
    pub(crate) fn new(base: XarBaseObject, input: SharedInput, data: DataAttributes) -> Self {
        let raw = XarIoStream::new(base.clone(), input, data.clone(), true);
        XarDecompStream {
            base,
            decoder: Some(Decoder::Pending(BufReader::new(raw))),
            extracted_size: data.extracted_size,
            hasher: Some(Hasher::new(data.extracted_digest.kind)),
            data,
            position: 0,
            finished: false,
            hash_state: HashState::Pending,
            failure: None,
        }
    }

    pub fn data(&self) -> &DataAttributes {
        &self.data
    }

    pub fn hash_state(&self) -> HashState {
        self.hash_state
    }

    /// Decoded bytes delivered so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.finished
    }

    /// Read decoded bytes at `offset` (which must not be behind the current
    /// position) or at the current position. Returns 0 at the end.
    pub fn read_at(&mut self, offset: Option<u64>, buf: &mut [u8]) -> Result<usize> {
        self.read_impl(offset, buf, true)
    }

    /// Fill `buf` completely; fails with [`XarError::ExtractedSizeExceeded`]
    /// when the request reaches past the declared extracted size.
    pub fn read_exact_at(&mut self, offset: Option<u64>, buf: &mut [u8]) -> Result<()> {
        self.read_impl(offset, buf, false).map(|_| ())
    }

    fn read_impl(&mut self, offset: Option<u64>, buf: &mut [u8], partial: bool) -> Result<usize> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if let Some(off) = offset {
            if off < self.position {
                return Err(XarError::InvalidParameter(format!(
                    "offset {off} is behind the stream position {}",
                    self.position
                )));
            }
            self.skip_to(off)?;
        }
        if !partial && self.position + buf.len() as u64 > self.extracted_size {
            return Err(XarError::ExtractedSizeExceeded(self.extracted_size));
        }

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.decode(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
            if partial {
                break;
            }
        }
        if !partial && filled < buf.len() {
            return Err(XarError::Eof);
        }
        Ok(filled)
    }

    fn skip_to(&mut self, off: u64) -> Result<()> {
        let mut scratch = [0u8; 4096];
        while self.position < off {
            let want = (off - self.position).min(scratch.len() as u64) as usize;
            if self.decode(&mut scratch[..want])? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// One decoder read with size accounting and digest feeding. Any error
    /// poisons the stream.
    fn decode(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        match self.decode_inner(buf) {
            Ok(n) => Ok(n),
            Err(err) => {
                if matches!(err, XarError::ArchivedHashMismatch) {
                    self.hash_state = HashState::FailedArchived;
                }
                warn!("xar: decoding {} failed: {err}", self.base.name());
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn decode_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.decoder_mut()?.read(buf)?;
        if n == 0 {
            self.finish()?;
            return Ok(0);
        }
        if n as u64 > self.extracted_size - self.position {
            return Err(XarError::ExtractedSizeExceeded(self.extracted_size));
        }
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.position += n as u64;
        Ok(n)
    }

    /// Pick the decoder on first use by sniffing the gzip magic.
    fn decoder_mut(&mut self) -> Result<&mut dyn Read> {
        if let Some(Decoder::Pending(_)) = self.decoder {
            let Some(Decoder::Pending(mut raw)) = self.decoder.take() else {
                return Err(XarError::InvalidParameter("decoder is gone".into()));
            };
            let is_gzip = raw.fill_buf()?.starts_with(&GZIP_MAGIC);
            debug!(
                "xar: {} is a {} stream",
                self.base.name(),
                if is_gzip { "gzip" } else { "zlib" }
            );
            self.decoder = Some(if is_gzip {
                Decoder::Gzip(GzDecoder::new(raw))
            } else {
                Decoder::Zlib(ZlibDecoder::new(raw))
            });
        }
        match self.decoder.as_mut() {
            Some(Decoder::Gzip(dec)) => Ok(dec),
            Some(Decoder::Zlib(dec)) => Ok(dec),
            Some(Decoder::Pending(raw)) => Ok(raw),
            None => Err(XarError::InvalidParameter("decoder is gone".into())),
        }
    }

    /// Checks run once the decoder reports the end of its output.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        if self.position != self.extracted_size {
            return Err(XarError::ExtractedSizeExceeded(self.extracted_size));
        }
        if let Some(hasher) = self.hasher.take() {
            if !self.data.extracted_digest.matches(&hasher.finalize()) {
                self.hash_state = HashState::FailedExtracted;
                return Err(XarError::ExtractedHashMismatch);
            }
        }
        let raw = self
            .decoder
            .as_ref()
            .map(Decoder::raw)
            .ok_or_else(|| XarError::InvalidParameter("decoder is gone".into()))?;
        if !raw.buffer().is_empty() {
            return Err(XarError::UnusedArchivedData);
        }
        match raw.get_ref().hash_state() {
            HashState::Pending => return Err(XarError::UnusedArchivedData),
            HashState::FailedArchived => {
                self.hash_state = HashState::FailedArchived;
                return Err(XarError::ArchivedHashMismatch);
            }
            HashState::FailedExtracted | HashState::Ok => {}
        }
        self.hash_state = HashState::Ok;
        Ok(())
    }
}

impl VfsObject for XarDecompStream {
    fn kind(&self) -> EntryKind {
        EntryKind::File
    }

    fn query_info(&self) -> Result<ObjInfo> {
        self.base.query_info()
    }
}

impl Read for XarDecompStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_at(None, buf)?)
    }
}
