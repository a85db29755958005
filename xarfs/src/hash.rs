//! Digest support for XAR archives.
//!
//! XAR uses one hash function for the TOC checksum (declared in the header)
//! and a per-entry function for the archived and extracted checksums. Only
//! SHA-1 and MD5 are understood; "none" disables verification.

use md5::Md5;
use sha1::{Digest, Sha1};

use crate::error::{Result, XarError};

pub const SHA1_DIGEST_LEN: usize = 20;
pub const MD5_DIGEST_LEN: usize = 16;

/// Hash function identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    None,
    Sha1,
    Md5,
}

impl HashKind {
    /// Map the header's `cksum_alg` field.
    pub fn from_header_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(HashKind::None),
            1 => Some(HashKind::Sha1),
            2 => Some(HashKind::Md5),
            _ => None,
        }
    }

    /// Map a TOC `style="…"` attribute (case-insensitive).
    pub fn from_style(style: &str) -> Option<Self> {
        if style.eq_ignore_ascii_case("sha1") {
            Some(HashKind::Sha1)
        } else if style.eq_ignore_ascii_case("md5") {
            Some(HashKind::Md5)
        } else if style.eq_ignore_ascii_case("none") {
            Some(HashKind::None)
        } else {
            None
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashKind::None => 0,
            HashKind::Sha1 => SHA1_DIGEST_LEN,
            HashKind::Md5 => MD5_DIGEST_LEN,
        }
    }

    pub fn style(self) -> &'static str {
        match self {
            HashKind::None => "none",
            HashKind::Sha1 => "sha1",
            HashKind::Md5 => "md5",
        }
    }
}

/// Running digest context
#[derive(Clone)]
pub enum Hasher {
    None,
    Sha1(Sha1),
    Md5(Md5),
}

impl Hasher {
    pub fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::None => Hasher::None,
            HashKind::Sha1 => Hasher::Sha1(Sha1::new()),
            HashKind::Md5 => Hasher::Md5(Md5::new()),
        }
    }

    pub fn kind(&self) -> HashKind {
        match self {
            Hasher::None => HashKind::None,
            Hasher::Sha1(_) => HashKind::Sha1,
            Hasher::Md5(_) => HashKind::Md5,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::None => {}
            Hasher::Sha1(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    /// Finish the digest. Empty for `HashKind::None`.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::None => Vec::new(),
            Hasher::Sha1(h) => h.finalize().to_vec(),
            Hasher::Md5(h) => h.finalize().to_vec(),
        }
    }
}

/// Digest of a whole buffer in one go
pub fn compute(kind: HashKind, data: &[u8]) -> Vec<u8> {
    let mut hasher = Hasher::new(kind);
    hasher.update(data);
    hasher.finalize()
}

/// Expected digest declared by the TOC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest {
    pub kind: HashKind,
    pub digest: Vec<u8>,
}

impl ExpectedDigest {
    pub fn none() -> Self {
        ExpectedDigest { kind: HashKind::None, digest: Vec::new() }
    }

    /// Parse the hex text of a checksum element.
    pub fn parse(kind: HashKind, text: &str) -> Result<Self> {
        if kind == HashKind::None {
            return Ok(Self::none());
        }
        let text = text.trim();
        let bad = || XarError::BadDigest { kind, value: text.to_string() };
        let digest = hex::decode(text).map_err(|_| bad())?;
        if digest.len() != kind.digest_len() {
            return Err(bad());
        }
        Ok(ExpectedDigest { kind, digest })
    }

    /// Compare a finished digest. Always matches when no digest was declared.
    pub fn matches(&self, actual: &[u8]) -> bool {
        self.kind == HashKind::None || self.digest == actual
    }
}

impl Default for ExpectedDigest {
    fn default() -> Self {
        Self::none()
    }
}
