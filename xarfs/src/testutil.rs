//! In-memory XAR archive builder for tests.

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::Write;

use crate::hash::{self, HashKind};
use crate::header::XAR_MAGIC;

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn header_id(kind: HashKind) -> u32 {
    match kind {
        HashKind::None => 0,
        HashKind::Sha1 => 1,
        HashKind::Md5 => 2,
    }
}

fn checksum_xml(element: &str, kind: HashKind, data: &[u8]) -> String {
    if kind == HashKind::None {
        return String::new();
    }
    format!(
        "<{element} style=\"{}\">{}</{element}>",
        kind.style(),
        hex::encode(hash::compute(kind, data))
    )
}

/// Builds archives; the TOC checksum goes to heap offset 0 unless moved
/// with [`checksum_at`](ArchiveBuilder::checksum_at).
pub struct ArchiveBuilder {
    hash: HashKind,
    /// Style written in `<toc><checksum>`; normally equals `hash`
    toc_style: HashKind,
    checksum_offset: u64,
    entry_hash: HashKind,
    toc: String,
    heap: Vec<u8>,
    next_id: u32,
}

impl ArchiveBuilder {
    pub fn new(hash: HashKind) -> Self {
        ArchiveBuilder {
            hash,
            toc_style: hash,
            checksum_offset: 0,
            entry_hash: hash,
            toc: String::new(),
            heap: vec![0; hash.digest_len()],
            next_id: 1,
        }
    }

    pub fn toc_style(mut self, kind: HashKind) -> Self {
        self.toc_style = kind;
        self
    }

    /// Declare the TOC checksum at `offset`. Small offsets also reserve the
    /// heap bytes, so call this before adding entries.
    pub fn checksum_at(mut self, offset: u64) -> Self {
        self.checksum_offset = offset;
        let end = offset.saturating_add(self.hash.digest_len() as u64);
        if end <= 4096 {
            self.heap.resize(end as usize, 0);
        }
        self
    }

    pub fn entry_hash(mut self, kind: HashKind) -> Self {
        self.entry_hash = kind;
        self
    }

    fn open_file(&mut self, name: &str, kind: &str) {
        self.toc.push_str(&format!(
            "<file id=\"{}\"><name>{name}</name><type>{kind}</type>",
            self.next_id
        ));
        self.next_id += 1;
    }

    /// Open a directory; entries added until [`end_dir`](Self::end_dir) go inside it.
    pub fn dir(&mut self, name: &str) -> &mut Self {
        self.open_file(name, "directory");
        self.toc.push_str("<mode>0755</mode>");
        self
    }

    pub fn end_dir(&mut self) -> &mut Self {
        self.toc.push_str("</file>");
        self
    }

    pub fn symlink(&mut self, name: &str) -> &mut Self {
        self.open_file(name, "symlink");
        self.toc.push_str("</file>");
        self
    }

    pub fn file(&mut self, name: &str, content: &[u8]) -> &mut Self {
        self.entry(name, content, content.to_vec(), "application/octet-stream")
    }

    pub fn gzip_file(&mut self, name: &str, content: &[u8]) -> &mut Self {
        self.entry(name, content, gzip(content), "application/x-gzip")
    }

    pub fn zlib_file(&mut self, name: &str, content: &[u8]) -> &mut Self {
        self.entry(name, content, zlib(content), "application/x-gzip")
    }

    fn entry(&mut self, name: &str, content: &[u8], stored: Vec<u8>, style: &str) -> &mut Self {
        let offset = self.heap.len();
        let kind = self.entry_hash;
        self.open_file(name, "file");
        self.toc.push_str(&format!(
            "<mode>0644</mode><uid>501</uid><gid>20</gid>\
             <data><length>{}</length><offset>{}</offset><size>{}</size>\
             <encoding style=\"{style}\"/>{}{}</data></file>",
            content.len(),
            offset,
            stored.len(),
            checksum_xml("archived-checksum", kind, &stored),
            checksum_xml("extracted-checksum", kind, content),
        ));
        self.heap.extend_from_slice(&stored);
        self
    }

    /// Append TOC markup verbatim.
    pub fn raw(&mut self, xml: &str) -> &mut Self {
        self.toc.push_str(xml);
        self
    }

    /// Append bytes to the heap and return their TOC offset.
    pub fn push_data(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.heap.len() as u64;
        self.heap.extend_from_slice(bytes);
        offset
    }

    pub fn toc_xml(&self) -> String {
        let checksum = if self.toc_style == HashKind::None {
            String::new()
        } else {
            format!(
                "<checksum style=\"{}\"><offset>{}</offset><size>{}</size></checksum>",
                self.toc_style.style(),
                self.checksum_offset,
                self.toc_style.digest_len()
            )
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xar><toc>{checksum}{}</toc></xar>\n",
            self.toc
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let xml = self.toc_xml();
        let compressed = zlib(xml.as_bytes());
        let digest = hash::compute(self.hash, &compressed);

        let mut out = Vec::new();
        out.extend_from_slice(&XAR_MAGIC.to_be_bytes());
        out.extend_from_slice(&28u16.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(compressed.len() as u64).to_be_bytes());
        out.extend_from_slice(&(xml.len() as u64).to_be_bytes());
        out.extend_from_slice(&header_id(self.hash).to_be_bytes());
        out.extend_from_slice(&compressed);

        let mut heap = self.heap.clone();
        // out-of-range offsets are left for the reader to reject
        let start = usize::try_from(self.checksum_offset).unwrap_or(usize::MAX);
        if let Some(end) = start.checked_add(digest.len()) {
            if let Some(slot) = heap.get_mut(start..end) {
                slot.copy_from_slice(&digest);
            }
        }
        out.extend_from_slice(&heap);
        out
    }

    /// Offset of the heap in the built archive
    pub fn heap_start(&self) -> usize {
        28 + zlib(self.toc_xml().as_bytes()).len()
    }
}
