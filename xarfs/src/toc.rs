use flate2::read::ZlibDecoder;
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;

use crate::error::{Result, XarError};
use crate::hash;
use crate::header::XarHeader;

/// Index of an element in the [`TocDocument`] arena
pub type NodeId = usize;

/// One XML element of the TOC
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated character data directly inside this element, trimmed
    pub text: String,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    last_child: Option<NodeId>,
}

/// Parsed table of contents.
///
/// Elements live in a flat vector and refer to each other by index, so
/// entry objects can keep a `NodeId` instead of borrowing the tree.
#[derive(Debug, Clone)]
pub struct TocDocument {
    nodes: Vec<Element>,
    root: NodeId,
    toc: NodeId,
}

impl TocDocument {
    /// Parse TOC XML text and check the `<xar><toc/></xar>` skeleton.
    pub fn parse(xml: &str) -> Result<Self> {
        let (nodes, root) = parse_elements(xml)?;
        let mut doc = TocDocument { nodes, root, toc: root };

        if doc.nodes[root].name != "xar" {
            debug!("TOC root element is <{}>, expected <xar>", doc.nodes[root].name);
            return Err(XarError::TocElementMissing);
        }
        let toc = doc.child(root, "toc").ok_or(XarError::TocElementMissing)?;
        if doc.children(root).any(|id| id != toc) {
            return Err(XarError::TocElementHasSiblings);
        }
        doc.toc = toc;
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<toc>` element
    pub fn toc(&self) -> NodeId {
        self.toc
    }

    pub fn element(&self, id: NodeId) -> &Element {
        &self.nodes[id]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id]
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterate the child elements of `id` in document order
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children { doc: self, next: self.nodes[id].first_child }
    }

    /// First child element called `name`
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id).find(|&child| self.nodes[child].name == name)
    }

    /// Text of the first child element called `name`
    pub fn child_text(&self, id: NodeId, name: &str) -> Option<&str> {
        self.child(id, name).map(|child| self.text(child))
    }

    /// Next sibling element called `name`
    pub fn next_sibling_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let mut cur = self.nodes[id].next_sibling;
        while let Some(sib) = cur {
            if self.nodes[sib].name == name {
                return Some(sib);
            }
            cur = self.nodes[sib].next_sibling;
        }
        None
    }
}

pub struct Children<'a> {
    doc: &'a TocDocument,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.doc.nodes[cur].next_sibling;
        Some(cur)
    }
}

fn xml_error(e: impl std::fmt::Display) -> XarError {
    XarError::TocXmlParseError(e.to_string())
}

fn new_element(start: &BytesStart<'_>, parent: Option<NodeId>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        text: String::new(),
        parent,
        first_child: None,
        next_sibling: None,
        last_child: None,
    })
}

fn push_element(nodes: &mut Vec<Element>, element: Element) -> NodeId {
    let id = nodes.len();
    let parent = element.parent;
    nodes.push(element);
    if let Some(parent) = parent {
        match nodes[parent].last_child {
            Some(prev) => nodes[prev].next_sibling = Some(id),
            None => nodes[parent].first_child = Some(id),
        }
        nodes[parent].last_child = Some(id);
    }
    id
}

/// Build the element arena from XML text. Returns (nodes, root).
fn parse_elements(xml: &str) -> Result<(Vec<Element>, NodeId)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut nodes: Vec<Element> = Vec::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut root: Option<NodeId> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let parent = stack.last().copied();
                if parent.is_none() && root.is_some() {
                    return Err(xml_error("multiple root elements"));
                }
                let id = push_element(&mut nodes, new_element(e, parent)?);
                if root.is_none() {
                    root = Some(id);
                }
                if matches!(event, Event::Start(_)) {
                    stack.push(id);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(xml_error)?;
                match stack.last() {
                    Some(&id) => nodes[id].text.push_str(text.trim()),
                    None => return Err(xml_error("text outside the root element")),
                }
            }
            Event::CData(ref e) => {
                if let Some(&id) = stack.last() {
                    nodes[id].text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(xml_error("unexpected end of document"));
    }
    let root = root.ok_or_else(|| xml_error("document has no root element"))?;
    Ok((nodes, root))
}

/// Read, digest, inflate and parse the TOC that follows the header.
/// Returns the document and the digest of the compressed TOC bytes.
pub fn read_toc<R: Read>(reader: &mut R, header: &XarHeader) -> Result<(TocDocument, Vec<u8>)> {
    let mut compressed = vec![0u8; header.toc_compressed_len as usize];
    reader.read_exact(&mut compressed)?;
    let digest = hash::compute(header.hash_kind, &compressed);

    let expected = header.toc_uncompressed_len;
    let mut xml_data = Vec::with_capacity(expected as usize);
    ZlibDecoder::new(&compressed[..])
        .take(expected + 1)
        .read_to_end(&mut xml_data)
        .map_err(|e| XarError::TocDecompressionFailed(e.to_string()))?;

    if xml_data.len() as u64 != expected {
        return Err(XarError::TocSizeMismatch { expected, actual: xml_data.len() as u64 });
    }
    if xml_data.last() == Some(&0) {
        xml_data.pop();
    }

    let text = std::str::from_utf8(&xml_data)
        .map_err(|e| XarError::TocXmlParseError(format!("TOC is not UTF-8: {e}")))?;
    let doc = TocDocument::parse(text)?;
    debug!(
        "xar: TOC parsed, {} compressed / {} uncompressed bytes, {} elements",
        header.toc_compressed_len,
        expected,
        doc.nodes.len()
    );
    Ok((doc, digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashKind;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xar>
  <toc>
    <checksum style="sha1"><offset>0</offset><size>20</size></checksum>
    <file id="1">
      <name>a &amp; b</name>
      <type>directory</type>
      <file id="2"><name>inner</name><type>file</type></file>
    </file>
    <file id="3"><name>c</name><type>file</type></file>
  </toc>
</xar>"#;

    fn header_for(compressed: usize, uncompressed: usize) -> XarHeader {
        XarHeader {
            magic: crate::header::XAR_MAGIC,
            header_size: 28,
            version: 1,
            toc_compressed_len: compressed as u64,
            toc_uncompressed_len: uncompressed as u64,
            hash_kind: HashKind::Sha1,
        }
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_tree_links() {
        let doc = TocDocument::parse(SAMPLE).unwrap();
        let toc = doc.toc();
        assert_eq!(doc.name(toc), "toc");

        let files: Vec<_> = doc.children(toc).filter(|&id| doc.name(id) == "file").collect();
        assert_eq!(files.len(), 2);
        assert_eq!(doc.attr(files[0], "id"), Some("1"));
        assert_eq!(doc.child_text(files[0], "name"), Some("a & b"));
        assert_eq!(doc.next_sibling_named(files[0], "file"), Some(files[1]));
        assert_eq!(doc.next_sibling_named(files[1], "file"), None);

        let inner = doc.child(files[0], "file").unwrap();
        assert_eq!(doc.parent(inner), Some(files[0]));
        assert_eq!(doc.child_text(inner, "name"), Some("inner"));

        let checksum = doc.child(toc, "checksum").unwrap();
        assert_eq!(doc.attr(checksum, "style"), Some("sha1"));
        assert_eq!(doc.child_text(checksum, "size"), Some("20"));
    }

    #[test]
    fn test_missing_toc() {
        let result = TocDocument::parse("<xar><nottoc/></xar>");
        assert!(matches!(result, Err(XarError::TocElementMissing)));
    }

    #[test]
    fn test_toc_with_sibling() {
        let result = TocDocument::parse("<xar><toc/><signature/></xar>");
        assert!(matches!(result, Err(XarError::TocElementHasSiblings)));
    }

    #[test]
    fn test_wrong_root() {
        let result = TocDocument::parse("<pkg><toc/></pkg>");
        assert!(matches!(result, Err(XarError::TocElementMissing)));
    }

    #[test]
    fn test_malformed_xml() {
        for xml in ["<xar><toc></xar>", "<xar><toc/>", "", "<xar/><xar/>"] {
            let result = TocDocument::parse(xml);
            assert!(matches!(result, Err(XarError::TocXmlParseError(_))), "{xml:?}");
        }
    }

    #[test]
    fn test_read_toc_returns_digest() {
        let compressed = zlib(SAMPLE.as_bytes());
        let header = header_for(compressed.len(), SAMPLE.len());
        let (doc, digest) = read_toc(&mut Cursor::new(&compressed), &header).unwrap();
        assert_eq!(digest, hash::compute(HashKind::Sha1, &compressed));
        assert_eq!(doc.name(doc.root()), "xar");
    }

    #[test]
    fn test_read_toc_trailing_nul() {
        let mut xml = SAMPLE.as_bytes().to_vec();
        xml.push(0);
        let compressed = zlib(&xml);
        let header = header_for(compressed.len(), xml.len());
        assert!(read_toc(&mut Cursor::new(&compressed), &header).is_ok());
    }

    #[test]
    fn test_read_toc_size_mismatch() {
        let compressed = zlib(SAMPLE.as_bytes());
        for declared in [SAMPLE.len() - 1, SAMPLE.len() + 1] {
            let header = header_for(compressed.len(), declared);
            let result = read_toc(&mut Cursor::new(&compressed), &header);
            assert!(matches!(result, Err(XarError::TocSizeMismatch { .. })));
        }
    }

    #[test]
    fn test_read_toc_not_zlib() {
        let garbage = vec![0x42u8; 64];
        let header = header_for(garbage.len(), 100);
        let result = read_toc(&mut Cursor::new(&garbage), &header);
        assert!(matches!(result, Err(XarError::TocDecompressionFailed(_))));
    }

    #[test]
    fn test_read_toc_not_utf8() {
        let mut xml = b"<xar><toc><file><name>".to_vec();
        xml.extend_from_slice(&[0xFF, 0xFE]);
        xml.extend_from_slice(b"</name></file></toc></xar>");
        let compressed = zlib(&xml);
        let header = header_for(compressed.len(), xml.len());
        let result = read_toc(&mut Cursor::new(&compressed), &header);
        assert!(matches!(result, Err(XarError::TocXmlParseError(_))));
    }
}
