//! Parsing of the `<data>` element of a file entry.

use crate::error::{Result, XarError};
use crate::hash::{ExpectedDigest, HashKind};
use crate::toc::{NodeId, TocDocument};

/// Largest accepted offset or size, leaving headroom for offset arithmetic
pub const MAX_DATA_VALUE: u64 = (i64::MAX / 2) as u64;

/// How the archived bytes of an entry are encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// `application/octet-stream`
    Store,
    /// `application/x-gzip` (gzip container or bare zlib)
    Gzip,
    /// Anything else; the style string is kept for error reporting
    Unsupported(String),
}

impl Encoding {
    pub fn from_style(style: &str) -> Self {
        match style {
            "application/octet-stream" => Encoding::Store,
            "application/x-gzip" => Encoding::Gzip,
            other => Encoding::Unsupported(other.to_string()),
        }
    }
}

/// Location, sizes, encoding and digests of a file's data
#[derive(Debug, Clone)]
pub struct DataAttributes {
    /// Absolute position of the archived bytes in the host input
    pub offset: u64,
    /// Bytes stored in the archive
    pub archived_size: u64,
    /// Bytes after decoding
    pub extracted_size: u64,
    pub encoding: Encoding,
    pub archived_digest: ExpectedDigest,
    pub extracted_digest: ExpectedDigest,
}

fn parse_value(
    doc: &TocDocument,
    data: NodeId,
    name: &str,
    missing: XarError,
    bad: fn(String) -> XarError,
) -> Result<u64> {
    let text = doc.child_text(data, name).ok_or(missing)?;
    match text.trim().parse::<u64>() {
        Ok(value) if value < MAX_DATA_VALUE => Ok(value),
        _ => Err(bad(text.to_string())),
    }
}

fn parse_checksum(doc: &TocDocument, data: NodeId, name: &str) -> Result<ExpectedDigest> {
    let Some(elem) = doc.child(data, name) else {
        return Ok(ExpectedDigest::none());
    };
    let style = doc.attr(elem, "style").unwrap_or_default();
    let kind = HashKind::from_style(style)
        .ok_or_else(|| XarError::UnsupportedChecksumStyle(style.to_string()))?;
    ExpectedDigest::parse(kind, doc.text(elem))
}

/// Parse the `<data>` child of a `<file>` element.
///
/// `base` is added to the TOC-relative offset: the archive's start in the
/// host input plus the end of the TOC.
pub fn parse_data_element(doc: &TocDocument, file: NodeId, base: u64) -> Result<DataAttributes> {
    let data = doc.child(file, "data").ok_or(XarError::MissingDataElement)?;

    let extracted_digest = parse_checksum(doc, data, "extracted-checksum")?;
    let archived_digest = parse_checksum(doc, data, "archived-checksum")?;

    let encoding_elem = doc.child(data, "encoding").ok_or(XarError::MissingEncodingElement)?;
    let encoding = Encoding::from_style(doc.attr(encoding_elem, "style").unwrap_or_default());

    let offset = parse_value(
        doc,
        data,
        "offset",
        XarError::MissingOffsetElement,
        XarError::BadOffsetElement,
    )?;
    let archived_size =
        parse_value(doc, data, "size", XarError::MissingSizeElement, XarError::BadSizeElement)?;
    let extracted_size = parse_value(
        doc,
        data,
        "length",
        XarError::MissingLengthElement,
        XarError::BadLengthElement,
    )?;

    if encoding == Encoding::Store && archived_size != extracted_size {
        return Err(XarError::ArchivedExtractedSizeMismatch {
            archived: archived_size,
            extracted: extracted_size,
        });
    }

    Ok(DataAttributes {
        offset: offset + base,
        archived_size,
        extracted_size,
        encoding,
        archived_digest,
        extracted_digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> Result<DataAttributes> {
        let xml = format!(
            "<xar><toc><file><name>f</name><type>file</type>{data}</file></toc></xar>"
        );
        let doc = TocDocument::parse(&xml).unwrap();
        let file = doc.child(doc.toc(), "file").unwrap();
        parse_data_element(&doc, file, 1000)
    }

    #[test]
    fn test_parse_full_data_element() {
        let attrs = parse(
            r#"<data>
                <length>10</length>
                <offset>20</offset>
                <size>8</size>
                <encoding style="application/x-gzip"/>
                <extracted-checksum style="SHA1">a9993e364706816aba3e25717850c26c9cd0d89d</extracted-checksum>
                <archived-checksum style="md5">900150983cd24fb0d6963f7d28e17f72</archived-checksum>
            </data>"#,
        )
        .unwrap();

        assert_eq!(attrs.offset, 1020);
        assert_eq!(attrs.archived_size, 8);
        assert_eq!(attrs.extracted_size, 10);
        assert_eq!(attrs.encoding, Encoding::Gzip);
        assert_eq!(attrs.extracted_digest.kind, HashKind::Sha1);
        assert_eq!(attrs.archived_digest.kind, HashKind::Md5);
        assert_eq!(attrs.archived_digest.digest.len(), 16);
    }

    #[test]
    fn test_checksums_default_to_none() {
        let attrs = parse(
            r#"<data><offset>0</offset><size>3</size><length>3</length>
               <encoding style="application/octet-stream"/></data>"#,
        )
        .unwrap();
        assert_eq!(attrs.encoding, Encoding::Store);
        assert_eq!(attrs.archived_digest, ExpectedDigest::none());
        assert_eq!(attrs.extracted_digest, ExpectedDigest::none());
    }

    #[test]
    fn test_unsupported_encoding_is_kept() {
        let attrs = parse(
            r#"<data><offset>0</offset><size>3</size><length>9</length>
               <encoding style="application/x-bzip2"/></data>"#,
        )
        .unwrap();
        assert_eq!(attrs.encoding, Encoding::Unsupported("application/x-bzip2".into()));
    }

    #[test]
    fn test_missing_data() {
        assert!(matches!(parse(""), Err(XarError::MissingDataElement)));
    }

    #[test]
    fn test_missing_and_bad_values() {
        let enc = r#"<encoding style="application/octet-stream"/>"#;
        let cases: Vec<(String, fn(&XarError) -> bool)> = vec![
            (
                format!("<data>{enc}<size>1</size><length>1</length></data>"),
                |e| matches!(e, XarError::MissingOffsetElement),
            ),
            (
                format!("<data>{enc}<offset>x</offset><size>1</size><length>1</length></data>"),
                |e| matches!(e, XarError::BadOffsetElement(_)),
            ),
            (
                format!("<data>{enc}<offset>0</offset><length>1</length></data>"),
                |e| matches!(e, XarError::MissingSizeElement),
            ),
            (
                format!("<data>{enc}<offset>0</offset><size>-1</size><length>1</length></data>"),
                |e| matches!(e, XarError::BadSizeElement(_)),
            ),
            (
                format!("<data>{enc}<offset>0</offset><size>1</size></data>"),
                |e| matches!(e, XarError::MissingLengthElement),
            ),
            (
                format!(
                    "<data>{enc}<offset>0</offset><size>1</size><length>{}</length></data>",
                    MAX_DATA_VALUE
                ),
                |e| matches!(e, XarError::BadLengthElement(_)),
            ),
            (
                "<data><offset>0</offset><size>1</size><length>1</length></data>".to_string(),
                |e| matches!(e, XarError::MissingEncodingElement),
            ),
        ];
        for (data, check) in cases {
            let err = parse(&data).unwrap_err();
            assert!(check(&err), "{data}: unexpected {err:?}");
        }
    }

    #[test]
    fn test_store_size_mismatch() {
        let result = parse(
            r#"<data><offset>0</offset><size>3</size><length>4</length>
               <encoding style="application/octet-stream"/></data>"#,
        );
        assert!(matches!(
            result,
            Err(XarError::ArchivedExtractedSizeMismatch { archived: 3, extracted: 4 })
        ));
    }

    #[test]
    fn test_unknown_checksum_style() {
        let result = parse(
            r#"<data><offset>0</offset><size>3</size><length>3</length>
               <encoding style="application/octet-stream"/>
               <archived-checksum style="sha256">00</archived-checksum></data>"#,
        );
        assert!(matches!(result, Err(XarError::UnsupportedChecksumStyle(s)) if s == "sha256"));
    }

    #[test]
    fn test_bad_digest_text() {
        let result = parse(
            r#"<data><offset>0</offset><size>3</size><length>3</length>
               <encoding style="application/octet-stream"/>
               <extracted-checksum style="sha1">abcd</extracted-checksum></data>"#,
        );
        assert!(matches!(result, Err(XarError::BadDigest { kind: HashKind::Sha1, .. })));
    }
}
