use crate::error::{Result, XarError};
use crate::toc::{NodeId, TocDocument};

/// Pre-order, depth-first cursor over the `<file>` elements of a TOC.
#[derive(Debug, Clone, Default)]
pub struct TocWalker {
    current: Option<NodeId>,
    /// Number of `<file>` ancestors of `current`
    depth: usize,
    started: bool,
}

impl TocWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Move to the next `<file>`: first child, else next sibling, else the
    /// next sibling of the nearest ancestor that has one.
    pub fn advance(&mut self, doc: &TocDocument) -> Option<NodeId> {
        if !self.started {
            self.started = true;
            self.current = doc.child(doc.toc(), "file");
            self.depth = 0;
            return self.current;
        }

        let mut node = self.current?;
        if let Some(child) = doc.child(node, "file") {
            self.depth += 1;
            self.current = Some(child);
            return self.current;
        }

        loop {
            if let Some(sibling) = doc.next_sibling_named(node, "file") {
                self.current = Some(sibling);
                return self.current;
            }
            match doc.parent(node) {
                Some(parent) if parent != doc.toc() && self.depth > 0 => {
                    node = parent;
                    self.depth -= 1;
                }
                _ => {
                    self.current = None;
                    return None;
                }
            }
        }
    }
}

/// Validate a single path component taken from a `<name>` element.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', ':']) {
        return Err(XarError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Join the names of `depth` ancestors and the node itself, outermost first.
pub fn full_path(doc: &TocDocument, node: NodeId, depth: usize) -> Result<String> {
    let mut parts = Vec::with_capacity(depth + 1);
    let mut cur = node;
    for level in 0..=depth {
        let name = doc.child_text(cur, "name").ok_or(XarError::MissingNameElement)?;
        parts.push(name);
        if level < depth {
            cur = doc.parent(cur).ok_or(XarError::MissingNameElement)?;
        }
    }
    parts.reverse();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, inner: &str) -> String {
        format!("<file><name>{name}</name><type>x</type>{inner}</file>")
    }

    fn walk(xml: &str) -> Vec<String> {
        let doc = TocDocument::parse(xml).unwrap();
        let mut walker = TocWalker::new();
        let mut paths = Vec::new();
        while let Some(node) = walker.advance(&doc) {
            paths.push(full_path(&doc, node, walker.depth()).unwrap());
        }
        // exhausted walkers stay exhausted
        assert_eq!(walker.advance(&doc), None);
        paths
    }

    #[test]
    fn test_preorder_traversal() {
        let xml = format!(
            "<xar><toc><checksum style=\"none\"/>{}{}</toc></xar>",
            file("a", &format!("{}{}", file("b", &file("file1", "")), file("file2", ""))),
            file("c", ""),
        );
        assert_eq!(walk(&xml), ["a", "a/b", "a/b/file1", "a/file2", "c"]);
    }

    #[test]
    fn test_deep_ascent() {
        let xml = format!(
            "<xar><toc>{}{}</toc></xar>",
            file("x", &file("y", &file("z", &file("w", "")))),
            file("v", ""),
        );
        assert_eq!(walk(&xml), ["x", "x/y", "x/y/z", "x/y/z/w", "v"]);
    }

    #[test]
    fn test_empty_toc() {
        assert!(walk("<xar><toc/></xar>").is_empty());
    }

    #[test]
    fn test_skips_non_file_siblings() {
        let xml = format!(
            "<xar><toc>{}<signature/>{}</toc></xar>",
            file("one", "<data/>"),
            file("two", ""),
        );
        assert_eq!(walk(&xml), ["one", "two"]);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Payload").is_ok());
        assert!(validate_name("..x").is_ok());
        for bad in ["", ".", "..", "../evil", "a/b", "a\\b", "c:d"] {
            assert!(matches!(validate_name(bad), Err(XarError::InvalidFileName(_))), "{bad}");
        }
    }
}
