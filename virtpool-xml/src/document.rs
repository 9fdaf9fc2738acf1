//! XML document wrapper with an optional backing file.
//!
//! [`XmlTreeFile`] owns the text of a document and parses it on first
//! structural access. The parsed tree is authoritative from then on. When a
//! backing file is configured it is rewritten synchronously by [`XmlTreeFile::write`],
//! which the accessors call after every mutation, and it is removed when the
//! wrapper is dropped unless [`XmlTreeFile::persist`] was called.

use std::cell::OnceCell;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::{Result, XmlError};
use crate::tree::Element;

/// An XML document plus an optional backing file.
pub struct XmlTreeFile {
    /// Source text, used until the tree is first parsed.
    source: String,
    /// Parsed tree, filled lazily.
    tree: OnceCell<Element>,
    /// Backing store, if any.
    backing: Option<NamedTempFile>,
}

impl XmlTreeFile {
    /// Wrap document text without a backing file.
    ///
    /// The text is not parsed until the first structural access.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            source: text.into(),
            tree: OnceCell::new(),
            backing: None,
        }
    }

    /// Wrap an already-built tree without a backing file.
    pub fn from_element(root: Element) -> Self {
        Self {
            source: String::new(),
            tree: OnceCell::from(root),
            backing: None,
        }
    }

    /// Wrap document text and mirror it into a new temporary file in `dir`.
    pub fn with_backing_file(text: impl Into<String>, dir: &Path) -> Result<Self> {
        let mut doc = Self::new(text);
        doc.attach_backing_file(dir)?;
        Ok(doc)
    }

    /// Start mirroring this document into a new temporary file in `dir`.
    pub fn attach_backing_file(&mut self, dir: &Path) -> Result<()> {
        let file = tempfile::Builder::new()
            .prefix("virtpool-")
            .suffix(".xml")
            .tempfile_in(dir)
            .map_err(|e| XmlError::io(dir, e))?;
        debug!(path = %file.path().display(), "Attached backing file");
        self.backing = Some(file);
        self.write()
    }

    /// Path of the backing file, if one is attached.
    pub fn path(&self) -> Option<&Path> {
        self.backing.as_ref().map(NamedTempFile::path)
    }

    /// The parsed document root (parses on first access).
    pub fn root(&self) -> Result<&Element> {
        if let Some(root) = self.tree.get() {
            return Ok(root);
        }
        let parsed = Element::parse(&self.source)?;
        Ok(self.tree.get_or_init(|| parsed))
    }

    /// Mutable access to the document root (parses on first access).
    pub fn root_mut(&mut self) -> Result<&mut Element> {
        self.root()?;
        self.tree
            .get_mut()
            .ok_or_else(|| XmlError::Parse("document tree unavailable".into()))
    }

    /// Replace the whole document with new text.
    ///
    /// The text is parsed lazily; the backing file (if any) is rewritten now.
    pub fn set_document(&mut self, text: impl Into<String>) -> Result<()> {
        self.source = text.into();
        self.tree = OnceCell::new();
        self.write()
    }

    /// Replace the whole document with a tree.
    pub fn set_root(&mut self, root: Element) -> Result<()> {
        self.source.clear();
        self.tree = OnceCell::from(root);
        self.write()
    }

    /// First element matching `xpath`, or `None`.
    pub fn find(&self, xpath: &str) -> Result<Option<&Element>> {
        self.root()?.find(xpath)
    }

    /// All elements matching `xpath`, in document order.
    pub fn find_all(&self, xpath: &str) -> Result<Vec<&Element>> {
        self.root()?.find_all(xpath)
    }

    /// Mutable access to the first element matching `xpath`.
    pub fn find_mut(&mut self, xpath: &str) -> Result<Option<&mut Element>> {
        self.root_mut()?.find_mut(xpath)
    }

    /// Create every missing element along `xpath` and return the last one.
    pub fn ensure_path(&mut self, xpath: &str) -> Result<&mut Element> {
        self.root_mut()?.ensure_path(xpath)
    }

    /// Serialize the document.
    ///
    /// An unparsed document is returned as stored.
    pub fn to_xml_string(&self) -> Result<String> {
        match self.tree.get() {
            Some(root) => root.to_xml(),
            None => Ok(self.source.clone()),
        }
    }

    /// Write the current document to the backing file, if one is attached.
    pub fn write(&self) -> Result<()> {
        let Some(file) = &self.backing else {
            return Ok(());
        };
        let xml = self.to_xml_string()?;
        let path = file.path();
        let mut handle = file.reopen().map_err(|e| XmlError::io(path, e))?;
        handle.set_len(0).map_err(|e| XmlError::io(path, e))?;
        handle
            .write_all(xml.as_bytes())
            .and_then(|_| handle.flush())
            .map_err(|e| XmlError::io(path, e))?;
        trace!(path = %path.display(), bytes = xml.len(), "Wrote backing file");
        Ok(())
    }

    /// An independent clone with identical content.
    ///
    /// If this document has a backing file the clone gets its own, in the
    /// same directory.
    pub fn copy(&self) -> Result<Self> {
        let mut clone = match self.tree.get() {
            Some(root) => Self::from_element(root.clone()),
            None => Self::new(self.source.clone()),
        };
        if let Some(dir) = self.path().and_then(Path::parent) {
            clone.attach_backing_file(dir)?;
        }
        Ok(clone)
    }

    /// Keep the backing file at `path` after this wrapper is dropped.
    ///
    /// A document without a backing file is written to `path` directly.
    pub fn persist(self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        match self.backing {
            Some(ref file) => {
                self.write()?;
                std::fs::copy(file.path(), path).map_err(|e| XmlError::io(path, e))?;
            }
            None => {
                let xml = self.to_xml_string()?;
                std::fs::write(path, xml).map_err(|e| XmlError::io(path, e))?;
            }
        }
        debug!(path = %path.display(), "Persisted XML document");
        Ok(path.to_path_buf())
    }
}

impl fmt::Debug for XmlTreeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlTreeFile")
            .field("parsed", &self.tree.get().is_some())
            .field("path", &self.path())
            .finish()
    }
}

impl fmt::Display for XmlTreeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let xml = self.to_xml_string().map_err(|_| fmt::Error)?;
        f.write_str(&xml)
    }
}

impl PartialEq for XmlTreeFile {
    /// Documents are equal when both parse to the same tree.
    fn eq(&self, other: &Self) -> bool {
        match (self.root(), other.root()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_lazy() {
        let doc = XmlTreeFile::new("<pool");
        // Serializing an unparsed document does not touch the parser.
        assert_eq!(doc.to_xml_string().unwrap(), "<pool");
        assert!(matches!(doc.root(), Err(XmlError::Parse(_))));
        assert!(matches!(doc.find("/name"), Err(XmlError::Parse(_))));
    }

    #[test]
    fn test_find_misses_are_not_errors() {
        let doc = XmlTreeFile::new("<pool type='dir'><name>p1</name></pool>");
        assert!(doc.find("/uuid").unwrap().is_none());
        assert!(doc.find_all("/source/host").unwrap().is_empty());
        assert_eq!(doc.find("/name").unwrap().unwrap().text().as_deref(), Some("p1"));
    }

    #[test]
    fn test_backing_file_follows_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = XmlTreeFile::with_backing_file("<pool type='dir'/>", dir.path()).unwrap();
        let path = doc.path().unwrap().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<pool type='dir'/>");

        doc.ensure_path("/name").unwrap().set_text("p1");
        doc.write().unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("<name>p1</name>"));

        doc.set_document("<pool type='logical'/>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<pool type='logical'/>");

        drop(doc);
        assert!(!path.exists());
    }

    #[test]
    fn test_copy_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc =
            XmlTreeFile::with_backing_file("<pool><name>p1</name></pool>", dir.path()).unwrap();
        let copy = doc.copy().unwrap();
        assert_ne!(copy.path(), doc.path());
        assert!(copy.path().unwrap().exists());

        doc.find_mut("/name").unwrap().unwrap().set_text("p2");
        assert_eq!(copy.find("/name").unwrap().unwrap().text().as_deref(), Some("p1"));
        assert_ne!(copy, doc);
    }

    #[test]
    fn test_persist_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("saved.xml");
        let doc = XmlTreeFile::with_backing_file("<pool/>", dir.path()).unwrap();
        let saved = doc.persist(&target).unwrap();
        assert_eq!(saved, target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "<pool/>");
    }

    #[test]
    fn test_equality_ignores_formatting() {
        let a = XmlTreeFile::new("<pool type='dir'><name>p1</name></pool>");
        let b = XmlTreeFile::new("<pool type=\"dir\">\n  <name>p1</name>\n</pool>\n");
        assert_eq!(a, b);
    }
}
