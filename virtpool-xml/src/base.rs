//! Shared behaviour of every schema type.

use crate::document::XmlTreeFile;
use crate::error::Result;

/// A schema type backed by an [`XmlTreeFile`].
///
/// Implementors only provide access to their document; property methods are
/// generated from bindings and read and write that document directly.
pub trait LibvirtXml: Sized {
    /// Root element name of an empty document of this type.
    const ROOT_TAG: &'static str;

    /// Wrap an existing document.
    fn from_xml(xml: XmlTreeFile) -> Self;

    fn xml(&self) -> &XmlTreeFile;

    fn xml_mut(&mut self) -> &mut XmlTreeFile;

    /// A document holding only an empty root element.
    fn empty() -> Self {
        Self::from_xml(XmlTreeFile::new(format!("<{}/>", Self::ROOT_TAG)))
    }

    /// Wrap document text. Parsing happens on first access.
    fn from_text(text: impl Into<String>) -> Self {
        Self::from_xml(XmlTreeFile::new(text))
    }

    /// The current document as text.
    fn xml_string(&self) -> Result<String> {
        self.xml().to_xml_string()
    }

    /// Replace the whole document.
    fn set_xml(&mut self, text: impl Into<String>) -> Result<()> {
        self.xml_mut().set_document(text)
    }
}
