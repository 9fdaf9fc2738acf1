//! Typed property bindings over an [`XmlTreeFile`].
//!
//! Each binding describes where a value lives (`parent_xpath` + `tag_name`,
//! plus an attribute name for [`XmlAttribute`]) and how to decode and encode
//! it. Bindings hold no state: every `get` reads the live tree and every
//! `set`/`del` mutates it and rewrites the backing file.
//!
//! Writes create exactly the elements needed. Deletes of absent data are
//! no-ops, and an element emptied by a delete is pruned together with any
//! ancestors it leaves empty (the document root is never pruned).
//!
//! A binding whose `parent_xpath` is `/` and whose `tag_name` equals the
//! root element's name targets the root itself, e.g. `<pool type='dir'>`.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::base::LibvirtXml;
use crate::document::XmlTreeFile;
use crate::error::{Result, XmlError};
use crate::tree::{is_valid_name, join_xpath, split_xpath, Element, Node};

/// Common interface of every property binding.
pub trait Accessor {
    /// Decoded value type.
    type Value;

    /// Logical property name, used in error messages.
    fn property(&self) -> &'static str;

    /// Read the value from the live document.
    fn get(&self, xml: &XmlTreeFile) -> Result<Self::Value>;

    /// Write the value, creating missing structure.
    fn set(&self, xml: &mut XmlTreeFile, value: Self::Value) -> Result<()>;

    /// Remove the value. Removing an absent value is a no-op.
    fn del(&self, xml: &mut XmlTreeFile) -> Result<()>;
}

/// Generate `get`/`set`/`del` methods on a schema type from its bindings.
macro_rules! accessor_methods {
    ($( $(#[$meta:meta])* $get:ident / $set:ident / $del:ident : $value:ty => $binding:expr; )*) => {
        $(
            $(#[$meta])*
            pub fn $get(&self) -> $crate::error::Result<$value> {
                $crate::accessors::Accessor::get(&$binding, $crate::base::LibvirtXml::xml(self))
            }

            pub fn $set(&mut self, value: impl Into<$value>) -> $crate::error::Result<()> {
                $crate::accessors::Accessor::set(
                    &$binding,
                    $crate::base::LibvirtXml::xml_mut(self),
                    value.into(),
                )
            }

            pub fn $del(&mut self) -> $crate::error::Result<()> {
                $crate::accessors::Accessor::del(&$binding, $crate::base::LibvirtXml::xml_mut(self))
            }
        )*
    };
}

pub(crate) use accessor_methods;

// =============================================================================
// Element lookup shared by the bindings
// =============================================================================

fn is_root_path(xpath: &str) -> Result<bool> {
    Ok(split_xpath(xpath)?.is_empty())
}

fn targets_root(xml: &XmlTreeFile, parent_xpath: &str, tag_name: &str) -> Result<bool> {
    Ok(is_root_path(parent_xpath)? && xml.root()?.name == tag_name)
}

/// The element a binding points at, if present.
fn element_by_parent<'a>(
    xml: &'a XmlTreeFile,
    parent_xpath: &str,
    tag_name: &str,
) -> Result<Option<&'a Element>> {
    if targets_root(xml, parent_xpath, tag_name)? {
        return xml.root().map(Some);
    }
    Ok(xml.find(parent_xpath)?.and_then(|parent| parent.child(tag_name)))
}

fn element_by_parent_mut<'a>(
    xml: &'a mut XmlTreeFile,
    parent_xpath: &str,
    tag_name: &str,
) -> Result<Option<&'a mut Element>> {
    if targets_root(xml, parent_xpath, tag_name)? {
        return xml.root_mut().map(Some);
    }
    Ok(xml
        .find_mut(parent_xpath)?
        .and_then(|parent| parent.elements_mut().find(|e| e.name == tag_name)))
}

/// The element a binding points at, created along with its parents if needed.
fn element_or_create<'a>(
    xml: &'a mut XmlTreeFile,
    parent_xpath: &str,
    tag_name: &str,
) -> Result<&'a mut Element> {
    if targets_root(xml, parent_xpath, tag_name)? {
        return xml.root_mut();
    }
    xml.ensure_path(&join_xpath(parent_xpath, tag_name))
}

fn prune_if_empty(xml: &mut XmlTreeFile, parent_xpath: &str, tag_name: &str) -> Result<()> {
    if targets_root(xml, parent_xpath, tag_name)? {
        return Ok(());
    }
    xml.root_mut()?
        .prune_if_empty(&join_xpath(parent_xpath, tag_name))?;
    Ok(())
}

// =============================================================================
// Attribute
// =============================================================================

/// A string stored in an attribute of an element.
#[derive(Debug, Clone, Copy)]
pub struct XmlAttribute {
    pub property: &'static str,
    pub parent_xpath: &'static str,
    pub tag_name: &'static str,
    pub attribute: &'static str,
}

impl XmlAttribute {
    pub const fn new(
        property: &'static str,
        parent_xpath: &'static str,
        tag_name: &'static str,
        attribute: &'static str,
    ) -> Self {
        Self {
            property,
            parent_xpath,
            tag_name,
            attribute,
        }
    }

    fn location(&self) -> String {
        format!(
            "{}@{}",
            join_xpath(self.parent_xpath, self.tag_name),
            self.attribute
        )
    }
}

impl Accessor for XmlAttribute {
    type Value = String;

    fn property(&self) -> &'static str {
        self.property
    }

    fn get(&self, xml: &XmlTreeFile) -> Result<String> {
        element_by_parent(xml, self.parent_xpath, self.tag_name)?
            .and_then(|e| e.attr(self.attribute))
            .map(str::to_string)
            .ok_or_else(|| XmlError::not_found(self.property, self.location()))
    }

    fn set(&self, xml: &mut XmlTreeFile, value: String) -> Result<()> {
        if !is_valid_name(self.attribute) {
            return Err(XmlError::InvalidXpath(self.location()));
        }
        element_or_create(xml, self.parent_xpath, self.tag_name)?.set_attr(self.attribute, value);
        xml.write()
    }

    fn del(&self, xml: &mut XmlTreeFile) -> Result<()> {
        let removed = match element_by_parent_mut(xml, self.parent_xpath, self.tag_name)? {
            Some(element) => element.remove_attr(self.attribute).is_some(),
            None => false,
        };
        if !removed {
            return Ok(());
        }
        prune_if_empty(xml, self.parent_xpath, self.tag_name)?;
        xml.write()
    }
}

// =============================================================================
// Element text
// =============================================================================

/// A string stored as the text content of an element.
#[derive(Debug, Clone, Copy)]
pub struct XmlElementText {
    pub property: &'static str,
    pub parent_xpath: &'static str,
    pub tag_name: &'static str,
}

impl XmlElementText {
    pub const fn new(
        property: &'static str,
        parent_xpath: &'static str,
        tag_name: &'static str,
    ) -> Self {
        Self {
            property,
            parent_xpath,
            tag_name,
        }
    }
}

impl Accessor for XmlElementText {
    type Value = String;

    fn property(&self) -> &'static str {
        self.property
    }

    fn get(&self, xml: &XmlTreeFile) -> Result<String> {
        element_by_parent(xml, self.parent_xpath, self.tag_name)?
            .and_then(Element::text)
            .ok_or_else(|| {
                XmlError::not_found(self.property, join_xpath(self.parent_xpath, self.tag_name))
            })
    }

    fn set(&self, xml: &mut XmlTreeFile, value: String) -> Result<()> {
        // `<tag></tag>` reads back as `<tag/>`, which has no text.
        if value.is_empty() {
            return Err(XmlError::InvalidValue {
                property: self.property.to_string(),
                value,
                message: "text must not be empty".to_string(),
            });
        }
        element_or_create(xml, self.parent_xpath, self.tag_name)?.set_text(value);
        xml.write()
    }

    fn del(&self, xml: &mut XmlTreeFile) -> Result<()> {
        let removed = match element_by_parent_mut(xml, self.parent_xpath, self.tag_name)? {
            Some(element) => element.clear_text(),
            None => false,
        };
        if !removed {
            return Ok(());
        }
        prune_if_empty(xml, self.parent_xpath, self.tag_name)?;
        xml.write()
    }
}

// =============================================================================
// Element integer
// =============================================================================

/// An integer stored as the text content of an element.
#[derive(Debug, Clone, Copy)]
pub struct XmlElementInt<T> {
    text: XmlElementText,
    _marker: PhantomData<fn() -> T>,
}

impl<T> XmlElementInt<T> {
    pub const fn new(
        property: &'static str,
        parent_xpath: &'static str,
        tag_name: &'static str,
    ) -> Self {
        Self {
            text: XmlElementText::new(property, parent_xpath, tag_name),
            _marker: PhantomData,
        }
    }
}

impl<T> Accessor for XmlElementInt<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    type Value = T;

    fn property(&self) -> &'static str {
        self.text.property
    }

    fn get(&self, xml: &XmlTreeFile) -> Result<T> {
        let raw = self.text.get(xml)?;
        raw.trim().parse().map_err(|e: T::Err| XmlError::InvalidValue {
            property: self.text.property.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        })
    }

    fn set(&self, xml: &mut XmlTreeFile, value: T) -> Result<()> {
        self.text.set(xml, value.to_string())
    }

    fn del(&self, xml: &mut XmlTreeFile) -> Result<()> {
        self.text.del(xml)
    }
}

// =============================================================================
// Nested document
// =============================================================================

/// A sub-document such as `<source>` exposed as its own schema type.
///
/// Reading returns an independent copy: changes to the returned value only
/// reach the parent document when it is written back with `set`.
#[derive(Debug)]
pub struct XmlElementNest<S> {
    pub property: &'static str,
    pub parent_xpath: &'static str,
    pub tag_name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> XmlElementNest<S> {
    pub const fn new(
        property: &'static str,
        parent_xpath: &'static str,
        tag_name: &'static str,
    ) -> Self {
        Self {
            property,
            parent_xpath,
            tag_name,
            _marker: PhantomData,
        }
    }
}

impl<S: LibvirtXml> Accessor for XmlElementNest<S> {
    type Value = S;

    fn property(&self) -> &'static str {
        self.property
    }

    fn get(&self, xml: &XmlTreeFile) -> Result<S> {
        let element = element_by_parent(xml, self.parent_xpath, self.tag_name)?.ok_or_else(|| {
            XmlError::not_found(self.property, join_xpath(self.parent_xpath, self.tag_name))
        })?;
        Ok(S::from_xml(XmlTreeFile::from_element(element.clone())))
    }

    fn set(&self, xml: &mut XmlTreeFile, value: S) -> Result<()> {
        let element = value.xml().root()?.clone();
        if element.name != self.tag_name {
            return Err(XmlError::malformed(
                self.property,
                format!("expected <{}>, got <{}>", self.tag_name, element.name),
            ));
        }

        if targets_root(xml, self.parent_xpath, self.tag_name)? {
            return xml.set_root(element);
        }
        xml.ensure_path(self.parent_xpath)?.replace_child(element);
        xml.write()
    }

    fn del(&self, xml: &mut XmlTreeFile) -> Result<()> {
        let removed = xml
            .root_mut()?
            .prune(&join_xpath(self.parent_xpath, self.tag_name))?;
        if removed {
            xml.write()?;
        }
        Ok(())
    }
}

// =============================================================================
// Element list
// =============================================================================

/// Converts a list item into the tag and attributes of one element.
pub type MarshalFrom<T> = fn(&T) -> Result<(String, Vec<(String, String)>)>;

/// Converts an element's tag and attributes into a list item, or `None` to
/// skip the element.
pub type MarshalTo<T> = fn(&str, &[(String, String)]) -> Option<T>;

/// Repeated child elements of `parent_xpath` exposed as an ordered list.
///
/// Only the children that `marshal_to` accepts belong to the list; other
/// children of the parent are never touched. Reading an empty list fails
/// with `ElementNotFound`, like every other absent property, and setting an
/// empty list is the same as deleting it.
pub struct XmlElementList<T> {
    pub property: &'static str,
    pub parent_xpath: &'static str,
    pub marshal_from: MarshalFrom<T>,
    pub marshal_to: MarshalTo<T>,
}

impl<T> XmlElementList<T> {
    pub const fn new(
        property: &'static str,
        parent_xpath: &'static str,
        marshal_from: MarshalFrom<T>,
        marshal_to: MarshalTo<T>,
    ) -> Self {
        Self {
            property,
            parent_xpath,
            marshal_from,
            marshal_to,
        }
    }

    fn accepts(&self, element: &Element) -> bool {
        (self.marshal_to)(&element.name, &element.attributes).is_some()
    }

    fn encode(&self, item: &T) -> Result<Element> {
        let (tag, attributes) = (self.marshal_from)(item)?;
        if !is_valid_name(&tag) {
            return Err(XmlError::malformed(
                self.property,
                format!("invalid element name {tag:?}"),
            ));
        }
        if let Some((key, _)) = attributes.iter().find(|(k, _)| !is_valid_name(k)) {
            return Err(XmlError::malformed(
                self.property,
                format!("invalid attribute name {key:?}"),
            ));
        }
        Ok(Element::with_attributes(tag, attributes))
    }
}

impl<T> std::fmt::Debug for XmlElementList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlElementList")
            .field("property", &self.property)
            .field("parent_xpath", &self.parent_xpath)
            .finish_non_exhaustive()
    }
}

impl<T> Accessor for XmlElementList<T> {
    type Value = Vec<T>;

    fn property(&self) -> &'static str {
        self.property
    }

    fn get(&self, xml: &XmlTreeFile) -> Result<Vec<T>> {
        let items: Vec<T> = xml
            .find(self.parent_xpath)?
            .into_iter()
            .flat_map(Element::elements)
            .filter_map(|e| (self.marshal_to)(&e.name, &e.attributes))
            .collect();

        if items.is_empty() {
            return Err(XmlError::not_found(self.property, self.parent_xpath));
        }
        Ok(items)
    }

    fn set(&self, xml: &mut XmlTreeFile, value: Vec<T>) -> Result<()> {
        if value.is_empty() {
            return self.del(xml);
        }

        // Encode everything first so a bad item leaves the tree untouched.
        let encoded = value
            .iter()
            .map(|item| self.encode(item).map(Node::Element))
            .collect::<Result<Vec<_>>>()?;

        let parent = xml.ensure_path(self.parent_xpath)?;
        let insert_at = parent
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if self.accepts(e)))
            .unwrap_or(parent.children.len());
        parent.retain_elements(|e| !self.accepts(e));
        let insert_at = insert_at.min(parent.children.len());
        parent.children.splice(insert_at..insert_at, encoded);

        xml.write()
    }

    fn del(&self, xml: &mut XmlTreeFile) -> Result<()> {
        let Some(parent) = xml.find_mut(self.parent_xpath)? else {
            return Ok(());
        };
        let before = parent.children.len();
        parent.retain_elements(|e| !self.accepts(e));
        if parent.children.len() == before {
            return Ok(());
        }

        if !is_root_path(self.parent_xpath)? {
            xml.root_mut()?.prune_if_empty(self.parent_xpath)?;
        }
        xml.write()
    }
}
