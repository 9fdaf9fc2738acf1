//! In-memory XML element tree for libvirt documents.
//!
//! The tree keeps every element, attribute, text run, CDATA section and
//! comment it was parsed from, in document order. Content that no accessor
//! knows about therefore survives a parse, mutate, serialize cycle.
//!
//! Paths are a small subset of ElementTree xpath: `/`-separated element
//! names relative to the root element (`"/"` is the root itself,
//! `"/target/permissions"` is a grandchild).

use std::fmt;

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, XmlError};

/// A single node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

impl Node {
    fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    fn is_element_named(&self, name: &str) -> bool {
        matches!(self, Node::Element(e) if e.name == name)
    }

    fn is_text(&self) -> bool {
        matches!(self, Node::Text(_) | Node::CData(_))
    }
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an element carrying the given attributes, in iteration order.
    pub fn with_attributes<I, K, V>(name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            children: Vec::new(),
        }
    }

    /// Parse a complete document and return its root element.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                XmlError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;

            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Parse("unexpected closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape()?.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(text)),
                        None if is_blank(&text) => {}
                        None => {
                            return Err(XmlError::Parse(format!(
                                "text outside of root element: {text:?}"
                            )))
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::CData(String::from_utf8_lossy(&data).into_owned()));
                    }
                }
                Event::Comment(comment) => {
                    // Comments outside the root element are dropped.
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Comment(String::from_utf8_lossy(&comment).into_owned()));
                    }
                }
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Parse(format!("unclosed element <{}>", open.name)));
        }

        root.ok_or_else(|| XmlError::Parse("document has no root element".into()))
    }

    /// Serialize this element (and everything below it) as indented XML.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| XmlError::Parse(format!("serialized XML is not UTF-8: {e}")))
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> std::result::Result<(), quick_xml::Error> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_to(writer)?,
                Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
                Node::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str())))?,
                Node::Comment(t) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(t.as_str())))?
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Value of an attribute, if set.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Remove an attribute and return its previous value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    // =========================================================================
    // Text content
    // =========================================================================

    /// Concatenated direct text content, or `None` if the element has none.
    pub fn text(&self) -> Option<String> {
        let mut found = false;
        let mut text = String::new();
        for child in &self.children {
            if let Node::Text(t) | Node::CData(t) = child {
                found = true;
                text.push_str(t);
            }
        }
        found.then_some(text)
    }

    /// Replace the direct text content, leaving child elements in place.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let idx = self.children.iter().position(Node::is_text).unwrap_or(0);
        self.children.retain(|n| !n.is_text());
        let idx = idx.min(self.children.len());
        self.children.insert(idx, Node::Text(text.into()));
    }

    /// Drop the direct text content. Returns whether there was any.
    pub fn clear_text(&mut self) -> bool {
        let before = self.children.len();
        self.children.retain(|n| !n.is_text());
        before != self.children.len()
    }

    // =========================================================================
    // Children
    // =========================================================================

    /// Iterate over the direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Iterate mutably over the direct child elements.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// First direct child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Append a child element and return a reference to it.
    pub fn push_child(&mut self, element: Element) -> &mut Element {
        self.children.push(Node::Element(element));
        match self.children.last_mut() {
            Some(Node::Element(e)) => e,
            _ => unreachable!("an element was just pushed"),
        }
    }

    /// Replace the first child named like `element`, or append it if absent.
    pub fn replace_child(&mut self, element: Element) {
        match self
            .children
            .iter()
            .position(|n| n.is_element_named(&element.name))
        {
            Some(idx) => self.children[idx] = Node::Element(element),
            None => self.children.push(Node::Element(element)),
        }
    }

    /// Remove the first child element with the given name.
    pub fn remove_child(&mut self, name: &str) -> Option<Element> {
        let idx = self.children.iter().position(|n| n.is_element_named(name))?;
        match self.children.remove(idx) {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Keep only the child elements for which `keep` returns true.
    /// Text and comments are left alone.
    pub fn retain_elements<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Element) -> bool,
    {
        self.children.retain(|n| match n {
            Node::Element(e) => keep(e),
            _ => true,
        });
    }

    /// An element with no attributes and no content at all.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }

    /// Remove indentation left between tags by a pretty printer.
    ///
    /// A whitespace-only run is layout when it sits next to child elements
    /// or spans a line break. Every other text run is kept byte for byte.
    fn drop_layout_whitespace(&mut self) {
        let has_elements = self.children.iter().any(|n| matches!(n, Node::Element(_)));
        self.children.retain(|n| match n {
            Node::Text(t) if is_blank(t) => !(has_elements || t.contains('\n')),
            _ => true,
        });
    }

    fn child_or_insert(&mut self, name: &str) -> &mut Element {
        match self.children.iter().position(|n| n.is_element_named(name)) {
            Some(idx) => match &mut self.children[idx] {
                Node::Element(e) => e,
                _ => unreachable!("position() only matches elements"),
            },
            None => self.push_child(Element::new(name)),
        }
    }

    // =========================================================================
    // Paths
    // =========================================================================

    /// First element matching `xpath`, in document order.
    pub fn find(&self, xpath: &str) -> Result<Option<&Element>> {
        Ok(self.find_all(xpath)?.into_iter().next())
    }

    /// Every element matching `xpath`, in document order.
    pub fn find_all(&self, xpath: &str) -> Result<Vec<&Element>> {
        let segments = split_xpath(xpath)?;
        let mut current = vec![self];
        for segment in segments {
            current = current
                .into_iter()
                .flat_map(|e| e.elements().filter(move |c| c.name == segment))
                .collect();
        }
        Ok(current)
    }

    /// Mutable access to the first element matching `xpath`.
    pub fn find_mut(&mut self, xpath: &str) -> Result<Option<&mut Element>> {
        let segments = split_xpath(xpath)?;
        Ok(find_mut_in(self, &segments))
    }

    /// Walk `xpath`, creating each missing element, and return the last one.
    ///
    /// The whole path is validated before anything is created.
    pub fn ensure_path(&mut self, xpath: &str) -> Result<&mut Element> {
        let segments = split_xpath(xpath)?;
        let mut current = self;
        for segment in segments {
            current = current.child_or_insert(segment);
        }
        Ok(current)
    }

    /// Remove the element at `xpath`, then every ancestor left empty by the
    /// removal. The root itself is never removed.
    pub fn prune(&mut self, xpath: &str) -> Result<bool> {
        let segments = split_xpath(xpath)?;
        Ok(prune_in(self, &segments, false))
    }

    /// Like [`Element::prune`] but only removes the target if it is empty.
    pub fn prune_if_empty(&mut self, xpath: &str) -> Result<bool> {
        let segments = split_xpath(xpath)?;
        Ok(prune_in(self, &segments, true))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let xml = self.to_xml().map_err(|_| fmt::Error)?;
        f.write_str(&xml)
    }
}

fn find_mut_in<'a>(element: &'a mut Element, segments: &[&str]) -> Option<&'a mut Element> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(element);
    };
    for child in element.elements_mut() {
        if child.name == *first {
            if let Some(found) = find_mut_in(child, rest) {
                return Some(found);
            }
        }
    }
    None
}

fn prune_in(element: &mut Element, segments: &[&str], only_if_empty: bool) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };

    let Some(idx) = element
        .children
        .iter()
        .position(|n| n.is_element_named(first))
    else {
        return false;
    };

    if rest.is_empty() {
        let target_empty = element.children[idx]
            .as_element()
            .is_some_and(Element::is_empty);
        if only_if_empty && !target_empty {
            return false;
        }
        element.children.remove(idx);
        return true;
    }

    let removed = match element.children[idx].as_element_mut() {
        Some(child) => prune_in(child, rest, only_if_empty),
        None => false,
    };

    if removed
        && element.children[idx]
            .as_element()
            .is_some_and(Element::is_empty)
    {
        element.children.remove(idx);
    }
    removed
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, mut element: Element) -> Result<()> {
    element.drop_layout_whitespace();
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_some() => {
            return Err(XmlError::Parse(format!(
                "second root element <{}>",
                element.name
            )))
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

/// Split an accessor path into element names.
pub(crate) fn split_xpath(xpath: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = xpath
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if let Some(bad) = segments.iter().find(|s| !is_valid_name(s)) {
        return Err(XmlError::InvalidXpath(format!("{xpath} (segment '{bad}')")));
    }
    Ok(segments)
}

/// Join a parent path and a tag name into a single path.
pub(crate) fn join_xpath(parent: &str, tag: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{tag}")
}

/// Whether `name` is usable as an element or attribute name.
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
