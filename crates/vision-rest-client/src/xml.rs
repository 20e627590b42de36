//! Single-element XML helpers.
//!
//! The Vision API exchanges small XML documents whose interesting parts are
//! attributes: a creation response carries the new `id` on its root element,
//! a tag search returns `tag` elements with a `tagid`, and an asset template
//! is stamped with a name through the `value` attribute of its first
//! `property`. The helpers here parse the whole document (so malformed input
//! is always rejected) and operate on the *first* element with a given name
//! in document order.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Owned snapshot of one XML element: its qualified name and its attributes
/// (unescaped) in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        check_name(&name)?;
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            check_name(&key)?;
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Malformed(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self { name, attributes })
    }

    /// Qualified element name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the named attribute, if present.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the element carries the named attribute (even if empty).
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Elements of one name that satisfy a predicate.
///
/// The document is parsed once up front; the predicate runs lazily each time
/// the set is iterated, and it can be iterated any number of times.
pub struct MatchingElements<P> {
    elements: Vec<Element>,
    name: String,
    predicate: P,
}

impl<P> MatchingElements<P>
where
    P: Fn(&Element) -> bool,
{
    /// Iterate the matching elements in document order.
    pub fn iter(&self) -> Matches<'_, P> {
        Matches {
            inner: self.elements.iter(),
            name: &self.name,
            predicate: &self.predicate,
        }
    }
}

impl<'a, P> IntoIterator for &'a MatchingElements<P>
where
    P: Fn(&Element) -> bool,
{
    type Item = &'a Element;
    type IntoIter = Matches<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`MatchingElements`] set.
pub struct Matches<'a, P> {
    inner: std::slice::Iter<'a, Element>,
    name: &'a str,
    predicate: &'a P,
}

impl<'a, P> Iterator for Matches<'a, P>
where
    P: Fn(&Element) -> bool,
{
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.name;
        let predicate = self.predicate;
        self.inner
            .by_ref()
            .find(|element| element.name == name && predicate(element))
    }
}

/// Read `attribute` from the first element named `element`.
///
/// # Errors
///
/// Returns [`XmlError::Malformed`] if the document is not well-formed,
/// [`XmlError::ElementNotFound`] if no element has that name, and
/// [`XmlError::AttributeNotFound`] if the first match lacks the attribute.
pub fn extract_attribute(xml: &str, element: &str, attribute: &str) -> Result<String, XmlError> {
    let elements = parse_elements(xml)?;
    let found = elements
        .iter()
        .find(|e| e.name == element)
        .ok_or_else(|| XmlError::ElementNotFound(element.to_string()))?;

    found
        .attribute(attribute)
        .map(str::to_string)
        .ok_or_else(|| XmlError::AttributeNotFound {
            element: element.to_string(),
            attribute: attribute.to_string(),
        })
}

/// Read `attribute` from the document element, whatever its name.
///
/// # Errors
///
/// Same conditions as [`extract_attribute`].
pub fn root_attribute(xml: &str, attribute: &str) -> Result<String, XmlError> {
    let elements = parse_elements(xml)?;
    // parse_elements guarantees exactly one root, and it comes first
    let root = elements
        .first()
        .ok_or_else(|| XmlError::Malformed("document has no root element".to_string()))?;

    root.attribute(attribute)
        .map(str::to_string)
        .ok_or_else(|| XmlError::AttributeNotFound {
            element: root.name.clone(),
            attribute: attribute.to_string(),
        })
}

/// Collect every element named `element` for which `predicate` holds.
///
/// # Errors
///
/// Returns [`XmlError::Malformed`] if the document is not well-formed.
/// An empty result is not an error.
pub fn list_matching_elements<P>(
    xml: &str,
    element: &str,
    predicate: P,
) -> Result<MatchingElements<P>, XmlError>
where
    P: Fn(&Element) -> bool,
{
    Ok(MatchingElements {
        elements: parse_elements(xml)?,
        name: element.to_string(),
        predicate,
    })
}

/// Set `attribute` to `value` on the first element named `element` and
/// re-serialize the document.
///
/// An existing attribute is replaced in place, otherwise it is appended.
/// The XML declaration is dropped; whitespace, comments and all other
/// elements pass through unchanged.
///
/// # Errors
///
/// Returns [`XmlError::Malformed`] if the document is not well-formed and
/// [`XmlError::ElementNotFound`] if no element has that name.
pub fn inject_attribute(
    xml: &str,
    element: &str,
    attribute: &str,
    value: &str,
) -> Result<String, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut structure = Structure::default();
    let mut injected = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Malformed(format!("{e} at byte {}", reader.buffer_position())))?;
        structure.event(&event)?;

        let event = match event {
            Event::Eof => {
                structure.finish()?;
                break;
            }
            Event::Decl(_) => continue,
            Event::Start(start) => {
                structure.open()?;
                Element::from_start(&start)?;
                if !injected && start.name().as_ref() == element.as_bytes() {
                    injected = true;
                    Event::Start(with_attribute(&start, attribute, value)?)
                } else {
                    Event::Start(start)
                }
            }
            Event::Empty(start) => {
                structure.empty()?;
                Element::from_start(&start)?;
                if !injected && start.name().as_ref() == element.as_bytes() {
                    injected = true;
                    Event::Empty(with_attribute(&start, attribute, value)?)
                } else {
                    Event::Empty(start)
                }
            }
            Event::End(end) => {
                structure.close()?;
                Event::End(end)
            }
            Event::Text(text) => {
                structure.text(&text)?;
                Event::Text(text)
            }
            Event::CData(data) => {
                structure.content()?;
                Event::CData(data)
            }
            other => other,
        };

        writer
            .write_event(event)
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
    }

    if !injected {
        return Err(XmlError::ElementNotFound(element.to_string()));
    }

    let mut out =
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Malformed(e.to_string()))?;
    // Whitespace that followed the dropped declaration would otherwise lead the output.
    if out.starts_with(char::is_whitespace) {
        out = out.trim_start().to_string();
    }
    Ok(out)
}

/// Serialize a single self-closing element with escaped attribute values.
///
/// ```
/// use vision_rest_client::xml::empty_element;
///
/// let body = empty_element("search", &[("text", "A&B")]);
/// assert_eq!(body, r#"<search text="A&amp;B"/>"#);
/// ```
#[must_use]
pub fn empty_element(name: &str, attributes: &[(&str, &str)]) -> String {
    let mut out = format!("<{name}");
    for (key, value) in attributes {
        out.push_str(&format!(" {key}=\"{}\"", escape(*value)));
    }
    out.push_str("/>");
    out
}

fn with_attribute(
    start: &BytesStart<'_>,
    attribute: &str,
    value: &str,
) -> Result<BytesStart<'static>, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut rebuilt = BytesStart::new(name);
    let mut replaced = false;

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        if attr.key.as_ref() == attribute.as_bytes() {
            rebuilt.push_attribute((attribute, value));
            replaced = true;
        } else {
            rebuilt.push_attribute(attr);
        }
    }
    if !replaced {
        rebuilt.push_attribute((attribute, value));
    }

    Ok(rebuilt)
}

/// Names must start with a letter, `_` or `:`.
fn check_name(name: &str) -> Result<(), XmlError> {
    match name.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == ':' => Ok(()),
        _ => Err(XmlError::Malformed(format!("invalid name {name:?}"))),
    }
}

fn parse_elements(xml: &str) -> Result<Vec<Element>, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut structure = Structure::default();
    let mut elements = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Malformed(format!("{e} at byte {}", reader.buffer_position())))?;
        structure.event(&event)?;

        match event {
            Event::Start(start) => {
                structure.open()?;
                elements.push(Element::from_start(&start)?);
            }
            Event::Empty(start) => {
                structure.empty()?;
                elements.push(Element::from_start(&start)?);
            }
            Event::End(_) => structure.close()?,
            Event::Text(text) => structure.text(&text)?,
            Event::CData(_) => structure.content()?,
            Event::Eof => {
                structure.finish()?;
                break;
            }
            _ => {}
        }
    }

    Ok(elements)
}

/// Tracks nesting to enforce a single, closed root element.
#[derive(Debug, Default)]
struct Structure {
    events: usize,
    depth: usize,
    seen_root: bool,
}

impl Structure {
    /// Counts reader events; a declaration is only valid as the first one.
    fn event(&mut self, event: &Event<'_>) -> Result<(), XmlError> {
        self.events += 1;
        if self.events > 1 && matches!(event, Event::Decl(_)) {
            return Err(XmlError::Malformed(
                "XML declaration is not at the start of the document".to_string(),
            ));
        }
        Ok(())
    }

    fn open(&mut self) -> Result<(), XmlError> {
        self.empty()?;
        self.depth += 1;
        Ok(())
    }

    fn empty(&mut self) -> Result<(), XmlError> {
        if self.depth == 0 {
            if self.seen_root {
                return Err(XmlError::Malformed(
                    "content after the root element".to_string(),
                ));
            }
            self.seen_root = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), XmlError> {
        if self.depth == 0 {
            return Err(XmlError::Malformed("unexpected closing tag".to_string()));
        }
        self.depth -= 1;
        Ok(())
    }

    fn text(&self, text: &BytesText<'_>) -> Result<(), XmlError> {
        let text = text
            .unescape()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        if text.bytes().all(|b| b.is_ascii_whitespace()) {
            Ok(())
        } else {
            self.content()
        }
    }

    fn content(&self) -> Result<(), XmlError> {
        if self.depth == 0 {
            return Err(XmlError::Malformed(
                "text outside the root element".to_string(),
            ));
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), XmlError> {
        if self.depth > 0 {
            return Err(XmlError::Malformed("unclosed element".to_string()));
        }
        if !self.seen_root {
            return Err(XmlError::Malformed("document has no root element".to_string()));
        }
        Ok(())
    }
}

/// XML parsing and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    /// Document is not well-formed
    #[error("malformed XML: {0}")]
    Malformed(String),
    /// No element with the requested name
    #[error("no <{0}> element in document")]
    ElementNotFound(String),
    /// First matching element lacks the attribute
    #[error("<{element}> has no attribute {attribute:?}")]
    AttributeNotFound {
        /// Element name
        element: String,
        /// Missing attribute name
        attribute: String,
    },
}
