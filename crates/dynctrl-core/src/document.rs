//! Generic XML element tree with source positions
//!
//! Dynctrl documents are small, so the whole file is read into an owned tree
//! in one pass with quick-xml's pull reader. Every element remembers the
//! line and column of its start tag so later processing stages can attach
//! positions to their diagnostics.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// 1-based line/column of a location in the source text; 0 means unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const UNKNOWN: Self = Self { line: 0, column: 0 };

    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (0, _) => f.write_str("?"),
            (line, 0) => write!(f, "{}", line),
            (line, column) => write!(f, "{}:{}", line, column),
        }
    }
}

/// The document could not be read or is not well-formed XML
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DocumentError {
    pub position: Position,
    pub message: String,
}

impl DocumentError {
    fn at(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// An XML element with its attributes, direct text content and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content of this element (not of its children)
    pub text: String,
    pub children: Vec<Element>,
    pub position: Position,
}

impl Element {
    fn new(name: String, position: Position) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            position,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text content, or `None` if the element holds no text
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Trimmed text content of the first child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Parse a document from an XML string
    pub fn from_xml(xml: &str) -> Result<Self, DocumentError> {
        let lines = LineIndex::new(xml);
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| {
                DocumentError::at(lines.position(reader.error_position() as usize), e.to_string())
            })?;
            let position = lines.position(start);

            match event {
                Event::Start(tag) => {
                    stack.push(open_element(&tag, position)?);
                }
                Event::Empty(tag) => {
                    let element = open_element(&tag, position)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| DocumentError::at(position, "closing tag without matching opening tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let content = text
                        .unescape()
                        .map_err(|e| DocumentError::at(position, e.to_string()))?;
                    push_text(&mut stack, &content, position)?;
                }
                Event::CData(data) => {
                    let content = data.into_inner();
                    push_text(&mut stack, &String::from_utf8_lossy(&content), position)?;
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and DOCTYPE carry no content
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DocumentError::at(
                open.position,
                format!("element <{}> is not closed", open.name),
            ));
        }
        let root = root.ok_or_else(|| DocumentError::at(Position::new(1, 1), "document has no root element"))?;
        Ok(Self { root })
    }

    /// Parse a document from a file
    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DocumentError::at(
                Position::UNKNOWN,
                format!("unable to read '{}': {}", path.display(), e),
            )
        })?;
        Self::from_xml(&content)
    }
}

fn open_element(tag: &BytesStart<'_>, position: Position) -> Result<Element, DocumentError> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut element = Element::new(name, position);
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| DocumentError::at(position, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::at(position, e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), DocumentError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_some() {
        return Err(DocumentError::at(
            element.position,
            format!("unexpected element <{}> after the root element", element.name),
        ));
    } else {
        *root = Some(element);
    }
    Ok(())
}

fn push_text(stack: &mut [Element], content: &str, position: Position) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some(parent) => parent.text.push_str(content),
        None if content.trim().is_empty() => {}
        None => return Err(DocumentError::at(position, "text outside of the root element")),
    }
    Ok(())
}

/// Byte offset to line/column conversion
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn position(&self, offset: usize) -> Position {
        let line = self.starts.partition_point(|&start| start <= offset);
        let line_start = self.starts[line.saturating_sub(1)];
        Position::new(line as u32, (offset - line_start + 1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <meta>
    <version>1.0</version>
  </meta>
  <constants>
    <constant type="integer">
      <id>A</id>
      <value> 0x10 </value>
    </constant>
  </constants>
  <empty/>
</config>"#;

    #[test]
    fn test_parse_tree_and_positions() {
        let doc = Document::from_xml(SAMPLE).unwrap();
        assert_eq!(doc.root.name, "config");
        assert_eq!(doc.root.position, Position::new(2, 1));

        let meta = doc.root.child("meta").unwrap();
        assert_eq!(meta.position, Position::new(3, 3));
        assert_eq!(meta.child_text("version"), Some("1.0"));

        let constant = doc.root.child("constants").unwrap().child("constant").unwrap();
        assert_eq!(constant.position, Position::new(7, 5));
        assert_eq!(constant.attribute("type"), Some("integer"));
        assert_eq!(constant.attribute("missing"), None);
        assert_eq!(constant.child_text("value"), Some("0x10"));

        let empty = doc.root.child("empty").unwrap();
        assert_eq!(empty.text(), None);
        assert_eq!(empty.position, Position::new(12, 3));
    }

    #[test]
    fn test_children_named_keeps_order() {
        let doc = Document::from_xml("<r><a>1</a><b/><a>2</a></r>").unwrap();
        let texts: Vec<_> = doc.root.children_named("a").filter_map(Element::text).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }

    #[test]
    fn test_entities_and_cdata() {
        let doc = Document::from_xml("<r><n>Pan &amp; Tilt</n><c><![CDATA[<raw>]]></c></r>").unwrap();
        assert_eq!(doc.root.child_text("n"), Some("Pan & Tilt"));
        assert_eq!(doc.root.child_text("c"), Some("<raw>"));
    }

    #[test]
    fn test_mismatched_end_tag_is_positioned() {
        let err = Document::from_xml("<config>\n  <meta>\n  </mapping>\n</config>").unwrap_err();
        assert!(err.position.is_known());
        assert!(err.message.contains("mapping"));
    }

    #[test]
    fn test_unclosed_element() {
        let err = Document::from_xml("<config>\n  <meta>").unwrap_err();
        assert!(err.position.line >= 1);
    }

    #[test]
    fn test_empty_document() {
        let err = Document::from_xml("<?xml version=\"1.0\"?>\n").unwrap_err();
        assert_eq!(err.message, "document has no root element");
    }

    #[test]
    fn test_second_root_rejected() {
        let err = Document::from_xml("<a/>\n<b/>").unwrap_err();
        assert_eq!(err.position, Position::new(2, 1));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let doc = Document::from_file(file.path()).unwrap();
        assert_eq!(doc.root.name, "config");
    }

    #[test]
    fn test_missing_file() {
        let err = Document::from_file(Path::new("/nonexistent/dynctrl.xml")).unwrap_err();
        assert_eq!(err.position, Position::UNKNOWN);
        assert!(err.message.contains("unable to read"));
    }

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(3, 7).to_string(), "3:7");
        assert_eq!(Position::new(3, 0).to_string(), "3");
        assert_eq!(Position::UNKNOWN.to_string(), "?");
    }
}
