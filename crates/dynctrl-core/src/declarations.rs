//! Typed view of a dynctrl document
//!
//! Lowers the generic element tree into constant, control and mapping
//! declarations. Nothing is resolved here: values stay as text together with
//! the position they came from, so the resolvers can report precisely what
//! they could not make sense of.

use std::path::Path;

use crate::document::{Document, DocumentError, Element, Position};

/// Top-level sections the processor understands
pub const KNOWN_SECTIONS: [&str; 4] = ["meta", "constants", "devices", "mappings"];

/// Text of a child element and where it was found.
///
/// When the child is missing the position of the enclosing element is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub text: Option<String>,
    pub position: Position,
}

impl Field {
    fn of_child(parent: &Element, name: &str) -> Self {
        match parent.child(name) {
            Some(child) => Self::of(child),
            None => Self {
                text: None,
                position: parent.position,
            },
        }
    }

    fn of(element: &Element) -> Self {
        Self {
            text: element.text().map(str::to_string),
            position: element.position,
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Text for use in messages, `<empty>` when absent
    pub fn shown(&self) -> &str {
        self.text.as_deref().unwrap_or("<empty>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDecl {
    pub position: Position,
    pub version: Field,
    pub revision: Field,
    pub author: Option<String>,
    pub contact: Option<String>,
    pub copyright: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDecl {
    pub position: Position,
    pub id: Field,
    /// Raw `type` attribute
    pub kind: Option<String>,
    pub value: Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDecl {
    pub position: Position,
    /// Document-local identifier from the `id` attribute
    pub id: Option<String>,
    pub entity: Field,
    pub selector: Field,
    pub index: Field,
    pub size: Field,
    /// `None` when the `<requests>` list is missing altogether
    pub requests: Option<Vec<Field>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRefDecl {
    pub position: Position,
    pub idref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UvcDecl {
    pub position: Position,
    pub control_ref: Option<ControlRefDecl>,
    pub size: Field,
    pub offset: Field,
    pub uvc_type: Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4l2Decl {
    pub position: Position,
    pub id: Field,
    pub v4l2_type: Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDecl {
    pub position: Position,
    pub name: Field,
    pub uvc: Option<UvcDecl>,
    pub v4l2: Option<V4l2Decl>,
}

/// All declarations of one document, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynctrlDocument {
    pub meta: Option<MetaDecl>,
    pub constants: Vec<ConstantDecl>,
    /// Number of `<device>` blocks (their match criteria are not evaluated)
    pub device_blocks: usize,
    /// Controls of every device block, flattened
    pub controls: Vec<ControlDecl>,
    pub mappings: Vec<MappingDecl>,
    /// Top-level elements that are not part of the format
    pub unknown_sections: Vec<(String, Position)>,
}

impl DynctrlDocument {
    pub fn from_xml(xml: &str) -> Result<Self, DocumentError> {
        Ok(Self::from_document(&Document::from_xml(xml)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        Ok(Self::from_document(&Document::from_file(path)?))
    }

    pub fn from_document(document: &Document) -> Self {
        let root = &document.root;
        let mut doc = Self {
            meta: root.child("meta").map(lower_meta),
            ..Self::default()
        };

        for section in &root.children {
            match section.name.as_str() {
                "meta" => {}
                "constants" => doc
                    .constants
                    .extend(section.children_named("constant").map(lower_constant)),
                "devices" => {
                    for device in section.children_named("device") {
                        doc.device_blocks += 1;
                        for controls in device.children_named("controls") {
                            doc.controls
                                .extend(controls.children_named("control").map(lower_control));
                        }
                    }
                }
                "mappings" => doc
                    .mappings
                    .extend(section.children_named("mapping").map(lower_mapping)),
                other => doc.unknown_sections.push((other.to_string(), section.position)),
            }
        }

        doc
    }
}

fn lower_meta(meta: &Element) -> MetaDecl {
    MetaDecl {
        position: meta.position,
        version: Field::of_child(meta, "version"),
        revision: Field::of_child(meta, "revision"),
        author: meta.child_text("author").map(str::to_string),
        contact: meta.child_text("contact").map(str::to_string),
        copyright: meta.child_text("copyright").map(str::to_string),
    }
}

fn lower_constant(constant: &Element) -> ConstantDecl {
    ConstantDecl {
        position: constant.position,
        id: Field::of_child(constant, "id"),
        kind: constant.attribute("type").map(str::to_string),
        value: Field::of_child(constant, "value"),
    }
}

fn lower_control(control: &Element) -> ControlDecl {
    ControlDecl {
        position: control.position,
        id: control.attribute("id").map(str::to_string),
        entity: Field::of_child(control, "entity"),
        selector: Field::of_child(control, "selector"),
        index: Field::of_child(control, "index"),
        size: Field::of_child(control, "size"),
        requests: control
            .child("requests")
            .map(|requests| requests.children_named("request").map(Field::of).collect()),
    }
}

fn lower_mapping(mapping: &Element) -> MappingDecl {
    MappingDecl {
        position: mapping.position,
        name: Field::of_child(mapping, "name"),
        uvc: mapping.child("uvc").map(|uvc| UvcDecl {
            position: uvc.position,
            control_ref: uvc.child("control_ref").map(|control_ref| ControlRefDecl {
                position: control_ref.position,
                idref: control_ref.attribute("idref").map(str::to_string),
            }),
            size: Field::of_child(uvc, "size"),
            offset: Field::of_child(uvc, "offset"),
            uvc_type: Field::of_child(uvc, "uvc_type"),
        }),
        v4l2: mapping.child("v4l2").map(|v4l2| V4l2Decl {
            position: v4l2.position,
            id: Field::of_child(v4l2, "id"),
            v4l2_type: Field::of_child(v4l2, "v4l2_type"),
        }),
    }
}
