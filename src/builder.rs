//! Streaming document assembly.
//!
//! A [`DocumentBuilder`] consumes a flat stream of open/text/close events
//! (as produced by any push tokenizer) and assembles an entity graph rooted
//! at a single document entity. Behavior per element name comes from a
//! [`HandlerSet`] of immutable [`ElementHandler`] descriptors registered up
//! front; each open of a handled tag gets its own mutable frame, so nested
//! and repeated occurrences of the same tag never share state. Unhandled
//! tags are structural noise and are skipped without failing the document.

use crate::entity::{Entity, EntityError, EntityType};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Error type for document assembly.
#[derive(Debug)]
pub enum BuildError {
    /// A close event did not match the element currently open.
    MalformedDocument(String),
    /// The stream ended with elements still open.
    UnbalancedDocument { open: usize },
    /// A completed child entity could not be attached to its parent.
    Attach { tag: String, source: EntityError },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MalformedDocument(detail) => {
                write!(f, "Malformed document: {}", detail)
            }
            BuildError::UnbalancedDocument { open } => {
                write!(f, "Document ended with {} element(s) still open", open)
            }
            BuildError::Attach { tag, source } => {
                write!(f, "Cannot attach element '{}': {}", tag, source)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Attach { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum HandlerMode {
    /// Accumulated text becomes a string field on the innermost open entity.
    Text { field: Option<String> },
    /// The element becomes a new entity, attached to its parent at close.
    Entity {
        ty: &'static EntityType,
        content_field: Option<String>,
        list: bool,
    },
}

/// Immutable per-tag behavior descriptor. Registered once in a
/// [`HandlerSet`]; all per-occurrence state lives in the builder's frames.
#[derive(Debug, Clone)]
pub struct ElementHandler {
    mode: HandlerMode,
    /// Element attribute name -> field name mappings. For entity mode the
    /// fields are set on the new entity; for text mode, on the innermost
    /// open entity. Unmapped attributes are ignored.
    attrs: Vec<(String, String)>,
    strip: bool,
}

impl ElementHandler {
    /// Element text becomes a field named after the tag itself.
    pub fn text() -> Self {
        Self {
            mode: HandlerMode::Text { field: None },
            attrs: Vec::new(),
            strip: true,
        }
    }

    /// Element text becomes a field with an explicit name.
    pub fn text_into(field: impl Into<String>) -> Self {
        Self {
            mode: HandlerMode::Text {
                field: Some(field.into()),
            },
            attrs: Vec::new(),
            strip: true,
        }
    }

    /// Element becomes a nested entity stored under the tag name as a
    /// scalar field. By default the element text lands in `name` and an
    /// `id` attribute lands in `id`.
    pub fn entity(ty: &'static EntityType) -> Self {
        Self {
            mode: HandlerMode::Entity {
                ty,
                content_field: Some("name".to_string()),
                list: false,
            },
            attrs: vec![("id".to_string(), "id".to_string())],
            strip: false,
        }
    }

    /// Element becomes a nested entity appended to the pluralized list
    /// field on its parent (tag `fixVersion` appends to `fixVersions`).
    pub fn entity_list(ty: &'static EntityType) -> Self {
        Self {
            mode: HandlerMode::Entity {
                ty,
                content_field: Some("name".to_string()),
                list: true,
            },
            attrs: vec![("id".to_string(), "id".to_string())],
            strip: false,
        }
    }

    /// Redirect the element text to a different field of the new entity.
    pub fn with_content_field(mut self, field: impl Into<String>) -> Self {
        if let HandlerMode::Entity { content_field, .. } = &mut self.mode {
            *content_field = Some(field.into());
        }
        self
    }

    /// Discard the element text instead of storing it.
    pub fn no_content(mut self) -> Self {
        if let HandlerMode::Entity { content_field, .. } = &mut self.mode {
            *content_field = None;
        }
        self
    }

    /// Add an attribute-to-field mapping.
    pub fn with_attr(mut self, attr: impl Into<String>, field: impl Into<String>) -> Self {
        self.attrs.push((attr.into(), field.into()));
        self
    }

    /// Drop the default attribute mappings.
    pub fn clear_attrs(mut self) -> Self {
        self.attrs.clear();
        self
    }

    /// Strip a paragraph wrapper from the element text before storing it.
    pub fn strip_markup(mut self) -> Self {
        self.strip = true;
        self
    }

    fn field_for(&self, attr: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, field)| field.as_str())
    }
}

/// The tag-to-handler registration table for one document dialect.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<String, ElementHandler>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: impl Into<String>, handler: ElementHandler) {
        self.handlers.insert(tag.into(), handler);
    }

    pub fn get(&self, tag: &str) -> Option<&ElementHandler> {
        self.handlers.get(tag)
    }
}

/// Per-occurrence element state.
#[derive(Debug)]
struct Frame {
    tag: String,
    handler: Option<ElementHandler>,
    text: String,
}

/// Assembles an entity graph from a stream of element events.
#[derive(Debug)]
pub struct DocumentBuilder {
    handlers: HandlerSet,
    frames: Vec<Frame>,
    /// Innermost open entity last; the document root is always at the
    /// bottom and never popped by element events.
    entities: Vec<Entity>,
}

impl DocumentBuilder {
    pub fn new(handlers: HandlerSet, root: &'static EntityType) -> Self {
        Self {
            handlers,
            frames: Vec::new(),
            entities: vec![Entity::new(root)],
        }
    }

    /// Open an element. Unknown tags get a pass-through frame whose text
    /// and attributes are discarded.
    pub fn open_tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        let handler = self.handlers.get(name).cloned();
        match &handler {
            Some(h) => match &h.mode {
                HandlerMode::Entity { ty, .. } => {
                    let mut entity = Entity::new(ty);
                    for (attr, value) in attrs {
                        if let Some(field) = h.field_for(attr) {
                            entity.set_string(field, *value);
                        }
                    }
                    self.entities.push(entity);
                }
                HandlerMode::Text { .. } => {
                    // Mapped attributes of a text element describe the
                    // entity the text belongs to, not a new one.
                    for (attr, value) in attrs {
                        if let Some(field) = h.field_for(attr) {
                            if let Some(top) = self.entities.last_mut() {
                                top.set_string(field, *value);
                            }
                        }
                    }
                }
            },
            None => {
                tracing::trace!("Ignoring unhandled element '{}'", name);
            }
        }
        self.frames.push(Frame {
            tag: name.to_string(),
            handler,
            text: String::new(),
        });
    }

    /// Append character data to the innermost open element. Text outside
    /// any element is ignored.
    pub fn text(&mut self, chars: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.text.push_str(chars);
        }
    }

    /// Close an element, storing its text or attaching its entity to the
    /// parent.
    pub fn close_tag(&mut self, name: &str) -> Result<(), BuildError> {
        let frame = self.frames.pop().ok_or_else(|| {
            BuildError::MalformedDocument(format!("closing '{}' with no element open", name))
        })?;
        if frame.tag != name {
            return Err(BuildError::MalformedDocument(format!(
                "expected closing '{}', found '{}'",
                frame.tag, name
            )));
        }

        let handler = match frame.handler {
            Some(handler) => handler,
            None => return Ok(()),
        };
        match handler.mode {
            HandlerMode::Text { field } => {
                let text = if handler.strip {
                    strip_paragraph(&frame.text)
                } else {
                    frame.text
                };
                let field = field.unwrap_or(frame.tag);
                if let Some(top) = self.entities.last_mut() {
                    top.set_string(field, text);
                }
            }
            HandlerMode::Entity {
                ty,
                content_field,
                list,
            } => {
                // The entity pushed at open is the innermost one.
                let mut child = match self.entities.pop() {
                    Some(child) => child,
                    None => {
                        return Err(BuildError::MalformedDocument(format!(
                            "no open entity for '{}'",
                            name
                        )))
                    }
                };
                if let Some(field) = content_field {
                    let text = if handler.strip {
                        strip_paragraph(&frame.text)
                    } else {
                        frame.text
                    };
                    child.set_string(field, text);
                }
                let parent = match self.entities.last_mut() {
                    Some(parent) => parent,
                    None => {
                        return Err(BuildError::MalformedDocument(format!(
                            "no parent to attach '{}' to",
                            name
                        )))
                    }
                };
                if list {
                    parent
                        .get_entity_list(&format!("{}s", frame.tag), ty)
                        .map_err(|source| BuildError::Attach {
                            tag: frame.tag.clone(),
                            source,
                        })?
                        .push(child);
                } else {
                    parent.set_entity(frame.tag, child);
                }
            }
        }
        Ok(())
    }

    /// Finish the stream and hand back the document root.
    pub fn finish(mut self) -> Result<Entity, BuildError> {
        if !self.frames.is_empty() {
            return Err(BuildError::UnbalancedDocument {
                open: self.frames.len(),
            });
        }
        // With no frames open, only the root remains.
        self.entities.pop().ok_or_else(|| {
            BuildError::MalformedDocument("document root was consumed".to_string())
        })
    }
}

/// Strip a leading `<p>` and trailing `</p>` from feed-carried rich text.
fn strip_paragraph(text: &str) -> String {
    static PARA_RE: OnceLock<Regex> = OnceLock::new();
    let re = PARA_RE.get_or_init(|| Regex::new(r"^<p>|</p>$").expect("paragraph pattern"));
    re.replace_all(text, "").into_owned()
}
