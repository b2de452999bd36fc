//! Page model the content context exposes to remote operations.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// Most recent events kept per element.
pub const EVENT_HISTORY: usize = 32;

/// Index of an element within its [`Document`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseEventKind {
    MouseDown,
    MouseUp,
    Click,
}

/// A synthetic mouse event delivered to an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub client_x: f64,
    pub client_y: f64,
    pub button: u8,
    pub detail: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Element {
    #[serde(default)]
    pub id: Option<String>,
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rect: Rect,
    /// Most recent events, oldest first, at most [`EVENT_HISTORY`].
    #[serde(skip)]
    pub events: Vec<MouseEvent>,
    #[serde(skip)]
    clicks: usize,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect {
            x,
            y,
            width,
            height,
        };
        self
    }

    /// Upper-cased tag, as `tagName` reports it.
    pub fn tag_name(&self) -> String {
        self.tag.to_ascii_uppercase()
    }

    /// Clicks received over the element's lifetime.
    pub fn click_count(&self) -> usize {
        self.clicks
    }

    fn record(&mut self, event: MouseEvent) {
        if event.kind == MouseEventKind::Click {
            self.clicks += 1;
        }
        if self.events.len() == EVENT_HISTORY {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    fn matches(&self, selector: &Selector) -> bool {
        if let Some(tag) = &selector.tag {
            if !self.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &selector.id {
            if self.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        selector
            .classes
            .iter()
            .all(|c| self.classes.iter().any(|own| own == c))
    }
}

/// The page: document metadata, elements in document order, and the
/// window-level globals visible to expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub globals: Map<String, Value>,
}

fn default_url() -> String {
    "about:blank".to_string()
}

impl Default for Document {
    fn default() -> Self {
        Self {
            title: String::new(),
            url: default_url(),
            elements: Vec::new(),
            globals: Map::new(),
        }
    }
}

impl Document {
    /// Load a page fixture from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let document: Document = serde_json::from_str(&content)?;
        tracing::debug!(
            "Loaded document '{}' with {} elements from {}",
            document.title,
            document.elements.len(),
            path.display()
        );
        Ok(document)
    }

    pub fn push(&mut self, element: Element) -> NodeId {
        self.elements.push(element);
        self.elements.len() - 1
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        self.elements.get(node)
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements
            .iter()
            .position(|e| e.id.as_deref() == Some(id))
    }

    /// First element matching a simple selector (`tag`, `#id`, `.class`, or a
    /// compound of those such as `button.primary`).
    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self.elements.iter().position(|e| e.matches(&selector)))
    }

    /// Deliver mousedown, mouseup and click at the center of the element box.
    pub fn synthesize_mouse_at_center(&mut self, node: NodeId) -> Result<()> {
        let element = self.elements.get_mut(node).ok_or_else(|| {
            BridgeError::Evaluation(format!("TypeError: no element with node id {}", node))
        })?;
        let (client_x, client_y) = element.rect.center();
        for (kind, detail) in [
            (MouseEventKind::MouseDown, 1),
            (MouseEventKind::MouseUp, 1),
            (MouseEventKind::Click, 1),
        ] {
            element.record(MouseEvent {
                kind,
                client_x,
                client_y,
                button: 0,
                detail,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    fn parse(input: &str) -> Result<Self> {
        let invalid = || {
            BridgeError::Evaluation(format!(
                "SyntaxError: '{}' is not a valid selector",
                input
            ))
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut selector = Selector::default();
        let mut rest = trimmed;

        let tag_len = rest
            .find(|c: char| c == '#' || c == '.')
            .unwrap_or(rest.len());
        if tag_len > 0 {
            let tag = &rest[..tag_len];
            if !is_ident(tag) {
                return Err(invalid());
            }
            selector.tag = Some(tag.to_string());
            rest = &rest[tag_len..];
        }

        while let Some(prefix) = rest.chars().next() {
            let body = &rest[1..];
            let len = body
                .find(|c: char| c == '#' || c == '.')
                .unwrap_or(body.len());
            let name = &body[..len];
            if !is_ident(name) {
                return Err(invalid());
            }
            match prefix {
                '#' if selector.id.is_none() => selector.id = Some(name.to_string()),
                '.' => selector.classes.push(name.to_string()),
                _ => return Err(invalid()),
            }
            rest = &body[len..];
        }

        Ok(selector)
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
