// Page snapshot model - an arena of elements kept in document order
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Index of an element inside a [`Document`]. Ids follow document order.
pub type NodeId = usize;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read page snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed page snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serialized form of one element and its subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Direct text of the element, not including children.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub content_editable: bool,
    /// Vertical offset of the element's box in page pixels, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementSnapshot>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ElementSnapshot {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    /// Shorthand for `<input type="...">`.
    pub fn input(input_type: &str) -> Self {
        Self::new("input").attr("type", input_type)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn editable(mut self) -> Self {
        self.content_editable = true;
        self
    }

    pub fn top(mut self, px: f64) -> Self {
        self.top = Some(px);
        self
    }

    pub fn child(mut self, child: ElementSnapshot) -> Self {
        self.children.push(child);
        self
    }
}

/// A page as exported by the page-side script: its URL, the element that had
/// focus, and the element tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    /// `id` attribute of the focused element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<String>,
    pub root: ElementSnapshot,
}

impl PageSnapshot {
    pub fn from_file(path: &Path) -> Result<Self, SnapshotError> {
        let content = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Input,
    Change,
    Submit,
    Click,
}

/// A synthetic event dispatched on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomEvent {
    pub target: NodeId,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    value: String,
    content_editable: bool,
    top: Option<f64>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    // exclusive end of this element's subtree in document order
    end: NodeId,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `id` attribute, or an empty string.
    pub fn id(&self) -> &str {
        self.attr("id").unwrap_or("")
    }

    /// The `name` attribute, or an empty string.
    pub fn name(&self) -> &str {
        self.attr("name").unwrap_or("")
    }

    /// Lowercased `type` of an input; inputs without one are text inputs.
    pub fn input_type(&self) -> String {
        match self.attr("type") {
            Some(t) if !t.trim().is_empty() => t.trim().to_ascii_lowercase(),
            _ if self.is_input() => "text".to_string(),
            _ => String::new(),
        }
    }

    pub fn is_input(&self) -> bool {
        self.tag == "input"
    }

    pub fn is_password_input(&self) -> bool {
        self.is_input() && self.input_type() == "password"
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn own_text(&self) -> &str {
        &self.text
    }

    pub fn is_content_editable(&self) -> bool {
        self.content_editable
    }

    pub fn top(&self) -> Option<f64> {
        self.top
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Mutable page model the classifier and filler work against.
#[derive(Debug, Clone)]
pub struct Document {
    url: String,
    nodes: Vec<Element>,
    events: Vec<DomEvent>,
}

impl Document {
    pub fn new(url: &str, root: &ElementSnapshot) -> Self {
        let mut doc = Self {
            url: url.to_string(),
            nodes: Vec::new(),
            events: Vec::new(),
        };
        doc.push(root, None);
        doc
    }

    /// Build a document from a snapshot, resolving its focused element.
    pub fn from_snapshot(snapshot: &PageSnapshot) -> (Self, Option<NodeId>) {
        let doc = Self::new(&snapshot.url, &snapshot.root);
        let focused = snapshot
            .focused
            .as_deref()
            .and_then(|id| doc.find_by_id(id));
        (doc, focused)
    }

    fn push(&mut self, snapshot: &ElementSnapshot, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Element {
            tag: snapshot.tag.to_ascii_lowercase(),
            attributes: snapshot
                .attributes
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
            text: snapshot.text.clone(),
            value: snapshot.value.clone(),
            content_editable: snapshot.content_editable,
            top: snapshot.top,
            parent,
            children: Vec::new(),
            end: id + 1,
        });

        for child in &snapshot.children {
            let child_id = self.push(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        self.nodes[id].end = self.nodes.len();
        id
    }

    /// Serialize the current state back into a snapshot.
    pub fn to_snapshot(&self, focused: Option<NodeId>) -> PageSnapshot {
        PageSnapshot {
            url: self.url.clone(),
            focused: focused
                .map(|id| self.element(id).id().to_string())
                .filter(|id| !id.is_empty()),
            root: self.snapshot_of(self.root()),
        }
    }

    fn snapshot_of(&self, id: NodeId) -> ElementSnapshot {
        let el = &self.nodes[id];
        ElementSnapshot {
            tag: el.tag.clone(),
            attributes: el.attributes.clone(),
            text: el.text.clone(),
            value: el.value.clone(),
            content_editable: el.content_editable,
            top: el.top,
            children: el.children.iter().map(|&c| self.snapshot_of(c)).collect(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Element> {
        self.nodes.get(id)
    }

    /// Panics if `id` did not come from this document.
    pub fn element(&self, id: NodeId) -> &Element {
        &self.nodes[id]
    }

    /// Every element strictly inside `scope`, in document order.
    pub fn descendants(&self, scope: NodeId) -> impl Iterator<Item = NodeId> {
        let end = self.nodes.get(scope).map_or(scope, |el| el.end);
        (scope + 1)..end
    }

    /// Every element of the page, in document order.
    pub fn all(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes.get(id).and_then(|el| el.parent), move |&p| {
            self.nodes[p].parent
        })
    }

    /// True when `inner` is `outer` or lies inside it.
    pub fn contains(&self, outer: NodeId, inner: NodeId) -> bool {
        self.nodes
            .get(outer)
            .is_some_and(|el| inner >= outer && inner < el.end)
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.all().find(|&n| self.nodes[n].id() == id)
    }

    /// `id` itself or its nearest ancestor with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&n| self.nodes.get(n).is_some_and(|el| el.tag == tag))
    }

    /// The form owning a control: an explicit `form` attribute wins over the
    /// enclosing `<form>`.
    pub fn form_of(&self, id: NodeId) -> Option<NodeId> {
        let el = self.nodes.get(id)?;
        if let Some(form_id) = el.attr("form") {
            if let Some(form) = self.find_by_id(form_id) {
                if self.nodes[form].tag == "form" {
                    return Some(form);
                }
            }
        }
        self.ancestors(id).find(|&n| self.nodes[n].tag == "form")
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(id)?.parent?;
        let siblings = &self.nodes[parent].children;
        let pos = siblings.iter().position(|&c| c == id)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// Text of the element and all of its descendants, whitespace-joined.
    pub fn text_content(&self, id: NodeId) -> String {
        std::iter::once(id)
            .chain(self.descendants(id))
            .map(|n| self.nodes[n].text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All `<input>` elements inside `scope`.
    pub fn inputs_in(&self, scope: NodeId) -> Vec<NodeId> {
        self.descendants(scope)
            .filter(|&n| self.nodes[n].is_input())
            .collect()
    }

    /// All `<input type="password">` elements inside `scope`.
    pub fn password_inputs_in(&self, scope: NodeId) -> Vec<NodeId> {
        self.descendants(scope)
            .filter(|&n| self.nodes[n].is_password_input())
            .collect()
    }

    /// Submit controls anywhere on the page.
    pub fn submit_controls(&self) -> Vec<NodeId> {
        self.all()
            .filter(|&n| {
                let el = &self.nodes[n];
                (el.tag == "button" || el.tag == "input") && el.input_type() == "submit"
            })
            .collect()
    }

    /// Assign a control's value and notify the page with `input` then `change`.
    pub fn set_value(&mut self, id: NodeId, value: &str) {
        if let Some(el) = self.nodes.get_mut(id) {
            el.value = value.to_string();
            self.dispatch(id, EventKind::Input);
            self.dispatch(id, EventKind::Change);
        }
    }

    /// Replace the direct text of a content-editable element.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(el) = self.nodes.get_mut(id) {
            el.text = text.to_string();
        }
    }

    pub fn dispatch(&mut self, target: NodeId, kind: EventKind) {
        self.events.push(DomEvent { target, kind });
    }

    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup_page() -> Document {
        let root = ElementSnapshot::new("body")
            .child(ElementSnapshot::new("h1").text("Create account"))
            .child(
                ElementSnapshot::new("form")
                    .attr("id", "signup")
                    .child(ElementSnapshot::input("email").attr("id", "email"))
                    .child(ElementSnapshot::input("password").attr("id", "pwd"))
                    .child(ElementSnapshot::input("submit").attr("id", "go")),
            )
            .child(ElementSnapshot::input("text").attr("id", "outside").attr("form", "signup"));
        Document::new("https://a.com/signup", &root)
    }

    #[test]
    fn test_document_order_and_subtrees() {
        let doc = signup_page();
        let form = doc.find_by_id("signup").unwrap();
        let pwd = doc.find_by_id("pwd").unwrap();

        assert_eq!(doc.len(), 7);
        assert!(doc.contains(form, pwd));
        assert!(!doc.contains(pwd, form));
        assert_eq!(doc.inputs_in(form).len(), 3);
        assert_eq!(doc.password_inputs_in(doc.root()), vec![pwd]);
    }

    #[test]
    fn test_form_owner() {
        let doc = signup_page();
        let form = doc.find_by_id("signup");
        assert_eq!(doc.form_of(doc.find_by_id("pwd").unwrap()), form);
        assert_eq!(doc.form_of(doc.find_by_id("outside").unwrap()), form);
        assert_eq!(doc.form_of(doc.root()), None);
    }

    #[test]
    fn test_set_value_dispatches_input_then_change() {
        let mut doc = signup_page();
        let pwd = doc.find_by_id("pwd").unwrap();
        doc.set_value(pwd, "secret");

        assert_eq!(doc.element(pwd).value(), "secret");
        let kinds: Vec<_> = doc.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Input, EventKind::Change]);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_values() {
        let mut doc = signup_page();
        let pwd = doc.find_by_id("pwd").unwrap();
        doc.set_value(pwd, "secret");

        let snapshot = doc.to_snapshot(Some(pwd));
        assert_eq!(snapshot.focused.as_deref(), Some("pwd"));

        let json = serde_json::to_string(&snapshot).unwrap();
        let (reloaded, focused) = Document::from_snapshot(&PageSnapshot::from_json(&json).unwrap());
        assert_eq!(focused, Some(pwd));
        assert_eq!(reloaded.element(pwd).value(), "secret");
    }

    #[test]
    fn test_submit_controls_and_siblings() {
        let doc = signup_page();
        let go = doc.find_by_id("go").unwrap();
        let pwd = doc.find_by_id("pwd").unwrap();
        assert_eq!(doc.submit_controls(), vec![go]);
        assert_eq!(doc.previous_element_sibling(go), Some(pwd));
        assert_eq!(doc.text_content(doc.root()), "Create account");
    }
}
