//! In-memory document tree the engine walks and mutates in place.

use crate::reactive::Disposer;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub mod markup;
pub use markup::parse;

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is serialized without escaping.
pub const UNESCAPED_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Document,
    Element,
    Text,
    Comment,
    Doctype,
}

type Listener = Rc<dyn Fn(&Event)>;

enum NodeKind {
    Document,
    Element {
        name: String,
        attributes: RefCell<IndexMap<String, String>>,
        listeners: RefCell<Vec<(String, Listener)>>,
    },
    Text(RefCell<String>),
    Comment(String),
    Doctype(String),
}

struct NodeData {
    kind: NodeKind,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
    // Reactive runs whose output lives in this subtree.
    bindings: RefCell<Vec<Disposer>>,
}

#[derive(Clone)]
pub struct Node(Rc<NodeData>);

pub struct Event {
    pub name: String,
    pub target: Node,
    pub detail: Value,
}

impl Event {
    /// What `$event` evaluates to: `{ type, detail, target }`, target being the element's id.
    pub fn to_value(&self) -> Value {
        Value::object([
            ("type".to_owned(), Value::from(self.name.as_str())),
            ("detail".to_owned(), self.detail.clone()),
            (
                "target".to_owned(),
                self.target
                    .attribute("id")
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            ),
        ])
    }
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self(Rc::new(NodeData {
            kind,
            parent: RefCell::default(),
            children: RefCell::default(),
            bindings: RefCell::default(),
        }))
    }

    pub fn document() -> Self {
        Self::new(NodeKind::Document)
    }

    /// Tag names are stored lower-cased.
    pub fn element(name: &str) -> Self {
        Self::new(NodeKind::Element {
            name: name.to_ascii_lowercase(),
            attributes: RefCell::default(),
            listeners: RefCell::default(),
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(RefCell::new(text.into())))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Comment(text.into()))
    }

    pub fn doctype(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Doctype(text.into()))
    }

    pub fn node_type(&self) -> NodeType {
        match self.0.kind {
            NodeKind::Document => NodeType::Document,
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::Doctype(_) => NodeType::Doctype,
        }
    }

    pub fn is_element(&self) -> bool {
        self.node_type() == NodeType::Element
    }

    pub fn is_text(&self) -> bool {
        self.node_type() == NodeType::Text
    }

    pub fn tag_name(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // --- attributes ---

    fn attribute_map(&self) -> Option<&RefCell<IndexMap<String, String>>> {
        match &self.0.kind {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attribute_map()?.borrow().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_map()
            .is_some_and(|attributes| attributes.borrow().contains_key(name))
    }

    /// No-op on anything but elements.
    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        if let Some(attributes) = self.attribute_map() {
            attributes.borrow_mut().insert(name.to_owned(), value.into());
        }
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.attribute_map()
            .map(|attributes| {
                attributes
                    .borrow()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    // --- tree ---

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot; later mutations do not affect the returned list.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    fn index_in_parent(&self, parent: &Node) -> Option<usize> {
        parent
            .0
            .children
            .borrow()
            .iter()
            .position(|child| child.ptr_eq(self))
    }

    /// Unlinks this node from its parent without disposing anything.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            if let Some(index) = self.index_in_parent(&parent) {
                parent.0.children.borrow_mut().remove(index);
            }
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    pub fn append(&self, child: Node) {
        child.detach();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child);
    }

    pub fn append_all(&self, children: impl IntoIterator<Item = Node>) {
        for child in children {
            self.append(child);
        }
    }

    /// Detaches this node and disposes every binding owned by its subtree.
    pub fn remove(&self) {
        self.detach();
        self.release();
    }

    /// Puts `nodes` where this node was, then disposes this node's bindings.
    /// Without a parent only the disposal happens.
    pub fn replace_with(&self, nodes: Vec<Node>) {
        if let Some(parent) = self.parent() {
            for node in &nodes {
                node.detach();
            }
            if let Some(index) = self.index_in_parent(&parent) {
                for node in &nodes {
                    *node.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
                }
                parent
                    .0
                    .children
                    .borrow_mut()
                    .splice(index..=index, nodes);
            }
            *self.0.parent.borrow_mut() = Weak::new();
        }
        self.release();
    }

    /// Swaps out every child. The old children are detached and released.
    pub fn replace_children(&self, nodes: Vec<Node>) {
        let old = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in old {
            *child.0.parent.borrow_mut() = Weak::new();
            child.release();
        }
        self.append_all(nodes);
    }

    /// Copy of the subtree: kinds, attributes and text, no listeners or bindings.
    pub fn deep_clone(&self) -> Node {
        let clone = Node::new(match &self.0.kind {
            NodeKind::Document => NodeKind::Document,
            NodeKind::Element {
                name, attributes, ..
            } => NodeKind::Element {
                name: name.clone(),
                attributes: RefCell::new(attributes.borrow().clone()),
                listeners: RefCell::default(),
            },
            NodeKind::Text(text) => NodeKind::Text(RefCell::new(text.borrow().clone())),
            NodeKind::Comment(text) => NodeKind::Comment(text.clone()),
            NodeKind::Doctype(text) => NodeKind::Doctype(text.clone()),
        });
        for child in self.0.children.borrow().iter() {
            clone.append(child.deep_clone());
        }
        clone
    }

    // --- text ---

    /// Own text for text nodes, concatenated descendant text otherwise.
    pub fn text_content(&self) -> String {
        match &self.0.kind {
            NodeKind::Text(text) => text.borrow().clone(),
            NodeKind::Comment(_) | NodeKind::Doctype(_) => String::new(),
            NodeKind::Document | NodeKind::Element { .. } => self
                .0
                .children
                .borrow()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }

    /// Replaces the text of a text node, or all children of an element with one text node.
    pub fn set_text(&self, content: impl Into<String>) {
        match &self.0.kind {
            NodeKind::Text(text) => *text.borrow_mut() = content.into(),
            NodeKind::Element { .. } | NodeKind::Document => {
                self.replace_children(vec![Node::text(content)])
            }
            NodeKind::Comment(_) | NodeKind::Doctype(_) => {}
        }
    }

    // --- events ---

    pub fn add_event_listener(&self, name: &str, listener: impl Fn(&Event) + 'static) {
        if let NodeKind::Element { listeners, .. } = &self.0.kind {
            listeners
                .borrow_mut()
                .push((name.to_owned(), Rc::new(listener)));
        }
    }

    /// Calls this element's listeners for `name`, in registration order.
    /// Returns how many ran. Events do not bubble.
    pub fn dispatch(&self, name: &str, detail: Value) -> usize {
        let NodeKind::Element { listeners, .. } = &self.0.kind else {
            return 0;
        };
        let matching: Vec<Listener> = listeners
            .borrow()
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, listener)| listener.clone())
            .collect();
        let event = Event {
            name: name.to_owned(),
            target: self.clone(),
            detail,
        };
        for listener in &matching {
            listener(&event);
        }
        matching.len()
    }

    // --- queries ---

    /// Descendants in document order, excluding this node.
    pub fn descendants(&self) -> Vec<Node> {
        let mut found = Vec::new();
        self.collect_descendants(&mut found);
        found
    }

    fn collect_descendants(&self, found: &mut Vec<Node>) {
        for child in self.0.children.borrow().iter() {
            found.push(child.clone());
            child.collect_descendants(found);
        }
    }

    pub fn find_all_with_attribute(&self, attribute: &str) -> Vec<Node> {
        self.descendants()
            .into_iter()
            .filter(|node| node.has_attribute(attribute))
            .collect()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Node> {
        self.descendants()
            .into_iter()
            .find(|node| node.attribute("id").as_deref() == Some(id))
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<Node> {
        self.descendants()
            .into_iter()
            .filter(|node| node.tag_name() == Some(tag))
            .collect()
    }

    /// True if `ancestor` is a strict ancestor of this node.
    pub fn is_inside(&self, ancestor: &Node) -> bool {
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if node.ptr_eq(ancestor) {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    // --- bindings ---

    /// Ties a reactive run to this node's lifetime in the tree.
    pub fn own(&self, disposer: Disposer) {
        self.0.bindings.borrow_mut().push(disposer);
    }

    pub fn own_all(&self, disposers: impl IntoIterator<Item = Disposer>) {
        self.0.bindings.borrow_mut().extend(disposers);
    }

    pub fn binding_count(&self) -> usize {
        self.0.bindings.borrow().len()
    }

    /// Disposes the bindings of this node and every descendant.
    pub fn release(&self) {
        let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
        for disposer in bindings {
            disposer.dispose();
        }
        for child in self.children() {
            child.release();
        }
    }

    // --- serialization ---

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        self.write_html(&mut html, false);
        html
    }

    pub fn inner_html(&self) -> String {
        let mut html = String::new();
        let raw = self
            .tag_name()
            .is_some_and(|name| UNESCAPED_TEXT_ELEMENTS.contains(&name));
        for child in self.0.children.borrow().iter() {
            child.write_html(&mut html, raw);
        }
        html
    }

    fn write_html(&self, html: &mut String, raw: bool) {
        match &self.0.kind {
            NodeKind::Document => {
                for child in self.0.children.borrow().iter() {
                    child.write_html(html, false);
                }
            }
            NodeKind::Element {
                name, attributes, ..
            } => {
                html.push('<');
                html.push_str(name);
                for (attribute, value) in attributes.borrow().iter() {
                    html.push(' ');
                    html.push_str(attribute);
                    if !value.is_empty() {
                        html.push_str("=\"");
                        html.push_str(&escape(value, true));
                        html.push('"');
                    }
                }
                html.push('>');
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    return;
                }
                html.push_str(&self.inner_html());
                html.push_str("</");
                html.push_str(name);
                html.push('>');
            }
            NodeKind::Text(text) if raw => html.push_str(&text.borrow()),
            NodeKind::Text(text) => html.push_str(&escape(&text.borrow(), false)),
            NodeKind::Comment(text) => {
                html.push_str("<!--");
                html.push_str(text);
                html.push_str("-->");
            }
            NodeKind::Doctype(text) => {
                html.push_str("<!");
                html.push_str(text);
                html.push('>');
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(character),
        }
    }
    escaped
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Document => write!(f, "#document"),
            NodeKind::Element { name, .. } => write!(f, "<{name}>"),
            NodeKind::Text(text) => write!(f, "#text({:?})", text.borrow()),
            NodeKind::Comment(text) => write!(f, "#comment({text:?})"),
            NodeKind::Doctype(text) => write!(f, "#doctype({text:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use std::cell::Cell;

    #[test]
    fn append_moves_a_node_between_parents() {
        let first = Node::element("div");
        let second = Node::element("div");
        let child = Node::text("x");
        first.append(child.clone());
        second.append(child.clone());
        assert_eq!(first.child_count(), 0);
        assert!(child.parent().is_some_and(|parent| parent.ptr_eq(&second)));
    }

    #[test]
    fn replace_with_keeps_position() {
        let list = Node::element("ul");
        let [a, b, c] = ["a", "b", "c"].map(|text| {
            let item = Node::element("li");
            item.append(Node::text(text));
            item
        });
        list.append_all([a, b.clone(), c]);
        b.replace_with(vec![Node::text("1"), Node::text("2")]);
        assert_eq!(list.to_html(), "<ul><li>a</li>12<li>c</li></ul>");
        assert!(b.parent().is_none());
    }

    #[test]
    fn removing_a_subtree_disposes_its_bindings() {
        let runtime = Runtime::default();
        let outer = Node::element("div");
        let inner = Node::element("p");
        outer.append(inner.clone());
        inner.own(runtime.run_reactively(|| Ok(())));
        outer.own(runtime.run_reactively(|| Ok(())));
        assert_eq!(runtime.live_effects(), 2);
        outer.remove();
        assert_eq!(runtime.live_effects(), 0);
        assert_eq!(inner.binding_count(), 0);
    }

    #[test]
    fn deep_clone_drops_listeners() {
        let button = Node::element("button");
        button.set_attribute("id", "go");
        button.append(Node::text("Go"));
        let clicks = Rc::new(Cell::new(0));
        button.add_event_listener("click", {
            let clicks = clicks.clone();
            move |_| clicks.set(clicks.get() + 1)
        });
        let copy = button.deep_clone();
        assert_eq!(copy.to_html(), button.to_html());
        assert_eq!(copy.dispatch("click", Value::Undefined), 0);
        assert_eq!(button.dispatch("click", Value::Undefined), 1);
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn serialization_escapes_text_and_attributes() {
        let element = Node::element("P");
        element.set_attribute("title", "a \"b\" & c");
        element.set_attribute("hidden", "");
        element.append(Node::text("1 < 2"));
        assert_eq!(
            element.to_html(),
            "<p title=\"a &quot;b&quot; &amp; c\" hidden>1 &lt; 2</p>"
        );
    }

    #[test]
    fn event_value_exposes_type_detail_and_target() {
        let input = Node::element("input");
        input.set_attribute("id", "name");
        let event = Event {
            name: "input".into(),
            target: input,
            detail: "x".into(),
        };
        let value = event.to_value();
        assert_eq!(value.property("type").unwrap(), Value::from("input"));
        assert_eq!(value.property("target").unwrap(), Value::from("name"));
        assert_eq!(value.property("detail").unwrap(), Value::from("x"));
    }
}
