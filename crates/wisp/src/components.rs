//! Custom tags: the registry, and the props/slots handed to each handler.

use crate::binder;
use crate::dom::Node;
use crate::error::{Error, Result};
use crate::reactive::{Disposer, Runtime};
use crate::scope::Scope;
use crate::value::Value;
use crate::walker::Walker;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub mod builtins;

/// Expands one occurrence of a custom tag.
///
/// `Some(nodes)` replaces the tag (inside a wrapper); `None` removes it.
/// Returned nodes are used as they are; the walker does not walk them again.
pub trait Component {
    fn render(&self, cx: &Invocation<'_>) -> Result<Option<Vec<Node>>>;
}

impl<F> Component for F
where
    F: Fn(&Invocation<'_>) -> Result<Option<Vec<Node>>>,
{
    fn render(&self, cx: &Invocation<'_>) -> Result<Option<Vec<Node>>> {
        self(cx)
    }
}

/// Tag name to handler. Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct Registry {
    components: HashMap<String, Rc<dyn Component>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `let`, `effect` and `if`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("let", builtins::let_binding)
            .register("effect", builtins::effect)
            .register("if", builtins::conditional);
        registry
    }

    pub fn register(&mut self, name: &str, component: impl Component + 'static) -> &mut Self {
        self.components
            .insert(name.to_ascii_lowercase(), Rc::new(component));
        self
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Component>> {
        self.components.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Registry").field(&self.names()).finish()
    }
}

pub type Accessor = Rc<dyn Fn() -> Result<Value>>;

/// Lazy attribute values of a custom tag.
///
/// `:name="expr"` evaluates `expr` against the enclosing scope on every call;
/// any other attribute yields its literal text.
#[derive(Clone, Default)]
pub struct Props {
    accessors: IndexMap<String, Accessor>,
}

impl Props {
    /// Reads every attribute of `element`. Syntax errors in `:` attributes are
    /// pushed to `diagnostics`, and the prop then fails with that error when read.
    pub fn extract(element: &Node, scope: &Scope, diagnostics: &mut Vec<Error>) -> Self {
        let mut accessors: IndexMap<String, Accessor> = IndexMap::new();
        for (name, value) in element.attributes() {
            match name.strip_prefix(':') {
                Some(prop) => {
                    let accessor: Accessor = match binder::bind(&value) {
                        Ok(expression) => {
                            let scope = scope.clone();
                            Rc::new(move || expression.evaluate(&scope))
                        }
                        Err(error) => {
                            diagnostics.push(error.clone());
                            Rc::new(move || Err(error.clone()))
                        }
                    };
                    accessors.insert(prop.to_owned(), accessor);
                }
                None => {
                    let value = Value::from(value);
                    accessors.insert(name, Rc::new(move || Ok(value.clone())));
                }
            }
        }
        Self { accessors }
    }

    /// Evaluates the prop now.
    pub fn get(&self, name: &str) -> Option<Result<Value>> {
        self.accessors.get(name).map(|accessor| accessor())
    }

    pub fn require(&self, tag: &str, name: &str) -> Result<&Accessor> {
        self.accessors.get(name).ok_or_else(|| Error::MissingProp {
            tag: tag.to_owned(),
            prop: name.to_owned(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Accessor)> {
        self.accessors
            .iter()
            .map(|(name, accessor)| (name.as_str(), accessor))
    }

    pub fn names(&self) -> Vec<&str> {
        self.accessors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

/// Template content captured from a custom tag's children.
#[derive(Clone)]
pub struct Slot {
    nodes: Rc<[Node]>,
    walker: Walker,
}

impl Slot {
    pub fn new(nodes: Vec<Node>, walker: &Walker) -> Self {
        Self {
            nodes: nodes.into(),
            walker: walker.clone(),
        }
    }

    /// The captured originals. They are never walked themselves.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fresh copies of the content, walked against `scope`.
    pub fn render(&self, scope: &Scope) -> Result<Vec<Node>> {
        self.walker.render_nodes(&self.nodes, scope)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Slot").field(&self.nodes).finish()
    }
}

pub const DEFAULT_SLOT: &str = "default";

/// Named slots plus the always-present `default` slot.
#[derive(Clone, Debug)]
pub struct Slots {
    slots: IndexMap<String, Slot>,
}

impl Slots {
    /// Splits `element`'s children into slots.
    ///
    /// A `<slot name="x">` or `<slot #x>` child is captured whole under `x`.
    /// Every other child, whitespace-only text aside, goes to `default`, which
    /// must come first: default content after a named slot is dropped and
    /// reported as [`Error::SlotOrderViolation`] in `diagnostics`.
    /// A `<slot>` with neither form of name fails the whole extraction.
    pub fn extract(element: &Node, walker: &Walker, diagnostics: &mut Vec<Error>) -> Result<Self> {
        let tag = element.tag_name().unwrap_or_default().to_owned();
        let mut slots = IndexMap::new();
        let mut default_nodes = Vec::new();
        let mut named_slot_found = false;
        let mut misplaced = 0;
        for child in element.children() {
            if child.is_text() && child.text_content().trim().is_empty() {
                continue;
            }
            if child.tag_name() == Some("slot") {
                let name = slot_name(&child).ok_or_else(|| Error::MissingSlotNameMarker {
                    tag: tag.clone(),
                })?;
                slots.insert(name, Slot::new(vec![child], walker));
                named_slot_found = true;
            } else if named_slot_found {
                misplaced += 1;
            } else {
                default_nodes.push(child);
            }
        }
        if misplaced > 0 {
            log::warn!(
                "<{tag}>: default slot content must come before named slots, \
                 dropping {misplaced} node(s)"
            );
            diagnostics.push(Error::SlotOrderViolation { tag });
        }
        slots.insert(DEFAULT_SLOT.to_owned(), Slot::new(default_nodes, walker));
        Ok(Self { slots })
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn default_slot(&self) -> &Slot {
        &self.slots[DEFAULT_SLOT]
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }
}

fn slot_name(slot: &Node) -> Option<String> {
    slot.attribute("name").or_else(|| {
        slot.attributes()
            .into_iter()
            .find_map(|(attribute, _)| attribute.strip_prefix('#').map(str::to_owned))
    })
}

/// Everything a handler gets for one tag occurrence.
///
/// Reactive runs started through [`Invocation::run_reactively`] are owned by
/// the tag's output and disposed when that output leaves the tree.
pub struct Invocation<'a> {
    pub tag: &'a str,
    pub props: &'a Props,
    pub scope: &'a Scope,
    pub slots: &'a Slots,
    pub element: &'a Node,
    walker: &'a Walker,
    bindings: RefCell<Vec<Disposer>>,
}

impl<'a> Invocation<'a> {
    pub fn new(
        tag: &'a str,
        props: &'a Props,
        scope: &'a Scope,
        slots: &'a Slots,
        element: &'a Node,
        walker: &'a Walker,
    ) -> Self {
        Self {
            tag,
            props,
            scope,
            slots,
            element,
            walker,
            bindings: RefCell::default(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        self.walker.runtime()
    }

    pub fn walker(&self) -> &Walker {
        self.walker
    }

    pub fn run_reactively(&self, callback: impl FnMut() -> Result<()> + 'static) {
        let disposer = self.walker.runtime().run_reactively(callback);
        self.bindings.borrow_mut().push(disposer);
    }

    /// A new empty element of the configured wrapper tag.
    pub fn wrapper(&self) -> Node {
        self.walker.wrapper()
    }

    /// Records a non-fatal problem with this tag.
    pub fn report(&self, error: Error) {
        self.walker.report(error);
    }

    pub fn into_bindings(self) -> Vec<Disposer> {
        self.bindings.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dom;

    fn walker() -> Walker {
        Walker::new(Runtime::default(), Registry::with_builtins(), Config::default())
    }

    fn tag(markup: &str) -> Node {
        dom::parse(markup).unwrap().children()[0].clone()
    }

    #[test]
    fn registry_is_case_insensitive() {
        let registry = Registry::with_builtins();
        assert!(registry.contains("IF"));
        assert_eq!(registry.names(), vec!["effect", "if", "let"]);
        assert!(!registry.contains("slot"));
    }

    #[test]
    fn props_are_lazy_and_bound_to_the_enclosing_scope() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        scope.define("count", 1);
        let mut diagnostics = Vec::new();
        let card = tag(r#"<card :total="count + 1" title="Hi"></card>"#);
        let props = Props::extract(&card, &scope, &mut diagnostics);
        assert!(diagnostics.is_empty());
        assert_eq!(props.names(), vec!["total", "title"]);
        assert_eq!(props.get("total").unwrap().unwrap(), Value::from(2));
        scope.write("count", 5).unwrap();
        assert_eq!(props.get("total").unwrap().unwrap(), Value::from(6));
        assert_eq!(props.get("title").unwrap().unwrap(), Value::from("Hi"));
    }

    #[test]
    fn prop_syntax_error_is_diagnosed_and_fails_on_read() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        let mut diagnostics = Vec::new();
        let props = Props::extract(&tag(r#"<card :x="1 +"></card>"#), &scope, &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(props.get("x"), Some(Err(Error::Syntax { .. }))));
        assert!(matches!(
            props.require("card", "y"),
            Err(Error::MissingProp { .. })
        ));
    }

    #[test]
    fn named_and_default_slots() {
        let mut diagnostics = Vec::new();
        let card = tag(concat!(
            "<card>\n  <b>body</b> text\n",
            "  <slot name=\"header\">H</slot>\n  <slot #footer>F</slot>\n</card>",
        ));
        let slots = Slots::extract(&card, &walker(), &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(slots.names(), vec!["header", "footer", "default"]);
        assert_eq!(slots.default_slot().nodes().len(), 2);
        assert_eq!(slots.get("footer").unwrap().nodes()[0].text_content(), "F");
    }

    #[test]
    fn default_content_after_named_slot_is_dropped() {
        let mut diagnostics = Vec::new();
        let slots = Slots::extract(
            &tag("<card><slot name=\"x\"></slot>orphan</card>"),
            &walker(),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(
            diagnostics,
            vec![Error::SlotOrderViolation {
                tag: "card".to_owned()
            }]
        );
        assert!(slots.default_slot().is_empty());
        assert!(slots.get("x").is_some());
    }

    #[test]
    fn unnamed_slot_is_fatal() {
        let mut diagnostics = Vec::new();
        let error = Slots::extract(&tag("<card><slot></slot></card>"), &walker(), &mut diagnostics)
            .unwrap_err();
        assert_eq!(
            error,
            Error::MissingSlotNameMarker {
                tag: "card".to_owned()
            }
        );
    }

    #[test]
    fn slot_renders_fresh_copies() {
        let walker = walker();
        let runtime = walker.runtime().clone();
        let scope = Scope::root(&runtime);
        scope.define("name", "Ada");
        let mut diagnostics = Vec::new();
        let card = tag("<card><p>{{ name }}</p></card>");
        let slots = Slots::extract(&card, &walker, &mut diagnostics).unwrap();
        let first = slots.default_slot().render(&scope).unwrap();
        let second = slots.default_slot().render(&scope).unwrap();
        assert!(!first[0].ptr_eq(&second[0]));
        assert_eq!(first[0].to_html(), "<p><span>Ada</span></p>");
        assert_eq!(
            slots.default_slot().nodes()[0].text_content(),
            "{{ name }}"
        );
    }
}
