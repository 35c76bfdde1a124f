//! Recursive template processor.
//!
//! Registered tags are expanded through their handler, plain elements get
//! their `:attr` and `@event` bindings and are descended into, text nodes are
//! split into literal and live parts. Everything else is left alone.

use crate::binder::{self, BoundExpression};
use crate::components::{Component, Invocation, Props, Registry, Slots};
use crate::config::Config;
use crate::dom::Node;
use crate::error::{Error, Result};
use crate::interpolate::{self, Segment};
use crate::reactive::Runtime;
use crate::scope::Scope;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone)]
pub struct Walker(Rc<WalkerInner>);

struct WalkerInner {
    runtime: Runtime,
    registry: Registry,
    config: Config,
    diagnostics: RefCell<Vec<Error>>,
}

impl Walker {
    pub fn new(runtime: Runtime, registry: Registry, config: Config) -> Self {
        Self(Rc::new(WalkerInner {
            runtime,
            registry,
            config,
            diagnostics: RefCell::default(),
        }))
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    pub fn registry(&self) -> &Registry {
        &self.0.registry
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn wrapper(&self) -> Node {
        Node::element(&self.0.config.wrapper_tag)
    }

    /// Records a problem that does not stop the walk.
    pub fn report(&self, error: Error) {
        log::warn!("{error}");
        self.0.diagnostics.borrow_mut().push(error);
    }

    pub fn diagnostics(&self) -> Vec<Error> {
        self.0.diagnostics.borrow().clone()
    }

    pub fn take_diagnostics(&self) -> Vec<Error> {
        std::mem::take(&mut *self.0.diagnostics.borrow_mut())
    }

    /// Processes `node` in place and returns what now stands where it was:
    /// the node itself, its replacement wrapper, or `None` if it was removed.
    pub fn walk(&self, node: &Node, scope: &Scope) -> Result<Option<Node>> {
        if node.is_text() {
            return Ok(Some(self.interpolate(node, scope)));
        }
        let Some(tag) = node.tag_name() else {
            return Ok(Some(node.clone()));
        };
        if let Some(component) = self.0.registry.get(tag) {
            return self.expand(node, tag, component.as_ref(), scope);
        }
        self.bind_attributes(node, scope);
        for child in node.children() {
            if let Err(error) = self.walk(&child, scope) {
                node.release();
                return Err(error);
            }
        }
        Ok(Some(node.clone()))
    }

    /// Deep-copies each node and walks the copies. On failure nothing rendered
    /// so far keeps running.
    pub fn render_nodes(&self, nodes: &[Node], scope: &Scope) -> Result<Vec<Node>> {
        let mut rendered = Vec::with_capacity(nodes.len());
        for node in nodes {
            let copy = node.deep_clone();
            match self.walk(&copy, scope) {
                Ok(Some(node)) => rendered.push(node),
                Ok(None) => {}
                Err(error) => {
                    copy.release();
                    for node in &rendered {
                        node.release();
                    }
                    return Err(error);
                }
            }
        }
        Ok(rendered)
    }

    fn expand(
        &self,
        element: &Node,
        tag: &str,
        component: &dyn Component,
        scope: &Scope,
    ) -> Result<Option<Node>> {
        log::debug!("expanding <{tag}>");
        let mut diagnostics = Vec::new();
        let props = Props::extract(element, scope, &mut diagnostics);
        let slots = Slots::extract(element, self, &mut diagnostics)?;
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
        let cx = Invocation::new(tag, &props, scope, &slots, element, self);
        let output = component.render(&cx);
        let bindings = cx.into_bindings();
        let output = match output {
            Ok(output) => output,
            Err(error) => {
                for binding in &bindings {
                    binding.dispose();
                }
                return Err(error);
            }
        };
        match output {
            Some(nodes) => {
                let wrapper = self.wrapper();
                wrapper.append_all(nodes);
                wrapper.own_all(bindings);
                element.replace_with(vec![wrapper.clone()]);
                Ok(Some(wrapper))
            }
            None => match element.parent() {
                Some(parent) => {
                    parent.own_all(bindings);
                    element.remove();
                    Ok(None)
                }
                // Detached (slot content): an empty text node carries the runs instead.
                None => {
                    let placeholder = Node::text("");
                    placeholder.own_all(bindings);
                    element.release();
                    Ok(Some(placeholder))
                }
            },
        }
    }

    fn bind_attributes(&self, element: &Node, scope: &Scope) {
        for (name, source) in element.attributes() {
            if let Some(attribute) = name.strip_prefix(':') {
                match binder::bind(&source) {
                    Ok(expression) => self.bind_attribute(element, attribute, expression, scope),
                    Err(error) => self.report(error),
                }
            } else if let Some(event) = name.strip_prefix('@') {
                match binder::bind(&source) {
                    Ok(expression) => self.bind_event(element, event, expression, scope),
                    Err(error) => self.report(error),
                }
            }
        }
    }

    fn bind_attribute(
        &self,
        element: &Node,
        attribute: &str,
        expression: BoundExpression,
        scope: &Scope,
    ) {
        let target = element.clone();
        let attribute = attribute.to_owned();
        let scope = scope.clone();
        let disposer = self.0.runtime.run_reactively(move || {
            let value = expression.evaluate(&scope)?;
            target.set_attribute(&attribute, value.to_string());
            Ok(())
        });
        element.own(disposer);
    }

    /// The handler scope is created once; `$event` is redefined in it per firing.
    fn bind_event(&self, element: &Node, event: &str, expression: BoundExpression, scope: &Scope) {
        let event_scope = scope.child();
        let runtime = self.0.runtime.downgrade();
        element.add_event_listener(event, move |event| {
            event_scope.define("$event", event.to_value());
            if let Err(error) = expression.evaluate(&event_scope) {
                match runtime.upgrade() {
                    Some(runtime) => runtime.report_failure(error),
                    None => log::error!("{error}"),
                }
            }
        });
    }

    fn interpolate(&self, text: &Node, scope: &Scope) -> Node {
        let segments = match interpolate::parse(&text.text_content()) {
            Ok(segments) => segments,
            Err(error) => {
                self.report(error);
                return text.clone();
            }
        };
        let wrapper = self.wrapper();
        for segment in segments {
            match segment {
                Segment::Literal(literal) => wrapper.append(Node::text(literal)),
                Segment::Dynamic(expression) => {
                    let live = Node::text("");
                    let target = live.clone();
                    let scope = scope.clone();
                    let disposer = self.0.runtime.run_reactively(move || {
                        target.set_text(expression.evaluate(&scope)?.to_string());
                        Ok(())
                    });
                    live.own(disposer);
                    wrapper.append(live);
                }
            }
        }
        text.replace_with(vec![wrapper.clone()]);
        wrapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;
    use crate::value::Value;

    fn setup(markup: &str) -> (Walker, Scope, Node) {
        let runtime = Runtime::default();
        let walker = Walker::new(runtime.clone(), Registry::with_builtins(), Config::default());
        let scope = Scope::root(&runtime);
        let document = dom::parse(markup).unwrap();
        (walker, scope, document)
    }

    #[test]
    fn attribute_binding_follows_the_scope() {
        let (walker, scope, document) = setup(r#"<p :class="kind"></p>"#);
        scope.define("kind", "big");
        let paragraph = document.children()[0].clone();
        walker.walk(&paragraph, &scope).unwrap();
        assert_eq!(paragraph.attribute("class").as_deref(), Some("big"));
        scope.write("kind", "small").unwrap();
        assert_eq!(paragraph.attribute("class").as_deref(), Some("small"));
        assert_eq!(paragraph.binding_count(), 1);
    }

    #[test]
    fn text_is_replaced_by_a_wrapper() {
        let (walker, scope, document) = setup("<p>a {{ 1 + 1 }} b</p>");
        let paragraph = document.children()[0].clone();
        walker.walk(&paragraph, &scope).unwrap();
        assert_eq!(paragraph.to_html(), "<p><span>a 2 b</span></p>");
        assert_eq!(paragraph.children()[0].child_count(), 3);
    }

    #[test]
    fn event_binding_defines_event_in_a_child_scope() {
        let (walker, scope, document) =
            setup(r#"<button id="b" @click="last = $event.type; clicks += 1"></button>"#);
        scope.define("clicks", 0);
        scope.define("last", Value::Null);
        let button = document.children()[0].clone();
        walker.walk(&button, &scope).unwrap();
        button.dispatch("click", Value::Undefined);
        button.dispatch("click", Value::Undefined);
        assert_eq!(scope.read("clicks").unwrap(), Value::from(2));
        assert_eq!(scope.read("last").unwrap(), Value::from("click"));
        assert!(!scope.has("$event"));
    }

    #[test]
    fn failing_event_handler_is_recorded() {
        let (walker, scope, document) = setup(r#"<button @click="missing += 1"></button>"#);
        let button = document.children()[0].clone();
        walker.walk(&button, &scope).unwrap();
        button.dispatch("click", Value::Undefined);
        assert_eq!(
            walker.runtime().take_failures(),
            vec![Error::name_not_defined("missing")]
        );
    }

    #[test]
    fn far_out_of_range_index_write_fails_locally() {
        let (walker, scope, document) =
            setup(r#"<button @click="items[100000000000] = 1">{{ items.length }}</button>"#);
        scope.define("items", Value::list([]));
        let button = document.children()[0].clone();
        walker.walk(&button, &scope).unwrap();
        button.dispatch("click", Value::Undefined);
        let failures = walker.runtime().take_failures();
        assert!(matches!(failures.as_slice(), [Error::TypeMismatch(_)]));
        assert_eq!(button.text_content(), "0");
    }

    #[test]
    fn syntax_errors_skip_the_binding() {
        let (walker, scope, document) = setup(r#"<p :title="1 +">{{ ) }}</p>"#);
        let paragraph = document.children()[0].clone();
        walker.walk(&paragraph, &scope).unwrap();
        assert_eq!(walker.diagnostics().len(), 2);
        assert!(!paragraph.has_attribute("title"));
        assert_eq!(paragraph.text_content(), "{{ ) }}");
    }

    #[test]
    fn comments_pass_through() {
        let (walker, scope, document) = setup("<!-- {{ x }} -->");
        let comment = document.children()[0].clone();
        let result = walker.walk(&comment, &scope).unwrap().unwrap();
        assert!(result.ptr_eq(&comment));
    }

    #[test]
    fn removed_tag_hands_its_runs_to_the_parent() {
        let (walker, scope, document) = setup("<div><effect>copy = source</effect></div>");
        scope.define("source", 1);
        scope.define("copy", 0);
        let div = document.children()[0].clone();
        walker.walk(&div, &scope).unwrap();
        assert_eq!(div.child_count(), 0);
        assert_eq!(div.binding_count(), 1);
        assert_eq!(scope.read("copy").unwrap(), Value::from(1));
        scope.write("source", 2).unwrap();
        assert_eq!(scope.read("copy").unwrap(), Value::from(2));
        div.remove();
        scope.write("source", 3).unwrap();
        assert_eq!(scope.read("copy").unwrap(), Value::from(2));
    }
}
