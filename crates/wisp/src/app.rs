use crate::components::Registry;
use crate::config::Config;
use crate::dom::Node;
use crate::error::{Error, Result};
use crate::reactive::Runtime;
use crate::scope::Scope;
use crate::value::Value;
use crate::walker::Walker;

/// A mounted document: every root-marked subtree walked once against a shared root scope.
///
/// Dropping the app disposes every reactive run it started.
pub struct App {
    runtime: Runtime,
    scope: Scope,
    walker: Walker,
    document: Node,
    roots: Vec<Node>,
}

impl App {
    /// Walks each element carrying `config.root_marker`. A marked element inside
    /// another marked element is left to the outer walk.
    pub fn mount(document: Node, registry: Registry, config: Config) -> Result<Self> {
        let runtime = Runtime::new(config.scheduling);
        let scope = Scope::root(&runtime);
        for (name, value) in &config.variables {
            scope.define(name, value.clone());
        }
        let mut marked = document.find_all_with_attribute(&config.root_marker);
        if document.has_attribute(&config.root_marker) {
            marked.insert(0, document.clone());
        }
        let candidates = marked.clone();
        marked.retain(|node| !candidates.iter().any(|other| node.is_inside(other)));
        log::debug!("mounting {} root(s)", marked.len());

        let walker = Walker::new(runtime.clone(), registry, config);
        let mut app = Self {
            runtime,
            scope,
            walker,
            document,
            roots: Vec::new(),
        };
        for root in marked {
            if let Some(root) = app.walker.walk(&root, &app.scope)? {
                app.roots.push(root);
            }
        }
        Ok(app)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    pub fn document(&self) -> &Node {
        &self.document
    }

    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    /// Fires `event` on `target`, then runs whatever the handlers invalidated.
    pub fn dispatch(&self, target: &Node, event: &str, detail: Value) -> usize {
        let handled = target.dispatch(event, detail);
        self.runtime.flush();
        handled
    }

    /// Like [`App::dispatch`] with the target looked up by `id`.
    pub fn dispatch_to(&self, id: &str, event: &str, detail: Value) -> Option<usize> {
        let target = self.document.find_by_id(id)?;
        Some(self.dispatch(&target, event, detail))
    }

    pub fn flush(&self) {
        self.runtime.flush();
    }

    /// Failed reactive runs and event handlers.
    pub fn failures(&self) -> Vec<Error> {
        self.runtime.failures()
    }

    /// Non-fatal problems found while walking.
    pub fn diagnostics(&self) -> Vec<Error> {
        self.walker.diagnostics()
    }

    pub fn to_html(&self) -> String {
        self.document.to_html()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.document.release();
    }
}

/// Mounts `document` with the built-in tags and the default configuration.
pub fn init(document: Node) -> Result<App> {
    App::mount(document, Registry::with_builtins(), Config::default())
}
