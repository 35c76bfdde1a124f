use crate::error::{Error, Result};
use crate::expr::{Globals, Resolver};
use crate::reactive::{Observable, Runtime};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// One level of the variable environment.
///
/// Reads walk from this level up to the root. Writes update the nearest level
/// that already defines the name; only [`Scope::define`] creates bindings.
/// Children hold their parent; parents never hold children.
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

struct ScopeInner {
    variables: Observable,
    parent: Option<Scope>,
    globals: Rc<Globals>,
}

impl Scope {
    pub fn root(runtime: &Runtime) -> Self {
        Self::root_with_globals(runtime, Globals::standard())
    }

    pub fn root_with_globals(runtime: &Runtime, globals: Globals) -> Self {
        Self(Rc::new(ScopeInner {
            variables: runtime.observable(),
            parent: None,
            globals: Rc::new(globals),
        }))
    }

    pub fn child(&self) -> Self {
        Self(Rc::new(ScopeInner {
            variables: self.0.variables.sibling(),
            parent: Some(self.clone()),
            globals: self.0.globals.clone(),
        }))
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    /// Levels above this one.
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    pub fn variables(&self) -> &Observable {
        &self.0.variables
    }

    pub fn globals(&self) -> &Globals {
        &self.0.globals
    }

    /// Binds `name` at this exact level, shadowing any outer binding.
    pub fn define(&self, name: &str, value: impl Into<Value>) {
        self.0.variables.set(name, value.into());
    }

    pub fn read(&self, name: &str) -> Result<Value> {
        self.ancestors()
            .find_map(|scope| scope.0.variables.get(name))
            .ok_or_else(|| Error::name_not_defined(name))
    }

    pub fn write(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let owner = self
            .ancestors()
            .find(|scope| scope.0.variables.contains_untracked(name))
            .ok_or_else(|| Error::name_not_defined(name))?;
        owner.0.variables.set(name, value.into());
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.ancestors()
            .any(|scope| scope.0.variables.contains(name))
    }

    /// This scope followed by each enclosing one.
    pub fn ancestors(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |scope| scope.parent())
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Resolver for Scope {
    fn has(&self, name: &str) -> bool {
        Scope::has(self, name)
    }

    fn read(&self, name: &str) -> Result<Value> {
        Scope::read(self, name)
    }

    fn write(&self, name: &str, value: Value) -> Result<()> {
        Scope::write(self, name, value)
    }

    fn global(&self, name: &str) -> Option<Value> {
        self.0.globals.get(name).cloned()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scope")
            .field("depth", &self.depth())
            .field("variables", &self.0.variables.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_reads_through_to_parent() {
        let runtime = Runtime::default();
        let root = Scope::root(&runtime);
        root.define("title", "hello");
        let child = root.child();
        assert!(child.has("title"));
        assert_eq!(child.read("title").unwrap(), Value::from("hello"));
        assert_eq!(child.depth(), 1);
        assert!(child.parent().is_some_and(|parent| parent.ptr_eq(&root)));
    }

    #[test]
    fn define_is_idempotent_per_level() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        scope.define("x", 1);
        scope.define("x", 2);
        assert_eq!(scope.variables().keys(), vec!["x".to_owned()]);
        assert_eq!(scope.read("x").unwrap(), Value::from(2));
    }

    #[test]
    fn write_without_binding_fails() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime).child();
        assert_eq!(
            scope.write("missing", 1).unwrap_err(),
            Error::name_not_defined("missing")
        );
        assert!(!scope.has("missing"));
    }

    #[test]
    fn globals_are_not_bindings() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        assert!(!scope.has("Math"));
        assert!(Resolver::global(&scope, "Math").is_some());
        assert!(scope.read("Math").is_err());
    }
}
