//! Reactive templating over an in-memory document.
//!
//! Markup attributes (`:attr`, `@event`) and text (`{{ expr }}`) are bound to a
//! chain of variable scopes; when a variable changes, only the bindings that
//! read it run again. Custom tags expand through a [`Registry`].

pub mod app;
pub mod binder;
pub mod components;
pub mod config;
pub mod dom;
pub mod error;
pub mod expr;
pub mod interpolate;
pub mod reactive;
pub mod scope;
pub mod value;
pub mod walker;

pub use app::{App, init};
pub use binder::{BoundExpression, bind};
pub use components::{Component, Invocation, Props, Registry, Slot, Slots};
pub use config::Config;
pub use dom::Node;
pub use error::{Error, Result};
pub use reactive::{Disposer, Runtime, Scheduling};
pub use scope::Scope;
pub use value::Value;
pub use walker::Walker;
