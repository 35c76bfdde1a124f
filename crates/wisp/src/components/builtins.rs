use super::Invocation;
use crate::binder;
use crate::dom::Node;
use crate::error::Result;

/// `<let :name="expr" ...>`: every prop becomes a variable of a new child
/// scope, kept in sync reactively; the default slot renders in that scope.
pub fn let_binding(cx: &Invocation<'_>) -> Result<Option<Vec<Node>>> {
    let inner = cx.scope.child();
    for (name, accessor) in cx.props.iter() {
        let name = name.to_owned();
        let accessor = accessor.clone();
        let inner = inner.clone();
        cx.run_reactively(move || {
            inner.define(&name, accessor()?);
            Ok(())
        });
    }
    cx.slots.default_slot().render(&inner).map(Some)
}

/// `<effect>expr</effect>`: runs the raw body as an expression for its side
/// effects, again whenever what it read changes. Leaves nothing behind.
///
/// The body is trusted template code and runs with full access to the scope.
pub fn effect(cx: &Invocation<'_>) -> Result<Option<Vec<Node>>> {
    let body = cx.element.text_content();
    if body.trim().is_empty() {
        return Ok(None);
    }
    let expression = match binder::bind(&body) {
        Ok(expression) => expression,
        Err(error) => {
            cx.report(error);
            return Ok(None);
        }
    };
    let scope = cx.scope.clone();
    cx.run_reactively(move || expression.evaluate(&scope).map(drop));
    Ok(None)
}

/// `<if :condition="expr">`: one wrapper for the tag's lifetime, filled with a
/// fresh render of the default slot while the condition is truthy.
pub fn conditional(cx: &Invocation<'_>) -> Result<Option<Vec<Node>>> {
    let condition = cx.props.require(cx.tag, "condition")?.clone();
    let wrapper = cx.wrapper();
    let target = wrapper.clone();
    let slot = cx.slots.default_slot().clone();
    let scope = cx.scope.clone();
    cx.run_reactively(move || {
        if condition()?.is_truthy() {
            target.replace_children(slot.render(&scope)?);
        } else {
            target.replace_children(Vec::new());
        }
        Ok(())
    });
    Ok(Some(vec![wrapper]))
}
