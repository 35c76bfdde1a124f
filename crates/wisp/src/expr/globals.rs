use crate::error::Result;
use crate::value::Value;
use indexmap::IndexMap;

/// Names visible to every expression when no scope level defines them.
#[derive(Clone, Debug)]
pub struct Globals {
    values: IndexMap<String, Value>,
}

impl Default for Globals {
    fn default() -> Self {
        Self::standard()
    }
}

impl Globals {
    pub fn empty() -> Self {
        Self {
            values: IndexMap::new(),
        }
    }

    /// `console`, `Math`, the `String`/`Number`/`Boolean` conversions, `NaN` and `Infinity`.
    pub fn standard() -> Self {
        let mut globals = Self::empty();
        globals.insert("console", console());
        globals.insert("Math", math());
        globals.insert(
            "String",
            Value::function("String", |arguments| {
                Ok(Value::from(first(arguments).to_string()))
            }),
        );
        globals.insert(
            "Number",
            Value::function("Number", |arguments| {
                Ok(Value::Number(match arguments.first() {
                    Some(value) => value.to_number(),
                    None => 0.0,
                }))
            }),
        );
        globals.insert(
            "Boolean",
            Value::function("Boolean", |arguments| {
                Ok(Value::Bool(first(arguments).is_truthy()))
            }),
        );
        globals.insert("NaN", Value::Number(f64::NAN));
        globals.insert("Infinity", Value::Number(f64::INFINITY));
        globals
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

fn first(arguments: &[Value]) -> Value {
    arguments.first().cloned().unwrap_or_default()
}

fn joined(arguments: &[Value]) -> String {
    arguments
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn console() -> Value {
    fn method(
        name: &'static str,
        level: log::Level,
    ) -> (String, Value) {
        let callback = move |arguments: &[Value]| -> Result<Value> {
            log::log!(target: "wisp::console", level, "{}", joined(arguments));
            Ok(Value::Undefined)
        };
        (name.to_owned(), Value::function(name, callback))
    }
    Value::object([
        method("log", log::Level::Info),
        method("info", log::Level::Info),
        method("warn", log::Level::Warn),
        method("error", log::Level::Error),
        method("debug", log::Level::Debug),
    ])
}

fn math() -> Value {
    fn unary(name: &'static str, operation: fn(f64) -> f64) -> (String, Value) {
        (
            name.to_owned(),
            Value::function(name, move |arguments| {
                Ok(Value::Number(operation(first(arguments).to_number())))
            }),
        )
    }
    fn fold(name: &'static str, initial: f64, operation: fn(f64, f64) -> f64) -> (String, Value) {
        (
            name.to_owned(),
            Value::function(name, move |arguments| {
                Ok(Value::Number(arguments.iter().fold(initial, |accumulator, value| {
                    let number = value.to_number();
                    if accumulator.is_nan() || number.is_nan() {
                        f64::NAN
                    } else {
                        operation(accumulator, number)
                    }
                })))
            }),
        )
    }
    Value::object([
        unary("abs", f64::abs),
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("round", |number| (number + 0.5).floor()),
        unary("sqrt", f64::sqrt),
        fold("max", f64::NEG_INFINITY, f64::max),
        fold("min", f64::INFINITY, f64::min),
        ("PI".to_owned(), Value::Number(std::f64::consts::PI)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(globals: &Globals, object: &str, method: &str, arguments: &[Value]) -> Value {
        let Some(Value::Function(function)) = globals
            .get(object)
            .and_then(|object| object.property(method).ok())
        else {
            panic!("{object}.{method} is not a function");
        };
        function.call(arguments).unwrap()
    }

    #[test]
    fn math_functions() {
        let globals = Globals::standard();
        assert_eq!(call(&globals, "Math", "max", &[1.into(), 5.into(), 3.into()]), Value::from(5));
        assert_eq!(call(&globals, "Math", "min", &[]), Value::Number(f64::INFINITY));
        assert_eq!(call(&globals, "Math", "round", &[2.5.into()]), Value::from(3));
        assert_eq!(call(&globals, "Math", "round", &[(-2.5).into()]), Value::from(-2));
    }

    #[test]
    fn console_returns_undefined() {
        let globals = Globals::standard();
        assert_eq!(call(&globals, "console", "log", &["hi".into()]), Value::Undefined);
    }

    #[test]
    fn empty_globals_have_no_names() {
        assert_eq!(Globals::empty().names().count(), 0);
        assert!(Globals::standard().names().any(|name| name == "Math"));
    }
}
