use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};
use std::fmt;
use std::rc::Rc;

pub type Object = IndexMap<String, Value>;

/// A dynamically typed value flowing through scopes and expressions.
///
/// Compound values are shared behind `Rc`; mutation goes through `Rc::make_mut`
/// so a write never alters a value another binding still holds.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Rc<Object>),
    Function(NativeFunction),
}

type Callback = dyn Fn(&[Value]) -> Result<Value>;

#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    callback: Rc<Callback>,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, arguments: &[Value]) -> Result<Value> {
        (self.callback)(arguments)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl Value {
    pub fn function(
        name: impl Into<Rc<str>>,
        callback: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Self {
        Self::Function(NativeFunction {
            name: name.into(),
            callback: Rc::new(callback),
        })
    }

    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::Text(text.into())
    }

    pub fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::Object(Rc::new(entries.into_iter().collect()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(items.into_iter().collect()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::List(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::Text(text) => !text.is_empty(),
            Self::List(_) | Self::Object(_) | Self::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined | Self::Object(_) | Self::Function(_) => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(value) => f64::from(u8::from(*value)),
            Self::Number(number) => *number,
            Self::Text(text) => parse_number(text),
            Self::List(_) => parse_number(&self.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// `==` with the usual coercions between numbers, strings and booleans.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined | Self::Null, Self::Undefined | Self::Null) => true,
            (Self::Undefined | Self::Null, _) | (_, Self::Undefined | Self::Null) => false,
            (Self::Number(_) | Self::Bool(_), Self::Text(_) | Self::Bool(_) | Self::Number(_))
            | (Self::Text(_), Self::Number(_) | Self::Bool(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self.strict_eq(other),
        }
    }

    /// `===`: same type and same value, compound values compared by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(&a.callback, &b.callback),
            _ => false,
        }
    }

    /// Reads `self[key]` / `self.key`.
    pub fn property(&self, key: &str) -> Result<Value> {
        Ok(match self {
            Self::Undefined | Self::Null => {
                return Err(Error::type_mismatch(format!(
                    "cannot read properties of {self} (reading '{key}')"
                )));
            }
            Self::Object(object) => object.get(key).cloned().unwrap_or_default(),
            Self::List(items) => match key {
                "length" => Self::Number(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index).cloned())
                    .unwrap_or_default(),
            },
            Self::Text(text) => match key {
                "length" => Self::Number(text.chars().count() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| text.chars().nth(index))
                    .map(|character| Self::text(character.to_string()))
                    .unwrap_or_default(),
            },
            Self::Function(function) if key == "name" => Self::text(function.name()),
            _ => Self::Undefined,
        })
    }

    /// Writes `self[key] = value`, copying the shared container first if needed.
    pub fn set_property(&mut self, key: &str, value: Value) -> Result<()> {
        match self {
            Self::Object(object) => {
                Rc::make_mut(object).insert(key.to_owned(), value);
                Ok(())
            }
            Self::List(items) => {
                let index = key.parse::<usize>().map_err(|_| {
                    Error::type_mismatch(format!("cannot use '{key}' as an array index"))
                })?;
                if index > items.len() {
                    return Err(Error::type_mismatch(format!(
                        "array index {index} out of range for length {}",
                        items.len()
                    )));
                }
                let items = Rc::make_mut(items);
                match items.get_mut(index) {
                    Some(slot) => *slot = value,
                    // One past the end appends.
                    None => items.push(value),
                }
                Ok(())
            }
            other => Err(Error::type_mismatch(format!(
                "cannot set property '{key}' on {}",
                other.type_name()
            ))),
        }
    }

    /// Mutable access to a nested property, used when assigning through a path.
    pub fn property_mut(&mut self, key: &str) -> Result<&mut Value> {
        match self {
            Self::Object(object) => Ok(Rc::make_mut(object).entry(key.to_owned()).or_default()),
            Self::List(items) => {
                let items = Rc::make_mut(items);
                match key.parse::<usize>().ok().filter(|index| *index < items.len()) {
                    Some(index) => Ok(&mut items[index]),
                    None => Err(Error::type_mismatch(format!(
                        "array index '{key}' out of bounds"
                    ))),
                }
            }
            other => Err(Error::type_mismatch(format!(
                "cannot set properties of {} (setting '{key}')",
                other.type_name()
            ))),
        }
    }
}

fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    match text {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

fn format_number(number: f64, f: &mut fmt::Formatter) -> fmt::Result {
    if number.is_nan() {
        f.write_str("NaN")
    } else if number.is_infinite() {
        f.write_str(if number > 0.0 { "Infinity" } else { "-Infinity" })
    } else if number == 0.0 {
        f.write_str("0")
    } else {
        write!(f, "{number}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(number) => format_number(*number, f),
            Self::Text(text) => f.write_str(text),
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    if !matches!(item, Self::Undefined | Self::Null) {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Object(_) => f.write_str("[object Object]"),
            Self::Function(function) => {
                write!(f, "function {}() {{ [native code] }}", function.name)
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Number(number) => write!(f, "Number({number})"),
            Self::Text(text) => write!(f, "Text({text:?})"),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(object) => f.debug_map().entries(object.iter()).finish(),
            Self::Function(function) => fmt::Debug::fmt(function, f),
        }
    }
}

/// Structural equality. Decides whether a write actually changed a variable.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => self.strict_eq(other),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Number(f64::from(number))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(Rc::new(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Self::text(text),
            serde_json::Value::Array(items) => Self::list(items.into_iter().map(Self::from)),
            serde_json::Value::Object(entries) => Self::object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value))),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 9.0e15 => {
                serializer.serialize_i64(*number as i64)
            }
            Self::Number(number) => serializer.serialize_f64(*number),
            Self::Text(text) => serializer.serialize_str(text),
            Self::List(items) => {
                let mut sequence = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    sequence.serialize_element(item)?;
                }
                sequence.end()
            }
            Self::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;
                for (key, value) in object.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Function(function) => {
                serializer.serialize_str(&format!("[function {}]", function.name))
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}
