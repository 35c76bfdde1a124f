use crate::dom::markup::DEFAULT_RAW_TEXT_ELEMENTS;
use crate::error::Result;
use crate::reactive::Scheduling;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Attribute marking the subtrees the engine takes over.
    pub root_marker: String,
    /// Tag of every wrapper element the engine creates.
    pub wrapper_tag: String,
    pub scheduling: Scheduling,
    pub raw_text_elements: Vec<String>,
    /// Defined in the root scope before the first walk.
    pub variables: IndexMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_marker: "wisp-root".to_owned(),
            wrapper_tag: "span".to_owned(),
            scheduling: Scheduling::default(),
            raw_text_elements: DEFAULT_RAW_TEXT_ELEMENTS
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            variables: IndexMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
