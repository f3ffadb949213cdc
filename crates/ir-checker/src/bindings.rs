//! Capture bindings accumulated during one group evaluation.

use std::collections::BTreeMap;

/// Name → captured text. A name is bound at most once per evaluation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<String, String>,
}

/// A capture was matched to a different value than the one already bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("capture '{name}' is bound to '{bound}', cannot rebind to '{attempted}'")]
pub struct BindingConflict {
    pub name: String,
    pub bound: String,
    pub attempted: String,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Bind `name` to `value`. Binding an existing name to an equal value is a no-op.
    pub fn bind(&mut self, name: &str, value: &str) -> Result<(), BindingConflict> {
        match self.values.get(name) {
            Some(bound) if bound == value => Ok(()),
            Some(bound) => Err(BindingConflict {
                name: name.to_string(),
                bound: bound.clone(),
                attempted: value.to_string(),
            }),
            None => {
                self.values.insert(name.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    /// Owned copy for reports.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }
}
