//! Host variable substitution

use std::collections::BTreeMap;

/// The host's template service, applied to query text and aliases
pub trait TemplateSrv: Send + Sync {
    fn replace(&self, text: &str) -> String;
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTemplating;

impl TemplateSrv for NoTemplating {
    fn replace(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Fixed set of dashboard variables, referenced as `$name` or `[[name]]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    variables: BTreeMap<String, String>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl FromIterator<(String, String)> for VariableMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            variables: iter.into_iter().collect(),
        }
    }
}

impl TemplateSrv for VariableMap {
    fn replace(&self, text: &str) -> String {
        // longest first so `$hostname` is not eaten by `$host`
        let mut names: Vec<&String> = self.variables.keys().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut out = text.to_string();
        for name in names {
            let value = &self.variables[name];
            out = out.replace(&format!("[[{name}]]"), value);
            out = out.replace(&format!("${name}"), value);
        }
        out
    }
}
