//! Named string variables shared by every macro run on one interpreter.

use std::collections::HashMap;

/// Name → value map.  Writes replace; names are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    values: HashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every `{name}` in `text` for which `lookup` returns a value.
    /// Unknown placeholders are left untouched.
    pub fn substitute<'a, F>(text: &str, mut lookup: F) -> String
    where
        F: FnMut(&str) -> Option<std::borrow::Cow<'a, str>>,
    {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match lookup(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Expands `{name}` placeholders from this store.
    pub fn expand(&self, text: &str) -> String {
        Self::substitute(text, |name| self.get(name).map(std::borrow::Cow::Borrowed))
    }
}
