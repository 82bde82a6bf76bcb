use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use regex::{Captures, Regex, RegexBuilder};

use crate::core::error::Error as CoreError;
use crate::core::ports::PromptRenderer;

/// Renders `{%name%}` placeholders by plain substitution.
#[derive(Clone)]
pub struct PlaceholderRenderer {
    pattern: Arc<Regex>,
}

impl Default for PlaceholderRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderRenderer {
    pub fn new() -> Self {
        let pattern = RegexBuilder::new(r"\{%(.+?)%\}")
            .dot_matches_new_line(true)
            .build()
            .expect("valid placeholder regex");
        Self {
            pattern: Arc::new(pattern),
        }
    }
}

impl PromptRenderer for PlaceholderRenderer {
    fn placeholders(&self, template: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pattern
            .captures_iter(template)
            .map(|cap| cap[1].to_string())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    fn render(
        &self,
        template: &str,
        variables: &BTreeMap<String, String>,
    ) -> crate::core::Result<String> {
        let missing: Vec<String> = self
            .placeholders(template)
            .into_iter()
            .filter(|name| !variables.contains_key(name))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::Template(format!(
                "no value for placeholder(s): {}",
                missing.join(", ")
            )));
        }

        let rendered = self
            .pattern
            .replace_all(template, |cap: &Captures<'_>| variables[&cap[1]].clone());
        Ok(rendered.into_owned())
    }
}
