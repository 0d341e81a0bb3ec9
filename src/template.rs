//! Non-strict selector template substitution.
//!
//! Selector templates carry `${name}` (or bare `$name`) placeholders that
//! are filled in by `format` calls. Substitution is non-strict: unresolved
//! placeholders stay verbatim, so partially-parameterized selectors remain
//! usable across reusable component definitions. `$$` escapes a literal `$`.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\$|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("placeholder pattern is a valid regex")
    })
}

/// Named substitution parameters for selector and message templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams {
    values: BTreeMap<String, String>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(name.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.values.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for TemplateParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = TemplateParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Substitute `params` into `template`, leaving unknown placeholders as-is.
pub fn substitute(template: &str, params: &TemplateParams) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            match caps.get(1).or_else(|| caps.get(2)) {
                Some(name) => match params.get(name.as_str()) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                },
                // `$$` escape
                None => "$".to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_braced_placeholders() {
        let params = TemplateParams::new().with("id", 2);
        assert_eq!(
            substitute("todo-task#task-${id}", &params),
            "todo-task#task-2"
        );
    }

    #[test]
    fn substitutes_bare_placeholders() {
        let params = TemplateParams::new().with("name", "save");
        assert_eq!(substitute("button.$name", &params), "button.save");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let params = TemplateParams::new().with("id", 1);
        assert_eq!(
            substitute("row-${id} .cell-${col}", &params),
            "row-1 .cell-${col}"
        );
    }

    #[test]
    fn dollar_dollar_escapes() {
        let params = TemplateParams::new().with("id", 7);
        assert_eq!(substitute("price$$total-${id}", &params), "price$total-7");
    }

    #[test]
    fn substitution_is_idempotent_for_same_params() {
        let params = TemplateParams::new().with("id", 3);
        let once = substitute("todo-task#task-${id}", &params);
        let twice = substitute(&substitute("todo-task#task-${id}", &params), &params);
        assert_eq!(once, twice);
    }

    #[test]
    fn from_iterator_collects_pairs() {
        let params: TemplateParams = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("b"), Some("2"));
    }
}
