//! Named element groups sharing a root selector prefix.
//!
//! A group maps member names to elements whose effective selector is
//! `root + " " + member` (root optional). Groups are built once by an
//! explicit builder and never grow members afterwards; formatting applies
//! one substitution across the root and every member in a single pass, so
//! no observer can see a half-formatted group.

use std::collections::BTreeMap;
use std::fmt;

use crate::controller::Session;
use crate::driver::Driver;
use crate::element::Element;
use crate::errors::{PageError, Result};
use crate::template::TemplateParams;
use crate::types::SelectorKind;

/// Reserved: the root prefix is metadata, never an enumerable member.
const ROOT_KEY: &str = "root";

pub struct Group<D: Driver> {
    root: Option<String>,
    members: BTreeMap<String, Element<D>>,
}

impl<D: Driver> Group<D> {
    pub fn builder(session: Session<D>) -> GroupBuilder<D> {
        GroupBuilder::new(session, None)
    }

    /// Declared root selector template, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn member(&self, name: &str) -> Option<&Element<D>> {
        self.members.get(name)
    }

    pub fn member_mut(&mut self, name: &str) -> Option<&mut Element<D>> {
        self.members.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element<D>)> {
        self.members.iter().map(|(name, element)| (name.as_str(), element))
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = &Element<D>> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Substitute `params` across the root and every member atomically.
    ///
    /// Each member's raw template embeds the root prefix, so one pass over
    /// the members covers root placeholders too. Partial formatting of a
    /// subset of members is not a supported state.
    pub fn format(&mut self, params: &TemplateParams) -> &mut Self {
        for element in self.members.values_mut() {
            element.format(params);
        }
        self
    }

    pub fn check(&self) -> CheckGroup<'_, D> {
        CheckGroup::new(self)
    }
}

impl<D: Driver> fmt::Debug for Group<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("root", &self.root)
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct GroupBuilder<D: Driver> {
    session: Session<D>,
    base_root: Option<String>,
    root: Option<String>,
    kind: SelectorKind,
    members: Vec<(String, String)>,
}

impl<D: Driver> GroupBuilder<D> {
    pub(crate) fn new(session: Session<D>, base_root: Option<String>) -> Self {
        Self {
            session,
            base_root,
            root: None,
            kind: SelectorKind::default(),
            members: Vec::new(),
        }
    }

    /// Root selector prefix shared by every member. May itself contain
    /// template placeholders.
    pub fn root(mut self, selector: impl Into<String>) -> Self {
        self.root = Some(selector.into());
        self
    }

    pub fn kind(mut self, kind: SelectorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn member(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.members.push((name.into(), selector.into()));
        self
    }

    pub fn build(self) -> Result<Group<D>> {
        let root = join_roots(self.base_root, self.root);
        let mut members = BTreeMap::new();
        for (name, selector) in self.members {
            if name == ROOT_KEY {
                return Err(PageError::ConfigurationError(format!(
                    "{:?} is reserved for the group root and cannot name a member",
                    ROOT_KEY
                )));
            }
            let effective = match root.as_deref() {
                Some(prefix) if !prefix.is_empty() => format!("{} {}", prefix, selector),
                _ => selector,
            };
            let element = Element::new(self.session.clone(), effective, self.kind)?;
            if members.insert(name.clone(), element).is_some() {
                return Err(PageError::ConfigurationError(format!(
                    "duplicate group member {:?}",
                    name
                )));
            }
        }
        Ok(Group { root, members })
    }
}

fn join_roots(base: Option<String>, root: Option<String>) -> Option<String> {
    match (base, root) {
        (Some(base), Some(root)) => Some(format!("{} {}", base, root)),
        (Some(base), None) => Some(base),
        (None, root) => root,
    }
}

/// All-or-nothing predicates across every declared member.
///
/// Mirrors `Checks`: unanimity is required and an empty group fails
/// closed.
pub struct CheckGroup<'a, D: Driver> {
    group: &'a Group<D>,
}

impl<'a, D: Driver> Clone for CheckGroup<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: Driver> Copy for CheckGroup<'a, D> {}

impl<'a, D: Driver> CheckGroup<'a, D> {
    pub(crate) fn new(group: &'a Group<D>) -> Self {
        Self { group }
    }

    pub async fn available(self) -> Result<bool> {
        if self.group.is_empty() {
            return Ok(false);
        }
        for element in self.group.members() {
            if !element.check().available().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn unavailable(self) -> Result<bool> {
        if self.group.is_empty() {
            return Ok(false);
        }
        for element in self.group.members() {
            if !element.check().unavailable().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn visible(self) -> Result<bool> {
        if self.group.is_empty() {
            return Ok(false);
        }
        for element in self.group.members() {
            if !element.check().visible().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn invisible(self) -> Result<bool> {
        if self.group.is_empty() {
            return Ok(false);
        }
        for element in self.group.members() {
            if !element.check().invisible().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn enabled(self) -> Result<bool> {
        if self.group.is_empty() {
            return Ok(false);
        }
        for element in self.group.members() {
            if !element.check().enabled().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn disabled(self) -> Result<bool> {
        if self.group.is_empty() {
            return Ok(false);
        }
        for element in self.group.members() {
            if !element.check().disabled().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_session;
    use serde_json::json;

    const PAGE: &str = r#"
        <html><body>
            <todo-task id="task-1" class="task"><h4>first</h4><span class="owner">ann</span></todo-task>
            <todo-task id="task-2" class="task"><h4>second</h4><span class="owner">ben</span></todo-task>
        </body></html>
    "#;

    #[tokio::test]
    async fn members_share_the_root_prefix() {
        let session = test_session(PAGE);
        let card = session
            .group()
            .root("todo-task#task-1")
            .member("title", "h4")
            .member("owner", "span.owner")
            .build()
            .unwrap();
        assert_eq!(card.member("title").unwrap().selector(), "todo-task#task-1 h4");
        assert_eq!(
            card.member("owner").unwrap().selector(),
            "todo-task#task-1 span.owner"
        );
        assert_eq!(
            card.member("title").unwrap().text(false).await.unwrap(),
            Some("first".to_string())
        );
    }

    #[tokio::test]
    async fn empty_root_leaves_member_selectors_alone() {
        let session = test_session(PAGE);
        let group = session
            .group()
            .member("tasks", "todo-task#task-2 h4")
            .build()
            .unwrap();
        assert_eq!(group.root(), None);
        assert_eq!(
            group.member("tasks").unwrap().selector(),
            "todo-task#task-2 h4"
        );
    }

    #[tokio::test]
    async fn format_substitutes_root_placeholders_across_all_members() {
        let session = test_session(PAGE);
        let mut card = session
            .group()
            .root("body todo-task#task-${id}")
            .member("desc", "h4")
            .member("owner", "span.owner")
            .build()
            .unwrap();
        card.format(&TemplateParams::new().with("id", 1));
        assert_eq!(
            card.member("desc").unwrap().selector(),
            "body todo-task#task-1 h4"
        );
        assert_eq!(
            card.member("owner").unwrap().selector(),
            "body todo-task#task-1 span.owner"
        );
        // raw templates are untouched, so reformatting works
        card.format(&TemplateParams::new().with("id", 2));
        assert_eq!(
            card.member("desc").unwrap().selector(),
            "body todo-task#task-2 h4"
        );
        assert_eq!(
            card.member("desc").unwrap().text(false).await.unwrap(),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn root_is_not_an_enumerable_member() {
        let session = test_session(PAGE);
        let card = session
            .group()
            .root("todo-task#task-1")
            .member("title", "h4")
            .build()
            .unwrap();
        assert!(card.names().all(|name| name != "root"));
        assert_eq!(card.len(), 1);

        let err = session
            .group()
            .member("root", "h4")
            .build()
            .unwrap_err();
        assert!(matches!(err, PageError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn duplicate_member_names_are_rejected() {
        let session = test_session(PAGE);
        let err = session
            .group()
            .member("title", "h4")
            .member("title", "h5")
            .build()
            .unwrap_err();
        assert!(matches!(err, PageError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn group_checks_require_unanimity() {
        let session = test_session(PAGE);
        let mut card = session
            .group()
            .root("todo-task#task-${id}")
            .member("title", "h4")
            .member("owner", "span.owner")
            .build()
            .unwrap();
        card.format(&TemplateParams::new().with("id", 1));
        assert!(card.check().available().await.unwrap());
        assert!(card.check().visible().await.unwrap());

        session
            .driver()
            .set_visible("todo-task#task-1 h4", false)
            .await;
        assert!(!card.check().visible().await.unwrap());
        // one invisible member is not enough for group invisibility either
        assert!(!card.check().invisible().await.unwrap());

        card.format(&TemplateParams::new().with("id", 404));
        assert!(!card.check().available().await.unwrap());
        assert!(card.check().unavailable().await.unwrap());
    }

    #[tokio::test]
    async fn group_enabled_tracks_member_state() {
        let session = test_session(PAGE);
        let card = session
            .group()
            .root("todo-task#task-1")
            .member("title", "h4")
            .member("owner", "span.owner")
            .build()
            .unwrap();
        assert!(card.check().enabled().await.unwrap());
        session
            .driver()
            .set_property_for("todo-task#task-1 h4", "disabled", json!(true))
            .await;
        assert!(!card.check().enabled().await.unwrap());
        assert!(!card.check().disabled().await.unwrap());
    }

    #[tokio::test]
    async fn empty_group_fails_closed() {
        let session = test_session(PAGE);
        let group = session.group().build().unwrap();
        assert!(group.is_empty());
        assert!(!group.check().available().await.unwrap());
        assert!(!group.check().unavailable().await.unwrap());
        assert!(!group.check().visible().await.unwrap());
        assert!(!group.check().disabled().await.unwrap());
    }
}
