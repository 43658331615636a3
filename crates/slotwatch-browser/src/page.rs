//! The driver seam: everything the engine needs from a live page.
//!
//! A [`Page`] exposes the loaded document as a list of *contexts*: the main
//! document first, then every same-origin embedded document (`iframe`,
//! `frame`) in breadth-first order. Cross-origin frames cannot be scripted and
//! are not listed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::BrowserError;

/// Position of a document in [`Page::contexts`].
pub type ContextId = usize;

/// Snapshot of one allow-listed node, as seen at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
    /// Position among the nodes the allow-list selected in this context.
    pub index: usize,
    /// Lower-case tag name.
    pub tag: String,
    pub role: Option<String>,
    /// Lower-case `type` attribute of `<input>` elements.
    pub input_type: Option<String>,
    /// Visible text. Generic containers (`div`, `span`, `td`, ...) report only
    /// their own direct text so a wrapper never out-matches the control inside
    /// it; inputs report their value.
    pub text: String,
    pub title: Option<String>,
    pub aria_label: Option<String>,
    pub alt: Option<String>,
    pub has_href: bool,
    pub has_onclick: bool,
    pub pointer_cursor: bool,
    pub visible: bool,
}

impl ElementInfo {
    pub fn is_input(&self, kind: &str) -> bool {
        self.tag == "input" && self.input_type.as_deref() == Some(kind)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    /// The text-bearing fields a query may match, in preference order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.text.as_str())
            .chain(self.title.as_deref())
            .chain(self.aria_label.as_deref())
            .chain(self.alt.as_deref())
    }
}

/// CSS selectors limiting which nodes are considered clickable candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAllowList(Vec<String>);

impl TagAllowList {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(selectors.into_iter().map(Into::into).collect())
    }

    /// Anchors only.
    pub fn links() -> Self {
        Self::new(["a"])
    }

    /// Buttons and button-like inputs.
    pub fn buttons() -> Self {
        Self::new([
            "button",
            "input[type=submit]",
            "input[type=button]",
            "[role=button]",
        ])
    }

    pub fn labels() -> Self {
        Self::new(["label"])
    }

    /// Single-line text fields.
    pub fn text_inputs() -> Self {
        Self::new(["input[type=text]", "input[type=search]"])
    }

    pub fn selectors(&self) -> &[String] {
        &self.0
    }

    /// Selector group usable with `querySelectorAll`.
    pub fn css(&self) -> String {
        self.0.join(", ")
    }

    /// Whether a snapshot matches one of the selectors.
    ///
    /// Understands the subset used by the built-in lists: `tag`,
    /// `tag[attr=value]` and `[attr=value]` with `attr` one of `role` or
    /// `type`. Anything else never matches.
    pub fn admits(&self, info: &ElementInfo) -> bool {
        self.0.iter().any(|s| selector_matches(s, info))
    }
}

impl Default for TagAllowList {
    fn default() -> Self {
        Self::new([
            "a",
            "button",
            "[role=button]",
            "input[type=submit]",
            "input[type=button]",
            "input[type=image]",
            "img",
            "area",
            "option",
            "label",
            "div",
            "span",
            "li",
            "td",
            "th",
        ])
    }
}

fn selector_matches(selector: &str, info: &ElementInfo) -> bool {
    let selector = selector.trim();
    let (tag, attr) = match selector.split_once('[') {
        Some((tag, rest)) => match rest.strip_suffix(']') {
            Some(attr) => (tag, Some(attr)),
            None => return false,
        },
        None => (selector, None),
    };
    if !tag.is_empty() && !tag.eq_ignore_ascii_case(&info.tag) {
        return false;
    }
    let Some(attr) = attr else {
        return true;
    };
    let Some((name, value)) = attr.split_once('=') else {
        return false;
    };
    let value = value.trim_matches(|c| c == '"' || c == '\'');
    match name.trim() {
        "role" => info.has_role(value),
        "type" => info.input_type.as_deref() == Some(value),
        _ => false,
    }
}

/// Handle to a node returned by [`Page::elements`].
///
/// Only valid while the document is unchanged; after any navigation or
/// relayout the engine re-resolves instead of reusing handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub context: ContextId,
    pub index: usize,
    pub allow: TagAllowList,
}

/// How an activation was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The node's own `click()`.
    Native,
    /// A dispatched `MouseEvent("click")`.
    Synthetic,
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Load `url` and wait for the navigation to finish.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn url(&self) -> Result<String, BrowserError>;

    /// Identity of the current document, `None` while it is still loading.
    ///
    /// Two calls return the same value exactly when no full navigation
    /// happened in between.
    async fn document_id(&self) -> Result<Option<String>, BrowserError>;

    async fn contexts(&self) -> Result<Vec<ContextId>, BrowserError>;

    /// Allow-listed nodes of one context, in document order.
    async fn elements(
        &self,
        context: ContextId,
        allow: &TagAllowList,
    ) -> Result<Vec<ElementInfo>, BrowserError>;

    /// Scroll the node into view and click it.
    async fn activate(&self, element: &ElementRef) -> Result<Activation, BrowserError>;

    /// Focus the node and send Enter.
    async fn press_confirm_key(&self, element: &ElementRef) -> Result<(), BrowserError>;

    /// Replace the value of a text field, firing `input` and `change`.
    async fn fill_text(&self, element: &ElementRef, text: &str) -> Result<(), BrowserError>;

    /// Texts of the visible interactive nodes across all contexts.
    async fn visible_labels(&self) -> Result<Vec<String>, BrowserError>;

    /// Text of the first node matching `selector` in any context.
    async fn region_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// Length of the main document's body text.
    async fn body_text_len(&self) -> Result<usize, BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(tag: &str) -> ElementInfo {
        ElementInfo {
            tag: tag.into(),
            visible: true,
            ..Default::default()
        }
    }

    #[test]
    fn plain_tag_selectors() {
        let allow = TagAllowList::links();
        assert!(allow.admits(&info("a")));
        assert!(!allow.admits(&info("button")));
    }

    #[test]
    fn attribute_selectors() {
        let allow = TagAllowList::buttons();
        let submit = ElementInfo {
            input_type: Some("submit".into()),
            ..info("input")
        };
        let text_input = ElementInfo {
            input_type: Some("text".into()),
            ..info("input")
        };
        let role_div = ElementInfo {
            role: Some("button".into()),
            ..info("div")
        };
        assert!(allow.admits(&submit));
        assert!(!allow.admits(&text_input));
        assert!(allow.admits(&role_div));
        assert!(!allow.admits(&info("div")));
    }

    #[test]
    fn default_list_covers_containers() {
        let allow = TagAllowList::default();
        for tag in ["a", "button", "label", "div", "span", "td", "img"] {
            assert!(allow.admits(&info(tag)), "{tag}");
        }
        assert!(!allow.admits(&info("script")));
        assert_eq!(allow.css().split(", ").count(), allow.selectors().len());
    }

    #[test]
    fn labels_in_preference_order() {
        let el = ElementInfo {
            text: "検索".into(),
            alt: Some("search".into()),
            ..info("img")
        };
        assert_eq!(el.labels().collect::<Vec<_>>(), vec!["検索", "search"]);
    }
}
