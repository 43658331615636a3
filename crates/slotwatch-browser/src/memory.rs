//! Scripted in-memory [`Page`] for tests.
//!
//! Documents are registered per URL. Each element carries the effect a click
//! (or an Enter key press) has on the page, which is enough to exercise every
//! confirmation path of the engine without a browser.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::page::{Activation, ContextId, ElementInfo, ElementRef, Page, TagAllowList};
use crate::BrowserError;

const LOST_CONTEXT: &str = "Cannot find context with specified id";

/// What happens when an element is activated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Effect {
    #[default]
    Nothing,
    /// Load the document registered for the URL (full navigation).
    Navigate(String),
    /// Change the URL and keep the document (in-page route).
    Route(String),
    /// Show a new button with the given label (partial update).
    Reveal(String),
    /// Hide every element with the given text.
    Hide(String),
}

#[derive(Debug, Clone)]
pub struct MemoryElement {
    info: ElementInfo,
    on_click: Effect,
    on_key: Effect,
    native_click: bool,
}

impl MemoryElement {
    pub fn new(tag: &str, text: &str) -> Self {
        Self {
            info: ElementInfo {
                tag: tag.to_string(),
                text: text.to_string(),
                visible: true,
                ..Default::default()
            },
            on_click: Effect::Nothing,
            on_key: Effect::Nothing,
            native_click: true,
        }
    }

    pub fn link(text: &str) -> Self {
        let mut el = Self::new("a", text);
        el.info.has_href = true;
        el
    }

    pub fn button(text: &str) -> Self {
        Self::new("button", text)
    }

    pub fn submit(value: &str) -> Self {
        let mut el = Self::new("input", value);
        el.info.input_type = Some("submit".into());
        el
    }

    /// Empty `<input type=text>`.
    pub fn text_input() -> Self {
        let mut el = Self::new("input", "");
        el.info.input_type = Some("text".into());
        el
    }

    pub fn span(text: &str) -> Self {
        Self::new("span", text)
    }

    pub fn hidden(mut self) -> Self {
        self.info.visible = false;
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.info.role = Some(role.to_string());
        self
    }

    pub fn alt(mut self, alt: &str) -> Self {
        self.info.alt = Some(alt.to_string());
        self
    }

    pub fn clickable(mut self) -> Self {
        self.info.has_onclick = true;
        self.info.pointer_cursor = true;
        self
    }

    /// Element without a native `click()`; activation is synthetic.
    pub fn synthetic(mut self) -> Self {
        self.native_click = false;
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click = effect;
        self
    }

    pub fn on_key(mut self, effect: Effect) -> Self {
        self.on_key = effect;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    contexts: Vec<Vec<MemoryElement>>,
    regions: HashMap<String, String>,
    body_len: Option<usize>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            contexts: vec![Vec::new()],
            ..Default::default()
        }
    }

    /// Add an element to the main document.
    pub fn with(self, element: MemoryElement) -> Self {
        self.in_frame(0, element)
    }

    /// Add an element to embedded document `frame` (0 is the main document).
    pub fn in_frame(mut self, frame: ContextId, element: MemoryElement) -> Self {
        if self.contexts.len() <= frame {
            self.contexts.resize_with(frame + 1, Vec::new);
        }
        self.contexts[frame].push(element);
        self
    }

    pub fn region(mut self, selector: &str, text: &str) -> Self {
        self.regions.insert(selector.to_string(), text.to_string());
        self
    }

    /// Override the reported body length (defaults to the total text length).
    pub fn body_len(mut self, len: usize) -> Self {
        self.body_len = Some(len);
        self
    }

    fn admitted(&self, context: ContextId, allow: &TagAllowList) -> Vec<&MemoryElement> {
        self.contexts
            .get(context)
            .map(|els| els.iter().filter(|e| allow.admits(&e.info)).collect())
            .unwrap_or_default()
    }
}

struct State {
    documents: HashMap<String, MemoryDocument>,
    unreachable: HashSet<String>,
    current: MemoryDocument,
    url: String,
    generation: u64,
    clicks: Vec<String>,
    key_presses: Vec<String>,
    fills: Vec<String>,
    document_id_failures: usize,
    context_failures: usize,
}

pub struct MemoryPage {
    state: Mutex<State>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                documents: HashMap::new(),
                unreachable: HashSet::new(),
                current: MemoryDocument::new(),
                url: "about:blank".into(),
                generation: 0,
                clicks: Vec::new(),
                key_presses: Vec::new(),
                fills: Vec::new(),
                document_id_failures: 0,
                context_failures: 0,
            }),
        }
    }

    /// Register the document served at `url`.
    pub fn document(self, url: &str, document: MemoryDocument) -> Self {
        self.state().documents.insert(url.to_string(), document);
        self
    }

    /// Make [`Page::goto`] fail for `url`.
    pub fn unreachable(self, url: &str) -> Self {
        self.state().unreachable.insert(url.to_string());
        self
    }

    /// Fail the next `n` [`Page::document_id`] calls as a page that is
    /// between documents would.
    pub fn failing_document_id(self, n: usize) -> Self {
        self.state().document_id_failures = n;
        self
    }

    /// Fail the next `n` [`Page::contexts`] calls.
    pub fn failing_contexts(self, n: usize) -> Self {
        self.state().context_failures = n;
        self
    }

    /// Texts of the elements activated so far, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }

    pub fn key_presses(&self) -> Vec<String> {
        self.state().key_presses.clone()
    }

    /// Texts typed into inputs so far, in order.
    pub fn fills(&self) -> Vec<String> {
        self.state().fills.clone()
    }

    pub fn current_url(&self) -> String {
        self.state().url.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn load(&mut self, url: &str) {
        self.current = self
            .documents
            .get(url)
            .cloned()
            .unwrap_or_else(MemoryDocument::new);
        self.url = url.to_string();
        self.generation += 1;
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Nothing => {}
            Effect::Navigate(url) => self.load(&url),
            Effect::Route(url) => self.url = url,
            Effect::Reveal(label) => {
                if self.current.contexts.is_empty() {
                    self.current.contexts.push(Vec::new());
                }
                self.current.contexts[0].push(MemoryElement::button(&label));
            }
            Effect::Hide(text) => {
                for el in self.current.contexts.iter_mut().flatten() {
                    if el.info.text == text {
                        el.info.visible = false;
                    }
                }
            }
        }
    }

    fn lookup(&self, element: &ElementRef) -> Result<MemoryElement, BrowserError> {
        self.current
            .admitted(element.context, &element.allow)
            .get(element.index)
            .map(|e| (*e).clone())
            .ok_or_else(|| {
                BrowserError::Script(format!(
                    "element {}:{} is gone",
                    element.context, element.index
                ))
            })
    }
}

#[async_trait]
impl Page for MemoryPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        let mut state = self.state();
        if state.unreachable.contains(url) {
            return Err(BrowserError::Navigate {
                url: url.to_string(),
                details: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        state.load(url);
        Ok(())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self.state().url.clone())
    }

    async fn document_id(&self) -> Result<Option<String>, BrowserError> {
        let mut state = self.state();
        if state.document_id_failures > 0 {
            state.document_id_failures -= 1;
            return Err(BrowserError::Script(LOST_CONTEXT.into()));
        }
        Ok(Some(format!("doc-{}", state.generation)))
    }

    async fn contexts(&self) -> Result<Vec<ContextId>, BrowserError> {
        let mut state = self.state();
        if state.context_failures > 0 {
            state.context_failures -= 1;
            return Err(BrowserError::Script(LOST_CONTEXT.into()));
        }
        Ok((0..state.current.contexts.len()).collect())
    }

    async fn elements(
        &self,
        context: ContextId,
        allow: &TagAllowList,
    ) -> Result<Vec<ElementInfo>, BrowserError> {
        let state = self.state();
        Ok(state
            .current
            .admitted(context, allow)
            .into_iter()
            .enumerate()
            .map(|(index, e)| ElementInfo {
                index,
                ..e.info.clone()
            })
            .collect())
    }

    async fn activate(&self, element: &ElementRef) -> Result<Activation, BrowserError> {
        let mut state = self.state();
        let target = state.lookup(element)?;
        state.clicks.push(target.info.text.clone());
        state.apply(target.on_click);
        Ok(if target.native_click {
            Activation::Native
        } else {
            Activation::Synthetic
        })
    }

    async fn press_confirm_key(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let mut state = self.state();
        let target = state.lookup(element)?;
        state.key_presses.push(target.info.text.clone());
        state.apply(target.on_key);
        Ok(())
    }

    async fn fill_text(&self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.lookup(element)?;
        state.fills.push(text.to_string());
        let field = state
            .current
            .contexts
            .get_mut(element.context)
            .and_then(|els| {
                els.iter_mut()
                    .filter(|e| element.allow.admits(&e.info))
                    .nth(element.index)
            });
        if let Some(field) = field {
            field.info.text = text.to_string();
        }
        Ok(())
    }

    async fn visible_labels(&self) -> Result<Vec<String>, BrowserError> {
        let interactive = TagAllowList::buttons();
        let state = self.state();
        Ok(state
            .current
            .contexts
            .iter()
            .flatten()
            .filter(|e| e.info.visible)
            .filter(|e| e.info.tag == "a" || interactive.admits(&e.info))
            .map(|e| e.info.text.clone())
            .filter(|t| !t.is_empty())
            .collect())
    }

    async fn region_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.state().current.regions.get(selector).cloned())
    }

    async fn body_text_len(&self) -> Result<usize, BrowserError> {
        let state = self.state();
        let doc = &state.current;
        Ok(doc.body_len.unwrap_or_else(|| {
            let regions: usize = doc.regions.values().map(|t| t.chars().count()).sum();
            let labels: usize = doc
                .contexts
                .iter()
                .flatten()
                .map(|e| e.info.text.chars().count())
                .sum();
            regions + labels
        }))
    }
}
