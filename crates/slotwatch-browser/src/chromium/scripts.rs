//! Page-side scripts. Each evaluates to `{ ok, value?, error? }`.

use serde_json::Value;

use crate::page::{ContextId, ElementRef, TagAllowList};

/// Helpers shared by every script: frame walk, visibility, text extraction.
const PRELUDE: &str = r#"
const swDocs = () => {
  const out = [];
  const queue = [document];
  const seen = new Set();
  while (queue.length) {
    const doc = queue.shift();
    if (!doc || seen.has(doc)) continue;
    seen.add(doc);
    out.push(doc);
    for (const frame of doc.querySelectorAll('iframe, frame')) {
      try {
        if (frame.contentDocument) queue.push(frame.contentDocument);
      } catch (_e) {}
    }
  }
  return out;
};
const swStyle = (el) => {
  try {
    return (el.ownerDocument.defaultView || window).getComputedStyle(el);
  } catch (_e) {
    return null;
  }
};
const swVisible = (el, style) => {
  const rect = el.getBoundingClientRect();
  if (rect.width <= 0 || rect.height <= 0) return false;
  if (!style) return true;
  return style.visibility !== 'hidden' && style.display !== 'none' && style.opacity !== '0';
};
const swNorm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const swGeneric = new Set(['div', 'span', 'li', 'td', 'th', 'p', 'dd', 'dt', 'section']);
const swText = (el) => {
  const tag = el.tagName.toLowerCase();
  if (tag === 'input') return el.value || '';
  if (swGeneric.has(tag)) {
    return Array.from(el.childNodes)
      .filter((n) => n.nodeType === Node.TEXT_NODE)
      .map((n) => n.textContent)
      .join(' ');
  }
  return el.innerText || el.textContent || '';
};
const swNode = (ctx, css, index) => {
  const doc = swDocs()[ctx];
  return doc ? doc.querySelectorAll(css)[index] || null : null;
};
"#;

const CATCH: &str = "  return { ok: false, error: String(e) };";

fn wrap(body: &str) -> String {
    format!(
        "(() => {{\n{PRELUDE}\ntry {{\n{body}\n}} catch (e) {{\n{CATCH}\n}}\n}})()"
    )
}

fn js(value: impl Into<Value>) -> String {
    value.into().to_string()
}

/// Per-document marker; `null` while the document is still loading.
pub fn document_id() -> String {
    wrap(
        r#"
  if (document.readyState === 'loading') return { ok: true, value: null };
  if (!window.__slotwatchDoc) {
    window.__slotwatchDoc = Date.now().toString(36) + Math.random().toString(36).slice(2);
  }
  return { ok: true, value: window.__slotwatchDoc };
"#,
    )
}

pub fn context_count() -> String {
    wrap("  return { ok: true, value: swDocs().length };")
}

pub fn elements(context: ContextId, allow: &TagAllowList) -> String {
    wrap(&format!(
        r#"
  const doc = swDocs()[{ctx}];
  if (!doc) return {{ ok: true, value: [] }};
  const items = Array.from(doc.querySelectorAll({css})).map((el, index) => {{
    const tag = el.tagName.toLowerCase();
    const style = swStyle(el);
    return {{
      index,
      tag,
      role: el.getAttribute('role'),
      inputType: tag === 'input' ? (el.getAttribute('type') || 'text').toLowerCase() : null,
      text: swNorm(swText(el)),
      title: el.getAttribute('title'),
      ariaLabel: el.getAttribute('aria-label'),
      alt: el.getAttribute('alt'),
      hasHref: el.hasAttribute('href'),
      hasOnclick: el.hasAttribute('onclick') || typeof el.onclick === 'function',
      pointerCursor: !!style && style.cursor === 'pointer',
      visible: swVisible(el, style),
    }};
  }});
  return {{ ok: true, value: items }};
"#,
        ctx = js(context),
        css = js(allow.css()),
    ))
}

pub fn activate(element: &ElementRef) -> String {
    wrap(&format!(
        r#"
  const el = swNode({ctx}, {css}, {index});
  if (!el) return {{ ok: false, error: 'element is gone' }};
  try {{
    el.scrollIntoView({{ block: 'center', inline: 'center' }});
  }} catch (_e) {{}}
  if (typeof el.click === 'function') {{
    el.click();
    return {{ ok: true, value: 'native' }};
  }}
  const view = el.ownerDocument.defaultView || window;
  el.dispatchEvent(new view.MouseEvent('click', {{ bubbles: true, cancelable: true, view }}));
  return {{ ok: true, value: 'synthetic' }};
"#,
        ctx = js(element.context),
        css = js(element.allow.css()),
        index = js(element.index),
    ))
}

pub fn focus(element: &ElementRef) -> String {
    wrap(&format!(
        r#"
  const el = swNode({ctx}, {css}, {index});
  if (!el) return {{ ok: false, error: 'element is gone' }};
  if (!el.hasAttribute('tabindex') && el.tabIndex < 0) el.setAttribute('tabindex', '-1');
  el.focus();
  return {{ ok: true, value: true }};
"#,
        ctx = js(element.context),
        css = js(element.allow.css()),
        index = js(element.index),
    ))
}

pub fn fill_text(element: &ElementRef, text: &str) -> String {
    wrap(&format!(
        r#"
  const el = swNode({ctx}, {css}, {index});
  if (!el) return {{ ok: false, error: 'element is gone' }};
  const view = el.ownerDocument.defaultView || window;
  el.focus();
  el.value = {text};
  el.dispatchEvent(new view.Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new view.Event('change', {{ bubbles: true }}));
  return {{ ok: true, value: true }};
"#,
        ctx = js(element.context),
        css = js(element.allow.css()),
        index = js(element.index),
        text = js(text),
    ))
}

pub fn visible_labels() -> String {
    wrap(
        r#"
  const labels = [];
  const css = 'a, button, input[type=submit], input[type=button], [role=button]';
  for (const doc of swDocs()) {
    for (const el of doc.querySelectorAll(css)) {
      if (!swVisible(el, swStyle(el))) continue;
      const text = swNorm(swText(el));
      if (text) labels.push(text);
      if (labels.length >= 500) return { ok: true, value: labels };
    }
  }
  return { ok: true, value: labels };
"#,
    )
}

pub fn region_text(selector: &str) -> String {
    wrap(&format!(
        r#"
  for (const doc of swDocs()) {{
    const el = doc.querySelector({sel});
    if (el) return {{ ok: true, value: el.innerText || el.textContent || '' }};
  }}
  return {{ ok: true, value: null }};
"#,
        sel = js(selector),
    ))
}

pub fn body_text_len() -> String {
    wrap(
        r#"
  const body = document.body;
  return { ok: true, value: body ? (body.innerText || '').length : 0 };
"#,
    )
}
