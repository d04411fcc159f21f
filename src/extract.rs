//! Element extraction from a serialized DOM.
//!
//! A pure read-only traversal that collects heading (`h1`-`h6`) and form-label
//! elements in document order, together with the surrounding context that the
//! classifier feeds to the model. The page itself is never mutated.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Errors surfaced while traversing the document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document is empty or detached")]
    EmptyDocument,
    #[error("invalid element selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Kind of element subject to the WCAG 2.4.6 check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Heading,
    Label,
}

impl ElementKind {
    pub fn label(self) -> &'static str {
        match self {
            ElementKind::Heading => "heading",
            ElementKind::Label => "label",
        }
    }
}

/// One heading or label collected from the page, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    pub kind: ElementKind,
    /// Heading level 1-6; `None` for labels.
    pub level: Option<u8>,
    /// Normalized visible text (or accessible-name fallback).
    pub text: String,
    /// Best-effort description of the surrounding content.
    pub context: String,
    /// Node path usable to re-locate the element in the document.
    pub source_ref: String,
}

const TARGET_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, label";

/// Collect heading and label elements from the serialized DOM, in document
/// order. Elements whose text is empty after normalization and
/// accessible-name fallback are excluded.
pub fn extract_elements(html: &str) -> Result<Vec<PageElement>, ExtractionError> {
    if html.trim().is_empty() {
        return Err(ExtractionError::EmptyDocument);
    }

    let document = Html::parse_document(html);
    let selector = parse_selector(TARGET_SELECTOR)?;

    let mut elements = Vec::new();
    for node in document.root_element().select(&selector) {
        let tag = node.value().name();
        let (kind, level) = match tag {
            "label" => (ElementKind::Label, None),
            _ => {
                let level = tag
                    .strip_prefix('h')
                    .and_then(|suffix| suffix.parse::<u8>().ok());
                match level {
                    Some(level @ 1..=6) => (ElementKind::Heading, Some(level)),
                    _ => continue,
                }
            }
        };

        let text = element_text(&document, &node);
        if text.is_empty() {
            continue;
        }

        let context = match kind {
            ElementKind::Heading => heading_context(&node),
            ElementKind::Label => label_context(&document, &node),
        };

        elements.push(PageElement {
            kind,
            level,
            text,
            context,
            source_ref: node_path(&node),
        });
    }

    Ok(elements)
}

/// Normalize text the way the report compares it: full-width punctuation
/// folded to ASCII, control characters dropped, whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{3000}' => folded.push(' '),
            '！' => folded.push('!'),
            '？' => folded.push('?'),
            '：' => folded.push(':'),
            '；' => folded.push(';'),
            '（' => folded.push('('),
            '）' => folded.push(')'),
            '［' => folded.push('['),
            '］' => folded.push(']'),
            '｛' => folded.push('{'),
            '｝' => folded.push('}'),
            '．' => folded.push('.'),
            '，' => folded.push(','),
            '‼' => folded.push_str("!!"),
            '⁉' => folded.push_str("!?"),
            '⁈' => folded.push_str("?!"),
            '…' => folded.push_str("..."),
            '〜' | '～' => folded.push('~'),
            '―' => folded.push('-'),
            c if c.is_control() => folded.push(' '),
            c => folded.push(c),
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|err| ExtractionError::InvalidSelector {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

/// Visible text of an element. When empty, the accessible name is resolved
/// from `alt`, then `aria-label`, then the text of the `aria-labelledby`
/// target, then (for labels) the `for`-target's `placeholder`, and finally a
/// nested `img[alt]`.
fn element_text(document: &Html, node: &ElementRef<'_>) -> String {
    let text = normalize_text(&node.text().collect::<Vec<_>>().join(" "));
    if !text.is_empty() {
        return text;
    }

    for attr in ["alt", "aria-label"] {
        if let Some(value) = node.value().attr(attr) {
            let value = normalize_text(value);
            if !value.is_empty() {
                return value;
            }
        }
    }

    if let Some(id) = node.value().attr("aria-labelledby") {
        if let Some(referenced) = find_by_id(document, id) {
            let value = normalize_text(&referenced.text().collect::<Vec<_>>().join(" "));
            if !value.is_empty() {
                return value;
            }
        }
    }

    // A label with no name of its own can still borrow the placeholder of
    // the control it points at.
    if let Some(id) = node.value().attr("for") {
        if let Some(control) = find_by_id(document, id) {
            if let Some(placeholder) = control.value().attr("placeholder") {
                let value = normalize_text(placeholder);
                if !value.is_empty() {
                    return value;
                }
            }
        }
    }

    for descendant in node.descendants() {
        if let Some(element) = descendant.value().as_element() {
            if element.name() == "img" {
                if let Some(alt) = element.attr("alt") {
                    let alt = normalize_text(alt);
                    if !alt.is_empty() {
                        return alt;
                    }
                }
            }
        }
    }

    String::new()
}

fn heading_context(node: &ElementRef<'_>) -> String {
    let mut parts = Vec::new();

    if let Some(parent) = node.parent().and_then(ElementRef::wrap) {
        parts.push(format!("within <{}>", parent.value().name()));
    }

    if let Some(before) = adjacent_text(node, Direction::Before) {
        parts.push(format!("preceded by: {before}"));
    }
    if let Some(after) = adjacent_text(node, Direction::After) {
        parts.push(format!("followed by: {after}"));
    }

    parts.join("; ")
}

fn label_context(document: &Html, node: &ElementRef<'_>) -> String {
    let mut parts = Vec::new();

    let control = node
        .value()
        .attr("for")
        .and_then(|id| find_by_id(document, id))
        .or_else(|| nested_control(node));

    if let Some(control) = control {
        let mut description = format!("labels <{}>", control.value().name());
        for attr in ["type", "placeholder", "name"] {
            if let Some(value) = control.value().attr(attr) {
                let value = normalize_text(value);
                if !value.is_empty() {
                    description.push_str(&format!(" {attr}={value}"));
                }
            }
        }
        parts.push(description);
    }

    if let Some(parent) = node.parent().and_then(ElementRef::wrap) {
        parts.push(format!("within <{}>", parent.value().name()));
    }

    parts.join("; ")
}

enum Direction {
    Before,
    After,
}

/// First non-empty text in the given sibling direction, truncated so the
/// prompt stays small. Heuristic only; the classifier treats it as a hint.
fn adjacent_text(node: &ElementRef<'_>, direction: Direction) -> Option<String> {
    let siblings: Box<dyn Iterator<Item = ego_tree::NodeRef<'_, scraper::Node>>> = match direction {
        Direction::Before => Box::new(node.prev_siblings()),
        Direction::After => Box::new(node.next_siblings()),
    };

    for sibling in siblings {
        let text = match sibling.value() {
            scraper::Node::Text(text) => normalize_text(text),
            scraper::Node::Element(_) => ElementRef::wrap(sibling)
                .map(|element| normalize_text(&element.text().collect::<Vec<_>>().join(" ")))
                .unwrap_or_default(),
            _ => continue,
        };
        if !text.is_empty() {
            return Some(truncate(&text, 120));
        }
    }

    None
}

fn nested_control<'a>(node: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    node.descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| {
            matches!(element.value().name(), "input" | "select" | "textarea")
        })
}

fn find_by_id<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().attr("id") == Some(id))
}

/// Node path from the document body down to the element, with 1-based sibling
/// indices for repeated tags. Elements with an id short-circuit to an id
/// reference.
fn node_path(node: &ElementRef<'_>) -> String {
    if let Some(id) = node.value().attr("id") {
        if !id.is_empty() {
            return format!("//*[@id=\"{id}\"]");
        }
    }

    let mut segments = Vec::new();
    let mut current = *node;

    loop {
        let tag = current.value().name();
        if tag == "html" || tag == "body" {
            break;
        }

        let parent = match current.parent().and_then(ElementRef::wrap) {
            Some(parent) => parent,
            None => break,
        };

        let same_tag: Vec<_> = parent
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|sibling| sibling.value().name() == tag)
            .collect();
        let position = same_tag
            .iter()
            .position(|sibling| sibling.id() == current.id())
            .map(|index| index + 1)
            .unwrap_or(1);

        if same_tag.len() > 1 {
            segments.push(format!("{tag}[{position}]"));
        } else {
            segments.push(tag.to_string());
        }

        current = parent;
    }

    segments.reverse();
    format!("/html/body/{}", segments.join("/"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_and_labels_in_document_order() {
        let html = r#"
            <html><body>
                <h1>Introduction</h1>
                <p>Welcome text.</p>
                <h2>Click Here</h2>
                <form>
                    <label for="name">Name</label>
                    <input id="name" type="text" placeholder="Jane Doe">
                </form>
            </body></html>
        "#;

        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 3);

        assert_eq!(elements[0].kind, ElementKind::Heading);
        assert_eq!(elements[0].level, Some(1));
        assert_eq!(elements[0].text, "Introduction");

        assert_eq!(elements[1].kind, ElementKind::Heading);
        assert_eq!(elements[1].level, Some(2));
        assert_eq!(elements[1].text, "Click Here");

        assert_eq!(elements[2].kind, ElementKind::Label);
        assert_eq!(elements[2].level, None);
        assert_eq!(elements[2].text, "Name");
    }

    #[test]
    fn whitespace_only_heading_is_excluded() {
        let html = "<html><body><h1>   \n\t </h1><h2>Real</h2></body></html>";
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "Real");
    }

    #[test]
    fn empty_document_is_an_error() {
        let err = extract_elements("   ").expect_err("empty document should fail");
        assert!(matches!(err, ExtractionError::EmptyDocument));
    }

    #[test]
    fn aria_label_fallback_applies_before_exclusion() {
        let html = r#"<html><body><h2 aria-label="Section overview"></h2></body></html>"#;
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "Section overview");
    }

    #[test]
    fn alt_takes_precedence_over_aria_label() {
        let html =
            r#"<html><body><h2 alt="From alt" aria-label="From aria-label"></h2></body></html>"#;
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "From alt");
    }

    #[test]
    fn aria_labelledby_resolves_to_the_referenced_text() {
        let html = r#"
            <html><body>
                <h2 aria-labelledby="hint"></h2>
                <p id="hint">Section summary</p>
            </body></html>
        "#;
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "Section summary");
    }

    #[test]
    fn empty_label_borrows_the_placeholder_of_its_control() {
        let html = r#"
            <html><body><form>
                <label for="q"></label>
                <input id="q" type="search" placeholder="Search terms">
            </form></body></html>
        "#;
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, ElementKind::Label);
        assert_eq!(elements[0].text, "Search terms");
    }

    #[test]
    fn heading_with_only_img_alt_uses_the_alt_text() {
        let html = r#"<html><body><h1><img src="logo.png" alt="Acme Reports"></h1></body></html>"#;
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "Acme Reports");
    }

    #[test]
    fn label_context_includes_associated_control() {
        let html = r#"
            <html><body><form>
                <label for="email">Email address</label>
                <input id="email" type="email" placeholder="you@example.com" name="email">
            </form></body></html>
        "#;

        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        let context = &elements[0].context;
        assert!(context.contains("labels <input>"), "context: {context}");
        assert!(context.contains("type=email"), "context: {context}");
        assert!(
            context.contains("placeholder=you@example.com"),
            "context: {context}"
        );
    }

    #[test]
    fn label_wrapping_a_control_is_associated_without_for() {
        let html = r#"
            <html><body><form>
                <label>Quantity <input type="number" name="qty"></label>
            </form></body></html>
        "#;

        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        assert!(elements[0].context.contains("labels <input>"));
        assert!(elements[0].context.contains("name=qty"));
    }

    #[test]
    fn heading_context_mentions_surrounding_text() {
        let html = r#"
            <html><body><section>
                <p>Earlier paragraph.</p>
                <h2>Pricing</h2>
                <p>Our plans start at ten dollars.</p>
            </section></body></html>
        "#;

        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements.len(), 1);
        let context = &elements[0].context;
        assert!(context.contains("within <section>"), "context: {context}");
        assert!(
            context.contains("followed by: Our plans start at ten dollars."),
            "context: {context}"
        );
    }

    #[test]
    fn source_ref_prefers_element_id() {
        let html = r#"<html><body><h1 id="main-title">Title</h1></body></html>"#;
        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements[0].source_ref, "//*[@id=\"main-title\"]");
    }

    #[test]
    fn source_ref_indexes_repeated_tags() {
        let html = r#"
            <html><body><div>
                <h2>First</h2>
                <h2>Second</h2>
            </div></body></html>
        "#;

        let elements = extract_elements(html).expect("extraction succeeds");
        assert_eq!(elements[0].source_ref, "/html/body/div/h2[1]");
        assert_eq!(elements[1].source_ref, "/html/body/div/h2[2]");
    }

    #[test]
    fn normalize_folds_full_width_punctuation() {
        assert_eq!(normalize_text("お名前　：（必須）"), "お名前 :(必須)");
        assert_eq!(normalize_text("  spaced \t out  "), "spaced out");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn normalize_expands_multi_char_punctuation() {
        assert_eq!(normalize_text("注意‼"), "注意!!");
        assert_eq!(normalize_text("本当⁉"), "本当!?");
        assert_eq!(normalize_text("まさか⁈"), "まさか?!");
        assert_eq!(normalize_text("続きを読む…"), "続きを読む...");
    }
}
