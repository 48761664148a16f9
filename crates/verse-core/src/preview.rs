//! Plain-text extraction for entry previews
//!
//! Bodies are edited as rich text and stored as HTML. The index keeps a short
//! plain-text excerpt so lists and searches never have to load a body.

use scraper::{ElementRef, Html, Node};

/// Maximum number of characters kept in a preview
pub const PREVIEW_LEN: usize = 120;

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "tr", "td",
];

/// Strip markup from `html` and collapse runs of whitespace
pub fn plain_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }

    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()) => text.push(' '),
            _ => {}
        }
    }
    collapse_whitespace(&text)
}

/// Body HTML as text that keeps the body's line structure
///
/// Paragraph-level elements become blocks separated by a blank line, `<br>`
/// becomes a line break, and inline markup is dropped.
pub fn editable_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut blocks = Vec::new();
    let mut current = String::new();
    collect_blocks(fragment.root_element(), &mut current, &mut blocks);
    end_block(&mut current, &mut blocks);
    blocks.join("\n\n")
}

fn collect_blocks(element: ElementRef<'_>, current: &mut String, blocks: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => {
                current.extend(t.chars().map(|c| if c.is_whitespace() { ' ' } else { c }))
            }
            Node::Element(el) if el.name() == "br" => current.push('\n'),
            Node::Element(el) => {
                let block = BLOCK_ELEMENTS.contains(&el.name());
                if block {
                    end_block(current, blocks);
                }
                if let Some(inner) = ElementRef::wrap(child) {
                    collect_blocks(inner, current, blocks);
                }
                if block {
                    end_block(current, blocks);
                }
            }
            _ => {}
        }
    }
}

fn end_block(current: &mut String, blocks: &mut Vec<String>) {
    let lines: Vec<String> = current.split('\n').map(collapse_whitespace).collect();
    current.clear();

    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    if let (Some(first), Some(last)) = (first, last) {
        blocks.push(lines[first..=last].join("\n"));
    }
}

/// Build the preview stored alongside an entry's metadata
pub fn excerpt(html: &str) -> String {
    let text = plain_text(html);
    if text.chars().count() <= PREVIEW_LEN {
        return text;
    }

    let mut cut: String = text.chars().take(PREVIEW_LEN).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
