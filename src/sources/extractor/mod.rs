#[cfg(test)]
mod tests;

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::debug;

/// Readable text and metadata pulled out of an HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Page title from `<title>` or the first heading
    pub title: Option<String>,
    /// Main content as plain text, one block per line
    pub text: String,
    /// `<meta>` name/property to content pairs, plus `lang` when declared
    pub metadata: BTreeMap<String, String>,
}

const TITLE_SELECTORS: [&str; 4] = ["title", "h1", ".page-title", "#title"];

const MAIN_SELECTORS: [&str; 8] = [
    "main",
    "[role=\"main\"]",
    "article",
    ".main-content",
    ".content",
    "#content",
    "#main",
    ".documentation",
];

/// Strip markup from an HTML document and collapse its whitespace
#[inline]
pub fn extract_content(html: &str) -> ExtractedContent {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let metadata = extract_metadata(&document);

    let mut raw = String::new();
    extract_text_recursive(find_main_content(&document), &mut raw);
    let text = clean_text(&raw);

    debug!(
        "Extracted content: title={:?}, {} metadata entries, {} chars of text",
        title,
        metadata.len(),
        text.len()
    );

    ExtractedContent {
        title,
        text,
        metadata,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    for selector_str in &TITLE_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let title = clean_text(&element.text().collect::<String>());
                if !title.is_empty() {
                    debug!("Extracted title using selector '{}'", selector_str);
                    return Some(title);
                }
            }
        }
    }
    None
}

/// Collect `<meta>` tags and the document language
#[inline]
pub fn extract_metadata(document: &Html) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if let Ok(meta_selector) = Selector::parse("meta") {
        for element in document.select(&meta_selector) {
            if let (Some(name), Some(content)) = (
                element
                    .value()
                    .attr("name")
                    .or_else(|| element.value().attr("property")),
                element.value().attr("content"),
            ) {
                let content = clean_text(content);
                if !name.trim().is_empty() && !content.is_empty() {
                    metadata.insert(name.trim().to_string(), content);
                }
            }
        }
    }

    if let Some(lang) = document.root_element().value().attr("lang") {
        if !lang.trim().is_empty() {
            metadata.insert("lang".to_string(), lang.trim().to_string());
        }
    }

    metadata
}

fn find_main_content(document: &Html) -> ElementRef<'_> {
    for selector_str in &MAIN_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                debug!("Found main content using selector: {}", selector_str);
                return element;
            }
        }
    }

    if let Ok(body) = Selector::parse("body") {
        if let Some(element) = document.select(&body).next() {
            return element;
        }
    }

    document.root_element()
}

fn is_unwanted(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if matches!(
        value.name(),
        "script"
            | "style"
            | "noscript"
            | "template"
            | "iframe"
            | "svg"
            | "nav"
            | "header"
            | "footer"
            | "aside"
            | "button"
            | "form"
            | "head"
    ) {
        return true;
    }
    if value.attr("aria-hidden") == Some("true") || value.attr("hidden").is_some() {
        return true;
    }
    value.classes().any(|class| {
        matches!(
            class,
            "advertisement" | "ads" | "sidebar" | "menu" | "navigation" | "breadcrumbs"
        )
    })
}

fn is_block(tag_name: &str) -> bool {
    matches!(
        tag_name,
        "p" | "div"
            | "section"
            | "article"
            | "main"
            | "blockquote"
            | "li"
            | "dd"
            | "dt"
            | "tr"
            | "table"
            | "ul"
            | "ol"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "figcaption"
    )
}

fn extract_text_recursive(element: ElementRef<'_>, content: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if is_unwanted(child_element) {
                continue;
            }

            let tag_name = child_element.value().name();
            match tag_name {
                "br" => content.push('\n'),
                "pre" => {
                    content.push('\n');
                    content.push_str(&child_element.text().collect::<String>());
                    content.push('\n');
                }
                "td" | "th" => {
                    extract_text_recursive(child_element, content);
                    content.push(' ');
                }
                _ if is_block(tag_name) => {
                    content.push('\n');
                    extract_text_recursive(child_element, content);
                    content.push('\n');
                }
                _ => extract_text_recursive(child_element, content),
            }
        } else if let Some(text_node) = child.value().as_text() {
            // Source line breaks inside running text are not paragraph breaks
            content.extend(text_node.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        }
    }
}

/// Collapse whitespace runs to one space, trim lines and drop empty ones
#[inline]
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
