use super::clean_text as clean_text_impl;
use super::*;

#[test]
fn extract_simple_content() {
    let html = r#"
        <html lang="en">
        <head><title>Test Page</title></head>
        <body>
            <h1>Main Title</h1>
            <p>This is a paragraph.</p>
            <p>Another    paragraph
               spread over lines.</p>
        </body>
        </html>
    "#;

    let content = extract_content(html);

    assert_eq!(content.title.as_deref(), Some("Test Page"));
    assert_eq!(
        content.text,
        "Main Title\nThis is a paragraph.\nAnother paragraph spread over lines."
    );
    assert_eq!(content.metadata.get("lang").map(String::as_str), Some("en"));
}

#[test]
fn title_falls_back_to_first_heading() {
    let html = "<html><body><h1>  Getting   Started </h1><p>Body</p></body></html>";
    let content = extract_content(html);
    assert_eq!(content.title.as_deref(), Some("Getting Started"));
}

#[test]
fn no_title_is_none() {
    let content = extract_content("<html><body><p>Only text</p></body></html>");
    assert_eq!(content.title, None);
    assert_eq!(content.text, "Only text");
}

#[test]
fn page_chrome_is_removed() {
    let html = r#"
        <html>
        <head>
            <title>Docs</title>
            <style>body { color: red; }</style>
            <script>console.log("hi");</script>
        </head>
        <body>
            <nav>Home | About</nav>
            <header>Site header</header>
            <div class="sidebar">Sidebar links</div>
            <p>Useful text.</p>
            <script>trackUser();</script>
            <footer>Copyright</footer>
        </body>
        </html>
    "#;

    let content = extract_content(html);

    assert_eq!(content.text, "Useful text.");
}

#[test]
fn main_content_is_preferred() {
    let html = r#"
        <html><body>
            <div>Outside the article</div>
            <main>
                <h2>Section</h2>
                <p>Inside <em>main</em> content.</p>
                <ul><li>one</li><li>two</li></ul>
            </main>
        </body></html>
    "#;

    let content = extract_content(html);

    assert_eq!(content.text, "Section\nInside main content.\none\ntwo");
}

#[test]
fn preformatted_lines_are_kept() {
    let html = "<html><body><p>Example:</p><pre>fn main() {\n    run();\n}</pre></body></html>";
    let content = extract_content(html);
    assert_eq!(content.text, "Example:\nfn main() {\nrun();\n}");
}

#[test]
fn meta_tags_become_metadata() {
    let html = r#"
        <html>
        <head>
            <meta name="description" content="A test page">
            <meta property="og:title" content="OG Title">
            <meta name="keywords" content="test, html">
            <meta charset="utf-8">
            <meta name="empty" content="   ">
        </head>
        <body></body>
        </html>
    "#;

    let document = Html::parse_document(html);
    let metadata = extract_metadata(&document);

    assert_eq!(metadata.get("description").map(String::as_str), Some("A test page"));
    assert_eq!(metadata.get("og:title").map(String::as_str), Some("OG Title"));
    assert_eq!(metadata.get("keywords").map(String::as_str), Some("test, html"));
    assert!(!metadata.contains_key("empty"));
    assert_eq!(metadata.len(), 3);
}

#[test]
fn clean_text() {
    assert_eq!(clean_text_impl("  hello   world  "), "hello world");
    assert_eq!(clean_text_impl("line1\n\n\n  line2  \n"), "line1\nline2");
    assert_eq!(clean_text_impl("tabs\tand\u{a0}spaces"), "tabs and spaces");
    assert_eq!(clean_text_impl("   \n \t "), "");
}

#[test]
fn malformed_html() {
    let content = extract_content("<html><body><p>Unclosed <b>bold<div>Next</body>");
    assert!(content.text.contains("Unclosed bold"));
    assert!(content.text.contains("Next"));
}
