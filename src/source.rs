use std::fs;
use std::path::Path;

use epub::doc::EpubDoc;
use html2text::from_read;
use regex::Regex;

use crate::error::{Error, Result};
use crate::pages::MarkerSplitter;

const TEXT_WIDTH: usize = 100;

/// Reads a document for pagination. EPUB spine documents become pages
/// separated by page markers; HTML is flattened to text; anything else is
/// taken as UTF-8 text as-is.
pub fn load_document(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "epub" => load_epub(path),
        "html" | "htm" | "xhtml" => Ok(html_to_text(&read_text(path)?)),
        _ => read_text(path),
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

pub fn html_to_text(html: &str) -> String {
    from_read(html.as_bytes(), TEXT_WIDTH)
}

fn load_epub(path: &Path) -> Result<String> {
    let mut doc = EpubDoc::new(path).map_err(|e| Error::Epub {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let titles = TitleExtractor::new();

    let mut documents = Vec::new();
    loop {
        if let Some((html, _mime)) = doc.get_current_str() {
            documents.push(html);
        }
        if !doc.go_next() {
            break;
        }
    }

    let book = join_chapters(&documents, &titles);
    log::info!(
        "Loaded {} spine documents from {}",
        documents.len(),
        path.display()
    );
    Ok(book)
}

/// Finds the first h1-h3 heading of a spine document as plain text.
struct TitleExtractor {
    heading: Regex,
    tag: Regex,
}

impl TitleExtractor {
    fn new() -> Self {
        Self {
            heading: Regex::new(r"(?is)<h[1-3][^>]*>(.*?)</h[1-3]>")
                .expect("title pattern is valid"),
            tag: Regex::new(r"<[^>]*>").expect("tag pattern is valid"),
        }
    }

    fn extract(&self, html: &str) -> Option<String> {
        let captures = self.heading.captures(html)?;
        let inner = self.tag.replace_all(captures.get(1)?.as_str(), "");
        let title = html_to_text(&inner);
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        (!title.is_empty()).then_some(title)
    }
}

/// Renders each spine document and joins the non-empty ones with page
/// markers, so the marker splitter sees one raw page per document.
fn join_chapters(documents: &[String], titles: &TitleExtractor) -> String {
    let mut book = String::new();
    let mut order = 0;

    for html in documents {
        let text = html_to_text(html);
        if text.trim().is_empty() {
            continue;
        }
        if order > 0 {
            book.push('\n');
        }
        book.push_str(&MarkerSplitter::marker(order, 0));
        book.push('\n');
        if let Some(title) = titles.extract(html) {
            let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            if !first_line.contains(&title) {
                book.push_str(&format!("# {}\n\n", title));
            }
        }
        book.push_str(text.trim());
        book.push('\n');
        order += 1;
    }
    book
}
