//! Text extraction for source formats (HTML, PDF, EPUB).
//!
//! Connectors supply bytes; this module returns plain UTF-8 text. HTML
//! parsing is best-effort tag stripping (real pages are rarely well-formed),
//! PDF goes through `pdf-extract`, and EPUB walks the XHTML documents inside
//! the ZIP container.

use std::io::Read;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_ZIP_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. The pipeline skips the item and moves on; extraction
/// never panics.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Epub(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Epub(e) => write!(f, "EPUB extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// A parsed HTML page: visible text plus raw `href` values, in document
/// order.
#[derive(Debug, Default)]
pub struct HtmlPage {
    pub text: String,
    pub links: Vec<String>,
}

/// Strip an HTML page down to its visible text and collect anchor hrefs.
///
/// Best-effort: parsing stops silently at the first unrecoverable markup
/// error and returns whatever was collected. Script and style contents are
/// skipped; block-level closers insert line breaks so paragraphs stay
/// separated.
pub fn parse_html(html: &[u8]) -> HtmlPage {
    let mut page = HtmlPage::default();
    let mut reader = quick_xml::Reader::from_reader(html);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;
    reader.config_mut().allow_unmatched_ends = true;

    let mut buf = Vec::new();
    // Depth of nested <script>/<style> elements currently open
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"script" || name == b"style" {
                    skip_depth += 1;
                } else if name == b"a" {
                    if let Some(href) = attr_value(&e, b"href") {
                        page.links.push(href);
                    }
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"a" {
                    if let Some(href) = attr_value(&e, b"href") {
                        page.links.push(href);
                    }
                } else if name == b"br" {
                    page.text.push('\n');
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"script" || name == b"style" {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if is_block_element(name) {
                    page.text.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if skip_depth == 0 => {
                let text = match te.unescape() {
                    Ok(s) => s.into_owned(),
                    Err(_) => String::from_utf8_lossy(te.as_ref()).into_owned(),
                };
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !page.text.is_empty() && !page.text.ends_with(char::is_whitespace) {
                        page.text.push(' ');
                    }
                    page.text.push_str(trimmed);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            // Real-world HTML: give up quietly, keep what we have
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    page.text = page.text.trim().to_string();
    page
}

fn is_block_element(name: &[u8]) -> bool {
    matches!(
        name,
        b"p" | b"div"
            | b"li"
            | b"blockquote"
            | b"h1"
            | b"h2"
            | b"h3"
            | b"h4"
            | b"h5"
            | b"h6"
            | b"tr"
            | b"section"
            | b"article"
    )
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return attr
                .unescape_value()
                .ok()
                .map(|v| v.into_owned())
                .or_else(|| Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    None
}

/// Extract plain text from PDF bytes.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Extract plain text from an EPUB container.
///
/// EPUB is a ZIP of XHTML content documents. Entries are read in name order
/// and their visible text joined with blank lines; packaging files (OPF,
/// NCX) are ignored.
pub fn epub_to_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Epub(e.to_string()))?;

    let mut content_names: Vec<String> = archive
        .file_names()
        .filter(|n| {
            let lower = n.to_ascii_lowercase();
            lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
        })
        .map(|s| s.to_string())
        .collect();
    content_names.sort();

    if content_names.is_empty() {
        return Err(ExtractError::Epub(
            "no XHTML content documents found".to_string(),
        ));
    }

    let mut parts = Vec::new();
    for name in content_names {
        let entry = archive
            .by_name(&name)
            .map_err(|e| ExtractError::Epub(e.to_string()))?;
        let mut xml = Vec::new();
        entry
            .take(MAX_ZIP_ENTRY_BYTES)
            .read_to_end(&mut xml)
            .map_err(|e| ExtractError::Epub(e.to_string()))?;
        if xml.len() as u64 >= MAX_ZIP_ENTRY_BYTES {
            return Err(ExtractError::Epub(format!(
                "ZIP entry {} exceeds size limit ({} bytes)",
                name, MAX_ZIP_ENTRY_BYTES
            )));
        }
        let text = parse_html(&xml).text;
        if !text.is_empty() {
            parts.push(text);
        }
    }

    Ok(parts.join("\n\n"))
}
