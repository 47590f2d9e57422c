//! Input document download and text extraction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::workspace::file_name;
use crate::PipelineError;

/// A downloaded input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// File name the document is stored under (`input_files/<name>`).
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Downloads documents referenced by URL.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument>;
}

/// Turns stored document bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Name a document after the last segment of its URL.
fn document_name(url: &str) -> String {
    match file_name(url) {
        "" => "document".to_string(),
        name => name.to_string(),
    }
}

/// Fetches documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// A fetcher with its own client and the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let http = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let fetch_err = |e: reqwest::Error| PipelineError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        tracing::debug!(url, "downloading input document");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        let bytes = resp.bytes().await.map_err(fetch_err)?;

        Ok(FetchedDocument {
            name: document_name(url),
            bytes: bytes.to_vec(),
        })
    }
}

/// Serves documents from a fixed URL map.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    documents: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(url.into(), bytes.into());
        self
    }
}

#[async_trait]
impl DocumentFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let bytes = self.documents.get(url).cloned().ok_or_else(|| PipelineError::Fetch {
            url: url.to_string(),
            message: "404 Not Found".into(),
        })?;
        Ok(FetchedDocument {
            name: document_name(url),
            bytes,
        })
    }
}

/// Drop a leading BOM and control characters other than line breaks and tabs.
fn sanitize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Decodes UTF-8 text documents.
///
/// Invalid sequences are replaced and control characters other than line
/// breaks and tabs are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, _name: &str, bytes: &[u8]) -> Result<String> {
        Ok(sanitize(&String::from_utf8_lossy(bytes)))
    }
}

/// Extracts the text layer of a PDF, page by page.
///
/// Pages are joined with a blank line; pages without text are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let pdf_err = |e: lopdf::Error| PipelineError::Extract {
            name: name.to_string(),
            message: e.to_string(),
        };

        let document = lopdf::Document::load_mem(bytes).map_err(pdf_err)?;
        let mut buffer = String::new();
        for page_number in document.get_pages().keys() {
            let page_text = document.extract_text(&[*page_number]).map_err(pdf_err)?;
            let page_text = page_text.trim();
            if page_text.is_empty() {
                continue;
            }
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(page_text);
        }

        tracing::debug!(document = name, chars = buffer.len(), "extracted PDF text");
        Ok(sanitize(&buffer))
    }
}

/// Picks an extractor from the document's magic bytes: PDFs go through
/// [`PdfTextExtractor`], everything else is read as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, name: &str, bytes: &[u8]) -> Result<String> {
        if bytes.starts_with(b"%PDF") {
            PdfTextExtractor.extract(name, bytes)
        } else {
            PlainTextExtractor.extract(name, bytes)
        }
    }
}

/// Build a small PDF with one Helvetica text line per page.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_names_by_url() {
        let fetcher = StaticFetcher::new().with_document("https://host/docs/essay.txt?x=1", "text");
        let doc = fetcher.fetch("https://host/docs/essay.txt?x=1").await.unwrap();
        assert_eq!(doc.name, "essay.txt");
        assert_eq!(doc.bytes, b"text");
    }

    #[tokio::test]
    async fn test_static_fetcher_missing_url() {
        let err = StaticFetcher::new().fetch("https://nowhere/x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { url, .. } if url == "https://nowhere/x"));
    }

    #[test]
    fn test_document_name_fallback() {
        assert_eq!(document_name("https://host/"), "host");
        assert_eq!(document_name(""), "document");
    }

    #[test]
    fn test_plain_text_extraction() {
        let text = PlainTextExtractor
            .extract("a.txt", "\u{feff}line one\n\u{0007}line\ttwo".as_bytes())
            .unwrap();
        assert_eq!(text, "line one\nline\ttwo");
    }

    #[test]
    fn test_pdf_text_is_extracted_in_page_order() {
        let pdf = sample_pdf(&["First page text.", "Second page text."]);
        let text = DocumentExtractor.extract("paper.pdf", &pdf).unwrap();

        let first = text.find("First page text.").unwrap();
        let second = text.find("Second page text.").unwrap();
        assert!(first < second, "{:?}", text);
    }

    #[test]
    fn test_text_documents_skip_the_pdf_reader() {
        let text = DocumentExtractor.extract("notes.txt", b"plain notes").unwrap();
        assert_eq!(text, "plain notes");
    }

    #[test]
    fn test_broken_pdf_is_an_extract_error() {
        let err = DocumentExtractor.extract("broken.pdf", b"%PDF-1.4 not really").unwrap_err();
        assert!(matches!(err, PipelineError::Extract { name, .. } if name == "broken.pdf"));
    }
}
