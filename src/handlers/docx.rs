//! Structural metrics of a WordprocessingML (`.docx`) document.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use super::HandlerError;
use crate::config::QualityCheckConfig;
use crate::workflow::params::{PARAGRAPHS, WORD_COUNT};
use crate::workflow::Parameters;

const MAIN_PART: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentMetrics {
    pub word_count: usize,
    pub paragraphs: usize,
}

impl DocumentMetrics {
    /// Count paragraphs that are direct children of `w:body` and the words
    /// in their text runs. Paragraphs inside tables are ignored.
    pub fn extract(bytes: &[u8]) -> Result<Self, HandlerError> {
        let extraction = |e: &dyn std::fmt::Display| HandlerError::Extraction(e.to_string());

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| extraction(&e))?;
        let mut xml = String::new();
        archive
            .by_name(MAIN_PART)
            .map_err(|e| extraction(&e))?
            .read_to_string(&mut xml)
            .map_err(|e| extraction(&e))?;

        Self::from_document_xml(&xml)
    }

    pub fn from_document_xml(xml: &str) -> Result<Self, HandlerError> {
        let mut reader = Reader::from_str(xml);
        let mut open: Vec<Vec<u8>> = Vec::new();
        // depth of the body paragraph currently being read
        let mut paragraph_depth: Option<usize> = None;
        let mut text = String::new();
        let mut metrics = DocumentMetrics {
            word_count: 0,
            paragraphs: 0,
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.name().as_ref().to_vec();
                    if name == b"w:p" && paragraph_depth.is_none() && is_body(&open) {
                        paragraph_depth = Some(open.len());
                        text.clear();
                    }
                    open.push(name);
                }
                Ok(Event::Empty(e)) => {
                    if e.name().as_ref() == b"w:p" && paragraph_depth.is_none() && is_body(&open) {
                        metrics.paragraphs += 1;
                    }
                }
                Ok(Event::Text(t)) => {
                    let in_run_text = open.last().is_some_and(|n| n.as_slice() == b"w:t");
                    if paragraph_depth.is_some() && in_run_text {
                        let unescaped = t
                            .unescape()
                            .map_err(|e| HandlerError::Extraction(e.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Ok(Event::End(_)) => {
                    open.pop();
                    if paragraph_depth == Some(open.len()) {
                        paragraph_depth = None;
                        metrics.paragraphs += 1;
                        metrics.word_count += count_words(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(HandlerError::Extraction(format!(
                        "malformed XML at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
                Ok(_) => {}
            }
        }

        Ok(metrics)
    }

    /// One message per violated threshold
    pub fn violations(&self, thresholds: &QualityCheckConfig) -> Vec<String> {
        let mut errors = Vec::new();
        if self.word_count < thresholds.min_words {
            errors.push(format!("Word count is too low (<{}).", thresholds.min_words));
        }
        if self.paragraphs < thresholds.min_paragraphs {
            errors.push(format!(
                "Document has too few paragraphs (<{}).",
                thresholds.min_paragraphs
            ));
        }
        errors
    }

    pub fn to_parameters(&self) -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert(WORD_COUNT.to_string(), self.word_count.to_string());
        parameters.insert(PARAGRAPHS.to_string(), self.paragraphs.to_string());
        parameters
    }
}

fn is_body(open: &[Vec<u8>]) -> bool {
    open.last().is_some_and(|n| n.as_slice() == b"w:body")
}

fn count_words(text: &str) -> usize {
    text.split([' ', '\t', '\n'])
        .filter(|piece| !piece.is_empty())
        .count()
}

/// Minimal `.docx` writer for tests: one body paragraph per entry
#[cfg(test)]
pub(crate) fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;

    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr/></w:body></w:document>"
    );

    let mut out = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut out);
        zip.start_file(MAIN_PART, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    out.into_inner()
}
