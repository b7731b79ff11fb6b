//! Typed views over the parameter blackboard.
//!
//! The blackboard stays a plain string map for storage compatibility; each
//! handler reads it through one of these views so required keys are checked
//! once, at the handler boundary.

use super::types::{Activity, Parameters};

pub const FILE_URL: &str = "FileUrl";
pub const WORD_COUNT: &str = "WordCount";
pub const PARAGRAPHS: &str = "Paragraphs";
pub const QC_ERRORS: &str = "QcErrors";
pub const PDF_URL: &str = "PdfUrl";
pub const PDF_PATH: &str = "PdfPath";
pub const ZIP_URL: &str = "ZipUrl";
pub const ZIP_PATH: &str = "ZipPath";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("required parameter '{0}' is missing or empty")]
    Missing(&'static str),
    #[error("one of the parameters {0:?} is required")]
    MissingAny(&'static [&'static str]),
}

fn non_empty<'a>(parameters: &'a Parameters, key: &str) -> Option<&'a str> {
    parameters
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Source document reference, required by quality check and conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub file_url: String,
}

impl SourceDocument {
    pub fn from_activity(activity: &Activity) -> Result<Self, ParameterError> {
        let file_url = non_empty(&activity.parameters, FILE_URL)
            .ok_or(ParameterError::Missing(FILE_URL))?;
        Ok(Self {
            file_url: file_url.to_string(),
        })
    }
}

/// Reference to a converted document, consumed by packaging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertedDocument {
    /// Blob store path, preferred when present
    Stored { path: String },
    /// Only a URL is known
    Remote { url: String },
}

impl ConvertedDocument {
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, ParameterError> {
        if let Some(path) = non_empty(parameters, PDF_PATH) {
            return Ok(ConvertedDocument::Stored {
                path: path.to_string(),
            });
        }
        if let Some(url) = non_empty(parameters, PDF_URL) {
            return Ok(ConvertedDocument::Remote {
                url: url.to_string(),
            });
        }
        Err(ParameterError::MissingAny(&[PDF_PATH, PDF_URL]))
    }

    pub fn present_in(parameters: &Parameters) -> bool {
        Self::from_parameters(parameters).is_ok()
    }

    /// Entry name inside an archive: last path or URL segment
    pub fn file_name(&self) -> String {
        let raw = match self {
            ConvertedDocument::Stored { path } => path.as_str(),
            ConvertedDocument::Remote { url } => url.split(['?', '#']).next().unwrap_or(url),
        };
        raw.rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("document.pdf")
            .to_string()
    }
}

/// Outputs written by a successful conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    pub url: String,
    pub path: String,
}

impl ConversionOutput {
    pub fn to_parameters(&self) -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert(PDF_URL.to_string(), self.url.clone());
        parameters.insert(PDF_PATH.to_string(), self.path.clone());
        parameters
    }
}

/// Outputs written by a successful packaging run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutput {
    pub url: String,
    pub path: String,
}

impl PackageOutput {
    pub fn to_parameters(&self) -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert(ZIP_URL.to_string(), self.url.clone());
        parameters.insert(ZIP_PATH.to_string(), self.path.clone());
        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::ActivityKind;
    use uuid::Uuid;

    #[test]
    fn test_source_document_requires_non_blank_url() {
        let activity = Activity::new(Uuid::new_v4(), ActivityKind::QualityCheck, 1);
        assert_eq!(
            SourceDocument::from_activity(&activity),
            Err(ParameterError::Missing(FILE_URL))
        );

        let blank = activity.clone().with_parameter(FILE_URL, "   ");
        assert!(SourceDocument::from_activity(&blank).is_err());

        let ok = activity.with_parameter(FILE_URL, "https://files/doc.docx");
        assert_eq!(
            SourceDocument::from_activity(&ok).unwrap().file_url,
            "https://files/doc.docx"
        );
    }

    #[test]
    fn test_converted_document_prefers_path() {
        let mut parameters = Parameters::new();
        parameters.insert(PDF_URL.into(), "https://cdn/pdf_journals/a_journal.pdf".into());
        assert_eq!(
            ConvertedDocument::from_parameters(&parameters).unwrap(),
            ConvertedDocument::Remote {
                url: "https://cdn/pdf_journals/a_journal.pdf".into()
            }
        );

        parameters.insert(PDF_PATH.into(), "pdf_journals/a_journal.pdf".into());
        let doc = ConvertedDocument::from_parameters(&parameters).unwrap();
        assert_eq!(
            doc,
            ConvertedDocument::Stored {
                path: "pdf_journals/a_journal.pdf".into()
            }
        );
        assert_eq!(doc.file_name(), "a_journal.pdf");
    }

    #[test]
    fn test_remote_file_name_drops_query() {
        let doc = ConvertedDocument::Remote {
            url: "https://cdn/x/b_journal.pdf?token=abc".into(),
        };
        assert_eq!(doc.file_name(), "b_journal.pdf");
    }

    #[test]
    fn test_converted_document_missing() {
        assert!(!ConvertedDocument::present_in(&Parameters::new()));
    }
}
