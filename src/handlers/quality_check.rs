use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::docx::DocumentMetrics;
use super::{ActivityHandler, HandlerError, HandlerOutput};
use crate::config::QualityCheckConfig;
use crate::external::DocumentFetcher;
use crate::workflow::params::QC_ERRORS;
use crate::workflow::{Activity, SourceDocument};

/// Downloads the source document and checks its size against thresholds
pub struct QualityCheckHandler {
    fetcher: Arc<dyn DocumentFetcher>,
    thresholds: QualityCheckConfig,
}

impl QualityCheckHandler {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, thresholds: QualityCheckConfig) -> Self {
        Self {
            fetcher,
            thresholds,
        }
    }
}

#[async_trait]
impl ActivityHandler for QualityCheckHandler {
    fn name(&self) -> &'static str {
        "quality-check"
    }

    async fn handle(&self, activity: &Activity) -> Result<HandlerOutput, HandlerError> {
        let source = SourceDocument::from_activity(activity)?;
        let bytes = self.fetcher.fetch(&source.file_url).await?;
        if bytes.is_empty() {
            return Err(HandlerError::EmptyDocument(source.file_url));
        }
        debug!(
            activity.id = %activity.id,
            bytes = bytes.len(),
            "Downloaded document for quality check"
        );

        let metrics = DocumentMetrics::extract(&bytes)?;
        let mut parameters = metrics.to_parameters();
        let errors = metrics.violations(&self.thresholds);
        info!(
            activity.id = %activity.id,
            word_count = metrics.word_count,
            paragraphs = metrics.paragraphs,
            passed = errors.is_empty(),
            "Quality check evaluated"
        );

        if errors.is_empty() {
            Ok(HandlerOutput::pass(parameters))
        } else {
            parameters.insert(QC_ERRORS.to_string(), errors.join("; "));
            Ok(HandlerOutput::reject(parameters, errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{FetchError, MockDocumentFetcher};
    use crate::handlers::docx::build_docx;
    use crate::handlers::Verdict;
    use crate::workflow::params::{FILE_URL, PARAGRAPHS, WORD_COUNT};
    use crate::workflow::ActivityKind;
    use mockall::predicate::eq;
    use uuid::Uuid;

    fn activity() -> Activity {
        Activity::new(Uuid::new_v4(), ActivityKind::QualityCheck, 1)
            .with_parameter(FILE_URL, "https://files/doc.docx")
    }

    fn long_paragraph() -> String {
        vec!["word"; 30].join(" ")
    }

    #[tokio::test]
    async fn test_passes_document_above_thresholds() {
        let paragraph = long_paragraph();
        let docx = build_docx(&[&paragraph, &paragraph]);
        let mut fetcher = MockDocumentFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("https://files/doc.docx"))
            .times(1)
            .returning(move |_| Ok(docx.clone()));

        let handler = QualityCheckHandler::new(Arc::new(fetcher), QualityCheckConfig::default());
        let output = handler.handle(&activity()).await.unwrap();
        assert_eq!(output.verdict, Verdict::Pass);
        assert_eq!(output.parameters.get(WORD_COUNT).map(String::as_str), Some("60"));
        assert_eq!(output.parameters.get(PARAGRAPHS).map(String::as_str), Some("2"));
        assert!(!output.parameters.contains_key(QC_ERRORS));
    }

    #[tokio::test]
    async fn test_rejects_short_document_with_metrics() {
        let docx = build_docx(&["only a handful of words"]);
        let mut fetcher = MockDocumentFetcher::new();
        fetcher.expect_fetch().returning(move |_| Ok(docx.clone()));

        let handler = QualityCheckHandler::new(Arc::new(fetcher), QualityCheckConfig::default());
        let output = handler.handle(&activity()).await.unwrap();
        let Verdict::Reject(errors) = &output.verdict else {
            panic!("short document passed");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(output.parameters.get(WORD_COUNT).map(String::as_str), Some("5"));
        assert!(output.parameters[QC_ERRORS].contains("Word count is too low"));
    }

    #[tokio::test]
    async fn test_missing_file_url_never_fetches() {
        let mut fetcher = MockDocumentFetcher::new();
        fetcher.expect_fetch().never();

        let handler = QualityCheckHandler::new(Arc::new(fetcher), QualityCheckConfig::default());
        let bare = Activity::new(Uuid::new_v4(), ActivityKind::QualityCheck, 1);
        assert!(matches!(
            handler.handle(&bare).await,
            Err(HandlerError::MissingParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error() {
        let mut fetcher = MockDocumentFetcher::new();
        fetcher.expect_fetch().returning(|url| {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        });

        let handler = QualityCheckHandler::new(Arc::new(fetcher), QualityCheckConfig::default());
        assert!(matches!(
            handler.handle(&activity()).await,
            Err(HandlerError::Fetch(_))
        ));
    }
}
