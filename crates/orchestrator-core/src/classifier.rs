//! Failure classification
//!
//! Decides whether a load failure means the runtime ran out of memory.

use common::error::{Error, FailureKind};

/// Classifies collaborator failures
pub trait FailureClassifier: Send + Sync {
    /// Returns true if `error` signals memory exhaustion
    fn is_memory_exhaustion(&self, error: &Error) -> bool;

    /// Failure class of `error`
    fn classify(&self, error: &Error) -> FailureKind {
        if self.is_memory_exhaustion(error) {
            return FailureKind::MemoryExhaustion;
        }
        error.kind().unwrap_or(FailureKind::GenericArtifactError)
    }
}

/// Treats typed exhaustion errors and messages containing a keyword as exhaustion
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    /// Lowercase keywords matched against the error message
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(["memory"])
    }
}

impl FailureClassifier for KeywordClassifier {
    fn is_memory_exhaustion(&self, error: &Error) -> bool {
        if matches!(error, Error::MemoryExhaustion(_)) {
            return true;
        }

        let message = error.to_string().to_lowercase();
        self.keywords.iter().any(|keyword| message.contains(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_keyword() {
        let classifier = KeywordClassifier::default();

        assert!(classifier.is_memory_exhaustion(&Error::artifact("Failed to allocate GPU Memory")));
        assert!(classifier.is_memory_exhaustion(&Error::MemoryExhaustion("oom".into())));
        assert!(!classifier.is_memory_exhaustion(&Error::artifact("HTTP 404")));
    }

    #[test]
    fn test_classify() {
        let classifier = KeywordClassifier::default();

        assert_eq!(
            classifier.classify(&Error::artifact("out of memory")),
            FailureKind::MemoryExhaustion
        );
        assert_eq!(
            classifier.classify(&Error::LoadTimeout {
                model_id: "yolo11m".into(),
                timeout: Duration::from_secs(30)
            }),
            FailureKind::LoadTimeout
        );
        assert_eq!(
            classifier.classify(&Error::Config("bad".into())),
            FailureKind::GenericArtifactError
        );
    }

    #[test]
    fn test_custom_keywords() {
        let classifier = KeywordClassifier::new(["OOM", ""]);
        assert!(classifier.is_memory_exhaustion(&Error::artifact("CUDA oom")));
        assert!(!classifier.is_memory_exhaustion(&Error::artifact("memory")));
    }
}
