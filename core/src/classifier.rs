//! LLM-assisted classification of an incoming chat message into a workflow
//! kind, with a deterministic keyword-scorer fallback (§4.G).
use crate::errors::ClassifierResult;
use crate::state::WorkflowKind;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// `{kind, confidence, reasoning}` — the classifier's public result shape.
#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: WorkflowKind,
    pub confidence: f32,
    pub reasoning: String,
}

/// The classifier's pluggable LLM backend: produces a structured
/// classification, or an error that triggers the keyword fallback.
#[async_trait]
pub trait ClassifierLlm: Send + Sync {
    async fn classify(&self, message: &str) -> ClassifierResult<Classification>;
}

/// Keywords scored for the release-automation kind.
const RELEASE_KEYWORDS: &[&str] = &[
    "release", "deploy", "deployment", "merge", "sprint", "branch", "tag", "version", "hotfix",
    "pull request", "rollback", "cut a release", "ship",
];

/// Keywords scored for the QA kind.
const QA_KEYWORDS: &[&str] = &[
    "show", "list", "what", "how many", "status of", "check", "find", "branches in", "tickets for",
    "search", "look up",
];

fn score(message_lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().map(|k| message_lower.matches(k).count()).sum()
}

/// Deterministic fallback used when the LLM path is unavailable or fails:
/// two keyword sets are scored and the higher score wins; ties default to QA.
pub fn fallback_classify(message: &str, confidence: f32) -> Classification {
    let lower = message.to_lowercase();
    let release_score = score(&lower, RELEASE_KEYWORDS);
    let qa_score = score(&lower, QA_KEYWORDS);

    let kind = if release_score > qa_score {
        WorkflowKind::Release
    } else {
        WorkflowKind::Qa
    };

    Classification {
        kind,
        confidence,
        reasoning: format!(
            "keyword fallback: release_score={release_score}, qa_score={qa_score}"
        ),
    }
}

/// Classifies incoming chat messages into a workflow kind.
pub struct Classifier {
    llm: Option<Arc<dyn ClassifierLlm>>,
    fallback_confidence: f32,
}

impl Classifier {
    pub fn new(llm: Option<Arc<dyn ClassifierLlm>>, fallback_confidence: f32) -> Self {
        Self {
            llm,
            fallback_confidence,
        }
    }

    pub async fn classify(&self, message: &str) -> Classification {
        if let Some(llm) = &self.llm {
            match llm.classify(message).await {
                Ok(classification) => return classification,
                Err(e) => {
                    warn!(error = %e, "classifier LLM call failed, falling back to keyword scorer");
                }
            }
        }
        fallback_classify(message, self.fallback_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_keywords_win_on_release_message() {
        let c = fallback_classify("Please cut a release and deploy the sprint branch", 0.7);
        assert_eq!(c.kind, WorkflowKind::Release);
        assert_eq!(c.confidence, 0.7);
    }

    #[test]
    fn qa_keywords_win_on_question() {
        let c = fallback_classify("Show me branches in frontend-app", 0.7);
        assert_eq!(c.kind, WorkflowKind::Qa);
    }

    #[test]
    fn ties_default_to_qa() {
        let c = fallback_classify("hello", 0.7);
        assert_eq!(c.kind, WorkflowKind::Qa);
    }

    #[tokio::test]
    async fn classifier_falls_back_when_llm_errors() {
        struct Failing;
        #[async_trait::async_trait]
        impl ClassifierLlm for Failing {
            async fn classify(&self, _message: &str) -> ClassifierResult<Classification> {
                Err(crate::errors::ClassifierError::LlmFailed("down".into()))
            }
        }
        let classifier = Classifier::new(Some(Arc::new(Failing)), 0.7);
        let result = classifier.classify("deploy release sprint").await;
        assert_eq!(result.kind, WorkflowKind::Release);
    }
}
