//! Offline generator for local development.

use async_trait::async_trait;

use annai_models::McqDraft;

use crate::error::MlResult;
use crate::generation::McqGenerator;

/// Returns one canned question per segment without calling any service.
#[derive(Debug, Clone, Default)]
pub struct MockMcqGenerator;

#[async_trait]
impl McqGenerator for MockMcqGenerator {
    async fn generate(&self, segment: &str) -> MlResult<Vec<McqDraft>> {
        let preview: String = segment.chars().take(30).collect();
        Ok(vec![McqDraft {
            question: format!("What is the topic of: \"{}...\"?", preview),
            options: ["Option A", "Option B", "Option C", "Option D"]
                .into_iter()
                .map(String::from)
                .collect(),
            answer: "Option A".to_string(),
        }])
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_output_is_well_formed() {
        let drafts = MockMcqGenerator.generate("the mitochondria is the powerhouse of the cell").await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].is_well_formed());
        assert!(drafts[0].question.contains("the mitochondria is the power"));
    }
}
