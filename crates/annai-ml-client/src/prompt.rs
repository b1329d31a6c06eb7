//! Prompt for per-segment question generation.

const INSTRUCTIONS: &str = r#"You are an AI educator assistant.

TASK:
From the paragraph below, generate multiple-choice questions (MCQs) that test comprehension of different ideas in the text.

- Generate 2 to 5 MCQs that together cover different parts or ideas of the paragraph.
- For each MCQ:
  - Provide 1 clear question.
  - Provide 4 answer options labeled A to D.
  - Mark the correct option clearly.
- Use simple and relevant language suitable for learners.
- Do NOT repeat exact lines from the paragraph.
- Avoid duplicate or overly similar questions.

Respond ONLY in JSON format like this:

{
  "mcqs": [
    {
      "question": "...",
      "options": ["A", "B", "C", "D"],
      "answer": "..."
    }
  ]
}"#;

/// Build the generation prompt for one transcript segment.
pub fn build_mcq_prompt(segment: &str) -> String {
    format!("{}\n\nPARAGRAPH:\n\"{}\"", INSTRUCTIONS, segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_ends_with_quoted_segment() {
        let prompt = build_mcq_prompt("photosynthesis converts light");
        assert!(prompt.ends_with("PARAGRAPH:\n\"photosynthesis converts light\""));
        assert!(prompt.contains("2 to 5 MCQs"));
        assert!(prompt.contains("\"mcqs\""));
    }
}
