//! Prompt templates

/// Answer returned when retrieval finds nothing; the model is not called.
pub const NO_CONTEXT_ANSWER: &str = "I don't have enough information to answer that question. \
                                     Could you please provide more specific details?";

/// User prompt embedding the retrieved context block and the question
pub fn build_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "Context: {context}\n\n\
         Question: {question}\n\n\
         Answer the question based on the context provided. If the answer is not in the context, \
         ask the user to provide more specific details."
    )
}

/// User prompt merging partial answers produced per context chunk
pub fn build_summary_prompt(question: &str, responses: &[String]) -> String {
    format!(
        "I have received multiple responses to the question: {question}\n\n\
         Responses:\n{}\n\n\
         Please provide a coherent summary of these responses.",
        responses.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_prompt_layout() {
        let prompt = build_answer_prompt("doc A\ndoc B", "Why?");
        assert!(prompt
            .starts_with("Context: doc A\ndoc B\n\nQuestion: Why?\n\nAnswer the question"));
        assert!(prompt.ends_with("ask the user to provide more specific details."));
    }

    #[test]
    fn test_placeholders_in_inputs_are_not_expanded() {
        let prompt = build_answer_prompt("{question}", "Q");
        assert!(prompt.starts_with("Context: {question}\n"));
    }

    #[test]
    fn test_summary_prompt_joins_responses() {
        let prompt = build_summary_prompt("Why?", &["one".to_string(), "two".to_string()]);
        assert!(prompt.contains("question: Why?"));
        assert!(prompt.contains("Responses:\none\ntwo\n"));
    }
}
