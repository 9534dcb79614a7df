//! Meta-prompts for the generator model.
//!
//! Both templates are pure string interpolation.  User text is inserted as-is:
//! the generator is a locally served, trusted model.

/// Prompt asking the generator to invent a question about `topic` and answer
/// it in the `Question:` / `Answer: Thought: … Final Answer: …` shape.
pub fn build_generation_prompt(topic: &str) -> String {
    format!(
        r#"
You are an expert data generator for training AI models.
Your task is to create a question and a detailed Chain-of-Thought (CoT) answer for the given topic.
The CoT answer must first show a step-by-step thought process (beginning with "Thought:") and then conclude with the final answer (beginning with "Final Answer:").

Topic: {topic}

Generate a unique question related to this topic and provide the CoT answer.
Example format:
Question: [Generated Question Here]
Answer: Thought: [Step-by-step reasoning here].
Final Answer: [Final concise answer here]

Do not include the "Topic:" line in your actual output. Start directly with "Question:".
"#
    )
}

/// Prompt asking the generator to answer an end-user question with the same
/// two CoT markers.
pub fn build_inference_prompt(question: &str) -> String {
    format!(
        r#"
Question: {question}

Provide a detailed step-by-step thought process (beginning with "Thought:") to arrive at the answer, and then state the final answer clearly (beginning with "Final Answer:").
"#
    )
}

/// Input text fed to the fine-tuned model, both while training and at inference.
pub fn format_training_input(question: &str) -> String {
    format!("question: {question}")
}
