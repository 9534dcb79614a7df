//! Parsing and validation of generator output.
//!
//! Generator models are unreliable about structure, so classification is
//! deliberately permissive: only a missing `Question:`/`Answer:` envelope
//! makes an example unusable.  Everything else is downgraded, never dropped.

use crate::example::{
    CotExample, ParsedExample, ANSWER_MARKER, FINAL_ANSWER_MARKER, QUESTION_MARKER,
};

/// Classify a raw completion.
///
/// 1. Both `Question:` and `Answer:` present: split once after the first
///    `Question:`, then once on the first `Answer:` of the remainder.  Both
///    halves are trimmed.  The example is [`ParsedExample::WellFormed`] when
///    the answer holds `Thought:` and `Final Answer:` (any order), otherwise
///    [`ParsedExample::MalformedParsed`].
/// 2. Otherwise [`ParsedExample::ParseFailure`] with the text kept verbatim.
///
/// When the only `Answer:` in the text sits before `Question:` the remainder
/// has nothing to split on; the whole remainder becomes the question and the
/// answer is empty, which grades as malformed.
pub fn parse_completion(text: &str) -> ParsedExample {
    if !(text.contains(QUESTION_MARKER) && text.contains(ANSWER_MARKER)) {
        return ParsedExample::ParseFailure { raw_text: text.to_string() };
    }

    let after_question = text
        .split_once(QUESTION_MARKER)
        .map(|(_, rest)| rest)
        .unwrap_or_default();

    let (question, answer) = match after_question.split_once(ANSWER_MARKER) {
        Some((q, a)) => (q.trim(), a.trim()),
        None => (after_question.trim(), ""),
    };

    let example = CotExample::new(question, answer);
    if example.has_cot_markers() {
        ParsedExample::WellFormed(example)
    } else {
        ParsedExample::MalformedParsed(example)
    }
}

/// Extract the answer to show an end user.
///
/// Returns the trimmed text after the **last** `Final Answer:`; text without
/// the marker comes back unchanged.
pub fn extract_final_answer(text: &str) -> &str {
    match text.rsplit_once(FINAL_ANSWER_MARKER) {
        Some((_, tail)) => tail.trim(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_well_formed() {
        let input = "Question: What is 2+2?\nAnswer: Thought: Add 2 and 2.\nFinal Answer: 4";
        let parsed = parse_completion(input);
        assert_eq!(
            parsed,
            ParsedExample::WellFormed(CotExample::new(
                "What is 2+2?",
                "Thought: Add 2 and 2.\nFinal Answer: 4"
            ))
        );
        let answer = &parsed.example().unwrap().answer;
        assert_eq!(extract_final_answer(answer), "4");
    }

    #[test]
    fn end_to_end_no_markers() {
        let input = "I'm not sure.";
        assert_eq!(
            parse_completion(input),
            ParsedExample::ParseFailure { raw_text: "I'm not sure.".into() }
        );
        assert_eq!(extract_final_answer(input), "I'm not sure.");
    }

    #[test]
    fn preamble_before_question_is_discarded() {
        let input = "Sure! Here you go.\n\nQuestion:  Why is the sky blue? \nAnswer: Thought: scattering.\nFinal Answer: Rayleigh scattering.";
        let parsed = parse_completion(input);
        let ex = parsed.example().unwrap();
        assert!(parsed.is_well_formed());
        assert_eq!(ex.question, "Why is the sky blue?");
        assert_eq!(ex.answer, "Thought: scattering.\nFinal Answer: Rayleigh scattering.");
    }

    #[test]
    fn split_uses_first_answer_marker() {
        // "Final Answer:" also contains "Answer:"; the envelope split must use
        // the first occurrence after the question.
        let input = "Question: q\nAnswer: Thought: t\nFinal Answer: f";
        let ex = parse_completion(input).into_example().unwrap();
        assert_eq!(ex.question, "q");
        assert_eq!(ex.answer, "Thought: t\nFinal Answer: f");
    }

    #[test]
    fn missing_thought_is_malformed_not_failure() {
        let input = "Question: q\nAnswer: Final Answer: 42";
        let parsed = parse_completion(input);
        assert_eq!(
            parsed,
            ParsedExample::MalformedParsed(CotExample::new("q", "Final Answer: 42"))
        );
    }

    #[test]
    fn missing_both_inner_markers_is_malformed() {
        let parsed = parse_completion("Question: q\nAnswer: just 42");
        assert!(matches!(parsed, ParsedExample::MalformedParsed(_)));
    }

    #[test]
    fn inner_marker_order_is_not_enforced() {
        let parsed = parse_completion("Question: q\nAnswer: Final Answer: 4\nThought: add");
        assert!(parsed.is_well_formed());
    }

    #[test]
    fn missing_answer_marker_is_failure() {
        let input = "Question: What is 2+2? Thought: add. The result: 4";
        assert_eq!(
            parse_completion(input),
            ParsedExample::ParseFailure { raw_text: input.into() }
        );
    }

    #[test]
    fn missing_question_marker_is_failure() {
        let input = "Answer: Thought: x\nFinal Answer: y";
        assert_eq!(
            parse_completion(input),
            ParsedExample::ParseFailure { raw_text: input.into() }
        );
    }

    #[test]
    fn answer_marker_only_before_question() {
        let parsed = parse_completion("Answer: first\nQuestion: dangling");
        assert_eq!(parsed, ParsedExample::MalformedParsed(CotExample::new("dangling", "")));
    }

    #[test]
    fn extraction_uses_last_final_answer() {
        let text = "Thought: Final Answer: is not yet known.\nFinal Answer:  Paris \n";
        assert_eq!(extract_final_answer(text), "Paris");
    }

    #[test]
    fn extraction_without_marker_is_identity() {
        let text = "  spaced output without markers \n";
        assert_eq!(extract_final_answer(text), text);
    }

    #[test]
    fn extraction_of_trailing_marker_is_empty() {
        assert_eq!(extract_final_answer("Thought: hmm\nFinal Answer:"), "");
    }
}
