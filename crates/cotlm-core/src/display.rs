//! Removal of private reasoning blocks from generator output.
//!
//! Reasoning models (DeepSeek-R1 and its distills) prefix their visible answer
//! with an internal monologue wrapped in `<think>` tags.  That monologue often
//! mentions the very markers the CoT parser looks for, so it is removed before
//! parsing or display.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Return `text` without its `<think>…</think>` blocks.
///
/// - Whitespace right after a removed block is trimmed so the visible text
///   does not start with blank lines.
/// - A lone leading `</think>` (the chat template already opened the block)
///   drops everything before it.
/// - An unclosed `<think>` keeps its content: a model cut off mid-thought
///   still shows something rather than nothing.
pub fn strip_think_blocks(text: &str) -> String {
    let mut rest = text;

    // Template-opened block: the completion starts inside the reasoning.
    if let Some(close) = rest.find(CLOSE_TAG) {
        let opens_before = rest[..close].contains(OPEN_TAG);
        if !opens_before {
            rest = trim_leading(&rest[close + CLOSE_TAG.len()..]);
        }
    }

    let mut out = String::with_capacity(rest.len());
    loop {
        let Some(open) = rest.find(OPEN_TAG) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..open]);
        let inner = &rest[open + OPEN_TAG.len()..];
        match inner.find(CLOSE_TAG) {
            Some(close) => rest = trim_leading(&inner[close + CLOSE_TAG.len()..]),
            None => {
                out.push_str(trim_leading(inner));
                break;
            }
        }
    }
    out
}

fn trim_leading(s: &str) -> &str {
    s.trim_start_matches(['\n', '\r', ' '])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_no_think() {
        assert_eq!(strip_think_blocks("Hello world"), "Hello world");
    }

    #[test]
    fn strips_single_think_block() {
        let res = strip_think_blocks("<think>internal reasoning</think>\n\nHello!");
        assert_eq!(res, "Hello!");
    }

    #[test]
    fn strips_multiple_think_blocks() {
        let res = strip_think_blocks("<think>step 1</think>Answer: <think>step 2</think>Done.");
        assert_eq!(res, "Answer: Done.");
    }

    #[test]
    fn unclosed_think_emitted_as_fallback() {
        assert_eq!(strip_think_blocks("<think>\nnever closed"), "never closed");
    }

    #[test]
    fn template_opened_block_is_dropped() {
        let res = strip_think_blocks("Okay, the user wants Question: ...\n</think>\nQuestion: q\nAnswer: a");
        assert_eq!(res, "Question: q\nAnswer: a");
    }

    #[test]
    fn markers_inside_reasoning_do_not_survive() {
        let res = strip_think_blocks(
            "<think>Maybe Final Answer: 5?</think>Thought: 2+2.\nFinal Answer: 4",
        );
        assert_eq!(res, "Thought: 2+2.\nFinal Answer: 4");
    }
}
