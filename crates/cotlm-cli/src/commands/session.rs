//! The line-oriented question/answer loop shared by `infer` and `chat`.
//!
//! Each non-empty line is one turn.  `exit`, `quit`, end of input and
//! Ctrl+C all end the session normally, whether Ctrl+C arrives while waiting
//! for input or while a question is being answered.  A turn that fails is
//! reported and the session waits for the next question.

use std::future::Future;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use cotlm_core::{extract_final_answer, TurnInput};

/// Something that answers one question with a full (reasoning included)
/// completion.
pub trait Answerer {
    async fn answer(&mut self, question: &str) -> Result<String>;
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ExitCommand,
    EndOfInput,
    Interrupted,
}

/// Counters reported when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub answered: usize,
    pub failed: usize,
}

/// Resolves on the next Ctrl+C.  If the signal handler cannot be installed
/// it never resolves, and Ctrl+C keeps its default behaviour.
pub async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub async fn run_session<R, W, A>(
    input: R,
    out: &mut W,
    answerer: &mut A,
    show_thought: bool,
) -> Result<(SessionEnd, SessionStats)>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    A: Answerer,
{
    run_session_until(input, out, answerer, show_thought, ctrl_c).await
}

/// [`run_session`] with the interrupt source supplied by the caller.
/// `interrupt` is called once per wait and the returned future is raced
/// against reading input and against each answer.
pub async fn run_session_until<R, W, A, I, F>(
    input: R,
    out: &mut W,
    answerer: &mut A,
    show_thought: bool,
    mut interrupt: I,
) -> Result<(SessionEnd, SessionStats)>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    A: Answerer,
    I: FnMut() -> F,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut stats = SessionStats::default();

    let end = loop {
        write!(out, "You: ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt() => {
                writeln!(out)?;
                break SessionEnd::Interrupted;
            }
        };

        let Some(line) = line else {
            writeln!(out)?;
            break SessionEnd::EndOfInput;
        };

        let question = match TurnInput::classify(&line) {
            TurnInput::Exit => break SessionEnd::ExitCommand,
            TurnInput::Empty => continue,
            TurnInput::Question(q) => q,
        };

        let answered = tokio::select! {
            answered = answerer.answer(&question) => answered,
            _ = interrupt() => {
                writeln!(out, "\n[Interrupted]")?;
                break SessionEnd::Interrupted;
            }
        };

        match answered {
            Ok(text) => {
                stats.answered += 1;
                if show_thought {
                    writeln!(out, "\n--- Full output ---\n{}\n-------------------", text.trim())?;
                }
                writeln!(out, "AI: {}\n", extract_final_answer(&text))?;
            }
            Err(e) => {
                stats.failed += 1;
                warn!(error = %e, "Turn failed");
                writeln!(out, "Error: {e:#}\n")?;
            }
        }
    };

    writeln!(out, "Goodbye!")?;
    out.flush()?;
    Ok((end, stats))
}
