//! Beam search over an arbitrary next-token scorer.
//!
//! The search knows nothing about models: `step` receives the current
//! prefixes (all the same length) and returns one row of log-probabilities
//! over the vocabulary per prefix.

use anyhow::{ensure, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamConfig {
    pub num_beams: usize,
    /// Maximum decoder length, start token included.
    pub max_length: usize,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self { num_beams: 5, max_length: 256 }
    }
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    /// Sum of token log-probabilities.
    log_prob: f32,
}

#[derive(Debug, Clone)]
struct Finished {
    /// Generated tokens, without the start token or the end token.
    tokens: Vec<u32>,
    /// `log_prob` divided by the number of generated tokens (end token counted).
    score: f32,
}

/// Find the highest-scoring sequence.
///
/// - Every step keeps the `num_beams` best live extensions.
/// - An end-of-sequence extension that ranks among those best is moved to
///   the finished set instead of staying live.
/// - The search stops once `num_beams` hypotheses have finished (or no live
///   beam remains); beams still live at `max_length` are finished as-is.
///
/// Finished hypotheses are ranked by mean log-probability per generated
/// token.  The returned tokens exclude `start` and `eos`.
pub fn beam_search<F>(config: &BeamConfig, start: u32, eos: u32, mut step: F) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    ensure!(config.num_beams > 0, "num_beams must be positive");
    ensure!(config.max_length > 1, "max_length must leave room for at least one token");

    let width = config.num_beams;
    let mut live = vec![Hypothesis { tokens: vec![start], log_prob: 0.0 }];
    let mut finished: Vec<Finished> = Vec::new();

    while !live.is_empty() && finished.len() < width && live[0].tokens.len() < config.max_length {
        let prefixes: Vec<Vec<u32>> = live.iter().map(|h| h.tokens.clone()).collect();
        let scores = step(&prefixes)?;
        ensure!(
            scores.len() == live.len(),
            "scorer returned {} rows for {} beams",
            scores.len(),
            live.len()
        );

        // (beam, token, cumulative log-prob); two per beam survive so an
        // end token never crowds out every live continuation.
        let mut candidates: Vec<(usize, u32, f32)> = Vec::with_capacity(live.len() * 2 * width);
        for (b, row) in scores.iter().enumerate() {
            for (tok, lp) in top_k(row, 2 * width) {
                candidates.push((b, tok, live[b].log_prob + lp));
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut next = Vec::with_capacity(width);
        for (rank, &(b, tok, log_prob)) in candidates.iter().enumerate() {
            if tok == eos {
                if rank < width {
                    let generated = live[b].tokens.len();
                    finished.push(Finished {
                        tokens: live[b].tokens[1..].to_vec(),
                        score: log_prob / generated as f32,
                    });
                }
                continue;
            }
            let mut tokens = live[b].tokens.clone();
            tokens.push(tok);
            next.push(Hypothesis { tokens, log_prob });
            if next.len() == width {
                break;
            }
        }
        live = next;
    }

    if finished.len() < width {
        for h in live.into_iter().take(width - finished.len()) {
            let generated = (h.tokens.len() - 1).max(1);
            finished.push(Finished { tokens: h.tokens[1..].to_vec(), score: h.log_prob / generated as f32 });
        }
    }

    Ok(finished
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|f| f.tokens)
        .unwrap_or_default())
}

/// The `k` highest entries of `row` as `(index, value)`, best first.
fn top_k(row: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = row.iter().enumerate().map(|(i, &v)| (i as u32, v)).collect();
    let k = k.min(indexed.len());
    if k == 0 {
        return Vec::new();
    }
    indexed.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u32 = 0;
    const EOS: u32 = 1;
    const A: u32 = 2;
    const B: u32 = 3;

    fn ln(p: &[f32]) -> Vec<f32> {
        p.iter().map(|x| x.ln()).collect()
    }

    /// Greedy would pick A (0.6) first, but B is followed by a near-certain
    /// end token while A leads into a flat distribution.
    fn trap(prefix: &[u32]) -> Vec<f32> {
        match prefix {
            [START] => ln(&[1e-6, 1e-6, 0.6, 0.4]),
            [START, A] => ln(&[1e-6, 0.3, 0.35, 0.35]),
            [START, B] => ln(&[1e-6, 0.95, 0.025, 0.025]),
            _ => ln(&[1e-6, 0.9, 0.05, 0.05]),
        }
    }

    fn run(config: BeamConfig, f: fn(&[u32]) -> Vec<f32>) -> Vec<u32> {
        beam_search(&config, START, EOS, |prefixes| Ok(prefixes.iter().map(|p| f(p)).collect())).unwrap()
    }

    #[test]
    fn beams_escape_the_greedy_trap() {
        let out = run(BeamConfig { num_beams: 2, max_length: 10 }, trap);
        assert_eq!(out, vec![B]);
    }

    #[test]
    fn single_beam_is_greedy() {
        let out = run(BeamConfig { num_beams: 1, max_length: 10 }, trap);
        assert_eq!(out[0], A);
    }

    #[test]
    fn max_length_caps_output() {
        fn never_ends(_: &[u32]) -> Vec<f32> {
            ln(&[1e-6, 1e-6, 0.7, 0.3])
        }
        let out = run(BeamConfig { num_beams: 3, max_length: 5 }, never_ends);
        assert_eq!(out, vec![A, A, A, A]);
    }

    #[test]
    fn immediate_end_yields_empty_output() {
        fn ends(_: &[u32]) -> Vec<f32> {
            ln(&[1e-6, 0.99, 0.005, 0.005])
        }
        let out = run(BeamConfig { num_beams: 1, max_length: 10 }, ends);
        assert!(out.is_empty());
    }

    #[test]
    fn scorer_errors_propagate() {
        let res = beam_search(&BeamConfig::default(), START, EOS, |_| anyhow::bail!("boom"));
        assert!(res.is_err());
    }

    #[test]
    fn top_k_orders_best_first() {
        assert_eq!(top_k(&[0.1, 0.5, 0.3, 0.2], 2), vec![(1, 0.5), (2, 0.3)]);
        assert_eq!(top_k(&[0.1], 4), vec![(0, 0.1)]);
    }
}
