//! Corpus storage.
//!
//! Two corpora exist:
//!
//! * the **static** corpus: hand-written examples compiled into the binary
//!   and used as the fine-tuning input.  Every entry is well-formed.
//! * the **generated** corpus: filled during a generation run and written to
//!   a JSON file at the end of it.
//!
//! Neither is ever deduplicated or reordered here: insertion order is the
//! order on disk and the order seen by the trainer.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::example::{CotExample, GeneratedRecord, ParsedExample};

const STATIC_EXAMPLES: &[(&str, &str)] = &[
    (
        "I have 5 apples and I buy 3 more boxes of apples. Each box contains 12 apples. How many apples do I have in total?",
        "Thought: The user starts with 5 apples. They buy 3 more boxes. Each box has 12 apples. First, I need to calculate the total number of new apples from the boxes. That is 3 boxes * 12 apples/box = 36 apples. Then, I need to add this to the initial number of apples. So, 36 new apples + 5 initial apples = 41 apples.\nFinal Answer: You have 41 apples in total.",
    ),
    (
        "Who was the U.S. President when the first person walked on the moon?",
        "Thought: The user is asking about the US President at the time of the first moonwalk. First, I need to determine the date of the first moonwalk. The Apollo 11 mission landed on the moon on July 20, 1969. Next, I need to find out who was the US President in July 1969. Richard Nixon was the President from 1969 to 1974. Therefore, Richard Nixon was president.\nFinal Answer: Richard Nixon was the U.S. President when the first person walked on the moon.",
    ),
    (
        "What is the capital of the country famous for the Eiffel Tower and what is that country's main language?",
        "Thought: This question has two parts. First, I need to identify the country famous for the Eiffel Tower. The Eiffel Tower is located in Paris, which is in France. So the country is France. Second, I need to find the capital of France, which is Paris. Third, I need to find the main language of France, which is French.\nFinal Answer: The capital is Paris, and the main language is French.",
    ),
    (
        "A train travels at 60 km/h. How long will it take to travel a distance of 150 km?",
        "Thought: The user wants to calculate the time it takes for a journey. The formula is Time = Distance / Speed. The distance is 150 km. The speed is 60 km/h. So, Time = 150 km / 60 km/h = 2.5 hours.\nFinal Answer: It will take 2.5 hours to travel a distance of 150 km.",
    ),
    (
        "Which planet is known as the Red Planet and what is the name of the largest volcano on it?",
        "Thought: The user is asking two things about a specific planet. First, I need to identify the planet known as the 'Red Planet'. That is Mars. Second, I need to find the name of the largest volcano on Mars. The largest volcano in the solar system is on Mars, and its name is Olympus Mons.\nFinal Answer: The planet known as the Red Planet is Mars, and the largest volcano on it is Olympus Mons.",
    ),
    (
        "If a shirt costs $20 after a 15% discount, what was the original price?",
        "Thought: The user wants to find the original price before a discount. The final price ($20) represents 100% - 15% = 85% of the original price. Let the original price be P. So, 0.85 * P = $20. To find P, I need to calculate P = $20 / 0.85. 20 divided by 0.85 is approximately 23.53.\nFinal Answer: The original price of the shirt was approximately $23.53.",
    ),
    (
        "Combine the mottos of the U.S. Marine Corps and the Royal Air Force.",
        "Thought: The user wants me to find and combine two mottos. First, find the motto of the U.S. Marine Corps. That is 'Semper Fidelis'. Second, find the motto of the Royal Air Force. That is 'Per ardua ad astra'. Now I will combine them.\nFinal Answer: The combined mottos are 'Semper Fidelis' and 'Per ardua ad astra'.",
    ),
];

/// The curated reference corpus, in its fixed order.
pub fn static_corpus() -> Vec<CotExample> {
    STATIC_EXAMPLES
        .iter()
        .map(|(q, a)| CotExample::new(*q, *a))
        .collect()
}

// ── GeneratedCorpus ───────────────────────────────────────────────────────────

/// Examples produced by a generation run, in the order they were generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedCorpus {
    records: Vec<ParsedExample>,
}

impl GeneratedCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one parse outcome.  Parse failures are kept as well.
    pub fn append(&mut self, example: ParsedExample) {
        self.records.push(example);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ParsedExample] {
        &self.records
    }

    /// Question/answer pairs usable as training data, in order.
    ///
    /// Malformed examples are included; parse failures have no fields to
    /// train on and are skipped.
    pub fn training_examples(&self) -> Vec<CotExample> {
        self.records
            .iter()
            .filter_map(|r| r.example().cloned())
            .collect()
    }

    /// Write the whole corpus to `path` as a pretty-printed JSON array,
    /// replacing anything already there.
    ///
    /// The in-memory records are untouched on failure.
    pub fn persist(&self, path: &Path) -> CoreResult<()> {
        let records: Vec<GeneratedRecord> = self.records.iter().map(GeneratedRecord::from).collect();

        let write = || -> io::Result<()> {
            let file = fs::File::create(path)?;
            let mut writer = BufWriter::new(file);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
            records.serialize(&mut ser).map_err(io::Error::from)?;
            writer.flush()
        };

        write().map_err(|source| CoreError::Persist { path: path.to_path_buf(), source })?;

        info!(path = %path.display(), count = records.len(), "Generated corpus saved");
        Ok(())
    }

    /// Read a corpus previously written by [`GeneratedCorpus::persist`].
    pub fn load(path: &Path) -> CoreResult<Self> {
        let json = fs::read_to_string(path)?;
        let raw: Vec<GeneratedRecord> = serde_json::from_str(&json)?;

        let records = raw
            .into_iter()
            .enumerate()
            .map(|(index, rec)| {
                ParsedExample::try_from(rec)
                    .map_err(|reason| CoreError::InvalidRecord { index, reason })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        info!(path = %path.display(), count = records.len(), "Generated corpus loaded");
        Ok(Self { records })
    }
}

impl Extend<ParsedExample> for GeneratedCorpus {
    fn extend<I: IntoIterator<Item = ParsedExample>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}
