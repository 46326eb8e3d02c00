use std::collections::HashMap;

use corpus_types::{DocumentId, WordCount, ratio};

/// Word counts for one document.
///
/// Built once from a token sequence and never modified afterwards. Every
/// stored count is non-zero and the counts sum to [`FrequencyTable::total`].
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyTable {
    id: DocumentId,
    entries: Vec<(String, u64)>,
    positions: HashMap<String, usize>,
    total: u64,
}

/// Descriptive statistics for one document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DocumentStats {
    pub total_tokens: u64,
    pub distinct_words: usize,
    pub hapax_legomena: usize,
    pub type_token_ratio: f64,
}

impl FrequencyTable {
    /// Count a token sequence. An empty sequence gives an empty table.
    pub fn build<I, S>(id: impl Into<DocumentId>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for token in tokens {
            let token = token.as_ref();
            if let Some(count) = counts.get_mut(token) {
                *count += 1;
            } else {
                counts.insert(token.to_string(), 1);
            }
        }
        Self::from_counts(id, counts)
    }

    /// Wrap precomputed counts. Zero counts are dropped.
    pub fn from_counts<I, S>(id: impl Into<DocumentId>, counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut merged: HashMap<String, u64> = HashMap::new();
        for (word, count) in counts {
            if count > 0 {
                *merged.entry(word.into()).or_insert(0) += count;
            }
        }

        let mut entries: Vec<(String, u64)> = merged.into_iter().collect();
        entries.sort_by(|(wa, ca), (wb, cb)| cb.cmp(ca).then_with(|| wa.cmp(wb)));
        let total = entries.iter().map(|(_, c)| *c).sum();
        let positions = entries
            .iter()
            .enumerate()
            .map(|(idx, (word, _))| (word.clone(), idx))
            .collect();

        Self {
            id: id.into(),
            entries,
            positions,
            total,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Number of tokens counted.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct words.
    pub fn distinct(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw count for a word, 0 if absent.
    pub fn count(&self, word: &str) -> u64 {
        self.positions
            .get(word)
            .map(|idx| self.entries[*idx].1)
            .unwrap_or(0)
    }

    /// `count / total`; 0.0 for absent words and for empty tables.
    pub fn relative_frequency(&self, word: &str) -> f64 {
        ratio(self.count(word), self.total)
    }

    /// Words by count descending, ties lexicographic.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = WordCount<'_>> + '_ {
        self.entries.iter().map(|(word, count)| WordCount {
            word: word.as_str(),
            count: *count,
        })
    }

    /// `(word, relative frequency)` in [`entries`](Self::entries) order.
    pub fn relative_frequencies(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries
            .iter()
            .map(|(word, count)| (word.as_str(), ratio(*count, self.total)))
    }

    /// Words occurring exactly once.
    pub fn hapax_legomena(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|(_, count)| *count == 1)
            .map(|(word, _)| word.as_str())
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats {
            total_tokens: self.total,
            distinct_words: self.distinct(),
            hapax_legomena: self.hapax_legomena().count(),
            type_token_ratio: ratio(self.distinct() as u64, self.total),
        }
    }
}
