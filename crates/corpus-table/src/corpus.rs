use std::collections::HashMap;

use corpus_types::DocumentId;
use tracing::debug;

use crate::CorpusError;
use crate::frequency::FrequencyTable;

/// One document column: its id and how many tokens it contributed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentColumn {
    pub id: DocumentId,
    pub total_tokens: u64,
}

#[derive(Clone, Debug)]
struct RowData {
    word: String,
    total: u64,
    /// `(column, count)` sorted by column; zero counts are never stored.
    cells: Vec<(usize, u64)>,
}

impl RowData {
    fn count(&self, column: usize) -> u64 {
        self.cells
            .binary_search_by_key(&column, |(col, _)| *col)
            .map(|idx| self.cells[idx].1)
            .unwrap_or(0)
    }
}

/// Borrowed view of one word row.
#[derive(Clone, Copy, Debug)]
pub struct CorpusRow<'a> {
    table: &'a CorpusTable,
    data: &'a RowData,
}

impl<'a> CorpusRow<'a> {
    pub fn word(&self) -> &'a str {
        &self.data.word
    }

    /// Sum of the word's counts across all documents.
    pub fn total(&self) -> u64 {
        self.data.total
    }

    /// Count in the given column position.
    pub fn count_at(&self, column: usize) -> u64 {
        self.data.count(column)
    }

    /// Dense counts aligned with [`CorpusTable::documents`].
    pub fn counts(&self) -> Vec<u64> {
        let mut dense = vec![0; self.table.columns.len()];
        for (col, count) in &self.data.cells {
            dense[*col] = *count;
        }
        dense
    }

    /// Non-zero cells as `(document, count)`.
    pub fn nonzero(&self) -> impl Iterator<Item = (&'a DocumentId, u64)> + 'a {
        let table: &'a CorpusTable = self.table;
        let data: &'a RowData = self.data;
        let columns = &table.columns;
        data.cells
            .iter()
            .map(move |(col, count)| (&columns[*col].id, *count))
    }
}

/// Word x document count matrix for a whole run.
///
/// Stored sparsely: a cell that was never written reads as zero. Columns keep
/// the order in which documents were added. Rows are ordered by total count
/// descending with ties broken lexicographically.
///
/// Equality ignores column order: two tables are equal when they hold the
/// same documents with the same token totals and the same count in every
/// cell. That makes aggregation order-independent under `==`.
#[derive(Clone, Debug, Default)]
pub struct CorpusTable {
    columns: Vec<DocumentColumn>,
    column_index: HashMap<DocumentId, usize>,
    rows: Vec<RowData>,
    row_index: HashMap<String, usize>,
}

/// Incremental aggregator. Add tables one at a time, then [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    table: CorpusTable,
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one document's table as a new column.
    ///
    /// Fails without modifying the builder if the document id was already
    /// added.
    pub fn add(&mut self, doc: &FrequencyTable) -> Result<(), CorpusError> {
        let table = &mut self.table;
        if table.column_index.contains_key(doc.id()) {
            return Err(CorpusError::DuplicateDocument(doc.id().clone()));
        }

        let column = table.columns.len();
        table.columns.push(DocumentColumn {
            id: doc.id().clone(),
            total_tokens: doc.total(),
        });
        table.column_index.insert(doc.id().clone(), column);

        for entry in doc.entries() {
            let row = match table.row_index.get(entry.word) {
                Some(idx) => *idx,
                None => {
                    table.rows.push(RowData {
                        word: entry.word.to_string(),
                        total: 0,
                        cells: Vec::new(),
                    });
                    let idx = table.rows.len() - 1;
                    table.row_index.insert(entry.word.to_string(), idx);
                    idx
                }
            };
            let row = &mut table.rows[row];
            row.total += entry.count;
            row.cells.push((column, entry.count));
        }

        debug!(
            document = %doc.id(),
            tokens = doc.total(),
            words = doc.distinct(),
            "merged document into corpus"
        );
        Ok(())
    }

    pub fn document_count(&self) -> usize {
        self.table.columns.len()
    }

    /// Freeze the table and fix the row order.
    pub fn finish(self) -> CorpusTable {
        let mut table = self.table;
        table
            .rows
            .sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.word.cmp(&b.word)));
        table.row_index = table
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.word.clone(), idx))
            .collect();
        table
    }
}

impl CorpusTable {
    /// Aggregate a batch of tables. Zero tables give an empty corpus.
    pub fn aggregate<'a, I>(tables: I) -> Result<Self, CorpusError>
    where
        I: IntoIterator<Item = &'a FrequencyTable>,
    {
        let mut builder = CorpusBuilder::new();
        for table in tables {
            builder.add(table)?;
        }
        Ok(builder.finish())
    }

    /// Document columns in insertion order.
    pub fn documents(&self) -> &[DocumentColumn] {
        &self.columns
    }

    pub fn document(&self, id: &str) -> Option<&DocumentColumn> {
        self.column_index.get(id).map(|idx| &self.columns[*idx])
    }

    pub fn document_position(&self, id: &str) -> Option<usize> {
        self.column_index.get(id).copied()
    }

    /// Number of distinct words (rows).
    pub fn word_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Count of `word` in document `id`; 0 when either is unknown.
    pub fn count(&self, word: &str, id: &str) -> u64 {
        match (self.row_index.get(word), self.column_index.get(id)) {
            (Some(row), Some(col)) => self.rows[*row].count(*col),
            _ => 0,
        }
    }

    pub fn row(&self, word: &str) -> Option<CorpusRow<'_>> {
        self.row_index.get(word).map(|idx| CorpusRow {
            table: self,
            data: &self.rows[*idx],
        })
    }

    /// Rows by total count descending, ties lexicographic.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = CorpusRow<'_>> + '_ {
        self.rows.iter().map(move |data| CorpusRow { table: self, data })
    }

    /// Contingency matrix for the given documents: one row per document, one
    /// column per corpus word in [`rows`](Self::rows) order.
    pub fn contingency(&self, ids: &[&str]) -> Result<Vec<Vec<u64>>, CorpusError> {
        let columns = ids
            .iter()
            .map(|id| {
                self.document_position(id)
                    .ok_or_else(|| CorpusError::UnknownDocument(id.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns
            .into_iter()
            .map(|col| self.rows.iter().map(|row| row.count(col)).collect())
            .collect())
    }
}

impl PartialEq for CorpusTable {
    fn eq(&self, other: &Self) -> bool {
        if self.columns.len() != other.columns.len() || self.rows.len() != other.rows.len() {
            return false;
        }
        let columns_match = self.columns.iter().all(|col| {
            other
                .document(col.id.as_str())
                .is_some_and(|theirs| theirs.total_tokens == col.total_tokens)
        });
        if !columns_match {
            return false;
        }
        self.rows.iter().all(|row| {
            let Some(theirs) = other.row_index.get(&row.word).map(|idx| &other.rows[*idx]) else {
                return false;
            };
            theirs.cells.len() == row.cells.len()
                && row.cells.iter().all(|(col, count)| {
                    let id = self.columns[*col].id.as_str();
                    other.count(&row.word, id) == *count
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(id: &str, tokens: &[&str]) -> FrequencyTable {
        FrequencyTable::build(id, tokens.iter().copied())
    }

    #[test]
    fn fills_missing_cells_with_zero() {
        let a = table("A", &["the", "cat", "sat"]);
        let b = table("B", &["the", "dog", "ran"]);
        let corpus = CorpusTable::aggregate([&a, &b]).unwrap();

        assert_eq!(corpus.word_count(), 5);
        assert_eq!(corpus.row("the").unwrap().counts(), vec![1, 1]);
        assert_eq!(corpus.row("cat").unwrap().counts(), vec![1, 0]);
        assert_eq!(corpus.row("dog").unwrap().counts(), vec![0, 1]);
        assert_eq!(corpus.count("missing", "A"), 0);
        assert_eq!(corpus.count("the", "missing"), 0);
    }

    #[test]
    fn rows_sorted_by_total_then_word() {
        let a = table("A", &["b", "a", "c", "c"]);
        let b = table("B", &["a", "d"]);
        let corpus = CorpusTable::aggregate([&a, &b]).unwrap();
        let words: Vec<&str> = corpus.rows().map(|r| r.word()).collect();
        assert_eq!(words, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn rejects_duplicate_document_without_overwriting() {
        let first = table("A", &["x"]);
        let second = table("A", &["y", "y"]);
        let mut builder = CorpusBuilder::new();
        builder.add(&first).unwrap();
        let err = builder.add(&second).unwrap_err();
        assert!(matches!(err, CorpusError::DuplicateDocument(ref id) if id.as_str() == "A"));

        let corpus = builder.finish();
        assert_eq!(corpus.count("x", "A"), 1);
        assert_eq!(corpus.count("y", "A"), 0);
        assert_eq!(corpus.word_count(), 1);
    }

    #[test]
    fn empty_input_gives_empty_corpus() {
        let corpus = CorpusTable::aggregate(std::iter::empty::<&FrequencyTable>()).unwrap();
        assert!(corpus.is_empty());
        assert_eq!(corpus.word_count(), 0);
    }

    #[test]
    fn empty_document_becomes_zero_column() {
        let a = table("A", &["x", "y"]);
        let empty = table("E", &[]);
        let corpus = CorpusTable::aggregate([&a, &empty]).unwrap();
        assert_eq!(corpus.documents().len(), 2);
        assert_eq!(corpus.document("E").unwrap().total_tokens, 0);
        assert_eq!(corpus.row("x").unwrap().counts(), vec![1, 0]);
    }

    #[test]
    fn contingency_follows_row_order() {
        let a = table("A", &["x", "x", "y"]);
        let b = table("B", &["y", "z"]);
        let corpus = CorpusTable::aggregate([&a, &b]).unwrap();
        let matrix = corpus.contingency(&["B", "A"]).unwrap();
        // rows: x(2), y(2), z(1)
        assert_eq!(matrix, vec![vec![0, 1, 1], vec![2, 1, 0]]);
        assert!(matches!(
            corpus.contingency(&["nope"]),
            Err(CorpusError::UnknownDocument(_))
        ));
    }
}
