//! Word co-occurrence graphs built from free text
//!
//! The most frequent words become nodes; two kept words that appear next to
//! each other in the text are joined by an edge.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{GraphSource, SourceError, SourceResult};
use crate::graph::{GraphData, GraphStore};

/// Lowercased runs of word characters (alphanumeric or `_`)
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// The `limit` most frequent words with their counts, ties broken by first occurrence
fn most_common(words: &[String], limit: usize) -> Vec<(&str, usize)> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, word) in words.iter().enumerate() {
        counts.entry(word.as_str()).or_insert((0, i)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by_key(|&(_, count, first)| (Reverse(count), first));
    ranked
        .into_iter()
        .take(limit)
        .map(|(word, count, _)| (word, count))
        .collect()
}

/// Graph built from the words of a text file
#[derive(Debug, Clone)]
pub struct TextSource {
    path: PathBuf,
    max_unique_words: usize,
}

impl TextSource {
    pub fn new(path: impl AsRef<Path>, max_unique_words: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_unique_words,
        }
    }

    /// Build the co-occurrence graph of `text`
    pub fn build(
        text: &str,
        max_unique_words: usize,
        max_position: f64,
    ) -> SourceResult<GraphData> {
        let words = tokenize(text);
        if words.is_empty() {
            return Err(SourceError::Empty("no words found in text".to_string()));
        }

        let ranked = most_common(&words, max_unique_words);
        for (word, count) in ranked.iter().take(10) {
            tracing::info!(word, count, "frequent word");
        }

        let mut store = GraphStore::new(max_position);
        for (word, _) in &ranked {
            store.add_node(word);
        }
        let kept: HashSet<&str> = ranked.iter().map(|(word, _)| *word).collect();

        for pair in words.windows(2) {
            let (a, b) = (pair[0].as_str(), pair[1].as_str());
            if kept.contains(a) && kept.contains(b) {
                store.add_edge(a, b);
            }
        }

        let mut degrees: Vec<(&str, usize)> = store
            .ids()
            .iter()
            .map(|id| (id.as_str(), store.degree(id).unwrap_or(0)))
            .collect();
        degrees.sort_by_key(|&(_, degree)| Reverse(degree));
        for (word, degree) in degrees.iter().take(5) {
            tracing::info!(word, degree, "high-degree word");
        }

        tracing::info!(
            nodes = store.len(),
            edges = store.edge_count(),
            "text graph built"
        );
        Ok(store.snapshot())
    }
}

impl GraphSource for TextSource {
    fn load(&self, max_position: f64) -> SourceResult<GraphData> {
        tracing::info!(path = %self.path.display(), "loading text");
        let text = std::fs::read_to_string(&self.path)?;
        Self::build(&text, self.max_unique_words, max_position)
    }

    fn kind(&self) -> &str {
        "text"
    }
}
