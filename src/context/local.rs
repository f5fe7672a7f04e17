//! Local keyword retriever
//!
//! Offline backend over a directory of `.md` / `.txt` documents. Documents
//! are split into paragraph fragments; a fragment scores one point per
//! query term it contains. Suitable for runs without a search service.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{ContextRetriever, RetrievalError, SearchHit};

/// Query terms shorter than this are ignored
const MIN_TERM_LEN: usize = 3;

/// Keyword search over in-memory fragments
#[derive(Debug, Clone, Default)]
pub struct LocalRetriever {
    fragments: Vec<String>,
}

impl LocalRetriever {
    /// Use the given fragments as the searchable corpus.
    pub fn from_fragments(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    /// Load every `.md` / `.txt` file in `dir` (non-recursive), split on blank lines.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let dir = dir.as_ref();
        let unavailable = |e: std::io::Error| {
            RetrievalError::Unavailable(format!("{}: {}", dir.display(), e))
        };

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(unavailable)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("txt")
                    })
            })
            .collect();
        paths.sort();

        let mut fragments = Vec::new();
        for path in &paths {
            let text = std::fs::read_to_string(path).map_err(unavailable)?;
            fragments.extend(split_paragraphs(&text));
        }

        info!(
            dir = %dir.display(),
            documents = paths.len(),
            fragments = fragments.len(),
            "Loaded local search corpus"
        );
        Ok(Self { fragments })
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

fn relevance(terms: &[String], fragment: &str) -> usize {
    let lower = fragment.to_lowercase();
    terms.iter().filter(|t| lower.contains(t.as_str())).count()
}

#[async_trait]
impl ContextRetriever for LocalRetriever {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let mut terms: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|t| t.len() >= MIN_TERM_LEN)
            .map(str::to_string)
            .collect();
        terms.sort();
        terms.dedup();

        let mut scored: Vec<(usize, &String)> = self
            .fragments
            .iter()
            .map(|f| (relevance(&terms, f), f))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps corpus order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top)
            .map(|(score, content)| SearchHit {
                content: content.clone(),
                score: score as f64,
            })
            .collect())
    }

    fn retriever_name(&self) -> &'static str {
        "Local"
    }
}
