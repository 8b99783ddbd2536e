// src/retrieval/lexical.rs — In-memory inverted index with BM25 scoring

use std::collections::HashMap;

use crate::playbook::types::Playbook;
use crate::util::tokenize;

/// Term-frequency saturation. Length normalization is folded into k1; with
/// short playbook descriptors document length carries little signal.
const BM25_K1: f64 = 2.2;

/// In-memory lexical index over the playbook corpus: playbook id -> term
/// frequencies. In-process only; each process rebuilds its own index from
/// the authoritative corpus.
#[derive(Default)]
pub struct LexicalIndex {
    docs: HashMap<String, HashMap<String, u32>>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index (or re-index) a playbook.
    pub fn index_playbook(&mut self, playbook: &Playbook) {
        let text = format!(
            "{} {} {} {} {} {}",
            playbook.name,
            playbook.description,
            playbook.playbook_type,
            playbook.domain,
            playbook.scenario,
            playbook.tags.join(" "),
        );
        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in tokenize(&text) {
            *tf.entry(token).or_default() += 1;
        }
        self.docs.insert(playbook.id.clone(), tf);
    }

    pub fn remove(&mut self, id: &str) {
        self.docs.remove(id);
    }

    pub fn clear(&mut self) {
        self.docs.clear();
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// BM25-score every indexed document against the query; top `limit`
    /// (id, score) pairs, best first. Documents scoring 0 are omitted.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let terms = tokenize(query);
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let mut scored: Vec<(String, f64)> = Vec::new();

        for (id, tf_map) in &self.docs {
            let mut score = 0.0;
            for term in &terms {
                let tf = *tf_map.get(term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let df = self.document_frequency(term) as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                score += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1);
            }
            if score > 0.0 {
                scored.push((id.clone(), score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    fn document_frequency(&self, term: &str) -> usize {
        self.docs
            .values()
            .filter(|tf| tf.contains_key(term))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playbook(id: &str, name: &str, description: &str) -> Playbook {
        let mut p = Playbook::new(name, description);
        p.id = id.into();
        p
    }

    fn seeded_index() -> LexicalIndex {
        let mut index = LexicalIndex::new();
        index.index_playbook(&playbook(
            "pb-1",
            "Database migration",
            "Safely migrate database schemas with rollback",
        ));
        index.index_playbook(&playbook(
            "pb-2",
            "Canary deployment",
            "Deploy services gradually behind a canary",
        ));
        index.index_playbook(&playbook(
            "pb-3",
            "Incident response",
            "Triage and resolve production incidents",
        ));
        index
    }

    #[test]
    fn test_search_finds_matching_doc() {
        let index = seeded_index();
        let results = index.search("database migration rollback", 10);
        assert_eq!(results[0].0, "pb-1");
    }

    #[test]
    fn test_search_ranks_by_relevance() {
        let index = seeded_index();
        let results = index.search("deploy canary", 10);
        assert_eq!(results[0].0, "pb-2");
    }

    #[test]
    fn test_search_omits_non_matching() {
        let index = seeded_index();
        let results = index.search("canary", 10);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_empty_query() {
        let index = seeded_index();
        assert!(index.search("", 10).is_empty());
    }

    #[test]
    fn test_search_empty_index() {
        let index = LexicalIndex::new();
        assert!(index.search("anything", 10).is_empty());
    }

    #[test]
    fn test_search_respects_limit() {
        let index = seeded_index();
        // "production" only in pb-3; use a broad term instead
        let results = index.search("database canary incidents", 2);
        assert!(results.len() <= 2);
    }

    #[test]
    fn test_reindex_replaces_terms() {
        let mut index = seeded_index();
        let updated = playbook("pb-1", "Cache warmup", "Warm caches before traffic shift");
        index.index_playbook(&updated);
        assert!(index.search("database", 10).iter().all(|(id, _)| id != "pb-1"));
        assert_eq!(index.search("cache warmup", 10)[0].0, "pb-1");
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut index = seeded_index();
        index.remove("pb-2");
        assert!(index.search("canary", 10).is_empty());
        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn test_cjk_query_matches() {
        let mut index = LexicalIndex::new();
        index.index_playbook(&playbook("pb-zh", "快速迭代", "小步快跑的迭代策略"));
        let results = index.search("迭代", 10);
        assert_eq!(results[0].0, "pb-zh");
    }

    #[test]
    fn test_rare_term_outweighs_common() {
        let mut index = LexicalIndex::new();
        // "service" appears everywhere; "billing" only once.
        index.index_playbook(&playbook("pb-a", "Billing service fix", "service billing"));
        index.index_playbook(&playbook("pb-b", "User service fix", "service user"));
        index.index_playbook(&playbook("pb-c", "Search service fix", "service search"));
        let results = index.search("billing service", 10);
        assert_eq!(results[0].0, "pb-a");
    }
}
