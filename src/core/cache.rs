// AST cache keyed by a sha256 of the source text.
// The persistent store lives outside this crate; `InMemoryAstCache` is the
// process-local implementation used by the pipeline and the CLI.
use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::core::ast::{count_nodes, Node};

pub trait AstCache: Send + Sync {
    fn get(&self, hash: &str) -> Option<Vec<Node>>;
    fn put(&self, hash: &str, source: &str, ast: &[Node]);
}

/// Lowercase hex sha256 of `source`.
pub fn content_hash(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

#[derive(Clone, Debug)]
struct CacheEntry {
    ast: Vec<Node>,
    nodes: usize,
    last_used: Instant,
}

const MAX_ENTRIES: usize = 128;
const MAX_TOTAL_NODES: usize = 1_000_000;

/// Bounded map; least recently used entries are pruned first.
#[derive(Debug)]
pub struct InMemoryAstCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    max_nodes: usize,
}

impl Default for InMemoryAstCache {
    fn default() -> Self {
        Self::with_limits(MAX_ENTRIES, MAX_TOTAL_NODES)
    }
}

impl InMemoryAstCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_entries: usize, max_nodes: usize) -> Self {
        InMemoryAstCache { entries: Mutex::new(HashMap::new()), max_entries, max_nodes }
    }

    /// `(entries, total nodes)` currently held.
    pub fn stats(&self) -> (usize, usize) {
        let m = self.entries.lock();
        (m.len(), total_nodes(&m))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn prune_locked(&self, m: &mut HashMap<String, CacheEntry>) {
        if m.len() <= self.max_entries && total_nodes(m) <= self.max_nodes {
            return;
        }
        let before = m.len();
        let mut by_age: Vec<(String, Instant)> = m.iter().map(|(k, e)| (k.clone(), e.last_used)).collect();
        by_age.sort_by_key(|(_, t)| *t);
        let mut nodes = total_nodes(m);
        for (key, _) in by_age {
            if m.len() <= self.max_entries && nodes <= self.max_nodes {
                break;
            }
            if let Some(e) = m.remove(&key) {
                nodes -= e.nodes;
            }
        }
        tracing::debug!(before, after = m.len(), nodes, "ast cache pruned");
    }
}

fn total_nodes(m: &HashMap<String, CacheEntry>) -> usize {
    m.values().map(|e| e.nodes).sum()
}

impl AstCache for InMemoryAstCache {
    fn get(&self, hash: &str) -> Option<Vec<Node>> {
        let mut m = self.entries.lock();
        let e = m.get_mut(hash)?;
        e.last_used = Instant::now();
        Some(e.ast.clone())
    }

    fn put(&self, hash: &str, _source: &str, ast: &[Node]) {
        let mut m = self.entries.lock();
        m.insert(
            hash.to_string(),
            CacheEntry { ast: ast.to_vec(), nodes: count_nodes(ast), last_used: Instant::now() },
        );
        self.prune_locked(&mut m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let h = content_hash("var x = 1");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("var x = 1"));
        assert_ne!(h, content_hash("var x = 2"));
    }

    #[test]
    fn get_returns_what_was_put() {
        let cache = InMemoryAstCache::new();
        let ast = vec![Node::assign("x", Node::int(1))];
        cache.put("k", "var x = 1", &ast);
        assert_eq!(cache.get("k"), Some(ast));
        assert_eq!(cache.get("otro"), None);
    }

    #[test]
    fn prunes_oldest_entries() {
        let cache = InMemoryAstCache::with_limits(2, usize::MAX);
        cache.put("a", "", &[Node::Pass]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put("b", "", &[Node::Pass]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put("c", "", &[Node::Pass]);
        assert_eq!(cache.stats(), (2, 2));
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }
}
