//! In-memory ranking backend for tests and single-process development.
//!
//! Mirrors the Redis semantics the cache relies on, including reverse-range
//! tie ordering (score descending, then member lexicographically
//! descending).

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::RankingBackend;
use crate::error::Result;

#[derive(Default)]
pub struct MemRanking {
    hashes: DashMap<String, HashMap<String, String>>,
    zsets: DashMap<String, HashMap<String, f64>>,
}

impl MemRanking {
    pub fn new() -> Self {
        MemRanking::default()
    }
}

/// Glob match supporting `*` only, which is all our key patterns use.
fn glob_match(pattern: &str, s: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = s;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return part.is_empty() || rest.ends_with(part);
        } else if part.is_empty() {
            continue;
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    rest.is_empty()
}

#[async_trait]
impl RankingBackend for MemRanking {
    async fn hash_incr(&self, key: &str, deltas: &[(&str, f64)]) -> Result<()> {
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        for (field, delta) in deltas {
            let current = hash
                .get(*field)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(0.0);
            hash.insert(field.to_string(), (current + delta).to_string());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let Some(set) = self.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(String, f64)> =
            set.iter().map(|(m, s)| (m.clone(), *s)).collect();
        drop(set);
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });

        let len = entries.len() as isize;
        let norm = |i: isize| if i < 0 { (len + i).max(0) } else { i };
        let start = norm(start).min(len);
        let stop = (norm(stop) + 1).min(len);
        if start >= stop {
            return Ok(Vec::new());
        }
        Ok(entries[start as usize..stop as usize].to_vec())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.zsets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(mut set) = self.zsets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut out: Vec<String> = self
            .hashes
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| glob_match(pattern, k))
            .collect();
        out.extend(
            self.zsets
                .iter()
                .filter(|e| !e.value().is_empty() && glob_match(pattern, e.key()))
                .map(|e| e.key().clone()),
        );
        Ok(out)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.hashes.remove(key);
        self.zsets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_our_key_patterns() {
        assert!(glob_match("leaderboard:*", "leaderboard:winrate"));
        assert!(!glob_match("leaderboard:*", "player:1:class:musket:stats"));
        assert!(glob_match(
            "player:*:class:musket:stats",
            "player:abc:class:musket:stats"
        ));
        assert!(!glob_match(
            "player:*:class:musket:stats",
            "player:abc:class:bow:stats"
        ));
    }
}
