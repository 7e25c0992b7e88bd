//! Listener registry.
//!
//! Entries are bucketed by pattern (source plus flags). Buckets keep the order
//! in which their pattern was first registered, and entries inside a bucket
//! keep registration order. Matching runs each distinct pattern once and
//! yields every entry of a matching bucket, so registering the same pattern
//! twice makes both handlers fire.

use crate::error::ListenerResult;
use crate::listener::{ListenerEntry, ListenerEvent, ListenerGroup, PatternFlags, match_groups};

struct Bucket<E> {
    source: String,
    flags: PatternFlags,
    entries: Vec<ListenerEntry<E>>,
}

/// An ordered collection of compiled listeners for one event type.
///
/// Built during plugin registration and read-only while dispatching.
pub struct ListenerRegistry<E> {
    buckets: Vec<Bucket<E>>,
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }
}

impl<E: ListenerEvent> ListenerRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and adds every pattern of a listener group.
    ///
    /// Nothing is added if any pattern fails to compile.
    pub fn register(&mut self, group: ListenerGroup<E>) -> ListenerResult<()> {
        for entry in group.compile()? {
            self.insert(entry);
        }
        Ok(())
    }

    /// Adds an already compiled entry.
    pub fn insert(&mut self, entry: ListenerEntry<E>) {
        let existing = self
            .buckets
            .iter_mut()
            .find(|b| b.source == entry.source() && b.flags == entry.flags());

        match existing {
            Some(bucket) => bucket.entries.push(entry),
            None => self.buckets.push(Bucket {
                source: entry.source().to_string(),
                flags: entry.flags(),
                entries: vec![entry],
            }),
        }
    }

    /// Appends every entry of `other`, keeping its order.
    pub fn merge(&mut self, other: ListenerRegistry<E>) {
        for bucket in other.buckets {
            for entry in bucket.entries {
                self.insert(entry);
            }
        }
    }

    /// Every entry whose pattern matches `subject`, with its handler arguments.
    pub fn matching(&self, subject: &str) -> Vec<(&ListenerEntry<E>, Vec<String>)> {
        let mut matched = Vec::new();
        for bucket in &self.buckets {
            let Some(first) = bucket.entries.first() else {
                continue;
            };
            if let Some(groups) = match_groups(first.pattern(), subject) {
                matched.extend(bucket.entries.iter().map(|e| (e, groups.clone())));
            }
        }
        matched
    }
}

impl<E> ListenerRegistry<E> {
    /// All entries in match order.
    pub fn iter(&self) -> impl Iterator<Item = &ListenerEntry<E>> {
        self.buckets.iter().flat_map(|b| b.entries.iter())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of distinct patterns.
    pub fn pattern_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<E> Clone for ListenerRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            buckets: self
                .buckets
                .iter()
                .map(|b| Bucket {
                    source: b.source.clone(),
                    flags: b.flags,
                    entries: b.entries.clone(),
                })
                .collect(),
        }
    }
}

impl<E> std::fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.buckets.iter().map(|b| (&b.source, b.entries.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{listen_to, listen_webhook};
    use parley_core::{ChatMessage, WebhookEvent};

    fn registry(patterns: &[&str]) -> ListenerRegistry<ChatMessage> {
        let mut registry = ListenerRegistry::new();
        for pattern in patterns {
            registry
                .register(listen_to(*pattern).threaded(|_, _, _| Ok(())))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_matching_returns_groups() {
        let registry = registry(&["^ping$", r"^hello (\w+)"]);
        let matched = registry.matching("hello world");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0.source(), r"^hello (\w+)");
        assert_eq!(matched[0].1, vec!["world"]);

        assert!(registry.matching("pong").is_empty());
    }

    #[test]
    fn test_duplicate_patterns_share_bucket_and_both_match() {
        let registry = registry(&["^ping$", "^other$", "^ping$"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.pattern_count(), 2);

        let matched = registry.matching("ping");
        assert_eq!(matched.len(), 2);
        assert!(!matched[0].0.shares_handler_with(matched[1].0));
    }

    #[test]
    fn test_same_source_different_flags_are_distinct() {
        let mut registry = registry(&["hi"]);
        registry
            .register(listen_to("hi").ignore_case().threaded(|_, _, _| Ok(())))
            .unwrap();

        assert_eq!(registry.pattern_count(), 2);
        assert_eq!(registry.matching("HI").len(), 1);
        assert_eq!(registry.matching("hi").len(), 2);
    }

    #[test]
    fn test_merge_keeps_first_seen_order() {
        let mut left = registry(&["^a", "^b"]);
        let right = registry(&["^c", "^a"]);
        left.merge(right);

        let sources: Vec<_> = left.iter().map(|e| e.source()).collect();
        assert_eq!(sources, vec!["^a", "^a", "^b", "^c"]);
    }

    #[test]
    fn test_failed_group_adds_nothing() {
        let mut registry: ListenerRegistry<ChatMessage> = ListenerRegistry::new();
        let group = listen_to("ok").or(listen_to("(bad")).threaded(|_, _, _| Ok(()));
        assert!(registry.register(group).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_webhook_registry_matches_id() {
        let mut registry: ListenerRegistry<WebhookEvent> = ListenerRegistry::new();
        registry
            .register(listen_webhook("ping").threaded(|_, _, _| Ok(())))
            .unwrap();

        assert_eq!(registry.matching("ping").len(), 1);
        assert_eq!(registry.matching("pingback").len(), 1);
        assert!(registry.matching("pong").is_empty());
    }
}
