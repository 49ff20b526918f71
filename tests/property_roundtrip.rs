//! Property-based tests for archive invariants
//!
//! Uses proptest to check round-trips and tag semantics over random inputs

use archivist::{
    compute_digest, ArchivalEngine, HashAlgorithm, ListOptions, MemoryBlobStore, MemoryIndex,
    RetrieveOptions, StoreOptions,
};
use proptest::prelude::*;
use std::sync::Arc;

fn engine() -> ArchivalEngine {
    ArchivalEngine::new(Arc::new(MemoryBlobStore::new()), Arc::new(MemoryIndex::new()))
}

fn algorithm() -> impl Strategy<Value = HashAlgorithm> {
    prop_oneof![
        Just(HashAlgorithm::Sha256),
        Just(HashAlgorithm::Sha512),
        Just(HashAlgorithm::Md5),
    ]
}

proptest! {
    #[test]
    fn prop_store_retrieve_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..4096),
        algorithm in algorithm()
    ) {
        let engine = engine();
        let record = engine
            .store(&payload, StoreOptions::new().hash_algorithm(algorithm))
            .unwrap();

        prop_assert_eq!(record.metadata.size_bytes, payload.len() as u64);
        prop_assert_eq!(&record.integrity.digest_hex, &compute_digest(&payload, algorithm));

        let back = engine.retrieve(&record.id, RetrieveOptions::default()).unwrap();
        prop_assert_eq!(back, payload);
    }

    #[test]
    fn prop_storage_key_starts_with_digest_prefix(
        payload in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let engine = engine();
        let record = engine.store(&payload, StoreOptions::new()).unwrap();

        let (prefix, id) = record.storage_key.split_once('-').unwrap();
        prop_assert_eq!(prefix, &record.integrity.digest_hex[..16]);
        prop_assert_eq!(id, record.id.to_string());
    }

    #[test]
    fn prop_add_tags_is_ordered_set_union(
        initial in prop::collection::vec("[a-c]{1,2}", 0..6),
        added in prop::collection::vec("[a-c]{1,2}", 0..6)
    ) {
        let engine = engine();
        let record = engine
            .store(b"tags", StoreOptions::new().tags(initial.clone()))
            .unwrap();
        let once = engine.add_tags(&record.id, added.clone()).unwrap();
        let twice = engine.add_tags(&record.id, added.clone()).unwrap();

        prop_assert_eq!(&once.metadata.tags, &twice.metadata.tags);

        let mut expected: Vec<String> = Vec::new();
        for tag in initial.iter().chain(added.iter()) {
            if !expected.contains(tag) {
                expected.push(tag.clone());
            }
        }
        prop_assert_eq!(once.metadata.tags, expected);
    }

    #[test]
    fn prop_pagination_invariants(
        count in 0usize..25,
        offset in 0usize..30,
        limit in 0usize..30
    ) {
        let engine = engine();
        for i in 0..count {
            engine.store(&[i as u8], StoreOptions::new()).unwrap();
        }

        let page = engine.list(&ListOptions::default().page(offset, limit)).unwrap();
        prop_assert_eq!(page.total, count);
        prop_assert_eq!(page.items.len(), count.saturating_sub(offset).min(limit));
        prop_assert_eq!(page.has_more, offset + page.items.len() < count);
    }
}
