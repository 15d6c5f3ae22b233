//! Integration tests for the feature store and similarity ranking

mod common;

use std::sync::Arc;
use std::time::Duration;

use tuneforge_worker::similarity::{self, DEFAULT_WEIGHTS};
use tuneforge_worker::store::FeatureStore;

use common::{insert_features, insert_track, test_pool, vector};

#[tokio::test]
async fn test_rank_library_against_seed() {
    let pool = test_pool().await;
    let store = FeatureStore::new(pool.clone(), Duration::from_secs(300));

    let seed = insert_track(&pool, "/music/seed.mp3", "Seed", "Artist").await;
    insert_features(&pool, seed, &vector(0.5, 120.0)).await;

    let near = insert_track(&pool, "/music/near.mp3", "Near", "Artist").await;
    insert_features(&pool, near, &vector(0.55, 124.0)).await;

    let mid = insert_track(&pool, "/music/mid.mp3", "Mid", "Artist").await;
    insert_features(&pool, mid, &vector(0.7, 150.0)).await;

    let far = insert_track(&pool, "/music/far.mp3", "Far", "Artist").await;
    insert_features(&pool, far, &vector(0.95, 196.0)).await;

    let stats = store.corpus_stats().await.unwrap();
    let seed_vector = store.get_vector(seed).await.unwrap().unwrap();
    let candidates: Vec<_> = store
        .all_vectors()
        .await
        .unwrap()
        .into_iter()
        .filter(|(id, _)| *id != seed)
        .collect();

    let ranked = similarity::rank(&seed_vector, &candidates, &stats, &DEFAULT_WEIGHTS);
    let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![near, mid, far]);

    // Distances ascend
    for pair in ranked.windows(2) {
        assert!(pair[0].1 <= pair[1].1);
    }
}

#[tokio::test]
async fn test_ranking_is_deterministic_across_runs() {
    let pool = test_pool().await;
    let store = FeatureStore::new(pool.clone(), Duration::from_secs(300));

    let seed = insert_track(&pool, "/music/seed.mp3", "Seed", "Artist").await;
    insert_features(&pool, seed, &vector(0.5, 120.0)).await;
    for i in 0..10 {
        let id = insert_track(
            &pool,
            &format!("/music/track{}.mp3", i),
            &format!("Track {}", i),
            "Artist",
        )
        .await;
        insert_features(&pool, id, &vector(0.1 * i as f64, 70.0 + 12.0 * i as f64)).await;
    }

    let stats = store.corpus_stats().await.unwrap();
    let seed_vector = store.get_vector(seed).await.unwrap().unwrap();
    let candidates = store.all_vectors().await.unwrap();

    let first = similarity::rank(&seed_vector, &candidates, &stats, &DEFAULT_WEIGHTS);
    let second = similarity::rank(&seed_vector, &candidates, &stats, &DEFAULT_WEIGHTS);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stats_cache_shared_across_tasks() {
    let pool = test_pool().await;
    let store = Arc::new(FeatureStore::new(pool.clone(), Duration::from_secs(300)));

    let id = insert_track(&pool, "/music/a.mp3", "A", "Artist").await;
    insert_features(&pool, id, &vector(0.5, 120.0)).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move { store.corpus_stats().await }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    for stats in &results[1..] {
        assert_eq!(*stats, results[0]);
    }
}

#[tokio::test]
async fn test_zero_spread_corpus_yields_zero_distances() {
    let pool = test_pool().await;
    let store = FeatureStore::new(pool.clone(), Duration::from_secs(300));

    // Every track identical: all dimensions have zero spread
    let mut ids = Vec::new();
    for i in 0..3 {
        let id = insert_track(
            &pool,
            &format!("/music/same{}.mp3", i),
            &format!("Same {}", i),
            "Artist",
        )
        .await;
        insert_features(&pool, id, &vector(0.5, 120.0)).await;
        ids.push(id);
    }

    let stats = store.corpus_stats().await.unwrap();
    let seed_vector = store.get_vector(ids[0]).await.unwrap().unwrap();
    let candidates = store.all_vectors().await.unwrap();

    let ranked = similarity::rank(&seed_vector, &candidates, &stats, &DEFAULT_WEIGHTS);
    for (_, distance) in ranked {
        assert_eq!(distance, 0.0);
    }
}
