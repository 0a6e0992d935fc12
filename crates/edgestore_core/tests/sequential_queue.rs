//! Durable queue behavior through the full store stack.

use edgestore_core::{Config, StoreProvider};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn append_batch_remove_scenario() {
    let provider = StoreProvider::open(Config::new()).await.unwrap();
    let queue = provider
        .get_sequential_store::<String>("messages")
        .await
        .unwrap();

    let mut offsets = Vec::new();
    for item in ["a", "b", "c"] {
        offsets.push(queue.append(&item.to_string()).await.unwrap());
    }
    assert_eq!(offsets, vec![0, 1, 2]);

    let batch = queue.get_batch(0, 10).await.unwrap();
    assert_eq!(
        batch,
        vec![
            (0, "a".to_string()),
            (1, "b".to_string()),
            (2, "c".to_string())
        ]
    );

    assert!(queue.remove_first(|_, _| true).await.unwrap());
    assert_eq!(queue.head_offset(), 1);

    let batch = queue.get_batch(0, 10).await.unwrap();
    assert_eq!(batch, vec![(1, "b".to_string()), (2, "c".to_string())]);
}

#[tokio::test]
async fn head_and_tail_survive_reopening_the_partition() {
    let provider = StoreProvider::in_memory();
    {
        let queue = provider.get_sequential_store::<u32>("q").await.unwrap();
        for i in 0..5 {
            queue.append(&i).await.unwrap();
        }
        queue.remove_first(|_, _| true).await.unwrap();
        queue.remove_first(|_, _| true).await.unwrap();
    }

    let reopened = StoreProvider::from_byte_provider(provider.byte_provider().clone(), 12);
    let queue = reopened.get_sequential_store::<u32>("q").await.unwrap();
    assert_eq!(queue.head_offset(), 2);
    assert_eq!(queue.tail_offset(), 4);
    assert_eq!(queue.append(&99).await.unwrap(), 5);
}

proptest! {
    #[test]
    fn append_offsets_increase_by_one(head in 0i64..1_000_000, count in 1usize..64) {
        let offsets = runtime().block_on(async {
            let provider = StoreProvider::in_memory();
            let queue = provider
                .get_sequential_store_with_head::<usize>("q", head)
                .await
                .unwrap();
            let mut offsets = Vec::new();
            for i in 0..count {
                offsets.push(queue.append(&i).await.unwrap());
            }
            offsets
        });

        prop_assert_eq!(offsets[0], head);
        for pair in offsets.windows(2) {
            prop_assert_eq!(pair[1], pair[0] + 1);
        }
    }

    #[test]
    fn batches_skip_removed_offsets_and_stay_above_head(
        count in 1i64..40,
        removals in proptest::collection::vec(0i64..40, 0..20),
        drained in 0usize..10,
        start in -5i64..45,
    ) {
        let (head, batch) = runtime().block_on(async {
            let provider = StoreProvider::in_memory();
            let queue = provider.get_sequential_store::<i64>("q").await.unwrap();
            for i in 0..count {
                queue.append(&i).await.unwrap();
            }
            for offset in &removals {
                queue.remove_offset(|_, _| true, *offset).await.unwrap();
            }
            for _ in 0..drained {
                queue.remove_first(|_, _| true).await.unwrap();
            }
            let batch = queue.get_batch(start, 64).await.unwrap();
            (queue.head_offset(), batch)
        });

        for (offset, item) in &batch {
            prop_assert!(*offset >= head);
            prop_assert!(*offset >= start);
            prop_assert_eq!(offset, item);
            prop_assert!(!removals.contains(offset));
        }
        for pair in batch.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn remove_first_moves_head_only_on_success(
        accept in any::<bool>(),
        count in 0i64..6,
        gaps in proptest::collection::vec(0i64..6, 0..4),
    ) {
        let (removed, seen, before, after) = runtime().block_on(async {
            let provider = StoreProvider::in_memory();
            let queue = provider.get_sequential_store::<i64>("q").await.unwrap();
            for i in 0..count {
                queue.append(&i).await.unwrap();
            }
            for offset in &gaps {
                queue.remove_offset(|_, _| true, *offset).await.unwrap();
            }
            let before = queue.head_offset();
            let mut seen = None;
            let removed = queue
                .remove_first(|offset, _| {
                    seen = Some(offset);
                    accept
                })
                .await
                .unwrap();
            (removed, seen, before, queue.head_offset())
        });

        let first_survivor = (0..count).find(|offset| !gaps.contains(offset));
        prop_assert_eq!(seen, first_survivor);
        prop_assert_eq!(removed, accept && first_survivor.is_some());
        if removed {
            // A gap at the head is skipped, so the head lands just past the
            // removed entry rather than exactly one step ahead.
            let offset = first_survivor.unwrap();
            prop_assert!(offset >= before);
            prop_assert_eq!(after, offset + 1);
        } else {
            prop_assert_eq!(after, before);
        }
    }
}
