//! Integration tests for the deferred metadata cache.
//!
//! Population must be single-flight, re-entrancy-safe, and resettable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;

use cubeflow::error::CubeflowError;
use cubeflow::DeferredList;

#[test]
fn two_accessors_trigger_exactly_one_population() {
    let populations = Arc::new(AtomicUsize::new(0));
    let counter = populations.clone();
    let list = DeferredList::named("counted", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1, 2, 3])
    });

    let first = list.get().unwrap();
    let second = list.get().unwrap();
    assert_eq!(*first, vec![1, 2, 3]);
    assert_eq!(*second, vec![1, 2, 3]);
    assert_eq!(populations.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_first_access_populates_once() {
    let populations = Arc::new(AtomicUsize::new(0));
    let counter = populations.clone();
    let list = Arc::new(DeferredList::named("slow", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        Ok(vec![42])
    }));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let list = list.clone();
            thread::spawn(move || list.get().map(|v| v.to_vec()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), vec![42]);
    }
    assert_eq!(populations.load(Ordering::SeqCst), 1);
}

#[test]
fn recursive_population_fails_fast() {
    let slot: Arc<OnceCell<Arc<DeferredList<u32>>>> = Arc::new(OnceCell::new());
    let inner = slot.clone();
    let list = Arc::new(DeferredList::named("self-referential", move || {
        let me = inner.get().expect("list registered before first access");
        me.get().map(|v| v.to_vec())
    }));
    slot.set(list.clone()).ok();

    match list.get() {
        Err(CubeflowError::RecursivePopulation(name)) => {
            assert_eq!(name, "self-referential");
        }
        other => panic!("expected recursion error, got {other:?}"),
    }
}

#[test]
fn reset_discards_contents_and_repopulates() {
    let populations = Arc::new(AtomicUsize::new(0));
    let counter = populations.clone();
    let list = DeferredList::named("resettable", move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![n])
    });

    assert_eq!(*list.get().unwrap(), vec![0]);
    assert!(list.is_populated());
    list.reset();
    assert!(!list.is_populated());
    assert_eq!(*list.get().unwrap(), vec![1]);
    assert_eq!(populations.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_population_is_not_memoized() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let list = DeferredList::named("flaky", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(CubeflowError::Metadata("first attempt fails".into()))
        } else {
            Ok(vec![7])
        }
    });

    assert!(list.get().is_err());
    assert!(!list.is_populated());
    assert_eq!(*list.get().unwrap(), vec![7]);
}
