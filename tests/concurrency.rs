//! Concurrent-writer tests: separate store handles on one database file.
//!
//! Each handle owns its own connection, so these threads contend the way
//! independent processes would. Run with: `cargo test --test concurrency`

use collabgraph::{
    NewProject, OpenStore, PersonId, ProjectUpdate, SqliteStore, Store, StoreResult,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn open(path: &Path) -> SqliteStore {
    SqliteStore::open(path).unwrap()
}

fn new_project(title: &str) -> NewProject {
    NewProject {
        title: title.to_string(),
        ..Default::default()
    }
}

#[test]
fn concurrent_creates_of_different_projects_both_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let store_a = open(&db);
    let store_b = open(&db);
    let barrier = Arc::new(Barrier::new(2));

    let barrier_a = barrier.clone();
    let a = thread::spawn(move || {
        barrier_a.wait();
        store_a.insert_project(&new_project("Alpha"))
    });
    let barrier_b = barrier.clone();
    let b = thread::spawn(move || {
        barrier_b.wait();
        store_b.insert_project(&new_project("Beta"))
    });

    a.join().unwrap().unwrap();
    b.join().unwrap().unwrap();

    let check = open(&db);
    assert!(check.project_id_by_title("Alpha").unwrap().is_some());
    assert!(check.project_id_by_title("Beta").unwrap().is_some());
}

#[test]
fn concurrent_updates_serialize_without_mixing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let seed = open(&db);
    let id = seed.insert_project(&new_project("Contested")).unwrap();

    let store_a = open(&db);
    let store_b = open(&db);
    let barrier = Arc::new(Barrier::new(2));

    let barrier_a = barrier.clone();
    let a = thread::spawn(move || {
        barrier_a.wait();
        store_a.update_project(
            id,
            &ProjectUpdate {
                title: "Title A".to_string(),
                description: Some("Description A".to_string()),
                ..Default::default()
            },
        )
    });
    let barrier_b = barrier.clone();
    let b = thread::spawn(move || {
        barrier_b.wait();
        store_b.update_project(
            id,
            &ProjectUpdate {
                title: "Title B".to_string(),
                description: Some("Description B".to_string()),
                ..Default::default()
            },
        )
    });

    a.join().unwrap().unwrap();
    b.join().unwrap().unwrap();

    // The surviving row is exactly one submitted payload, never a blend.
    let project = seed.get_project(id).unwrap().unwrap();
    let pair = (project.title.as_str(), project.description.as_deref());
    assert!(
        pair == ("Title A", Some("Description A"))
            || pair == ("Title B", Some("Description B")),
        "interleaved payload: {pair:?}"
    );
}

#[test]
fn concurrent_deletes_succeed_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let seed = open(&db);
    let id = seed.insert_project(&new_project("Doomed")).unwrap();

    let writers = 4;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|_| {
            let store = open(&db);
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.delete_project(id)
            })
        })
        .collect();

    let results: Vec<StoreResult<()>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "results: {results:?}");
    for result in &results {
        if let Err(e) = result {
            assert!(e.is_not_found(), "got {e:?}");
        }
    }
    assert!(seed.get_project(id).unwrap().is_none());
}

#[test]
fn update_racing_a_delete_never_resurrects_the_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let seed = open(&db);
    let id = seed.insert_project(&new_project("Short Lived")).unwrap();

    let store_u = open(&db);
    let store_d = open(&db);
    let barrier = Arc::new(Barrier::new(2));

    let barrier_u = barrier.clone();
    let updater = thread::spawn(move || {
        barrier_u.wait();
        store_u.update_project(
            id,
            &ProjectUpdate {
                title: "Renamed".to_string(),
                ..Default::default()
            },
        )
    });
    let barrier_d = barrier.clone();
    let deleter = thread::spawn(move || {
        barrier_d.wait();
        store_d.delete_project(id)
    });

    let update_result = updater.join().unwrap();
    let delete_result = deleter.join().unwrap();

    // The row exists until the delete commits, so the delete always wins;
    // the update either lands first or observes the row as gone.
    assert!(delete_result.is_ok(), "got {delete_result:?}");
    if let Err(e) = update_result {
        assert!(e.is_not_found(), "got {e:?}");
    }
    assert!(seed.get_project(id).unwrap().is_none());
}

#[test]
fn every_concurrent_create_against_a_missing_person_fails_the_same_way() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let _seed = open(&db);

    let writers = 5;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let store = open(&db);
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.insert_project(&NewProject {
                    title: format!("Orphan {i}"),
                    lead_person: Some(PersonId(999_999)),
                    ..Default::default()
                })
            })
        })
        .collect();

    for handle in handles {
        let err = handle.join().unwrap().unwrap_err();
        assert!(err.is_referential_integrity(), "got {err:?}");
    }
}

#[test]
fn a_bounded_waiter_gets_lock_timeout_instead_of_hanging() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let seed = open(&db);
    let id = seed.insert_project(&new_project("Held")).unwrap();

    let holder = open(&db);
    let waiter = open(&db);
    waiter.set_lock_wait(Duration::from_millis(200)).unwrap();
    let barrier = Arc::new(Barrier::new(2));
    let barrier_h = barrier.clone();
    let hold = thread::spawn(move || {
        holder.begin_work().unwrap();
        holder
            .update_project(
                id,
                &ProjectUpdate {
                    title: "Held Longer".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        barrier_h.wait();
        // Hold the write lock well past the waiter's bound.
        thread::sleep(Duration::from_millis(1000));
        holder.commit_work().unwrap();
    });

    barrier.wait();
    let err = waiter
        .update_project(
            id,
            &ProjectUpdate {
                title: "Impatient".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(err.is_lock_timeout(), "got {err:?}");

    hold.join().unwrap();

    // Once the holder commits, the same waiter succeeds.
    waiter
        .update_project(
            id,
            &ProjectUpdate {
                title: "Finally".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(seed.get_project(id).unwrap().unwrap().title, "Finally");
}
