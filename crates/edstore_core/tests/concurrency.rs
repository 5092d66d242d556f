mod common;

use common::{count_rows, file_repo, resource, upsert_request};
use edstore_core::{DocumentRepository, UpsertResult, WriteConflict};
use serde_json::json;
use std::thread;

#[test]
fn parallel_writers_on_distinct_documents_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let repo = file_repo(dir.path(), 4);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let repo = repo.clone();
            thread::spawn(move || {
                for n in 0..10 {
                    let school_id = worker * 100 + n;
                    let result = repo.upsert_document(&upsert_request(
                        resource("School"),
                        json!({ "schoolId": school_id }),
                        json!({ "schoolId": school_id }),
                        1,
                    ));
                    assert!(
                        matches!(result, UpsertResult::InsertSuccess { .. }),
                        "unexpected {result:?}"
                    );
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(count_rows(&repo, "documents"), 40);
    assert_eq!(count_rows(&repo, "aliases"), 40);
}

#[test]
fn racing_upserts_of_one_identity_leave_a_single_row() {
    let dir = tempfile::tempdir().unwrap();
    let repo = file_repo(dir.path(), 4);

    let workers: Vec<_> = (1..=8)
        .map(|timestamp| {
            let repo = repo.clone();
            thread::spawn(move || {
                repo.upsert_document(&upsert_request(
                    resource("School"),
                    json!({ "schoolId": 7 }),
                    json!({ "schoolId": 7, "writer": timestamp }),
                    timestamp,
                ))
            })
        })
        .collect();

    let mut inserts = 0;
    for worker in workers {
        match worker.join().unwrap() {
            UpsertResult::InsertSuccess { .. } => inserts += 1,
            UpsertResult::UpdateSuccess { .. } => {}
            UpsertResult::UpdateFailureWriteConflict(WriteConflict::StaleRequest { .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(inserts, 1);
    assert_eq!(count_rows(&repo, "documents"), 1);

    let last_modified_at: i64 = repo
        .pool()
        .with_connection(|conn| {
            conn.query_row("SELECT last_modified_at FROM documents;", [], |row| {
                row.get(0)
            })
            .map_err(edstore_core::DbError::from)
        })
        .unwrap();
    assert_eq!(last_modified_at, 8);
}
