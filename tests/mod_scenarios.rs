//! End-to-end walkthroughs of the documented behaviors, one per scenario.

use plumedb::{Config, Database};
use serde_json::json;
use std::time::Duration;

fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::open(Config {
        storage_path: dir.path().to_path_buf(),
        save_delay: Duration::from_millis(10),
        debug: false,
    })
    .unwrap()
}

#[test]
fn s1_basic_insert_and_find() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let res = db.insert("users", &json!({"name": "Alice", "age": 30}));
    assert!(res.success);
    assert_eq!(res.data.inserted_count, 1);
    let ids = res.data.inserted_ids.unwrap();
    assert_eq!(ids[0].len(), 16);
    assert!(ids[0].chars().all(|c| c.is_ascii_hexdigit()));

    let docs = db.find("users", &json!({}), &json!(null)).data;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["name"], json!("Alice"));
    assert_eq!(docs[0]["createdAt"], docs[0]["updatedAt"]);
}

#[test]
fn s2_batch_id_shape() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let docs: Vec<_> = (0..30).map(|i| json!({"n": i})).collect();
    let res = db.insert("batch", &json!(docs));
    assert!(res.success);
    assert_eq!(res.data.inserted_count, 30);
    assert!(res.data.inserted_ids.is_none());

    let prefix = res.data.prefix.unwrap();
    assert!(prefix.ends_with('_'));
    assert_eq!(res.data.first_id.unwrap(), format!("{prefix}1"));
    assert_eq!(res.data.last_id.unwrap(), format!("{prefix}30"));

    let found = db.find("batch", &json!({}), &json!(null)).data;
    assert_eq!(found.len(), 30);
    for (i, doc) in found.iter().enumerate() {
        assert_eq!(doc["n"], json!(i), "insertion order preserved");
        assert_eq!(doc["id"], json!(format!("{prefix}{}", i + 1)));
    }
}

#[test]
fn s3_complex_filter() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert(
        "players",
        &json!([
            {"id": "hit",  "active": true,  "score": 1200, "tags": ["vip", "og"]},
            {"id": "cold", "active": false, "score": 1200, "tags": ["vip"]},
            {"id": "low",  "active": true,  "score": 900,  "tags": ["vip"]},
            {"id": "plain","active": true,  "score": 1500, "tags": ["beta"]},
            {"id": "bare", "active": true,  "score": 1500},
        ]),
    );
    let filter = json!({"active": true, "score": {"$gte": 1000}, "tags": "vip"});
    let docs = db.find("players", &filter, &json!(null)).data;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], json!("hit"));
}

#[test]
fn s4_dotted_update() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("users", &json!({"id": "u1", "name": "n", "stats": {"views": 10, "stars": 4}}));
    let before = db.find_by_id("users", "u1").data.unwrap();
    std::thread::sleep(Duration::from_millis(10));

    let res = db.update_by_id("users", "u1", &json!({"$set": {"stats.views": 50}}), &json!(null));
    assert!(res.success);
    assert_eq!(res.data.updated_count, 1);

    let after = db.find_by_id("users", "u1").data.unwrap();
    assert_eq!(after["stats"]["views"], json!(50));
    assert_eq!(after["stats"]["stars"], json!(4));
    assert_eq!(after["name"], json!("n"));
    assert_eq!(after["createdAt"], before["createdAt"]);
    assert!(after["updatedAt"].as_str().unwrap() > before["updatedAt"].as_str().unwrap());
}

#[test]
fn s5_upsert_preserves_created_at() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let first = db.insert("users", &json!({"id": "u1", "name": "Alice", "score": 100}));
    assert_eq!(first.data.inserted_count, 1);
    let before = db.find_by_id("users", "u1").data.unwrap();
    std::thread::sleep(Duration::from_millis(10));

    let second = db.insert("users", &json!({"id": "u1", "name": "Alice Updated", "score": 200}));
    assert!(second.success);
    assert_eq!(second.data.inserted_count, 0);
    assert_eq!(second.data.updated_count, 1);

    assert_eq!(db.count("users", &json!({})).data, 1);
    let after = db.find_by_id("users", "u1").data.unwrap();
    assert_eq!(after["name"], json!("Alice Updated"));
    assert_eq!(after["score"], json!(200));
    assert_eq!(after["createdAt"], before["createdAt"]);
    assert!(after["updatedAt"].as_str().unwrap() > before["updatedAt"].as_str().unwrap());
}

#[test]
fn s6_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert(
        "docs",
        &json!([
            {"id": "d1", "v": 1},
            {"id": "d2", "v": {"nested": [1, 2]}},
            {"id": "d3", "v": "three"},
        ]),
    );
    let before = db.find("docs", &json!({}), &json!(null)).data;
    db.close().unwrap();

    let db = open_db(&dir);
    let after = db.find("docs", &json!({}), &json!(null)).data;
    assert_eq!(after.len(), 3);
    assert_eq!(before, after);
    db.close().unwrap();
}

#[test]
fn s7_paginate_past_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let docs: Vec<_> = (0..50).map(|i| json!({"n": i})).collect();
    db.insert("pages", &json!(docs));

    let res = db.paginate("pages", &json!({}), &json!({"page": 999, "limit": 10}));
    assert!(res.success);
    let page = res.data;
    assert!(page.data.is_empty());
    assert_eq!(page.pagination.total_pages, 5);
    assert_eq!(page.pagination.total_items, 50);
    assert!(!page.pagination.has_next);
    assert!(page.pagination.has_prev);
    assert_eq!(page.pagination.prev_page, Some(998));
    assert_eq!(page.pagination.start_index, 0);
    assert_eq!(page.pagination.end_index, 0);
}
