use plumedb::{Config, Database};
use serde_json::json;

fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::open(Config::with_storage_path(dir.path())).unwrap()
}

#[test]
fn create_index_populates_from_existing_documents() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert(
        "events",
        &json!([
            {"id": "e1", "region": "eu", "kind": "click"},
            {"id": "e2", "region": "us", "kind": "click"},
            {"id": "e3", "region": "eu", "kind": "view"},
            {"id": "e4", "kind": "view"},
        ]),
    );
    let res = db.create_index("events", &json!({"region": 1, "kind": -1}));
    assert!(res.success);
    assert_eq!(res.data, "region_1_kind_-1");

    let col = db.engine().collection("events").unwrap();
    assert_eq!(col.index_names(), vec!["region_1_kind_-1"]);
    let hits = col.index_lookup("region_1_kind_-1", &[json!("eu"), json!("click")]);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], json!("e1"));
    // e4 misses "region" and must be absent from the index
    assert!(col.indexes_consistent());
}

#[test]
fn duplicate_index_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("events", &json!({"id": "e1", "region": "eu"}));
    assert!(db.create_index("events", &json!({"region": 1})).success);
    let res = db.create_index("events", &json!({"region": 1}));
    assert!(!res.success);
    assert_eq!(res.error.unwrap().code, 409);
}

#[test]
fn indexes_follow_inserts_updates_upserts_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    assert!(db.create_index("users", &json!({"team": 1})).success);
    db.insert(
        "users",
        &json!([
            {"id": "a", "team": "red"},
            {"id": "b", "team": "red"},
            {"id": "c", "team": "blue"},
        ]),
    );
    let col = db.engine().collection("users").unwrap();
    assert!(col.indexes_consistent());
    assert_eq!(col.index_lookup("team_1", &[json!("red")]).len(), 2);

    // update moves a document between keys
    db.update_by_id("users", "a", &json!({"$set": {"team": "blue"}}), &json!(null));
    assert!(col.indexes_consistent());
    assert_eq!(col.index_lookup("team_1", &[json!("blue")]).len(), 2);

    // upsert rewrites the indexed value
    db.insert("users", &json!({"id": "b", "team": "green"}));
    assert!(col.indexes_consistent());
    assert_eq!(col.index_lookup("team_1", &[json!("red")]).len(), 0);

    // unsetting an indexed field removes the entry
    db.update_by_id("users", "c", &json!({"$unset": {"team": ""}}), &json!(null));
    assert!(col.indexes_consistent());

    // deletes renumber positions for the remaining documents
    db.delete_by_id("users", "a");
    assert!(col.indexes_consistent());
    assert_eq!(col.index_lookup("team_1", &[json!("green")]).len(), 1);

    db.delete("users", &json!({}));
    assert!(col.indexes_consistent());
    assert_eq!(col.index_lookup("team_1", &[json!("green")]).len(), 0);
}

#[test]
fn invalid_index_specs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("events", &json!({"id": "e1"}));
    for spec in [json!({}), json!({"region": 2}), json!("region")] {
        let res = db.create_index("events", &spec);
        assert!(!res.success);
        assert_eq!(res.error.unwrap().code, 400);
    }
}
