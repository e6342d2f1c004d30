use plumedb::{Config, Database};
use serde_json::json;

fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::open(Config::with_storage_path(dir.path())).unwrap()
}

#[test]
fn insert_assigns_ids_and_find_by_id_works() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let res = db.insert("users", &json!({"name": "alice"}));
    assert!(res.success);
    assert_eq!(res.data.inserted_count, 1);
    let ids = res.data.inserted_ids.unwrap();
    assert_eq!(ids.len(), 1);

    let found = db.find_by_id("users", &ids[0]);
    assert!(found.success);
    let doc = found.data.unwrap();
    assert_eq!(doc["name"], json!("alice"));
    assert_eq!(doc["id"], json!(ids[0].clone()));

    let missing = db.find_by_id("users", "nope");
    assert!(!missing.success);
    assert_eq!(missing.error.unwrap().code, 404);
}

#[test]
fn supplied_ids_are_coerced_to_strings() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let res = db.insert("users", &json!([{"id": 7, "name": "n"}, {"id": "abc", "name": "s"}]));
    assert!(res.success);
    assert_eq!(res.data.inserted_ids.unwrap(), vec!["7", "abc"]);
    assert!(db.find_by_id("users", "7").success);

    let bad = db.insert("users", &json!({"id": true}));
    assert!(!bad.success);
    assert_eq!(bad.error.unwrap().code, 400);
}

#[test]
fn invalid_collection_names_are_rejected_at_the_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    for name in ["", ".hidden", "a.b", "a/b", "1st", "has space"] {
        let res = db.insert(name, &json!({"x": 1}));
        assert!(!res.success, "{name}");
        assert_eq!(res.error.unwrap().code, 400, "{name}");
    }
}

#[test]
fn count_of_zero_is_a_success() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("users", &json!({"name": "alice"}));
    let res = db.count("users", &json!({"name": "nobody"}));
    assert!(res.success);
    assert_eq!(res.data, 0);
    assert!(res.error.is_none());
}

#[test]
fn empty_find_reports_not_found_with_empty_data() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("users", &json!({"name": "alice"}));
    let res = db.find("users", &json!({"name": "nobody"}), &json!(null));
    assert!(!res.success);
    assert!(res.data.is_empty());
    assert_eq!(res.error.unwrap().code, 404);
}

#[test]
fn delete_by_filter_and_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert(
        "users",
        &json!([
            {"id": "a", "role": "admin"},
            {"id": "b", "role": "user"},
            {"id": "c", "role": "user"},
        ]),
    );
    let res = db.delete("users", &json!({"role": "user"}));
    assert!(res.success);
    assert_eq!(res.data.deleted_count, 2);
    assert_eq!(db.count("users", &json!({})).data, 1);

    let res = db.delete_by_id("users", "a");
    assert_eq!(res.data.deleted_count, 1);
    let res = db.delete_by_id("users", "a");
    assert!(!res.success);
    assert_eq!(res.error.unwrap().code, 404);

    // deleting nothing is a success with count 0
    let res = db.delete("users", &json!({"role": "ghost"}));
    assert!(res.success);
    assert_eq!(res.data.deleted_count, 0);
}

#[test]
fn id_index_stays_exact_across_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("t", &json!([{"id": "a", "n": 1}, {"id": "b", "n": 2}, {"id": "c", "n": 3}]));
    db.delete_by_id("t", "b");
    db.insert("t", &json!({"id": "d", "n": 4}));
    db.update("t", &json!({"n": {"$gte": 3}}), &json!({"$inc": {"n": 10}}), &json!(null));

    let all = db.find("t", &json!({}), &json!(null)).data;
    assert_eq!(all.len(), 3);
    for doc in &all {
        let id = doc["id"].as_str().unwrap();
        let by_id = db.find_by_id("t", id).data.unwrap();
        assert_eq!(&by_id, doc);
    }
    assert!(db.find_by_id("t", "b").data.is_none());
}

#[test]
fn list_collections_reflects_open_stores() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.insert("alpha", &json!({"x": 1}));
    db.insert("beta", &json!({"x": 1}));
    let mut names = db.list_collections().data;
    names.sort();
    assert_eq!(names, vec!["alpha", "beta"]);
}
