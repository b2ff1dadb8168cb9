mod common;

use carton_core::{Entity, MapError, QueryError, RepoError, Repository};
use common::{Delivery, DeliveryStatus, Member};
use rusqlite::types::Value;
use rusqlite::Row;

#[test]
fn save_then_find_by_id_returns_the_same_entity() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();

    let saved = repo.save(Member::new("kim", 10)).unwrap();
    let id = saved.id().unwrap();
    let found = repo.find_by_id(&id).unwrap().unwrap();

    // First-level identity map: equality by identity, same handle.
    assert_eq!(found, saved);
    assert_eq!(found.read().username, "kim");
    assert_eq!(found.read().age, 10);
}

#[test]
fn count_reflects_saves_and_deletes() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();

    let member1 = repo.save(Member::new("kim", 10)).unwrap();
    let member2 = repo.save(Member::new("kim2", 20)).unwrap();

    assert_eq!(repo.find_all().unwrap().len(), 2);
    assert_eq!(repo.count().unwrap(), 2);

    repo.delete(&member1).unwrap();
    repo.delete(&member2).unwrap();

    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn find_by_absent_id_returns_none() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();

    assert!(repo.find_by_id(&12345).unwrap().is_none());
}

#[test]
fn save_of_detached_entity_merges_changes() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();
    let saved = repo.save(Member::new("kim", 10)).unwrap();
    let mut detached = saved.snapshot();
    session.commit().unwrap();

    detached.username = "kim2".to_string();
    session.begin().unwrap();
    repo.save(detached).unwrap();
    session.commit().unwrap();

    session.begin().unwrap();
    let id = saved.id().unwrap();
    let reloaded = repo.find_by_id(&id).unwrap().unwrap();
    assert_eq!(reloaded.read().username, "kim2");
}

#[test]
fn assigned_identifier_strategy_roundtrip() {
    let session = common::open_session();
    let repo = Repository::<Delivery>::new(&session).unwrap();
    session.begin().unwrap();

    let delivery = Delivery::new("seoul");
    let expected_id = delivery.id.unwrap();
    let saved = repo.save(delivery).unwrap();
    assert_eq!(saved.id().unwrap(), expected_id);

    saved.edit().status = DeliveryStatus::Shipped;
    session.commit().unwrap();

    session.begin().unwrap();
    let reloaded = repo.find_by_id(&expected_id).unwrap().unwrap();
    assert_eq!(reloaded.read().city, "seoul");
    assert_eq!(reloaded.read().status, DeliveryStatus::Shipped);
}

#[derive(Debug, Clone, PartialEq)]
struct Broken {
    id: Option<i64>,
}

impl Entity for Broken {
    type Id = i64;

    fn table() -> &'static str {
        "broken"
    }

    fn columns() -> &'static [&'static str] {
        // Identifier listed as a data column: invalid mapping.
        &["id"]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn id_value(id: &i64) -> Value {
        Value::Integer(*id)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Null]
    }

    fn from_row(_row: &Row<'_>) -> Result<Self, MapError> {
        Ok(Self { id: None })
    }
}

#[test]
fn repository_construction_rejects_invalid_mapping() {
    let session = common::open_session();

    let err = Repository::<Broken>::new(&session).err().unwrap();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::InvalidMapping(_))
    ));
}
