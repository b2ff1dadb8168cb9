mod common;

use carton_core::{EntityState, SessionError};
use common::Member;

#[test]
fn persist_moves_transient_to_managed_and_assigns_id() {
    let session = common::open_session();
    session.begin().unwrap();

    let member = session.persist(Member::new("kim", 10)).unwrap();

    assert!(member.id().is_some());
    assert_eq!(session.state_of(&member), EntityState::Managed);
    assert!(session.contains(&member));
}

#[test]
fn persist_requires_active_transaction() {
    let session = common::open_session();

    let err = session.persist(Member::new("kim", 10)).unwrap_err();
    assert!(matches!(err, SessionError::InactiveContext));
}

#[test]
fn begin_twice_is_rejected() {
    let session = common::open_session();
    session.begin().unwrap();

    let err = session.begin().unwrap_err();
    assert!(matches!(err, SessionError::TransactionActive));
}

#[test]
fn managed_mutations_propagate_at_commit() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    let id = member.id().unwrap();
    session.commit().unwrap();

    session.begin().unwrap();
    let loaded = session.find::<Member>(&id).unwrap().unwrap();
    loaded.edit().age = 11;
    session.commit().unwrap();

    session.begin().unwrap();
    let reloaded = session.find::<Member>(&id).unwrap().unwrap();
    assert_eq!(reloaded.read().age, 11);
}

#[test]
fn detached_mutations_are_not_persisted() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    session.flush().unwrap();

    session.detach(&member).unwrap();
    assert_eq!(session.state_of(&member), EntityState::Detached);
    member.edit().username = "ghost".to_string();
    session.commit().unwrap();

    session.begin().unwrap();
    let id = member.id().unwrap();
    let found = session.find::<Member>(&id).unwrap().unwrap();
    assert_eq!(found.read().username, "kim");
}

#[test]
fn remove_then_flush_deletes_the_row() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    let id = member.id().unwrap();

    session.remove(&member).unwrap();
    assert_eq!(session.state_of(&member), EntityState::Removed);
    // A removed entry reads as absent even before the flush happens.
    assert!(session.find::<Member>(&id).unwrap().is_none());
    session.commit().unwrap();

    session.begin().unwrap();
    assert!(session.find::<Member>(&id).unwrap().is_none());
}

#[test]
fn remove_on_detached_entity_is_a_usage_error() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    session.detach(&member).unwrap();

    let err = session.remove(&member).unwrap_err();
    assert!(matches!(
        err,
        SessionError::StaleState {
            state: EntityState::Detached
        }
    ));
}

#[test]
fn persist_on_removed_entry_revives_it() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    session.remove(&member).unwrap();

    let revived = session.persist(member.snapshot()).unwrap();
    assert_eq!(revived, member);
    assert_eq!(session.state_of(&member), EntityState::Managed);
    session.commit().unwrap();

    session.begin().unwrap();
    let id = member.id().unwrap();
    assert!(session.find::<Member>(&id).unwrap().is_some());
}

#[test]
fn commit_closes_the_unit_of_work() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    session.commit().unwrap();

    assert_eq!(session.state_of(&member), EntityState::Detached);
    let id = member.id().unwrap();
    let err = session.find::<Member>(&id).unwrap_err();
    assert!(matches!(err, SessionError::InactiveContext));
}

#[test]
fn rollback_discards_pending_work() {
    let session = common::open_session();
    session.begin().unwrap();
    let member = session.persist(Member::new("kim", 10)).unwrap();
    let id = member.id().unwrap();
    session.rollback().unwrap();

    session.begin().unwrap();
    assert!(session.find::<Member>(&id).unwrap().is_none());
}

#[test]
fn validation_failure_blocks_persist() {
    let session = common::open_session();
    session.begin().unwrap();

    let err = session.persist(Member::new("kim", -1)).unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
}
