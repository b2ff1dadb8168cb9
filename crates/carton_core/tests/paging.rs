mod common;

use carton_core::{Filter, Op, PageRequest, QueryError, RepoError, Repository, Sort};
use common::Member;

fn seed_five(repo: &Repository<'_, Member>) {
    for name in ["member1", "member2", "member3", "member4", "member5"] {
        repo.save(Member::new(name, 10)).unwrap();
    }
}

#[test]
fn first_page_is_a_bounded_slice_with_has_next() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();
    seed_five(&repo);

    let request = PageRequest::of(0, 3).sorted(Sort::desc("username"));
    let page = repo
        .find_page(&Filter::new("age", Op::Eq, 10_i64), &request)
        .unwrap();

    assert_eq!(page.len(), 3);
    assert_eq!(page.number(), 0);
    assert!(page.is_first());
    assert!(page.has_next());

    let names: Vec<String> = page
        .content()
        .iter()
        .map(|member| member.read().username.clone())
        .collect();
    assert_eq!(names, ["member5", "member4", "member3"]);
}

#[test]
fn last_page_holds_the_remainder() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();
    seed_five(&repo);

    let request = PageRequest::of(1, 3).sorted(Sort::desc("username"));
    let page = repo
        .find_page(&Filter::new("age", Op::Eq, 10_i64), &request)
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page.number(), 1);
    assert!(!page.is_first());
    assert!(!page.has_next());
}

#[test]
fn zero_page_size_is_rejected() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();

    let err = repo
        .find_page(&Filter::all(), &PageRequest::of(0, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::InvalidPageSize(0))
    ));
}

#[test]
fn page_map_keeps_slice_metadata() {
    let session = common::open_session();
    let repo = Repository::<Member>::new(&session).unwrap();
    session.begin().unwrap();
    seed_five(&repo);

    let page = repo
        .find_page(
            &Filter::all(),
            &PageRequest::of(0, 3).sorted(Sort::asc("username")),
        )
        .unwrap()
        .map(|member| member.read().username.clone());

    assert_eq!(page.content(), ["member1", "member2", "member3"]);
    assert_eq!(page.number(), 0);
    assert_eq!(page.size(), 3);
    assert!(page.has_next());
}

#[test]
fn page_request_has_a_stable_wire_shape() {
    let request = PageRequest::of(0, 3).sorted(Sort::desc("username"));

    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "number": 0,
            "size": 3,
            "sort": [{"attr": "username", "direction": "desc"}]
        })
    );
}
