//!
//! Derived-name queries end to end: parse against the roster schema,
//! bind parameters, and run through a live session.
//!

mod common;

use common::{open, seed_roster, usernames};
use siftdb::{
    Error,
    error::ErrorClass,
    query::{DeriveError, Params, QueryError},
    value::Value,
};

#[test]
fn single_column_lookup_finds_the_row() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let row = session
        .derive("member", "find_by_username")
        .expect("name should parse")
        .one(&Params::positional(["cy"]))
        .expect("cy should match exactly once");

    assert_eq!(row.get("age").expect("age should read"), Value::Int(28));
}

#[test]
fn comparison_and_ordering_compose() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let rows = session
        .derive("member", "find_by_age_greater_than_order_by_age")
        .expect("name should parse")
        .all(&Params::positional([25]))
        .expect("query should run")
        .all();

    assert_eq!(usernames(&rows), ["cy", "bo", "eli"]);
}

#[test]
fn descending_order_with_top_limit() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let rows = session
        .derive("member", "find_top2_by_order_by_age_desc")
        .expect("name should parse")
        .all(&Params::none())
        .expect("query should run")
        .all();

    assert_eq!(usernames(&rows), ["eli", "bo"]);
}

#[test]
fn relation_paths_filter_through_the_target() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let count = session
        .derive("member", "count_by_team_name")
        .expect("name should parse")
        .count(&Params::positional(["core"]))
        .expect("count should run");

    assert_eq!(count, 2);
}

#[test]
fn case_fold_applies_to_the_whole_predicate_tail() {
    let db = open();
    seed_roster(&db);
    let session = db.session();
    let derived = session
        .derive("member", "exists_by_username_ignore_case")
        .expect("name should parse");

    assert!(
        derived
            .exists(&Params::positional(["AVA"]))
            .expect("exists should run")
    );
    assert!(
        !derived
            .exists(&Params::positional(["zed"]))
            .expect("exists should run")
    );
}

#[test]
fn between_keeps_both_bounds() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let count = session
        .derive("member", "count_by_age_between")
        .expect("name should parse")
        .count(&Params::positional([21, 35]))
        .expect("count should run");

    assert_eq!(count, 3);
}

#[test]
fn membership_takes_a_list_parameter() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let wanted = Value::List(vec!["ava".into(), "eli".into()]);
    let rows = session
        .derive("member", "find_by_username_in")
        .expect("name should parse")
        .all(&Params::positional([wanted]))
        .expect("query should run")
        .all();

    assert_eq!(usernames(&rows), ["ava", "eli"]);
}

#[test]
fn null_checks_consume_no_parameters() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let rows = session
        .derive("member", "find_by_team_id_is_null")
        .expect("name should parse")
        .all(&Params::none())
        .expect("query should run")
        .all();

    assert_eq!(usernames(&rows), ["dee"]);
}

#[test]
fn or_binds_looser_than_and() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let rows = session
        .derive(
            "member",
            "find_by_age_less_than_and_team_id_is_null_or_username",
        )
        .expect("name should parse")
        .all(&Params::positional([Value::from(20), Value::from("eli")]))
        .expect("query should run")
        .all();

    assert_eq!(usernames(&rows), ["dee", "eli"]);
}

#[test]
fn delete_subject_removes_rows_immediately() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let affected = session
        .derive("member", "delete_by_age_less_than")
        .expect("name should parse")
        .execute(&Params::positional([20]))
        .expect("delete should run");

    assert_eq!(affected, 1);
    assert_eq!(db.row_count("member"), 4);
    assert!(
        session
            .get("member", 4_u64)
            .expect("lookup should run")
            .is_none()
    );

    session.commit().expect("commit should succeed");
    assert_eq!(db.row_count("member"), 4);
}

#[test]
fn missing_parameters_fail_before_the_scan() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let err = session
        .derive("member", "find_by_username_and_age_greater_than")
        .expect("name should parse")
        .all(&Params::positional(["ava"]))
        .expect_err("one of two parameters should fail");

    assert!(matches!(
        err,
        Error::Query(QueryError::PositionalArity {
            expected: 2,
            found: 1,
        })
    ));
    assert_eq!(err.class(), ErrorClass::Arity);
}

#[test]
fn unknown_fields_fail_at_parse_time() {
    let db = open();
    seed_roster(&db);
    let session = db.session();

    let err = session
        .derive("member", "find_by_nickname")
        .expect_err("nickname is not a member field");

    assert!(matches!(err, Error::Derive(DeriveError::UnknownField { .. })));
    assert_eq!(err.class(), ErrorClass::Schema);

    let err = session
        .derive("member", "locate_by_username")
        .expect_err("locate is not a query subject");

    assert!(matches!(
        err,
        Error::Derive(DeriveError::UnknownSubject { .. })
    ));
    assert_eq!(err.class(), ErrorClass::Parse);
}
