//!
//! Shared roster fixture for the integration suites.
//!
//! Two entities: `team` (core id 1, ops id 2) and `member` with a lazy
//! `team` relation over the nullable `team_id` column.
//!

#![allow(dead_code)]

use siftdb::{
    model::{EntityDescriptor, FieldKind, Registry},
    record::Record,
    session::{Database, Managed},
    value::Value,
};

pub fn team_desc() -> EntityDescriptor {
    EntityDescriptor::build("team")
        .generated_id("id")
        .unique("name", FieldKind::Text)
        .finish()
        .expect("team should build")
}

pub fn member_desc() -> EntityDescriptor {
    EntityDescriptor::build("member")
        .generated_id("id")
        .unique("username", FieldKind::Text)
        .field("age", FieldKind::Int)
        .nullable("team_id", FieldKind::Uint)
        .relation("team", "team", "team_id")
        .finish()
        .expect("member should build")
}

pub fn schema() -> Registry {
    let mut registry = Registry::new();
    registry.register(team_desc()).expect("team should register");
    registry
        .register(member_desc())
        .expect("member should register");
    registry
}

pub fn open() -> Database {
    Database::new(schema()).expect("database should open")
}

pub fn member(username: &str, age: i64, team: Option<u64>) -> Record {
    let desc = member_desc();
    let mut builder = Record::build(&desc)
        .set("username", username)
        .set("age", age);
    if let Some(team) = team {
        builder = builder.set("team_id", team);
    }
    builder.build().expect("member should build")
}

/// Teams flush first so the members can point at their generated ids.
pub fn seed_roster(db: &Database) {
    let session = db.session();
    for name in ["core", "ops"] {
        let team = Record::build(&team_desc())
            .set("name", name)
            .build()
            .expect("team should build");
        session.add(team).expect("team should stage");
    }
    session.flush().expect("teams should flush");

    let roster = [
        ("ava", 21, Some(1)),
        ("bo", 35, Some(2)),
        ("cy", 28, Some(1)),
        ("dee", 19, None),
        ("eli", 40, Some(2)),
    ];
    for (username, age, team) in roster {
        session
            .add(member(username, age, team))
            .expect("member should stage");
    }
    session.commit().expect("roster should commit");
}

pub fn usernames(rows: &[Managed]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            row.get("username")
                .expect("username should read")
                .as_text()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

pub fn ages(rows: &[Managed]) -> Vec<i64> {
    rows.iter()
        .map(|row| {
            row.get("age")
                .expect("age should read")
                .as_int()
                .unwrap_or_default()
        })
        .collect()
}

pub fn age_of(row: &Managed) -> i64 {
    row.get("age")
        .expect("age should read")
        .as_int()
        .unwrap_or_default()
}

pub fn text_of(row: &Managed, field: &str) -> String {
    row.get(field)
        .expect("field should read")
        .as_text()
        .unwrap_or_default()
        .to_string()
}

pub fn int_value(value: &Value) -> i64 {
    value.as_int().unwrap_or_default()
}
