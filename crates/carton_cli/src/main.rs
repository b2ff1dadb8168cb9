//! CLI lifecycle walkthrough.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `carton_core` linkage.
//! - Narrate the entity lifecycle states against an in-memory database.

use carton_core::{
    open_db_in_memory, Entity, MapError, Migration, Repository, Schema, Session,
};
use rusqlite::types::Value;
use rusqlite::Row;

#[derive(Debug, Clone, PartialEq)]
struct Member {
    id: Option<i64>,
    name: String,
}

impl Entity for Member {
    type Id = i64;

    fn table() -> &'static str {
        "members"
    }

    fn columns() -> &'static [&'static str] {
        &["name"]
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

    fn id_from_rowid(rowid: i64) -> Option<i64> {
        Some(rowid)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, MapError> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::new(vec![Migration {
        version: 1,
        sql: "CREATE TABLE members (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);",
    }])?;
    let session = Session::new(open_db_in_memory(&schema)?);
    let repo = Repository::<Member>::new(&session)?;

    session.begin()?;

    let member = session.persist(Member {
        id: None,
        name: "kim".to_string(),
    })?;
    println!(
        "persist   -> id={:?} state={}",
        member.id(),
        session.state_of(&member)
    );

    member.edit().name = "kim (renamed)".to_string();
    session.flush()?;
    println!("flush     -> rename propagated to the store");

    session.detach(&member)?;
    println!("detach    -> state={}", session.state_of(&member));

    let id = member.id().ok_or("member lost its identifier")?;
    let refound = repo.find_by_id(&id)?.ok_or("member vanished")?;
    println!(
        "find      -> name={:?} state={}",
        refound.read().name,
        session.state_of(&refound)
    );

    repo.delete(&refound)?;
    println!("remove    -> state={}", session.state_of(&refound));

    session.commit()?;

    session.begin()?;
    println!("commit    -> remaining rows={}", repo.count()?);
    session.commit()?;

    Ok(())
}
