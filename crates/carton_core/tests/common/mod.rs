//! Shared test domain: members, teams, deliveries.
#![allow(dead_code)]

use carton_core::{
    open_db_in_memory, Entity, LazyRef, MapError, Migration, Schema, Session, ValidationError,
};
use rusqlite::types::Value;
use rusqlite::Row;
use uuid::Uuid;

pub const SCHEMA_SQL: &str = "
CREATE TABLE teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    age INTEGER NOT NULL,
    team_id INTEGER REFERENCES teams(id)
);
CREATE TABLE deliveries (
    id TEXT PRIMARY KEY,
    city TEXT NOT NULL,
    status TEXT NOT NULL
);
";

pub fn schema() -> Schema {
    Schema::new(vec![Migration {
        version: 1,
        sql: SCHEMA_SQL,
    }])
    .unwrap()
}

pub fn open_session() -> Session {
    Session::new(open_db_in_memory(&schema()).unwrap())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for Team {
    type Id = i64;

    fn table() -> &'static str {
        "teams"
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

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: Option<i64>,
    pub username: String,
    pub age: i64,
    pub team: LazyRef<Team>,
}

impl Member {
    pub fn new(username: impl Into<String>, age: i64) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: LazyRef::none(),
        }
    }

    pub fn in_team(username: impl Into<String>, age: i64, team_id: i64) -> Self {
        Self {
            team: LazyRef::to(team_id),
            ..Self::new(username, age)
        }
    }
}

impl Entity for Member {
    type Id = i64;

    fn table() -> &'static str {
        "members"
    }

    fn columns() -> &'static [&'static str] {
        &["username", "age", "team_id"]
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
        vec![
            Value::Text(self.username.clone()),
            Value::Integer(self.age),
            self.team.fk_value(),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, MapError> {
        let team = match row.get::<_, Option<i64>>("team_id")? {
            Some(team_id) => LazyRef::to(team_id),
            None => LazyRef::none(),
        };
        Ok(Self {
            id: Some(row.get("id")?),
            username: row.get("username")?,
            age: row.get("age")?,
            team,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.age < 0 {
            return Err(ValidationError::new(format!(
                "member age must not be negative, got {}",
                self.age
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Ready,
    Shipped,
    Completed,
}

impl DeliveryStatus {
    fn to_db(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "ready" => Some(Self::Ready),
            "shipped" => Some(Self::Shipped),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Uses the application-assigned identifier strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: Option<Uuid>,
    pub city: String,
    pub status: DeliveryStatus,
}

impl Delivery {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            city: city.into(),
            status: DeliveryStatus::Ready,
        }
    }
}

impl Entity for Delivery {
    type Id = Uuid;

    fn table() -> &'static str {
        "deliveries"
    }

    fn columns() -> &'static [&'static str] {
        &["city", "status"]
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn id_value(id: &Uuid) -> Value {
        Value::Text(id.to_string())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.city.clone()),
            Value::Text(self.status.to_db().to_string()),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, MapError> {
        let id_text: String = row.get("id")?;
        let id = Uuid::parse_str(&id_text).map_err(|_| {
            MapError::Invalid(format!("invalid uuid value `{id_text}` in deliveries.id"))
        })?;
        let status_text: String = row.get("status")?;
        let status = DeliveryStatus::parse(&status_text).ok_or_else(|| {
            MapError::Invalid(format!(
                "invalid status `{status_text}` in deliveries.status"
            ))
        })?;
        Ok(Self {
            id: Some(id),
            city: row.get("city")?,
            status,
        })
    }
}
