#![allow(dead_code)]

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use recordkit_core::{
    Engine, EngineConfig, Entity, EntitySchema, FieldDef, FieldKind, RepoResult, Repository, Row,
    Value,
};
use tempfile::TempDir;
use uuid::Uuid;

static PERSON_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::new(
        "people",
        [
            FieldDef::new("name", FieldKind::Text),
            FieldDef::new("age", FieldKind::Integer).default_sql("0"),
            FieldDef::new("status", FieldKind::Text).default_sql("'active'"),
            FieldDef::new("nickname", FieldKind::Text).optional(),
            FieldDef::new("release_date", FieldKind::Date).optional(),
            FieldDef::new("external_id", FieldKind::Identifier).optional(),
            FieldDef::new("score", FieldKind::Float).optional(),
            FieldDef::new("active", FieldKind::Boolean).default_sql("1"),
            FieldDef::new("tags", FieldKind::List).default_sql("'[]'"),
        ],
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub age: i64,
    pub status: String,
    pub nickname: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub external_id: Option<Uuid>,
    pub score: Option<f64>,
    pub active: bool,
    pub tags: Vec<Value>,
}

impl Person {
    pub fn new(id: &str, name: &str, age: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            age,
            status: "active".to_string(),
            nickname: None,
            release_date: None,
            external_id: None,
            score: None,
            active: true,
            tags: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn released(mut self, date: &str) -> Self {
        self.release_date = Some(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
        self
    }
}

impl Entity for Person {
    fn schema() -> &'static EntitySchema {
        &PERSON_SCHEMA
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id.as_str())
            .with("name", self.name.as_str())
            .with("age", self.age)
            .with("status", self.status.as_str())
            .with("nickname", self.nickname.clone())
            .with("release_date", self.release_date)
            .with("external_id", self.external_id)
            .with("score", self.score)
            .with("active", self.active)
            .with("tags", self.tags.clone())
    }

    fn from_row(mut row: Row) -> RepoResult<Self> {
        Ok(Self {
            id: row.take("id")?,
            name: row.take("name")?,
            age: row.take("age")?,
            status: row.take("status")?,
            nickname: row.take("nickname")?,
            release_date: row.take("release_date")?,
            external_id: row.take("external_id")?,
            score: row.take("score")?,
            active: row.take("active")?,
            tags: row.take("tags")?,
        })
    }
}

/// File-backed engine in a fresh temporary directory.
pub fn open_store() -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    let engine = Engine::connect(EngineConfig::new(format!("sqlite://{}", path.display()))).unwrap();
    (dir, engine)
}

/// Person repository with its table created.
pub fn people(engine: &Engine) -> Repository<'_, Person> {
    let repo = Repository::<Person>::new(engine);
    repo.init_db().unwrap();
    repo
}

pub fn seed(repo: &Repository<'_, Person>, people: &[Person]) {
    for person in people {
        repo.save(person).unwrap();
    }
}

pub fn ids(people: &[Person]) -> Vec<&str> {
    people.iter().map(|person| person.id.as_str()).collect()
}
