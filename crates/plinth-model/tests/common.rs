#![allow(dead_code)]

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, SubsecRound, Utc};
use plinth_db::{Database, DbRuntimeSettings};
use plinth_model::{
    Column, FieldValue, JsonDecoder, JsonValue, ManyToManyRelation, ManyToOneRelation, Model,
    Record, Schema,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

const CREATE_TABLES: &[&str] = &[
    r#"CREATE TABLE "testModels" (
        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "name" TEXT NOT NULL,
        "count" INTEGER NOT NULL,
        "isActive" INTEGER NOT NULL,
        "createdOn" TEXT NOT NULL,
        "birthDay" TEXT,
        "partnerId" INTEGER REFERENCES "testModels"("id") ON DELETE SET NULL,
        "meta" TEXT
    )"#,
    r#"CREATE TABLE "testModels_testModels" (
        "testModelsIdA" INTEGER NOT NULL REFERENCES "testModels"("id") ON DELETE CASCADE,
        "testModelsIdB" INTEGER NOT NULL REFERENCES "testModels"("id") ON DELETE CASCADE,
        PRIMARY KEY ("testModelsIdA", "testModelsIdB")
    )"#,
    r#"CREATE TABLE "tokens" (
        "id" TEXT PRIMARY KEY,
        "label" TEXT NOT NULL,
        "updatedAt" TEXT NOT NULL
    )"#,
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct TestModel {
    record: Record,
}

impl TestModel {
    pub const PARTNER: ManyToOneRelation<TestModel, TestModel> =
        ManyToOneRelation::new("partner", "partnerId");
    pub const FRIENDS: ManyToManyRelation<TestModel, TestModel> =
        ManyToManyRelation::self_referential("friends");

    /// A transient instance with every required column filled, like a
    /// freshly constructed object whose nullable fields default to null.
    pub fn draft(name: &str) -> Self {
        let mut model = Self::new();
        model.set_name(name);
        model.set_count(1);
        model.set_active(true);
        model.set_created_on(now());
        model.record_mut().set("birthDay", FieldValue::Null);
        model.record_mut().set("partnerId", FieldValue::Null);
        model.record_mut().set("meta", FieldValue::Null);
        model
    }

    pub fn id(&self) -> Option<i64> {
        self.record.get("id").and_then(FieldValue::as_i64)
    }

    pub fn set_id(&mut self, id: i64) {
        self.record.set("id", id);
    }

    pub fn name(&self) -> Option<&str> {
        self.record.get("name").and_then(FieldValue::as_str)
    }

    pub fn set_name(&mut self, name: &str) {
        self.record.set("name", name);
    }

    pub fn count(&self) -> Option<i64> {
        self.record.get("count").and_then(FieldValue::as_i64)
    }

    pub fn set_count(&mut self, count: i64) {
        self.record.set("count", count);
    }

    pub fn set_active(&mut self, active: bool) {
        self.record.set("isActive", active);
    }

    pub fn set_created_on(&mut self, at: NaiveDateTime) {
        self.record.set("createdOn", at);
    }

    pub fn birth_day(&self) -> Option<NaiveDate> {
        self.record.get("birthDay").and_then(FieldValue::as_date)
    }

    pub fn set_birth_day(&mut self, day: Option<NaiveDate>) {
        self.record.set("birthDay", day);
    }

    pub fn partner_id(&self) -> Option<i64> {
        self.record.get("partnerId").and_then(FieldValue::as_i64)
    }

    pub fn set_partner_id(&mut self, id: Option<i64>) {
        self.record.set("partnerId", id);
    }

    pub fn meta(&self) -> Option<&Meta> {
        self.record
            .get("meta")
            .and_then(FieldValue::as_json)
            .and_then(JsonValue::downcast_ref::<Meta>)
    }

    pub fn set_meta(&mut self, meta: Meta) {
        self.record.set("meta", JsonValue::encoded(meta));
    }
}

impl Model for TestModel {
    fn schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::builder("testModels")
                .column(Column::integer("id").primary())
                .column(Column::string("name"))
                .column(Column::integer("count"))
                .column(Column::boolean("isActive"))
                .column(Column::datetime("createdOn"))
                .column(Column::date("birthDay").nullable())
                .column(Column::integer("partnerId").nullable())
                .column(
                    Column::json("meta")
                        .nullable()
                        .decoder(JsonDecoder::of::<Meta>()),
                )
                .many_to_one(&TestModel::PARTNER)
                .build()
        })
    }

    fn from_record(record: Record) -> Self {
        Self { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

/// A model with a generated string primary key and an update timestamp.
#[derive(Debug, Clone)]
pub struct Token {
    record: Record,
}

impl Token {
    pub fn id(&self) -> Option<&str> {
        self.record.get("id").and_then(FieldValue::as_str)
    }

    pub fn set_id(&mut self, id: &str) {
        self.record.set("id", id);
    }

    pub fn label(&self) -> Option<&str> {
        self.record.get("label").and_then(FieldValue::as_str)
    }

    pub fn set_label(&mut self, label: &str) {
        self.record.set("label", label);
    }

    pub fn updated_at(&self) -> Option<NaiveDateTime> {
        self.record.get("updatedAt").and_then(FieldValue::as_datetime)
    }

    pub fn set_updated_at(&mut self, at: NaiveDateTime) {
        self.record.set("updatedAt", at);
    }
}

impl Model for Token {
    fn schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::builder("tokens")
                .column(Column::uuid_primary("id"))
                .column(Column::string("label"))
                .column(Column::datetime("updatedAt"))
                .build()
        })
    }

    fn from_record(record: Record) -> Self {
        Self { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

/// A fresh file-backed database with the test tables. Keep the `TempDir`
/// alive for the duration of the test.
pub async fn setup() -> (TempDir, Database) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("plinth.db");
    let db = Database::connect(
        path.to_str().expect("temp path is not utf-8"),
        DbRuntimeSettings::default(),
    )
    .expect("failed to open database");

    for sql in CREATE_TABLES {
        db.statement(*sql, Vec::new())
            .await
            .expect("failed to create table");
    }
    (dir, db)
}

pub async fn saved(db: &Database, name: &str) -> TestModel {
    let mut model = TestModel::draft(name);
    assert!(model.save(db).await.expect("failed to save model"));
    model
}

pub async fn fetch(db: &Database, id: i64) -> TestModel {
    let sql = format!(
        "SELECT {} FROM \"testModels\" AS \"testModels\" WHERE \"testModels\".\"id\" = ?",
        TestModel::default_select("testModels")
    );
    let rows = db
        .select(sql, vec![plinth_db::Value::Integer(id)])
        .await
        .expect("select failed");
    assert_eq!(rows.len(), 1);
    TestModel::from_rows(&rows, "testModels")
        .expect("failed to hydrate")
        .pop()
        .expect("row should hydrate")
}

pub async fn fetch_token(db: &Database, id: &str) -> Option<Token> {
    let sql = format!(
        "SELECT {} FROM \"tokens\" AS \"tokens\" WHERE \"tokens\".\"id\" = ?",
        Token::default_select("tokens")
    );
    let rows = db
        .select(sql, vec![plinth_db::Value::Text(id.to_string())])
        .await
        .expect("select failed");
    Token::from_rows(&rows, "tokens")
        .expect("failed to hydrate")
        .pop()
}
