mod common;

use chrono::NaiveDate;
use common::{fetch, fetch_token, saved, setup, Meta, TestModel, Token};
use plinth_model::{ManyToOneRelation, Model, ModelError, RelationState};

#[tokio::test]
async fn integer_primary_key_cannot_be_chosen() {
    let (_dir, db) = setup().await;
    let mut model = TestModel::draft("My name");
    model.set_id(123);

    let err = model.save(&db).await.expect_err("save should fail");
    assert!(matches!(err, ModelError::PrimaryKeyAssigned { model: "testModels" }));
    assert!(err.to_string().contains("primary"));
    assert!(!model.exists_in_database());
}

#[tokio::test]
async fn creating_requires_every_column() {
    let (_dir, db) = setup().await;
    let mut model = TestModel::draft("My name");
    model.record_mut().erase("count").expect("count is a column");

    let before = db.query_count();
    let err = model.save(&db).await.expect_err("save should fail");
    assert!(matches!(
        err,
        ModelError::MissingColumn {
            column: "count",
            ..
        }
    ));
    assert_eq!(db.query_count(), before);
}

#[tokio::test]
async fn saving_a_new_instance() {
    let (_dir, db) = setup().await;
    let mut model = TestModel::draft("My name");
    model.set_birth_day(NaiveDate::from_ymd_opt(1990, 1, 1));

    assert!(model.save(&db).await.expect("save failed"));
    let id = model.id().expect("id should be assigned");
    assert!(id >= 1);
    assert!(model.exists_in_database());
    assert!(model.record().dirty_columns().is_empty());

    let selected = fetch(&db, id).await;
    assert_eq!(selected.id(), Some(id));
    assert_eq!(selected.name(), Some("My name"));
    assert_eq!(selected.birth_day(), NaiveDate::from_ymd_opt(1990, 1, 1));
    assert_eq!(selected.partner_id(), None);
    assert_eq!(
        selected.record().get("createdOn"),
        model.record().get("createdOn")
    );
    assert!(selected.exists_in_database());
}

#[tokio::test]
async fn no_query_if_no_changes() {
    let (_dir, db) = setup().await;
    let mut model = saved(&db, "My partner").await;

    let before = db.query_count();
    model.set_count(1);
    assert!(!model.save(&db).await.expect("save failed"));
    assert_eq!(db.query_count(), before);
}

#[tokio::test]
async fn update_writes_only_changed_columns() {
    let (_dir, db) = setup().await;
    let mut model = saved(&db, "My partner").await;
    let id = model.id().expect("saved model has an id");

    model.set_count(2);
    assert_eq!(model.record().dirty_columns(), vec!["count"]);

    let before = db.query_count();
    assert!(model.save(&db).await.expect("save failed"));
    assert_eq!(db.query_count(), before + 1);
    assert_eq!(model.id(), Some(id));

    assert_eq!(fetch(&db, id).await.count(), Some(2));
}

#[tokio::test]
async fn update_of_missing_row_is_not_fatal() {
    let (_dir, db) = setup().await;
    let mut model = saved(&db, "Gone").await;
    db.delete("DELETE FROM \"testModels\"", Vec::new())
        .await
        .expect("delete failed");

    model.set_count(5);
    assert!(model.save(&db).await.expect("update of a missing row only warns"));
}

#[tokio::test]
async fn many_to_one_requires_saved_target() {
    let (_dir, db) = setup().await;
    let partner = TestModel::draft("My partner");
    let mut model = TestModel::draft("My name");

    let err = model
        .set_relation(&TestModel::PARTNER, &partner)
        .expect_err("unsaved target should be rejected");
    assert!(matches!(
        err,
        ModelError::UnsavedRelationTarget {
            relation: "partner"
        }
    ));
    assert!(!TestModel::PARTNER.is_loaded(&model));

    assert!(model.save(&db).await.expect("save failed"));
    assert_eq!(model.partner_id(), None);
}

#[tokio::test]
async fn setting_a_many_to_one_relation() {
    let (_dir, db) = setup().await;
    let partner = saved(&db, "My partner").await;
    let mut model = TestModel::draft("My name");

    model
        .set_relation(&TestModel::PARTNER, &partner)
        .expect("partner is saved");
    assert!(TestModel::PARTNER.is_set(&model));
    assert!(model.save(&db).await.expect("save failed"));

    assert_eq!(model.partner_id(), partner.id());
    match TestModel::PARTNER.get(&model) {
        RelationState::Set(loaded) => assert_eq!(loaded.id(), partner.id()),
        other => panic!("expected a set relation, got {other:?}"),
    }
}

#[tokio::test]
async fn setting_a_many_to_one_relation_by_id() {
    let (_dir, db) = setup().await;
    let partner = saved(&db, "My partner").await;
    let mut model = TestModel::draft("My name");
    model.set_partner_id(partner.id());

    assert!(model.save(&db).await.expect("save failed"));
    assert!(!TestModel::PARTNER.is_loaded(&model));

    let selected = fetch(&db, model.id().expect("saved")).await;
    assert_eq!(selected.partner_id(), partner.id());
}

#[tokio::test]
async fn foreign_key_must_follow_loaded_relation() {
    let (_dir, db) = setup().await;
    let partner = saved(&db, "My partner").await;
    let other = saved(&db, "Someone else").await;
    let mut model = TestModel::draft("My name");
    model
        .set_relation(&TestModel::PARTNER, &partner)
        .expect("partner is saved");

    model.set_partner_id(other.id());
    let before = db.query_count();
    let err = model.save(&db).await.expect_err("save should fail");
    assert!(matches!(
        err,
        ModelError::RelationInvariantViolation {
            relation: "partner",
            ..
        }
    ));
    assert_eq!(db.query_count(), before);

    model.unload_relation(&TestModel::PARTNER);
    assert!(matches!(
        TestModel::PARTNER.get(&model),
        RelationState::NotLoaded
    ));
    assert!(model.save(&db).await.expect("save failed"));
    assert_eq!(model.partner_id(), other.id());
}

#[tokio::test]
async fn clearing_a_many_to_one_relation() {
    let (_dir, db) = setup().await;
    let partner = saved(&db, "My partner").await;
    let mut model = TestModel::draft("My name");
    model
        .set_relation(&TestModel::PARTNER, &partner)
        .expect("partner is saved");
    assert!(model.save(&db).await.expect("save failed"));

    model
        .unset_relation(&TestModel::PARTNER)
        .expect("partner is registered");
    assert!(matches!(
        TestModel::PARTNER.get(&model),
        RelationState::Cleared
    ));
    assert!(TestModel::PARTNER.is_loaded(&model));
    assert!(!TestModel::PARTNER.is_set(&model));
    assert!(model.save(&db).await.expect("save failed"));

    let selected = fetch(&db, model.id().expect("saved")).await;
    assert_eq!(selected.partner_id(), None);

    model.set_partner_id(partner.id());
    assert!(matches!(
        model.save(&db).await,
        Err(ModelError::RelationInvariantViolation { .. })
    ));
}

#[tokio::test]
async fn hydrating_a_joined_relation() {
    let (_dir, db) = setup().await;
    let partner = saved(&db, "My partner").await;
    let mut model = TestModel::draft("My name");
    model.set_partner_id(partner.id());
    model.save(&db).await.expect("save failed");
    saved(&db, "Single").await;

    let sql = format!(
        "SELECT {}, {} FROM \"testModels\" AS \"m\" {} ORDER BY \"m\".\"id\"",
        TestModel::default_select("m"),
        TestModel::default_select("partner"),
        TestModel::PARTNER.join_clause("m", "partner"),
    );
    let rows = db.select(sql, Vec::new()).await.expect("select failed");
    assert_eq!(rows.len(), 3);

    let owners = TestModel::from_rows(&rows, "m").expect("hydrate owners");
    let partners = TestModel::from_rows(&rows, "partner").expect("hydrate partners");
    assert_eq!(owners.len(), 3);
    assert_eq!(partners.len(), 1);
    assert_eq!(partners[0].id(), partner.id());
    assert_eq!(owners[1].partner_id(), partner.id());
}

#[tokio::test]
async fn select_columns_without_excludes_columns() {
    let (_dir, db) = setup().await;
    let model = saved(&db, "Partial").await;

    let select = TestModel::select_columns_without("t", &["meta", "birthDay"])
        .expect("columns remain");
    assert!(!select.contains("meta"));

    let sql = format!("SELECT {select} FROM \"testModels\" AS \"t\"");
    let rows = db.select(sql, Vec::new()).await.expect("select failed");
    let loaded = TestModel::from_rows(&rows, "t").expect("hydrate");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id(), model.id());
    assert!(!loaded[0].record().is_defined("meta"));

    let mut loaded = loaded.into_iter().next().expect("one model");
    loaded.set_count(9);
    assert!(loaded.save(&db).await.expect("partial models can be updated"));
}

#[tokio::test]
async fn deleting_is_terminal() {
    let (_dir, db) = setup().await;
    let mut model = saved(&db, "Doomed").await;
    let id = model.id().expect("saved");

    model.delete(&db).await.expect("delete failed");
    assert!(!model.exists_in_database());
    assert_eq!(model.primary_key(), None);
    assert!(model.record().is_deleted());

    let rows = db
        .select(
            "SELECT \"id\" FROM \"testModels\" WHERE \"id\" = ?",
            vec![plinth_model::Value::Integer(id)],
        )
        .await
        .expect("select failed");
    assert!(rows.is_empty());

    assert!(matches!(
        model.delete(&db).await,
        Err(ModelError::NotPersisted { .. })
    ));
    assert!(matches!(
        model.save(&db).await,
        Err(ModelError::Deleted { .. })
    ));
}

#[tokio::test]
async fn delete_requires_a_saved_instance() {
    let (_dir, db) = setup().await;
    let mut model = TestModel::draft("Transient");
    assert!(matches!(
        model.delete(&db).await,
        Err(ModelError::NotPersisted { model: "testModels" })
    ));
}

#[tokio::test]
async fn json_column_round_trips() {
    let (_dir, db) = setup().await;
    let meta = Meta {
        tags: vec!["board".into(), "treasurer".into()],
        score: 7,
    };
    let mut model = TestModel::draft("With meta");
    model.set_meta(meta.clone());
    model.save(&db).await.expect("save failed");

    let selected = fetch(&db, model.id().expect("saved")).await;
    assert_eq!(selected.meta(), Some(&meta));

    let mut selected = selected;
    selected.set_meta(meta.clone());
    assert!(!selected.save(&db).await.expect("save failed"));
}

#[tokio::test]
async fn malformed_json_reads_as_default() {
    let (_dir, db) = setup().await;
    let model = saved(&db, "Legacy").await;
    let id = model.id().expect("saved");
    db.update(
        "UPDATE \"testModels\" SET \"meta\" = 'not json' WHERE \"id\" = ?",
        vec![plinth_model::Value::Integer(id)],
    )
    .await
    .expect("update failed");

    let selected = fetch(&db, id).await;
    assert_eq!(selected.meta(), Some(&Meta::default()));
}

#[tokio::test]
async fn generated_string_primary_key() {
    let (_dir, db) = setup().await;
    let mut token = Token::new();
    token.set_label("first");

    assert!(token.save(&db).await.expect("save failed"));
    let id = token.id().expect("uuid assigned").to_string();
    assert_eq!(id.len(), 36);
    let created = token.updated_at().expect("timestamp set on insert");

    token.set_label("first");
    assert!(!token.save(&db).await.expect("save failed"));
    assert_eq!(token.updated_at(), Some(created));

    token.set_label("second");
    assert!(token.save(&db).await.expect("save failed"));
    assert_eq!(token.id(), Some(id.as_str()));
    assert!(token.updated_at() >= Some(created));
}

#[tokio::test]
async fn primary_key_cannot_change_once_saved() {
    let (_dir, db) = setup().await;
    let mut alice = saved(&db, "alice").await;
    let bob = saved(&db, "bob").await;
    let alice_id = alice.id().expect("saved");
    let bob_id = bob.id().expect("saved");

    alice.set_id(bob_id);
    alice.set_name("overwritten");
    let before = db.query_count();
    let err = alice.save(&db).await.expect_err("save should fail");
    assert!(matches!(err, ModelError::PrimaryKeyChanged { model: "testModels" }));
    let err = alice.delete(&db).await.expect_err("delete should fail");
    assert!(matches!(err, ModelError::PrimaryKeyChanged { .. }));
    assert_eq!(db.query_count(), before);
    assert_eq!(fetch(&db, bob_id).await.name(), Some("bob"));

    alice.set_id(alice_id);
    assert!(alice.save(&db).await.expect("save failed"));
    assert_eq!(fetch(&db, alice_id).await.name(), Some("overwritten"));
    assert_eq!(fetch(&db, bob_id).await.name(), Some("bob"));
}

#[tokio::test]
async fn string_primary_key_cannot_change_once_saved() {
    let (_dir, db) = setup().await;
    let mut token = Token::new();
    token.set_label("first");
    assert!(token.save(&db).await.expect("save failed"));
    let id = token.id().expect("uuid assigned").to_string();

    token.set_id("another-id");
    token.set_label("second");
    let err = token.save(&db).await.expect_err("save should fail");
    assert!(matches!(err, ModelError::PrimaryKeyChanged { model: "tokens" }));

    let stored = fetch_token(&db, &id).await.expect("row still exists");
    assert_eq!(stored.label(), Some("first"));
    assert!(fetch_token(&db, "another-id").await.is_none());
}

#[tokio::test]
async fn unregistered_relation_is_rejected() {
    const UNREGISTERED: ManyToOneRelation<TestModel, TestModel> =
        ManyToOneRelation::new("other", "count");

    let (_dir, db) = setup().await;
    let target = saved(&db, "Target").await;
    let mut model = saved(&db, "My name").await;

    let err = model
        .set_relation(&UNREGISTERED, &target)
        .expect_err("relation is not part of the schema");
    assert!(matches!(err, ModelError::InvalidSchema { table: "testModels", .. }));
    assert!(matches!(
        UNREGISTERED.get(&model),
        RelationState::NotLoaded
    ));
    assert_eq!(model.count(), Some(1));
    assert!(model.unset_relation(&UNREGISTERED).is_err());
}

#[tokio::test]
async fn explicit_update_timestamp_is_kept() {
    let (_dir, db) = setup().await;
    let mut token = Token::new();
    token.set_label("first");
    assert!(token.save(&db).await.expect("save failed"));
    let id = token.id().expect("uuid assigned").to_string();

    let chosen = NaiveDate::from_ymd_opt(2001, 2, 3)
        .and_then(|day| day.and_hms_opt(4, 5, 6))
        .expect("valid timestamp");
    token.set_label("second");
    token.set_updated_at(chosen);
    assert!(token.save(&db).await.expect("save failed"));
    assert_eq!(token.updated_at(), Some(chosen));

    let stored = fetch_token(&db, &id).await.expect("row exists");
    assert_eq!(stored.label(), Some("second"));
    assert_eq!(stored.updated_at(), Some(chosen));
}
