mod support;

use recordkit_core::{RepoError, Row, UpsertPolicy, ValidationError, Value};
use support::{ids, open_store, people, seed, Person};
use uuid::Uuid;

#[test]
fn bulk_create_applies_defaults_and_generates_ids() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);

    let created = repo
        .bulk_create(vec![
            Row::new().with("id", "p-1").with("name", "Ada").with("age", 36),
            Row::new().with("name", "Anonymous"),
        ])
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0].id, "p-1");
    assert_eq!(created[0].status, "active");
    assert!(created[0].active);
    assert!(created[0].tags.is_empty());

    assert_eq!(created[1].name, "Anonymous");
    assert_eq!(created[1].age, 0);
    assert!(Uuid::parse_str(&created[1].id).is_ok());
    assert_eq!(repo.count().unwrap(), 2);
}

#[test]
fn bulk_create_coerces_text_inputs() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);
    let external = Uuid::new_v4();

    let created = repo
        .bulk_create(vec![Row::new()
            .with("id", "p-1")
            .with("name", "Typed")
            .with("release_date", "2022-03-04")
            .with("external_id", external.to_string())
            .with("tags", vec!["x", "y"])])
        .unwrap();

    let person = &created[0];
    assert_eq!(person.release_date.unwrap().to_string(), "2022-03-04");
    assert_eq!(person.external_id, Some(external));
    assert_eq!(person.tags, vec![Value::from("x"), Value::from("y")]);
}

#[test]
fn bulk_create_is_all_or_nothing() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);
    seed(&repo, &[Person::new("p-1", "Existing", 1)]);

    let duplicate = repo.bulk_create(vec![
        Row::new().with("id", "p-2").with("name", "Fresh"),
        Row::new().with("id", "p-1").with("name", "Clash"),
    ]);
    assert!(matches!(duplicate, Err(RepoError::Db(_))));
    assert!(!repo.exists("p-2").unwrap());

    let unknown = repo
        .bulk_create(vec![Row::new().with("name", "X").with("height", 2)])
        .unwrap_err();
    assert!(matches!(
        unknown,
        RepoError::Validation(ValidationError::UnknownFields { .. })
    ));
    assert_eq!(repo.count().unwrap(), 1);
}

#[test]
fn bulk_upsert_updates_known_ids_and_merges_fields() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);
    seed(
        &repo,
        &[
            Person::new("p-1", "Ada", 36).with_status("pending"),
            Person::new("p-2", "Grace", 45),
        ],
    );

    let updated = repo
        .bulk_upsert(vec![
            Row::new().with("id", "p-2").with("age", 46),
            Row::new().with("id", "p-1").with("status", "active"),
        ])
        .unwrap();

    assert_eq!(ids(&updated), vec!["p-2", "p-1"]);
    let grace = repo.find("p-2").unwrap().unwrap();
    assert_eq!((grace.name.as_str(), grace.age), ("Grace", 46));
    let ada = repo.find("p-1").unwrap().unwrap();
    assert_eq!((ada.status.as_str(), ada.age), ("active", 36));
}

#[test]
fn bulk_upsert_drops_unknown_and_missing_ids() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);
    seed(&repo, &[Person::new("p-1", "Ada", 36)]);

    let written = repo
        .bulk_upsert(vec![
            Row::new().with("id", "ghost").with("name", "Ghost"),
            Row::new().with("name", "No id"),
            Row::new().with("id", "p-1").with("name", "Ada L."),
        ])
        .unwrap();

    assert_eq!(ids(&written), vec!["p-1"]);
    assert!(repo.find("ghost").unwrap().is_none());
    assert_eq!(repo.count().unwrap(), 1);
}

#[test]
fn insert_missing_policy_inserts_unknown_ids() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);
    seed(&repo, &[Person::new("p-1", "Ada", 36)]);

    let written = repo
        .bulk_upsert_with(
            vec![
                Row::new().with("id", "p-1").with("age", 37),
                Row::new().with("id", "p-9").with("name", "New"),
                Row::new().with("name", "Generated"),
            ],
            UpsertPolicy::InsertMissing,
        )
        .unwrap();

    assert_eq!(written.len(), 3);
    assert_eq!(written[0].age, 37);
    assert_eq!(written[1].id, "p-9");
    assert_eq!(written[1].status, "active");
    assert!(Uuid::parse_str(&written[2].id).is_ok());
    assert_eq!(repo.count().unwrap(), 3);
}

#[test]
fn bulk_create_applies_defaults_for_explicit_nulls() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);

    let created = repo
        .bulk_create(vec![Row::new()
            .with("id", "p-1")
            .with("name", "Ada")
            .with("status", Value::Null)
            .with("age", Value::Null)])
        .unwrap();

    assert_eq!(created[0].status, "active");
    assert_eq!(created[0].age, 0);
}

#[test]
fn bulk_upsert_rejects_null_for_required_fields() {
    let (_dir, engine) = open_store();
    let repo = people(&engine);
    seed(&repo, &[Person::new("p-1", "Ada", 36).with_status("pending")]);

    let err = repo
        .bulk_upsert(vec![Row::new().with("id", "p-1").with("status", Value::Null)])
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(ref message) if message.contains("`status`")));

    let inserting = repo.bulk_upsert_with(
        vec![Row::new().with("id", "p-2").with("name", "New").with("status", Value::Null)],
        UpsertPolicy::InsertMissing,
    );
    assert!(matches!(inserting, Err(RepoError::InvalidData(_))));

    assert_eq!(repo.find("p-1").unwrap().unwrap().status, "pending");
    assert_eq!(repo.count().unwrap(), 1);
}
