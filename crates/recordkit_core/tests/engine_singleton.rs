mod support;

use recordkit_core::{get_repository, shared_engine};
use support::Person;

#[test]
fn every_acquisition_shares_one_engine() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shared.sqlite3").display());

    let first = get_repository::<Person>(Some(&url)).unwrap();
    let second = get_repository::<Person>(None).unwrap();
    let third = get_repository::<Person>(Some("sqlite::memory:")).unwrap();
    let engine = shared_engine(None).unwrap();

    assert!(std::ptr::eq(first.engine(), second.engine()));
    assert!(std::ptr::eq(first.engine(), third.engine()));
    assert!(std::ptr::eq(first.engine(), engine));
    assert_eq!(engine.config().connection_string, url);

    first.init_db().unwrap();
    first.save(&Person::new("p-1", "Shared", 1)).unwrap();
    assert_eq!(third.find("p-1").unwrap().unwrap().name, "Shared");
}
