use modelhub_core::model::{Field, ModelDef};
use modelhub_core::{Query, Registry, Value};
use std::collections::BTreeMap;

fn note_registry() -> Registry {
    let registry = Registry::in_memory().unwrap();
    registry
        .declare(
            ModelDef::new("Note")
                .field(Field::new("title", "str"))
                .field(Field::new("stars", "int").default(0)),
            false,
        )
        .unwrap();
    registry
}

fn create(registry: &Registry, title: &str, stars: i64) {
    let mut config = BTreeMap::new();
    config.insert("title".to_string(), Value::from(title));
    config.insert("stars".to_string(), Value::Int(stars));
    registry.create("Note", config).unwrap();
}

#[test]
fn where_sees_instances_added_after_it_was_built() {
    let registry = note_registry();
    let starred = registry
        .model("Note")
        .unwrap()
        .instances()
        .where_eq("stars", Value::Int(1));

    assert_eq!(starred.count(), 0);
    create(&registry, "draft", 0);
    create(&registry, "keeper", 1);

    let titles: Vec<Value> = starred.getattr("title").list();
    assert_eq!(titles, vec![Value::from("keeper")]);
}

#[test]
fn registry_instance_queries_stay_safe() {
    let registry = note_registry();
    let instances = registry.model("Note").unwrap().instances();
    create(&registry, "a", 3);

    let _narrowed = instances.where_eq("stars", Value::Int(99));
    assert_eq!(instances.count(), 1);
    assert!(instances.is_safe());
}

#[test]
fn aggregates_over_attribute_projections() {
    let registry = note_registry();
    create(&registry, "a", 3);
    create(&registry, "b", 5);
    create(&registry, "c", 1);

    let stars = registry.model("Note").unwrap().instances().getattr("stars");
    assert_eq!(stars.sum(), Value::Int(9));
    assert_eq!(stars.max(Value::Null), Value::Int(5));
    assert_eq!(stars.min(Value::Null), Value::Int(1));
}

#[test]
fn where_all_requires_every_pair() {
    let rows: Query<BTreeMap<String, Value>> = Query::from_vec(vec![
        BTreeMap::from([
            ("lang".to_string(), Value::from("rust")),
            ("year".to_string(), Value::Int(2015)),
        ]),
        BTreeMap::from([
            ("lang".to_string(), Value::from("rust")),
            ("year".to_string(), Value::Int(2018)),
        ]),
    ])
    .safe();

    let matched = rows.where_all(vec![
        ("lang".to_string(), Value::from("rust")),
        ("year".to_string(), Value::Int(2018)),
    ]);
    assert_eq!(matched.count(), 1);
    assert!(rows.where_eq("missing", Value::Null).count() == 2);
}
