use modelhub_core::model::{DeleteMode, Field, ForeignKey, Method, ModelDef, ROOT_MODEL};
use modelhub_core::{DeclarationError, Registry, RuntimeError, Value};
use std::collections::BTreeMap;

fn declaration_error(result: Result<impl std::fmt::Debug, RuntimeError>) -> DeclarationError {
    match result {
        Err(RuntimeError::Declaration(err)) => err,
        other => panic!("expected declaration error, got {other:?}"),
    }
}

#[test]
fn root_model_is_abstract_and_carries_uid() {
    let registry = Registry::in_memory().unwrap();
    let root = registry.declaration(ROOT_MODEL).unwrap();

    assert!(root.is_abstract());
    assert!(root.get_field("uid").is_some());
    assert!(registry.get_model(ROOT_MODEL).is_none());
    assert_eq!(root.delete_mode(), DeleteMode::AllowHard);
}

#[test]
fn duplicate_names_need_overwrite() {
    let registry = Registry::in_memory().unwrap();
    registry.declare(ModelDef::new("Book"), false).unwrap();

    let err = declaration_error(registry.declare(ModelDef::new("Book"), false));
    assert_eq!(err, DeclarationError::DuplicateModel("Book".to_string()));

    let replaced = registry
        .declare(ModelDef::new("Book").field(Field::new("title", "str")), true)
        .unwrap();
    assert!(replaced.get_field("title").is_some());
    assert_eq!(registry.models().count(), 1);
}

#[test]
fn rejects_bad_names_parents_and_datatypes() {
    let registry = Registry::in_memory().unwrap();

    assert!(matches!(
        declaration_error(registry.declare(ModelDef::new("9lives"), false)),
        DeclarationError::InvalidModelName(_)
    ));
    assert!(matches!(
        declaration_error(registry.declare(ModelDef::new("Book").parent("Missing"), false)),
        DeclarationError::UnknownParent { .. }
    ));
    assert!(matches!(
        declaration_error(registry.declare(
            ModelDef::new("Book").field(Field::new("shelf", "Shelf")),
            false
        )),
        DeclarationError::UnknownDataType { .. }
    ));
}

#[test]
fn self_references_are_allowed() {
    let registry = Registry::in_memory().unwrap();
    let model = registry
        .declare(
            ModelDef::new("Category").field(Field::new("parent", "Category").optional()),
            false,
        )
        .unwrap();
    assert_eq!(model.get_field("parent").unwrap().target_model(), Some("Category"));
    assert_eq!(registry.level("Category"), 0);
}

#[test]
fn subclass_fields_override_ancestors() {
    let registry = Registry::in_memory().unwrap();
    registry
        .declare(
            ModelDef::new("Item")
                .abstract_model()
                .field(Field::new("label", "str").length(1, 3)),
            false,
        )
        .unwrap();
    let tag = registry
        .declare(
            ModelDef::new("Tag")
                .parent("Item")
                .field(Field::new("label", "str").length(1, 10)),
            false,
        )
        .unwrap();

    assert_eq!(tag.ancestors(), ["Model".to_string(), "Item".to_string()]);
    assert!(tag.is_a("Item"));
    assert!(registry.get_model("Item").is_none());
    assert!(registry.declaration("Item").is_some());

    let mut config = BTreeMap::new();
    config.insert("label".to_string(), Value::from("abcdefgh"));
    let created = registry.create("Tag", config).unwrap();
    assert_eq!(created.get("label"), Value::from("abcdefgh"));

    let names = tag.attribute_names();
    assert_eq!(names, vec!["uid".to_string(), "label".to_string()]);
}

#[test]
fn delete_mode_inherits_from_nearest_ancestor() {
    let registry = Registry::in_memory().unwrap();
    registry
        .declare(
            ModelDef::new("Archive")
                .abstract_model()
                .delete_mode(DeleteMode::Hard),
            false,
        )
        .unwrap();
    let ledger = registry
        .declare(ModelDef::new("Ledger").parent("Archive"), false)
        .unwrap();

    assert_eq!(ledger.declared_delete_mode(), DeleteMode::Inherit);
    assert_eq!(ledger.delete_mode(), DeleteMode::Hard);
}

#[test]
fn relation_depth_orders_models() {
    let registry = Registry::in_memory().unwrap();
    registry
        .declare(ModelDef::new("Author").field(Field::new("name", "str")), false)
        .unwrap();
    registry
        .declare(ModelDef::new("Book").field(Field::new("author", "Author")), false)
        .unwrap();
    registry
        .declare(ModelDef::new("Review").field(Field::new("book", "Book")), false)
        .unwrap();

    assert_eq!(registry.level("Author"), 0);
    assert_eq!(registry.level("Book"), 1);
    assert_eq!(registry.level("Review"), 2);
}

#[test]
fn attribute_views_split_by_kind() {
    let registry = Registry::in_memory().unwrap();
    let author = registry
        .declare(
            ModelDef::new("Author")
                .field(Field::new("name", "str"))
                .foreign_key(ForeignKey::new("books", "Book", "author").multiple())
                .method(Method::new("shout", |registry, instance| {
                    let name = registry.get(instance, "name")?;
                    Ok(Value::from(name.as_str().unwrap_or_default().to_uppercase()))
                })),
            false,
        )
        .unwrap();

    assert_eq!(author.fields().count(), 2);
    assert_eq!(author.foreign_keys().count(), 1);
    assert_eq!(author.methods().count(), 1);
    assert!(author.get_foreign_key("books").unwrap().is_multiple());
    assert!(author.get_method("shout").is_some());
}

#[test]
fn rpy_lines_declare_fields() {
    let registry = Registry::in_memory().unwrap();
    let model = registry
        .declare(
            ModelDef::new("User")
                .rpy_field("!email[str] -u")
                .unwrap()
                .rpy_field("*nicknames[str]")
                .unwrap(),
            false,
        )
        .unwrap();

    assert_eq!(
        model.rpy(),
        "!uid[int] -u -p\n!email[str] -u\n*nicknames[str]"
    );
    assert!(ModelDef::new("User").rpy_field("email").is_err());
}
