use modelhub_core::model::{DeleteKind, Field, ModelDef};
use modelhub_core::{Delivery, EventBus, Registry, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

fn recorder() -> (Rc<RefCell<Vec<Delivery>>>, impl Fn(&Delivery) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |delivery: &Delivery| sink.borrow_mut().push(delivery.clone()))
}

#[test]
fn named_captures_are_typed() {
    let bus = EventBus::new();
    let (seen, callback) = recorder();
    bus.on("<name>/<uid:int>/update", callback).unwrap();

    assert_eq!(bus.emit("User/7/update", Value::Null), 1);
    assert_eq!(bus.emit("User/seven/update", Value::Null), 0);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kwarg("name"), Some(&Value::from("User")));
    assert_eq!(seen[0].kwarg("uid"), Some(&Value::Int(7)));
}

#[test]
fn unsubscribe_during_delivery_skips_later_callbacks() {
    let bus = EventBus::new();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let second_handle: Rc<RefCell<Option<modelhub_core::Subscription>>> =
        Rc::new(RefCell::new(None));
    let first_calls = Rc::clone(&calls);
    let to_cancel = Rc::clone(&second_handle);
    bus.on("Ping", move |_| {
        first_calls.borrow_mut().push("first");
        if let Some(subscription) = to_cancel.borrow().as_ref() {
            subscription.unsubscribe();
        }
    })
    .unwrap();
    let second_calls = Rc::clone(&calls);
    let second = bus
        .on("Ping", move |_| second_calls.borrow_mut().push("second"))
        .unwrap();
    *second_handle.borrow_mut() = Some(second);

    assert_eq!(bus.emit("Ping", Value::Null), 1);
    assert_eq!(*calls.borrow(), vec!["first"]);
}

#[test]
fn lifecycle_emits_set_create_update_and_delete() {
    let registry = Registry::in_memory().unwrap();
    let model = registry
        .declare(ModelDef::new("Task").field(Field::new("label", "str")), false)
        .unwrap();

    let (seen, callback) = recorder();
    registry.events().on("Task/#/*", callback).unwrap();

    let mut config = BTreeMap::new();
    config.insert("label".to_string(), Value::from("write docs"));
    let task = registry.create("Task", config).unwrap();
    registry.save(&task).unwrap();

    let mut change = BTreeMap::new();
    change.insert("label".to_string(), Value::from("ship docs"));
    registry.update(&task, change).unwrap();
    registry.delete(&task, DeleteKind::Hard).unwrap();

    let topics: Vec<String> = seen.borrow().iter().map(|d| d.topic.clone()).collect();
    assert_eq!(
        topics,
        vec!["Task/1/create", "Task/1/update", "Task/1/delete"]
    );
    assert!(model.instances().is_empty());
}

#[test]
fn field_sets_emit_named_topics() {
    let registry = Registry::in_memory().unwrap();
    registry
        .declare(ModelDef::new("Task").field(Field::new("label", "str")), false)
        .unwrap();

    let (seen, callback) = recorder();
    registry.events().on("Task/#/set/label", callback).unwrap();

    let mut config = BTreeMap::new();
    config.insert("label".to_string(), Value::from("a"));
    let task = registry.create("Task", config).unwrap();
    registry.set(&task, "label", Value::from("b")).unwrap();

    let values: Vec<Value> = seen.borrow().iter().map(|d| d.value.clone()).collect();
    assert_eq!(values, vec![Value::from("a"), Value::from("b")]);
    assert_eq!(seen.borrow()[0].arg(0), Some(&Value::Int(1)));
}
