use batchmodel_core::{
    Entity, Enumeration, MappingErrorKind, PropertyKind, PropertyValue, Reflect, SqlType, Value,
};
use batchmodel_macros::{Entity, Enumeration, Reflect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Enumeration)]
enum Level {
    #[default]
    Low,
    Mid,
    High = 10,
    Max,
}

#[derive(Debug, Default, Reflect)]
struct Embedded {
    address: String,
    #[entity(column = "town")]
    city: Option<String>,
}

#[derive(Debug, Default, Entity)]
#[entity(table = "entity_simple")]
struct EntitySimple {
    id: i64,
    #[entity(sql_type = "VARCHAR(64)")]
    name: String,
    #[entity(enumeration)]
    level: Level,
    #[entity(enumeration)]
    backup_level: Option<Level>,
    #[entity(owned)]
    embedded: Option<Embedded>,
    #[entity(owned)]
    required: Embedded,
    #[entity(navigation)]
    parent_id: Option<i64>,
    #[entity(unmapped)]
    scratch: String,
    #[entity(skip)]
    cache: Vec<u8>,
}

#[derive(Debug, Default, Entity)]
struct LineItem {
    id: i64,
}

#[derive(Debug, Default, Entity)]
#[entity(table = "generic_entities")]
struct GenericEntity<T> {
    id: i64,
    value: T,
    #[entity(owned)]
    embedded: Option<Embedded>,
}

#[test]
fn table_names() {
    assert_eq!(EntitySimple::TABLE_NAME, "entity_simple");
    assert_eq!(LineItem::TABLE_NAME, "line_items");
}

#[test]
fn enumeration_discriminants() {
    assert_eq!(Level::Low.to_raw(), 0);
    assert_eq!(Level::Mid.to_raw(), 1);
    assert_eq!(Level::High.to_raw(), 10);
    assert_eq!(Level::Max.to_raw(), 11);
    assert_eq!(Level::from_raw(11), Some(Level::Max));
    assert_eq!(Level::from_raw(2), None);
}

#[test]
fn property_descriptors() {
    let props = EntitySimple::properties();
    let names: Vec<_> = props.iter().map(|p| p.name).collect();
    assert_eq!(
        names,
        vec![
            "id",
            "name",
            "level",
            "backup_level",
            "embedded",
            "required",
            "parent_id",
            "scratch"
        ]
    );
    assert_eq!(props[1].sql_type, Some(SqlType::VarChar(64)));
    assert!(matches!(props[2].kind, PropertyKind::Enumeration));
    assert!(props[3].nullable);
    let nested = props[4].kind.owned_properties().unwrap();
    assert_eq!(nested.len(), 2);
    assert_eq!(nested[1].column, Some("town"));
    assert!(matches!(props[6].kind, PropertyKind::Navigation));
    assert!(!props[7].mapped);
}

#[test]
fn get_and_set_values() {
    let mut entity = EntitySimple {
        id: 7,
        name: "seven".to_string(),
        level: Level::High,
        cache: vec![1],
        ..Default::default()
    };

    assert_eq!(
        entity.get_value("id"),
        Some(PropertyValue::Scalar(Value::BigInt(7)))
    );
    assert_eq!(
        entity.get_value("level"),
        Some(PropertyValue::Enumeration(Some(10)))
    );
    assert_eq!(
        entity.get_value("backup_level"),
        Some(PropertyValue::Enumeration(None))
    );
    assert_eq!(entity.get_value("embedded"), None);
    assert_eq!(entity.get_value("cache"), None);

    entity.set_value("id", Value::Int(9)).unwrap();
    entity.set_value("backup_level", Value::BigInt(1)).unwrap();
    entity.set_value("level", Value::Null).unwrap_err();
    assert_eq!(entity.id, 9);
    assert_eq!(entity.backup_level, Some(Level::Mid));
    assert_eq!(entity.cache, vec![1]);

    let err = entity.set_value("missing", Value::Null).unwrap_err();
    assert_eq!(err.mapping_kind(), Some(MappingErrorKind::UnknownProperty));
}

#[test]
fn owned_access_materializes_optional() {
    let mut entity = EntitySimple::default();
    assert!(entity.owned("embedded").is_none());
    assert!(entity.owned("required").is_some());
    assert!(entity.owned("parent_id").is_none());

    let embedded = entity.owned_mut("embedded").unwrap();
    embedded
        .set_value("address", Value::Text("Main St".into()))
        .unwrap();
    assert_eq!(
        entity.embedded.as_ref().map(|e| e.address.as_str()),
        Some("Main St")
    );
    assert_eq!(entity.owned("embedded").unwrap().type_name(), "Embedded");
}

#[test]
fn generic_entity_reflects_each_instantiation() {
    assert_eq!(GenericEntity::<i32>::TABLE_NAME, "generic_entities");

    let props = GenericEntity::<i32>::properties();
    let names: Vec<_> = props.iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["id", "value", "embedded"]);
    assert_eq!(props[1].rust_type, "T");
    assert!(std::ptr::eq(props, GenericEntity::<String>::properties()));

    let mut entity = GenericEntity::<i32> {
        id: 1,
        value: 42,
        ..Default::default()
    };
    assert_eq!(
        entity.get_value("value"),
        Some(PropertyValue::Scalar(Value::Int(42)))
    );
    entity.set_value("value", Value::Int(7)).unwrap();
    assert_eq!(entity.value, 7);
    assert_eq!(entity.type_name(), "GenericEntity");

    let mut text = GenericEntity::<String>::default();
    text.set_value("value", Value::Text("seven".into())).unwrap();
    assert_eq!(text.value, "seven");
    assert!(text.owned_mut("embedded").is_some());
}
