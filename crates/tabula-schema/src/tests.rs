use std::cmp::Ordering;

use proptest::prelude::*;

use super::*;

fn book_fields() -> Vec<Field> {
    vec![
        Field::scalar("id", ScalarType::Int)
            .id()
            .default(DefaultValue::Autoincrement),
        Field::scalar("title", ScalarType::Text),
        Field::scalar("publishedYear", ScalarType::Int).map("published_year"),
        Field::scalar("pages", ScalarType::Int),
    ]
}

fn library_schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .define_model(
            "Author",
            vec![
                Field::scalar("id", ScalarType::BigInt)
                    .id()
                    .default(DefaultValue::Autoincrement),
                Field::scalar("email", ScalarType::Text).unique(),
                Field::relation("books", Relation::one_to_many("Book")),
            ],
            vec![],
        )
        .unwrap();
    schema
        .add_model(
            Model::new(
                "Book",
                vec![
                    Field::scalar("id", ScalarType::BigInt)
                        .id()
                        .default(DefaultValue::Autoincrement),
                    Field::scalar("title", ScalarType::Text),
                    Field::scalar("authorId", ScalarType::BigInt).map("author_id"),
                    Field::relation(
                        "author",
                        Relation::one_to_many("Author")
                            .fields(["authorId"])
                            .references(["id"])
                            .on_delete(ReferentialAction::Cascade),
                    ),
                    Field::scalar("createdAt", ScalarType::Timestamp).default(DefaultValue::Now),
                    Field::scalar("updatedAt", ScalarType::Timestamp).updated_at(),
                    Field::relation("tags", Relation::many_to_many("Tag")),
                ],
                vec![ModelConstraint::index(["authorId", "title"])],
            )
            .with_table_name("books"),
        )
        .unwrap();
    schema
        .define_model(
            "Tag",
            vec![
                Field::scalar("id", ScalarType::Uuid)
                    .id()
                    .default(DefaultValue::GeneratedUuid),
                Field::scalar("label", ScalarType::Text),
                Field::relation("books", Relation::many_to_many("Book")),
            ],
            vec![],
        )
        .unwrap();
    schema
}

// ============================================================================
// define_model
// ============================================================================

#[test]
fn test_define_model_registers_in_order() {
    let schema = library_schema();
    let names: Vec<&str> = schema.models().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["Author", "Book", "Tag"]);
    assert_eq!(schema.model("Book").unwrap().physical_name(), "books");
}

#[test]
fn test_duplicate_model() {
    let mut schema = Schema::new();
    schema.define_model("Book", book_fields(), vec![]).unwrap();
    let err = schema
        .define_model("Book", book_fields(), vec![])
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::DuplicateModel {
            name: "Book".into()
        }
    );
}

#[test]
fn test_duplicate_field() {
    let mut fields = book_fields();
    fields.push(Field::scalar("title", ScalarType::Text));
    let err = Schema::new()
        .define_model("Book", fields, vec![])
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateField { field, .. } if field == "title"));
}

#[test]
fn test_two_id_fields_without_composite() {
    let fields = vec![
        Field::scalar("a", ScalarType::Int).id(),
        Field::scalar("b", ScalarType::Int).id(),
    ];
    let err = Schema::new().define_model("Pair", fields, vec![]).unwrap_err();
    assert!(matches!(err, SchemaError::InvalidAttributeCombination { .. }));
}

#[test]
fn test_id_and_composite_id_conflict() {
    let fields = vec![
        Field::scalar("a", ScalarType::Int).id(),
        Field::scalar("b", ScalarType::Int),
    ];
    let err = Schema::new()
        .define_model("Pair", fields, vec![ModelConstraint::id(["a", "b"])])
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidAttributeCombination { .. }));
}

#[test]
fn test_model_without_primary_key() {
    let fields = vec![Field::scalar("a", ScalarType::Int)];
    let err = Schema::new().define_model("Loose", fields, vec![]).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::InvalidAttributeCombination { reason, .. } if reason.contains("no primary key")
    ));
}

#[test]
fn test_conflicting_field_attributes() {
    let cases = [
        Field::scalar("t", ScalarType::Timestamp)
            .default(DefaultValue::Now)
            .updated_at(),
        Field::scalar("t", ScalarType::Text).unique().unique(),
        Field::scalar("t", ScalarType::Int).id().nullable(),
    ];
    for field in cases {
        let mut fields = vec![Field::scalar("id", ScalarType::Int).id()];
        if field.is_id() {
            fields = vec![field];
        } else {
            fields.push(field);
        }
        let err = Schema::new().define_model("M", fields, vec![]).unwrap_err();
        assert!(
            matches!(err, SchemaError::InvalidAttributeCombination { .. }),
            "unexpected {err:?}"
        );
    }
}

#[test]
fn test_attribute_on_relation_field() {
    let mut schema = Schema::new();
    let err = schema
        .define_model(
            "M",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::relation("other", Relation::one_to_many("Other")).unique(),
            ],
            vec![],
        )
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidAttributeCombination { .. }));
}

// ============================================================================
// resolve
// ============================================================================

#[test]
fn test_resolve_book_table() {
    let mut schema = Schema::new();
    schema.define_model("Book", book_fields(), vec![]).unwrap();
    let physical = schema.resolve().unwrap();

    let table = physical.table("Book").unwrap();
    assert_eq!(table.name, "Book");
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "title", "published_year", "pages"]);
    assert_eq!(table.primary_key.name, "Book_pkey");
    assert_eq!(table.primary_key.columns, ["id"]);
    assert_eq!(
        table.column("id").unwrap().default,
        Some(DefaultValue::Autoincrement)
    );
    assert_eq!(
        table.column_for_field("publishedYear").unwrap().name,
        "published_year"
    );
}

#[test]
fn test_resolve_relations_and_join_table() {
    let physical = library_schema().resolve().unwrap();

    let keys: Vec<&str> = physical.tables.keys().map(String::as_str).collect();
    assert_eq!(keys, ["Author", "Book", "Tag", "_BookToTag"]);

    let author = physical.table("Author").unwrap();
    assert_eq!(author.uniques[0].name, "uq_Author_email");

    let book = physical.table("Book").unwrap();
    assert_eq!(book.name, "books");
    assert_eq!(book.indexes[0].name, "idx_books_author_id_title");
    assert_eq!(book.indexes[0].columns, ["author_id", "title"]);
    assert_eq!(
        book.foreign_keys,
        vec![ForeignKey {
            name: "books_author_id_fkey".into(),
            columns: vec!["author_id".into()],
            references_table: "Author".into(),
            references_columns: vec!["id".into()],
            on_delete: ReferentialAction::Cascade,
        }]
    );
    assert!(book.column("updatedAt").unwrap().updated_at);

    let join = physical.table("_BookToTag").unwrap();
    assert_eq!(join.primary_key.columns, ["A", "B"]);
    assert_eq!(join.column("A").unwrap().ty, ScalarType::BigInt);
    assert_eq!(join.column("B").unwrap().ty, ScalarType::Uuid);
    assert_eq!(join.foreign_keys[0].references_table, "books");
    assert_eq!(join.foreign_keys[1].references_table, "Tag");
}

/// `Post` and `User` linked twice, once per relation name.
fn bookmarks_schema(likes: Option<&str>, saves: Option<&str>) -> Schema {
    let link = |target: &str, name: Option<&str>| {
        let relation = Relation::many_to_many(target);
        match name {
            Some(name) => relation.named(name),
            None => relation,
        }
    };
    let mut schema = Schema::new();
    schema
        .define_model(
            "Post",
            vec![
                Field::scalar("id", ScalarType::BigInt).id(),
                Field::relation("likedBy", link("User", likes)),
                Field::relation("savedBy", link("User", saves)),
            ],
            vec![],
        )
        .unwrap();
    schema
        .define_model(
            "User",
            vec![
                Field::scalar("id", ScalarType::BigInt).id(),
                Field::relation("liked", link("Post", likes)),
                Field::relation("saved", link("Post", saves)),
            ],
            vec![],
        )
        .unwrap();
    schema
}

#[test]
fn test_named_relations_get_their_own_join_tables() {
    let physical = bookmarks_schema(Some("Likes"), Some("Saves"))
        .resolve()
        .unwrap();
    let keys: Vec<&str> = physical.tables.keys().map(String::as_str).collect();
    assert_eq!(keys, ["Post", "User", "_Likes", "_Saves"]);

    let likes = physical.table("_Likes").unwrap();
    assert_eq!(likes.primary_key.name, "_Likes_pkey");
    assert_eq!(likes.foreign_keys[0].references_table, "Post");
    assert_eq!(likes.foreign_keys[1].references_table, "User");
}

#[test]
fn test_join_table_claimed_twice() {
    assert_eq!(
        bookmarks_schema(None, None).resolve(),
        Err(SchemaError::DuplicateModel {
            name: "_PostToUser".into()
        })
    );
    assert_eq!(
        bookmarks_schema(Some("Likes"), Some("Likes")).resolve(),
        Err(SchemaError::DuplicateModel {
            name: "_Likes".into()
        })
    );
}

#[test]
fn test_resolve_is_deterministic() {
    let a = library_schema().resolve().unwrap();
    let b = library_schema().resolve().unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn test_autoincrement_needs_integer() {
    let mut schema = Schema::new();
    schema
        .define_model(
            "M",
            vec![
                Field::scalar("id", ScalarType::Text)
                    .id()
                    .default(DefaultValue::Autoincrement),
            ],
            vec![],
        )
        .unwrap();
    let err = schema.resolve().unwrap_err();
    assert!(matches!(err, SchemaError::TypeMismatch { field, .. } if field == "id"));
}

#[test]
fn test_updated_at_needs_timestamp() {
    let mut schema = Schema::new();
    schema
        .define_model(
            "M",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::scalar("touched", ScalarType::Int).updated_at(),
            ],
            vec![],
        )
        .unwrap();
    assert!(matches!(
        schema.resolve().unwrap_err(),
        SchemaError::TypeMismatch { field, .. } if field == "touched"
    ));
}

#[test]
fn test_literal_default_is_coerced() {
    let mut schema = Schema::new();
    schema
        .define_model(
            "M",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::scalar("score", ScalarType::BigInt)
                    .default(DefaultValue::Literal(Value::Int(7))),
            ],
            vec![],
        )
        .unwrap();
    let physical = schema.resolve().unwrap();
    assert_eq!(
        physical.table("M").unwrap().column("score").unwrap().default,
        Some(DefaultValue::Literal(Value::BigInt(7)))
    );
}

#[test]
fn test_composite_constraint_unknown_field() {
    let mut schema = Schema::new();
    schema
        .define_model(
            "M",
            vec![
                Field::scalar("a", ScalarType::Int),
                Field::scalar("b", ScalarType::Int),
            ],
            vec![
                ModelConstraint::id(["a", "b"]),
                ModelConstraint::unique(["a", "missing"]),
            ],
        )
        .unwrap();
    assert_eq!(
        schema.resolve().unwrap_err(),
        SchemaError::UnknownField {
            model: "M".into(),
            field: "missing".into()
        }
    );
}

#[test]
fn test_relation_to_unknown_model() {
    let mut schema = Schema::new();
    schema
        .define_model(
            "Book",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::scalar("authorId", ScalarType::Int),
                Field::relation(
                    "author",
                    Relation::one_to_many("Author")
                        .fields(["authorId"])
                        .references(["id"]),
                ),
            ],
            vec![],
        )
        .unwrap();
    assert!(matches!(
        schema.resolve().unwrap_err(),
        SchemaError::UnknownModel { target, .. } if target == "Author"
    ));
}

#[test]
fn test_relation_must_reference_key() {
    let mut schema = Schema::new();
    schema
        .define_model(
            "Author",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::scalar("name", ScalarType::Text),
            ],
            vec![],
        )
        .unwrap();
    schema
        .define_model(
            "Book",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::scalar("authorName", ScalarType::Text),
                Field::relation(
                    "author",
                    Relation::one_to_many("Author")
                        .fields(["authorName"])
                        .references(["name"]),
                ),
            ],
            vec![],
        )
        .unwrap();
    assert!(matches!(
        schema.resolve().unwrap_err(),
        SchemaError::InvalidAttributeCombination { .. }
    ));
}

#[test]
fn test_relation_type_mismatch() {
    let mut schema = Schema::new();
    schema
        .define_model("Author", vec![Field::scalar("id", ScalarType::Int).id()], vec![])
        .unwrap();
    schema
        .define_model(
            "Book",
            vec![
                Field::scalar("id", ScalarType::Int).id(),
                Field::scalar("authorId", ScalarType::Text),
                Field::relation(
                    "author",
                    Relation::one_to_many("Author")
                        .fields(["authorId"])
                        .references(["id"]),
                ),
            ],
            vec![],
        )
        .unwrap();
    assert!(matches!(
        schema.resolve().unwrap_err(),
        SchemaError::TypeMismatch { field, .. } if field == "authorId"
    ));
}

#[test]
fn test_one_to_one_needs_unique_fields() {
    let build = |unique: bool| {
        let mut schema = Schema::new();
        schema
            .define_model("User", vec![Field::scalar("id", ScalarType::Int).id()], vec![])
            .unwrap();
        let mut user_id = Field::scalar("userId", ScalarType::Int);
        if unique {
            user_id = user_id.unique();
        }
        schema
            .define_model(
                "Profile",
                vec![
                    Field::scalar("id", ScalarType::Int).id(),
                    user_id,
                    Field::relation(
                        "user",
                        Relation::one_to_one("User")
                            .fields(["userId"])
                            .references(["id"]),
                    ),
                ],
                vec![],
            )
            .unwrap();
        schema.resolve()
    };

    assert!(build(true).is_ok());
    assert!(matches!(
        build(false).unwrap_err(),
        SchemaError::InvalidAttributeCombination { .. }
    ));
}

#[test]
fn test_two_models_on_one_table() {
    let mut schema = Schema::new();
    schema
        .add_model(Model::new("A", vec![Field::scalar("id", ScalarType::Int).id()], vec![]).with_table_name("t"))
        .unwrap();
    schema
        .add_model(Model::new("B", vec![Field::scalar("id", ScalarType::Int).id()], vec![]).with_table_name("t"))
        .unwrap();
    assert_eq!(
        schema.resolve().unwrap_err(),
        SchemaError::DuplicateModel { name: "t".into() }
    );
}

#[test]
fn test_equivalent_ignores_order_and_field_names() {
    let physical = library_schema().resolve().unwrap();

    let mut shuffled = PhysicalSchema::new();
    for (key, table) in physical.tables.iter().rev() {
        let mut table = table.clone();
        for column in &mut table.columns {
            column.field = column.name.clone();
            column.updated_at = false;
        }
        table.foreign_keys.reverse();
        shuffled.tables.insert(format!("{key}_copy"), table);
    }
    assert!(physical.equivalent(&shuffled));

    shuffled.tables[0].columns[0].nullable = true;
    assert!(!physical.equivalent(&shuffled));
}

// ============================================================================
// values
// ============================================================================

#[test]
fn test_coerce_widening_and_narrowing() {
    assert_eq!(Value::Int(5).coerce_to(ScalarType::BigInt), Ok(Value::BigInt(5)));
    assert_eq!(Value::BigInt(5).coerce_to(ScalarType::Int), Ok(Value::Int(5)));
    assert!(Value::BigInt(i64::MAX).coerce_to(ScalarType::Int).is_err());
    assert!(Value::Int(5).coerce_to(ScalarType::Text).is_err());
    assert_eq!(Value::Null.coerce_to(ScalarType::Uuid), Ok(Value::Null));
}

#[test]
fn test_coerce_text_forms() {
    let ts = Value::from("2024-03-01T12:00:00Z")
        .coerce_to(ScalarType::Timestamp)
        .unwrap();
    assert!(matches!(ts, Value::Timestamp(_)));

    let id = Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
        .coerce_to(ScalarType::Uuid)
        .unwrap();
    assert!(matches!(id, Value::Uuid(_)));

    assert!(Value::from("not a date").coerce_to(ScalarType::Timestamp).is_err());
}

#[test]
fn test_coerce_float_to_decimal_keeps_written_digits() {
    use rust_decimal::Decimal;

    let exact: Decimal = "9.99".parse().unwrap();
    assert_eq!(
        Value::Float(9.99).coerce_to(ScalarType::Decimal),
        Ok(Value::Decimal(exact))
    );
    assert_eq!(
        Value::from("9.99").coerce_to(ScalarType::Decimal),
        Ok(Value::Decimal(exact))
    );
    assert_eq!(
        Value::Float(0.1).coerce_to(ScalarType::Decimal),
        Ok(Value::Decimal("0.1".parse().unwrap()))
    );
    assert!(Value::Float(f64::NAN).coerce_to(ScalarType::Decimal).is_err());
    assert!(Value::Float(f64::INFINITY).coerce_to(ScalarType::Decimal).is_err());
}

#[test]
fn test_value_from_json() {
    assert_eq!(Value::from_json(serde_json::json!(2000)), Value::Int(2000));
    assert_eq!(
        Value::from_json(serde_json::json!(5_000_000_000_i64)),
        Value::BigInt(5_000_000_000)
    );
    assert_eq!(Value::from_json(serde_json::json!("x")), Value::Text("x".into()));
    assert!(matches!(
        Value::from_json(serde_json::json!({"a": 1})),
        Value::Json(_)
    ));
}

proptest! {
    #[test]
    fn prop_integer_compare_matches_across_widths(a in any::<i32>(), b in any::<i64>()) {
        let expected = i64::from(a).cmp(&b);
        prop_assert_eq!(Value::Int(a).compare(&Value::BigInt(b)), Some(expected));
        prop_assert_eq!(Value::BigInt(b).compare(&Value::Int(a)), Some(expected.reverse()));
    }

    #[test]
    fn prop_null_never_compares(b in any::<i64>()) {
        prop_assert_eq!(Value::Null.compare(&Value::BigInt(b)), None);
    }
}

#[test]
fn test_compare_unrelated_types() {
    assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    assert_eq!(
        Value::Float(1.5).compare(&Value::Int(1)),
        Some(Ordering::Greater)
    );
}
