use crate::*;

#[test]
fn test_select_with_filter_order_and_limit() {
    let stmt = SelectStmt::new()
        .columns([
            SelectColumn::expr(Expr::column("id".into())),
            SelectColumn::expr(Expr::column("title".into())),
        ])
        .from(FromClause::table("book".into()))
        .where_(
            Expr::column("published".into())
                .eq(Expr::param("p1".into()))
                .and(Expr::column("id".into()).compare(BinOp::Gt, Expr::param("p2".into()))),
        )
        .order_by(OrderBy::asc(Expr::column("id".into())))
        .limit(Expr::int(100));

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT "id", "title"
    FROM "book"
    WHERE "published" = $1 AND "id" > $2
    ORDER BY "id" ASC
    LIMIT 100
    "#);
    assert_eq!(result.params, vec!["p1".to_string(), "p2".to_string()]);
}

#[test]
fn test_param_reuse_shares_placeholder() {
    let stmt = SelectStmt::new()
        .from(FromClause::table("user".into()))
        .where_(
            Expr::column("email".into())
                .eq(Expr::param("q".into()))
                .or(Expr::column("name".into()).eq(Expr::param("q".into()))),
        );

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT *
    FROM "user"
    WHERE "email" = $1 OR "name" = $1
    "#);
    assert_eq!(result.params, vec!["q".to_string()]);
}

#[test]
fn test_mixed_logical_operators_are_parenthesized() {
    let a = Expr::column("a".into()).eq(Expr::int(1));
    let b = Expr::column("b".into()).eq(Expr::int(2));
    let c = Expr::column("c".into()).eq(Expr::int(3));

    let stmt = SelectStmt::new()
        .from(FromClause::table("t".into()))
        .where_(a.or(b).and(c));

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT *
    FROM "t"
    WHERE ("a" = 1 OR "b" = 2) AND "c" = 3
    "#);
}

#[test]
fn test_nested_or_on_the_right() {
    let a = Expr::column("a".into()).eq(Expr::int(1));
    let b = Expr::column("b".into()).eq(Expr::int(2));
    let c = Expr::column("c".into()).eq(Expr::int(3));

    let stmt = SelectStmt::new()
        .from(FromClause::table("t".into()))
        .where_(a.and(b.or(c)).not());

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT *
    FROM "t"
    WHERE NOT ("a" = 1 AND ("b" = 2 OR "c" = 3))
    "#);
}

#[test]
fn test_empty_all_and_any() {
    assert_eq!(Expr::all([]), Expr::Bool(true));
    assert_eq!(Expr::any([]), Expr::Bool(false));
}

#[test]
fn test_like_uses_backslash_escape() {
    let stmt = SelectStmt::new()
        .from(FromClause::table("book".into()))
        .where_(Expr::column("title".into()).like(Expr::param("p1".into())));

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT *
    FROM "book"
    WHERE "title" LIKE $1 ESCAPE '\'
    "#);
}

#[test]
fn test_is_null_and_string_literal() {
    let stmt = SelectStmt::new()
        .from(FromClause::table("book".into()))
        .where_(
            Expr::column("isbn".into())
                .is_null()
                .and(Expr::column("title".into()).ne(Expr::string("it's"))),
        );

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT *
    FROM "book"
    WHERE "isbn" IS NULL AND "title" <> 'it''s'
    "#);
}

#[test]
fn test_select_for_update_with_alias() {
    let stmt = SelectStmt::new()
        .columns([SelectColumn::aliased(
            Expr::FnCall {
                name: "COUNT".into(),
                args: vec![Expr::Raw("*".into())],
            },
            "total".into(),
        )])
        .from(FromClause::table("book".into()))
        .for_update();

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    SELECT COUNT(*) AS "total"
    FROM "book"
    FOR UPDATE
    "#);
}

#[test]
fn test_insert_multiple_rows_returning_all() {
    let stmt = InsertStmt::new("book".into())
        .columns(["title".to_string(), "author_id".to_string()])
        .row(vec![Expr::param("p1".into()), Expr::param("p2".into())])
        .row(vec![Expr::param("p3".into()), Expr::Null])
        .returning(Returning::All);

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    INSERT INTO "book" ("title", "author_id")
    VALUES ($1, $2), ($3, NULL)
    RETURNING *
    "#);
    assert_eq!(result.params.len(), 3);
}

#[test]
fn test_insert_default_values() {
    let stmt = InsertStmt::new("counter".into()).returning(Returning::All);

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    INSERT INTO "counter"
    DEFAULT VALUES
    RETURNING *
    "#);
}

#[test]
fn test_update_returning() {
    let stmt = UpdateStmt::new("book".into())
        .set("title".into(), Expr::param("p1".into()))
        .set("updated_at".into(), Expr::Now)
        .where_(Expr::column("id".into()).eq(Expr::param("p2".into())))
        .returning(Returning::All);

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    UPDATE "book"
    SET "title" = $1, "updated_at" = NOW()
    WHERE "id" = $2
    RETURNING *
    "#);
}

#[test]
fn test_delete_without_returning() {
    let stmt = DeleteStmt::new("book")
        .where_(Expr::column("id".into()).eq(Expr::param("p1".into())));

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    DELETE FROM "book"
    WHERE "id" = $1
    "#);
}

#[test]
fn test_create_table() {
    let stmt = CreateTableStmt {
        table: "book".into(),
        columns: vec![
            ColumnDef::new("id", "BIGINT").not_null().identity(),
            ColumnDef::new("title", "TEXT").not_null(),
            ColumnDef::new("published", "BOOLEAN")
                .not_null()
                .default(Expr::Bool(false)),
            ColumnDef::new("created_at", "TIMESTAMPTZ")
                .not_null()
                .default(Expr::Now),
        ],
        constraints: vec![TableConstraint::PrimaryKey {
            name: primary_key_name("book"),
            columns: vec!["id".into()],
        }],
    };

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"
    CREATE TABLE "book" (
        "id" BIGINT GENERATED BY DEFAULT AS IDENTITY NOT NULL,
        "title" TEXT NOT NULL,
        "published" BOOLEAN NOT NULL DEFAULT FALSE,
        "created_at" TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT "book_pkey" PRIMARY KEY ("id")
    )
    "#);
}

#[test]
fn test_alter_table_actions() {
    let cases = [
        (
            AlterAction::AddColumn(ColumnDef::new("isbn", "TEXT")),
            r#"ALTER TABLE "book" ADD COLUMN "isbn" TEXT"#,
        ),
        (
            AlterAction::DropColumn("isbn".into()),
            r#"ALTER TABLE "book" DROP COLUMN "isbn""#,
        ),
        (
            AlterAction::AlterColumnType {
                column: "pages".into(),
                sql_type: "BIGINT".into(),
            },
            r#"ALTER TABLE "book" ALTER COLUMN "pages" TYPE BIGINT USING "pages"::BIGINT"#,
        ),
        (
            AlterAction::SetNotNull("title".into()),
            r#"ALTER TABLE "book" ALTER COLUMN "title" SET NOT NULL"#,
        ),
        (
            AlterAction::DropDefault("title".into()),
            r#"ALTER TABLE "book" ALTER COLUMN "title" DROP DEFAULT"#,
        ),
        (
            AlterAction::DropConstraint("uq_book_isbn".into()),
            r#"ALTER TABLE "book" DROP CONSTRAINT "uq_book_isbn""#,
        ),
    ];

    for (action, expected) in cases {
        let result = render(&AlterTableStmt::new("book", action));
        assert_eq!(result.sql, expected);
        assert!(result.params.is_empty());
    }
}

#[test]
fn test_add_foreign_key_with_cascade() {
    let stmt = AlterTableStmt::new(
        "book",
        AlterAction::AddConstraint(TableConstraint::ForeignKey {
            name: foreign_key_name("book", &["author_id"]),
            columns: vec!["author_id".into()],
            references_table: "author".into(),
            references_columns: vec!["id".into()],
            on_delete: ForeignKeyAction::Cascade,
        }),
    );

    let result = render(&stmt);
    insta::assert_snapshot!(result.sql, @r#"ALTER TABLE "book" ADD CONSTRAINT "book_author_id_fkey" FOREIGN KEY ("author_id") REFERENCES "author" ("id") ON DELETE CASCADE"#);
}

#[test]
fn test_create_and_drop_index() {
    let create = CreateIndexStmt {
        name: index_name("book", &["author_id", "title"]),
        table: "book".into(),
        columns: vec!["author_id".into(), "title".into()],
        unique: false,
    };
    assert_eq!(
        render(&create).sql,
        r#"CREATE INDEX "idx_book_author_id_title" ON "book" ("author_id", "title")"#
    );

    let drop = DropIndexStmt {
        name: "idx_book_author_id_title".into(),
    };
    assert_eq!(render(&drop).sql, r#"DROP INDEX "idx_book_author_id_title""#);
}

#[test]
fn test_drop_table() {
    let stmt = Stmt::DropTable(DropTableStmt {
        table: "book".into(),
        if_exists: false,
    });
    assert_eq!(render(&stmt).sql, r#"DROP TABLE "book""#);
}
