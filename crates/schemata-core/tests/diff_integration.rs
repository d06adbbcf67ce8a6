//! Integration tests for the schema diff engine.
//!
//! These tests build snapshots by hand or from declaration documents,
//! diff them, and check the exact MySQL statements produced.

use schemata_core::{
    diff, diff_sql, ColumnDescriptor, Declarations, FkAction, ForeignKeyRef, Operation,
    SchemaError, SchemaSnapshot, TableSnapshot,
};

// =============================================================================
// Fixtures
// =============================================================================

fn users() -> TableSnapshot {
    TableSnapshot::new()
        .column(
            "id",
            ColumnDescriptor::new("INT(11)")
                .primary()
                .unsigned()
                .auto_increment(),
        )
        .column("email", ColumnDescriptor::new("VARCHAR(255)").not_null().unique())
}

fn orders_referencing(table: &str) -> TableSnapshot {
    TableSnapshot::new()
        .column("id", ColumnDescriptor::new("INT(11)").primary())
        .column(
            "user_id",
            ColumnDescriptor::new("INT(11)")
                .unsigned()
                .references(ForeignKeyRef::new(table, "id")),
        )
}

fn shop_v1() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .table("users", users())
        .table("orders", orders_referencing("users"))
}

// =============================================================================
// Creation
// =============================================================================

#[test]
fn initial_diff_creates_every_table_in_dependency_order() {
    let sql = diff_sql(None, &shop_v1()).unwrap();

    assert_eq!(
        sql,
        vec![
            "CREATE TABLE `users` (`id` INT(11) UNSIGNED NOT NULL AUTO_INCREMENT, \
             `email` VARCHAR(255) NOT NULL, PRIMARY KEY (`id`), \
             UNIQUE INDEX `email_UNIQUE` (`email` ASC) VISIBLE)",
            "CREATE TABLE `orders` (`id` INT(11) NOT NULL, `user_id` INT(11) UNSIGNED NULL, \
             PRIMARY KEY (`id`), INDEX `fk_orders_user_id_idx` (`user_id` ASC) VISIBLE, \
             CONSTRAINT `fk_orders_user_id` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) \
             ON DELETE CASCADE ON UPDATE CASCADE)",
        ]
    );
}

#[test]
fn self_reference_does_not_block_creation() {
    let schema = SchemaSnapshot::new().table(
        "categories",
        TableSnapshot::new()
            .column("id", ColumnDescriptor::new("INT(11)").primary())
            .column(
                "parent_id",
                ColumnDescriptor::new("INT(11)")
                    .references(ForeignKeyRef::new("categories", "id").on_delete(FkAction::SetNull)),
            ),
    );

    let sql = diff_sql(None, &schema).unwrap();
    assert_eq!(sql.len(), 1);
    assert!(sql[0].contains("REFERENCES `categories` (`id`) ON DELETE SET NULL ON UPDATE CASCADE"));
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn identical_snapshots_produce_no_statements() {
    let schema = shop_v1();
    assert!(diff(Some(&schema), &schema).unwrap().is_empty());
}

#[test]
fn diff_survives_snapshot_persistence() {
    let schema = shop_v1();
    let restored = SchemaSnapshot::from_json(&schema.to_json().unwrap()).unwrap();
    assert_eq!(restored, schema);
    assert!(diff(Some(&restored), &schema).unwrap().is_empty());
}

#[test]
fn diff_is_deterministic() {
    let old = shop_v1();
    let new = SchemaSnapshot::new()
        .table("accounts", users())
        .table("orders", orders_referencing("accounts"))
        .table("zones", TableSnapshot::new().column("code", ColumnDescriptor::new("CHAR(2)")));

    let first = diff_sql(Some(&old), &new).unwrap();
    for _ in 0..5 {
        assert_eq!(diff_sql(Some(&old), &new).unwrap(), first);
    }
}

#[test]
fn adding_a_table_only_creates_it() {
    let old = shop_v1();
    let new = shop_v1().table(
        "audit",
        TableSnapshot::new().column("line", ColumnDescriptor::new("LONGTEXT")),
    );

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec!["CREATE TABLE `audit` (`line` LONGTEXT NULL)"]
    );
}

#[test]
fn reverse_diff_undoes_column_changes() {
    let old = shop_v1();
    let new = SchemaSnapshot::new()
        .table(
            "users",
            users().column("nickname", ColumnDescriptor::new("VARCHAR(40)")),
        )
        .table("orders", orders_referencing("users"));

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec!["ALTER TABLE `users` ADD COLUMN `nickname` VARCHAR(40) NULL"]
    );
    assert_eq!(
        diff_sql(Some(&new), &old).unwrap(),
        vec!["ALTER TABLE `users` DROP COLUMN `nickname`"]
    );
}

// =============================================================================
// Column changes
// =============================================================================

#[test]
fn add_drop_and_modify_share_one_alter_statement() {
    let old = SchemaSnapshot::new().table(
        "T",
        TableSnapshot::new()
            .column("a", ColumnDescriptor::new("INT"))
            .column("b", ColumnDescriptor::new("VARCHAR(10)")),
    );
    let new = SchemaSnapshot::new().table(
        "T",
        TableSnapshot::new()
            .column("a", ColumnDescriptor::new("BIGINT"))
            .column("c", ColumnDescriptor::new("VARCHAR(10)")),
    );

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec![
            "ALTER TABLE `T` ADD COLUMN `c` VARCHAR(10) NULL, DROP COLUMN `b`, \
             MODIFY COLUMN `a` BIGINT NULL"
        ]
    );
}

#[test]
fn primary_key_change_redoes_the_key() {
    let old = SchemaSnapshot::new().table(
        "memberships",
        TableSnapshot::new().column("id", ColumnDescriptor::new("INT(11)").primary()),
    );
    let new = SchemaSnapshot::new().table(
        "memberships",
        TableSnapshot::new()
            .column("id", ColumnDescriptor::new("INT(11)").primary())
            .column("tenant", ColumnDescriptor::new("INT(11)").primary()),
    );

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec![
            "ALTER TABLE `memberships` ADD COLUMN `tenant` INT(11) NOT NULL, \
             DROP PRIMARY KEY, ADD PRIMARY KEY (`id`, `tenant`)"
        ]
    );
}

#[test]
fn dropping_the_only_primary_column_leaves_no_key() {
    let old = SchemaSnapshot::new().table(
        "t",
        TableSnapshot::new()
            .column("id", ColumnDescriptor::new("INT(11)").primary())
            .column("v", ColumnDescriptor::new("INT(11)")),
    );
    let new = SchemaSnapshot::new().table(
        "t",
        TableSnapshot::new().column("v", ColumnDescriptor::new("INT(11)")),
    );

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec!["ALTER TABLE `t` DROP COLUMN `id`, DROP PRIMARY KEY"]
    );
}

// =============================================================================
// Foreign keys
// =============================================================================

#[test]
fn retargeted_foreign_key_is_dropped_then_added() {
    let old = shop_v1();
    let new = shop_v1()
        .table(
            "accounts",
            TableSnapshot::new().column("id", ColumnDescriptor::new("INT(11)").primary()),
        )
        .table("orders", orders_referencing("accounts"));

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec![
            "ALTER TABLE `orders` DROP FOREIGN KEY `fk_orders_user_id`, \
             DROP INDEX `fk_orders_user_id_idx`",
            "CREATE TABLE `accounts` (`id` INT(11) NOT NULL, PRIMARY KEY (`id`))",
            "ALTER TABLE `orders` ADD INDEX `fk_orders_user_id_idx` (`user_id` ASC) VISIBLE, \
             ADD CONSTRAINT `fk_orders_user_id` FOREIGN KEY (`user_id`) \
             REFERENCES `accounts` (`id`) ON DELETE CASCADE ON UPDATE CASCADE",
        ]
    );
}

#[test]
fn changed_referential_action_is_dropped_then_added() {
    let old = shop_v1();
    let mut orders = orders_referencing("users");
    orders.insert(
        "user_id",
        ColumnDescriptor::new("INT(11)")
            .unsigned()
            .references(ForeignKeyRef::new("users", "id").on_delete(FkAction::Restrict)),
    );
    let new = SchemaSnapshot::new().table("users", users()).table("orders", orders);

    let ops = diff(Some(&old), &new).unwrap().operations;
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[0], Operation::DropForeignKeys(_)));
    assert!(matches!(ops[1], Operation::AddForeignKeys(_)));
}

#[test]
fn referenced_table_is_dropped_after_its_constraints() {
    let old = shop_v1();
    let new = SchemaSnapshot::new().table(
        "orders",
        TableSnapshot::new()
            .column("id", ColumnDescriptor::new("INT(11)").primary())
            .column("user_id", ColumnDescriptor::new("INT(11)").unsigned()),
    );

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec![
            "ALTER TABLE `orders` DROP FOREIGN KEY `fk_orders_user_id`, \
             DROP INDEX `fk_orders_user_id_idx`",
            "DROP TABLE `users`",
        ]
    );
}

#[test]
fn removed_tables_drop_referencing_tables_first() {
    let old = shop_v1();
    let new = SchemaSnapshot::new();

    assert_eq!(
        diff_sql(Some(&old), &new).unwrap(),
        vec!["DROP TABLE `orders`", "DROP TABLE `users`"]
    );
}

#[test]
fn long_names_are_truncated_consistently() {
    let table = "customer_shipping_addresses_history";
    let column = "previous_billing_country_reference_id";
    let old = SchemaSnapshot::new()
        .table("countries", TableSnapshot::new().column("id", ColumnDescriptor::new("INT(11)").primary()))
        .table(
            table,
            TableSnapshot::new().column(
                column,
                ColumnDescriptor::new("INT(11)").references(ForeignKeyRef::new("countries", "id")),
            ),
        );
    let new = SchemaSnapshot::new()
        .table("countries", TableSnapshot::new().column("id", ColumnDescriptor::new("INT(11)").primary()))
        .table(table, TableSnapshot::new().column(column, ColumnDescriptor::new("INT(11)")));

    let create = diff_sql(None, &old).unwrap();
    let drop = diff_sql(Some(&old), &new).unwrap();

    let name = schemata_core::foreign_key_name(table, column);
    assert!(schemata_core::foreign_key_index_name(table, column).len() <= 64);
    assert!(create[1].contains(&format!("CONSTRAINT `{name}`")));
    assert!(drop[0].contains(&format!("DROP FOREIGN KEY `{name}`")));
}

#[test]
fn dangling_reference_is_an_integrity_error() {
    let schema = SchemaSnapshot::new().table("orders", orders_referencing("users"));

    let err = diff(None, &schema).unwrap_err();
    assert!(matches!(err, SchemaError::SchemaIntegrity(_)));

    let err = diff(Some(&shop_v1()), &schema).unwrap_err();
    assert!(matches!(err, SchemaError::SchemaIntegrity(_)));
}

// =============================================================================
// Declarations
// =============================================================================

#[test]
fn declarations_capture_and_diff() {
    let declarations = Declarations::from_json(
        r#"{
            "entities": [
                {
                    "name": "Customer",
                    "table": "customers",
                    "properties": [
                        { "name": "id", "type": "number", "length": "10", "primary": true,
                          "unsigned": true, "autoIncrement": true },
                        { "name": "email", "type": "string", "length": "120", "required": true,
                          "unique": true }
                    ]
                },
                {
                    "name": "Invoice",
                    "table": "invoices",
                    "properties": [
                        { "name": "id", "type": "guid", "primary": true },
                        { "name": "total", "type": "number", "length": "10.2" },
                        { "name": "customer", "column": "customer_id", "type": "number",
                          "length": "10", "unsigned": true,
                          "foreignKey": { "entity": "Customer", "property": "id",
                                          "onDelete": "Restrict" } }
                    ]
                }
            ]
        }"#,
    )
    .unwrap();

    let schema = declarations.capture().unwrap();
    let sql = diff_sql(None, &schema).unwrap();

    assert_eq!(sql.len(), 2);
    assert!(sql[0].starts_with("CREATE TABLE `customers`"));
    assert!(sql[0].contains("`email` VARCHAR(120) NOT NULL"));
    assert!(sql[1].starts_with("CREATE TABLE `invoices`"));
    assert!(sql[1].contains("`id` VARCHAR(36) NOT NULL"));
    assert!(sql[1].contains("`total` DECIMAL(10, 2) NULL"));
    assert!(sql[1].contains(
        "REFERENCES `customers` (`id`) ON DELETE RESTRICT ON UPDATE CASCADE"
    ));
}
