//! Integration tests for full reconciliation runs.
//!
//! These tests load the store schema document, seed a `MemoryCatalog` with
//! drifted live tables, run the reconciler and check both the report and the
//! DDL journal.

use oxide_reconcile::prelude::*;

const STORE_SCHEMA: &str = include_str!("../../../demos/store_schema.json");

fn store() -> SchemaRegistry {
    SchemaRegistry::from_json(STORE_SCHEMA).unwrap()
}

/// Returns the declared shape of `table`, for seeding drifted live copies.
fn declared(table: &str) -> TableShape {
    store().build(table).unwrap()
}

fn column_mut<'a>(shape: &'a mut TableShape, name: &str) -> &'a mut ColumnSpec {
    shape.columns.iter_mut().find(|c| c.name == name).unwrap()
}

fn ddl_for(journal: &[String], table: &str) -> Vec<String> {
    let prefix = format!("ALTER TABLE `{table}`");
    journal
        .iter()
        .filter(|sql| sql.starts_with(&prefix))
        .cloned()
        .collect()
}

// =============================================================================
// Creation and convergence
// =============================================================================

#[tokio::test]
async fn test_fresh_database_creates_every_table_in_order() {
    let reconciler = Reconciler::new(MemoryCatalog::new(), store());
    let report = reconciler.reconcile().await.unwrap();

    let names: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(
        names,
        vec!["users", "products", "carts", "cart_items", "orders"]
    );
    assert!(report
        .tables
        .iter()
        .all(|t| t.outcome == TableOutcome::Created));

    let journal = reconciler.catalog().journal();
    assert_eq!(journal.len(), 5);
    assert!(journal[2].contains("KEY `carts_user_id_index` (`user_id`)"));
    assert!(journal[3].contains("PRIMARY KEY (`cart_id`, `product_id`)"));
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let reconciler = Reconciler::new(MemoryCatalog::new(), store());
    reconciler.reconcile().await.unwrap();
    reconciler.catalog().clear_journal();

    let report = reconciler.reconcile().await.unwrap();

    assert!(reconciler.catalog().journal().is_empty());
    assert!(report
        .tables
        .iter()
        .all(|t| t.outcome == TableOutcome::Unchanged));
}

// =============================================================================
// Drift on existing tables
// =============================================================================

#[tokio::test]
async fn test_integer_price_is_widened_to_float() {
    let mut products = declared("products");
    column_mut(&mut products, "price").logical_type = LogicalType::Integer;

    let reconciler = Reconciler::new(MemoryCatalog::new().with_table(products), store());
    let report = reconciler.reconcile().await.unwrap();

    assert!(matches!(
        report.outcome("products"),
        Some(TableOutcome::Applied { steps }) if steps.len() == 1
    ));
    let journal = reconciler.catalog().journal();
    assert_eq!(
        ddl_for(&journal, "products"),
        vec!["ALTER TABLE `products` MODIFY COLUMN `price` DOUBLE NOT NULL DEFAULT 0".to_string()]
    );

    let live = reconciler.catalog().table("products").unwrap();
    assert_eq!(live.get_column("price").unwrap().logical_type, LogicalType::Float);
}

#[tokio::test]
async fn test_extra_live_column_skips_the_whole_table() {
    let mut users = declared("users");
    users.columns.retain(|c| c.name != "display_name");
    users
        .columns
        .push(ColumnSpec::new("legacy_field", LogicalType::String(20)));

    let reconciler = Reconciler::new(MemoryCatalog::new().with_table(users), store());
    let report = reconciler.reconcile().await.unwrap();

    assert_eq!(
        report.outcome("users"),
        Some(&TableOutcome::Skipped {
            destructive: vec!["drop column legacy_field".to_string()],
        })
    );
    assert!(!report.has_failures());

    // The safe addition of display_name is held back too.
    let journal = reconciler.catalog().journal();
    assert!(ddl_for(&journal, "users").is_empty());
    let live = reconciler.catalog().table("users").unwrap();
    assert!(live.get_column("display_name").is_none());
    assert!(live.get_column("legacy_field").is_some());

    // Tables depending on users are still created.
    assert_eq!(report.outcome("orders"), Some(&TableOutcome::Created));
}

#[tokio::test]
async fn test_relaxing_nullability_is_applied() {
    let mut users = declared("users");
    column_mut(&mut users, "display_name").nullable = false;

    let reconciler = Reconciler::new(MemoryCatalog::new().with_table(users), store());
    let report = reconciler.reconcile().await.unwrap();

    assert_eq!(
        report.outcome("users"),
        Some(&TableOutcome::Applied {
            steps: vec!["alter column display_name (nullable false -> true)".to_string()],
        })
    );
    let journal = reconciler.catalog().journal();
    assert_eq!(
        ddl_for(&journal, "users"),
        vec!["ALTER TABLE `users` MODIFY COLUMN `display_name` VARCHAR(100) NULL".to_string()]
    );
}

#[tokio::test]
async fn test_tightening_nullability_is_skipped() {
    let mut orders = declared("orders");
    column_mut(&mut orders, "total").nullable = true;
    let seeded = MemoryCatalog::new()
        .with_table(declared("users"))
        .with_table(orders);

    let reconciler = Reconciler::new(seeded, store());
    let report = reconciler.reconcile().await.unwrap();

    assert_eq!(
        report.outcome("orders"),
        Some(&TableOutcome::Skipped {
            destructive: vec!["alter column total: nullable true -> false".to_string()],
        })
    );
}

#[tokio::test]
async fn test_new_unique_key_follows_column_changes() {
    let mut orders = declared("orders");
    column_mut(&mut orders, "number").logical_type = LogicalType::String(16);
    orders.constraints.retain(|c| {
        !matches!(c, ConstraintSpec::UniqueKey(u) if u.name == "orders_number_unique")
    });
    let seeded = MemoryCatalog::new()
        .with_table(declared("users"))
        .with_table(orders);

    let reconciler = Reconciler::new(seeded, store());
    let report = reconciler.reconcile().await.unwrap();

    let journal = reconciler.catalog().journal();
    assert_eq!(
        ddl_for(&journal, "orders"),
        vec![
            "ALTER TABLE `orders` MODIFY COLUMN `number` VARCHAR(32) NOT NULL".to_string(),
            "ALTER TABLE `orders` ADD CONSTRAINT `orders_number_unique` UNIQUE (`number`)"
                .to_string(),
        ]
    );
    assert!(matches!(
        report.outcome("orders"),
        Some(TableOutcome::Applied { steps }) if steps.len() == 2
    ));
}

#[tokio::test]
async fn test_renamed_foreign_key_is_left_alone() {
    let mut orders = declared("orders");
    for constraint in &mut orders.constraints {
        if let ConstraintSpec::ForeignKey(fk) = constraint {
            fk.name = "orders_ibfk_1".to_string();
        }
    }
    let seeded = MemoryCatalog::new()
        .with_table(declared("users"))
        .with_table(orders);

    let reconciler = Reconciler::new(seeded, store());
    let report = reconciler.reconcile().await.unwrap();

    assert_eq!(report.outcome("orders"), Some(&TableOutcome::Unchanged));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_step_keeps_earlier_steps() {
    let mut products = declared("products");
    products.columns.retain(|c| c.name != "attributes");
    column_mut(&mut products, "price").logical_type = LogicalType::Integer;

    let catalog = MemoryCatalog::new()
        .with_table(products)
        .fail_on("MODIFY COLUMN `price`");
    let reconciler = Reconciler::new(catalog, store());
    let report = reconciler.reconcile().await.unwrap();

    match report.outcome("products") {
        Some(TableOutcome::Failed { error, applied }) => {
            assert!(error.contains("MODIFY COLUMN `price`"));
            assert_eq!(applied.len(), 1);
            assert!(applied[0].starts_with("add column attributes"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let live = reconciler.catalog().table("products").unwrap();
    assert!(live.get_column("attributes").is_some());
    assert!(report.has_failures());

    // The run carried on with the remaining tables.
    assert_eq!(report.outcome("orders"), Some(&TableOutcome::Created));
}

#[tokio::test]
async fn test_failed_creation_is_reported_per_table() {
    let catalog = MemoryCatalog::new().fail_on("CREATE TABLE `carts`");
    let reconciler = Reconciler::new(catalog, store());
    let report = reconciler.reconcile().await.unwrap();

    assert!(matches!(
        report.outcome("carts"),
        Some(TableOutcome::Failed { .. })
    ));
    // cart_items references carts, which was never created.
    assert!(matches!(
        report.outcome("cart_items"),
        Some(TableOutcome::Failed { .. })
    ));
    assert_eq!(report.outcome("orders"), Some(&TableOutcome::Created));
    assert_eq!(report.failed(), 2);
}

#[tokio::test]
async fn test_unreadable_table_does_not_stop_the_run() {
    let catalog = MemoryCatalog::new().unreadable("products");
    let reconciler = Reconciler::new(catalog, store());
    let report = reconciler.reconcile().await.unwrap();

    assert!(matches!(
        report.outcome("products"),
        Some(TableOutcome::Failed { error, .. }) if error.contains("SELECT command denied")
    ));
    assert_eq!(report.outcome("users"), Some(&TableOutcome::Created));
}

// =============================================================================
// Dry run and report rendering
// =============================================================================

#[tokio::test]
async fn test_dry_run_plans_without_ddl() {
    let mut products = declared("products");
    column_mut(&mut products, "price").logical_type = LogicalType::Integer;

    let reconciler =
        Reconciler::new(MemoryCatalog::new().with_table(products), store()).dry_run(true);
    let report = reconciler.reconcile().await.unwrap();

    assert!(reconciler.catalog().journal().is_empty());
    assert!(matches!(
        report.outcome("products"),
        Some(TableOutcome::Applied { steps }) if steps.len() == 1
    ));
    let text = report.to_string();
    assert!(text.starts_with("Schema reconciliation (dry run, nothing executed)"));
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let reconciler = Reconciler::new(MemoryCatalog::new(), store());
    let report = reconciler.reconcile().await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["dry_run"], false);
    assert_eq!(json["tables"].as_array().unwrap().len(), 5);
    assert_eq!(json["tables"][0]["table"], "users");
    assert_eq!(json["tables"][0]["status"], "created");
}
