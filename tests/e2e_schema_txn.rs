//! End-to-end tests for schema visibility under MVCC: for every schema
//! operation, a reader begun before the commit observes the pre-operation
//! catalog, and the writer observes its own edit immediately.

use nogdb_rs::{ClassKind, Condition, Context, PropertyType, Record, TxnMode};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn open_db() -> (TempDir, Context) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::open(dir.path().join("graph.db")).unwrap();
    (dir, ctx)
}

fn seed(ctx: &Context) {
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_class("people", ClassKind::Vertex).unwrap();
    txn.add_property("people", "name", PropertyType::Text).unwrap();
    txn.add_vertex("people", Record::new().set("name", "ada")).unwrap();
    txn.commit().unwrap();
}

// ============================================================================
// 1. add_class
// ============================================================================

#[test]
fn test_add_class_visibility() {
    let (_dir, ctx) = open_db();
    seed(&ctx);
    let before = ctx.begin(TxnMode::ReadOnly).unwrap();

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    writer.add_class("robots", ClassKind::Vertex).unwrap();
    // The writer sees its staged class at once.
    assert_eq!(writer.get_class("robots").unwrap().name, "robots");
    // Nobody else does, even mid-transaction.
    let during = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(during.get_class("robots").unwrap_err().code(), "CTX_NOEXST_CLASS");
    writer.commit().unwrap();

    assert_eq!(before.get_class("robots").unwrap_err().code(), "CTX_NOEXST_CLASS");
    assert_eq!(during.get_class("robots").unwrap_err().code(), "CTX_NOEXST_CLASS");
    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(after.get_class("robots").unwrap().name, "robots");
}

// ============================================================================
// 2. rename_class
// ============================================================================

#[test]
fn test_rename_class_visibility() {
    let (_dir, ctx) = open_db();
    seed(&ctx);
    let before = ctx.begin(TxnMode::ReadOnly).unwrap();

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    writer.rename_class("people", "employees").unwrap();
    assert!(writer.get_class("people").is_err());
    writer.commit().unwrap();

    // The old reader still resolves the old name, and its queries work.
    assert_eq!(before.get_class("people").unwrap().name, "people");
    assert_eq!(before.find("people").unwrap().get_result().unwrap().len(), 1);
    assert!(before.get_class("employees").is_err());

    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(after.find("employees").unwrap().get_result().unwrap().len(), 1);
}

// ============================================================================
// 3. drop_class, and rollback of a drop
// ============================================================================

#[test]
fn test_drop_class_visibility_and_rollback() {
    let (_dir, ctx) = open_db();
    seed(&ctx);

    {
        let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
        writer.drop_class("people").unwrap();
        assert!(writer.get_class("people").is_err());
        writer.rollback().unwrap();
    }
    // Rolled back: the class and its records are intact.
    let reader = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(reader.find("people").unwrap().get_result().unwrap().len(), 1);

    let before = ctx.begin(TxnMode::ReadOnly).unwrap();
    {
        let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
        writer.drop_class("people").unwrap();
        writer.commit().unwrap();
    }
    assert_eq!(before.find("people").unwrap().get_result().unwrap().len(), 1);
    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(after.find("people").unwrap_err().code(), "CTX_NOEXST_CLASS");
}

// ============================================================================
// 4. Property operations
// ============================================================================

#[test]
fn test_property_op_visibility() {
    let (_dir, ctx) = open_db();
    seed(&ctx);
    let before = ctx.begin(TxnMode::ReadOnly).unwrap();

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    writer.add_property("people", "age", PropertyType::UnsignedInteger).unwrap();
    writer.rename_property("people", "name", "full_name").unwrap();
    assert!(writer.get_property("people", "age").is_ok());
    assert!(writer.get_property("people", "name").is_err());
    writer.commit().unwrap();

    assert!(before.get_property("people", "age").is_err());
    assert_eq!(before.get_property("people", "name").unwrap().ty, PropertyType::Text);

    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert!(after.get_property("people", "full_name").is_ok());
    // The stored value survives the rename: ids, not names, key the bytes.
    let found = after
        .find("people")
        .unwrap()
        .filter(Condition::new("full_name").eq("ada"))
        .get_result()
        .unwrap();
    assert_eq!(found.len(), 1);
}

// ============================================================================
// 5. Dropped property bytes become invisible, not erased
// ============================================================================

#[test]
fn test_dropped_property_becomes_invisible() {
    let (_dir, ctx) = open_db();
    seed(&ctx);

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    writer.drop_property("people", "name").unwrap();
    writer.commit().unwrap();

    let reader = ctx.begin(TxnMode::ReadOnly).unwrap();
    let found = reader.find("people").unwrap().get_result().unwrap();
    assert_eq!(found.len(), 1);
    // The stored bytes no longer decode into the record, and asking for
    // the vanished property by its typed getter is an error.
    assert!(found[0].record.get("name").is_none());
    let err = found[0].record.get_text("name").unwrap_err();
    assert_eq!(err.code(), "CTX_NOEXST_PROPERTY");
}

// ============================================================================
// 6. Index operations
// ============================================================================

#[test]
fn test_index_op_visibility() {
    let (_dir, ctx) = open_db();
    seed(&ctx);
    let before = ctx.begin(TxnMode::ReadOnly).unwrap();

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    writer.add_index("people", "name", false).unwrap();
    assert!(writer.get_index("people", "name").is_ok());
    writer.commit().unwrap();

    assert_eq!(before.get_index("people", "name").unwrap_err().code(), "CTX_NOEXST_INDEX");
    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert!(after.get_index("people", "name").is_ok());
    // Index-accelerated find agrees with the data.
    let found = after
        .find("people")
        .unwrap()
        .filter(Condition::new("name").eq("ada"))
        .get_result()
        .unwrap();
    assert_eq!(found.len(), 1);
}

// ============================================================================
// 7. Record visibility tracks the same snapshot rules
// ============================================================================

#[test]
fn test_record_visibility() {
    let (_dir, ctx) = open_db();
    seed(&ctx);
    let before = ctx.begin(TxnMode::ReadOnly).unwrap();

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    let brian = writer.add_vertex("people", Record::new().set("name", "brian")).unwrap();
    assert_eq!(writer.find("people").unwrap().get_result().unwrap().len(), 2);
    writer.commit().unwrap();

    assert_eq!(before.find("people").unwrap().get_result().unwrap().len(), 1);
    assert_eq!(before.fetch_record(brian).unwrap_err().code(), "CTX_NOEXST_RECORD");
    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(after.find("people").unwrap().get_result().unwrap().len(), 2);
}

// ============================================================================
// 8. A chain of schema edits in one transaction lands atomically
// ============================================================================

#[test]
fn test_schema_edits_commit_atomically() {
    let (_dir, ctx) = open_db();
    let before = ctx.begin(TxnMode::ReadOnly).unwrap();

    let mut writer = ctx.begin(TxnMode::ReadWrite).unwrap();
    writer.add_class("towns", ClassKind::Vertex).unwrap();
    writer.add_property("towns", "name", PropertyType::Text).unwrap();
    writer.add_class("roads", ClassKind::Edge).unwrap();
    writer.add_property("roads", "km", PropertyType::UnsignedInteger).unwrap();
    writer.add_index("towns", "name", true).unwrap();
    let a = writer.add_vertex("towns", Record::new().set("name", "a")).unwrap();
    let b = writer.add_vertex("towns", Record::new().set("name", "b")).unwrap();
    writer.add_edge("roads", a, b, Record::new().set("km", 12u32)).unwrap();
    writer.commit().unwrap();

    // All-or-nothing: the old reader sees none of it...
    assert!(before.get_classes().unwrap().is_empty());
    // ...and a fresh reader sees all of it as one step.
    let after = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert_eq!(after.get_classes().unwrap().len(), 2);
    assert_eq!(after.find_out_edge(a).unwrap().get_result().unwrap().len(), 1);
    let info = after.get_db_info().unwrap();
    assert_eq!((info.num_class, info.num_property, info.num_index), (2, 2, 1));
}
