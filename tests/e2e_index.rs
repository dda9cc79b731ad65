//! End-to-end tests for the secondary index subsystem: unique constraint
//! enforcement, range lookups through `find`, subtree coverage, and
//! maintenance across record mutations.

use nogdb_rs::{ClassKind, Condition, Context, PropertyType, Record, TxnMode};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn open_db() -> (TempDir, Context) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::open(dir.path().join("graph.db")).unwrap();
    (dir, ctx)
}

fn accounts_schema(ctx: &Context) {
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_class("accounts", ClassKind::Vertex).unwrap();
    txn.add_property("accounts", "serial", PropertyType::Integer).unwrap();
    txn.add_property("accounts", "owner", PropertyType::Text).unwrap();
    txn.add_property("accounts", "attachment", PropertyType::Blob).unwrap();
    txn.commit().unwrap();
}

// ============================================================================
// 1. Unique index collision
// ============================================================================

#[test]
fn test_unique_index_collision() {
    let (_dir, ctx) = open_db();
    accounts_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_index("accounts", "serial", true).unwrap();

    txn.add_vertex("accounts", Record::new().set("serial", 7i32)).unwrap();
    let err = txn.add_vertex("accounts", Record::new().set("serial", 7i32)).unwrap_err();
    assert_eq!(err.code(), "CTX_INVALID_INDEX_CONSTRAINT");
    txn.commit().unwrap();

    // After the failed insert, exactly one record matches.
    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();
    let hits = txn
        .find("accounts")
        .unwrap()
        .filter(Condition::new("serial").eq(7i32))
        .get_result()
        .unwrap();
    assert_eq!(hits.len(), 1);
}

// ============================================================================
// 2. Building a unique index over existing duplicates fails atomically
// ============================================================================

#[test]
fn test_unique_index_over_existing_duplicates() {
    let (_dir, ctx) = open_db();
    accounts_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_vertex("accounts", Record::new().set("serial", 1i32)).unwrap();
    txn.add_vertex("accounts", Record::new().set("serial", 1i32)).unwrap();

    let err = txn.add_index("accounts", "serial", true).unwrap_err();
    assert_eq!(err.code(), "CTX_INVALID_INDEX_CONSTRAINT");
    // The failed build left no index behind.
    assert_eq!(txn.get_index("accounts", "serial").unwrap_err().code(), "CTX_NOEXST_INDEX");

    // A non-unique index over the same data is fine.
    txn.add_index("accounts", "serial", false).unwrap();
    txn.commit().unwrap();
}

// ============================================================================
// 3. Index catalog rules
// ============================================================================

#[test]
fn test_index_catalog_rules() {
    let (_dir, ctx) = open_db();
    accounts_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();

    let err = txn.add_index("accounts", "attachment", false).unwrap_err();
    assert_eq!(err.code(), "CTX_INVALID_PROPTYPE_INDEX");

    let err = txn.add_index("accounts", "ghost", false).unwrap_err();
    assert_eq!(err.code(), "CTX_NOEXST_PROPERTY");

    txn.add_index("accounts", "serial", false).unwrap();
    let err = txn.add_index("accounts", "serial", true).unwrap_err();
    assert_eq!(err.code(), "CTX_DUPLICATE_INDEX");

    // An indexed property cannot be dropped.
    let err = txn.drop_property("accounts", "serial").unwrap_err();
    assert_eq!(err.code(), "CTX_IN_USED_PROPERTY");

    txn.drop_index("accounts", "serial").unwrap();
    let err = txn.drop_index("accounts", "serial").unwrap_err();
    assert_eq!(err.code(), "CTX_NOEXST_INDEX");
    txn.drop_property("accounts", "serial").unwrap();
}

// ============================================================================
// 4. Range lookups through find, including negatives
// ============================================================================

#[test]
fn test_indexed_range_queries() {
    let (_dir, ctx) = open_db();
    accounts_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_index("accounts", "serial", true).unwrap();
    for serial in [-500i32, -2, 0, 3, 99] {
        txn.add_vertex("accounts", Record::new().set("serial", serial)).unwrap();
    }
    txn.commit().unwrap();

    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();
    let serials = |cond: Condition| -> Vec<i32> {
        let mut out: Vec<i32> = txn
            .find("accounts")
            .unwrap()
            .filter(cond)
            .get_result()
            .unwrap()
            .iter()
            .map(|r| r.record.get_int("serial").unwrap())
            .collect();
        out.sort_unstable();
        out
    };

    assert_eq!(serials(Condition::new("serial").eq(3i32)), vec![3]);
    assert_eq!(serials(Condition::new("serial").lt(0i32)), vec![-500, -2]);
    assert_eq!(serials(Condition::new("serial").ge(0i32)), vec![0, 3, 99]);
    assert_eq!(
        serials(Condition::new("serial").between(-2i32, 3i32, (true, true))),
        vec![-2, 0, 3]
    );
    assert_eq!(
        serials(Condition::new("serial").between(-2i32, 3i32, (false, false))),
        vec![0]
    );
    assert_eq!(
        serials(Condition::new("serial").in_values([99i32, -500, 1234])),
        vec![-500, 99]
    );
}

// ============================================================================
// 5. Text index
// ============================================================================

#[test]
fn test_text_index() {
    let (_dir, ctx) = open_db();
    accounts_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_index("accounts", "owner", false).unwrap();
    for owner in ["ada", "adam", "brian"] {
        txn.add_vertex("accounts", Record::new().set("owner", owner)).unwrap();
    }
    txn.commit().unwrap();

    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();
    // Exact match must not swallow the longer key that it prefixes.
    let hits = txn
        .find("accounts")
        .unwrap()
        .filter(Condition::new("owner").eq("ada"))
        .get_result()
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.get_text("owner").unwrap(), "ada");

    let hits = txn
        .find("accounts")
        .unwrap()
        .filter(Condition::new("owner").between("ada", "brian", (true, false)))
        .get_result()
        .unwrap();
    assert_eq!(hits.len(), 2);
}

// ============================================================================
// 6. Index maintenance across update and remove
// ============================================================================

#[test]
fn test_index_maintenance() {
    let (_dir, ctx) = open_db();
    accounts_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_index("accounts", "serial", true).unwrap();

    let a = txn.add_vertex("accounts", Record::new().set("serial", 1i32)).unwrap();
    txn.update(a, Record::new().set("serial", 2i32)).unwrap();

    // The old key is gone, so its value is reusable.
    let b = txn.add_vertex("accounts", Record::new().set("serial", 1i32)).unwrap();
    let err = txn.add_vertex("accounts", Record::new().set("serial", 2i32)).unwrap_err();
    assert_eq!(err.code(), "CTX_INVALID_INDEX_CONSTRAINT");

    txn.remove(b).unwrap();
    txn.add_vertex("accounts", Record::new().set("serial", 1i32)).unwrap();
    txn.commit().unwrap();

    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();
    let hits = txn
        .find("accounts")
        .unwrap()
        .filter(Condition::new("serial").ge(1i32))
        .get_result()
        .unwrap();
    assert_eq!(hits.len(), 2);
}

// ============================================================================
// 7. An index on a base class covers descendant records
// ============================================================================

#[test]
fn test_index_covers_subtree() {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_class("employees", ClassKind::Vertex).unwrap();
    txn.add_property("employees", "salary", PropertyType::UnsignedBigInt).unwrap();
    txn.add_sub_class_of("employees", "backends").unwrap();
    txn.add_vertex("employees", Record::new().set("salary", 1000u64)).unwrap();
    txn.add_vertex("backends", Record::new().set("salary", 2000u64)).unwrap();
    // Index created after the records exist: the build scans the subtree.
    txn.add_index("employees", "salary", true).unwrap();
    txn.commit().unwrap();

    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();
    // Subtree find accelerates through the base-class index and sees both.
    let all = txn
        .find_sub_class_of("employees")
        .unwrap()
        .filter(Condition::new("salary").ge(0u64))
        .get_result()
        .unwrap();
    assert_eq!(all.len(), 2);

    // Exact-class find keeps only its own records despite the shared index.
    let base_only = txn
        .find("employees")
        .unwrap()
        .filter(Condition::new("salary").ge(0u64))
        .get_result()
        .unwrap();
    assert_eq!(base_only.len(), 1);
    assert_eq!(base_only[0].record.get_big_int_u("salary").unwrap(), 1000);
}

// ============================================================================
// 8. Uniqueness spans the subtree
// ============================================================================

#[test]
fn test_unique_index_spans_subtree() {
    let (_dir, ctx) = open_db();
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_class("employees", ClassKind::Vertex).unwrap();
    txn.add_property("employees", "badge", PropertyType::UnsignedInteger).unwrap();
    txn.add_sub_class_of("employees", "backends").unwrap();
    txn.add_index("employees", "badge", true).unwrap();

    txn.add_vertex("employees", Record::new().set("badge", 1u32)).unwrap();
    let err = txn.add_vertex("backends", Record::new().set("badge", 1u32)).unwrap_err();
    assert_eq!(err.code(), "CTX_INVALID_INDEX_CONSTRAINT");
}
