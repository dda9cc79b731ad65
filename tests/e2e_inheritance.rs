//! End-to-end tests for class inheritance: property resolution through
//! ancestors, extended-class finds, and drop cascades along the hierarchy.

use nogdb_rs::{ClassKind, Condition, Context, PropertyType, Record, TxnMode};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn open_db() -> (TempDir, Context) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::open(dir.path().join("graph.db")).unwrap();
    (dir, ctx)
}

/// employees ⟵ backends ⟵ systems, plus a sibling frontends branch.
fn company_schema(ctx: &Context) {
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_class("employees", ClassKind::Vertex).unwrap();
    txn.add_property("employees", "name", PropertyType::Text).unwrap();
    txn.add_property("employees", "salary", PropertyType::UnsignedBigInt).unwrap();
    txn.add_sub_class_of("employees", "backends").unwrap();
    txn.add_property("backends", "cpp_skills", PropertyType::Integer).unwrap();
    txn.add_sub_class_of("backends", "systems").unwrap();
    txn.add_property("systems", "devops_skills", PropertyType::Integer).unwrap();
    txn.add_sub_class_of("employees", "frontends").unwrap();
    txn.commit().unwrap();
}

// ============================================================================
// 1. Sub-classes inherit kind and parent
// ============================================================================

#[test]
fn test_sub_class_shape() {
    let (_dir, ctx) = open_db();
    company_schema(&ctx);
    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();

    let employees = txn.get_class("employees").unwrap();
    let backends = txn.get_class("backends").unwrap();
    let systems = txn.get_class("systems").unwrap();

    assert_eq!(backends.kind, ClassKind::Vertex);
    assert_eq!(backends.parent, Some(employees.id));
    assert_eq!(systems.parent, Some(backends.id));

    let err = ctx
        .begin(TxnMode::ReadWrite)
        .unwrap()
        .add_sub_class_of("ghosts", "phantoms")
        .unwrap_err();
    assert_eq!(err.code(), "CTX_NOEXST_CLASS");
}

// ============================================================================
// 2. Property resolution walks toward the root
// ============================================================================

#[test]
fn test_inherited_property_resolution() {
    let (_dir, ctx) = open_db();
    company_schema(&ctx);
    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();

    let name = txn.get_property("systems", "name").unwrap();
    assert!(name.inherited);
    let devops = txn.get_property("systems", "devops_skills").unwrap();
    assert!(!devops.inherited);

    // systems sees: name, salary (employees), cpp_skills (backends),
    // devops_skills (own).
    let props = txn.get_properties("systems").unwrap();
    assert_eq!(props.len(), 4);
    assert_eq!(props.iter().filter(|p| p.inherited).count(), 3);

    // The base class does not see descendant properties.
    assert!(txn.get_property("employees", "cpp_skills").is_err());
}

// ============================================================================
// 3. Ancestor/descendant name clashes
// ============================================================================

#[test]
fn test_property_clash_rules() {
    let (_dir, ctx) = open_db();
    company_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();

    let err = txn.add_property("systems", "name", PropertyType::Text).unwrap_err();
    assert_eq!(err.code(), "CTX_DUPLICATE_PROPERTY");

    let err = txn.add_property("employees", "devops_skills", PropertyType::Integer).unwrap_err();
    assert_eq!(err.code(), "CTX_OVERRIDE_PROPERTY");

    // A different type does not let a subclass shadow an ancestor name.
    let err = txn.add_property("systems", "name", PropertyType::Integer).unwrap_err();
    assert_eq!(err.code(), "CTX_OVERRIDE_PROPERTY");
    assert!(txn.get_property("systems", "name").unwrap().inherited);

    // Nor the other way around, whatever the types.
    let err = txn.add_property("employees", "cpp_skills", PropertyType::Text).unwrap_err();
    assert_eq!(err.code(), "CTX_OVERRIDE_PROPERTY");

    // Siblings may declare the same name independently.
    txn.add_property("frontends", "cpp_skills", PropertyType::Text).unwrap();
}

// ============================================================================
// 4. Records land in their own class; extended find covers the subtree
// ============================================================================

#[test]
fn test_find_sub_class_of() {
    let (_dir, ctx) = open_db();
    company_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_vertex(
        "systems",
        Record::new().set("name", "octo").set("devops_skills", 9i32),
    )
    .unwrap();
    txn.commit().unwrap();

    let txn = ctx.begin(TxnMode::ReadOnly).unwrap();
    assert!(txn.find("employees").unwrap().get_result().unwrap().is_empty());

    let extended = txn.find_sub_class_of("employees").unwrap().get_result().unwrap();
    assert_eq!(extended.len(), 1);
    assert_eq!(extended[0].record.get_text("name").unwrap(), "octo");
    assert_eq!(extended[0].record.class_name(), Some("systems"));

    // Filters on inherited properties apply across the subtree.
    let filtered = txn
        .find_sub_class_of("employees")
        .unwrap()
        .filter(Condition::new("name").begin_with("oc"))
        .get_result()
        .unwrap();
    assert_eq!(filtered.len(), 1);
}

// ============================================================================
// 5. Dropping a mid-hierarchy class
// ============================================================================

#[test]
fn test_drop_class_in_hierarchy() {
    let (_dir, ctx) = open_db();
    company_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.add_vertex("backends", Record::new().set("name", "bee")).unwrap();
    txn.add_vertex(
        "systems",
        Record::new().set("name", "sys").set("devops_skills", 5i32),
    )
    .unwrap();
    txn.commit().unwrap();

    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();
    txn.drop_class("backends").unwrap();

    // The class is gone; its subtree's records went with it; the surviving
    // child is parent-less.
    assert_eq!(txn.get_class("backends").unwrap_err().code(), "CTX_NOEXST_CLASS");
    let systems = txn.get_class("systems").unwrap();
    assert_eq!(systems.parent, None);
    assert!(txn.find("systems").unwrap().get_result().unwrap().is_empty());

    // Properties inherited from the dropped branch no longer resolve.
    assert!(txn.get_property("systems", "cpp_skills").is_err());
    assert!(txn.get_property("systems", "name").is_err());
    assert_eq!(txn.get_property("systems", "devops_skills").unwrap().ty, PropertyType::Integer);
}

// ============================================================================
// 6. An index owned by a descendant pins the base class
// ============================================================================

#[test]
fn test_drop_class_blocked_by_descendant_index() {
    let (_dir, ctx) = open_db();
    company_schema(&ctx);
    let mut txn = ctx.begin(TxnMode::ReadWrite).unwrap();

    // backends indexes the property it inherits from employees.
    txn.add_index("backends", "salary", false).unwrap();

    let err = txn.drop_class("employees").unwrap_err();
    assert_eq!(err.code(), "CTX_IN_USED_PROPERTY");

    txn.drop_index("backends", "salary").unwrap();
    txn.drop_class("employees").unwrap();
    assert_eq!(txn.get_class("backends").unwrap().parent, None);
}
