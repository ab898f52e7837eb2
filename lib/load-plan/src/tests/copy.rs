use std::{error::Error, sync::Arc};

use crate::{
    plan::{visit::NoopVisitationStrategy, LoadPlanNode},
    tests::testkit::{
        build_load_plan, cyclic_employee_plan, init_logger, node_at, owner_of, RecordingStrategy,
    },
};

#[test]
fn copy_is_isomorphic_and_independent() -> Result<(), Box<dyn Error>> {
    init_logger();
    let original = build_load_plan("Person")?;
    let rendered = original.to_string();

    let mut copy = original.make_copy(&mut NoopVisitationStrategy)?;
    assert_eq!(copy.to_string(), rendered);
    assert_eq!(copy.node_count(), original.node_count());

    // growing the copy leaves the original untouched
    let copy_root = copy.returns()[0];
    let extra = node_at(&copy, "Person.address.location.country");
    copy.link_fetch(copy_root, extra)?;

    assert_eq!(original.to_string(), rendered);
    assert_ne!(copy.to_string(), rendered);
    assert_eq!(original.fetches_of(original.returns()[0]).len(), 3);
    assert_eq!(copy.fetches_of(copy_root).len(), 4);

    Ok(())
}

#[test]
fn copied_fetches_point_at_copied_owners() -> Result<(), Box<dyn Error>> {
    init_logger();
    let original = build_load_plan("Person")?;
    let copy = original.make_copy(&mut NoopVisitationStrategy)?;

    for path in [
        "Person.address",
        "Person.address.location",
        "Person.address.location.country",
        "Person.phones",
        "Person.employer",
    ] {
        let copied = node_at(&copy, path);
        let copied_owner = owner_of(&copy, copied);
        let original_owner = owner_of(&original, node_at(&original, path));

        assert_eq!(
            copy.node(copied_owner)?.property_path(),
            original.node(original_owner)?.property_path()
        );
    }

    Ok(())
}

#[test]
fn composite_copies_share_the_resolver() -> Result<(), Box<dyn Error>> {
    init_logger();
    let original = build_load_plan("Person")?;
    let copy = original.make_copy(&mut NoopVisitationStrategy)?;

    let (
        LoadPlanNode::CompositeFetch(original_address),
        LoadPlanNode::CompositeFetch(copied_address),
    ) = (
        original.node(node_at(&original, "Person.address"))?,
        copy.node(node_at(&copy, "Person.address"))?,
    )
    else {
        panic!("address should be a composite fetch in both plans");
    };

    assert!(Arc::ptr_eq(
        original_address.composite_resolver(),
        copied_address.composite_resolver()
    ));

    Ok(())
}

#[test]
fn shared_fetch_is_copied_once() -> Result<(), Box<dyn Error>> {
    init_logger();
    let mut original = build_load_plan("Person")?;
    let root = original.returns()[0];
    let location = node_at(&original, "Person.address.location");
    let country = node_at(&original, "Person.address.location.country");
    original.link_fetch(root, country)?;

    let mut strategy = RecordingStrategy::default();
    let copy = original.make_copy(&mut strategy)?;

    let copy_root = copy.returns()[0];
    let copy_location = node_at(&copy, "Person.address.location");
    let shared_from_root = *copy
        .fetches_of(copy_root)
        .last()
        .expect("root should list the shared fetch");
    let shared_from_location = copy.fetches_of(copy_location)[0];

    assert_eq!(shared_from_root, shared_from_location);
    assert_eq!(owner_of(&copy, shared_from_root), copy_location);
    assert_eq!(copy.node_count(), original.node_count());
    assert_eq!(original.fetches_of(location), vec![country]);
    assert_eq!(
        strategy
            .events
            .iter()
            .filter(|event| {
                event.starts_with("starting EntityFetch Person.address.location.country")
            })
            .count(),
        1
    );

    Ok(())
}

#[test]
fn cyclic_plan_copy_terminates() -> Result<(), Box<dyn Error>> {
    init_logger();
    let cyclic = cyclic_employee_plan()?;
    let mut strategy = RecordingStrategy::default();

    let copy = cyclic.plan.make_copy(&mut strategy)?;

    let copy_root = copy.returns()[0];
    let copy_desk = copy.fetches_of(copy_root)[0];
    let copy_manager = copy.fetches_of(copy_desk)[0];

    assert_eq!(copy.node_count(), 3);
    assert_eq!(copy.fetches_of(copy_manager), vec![copy_desk]);
    assert_eq!(owner_of(&copy, copy_desk), copy_root);
    assert_eq!(owner_of(&copy, copy_manager), copy_desk);

    assert_eq!(cyclic.plan.fetches_of(cyclic.manager), vec![cyclic.desk]);
    assert_eq!(cyclic.plan.fetches_of(cyclic.root), vec![cyclic.desk]);

    insta::assert_snapshot!(strategy.events.join("\n"), @r#"
    start
    starting EntityReturn Employee
    starting CompositeFetch Employee.desk
    starting EntityFetch Employee.desk.manager
    finishing EntityFetch Employee.desk.manager
    finishing CompositeFetch Employee.desk
    finishing EntityReturn Employee
    finish
    "#);

    insta::assert_snapshot!(copy.to_string(), @r#"
    LoadPlan {
      EntityReturn(entity: "Employee", alias: "e1") {
        CompositeFetch(path: "Employee.desk") {
          EntityFetch(path: "Employee.desk.manager", entity: "Employee", alias: "e2", strategy: IMMEDIATE/JOIN) {
            Ref(path: "Employee.desk"),
          },
        },
      },
    },
    "#);

    Ok(())
}
