mod cache;
mod composite;
mod copy;

use crate::tests::testkit::{build_load_plan, init_logger};

#[test]
fn person_plan_renders_the_whole_fetch_tree() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let plan = build_load_plan("Person")?;

    insta::assert_snapshot!(format!("{}", plan), @r#"
    LoadPlan {
      EntityReturn(entity: "Person", alias: "p1") {
        CompositeFetch(path: "Person.address") {
          CompositeFetch(path: "Person.address.location") {
            EntityFetch(path: "Person.address.location.country", entity: "Country", alias: "c2", strategy: IMMEDIATE/JOIN),
          },
        },
        CollectionFetch(path: "Person.phones", element: "Phone", alias: "p3", strategy: IMMEDIATE/JOIN),
        EntityFetch(path: "Person.employer", entity: "Company", alias: "c4", strategy: LAZY/SELECT),
      },
    },
    "#);

    Ok(())
}
