use std::error::Error;

use load_plan_config::processing::ProcessingConfig;

use crate::{
    error::LoadPlanError,
    plan::{LoadPlanNode, PropertyPath},
    process::{
        context::ResultSetProcessingContext, instance::AttributeValue,
        processor::ResultSetProcessor,
    },
    row::MapResultRow,
    tests::testkit::{
        attribute_path_of, build_load_plan, init_logger, node_at, owner_of, path, person_row,
    },
    value::{EntityKey, Value},
};

#[test]
fn hydrate_and_resolve_are_no_ops() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Person")?;
    let root = plan.returns()[0];
    let address = node_at(&plan, "Person.address");
    let mut context = ResultSetProcessingContext::new(&plan);
    let empty_row = MapResultRow::new();

    plan.fetch(address)?
        .hydrate(&plan, address, &empty_row, &mut context)?;
    let resolved = plan
        .fetch(address)?
        .resolve(&plan, address, &empty_row, &mut context)?;

    assert_eq!(resolved, None);
    assert!(context.entities().is_empty());
    assert!(context.get_processing_state(root)?.entity_key().is_none());
    assert!(matches!(
        context.get_processing_state(address),
        Err(LoadPlanError::UnregisteredEntityReference(_))
    ));

    Ok(())
}

#[test]
fn read_visits_children_in_order_against_the_owning_entity() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Person")?;
    let root = plan.returns()[0];
    let address = node_at(&plan, "Person.address");
    let location = node_at(&plan, "Person.address.location");
    let country = node_at(&plan, "Person.address.location.country");
    let row = person_row(1, 10, "555-1");
    let mut context = ResultSetProcessingContext::new(&plan);

    for index in plan.reachable_nodes() {
        plan.hydrate_node(index, &row, &mut context)?;
    }
    for index in plan.reachable_nodes() {
        plan.resolve_node(index, &row, &mut context)?;
    }

    let person = context
        .entity_by_key(&EntityKey::new("Person", 1))
        .expect("person should be resolved");
    let france = context
        .entity_by_key(&EntityKey::new("Country", 33))
        .expect("country should be resolved");

    // the composite ignores the instance it is handed and uses its entity reference
    plan.read_fetch(address, &row, &mut context, france)?;

    assert_eq!(
        context.row_reads().collect::<Vec<_>>(),
        vec![(address, france), (location, person), (country, person)]
    );
    assert_eq!(
        context
            .entity(person)?
            .attribute_at(&path(&["address", "location", "country"])),
        Some(&AttributeValue::Entity(france))
    );
    assert_eq!(
        context.entity(person)?.attribute_at(&path(&["address", "city"])),
        Some(&AttributeValue::Scalar("Paris".into()))
    );
    assert_eq!(context.get_processing_state(root)?.entity_instance(), Some(person));

    Ok(())
}

#[test]
fn read_without_an_owner_key_is_an_invariant_violation() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Person")?;
    let address = node_at(&plan, "Person.address");
    let row = person_row(1, 10, "555-1");
    let mut context = ResultSetProcessingContext::new(&plan);
    let handle = context.resolve_entity_key(&EntityKey::new("Person", 1), plan.returns()[0])?;

    let result = plan.read_fetch(address, &row, &mut context, handle);

    assert!(matches!(result, Err(LoadPlanError::InvariantViolation(_))));

    Ok(())
}

#[test]
fn fragments_compose_with_the_owner_resolver() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Person")?;
    let address = node_at(&plan, "Person.address");
    let location = node_at(&plan, "Person.address.location");

    let LoadPlanNode::CompositeFetch(address_fetch) = plan.node(address)? else {
        panic!("address should be a composite fetch");
    };
    let LoadPlanNode::CompositeFetch(location_fetch) = plan.node(location)? else {
        panic!("location should be a composite fetch");
    };

    let street = address_fetch
        .composite_type()
        .find_attribute("street")
        .expect("street")
        .clone();
    let city = address_fetch
        .composite_type()
        .find_attribute("city")
        .expect("city")
        .clone();
    let resolver = plan.fetch_owner(address)?.to_sql_select_fragment_resolver();
    let mut composed = resolver.to_sql_select_fragments("p1", &street)?;
    composed.extend(resolver.to_sql_select_fragments("p1", &city)?);

    assert_eq!(composed, vec!["p1.street", "p1.city"]);
    assert_eq!(
        address_fetch.composite_resolver().all_fragments("p1")?,
        vec!["p1.street", "p1.city", "p1.zip", "p1.country_id"]
    );

    let country = location_fetch
        .composite_type()
        .find_attribute("country")
        .expect("country")
        .clone();
    assert_eq!(
        plan.fetch_owner(location)?
            .to_sql_select_fragment_resolver()
            .to_sql_select_fragments("x9", &country)?,
        vec!["x9.country_id"]
    );

    Ok(())
}

#[test]
fn composite_owners_extend_attribute_paths() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Person")?;
    let location = node_at(&plan, "Person.address.location");
    let owner = plan.fetch_owner(location)?;

    let LoadPlanNode::CompositeFetch(location_fetch) = plan.node(location)? else {
        panic!("location should be a composite fetch");
    };
    let zip = location_fetch
        .composite_type()
        .find_attribute("zip")
        .expect("zip");

    assert_eq!(owner.attribute_path_of(zip), path(&["address", "location", "zip"]));
    assert_eq!(
        owner.property_path(),
        &PropertyPath::root("Person").append("address").append("location")
    );

    Ok(())
}

fn traveler_row(visit_id: Option<i64>, city: &str) -> MapResultRow {
    MapResultRow::new()
        .with("t1.id", 1)
        .with("t1.name", "Nellie")
        .with("t1.itinerary_label", "Around the world")
        .with("v2.id", visit_id.map_or(Value::Null, Value::from))
        .with("v2.city", city)
}

#[test]
fn composite_owns_collection_fetches() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Traveler")?;
    let root = plan.returns()[0];
    let itinerary = node_at(&plan, "Traveler.itinerary");
    let visits = node_at(&plan, "Traveler.itinerary.visits");

    insta::assert_snapshot!(plan.to_string(), @r#"
    LoadPlan {
      EntityReturn(entity: "Traveler", alias: "t1") {
        CompositeFetch(path: "Traveler.itinerary") {
          CollectionFetch(path: "Traveler.itinerary.visits", element: "Visit", alias: "v2", strategy: IMMEDIATE/JOIN),
        },
      },
    },
    "#);

    assert_eq!(owner_of(&plan, visits), itinerary);
    assert_eq!(plan.find_owner_entity_reference(visits)?, root);
    assert_eq!(attribute_path_of(&plan, visits), path(&["itinerary", "visits"]));
    assert_eq!(
        plan.select_fragments()?,
        vec!["t1.id", "t1.name", "t1.itinerary_label", "v2.id", "v2.city"]
    );

    Ok(())
}

#[test]
fn collection_elements_land_under_the_composite() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Traveler")?;
    let rows = vec![
        traveler_row(Some(10), "Port Said"),
        traveler_row(Some(11), "Aden"),
    ];

    let results = ResultSetProcessor::new(&plan, ProcessingConfig::default()).process(rows)?;
    let traveler = results.roots().next().expect("a root traveler");

    assert_eq!(
        traveler.attribute_at(&path(&["itinerary", "label"])),
        Some(&AttributeValue::Scalar(Value::from("Around the world")))
    );
    let Some(AttributeValue::Collection(visits)) =
        traveler.attribute_at(&path(&["itinerary", "visits"]))
    else {
        panic!("visits should be joined under the itinerary");
    };
    let cities: Vec<_> = visits
        .iter()
        .filter_map(|visit| results.entity(*visit))
        .filter_map(|visit| visit.attribute("city").cloned())
        .collect();
    assert_eq!(
        cities,
        vec![
            AttributeValue::Scalar(Value::from("Port Said")),
            AttributeValue::Scalar(Value::from("Aden")),
        ]
    );

    Ok(())
}

#[test]
fn composite_collection_without_elements_is_empty() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_load_plan("Traveler")?;

    let results = ResultSetProcessor::new(&plan, ProcessingConfig::default())
        .process([traveler_row(None, "")])?;
    let traveler = results.roots().next().expect("a root traveler");

    assert_eq!(
        traveler.attribute_at(&path(&["itinerary", "visits"])),
        Some(&AttributeValue::Collection(vec![]))
    );
    assert_eq!(results.entities.len(), 1);

    Ok(())
}
