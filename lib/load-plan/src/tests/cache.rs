use std::{error::Error, sync::Arc};

use load_plan_config::{builder::PlanBuilderConfig, cache::PlanCacheConfig};

use crate::{
    cache::LoadPlanCache,
    error::LoadPlanError,
    tests::testkit::{fixture_metadata, init_logger, node_at, RecordingStrategy},
};

fn cache_with_size(size: usize) -> LoadPlanCache {
    LoadPlanCache::new(
        fixture_metadata(),
        PlanBuilderConfig::default(),
        &PlanCacheConfig { size },
    )
}

#[test]
fn built_plans_are_shared() -> Result<(), Box<dyn Error>> {
    init_logger();
    let cache = cache_with_size(10);

    let first = cache.get_or_build("Person")?;
    let second = cache.get_or_build("Person")?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    Ok(())
}

#[test]
fn checkout_hands_out_private_copies() -> Result<(), Box<dyn Error>> {
    init_logger();
    let cache = cache_with_size(10);
    let mut strategy = RecordingStrategy::default();

    let mut copy = cache.checkout_copy("Person", &mut strategy)?;
    let cached = cache.get_or_build("Person")?;
    assert_eq!(copy.to_string(), cached.to_string());

    let root = copy.returns()[0];
    let country = node_at(&copy, "Person.address.location.country");
    copy.link_fetch(root, country)?;

    assert_ne!(copy.to_string(), cached.to_string());
    assert_eq!(strategy.events.first().map(String::as_str), Some("start"));
    assert_eq!(strategy.events.last().map(String::as_str), Some("finish"));

    Ok(())
}

#[test]
fn least_recently_used_plans_are_evicted() -> Result<(), Box<dyn Error>> {
    init_logger();
    let cache = cache_with_size(1);

    let person = cache.get_or_build("Person")?;
    cache.get_or_build("Employee")?;
    let rebuilt = cache.get_or_build("Person")?;

    assert_eq!(cache.len(), 1);
    assert!(!Arc::ptr_eq(&person, &rebuilt));

    Ok(())
}

#[test]
fn zero_sized_cache_still_holds_one_plan() -> Result<(), Box<dyn Error>> {
    init_logger();
    let cache = cache_with_size(0);

    cache.get_or_build("Employee")?;

    assert_eq!(cache.len(), 1);
    assert!(matches!(
        cache.get_or_build("Spaceship"),
        Err(LoadPlanError::UnknownEntity(_))
    ));

    Ok(())
}
