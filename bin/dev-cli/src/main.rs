mod logger;

use std::env;
use std::error::Error;
use std::process;
use std::sync::Arc;

use load_plan::{
    metadata::{MetadataProvider, MetadataRegistry},
    row::MapResultRow,
    LoadPlanCache, ResultSetProcessor,
};
use load_plan_config::{config_json_schema, load_config, LoadPlanConfig};
use tracing::debug;

use crate::logger::configure_logging;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    if let Err(err) = run(&args) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let config = load_config(env::var("LOAD_PLAN_CONFIG_PATH").ok())?;
    configure_logging(&config.log);
    debug!("dev-cli running with {:?}", config);

    match (args[1].as_str(), &args[2..]) {
        ("plan", [metadata_path, entity_name, flags @ ..]) => {
            let cache = plan_cache(&config, metadata_path)?;
            let plan = cache.get_or_build(entity_name)?;

            if flags.iter().any(|flag| flag == "--json") {
                println!("{}", serde_json::to_string_pretty(&plan.select_fragments()?)?);
            } else {
                print!("{}", plan);
            }
        }
        ("rows", [metadata_path, entity_name, rows_path, ..]) => {
            let cache = plan_cache(&config, metadata_path)?;
            let plan = cache.get_or_build(entity_name)?;
            let rows: Vec<MapResultRow> =
                serde_json::from_str(&std::fs::read_to_string(rows_path)?)?;

            let results = ResultSetProcessor::new(&plan, config.processing.clone()).process(rows)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        ("config-schema", _) => {
            println!("{}", config_json_schema()?);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }

    Ok(())
}

fn plan_cache(
    config: &LoadPlanConfig,
    metadata_path: &str,
) -> Result<LoadPlanCache, Box<dyn Error>> {
    let registry: MetadataRegistry =
        serde_json::from_str(&std::fs::read_to_string(metadata_path)?)?;
    debug!("loaded {} entity persisters from {}", registry.len(), metadata_path);
    let metadata: Arc<dyn MetadataProvider> = Arc::new(registry);

    Ok(LoadPlanCache::new(metadata, config.builder.clone(), &config.cache))
}

fn print_usage() {
    eprintln!("Usage: lp-dev-cli <command> [...]");
    eprintln!("  plan <metadata.json> <entity> [--json]");
    eprintln!("  rows <metadata.json> <entity> <rows.json>");
    eprintln!("  config-schema");
}
