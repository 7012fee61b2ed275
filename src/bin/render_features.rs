use rusqlite_features::{FeatureAssembler, FeatureQuery, ProviderConfig, SqliteRowSource};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("render_features failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let usage = "Usage: render_features <path-to-sqlite> <config.json> [item-id]";
    let db_path = args.next().ok_or(usage)?;
    let config_path = args.next().ok_or(usage)?;
    let item_id = args.next();

    let config = ProviderConfig::from_json_str(&std::fs::read_to_string(config_path)?)?;
    let source = SqliteRowSource::open_read_only(db_path, &config)?;
    let assembler = FeatureAssembler::new(source, config)?;

    let document = match item_id {
        Some(id) => assembler.get(&id, None, None)?,
        None => assembler.query(&FeatureQuery::default(), None, None)?,
    };
    println!("{}", serde_json::to_string_pretty(&document)?);

    Ok(())
}
