use rescue_intake::location::LocationAliasTable;
use rescue_intake::pipeline::Pipeline;
use rescue_intake::pipeline_config::PipelineConfig;
use std::collections::HashMap;
use std::io::Write;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[tokio::test]
async fn test_custom_alias_file_and_known_locations() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"Westside Pantry": ["west pantry", "wsp"], "Greenhouse Co-op": null}}"#
    )
    .unwrap();

    let path = file.path().to_string_lossy().to_string();
    let config = PipelineConfig::from_lookup(lookup(&[
        ("LOCATION_ALIASES_PATH", path.as_str()),
        ("KNOWN_LOCATIONS", "Eastside Market, Northside Depot"),
    ]))
    .unwrap();
    assert_eq!(config.known_locations, vec!["Eastside Market", "Northside Depot"]);

    let pipeline = Pipeline::from_config(config).unwrap();

    let record = pipeline.preview_from_text("Picked up from WSP\n2 cases apples").await;
    assert_eq!(record.location, "Westside Pantry");

    let record = pipeline.preview_from_text("Rescued from northside depot - back door\n1 bag rice").await;
    assert_eq!(record.location, "Northside Depot");

    let record = pipeline.preview_from_text("Picked up from greenhouse co-op\n1 bag rice").await;
    assert_eq!(record.location, "Greenhouse Co-op");

    // the built-in table is replaced, not extended
    let record = pipeline.preview_from_text("Picked up from Aldi Lyons\n1 bag rice").await;
    assert_eq!(record.location, "");
}

#[test]
fn test_missing_alias_file_is_an_error() {
    let config = PipelineConfig::from_lookup(lookup(&[("LOCATION_ALIASES_PATH", "/nonexistent/aliases.json")])).unwrap();
    let err = Pipeline::from_config(config).err().unwrap();
    assert!(format!("{err:#}").contains("Failed to read location aliases"));
}

#[test]
fn test_invalid_numbers_are_reported() {
    let err = PipelineConfig::from_lookup(lookup(&[("MAX_IMAGES", "lots")])).unwrap_err();
    assert!(err.to_string().contains("MAX_IMAGES"));
}

#[test]
fn test_oracle_enabled_only_with_key() {
    let config = PipelineConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test"), ("ORACLE_MODEL", "gpt-4o")])).unwrap();
    assert_eq!(config.oracle.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.oracle.model, "gpt-4o");
    assert!(Pipeline::from_config(config).is_ok());

    let config = PipelineConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")])).unwrap();
    assert_eq!(config.oracle.api_key, None);
}

#[test]
fn test_builtin_alias_table_is_ordered() {
    let table = LocationAliasTable::builtin().unwrap();
    let names: Vec<&str> = table.entries().iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names.first(), Some(&"Aldi Wicker Park"));
    assert_eq!(names.last(), Some(&"UC"));
    let south_loop = names.iter().position(|n| *n == "Mariano's South Loop").unwrap();
    let marianos = names.iter().position(|n| *n == "Mariano's").unwrap();
    assert!(south_loop < marianos);
}
