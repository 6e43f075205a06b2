use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rescue_intake::backfill::{group_messages, replay, HistoricalMessage};
use rescue_intake::db::{RecordMeta, RecordStore};
use rescue_intake::item_model::NormalizedRecord;
use rescue_intake::location::{LocationAliasTable, LocationResolver};
use rescue_intake::pipeline::Pipeline;
use rescue_intake::pipeline_config::PipelineConfig;
use rescue_intake::pipeline_errors::PipelineError;
use rescue_intake::unit_registry::UnitRegistry;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<(String, NormalizedRecord)>>,
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, record: &NormalizedRecord, meta: &RecordMeta) -> Result<String, PipelineError> {
        let ts = meta
            .source_ts
            .clone()
            .ok_or_else(|| PipelineError::Persistence("missing source timestamp".to_string()))?;
        self.records.lock().unwrap().push((ts.clone(), record.clone()));
        Ok(ts)
    }

    async fn is_processed(&self, source_ts: &str) -> Result<bool, PipelineError> {
        Ok(self.records.lock().unwrap().iter().any(|(ts, _)| ts == source_ts))
    }
}

fn message(ts: &str, user: &str, minute: u32, text: &str) -> HistoricalMessage {
    HistoricalMessage {
        ts: ts.to_string(),
        channel: Some("C042".to_string()),
        user: Some(user.to_string()),
        text: text.to_string(),
        files: vec![],
        posted_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap(),
    }
}

fn pipeline(store: Arc<MemoryStore>) -> Pipeline {
    let table = LocationAliasTable::builtin().unwrap();
    Pipeline::new(
        Arc::new(UnitRegistry::standard()),
        Arc::new(LocationResolver::new(&[], &table)),
        PipelineConfig::default(),
    )
    .unwrap()
    .with_store(store)
}

#[tokio::test]
async fn test_replay_groups_and_skips_processed() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(store.clone());

    let rows = vec![
        message("100.1", "U1", 0, "Picked up from Aldi Englewood"),
        message("100.2", "U1", 5, "- 3 cases bananas\n- 2 bags onions"),
        message("200.1", "U2", 40, "Rescued from the love fridge\n4 gallons milk"),
    ];
    let groups = group_messages(rows.clone(), Duration::minutes(30));
    assert_eq!(groups.len(), 2);

    let report = replay(&pipeline, &groups).await;
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed, 0);

    {
        let records = store.records.lock().unwrap();
        assert_eq!(records[0].0, "100.1");
        assert_eq!(records[0].1.location, "Aldi Englewood");
        assert_eq!(records[0].1.items.len(), 2);
        assert_eq!(records[1].1.location, "Love Fridge");
    }

    // a second run only sees messages that are already stored
    let report = replay(&pipeline, &group_messages(rows, Duration::minutes(30))).await;
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(store.records.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_replay_skips_empty_groups() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(store);

    let groups = group_messages(vec![message("300.1", "U3", 0, "   ")], Duration::minutes(30));
    let report = replay(&pipeline, &groups).await;
    assert_eq!(report.skipped, 1);
    assert!(report.errors.is_empty());
}

#[test]
fn test_history_rows_from_json() {
    let json = r#"[
        {"ts": "100.1", "channel": "C042", "user": "U1", "text": "2 cases apples", "posted_at": "2024-05-01T09:00:00Z"},
        {"ts": "100.2", "channel": "C042", "user": "U1", "posted_at": "2024-05-01T09:10:00Z",
         "files": [{"url": "https://files.example/crate.jpg", "mime": "image/jpeg", "name": "crate.jpg"}]}
    ]"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let contents = std::fs::read_to_string(file.path()).unwrap();
    let rows: Vec<HistoricalMessage> = serde_json::from_str(&contents).unwrap();
    let groups = group_messages(rows, Duration::minutes(30));

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].text, "2 cases apples");
    assert_eq!(groups[0].files.len(), 1);
    assert_eq!(groups[0].files[0].name.as_deref(), Some("crate.jpg"));
}
