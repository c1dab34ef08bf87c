use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use demoseed_core::{
    ExclusionTracker, KeyMatching, RecordSchema, RetryPolicy, RunContext, load_record_set,
};
use demoseed_generate::{
    GenerationError, Generator, GeneratorOptions, GenerationRun, LlmError, RunOptions,
    ScriptedClient,
};
use demoseed_plan::Theme;
use serde_json::{Value, json};

fn customer_schema() -> RecordSchema {
    serde_json::from_value(json!({
        "name": "customers",
        "natural_key": { "fields": ["email"], "matching": "case_insensitive" },
        "fields": [
            { "name": "name", "kind": { "type": "string" } },
            { "name": "email", "kind": { "type": "string", "format": "email" } },
            { "name": "ref", "kind": { "type": "sequence", "prefix": "CUST", "width": 3 } }
        ]
    }))
    .expect("customer schema")
}

fn theme() -> Theme {
    Theme {
        subject: "outdoor gear retail".to_string(),
        company_name: "Summit Outfitters".to_string(),
        notes: Vec::new(),
        vocabularies: BTreeMap::new(),
        vocabulary_sample: 4,
    }
}

fn customers(range: std::ops::Range<usize>) -> String {
    let items: Vec<Value> = range
        .map(|idx| json!({"name": format!("Customer {idx}"), "email": format!("customer{idx}@example.com")}))
        .collect();
    serde_json::to_string(&items).unwrap()
}

fn context() -> RunContext {
    RunContext::new("test-run", ExclusionTracker::new(KeyMatching::CaseInsensitive))
}

fn run(client: Arc<ScriptedClient>, output: std::path::PathBuf, target: usize, batch: usize) -> GenerationRun {
    let generator = Generator::with_options(
        client,
        customer_schema(),
        RetryPolicy::immediate(3),
        GeneratorOptions::default(),
    );
    GenerationRun::new(
        generator,
        theme(),
        RunOptions {
            target_count: target,
            batch_size: batch,
            max_consecutive_failures: 3,
            output,
        },
    )
}

#[tokio::test]
async fn three_batches_yield_thirty_distinct_customers() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("customers.json");
    let client = Arc::new(ScriptedClient::new());
    client
        .push_text(customers(0..10))
        .push_text(format!("```json\n{}\n```", customers(10..20)))
        .push_text(customers(20..30));

    let mut ctx = context();
    let report = run(client.clone(), output.clone(), 30, 10)
        .execute(&mut ctx)
        .await
        .expect("run succeeds");

    let records = load_record_set(&output).unwrap();
    let emails: HashSet<String> = records
        .iter()
        .map(|record| record["email"].as_str().unwrap().to_lowercase())
        .collect();
    assert_eq!(records.len(), 30);
    assert_eq!(emails.len(), 30);
    assert_eq!(report.accepted, 30);
    assert!(report.is_complete());
    assert_eq!(records[0]["ref"], json!("CUST001"));
    assert_eq!(records[29]["ref"], json!("CUST030"));

    let requests = client.requests();
    assert_eq!(requests.len(), 3);
    assert!(!requests[0].prompt.contains("Do not reuse"));
    assert!(requests[1].prompt.contains("customer9@example.com"));
    assert!(requests[2].prompt.contains("customer19@example.com"));
}

#[tokio::test]
async fn invalid_record_is_dropped_and_not_tracked() {
    let client = Arc::new(ScriptedClient::new());
    client.push_text(
        json!([
            {"name": "Ada", "email": "ada@example.com"},
            {"name": "No Mail"},
            {"name": "Grace", "email": "grace@example.com"}
        ])
        .to_string(),
    );
    let mut generator = Generator::new(client, customer_schema(), RetryPolicy::immediate(1));
    let tracker = ExclusionTracker::new(KeyMatching::CaseInsensitive);

    let batch = generator.generate(3, &theme(), &tracker).await.unwrap();

    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.invalid(), 1);
    assert_eq!(batch.keys, vec!["ada@example.com", "grace@example.com"]);
    assert!(batch.records.iter().all(|record| record.contains_key("email")));
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn duplicates_against_tracker_and_within_batch_are_dropped() {
    let client = Arc::new(ScriptedClient::new());
    client.push_text(
        json!([
            {"name": "Ada", "email": "ADA@example.com"},
            {"name": "Bob", "email": "bob@example.com"},
            {"name": "Bobby", "email": "Bob@Example.com"},
            {"name": "Cy", "email": "cy@example.com"},
            {"name": "Di", "email": "di@example.com"}
        ])
        .to_string(),
    );
    let mut tracker = ExclusionTracker::new(KeyMatching::CaseInsensitive);
    tracker.register("ada@example.com");
    let mut generator = Generator::new(client, customer_schema(), RetryPolicy::immediate(1));

    let batch = generator.generate(2, &theme(), &tracker).await.unwrap();

    assert_eq!(batch.keys, vec!["bob@example.com", "cy@example.com"]);
    assert_eq!(batch.duplicates(), 2);
    assert_eq!(batch.excess(), 1);
}

#[tokio::test]
async fn all_invalid_batch_is_no_usable_output() {
    let client = Arc::new(ScriptedClient::new());
    client.push_text(json!([{"name": "No Mail"}]).to_string());
    let mut generator = Generator::new(client, customer_schema(), RetryPolicy::immediate(1));
    let tracker = ExclusionTracker::new(KeyMatching::CaseInsensitive);

    let err = generator.generate(1, &theme(), &tracker).await.unwrap_err();
    assert!(matches!(
        err,
        GenerationError::NoUsableOutput { candidates: 1, invalid: 1, duplicates: 0 }
    ));
}

#[tokio::test]
async fn resume_requests_only_the_remainder() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("customers.json");
    let existing: Vec<Value> = (0..5)
        .map(|idx| json!({"name": format!("Customer {idx}"), "email": format!("customer{idx}@example.com"), "ref": format!("CUST{:03}", idx + 1)}))
        .collect();
    std::fs::write(&output, serde_json::to_string(&existing).unwrap()).unwrap();

    let client = Arc::new(ScriptedClient::new());
    client.push_text(customers(3..8));

    let mut ctx = context();
    let report = run(client.clone(), output.clone(), 8, 10)
        .execute(&mut ctx)
        .await
        .unwrap();

    assert_eq!(report.existing, 5);
    assert_eq!(report.accepted, 3);
    assert_eq!(report.duplicates, 2);
    assert!(client.requests()[0].prompt.contains("Generate 3 realistic"));

    let records = load_record_set(&output).unwrap();
    assert_eq!(records.len(), 8);
    assert_eq!(records[5]["email"], json!("customer5@example.com"));
    assert_eq!(records[5]["ref"], json!("CUST006"));
}

#[tokio::test]
async fn consecutive_failures_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("customers.json");
    let client = Arc::new(ScriptedClient::new());
    client
        .push_text(customers(0..2))
        .push_text("Sorry, I cannot produce that.")
        .push_text("[]")
        .push_text(json!([{"name": "No Mail"}]).to_string());

    let mut ctx = context();
    let report = run(client.clone(), output.clone(), 10, 2)
        .execute(&mut ctx)
        .await
        .unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.failed_batches, 3);
    assert_eq!(report.total_records, 2);
    assert!(!report.is_complete());
    assert_eq!(client.requests().len(), 4);
    assert_eq!(load_record_set(&output).unwrap().len(), 2);
}

#[tokio::test]
async fn transient_completion_errors_are_retried() {
    let client = Arc::new(ScriptedClient::new());
    client
        .push_error(LlmError::RateLimited("429".to_string()))
        .push_text(customers(0..1));
    let mut generator = Generator::new(client.clone(), customer_schema(), RetryPolicy::immediate(3));
    let tracker = ExclusionTracker::new(KeyMatching::CaseInsensitive);

    let batch = generator.generate(1, &theme(), &tracker).await.unwrap();

    assert_eq!(batch.records.len(), 1);
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn fatal_completion_error_ends_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new());
    client.push_error(LlmError::Auth("invalid x-api-key".to_string()));

    let mut ctx = context();
    let err = run(client.clone(), dir.path().join("customers.json"), 5, 5)
        .execute(&mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Completion(_)));
    assert_eq!(client.requests().len(), 1);
}
