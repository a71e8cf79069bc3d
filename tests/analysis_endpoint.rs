//! Analysis client behavior against a mocked model endpoint.

use sentinel_harvest::analysis::{AnalysisClient, Sentiment, process_pending};
use sentinel_harvest::store::StoredRecord;
use sentinel_harvest::{ContentRecord, HarvestStore, SourceStrategy, resolve_store_target};

const MODEL_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn gemini_reply(inner: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": inner }] }
        }]
    })
    .to_string()
}

fn stored(doc_id: &str, text: &str) -> StoredRecord {
    StoredRecord {
        doc_id: doc_id.to_string(),
        url: format!("https://feed.example/posts/{doc_id}"),
        raw_text: text.to_string(),
    }
}

#[tokio::test]
async fn fenced_reply_maps_back_to_document_ids() {
    let mut server = mockito::Server::new_async().await;
    let reply = gemini_reply(
        "```json\n{\"results\":[{\"_id\":\"post_1\",\"translation\":\"Hello\",\
         \"sentiment\":\"Anger\",\"risk_score\":7,\"topics\":[\"safety\"]}]}\n```",
    );
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reply)
        .create_async()
        .await;

    let client = AnalysisClient::new("test-key".into()).with_base_url(server.url());
    let records = vec![stored("doc-a", "some foreign-language text")];

    let out = client.analyze_records(&records).await.unwrap();

    mock.assert_async().await;
    assert_eq!(out.len(), 1);
    let analysis = &out["doc-a"];
    assert_eq!(analysis.translation, "Hello");
    assert_eq!(analysis.sentiment, Sentiment::Anger);
    assert_eq!(analysis.risk_score, 7);
    assert_eq!(analysis.topics, vec!["safety"]);
}

#[tokio::test]
async fn server_error_is_reported_with_body_excerpt() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", MODEL_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .with_body("internal explosion")
        .create_async()
        .await;

    let client = AnalysisClient::new("test-key".into()).with_base_url(server.url());
    let err = client
        .analyze_records(&[stored("doc-a", "text")])
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("500"), "unexpected error: {message}");
    assert!(message.contains("internal explosion"));
}

#[tokio::test]
async fn unparseable_model_text_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", MODEL_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(gemini_reply("I am sorry, I cannot help with that."))
        .create_async()
        .await;

    let client = AnalysisClient::new("test-key".into()).with_base_url(server.url());
    let err = client
        .analyze_records(&[stored("doc-a", "text")])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unparseable"));
}

#[tokio::test]
async fn process_pending_transitions_statuses_per_record() {
    let mut server = mockito::Server::new_async().await;
    // The model answers for the first record only; the second must land in
    // the error state rather than staying pending.
    let reply = gemini_reply(
        "{\"results\":[{\"_id\":\"post_1\",\"translation\":\"ok\",\
         \"sentiment\":\"Neutral\",\"risk_score\":1,\"topics\":[]}]}",
    );
    server
        .mock("POST", MODEL_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(reply)
        .create_async()
        .await;

    let target = resolve_store_target(Some("sqlite::memory:"));
    let store = HarvestStore::connect(&target).await.unwrap();
    let first = store
        .upsert_record(&ContentRecord::new(
            "https://feed.example/posts/1",
            "first post body long enough",
            Vec::new(),
            SourceStrategy::ContainerPost,
        ))
        .await
        .unwrap();
    let second = store
        .upsert_record(&ContentRecord::new(
            "https://feed.example/posts/2",
            "second post body long enough",
            Vec::new(),
            SourceStrategy::ContainerPost,
        ))
        .await
        .unwrap();

    let client = AnalysisClient::new("test-key".into()).with_base_url(server.url());
    let updated = process_pending(&store, &client, 10).await.unwrap();

    assert_eq!(updated, 2);
    assert_eq!(
        store.status_of(&first).await.unwrap().as_deref(),
        Some("processed")
    );
    assert_eq!(
        store.status_of(&second).await.unwrap().as_deref(),
        Some("error")
    );
    assert!(store.pending_records(10).await.unwrap().is_empty());
}
