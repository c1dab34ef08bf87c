use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use demoseed_core::RetryPolicy;
use demoseed_seed::{
    KeyFilter, OdooConfig, OdooRpcClient, RemoteClient, RemoteError, RemoteId, RestClient,
    RestConfig,
};
use serde_json::json;

/// One-connection-per-request HTTP server answering with canned responses
/// in order. Each received request is kept as `"<request line>\n<body>"`.
struct HttpStub {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    fn serve(responses: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let responses: Vec<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut content_length = 0usize;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).unwrap();
                seen.lock().unwrap().push(format!(
                    "{}\n{}",
                    request_line.trim_end(),
                    String::from_utf8_lossy(&request_body)
                ));

                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });

        Self { base_url, requests }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn rest_client(stub: &HttpStub) -> RestClient {
    RestClient::new(RestConfig::new(stub.base_url.clone())).unwrap()
}

fn odoo_config(stub: &HttpStub) -> OdooConfig {
    OdooConfig {
        url: stub.base_url.clone(),
        database: "demo".to_string(),
        username: "admin".to_string(),
        password: "admin".to_string(),
    }
}

#[tokio::test]
async fn rest_search_drops_items_without_the_key_fields() {
    let stub = HttpStub::serve(vec![(200, r#"[{"id":41,"name":"Bob Unrelated"}]"#)]);
    let filter = KeyFilter::new().eq("email", json!("ada@example.com"));

    let found = rest_client(&stub).search("contacts", &filter, 2).await.unwrap();

    assert!(found.is_empty());
    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /contacts?"));
    assert!(requests[0].contains("email=ada%40example.com"));
    assert!(requests[0].contains("limit=2"));
}

#[tokio::test]
async fn rest_search_keeps_only_exact_matches() {
    let stub = HttpStub::serve(vec![(
        200,
        r#"{"data":[{"id":41,"email":"bob@example.com"},{"id":42,"email":"ada@example.com","name":"Ada"}]}"#,
    )]);
    let filter = KeyFilter::new().eq("email", json!("ada@example.com"));

    let found = rest_client(&stub).search("contacts", &filter, 2).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, RemoteId::Int(42));
    assert_eq!(found[0].fields["name"], json!("Ada"));
}

#[tokio::test]
async fn rest_unknown_collection_is_a_schema_mismatch() {
    let stub = HttpStub::serve(vec![(404, r#"{"error":"no route"}"#), (404, "")]);
    let client = rest_client(&stub);

    let search = client
        .search("contactz", &KeyFilter::new().eq("email", json!("a@x.com")), 2)
        .await
        .unwrap_err();
    assert!(matches!(search, RemoteError::SchemaMismatch(_)));

    let payload = json!({"email": "a@x.com"}).as_object().cloned().unwrap();
    let create = client.create("contactz", &payload).await.unwrap_err();
    assert!(matches!(create, RemoteError::SchemaMismatch(_)));
}

#[tokio::test]
async fn rest_delete_targets_the_item_path() {
    let stub = HttpStub::serve(vec![(200, ""), (404, r#"{"error":"gone"}"#)]);
    let client = rest_client(&stub);

    client.delete("contacts", &RemoteId::Int(42)).await.unwrap();
    let gone = client.delete("contacts", &RemoteId::Int(42)).await.unwrap_err();

    assert!(matches!(gone, RemoteError::NotFound(_)));
    let requests = stub.requests();
    assert!(requests[0].starts_with("DELETE /contacts/42 "));
    assert!(requests[1].starts_with("DELETE /contacts/42 "));
}

#[tokio::test]
async fn odoo_login_is_retried_after_a_gateway_error() {
    let stub = HttpStub::serve(vec![
        (502, "bad gateway"),
        (200, r#"{"jsonrpc":"2.0","id":1,"result":7}"#),
    ]);

    let client = OdooRpcClient::connect_with_retry(odoo_config(&stub), &RetryPolicy::immediate(3))
        .await
        .unwrap();

    assert_eq!(client.uid(), 7);
    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].contains(r#""method":"login""#));
}

#[tokio::test]
async fn odoo_refused_login_is_not_retried() {
    let stub = HttpStub::serve(vec![
        (200, r#"{"jsonrpc":"2.0","id":1,"result":false}"#),
        (200, r#"{"jsonrpc":"2.0","id":2,"result":7}"#),
    ]);

    let err = OdooRpcClient::connect_with_retry(odoo_config(&stub), &RetryPolicy::immediate(3))
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 1);
    assert!(!err.exhausted);
    assert!(matches!(err.source, RemoteError::Auth(_)));
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn odoo_delete_unlinks_the_id() {
    let stub = HttpStub::serve(vec![
        (200, r#"{"jsonrpc":"2.0","id":1,"result":2}"#),
        (200, r#"{"jsonrpc":"2.0","id":2,"result":true}"#),
    ]);
    let client = OdooRpcClient::connect(odoo_config(&stub)).await.unwrap();

    client.delete("res.partner", &RemoteId::Int(15)).await.unwrap();

    let requests = stub.requests();
    let body: serde_json::Value =
        serde_json::from_str(requests[1].split_once('\n').unwrap().1).unwrap();
    assert_eq!(
        body["params"]["args"],
        json!(["demo", 2, "admin", "res.partner", "unlink", [[15]]])
    );
}
