//! A toy transactions API behind per-key admission control.
//!
//! Mutating calls and the statistics endpoint are metered; listing is free.
//! Run with `cargo run --example transactions_api`.
use http::{HeaderName, Method, Request, Response, StatusCode};
use keygate::{AdmissionConfig, API_KEY_HEADER, REMAINING_HEADER, RETRY_AFTER_HEADER};
use std::convert::Infallible;
use tower::{service_fn, Layer, ServiceExt};

const CONFIG: &str = r#"{
    "routes": [
        { "pattern": "/api/v1/transactions/**", "methods": ["POST", "PUT", "PATCH", "DELETE"] },
        { "pattern": "/api/v1/transactions/statistics" }
    ],
    "store": { "kind": "bounded", "max_keys": 10000, "idle_ttl_secs": 3600 }
}"#;

async fn handler(req: Request<()>) -> Result<Response<String>, Infallible> {
    let body = format!("{} {} handled", req.method(), req.uri().path());
    Ok(Response::new(body))
}

fn request(method: Method, path: &str, key: Option<&str>) -> Result<Request<()>, http::Error> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(key) = key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(())
}

fn describe(label: &str, response: &Response<String>) {
    let header = |name: &HeaderName| {
        response.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("-").to_owned()
    };
    println!(
        "{label:<32} {} remaining={} retry_after={} body={:?}",
        response.status(),
        header(&REMAINING_HEADER),
        header(&RETRY_AFTER_HEADER),
        response.body()
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let layer = AdmissionConfig::from_json_str(CONFIG)?.into_layer()?;
    let svc = layer.layer(service_fn(handler));

    let listing = svc.clone().oneshot(request(Method::GET, "/api/v1/transactions/42", None)?).await?;
    describe("GET listing (unmetered)", &listing);

    let missing = svc.clone().oneshot(request(Method::POST, "/api/v1/transactions/new", None)?).await?;
    describe("POST without key", &missing);

    for (plan, key) in [("professional", "PX001-acme"), ("basic", "BX001-acme"), ("free", "acme")] {
        let response = svc
            .clone()
            .oneshot(request(Method::GET, "/api/v1/transactions/statistics", Some(key))?)
            .await?;
        describe(&format!("statistics as {plan}"), &response);
    }

    let mut last = None;
    for _ in 0..25 {
        let response = svc
            .clone()
            .oneshot(request(Method::DELETE, "/api/v1/transactions/7", Some("trial-user"))?)
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            last = Some(response);
            break;
        }
    }
    match last {
        Some(response) => describe("free key after exhaustion", &response),
        None => println!("free key was never throttled"),
    }
    Ok(())
}
