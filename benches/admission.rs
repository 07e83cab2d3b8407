use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use http::{Request, Response};
use keygate::{
    AdmissionLayer, BucketRegistry, FixedPlanResolver, ManualClock, UsagePlan, API_KEY_HEADER,
};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, Service};

// A handler that returns an empty response.
// Used to isolate the cost of the admission layer.
#[derive(Clone)]
struct EmptyService;

impl Service<Request<()>> for EmptyService {
    type Response = Response<String>;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<()>) -> Self::Future {
        futures::future::ready(Ok(Response::new(String::new())))
    }
}

fn keyed_request(key: &'static str) -> Request<()> {
    Request::builder().uri("/api/v1/transactions").header(API_KEY_HEADER, key).body(()).unwrap()
}

fn admission_allowed(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    // Large enough that the bench never drains it.
    let plan = UsagePlan::new("bench", u32::MAX, u32::MAX, Duration::from_secs(3600)).unwrap();
    let registry = Arc::new(BucketRegistry::new().with_resolver(FixedPlanResolver::new(plan)));
    let svc = AdmissionLayer::new(registry).layer(EmptyService);

    c.bench_function("admission_allowed_hot_key", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box(keyed_request("hot")))).await;
        });
    });
}

fn admission_denied(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = Arc::new(BucketRegistry::new().with_clock(ManualClock::new()));
    let bucket = registry.resolve_bucket("drained");
    while bucket.try_consume().is_allowed() {}
    let svc = AdmissionLayer::new(registry).layer(EmptyService);

    c.bench_function("admission_denied_drained_key", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box(keyed_request("drained")))).await;
        });
    });
}

fn registry_resolution(c: &mut Criterion) {
    let registry = BucketRegistry::new();
    let keys: Vec<String> = (0..1_000).map(|i| format!("BX001-{i}")).collect();
    for key in &keys {
        registry.resolve_bucket(key);
    }

    c.bench_function("registry_resolve_existing_1k_keys", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(registry.resolve_bucket(black_box(&keys[i])));
        });
    });
}

criterion_group!(benches, admission_allowed, admission_denied, registry_resolution);
criterion_main!(benches);
