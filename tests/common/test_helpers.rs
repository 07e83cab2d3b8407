use http::{Method, Request, Response};
use keygate::{AdmissionLayer, BucketRegistry, ManualClock, API_KEY_HEADER};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

/// Business-logic stand-in that counts how often it actually ran.
#[derive(Clone, Default)]
pub struct CountingHandler {
    pub calls: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Service<Request<()>> for CountingHandler {
    type Response = Response<String>;
    type Error = std::convert::Infallible;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<()>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(Response::new(format!("{} {}", req.method(), req.uri().path()))))
    }
}

pub fn request(method: Method, path: &str, api_key: Option<&str>) -> Request<()> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(key) = api_key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(()).expect("valid request")
}

/// Registry on a manual clock plus an all-routes layer over it.
pub fn manual_layer() -> (AdmissionLayer, Arc<BucketRegistry>, ManualClock) {
    let clock = ManualClock::new();
    let registry = Arc::new(BucketRegistry::new().with_clock(clock.clone()));
    (AdmissionLayer::new(registry.clone()), registry, clock)
}
