//! Compile-time prelude coverage test.
use keygate::prelude::*;
use std::sync::Arc;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let plan: UsagePlan = PricingPlan::Basic.usage_plan();
    let _routes = ProtectedRoutes::all();
    let layer = AdmissionLayer::new(Arc::new(BucketRegistry::new()));

    let mut svc = layer.layer(service_fn(|_req: http::Request<()>| async {
        Ok::<_, std::io::Error>(http::Response::new(String::new()))
    }));
    let req = http::Request::builder().header(API_KEY_HEADER, "BX001-x").body(()).unwrap();
    let response = svc.call(req).await.expect("service call failed");
    assert_eq!(response.headers()[REMAINING_HEADER], (plan.capacity() - 1).to_string().as_str());
}
