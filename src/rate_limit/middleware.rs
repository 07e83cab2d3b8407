use crate::admission::AdmissionController;
use crate::rate_limit::BucketRegistry;
use crate::routes::ProtectedRoutes;
use futures::future::BoxFuture;
use http::{HeaderName, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that enforces per-API-key quotas on protected routes.
///
/// Clones share the same registry, so every service built from this layer draws from
/// the same buckets.
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    controller: AdmissionController,
    routes: Arc<ProtectedRoutes>,
}

impl AdmissionLayer {
    /// Guard every route using `registry`.
    pub fn new(registry: Arc<BucketRegistry>) -> Self {
        Self {
            controller: AdmissionController::new(registry),
            routes: Arc::new(ProtectedRoutes::all()),
        }
    }

    /// Restrict admission control to `routes`; everything else passes straight through.
    pub fn with_routes(mut self, routes: ProtectedRoutes) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    pub fn with_api_key_header(mut self, header: HeaderName) -> Self {
        self.controller = self.controller.with_api_key_header(header);
        self
    }

    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    pub fn routes(&self) -> &ProtectedRoutes {
        &self.routes
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService {
            inner: service,
            controller: self.controller.clone(),
            routes: self.routes.clone(),
        }
    }
}

/// Middleware service that admits or rejects each request before the inner service.
#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    controller: AdmissionController,
    routes: Arc<ProtectedRoutes>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AdmissionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if !self.routes.is_protected(req.method(), req.uri().path()) {
            return Box::pin(self.inner.call(req));
        }

        match self.controller.admit_headers(req.headers()) {
            Ok(admitted) => {
                let response = self.inner.call(req);
                Box::pin(async move {
                    let mut response = response.await?;
                    admitted.apply_headers(response.headers_mut());
                    Ok(response)
                })
            }
            Err(rejection) => {
                if rejection.is_missing_credential() {
                    tracing::info!(
                        method = %req.method(),
                        path = req.uri().path(),
                        header = %self.controller.api_key_header(),
                        "rejected request without api key"
                    );
                }
                // The inner service never sees a rejected request.
                Box::pin(futures::future::ready(Ok(rejection.into_response())))
            }
        }
    }
}
