//! The downstream request-handling capability.
//!
//! [`RequestHandler`] is what the enricher wraps and what it implements
//! itself, so enrichers compose with each other. Plain async functions
//! become handlers through [`handler_fn`]; any tower service (an axum
//! `Router`, for instance) through [`ServiceHandler`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tower::{BoxError, Service, ServiceExt};

use crate::error::HandlerError;

pub type BoxedHandler = Arc<dyn RequestHandler>;

// async_trait is required here because handlers are stored as Arc<dyn RequestHandler>.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn serve(&self, req: Request) -> Result<Response, HandlerError>;
}

/// Handler backed by an async function or closure.
pub struct HandlerFn<F>(F);

pub const fn handler_fn<F, Fut, R>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut, R> RequestHandler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    async fn serve(&self, req: Request) -> Result<Response, HandlerError> {
        Ok((self.0)(req).await.into_response())
    }
}

/// Handler backed by a cloneable tower service.
#[derive(Clone)]
pub struct ServiceHandler<S>(S);

impl<S> ServiceHandler<S> {
    pub const fn new(service: S) -> Self {
        Self(service)
    }
}

#[async_trait]
impl<S, B> RequestHandler for ServiceHandler<S>
where
    S: Service<Request, Response = http::Response<B>> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    async fn serve(&self, req: Request) -> Result<Response, HandlerError> {
        let response = self
            .0
            .clone()
            .oneshot(req)
            .await
            .map_err(HandlerError::failed)?;
        Ok(response.map(Body::new))
    }
}
