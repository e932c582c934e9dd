//! Request handlers.

use async_trait::async_trait;
use revcall_core::{PartitionKey, RequestContext, ReverseCallProtocol};
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// Computes the response to one request.
///
/// Handler-level failures are not errors to the engine: a handler that
/// fails is expected to encode the failure in its response payload so the
/// remote end can decide what to do with the individual item.
#[async_trait]
pub trait ReverseCallHandler<P: ReverseCallProtocol>: Send + Sync + 'static {
    /// Handle `request`. `stop` is the processing cancellation signal of the
    /// registration; long-running handlers should observe it.
    async fn handle(
        &self,
        request: P::Request,
        context: RequestContext,
        stop: CancellationToken,
    ) -> P::Response;

    /// Ordering domain of `request`. Requests with equal keys are handled
    /// and answered strictly in arrival order.
    ///
    /// Every request shares one partition unless overridden, which keeps
    /// processing fully serialized.
    fn partition_key(&self, _request: &P::Request) -> PartitionKey {
        PartitionKey::default()
    }
}

/// A [`ReverseCallHandler`] backed by an async closure.
pub struct HandlerFn<P, F> {
    f: F,
    _protocol: PhantomData<fn() -> P>,
}

/// Wrap an async closure as a handler with the default partitioning.
pub fn handler_fn<P, F, Fut>(f: F) -> HandlerFn<P, F>
where
    P: ReverseCallProtocol,
    F: Fn(P::Request, RequestContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = P::Response> + Send + 'static,
{
    HandlerFn {
        f,
        _protocol: PhantomData,
    }
}

#[async_trait]
impl<P, F, Fut> ReverseCallHandler<P> for HandlerFn<P, F>
where
    P: ReverseCallProtocol,
    F: Fn(P::Request, RequestContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = P::Response> + Send + 'static,
{
    async fn handle(
        &self,
        request: P::Request,
        context: RequestContext,
        stop: CancellationToken,
    ) -> P::Response {
        (self.f)(request, context, stop).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revcall_core::envelope::{EnvelopeProtocol, Request, Response};
    use revcall_core::{CallId, ExecutionContext};

    type Text = EnvelopeProtocol<(), (), String, String>;

    #[tokio::test]
    async fn test_handler_fn_sees_request_and_context() {
        let handler = handler_fn::<Text, _, _>(|request: Request<String>, context, _stop| async move {
            Response::new(format!("{} for {}", request.payload.to_uppercase(), context.call_id))
        });

        let context = RequestContext {
            call_id: CallId::new(),
            execution_context: ExecutionContext::default(),
        };
        let request = Request {
            context: context.clone(),
            payload: "ping".to_string(),
        };
        assert_eq!(handler.partition_key(&request), PartitionKey::default());

        let response = handler
            .handle(request, context.clone(), CancellationToken::new())
            .await;
        assert_eq!(response.payload, format!("PING for {}", context.call_id));
    }
}
