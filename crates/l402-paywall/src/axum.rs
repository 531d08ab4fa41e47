use std::convert::Infallible;
use std::pin::Pin;

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use l402_kit::rail::LightningRail;
use tower::{Layer, Service};

use crate::paywall::PayWall;

impl<R: LightningRail + Clone, S> Layer<S> for PayWall<R> {
    type Service = PayWallService<R, S>;

    fn layer(&self, inner: S) -> Self::Service {
        PayWallService {
            paywall: self.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct PayWallService<R: LightningRail, S> {
    paywall: PayWall<R>,
    inner: S,
}

impl<R, S> Service<Request> for PayWallService<R, S>
where
    R: LightningRail + Clone + Send + Sync + 'static,
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let paywall = self.paywall.clone();
        // The clone is the ready service; keep it, hand the original back.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut inner = inner;
            let response = paywall
                .handle_payment(request, move |req| async move {
                    inner.call(req).await.into_response()
                })
                .await
                .unwrap_or_else(|gate| gate.into_response());

            Ok(response)
        })
    }
}
