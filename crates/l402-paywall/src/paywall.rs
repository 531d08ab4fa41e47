use bon::Builder;
use http::{Request, Response, StatusCode};
use l402_kit::{
    challenge::{InvoiceCache, PaymentChallenge},
    header::{parse_authorization, www_authenticate},
    rail::LightningRail,
    token::{PaymentHash, TokenCodec},
};

use crate::errors::{GateBody, GateError, GateResponse};

/// An L402 access gate over a single priced resource.
///
/// With no credential on the request, the gate creates an invoice on the rail,
/// mints a token bound to its payment hash and answers 402. With a credential
/// plus preimage it verifies statelessly and admits the request.
///
/// The gate keeps no idempotency state: a valid credential verifies every time
/// it is replayed. Handlers that must not double-credit one settlement (lottery
/// entries, boosts) have to dedupe on [`PaymentProof::payment_hash`] themselves.
#[derive(Builder, Debug, Clone)]
pub struct PayWall<R: LightningRail> {
    /// Payment rail used to create challenge invoices.
    pub rail: R,
    /// Token codec shared by every instance behind the same secret.
    pub codec: TokenCodec,
    /// Price of the resource, in sats.
    pub amount_sats: u64,
    /// Invoice memo shown to the payer.
    #[builder(into)]
    pub memo: String,
    /// Instance-local invoice cache feeding the QR re-render endpoint.
    #[builder(default)]
    pub invoice_cache: InvoiceCache,
    /// Attach a rendered QR data URL to challenges.
    #[builder(default = true)]
    pub include_qr: bool,
}

/// Proof of settlement attached to admitted requests as an extension.
#[derive(Debug, Clone)]
pub struct PaymentProof {
    pub payment_hash: PaymentHash,
    /// Hex preimage presented by the caller.
    pub preimage: String,
}

impl<R: LightningRail> PayWall<R> {
    /// Issue a fresh payment challenge.
    pub async fn challenge(&self) -> GateResponse {
        let invoice = match self.rail.create_invoice(self.amount_sats, &self.memo).await {
            Ok(invoice) => invoice,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("invoice creation failed: {err}");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                return self.server_error("Failed to create Lightning invoice");
            }
        };

        let macaroon = self.codec.mint(&invoice.payment_hash);
        self.invoice_cache
            .insert(invoice.payment_hash, invoice.payment_request.clone());

        let qr_code = if self.include_qr {
            l402_kit::challenge::qr_data_url(&invoice.payment_request)
        } else {
            None
        };

        GateResponse {
            status: StatusCode::PAYMENT_REQUIRED,
            www_authenticate: Some(www_authenticate(&macaroon, &invoice.payment_request)),
            body: GateBody::Challenge(PaymentChallenge {
                error: "Payment required".to_string(),
                macaroon,
                invoice: invoice.payment_request,
                payment_hash: invoice.payment_hash,
                amount_sats: self.amount_sats,
                qr_code,
            }),
        }
    }

    /// Verify an `Authorization` header value against the token codec.
    pub fn verify(&self, authorization: &str) -> Result<PaymentProof, GateResponse> {
        let parsed = parse_authorization(authorization)
            .ok_or_else(|| self.unauthorized("malformed L402 authorization header"))?;

        match self.codec.verify(&parsed.macaroon, &parsed.preimage) {
            Ok(payment_hash) => Ok(PaymentProof {
                payment_hash,
                preimage: parsed.preimage,
            }),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("credential rejected: {err}");
                Err(self.unauthorized(&err.to_string()))
            }
        }
    }

    /// Challenge or admit a request, running `handler` only when admitted.
    ///
    /// On admission a [`PaymentProof`] is inserted into the request extensions.
    pub async fn handle_payment<Fun, Fut, Req, Res>(
        &self,
        mut request: Request<Req>,
        handler: Fun,
    ) -> Result<Response<Res>, GateResponse>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        let authorization = request
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let Some(authorization) = authorization else {
            return Err(self.challenge().await);
        };

        let proof = self.verify(&authorization)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(payment_hash = %proof.payment_hash, "request admitted");

        request.extensions_mut().insert(proof);
        Ok(handler(request).await)
    }

    /// Authorization failure with the specific reason.
    pub fn unauthorized(&self, reason: &str) -> GateResponse {
        GateResponse {
            status: StatusCode::UNAUTHORIZED,
            www_authenticate: None,
            body: GateBody::Error(GateError {
                error: format!("Invalid L402 token: {reason}"),
            }),
        }
    }

    /// Internal failure; no credential was issued and the caller may retry.
    pub fn server_error(&self, reason: &str) -> GateResponse {
        GateResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            www_authenticate: None,
            body: GateBody::Error(GateError {
                error: reason.to_string(),
            }),
        }
    }
}
