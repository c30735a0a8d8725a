//! Bearer token middleware.
//!
//! Wrap every scope that needs a logged-in caller with this middleware. It reads `Authorization: Bearer <token>`,
//! validates the token and stores the [`JwtClaims`] in the request extensions, where handlers and
//! [`super::AclMiddlewareFactory`] pick them up. Requests without a valid token get a 401 Unauthorized response.
use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    http::header::AUTHORIZATION,
    Error,
    HttpMessage,
};
use futures::future::{ok, Ready};
use log::{debug, trace};

use crate::auth::{JwtClaims, TokenValidator};

pub struct JwtMiddlewareFactory {
    validator: TokenValidator,
}

impl JwtMiddlewareFactory {
    pub fn new(validator: TokenValidator) -> Self {
        JwtMiddlewareFactory { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = JwtMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(JwtMiddlewareService { validator: Rc::new(self.validator.clone()), service: Rc::new(service) })
    }
}

pub struct JwtMiddlewareService<S> {
    validator: Rc<TokenValidator>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let validator = Rc::clone(&self.validator);
        Box::pin(async move {
            trace!("🔐️ Checking bearer token for {}", req.path());
            let token = bearer_token(&req).ok_or_else(|| {
                debug!("🔐️ No bearer token in request for {}", req.path());
                ErrorUnauthorized("No bearer token was provided.")
            })?;
            let claims: JwtClaims = validator.validate(&token).map_err(|e| {
                debug!("🔐️ Rejected access token. {e}");
                ErrorUnauthorized(e.to_string())
            })?;
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string()).filter(|t| !t.is_empty())
}
