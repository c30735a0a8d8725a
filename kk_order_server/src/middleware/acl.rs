//! Access control list middleware.
//!
//! Place it on any route that sits behind [`super::JwtMiddlewareFactory`]. It checks the roles in the validated
//! claims against the roles the route requires. If the caller has all of them, the request continues. Otherwise a 403
//! Forbidden response is returned.
use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorForbidden, ErrorUnauthorized},
    Error,
    HttpMessage,
};
use futures::future::{ok, Ready};
use log::{debug, warn};

use crate::auth::{JwtClaims, Role};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
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
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let claims = req.extensions().get::<JwtClaims>().cloned().ok_or_else(|| {
                warn!("🔐️ No JWT claims found in request extensions. Is the route behind the JWT middleware?");
                ErrorUnauthorized("No bearer token was provided.")
            })?;
            if required_roles.iter().all(|role| claims.has_role(*role)) {
                service.call(req).await
            } else {
                debug!("🔐️ {} does not have the roles {required_roles:?} for {}", claims.sub, req.path());
                Err(ErrorForbidden("Insufficient permissions."))
            }
        })
    }
}
