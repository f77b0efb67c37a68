//! Authorization gateway: the single entry point request handlers call
//! before running privileged business logic.
//!
//! Routes are declared statically with the scope they require; the gateway
//! resolves the scope and delegates to [`MultisigVerifier`]. It never logs
//! signatures or payload contents.

use std::fmt;
use std::sync::Arc;

use crate::config::AuthContext;
use crate::envelope::SignedEnvelope;
use crate::error::AuthorizationError;
use crate::verify::{AuthorizationDecision, MultisigVerifier, VerifiedEnvelope};

/// HTTP method of a management route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Static route declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    /// Stable route identifier, e.g. `labels.create`.
    pub id: &'static str,
    pub method: Method,
    pub path: &'static str,
    /// Scope that must be authorized before the handler runs.
    pub scope: &'static str,
    /// Status returned on success.
    pub success_status: u16,
}

/// Status class for a decision: 200 when allowed, 401 for every denial.
pub fn decision_status(decision: &AuthorizationDecision) -> u16 {
    match decision {
        AuthorizationDecision::Allowed => 200,
        AuthorizationDecision::Denied(reason) => reason.status_code(),
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationGateway {
    context: Arc<AuthContext>,
    routes: &'static [RouteSpec],
}

impl AuthorizationGateway {
    pub fn new(context: Arc<AuthContext>, routes: &'static [RouteSpec]) -> Self {
        for route in routes {
            if context.registry().get(route.scope).is_none() {
                tracing::warn!(
                    route = route.id,
                    scope = route.scope,
                    "route requires a scope with no policy; every request will be denied"
                );
            }
        }
        Self { context, routes }
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    pub fn routes(&self) -> &'static [RouteSpec] {
        self.routes
    }

    /// Decide whether `envelope` authorizes `scope`.
    pub fn authorize(&self, envelope: &SignedEnvelope, scope: &str) -> AuthorizationDecision {
        self.verifier().verify(envelope, scope)
    }

    /// Authorize and return the verified envelope for the handler.
    pub fn authorize_scope(
        &self,
        envelope: &SignedEnvelope,
        scope: &str,
    ) -> Result<VerifiedEnvelope, AuthorizationError> {
        self.verifier().verify_envelope(envelope, scope)
    }

    /// Look up `route_id` in the route table and authorize its scope.
    ///
    /// An undeclared route is treated as an unknown scope.
    pub fn authorize_route(
        &self,
        route_id: &str,
        envelope: &SignedEnvelope,
    ) -> Result<(&'static RouteSpec, VerifiedEnvelope), AuthorizationError> {
        let route = self.route(route_id).ok_or_else(|| {
            tracing::debug!(route = %route_id, reason = "unknown_scope", "undeclared route");
            AuthorizationError::UnknownScope
        })?;
        let verified = self.authorize_scope(envelope, route.scope)?;
        Ok((route, verified))
    }

    pub fn route(&self, route_id: &str) -> Option<&'static RouteSpec> {
        self.routes.iter().find(|r| r.id == route_id)
    }

    /// Resolve a route from method and path.
    pub fn find_route(&self, method: Method, path: &str) -> Option<&'static RouteSpec> {
        let path = path.trim_end_matches('/');
        self.routes
            .iter()
            .find(|r| r.method == method && r.path == path)
    }

    fn verifier(&self) -> MultisigVerifier<'_> {
        MultisigVerifier::new(self.context.registry(), self.context.keyring())
    }
}
