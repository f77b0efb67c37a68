//! Label management handlers.
//!
//! Every handler runs behind `AuthorizationGateway::authorize_route`; the
//! request parameters are the `data` member of the verified payload.

use std::sync::Arc;

use keygate_auth::{AuthContext, AuthorizationGateway, Method, RouteSpec, SignedEnvelope};
use serde_json::{json, Map, Value};

use crate::error::{ApiError, OWNER_NOT_FOUND};
use crate::model::{LabelFilter, LabelScope, LabelUpdate, NewLabel, User, UpsertOutcome};
use crate::response::ApiResponse;
use crate::store::{LabelStore, UserDirectory};
use crate::validation::Params;

pub static LABEL_ROUTES: &[RouteSpec] = &[
    RouteSpec {
        id: "labels.create",
        method: Method::Post,
        path: "/management/labels",
        scope: "write_labels",
        success_status: 201,
    },
    RouteSpec {
        id: "labels.update",
        method: Method::Put,
        path: "/management/labels",
        scope: "write_labels",
        success_status: 200,
    },
    RouteSpec {
        id: "labels.delete",
        method: Method::Post,
        path: "/management/labels/delete",
        scope: "write_labels",
        success_status: 204,
    },
    RouteSpec {
        id: "labels.list",
        method: Method::Post,
        path: "/management/labels/list",
        scope: "read_labels",
        success_status: 201,
    },
    RouteSpec {
        id: "labels.filter_users",
        method: Method::Post,
        path: "/management/labels/filter/users",
        scope: "read_users",
        success_status: 201,
    },
];

/// Management API for labels, generic over the record store.
pub struct ManagementApi<S> {
    gateway: AuthorizationGateway,
    store: Arc<S>,
}

impl<S: UserDirectory + LabelStore> ManagementApi<S> {
    pub fn new(context: Arc<AuthContext>, store: Arc<S>) -> Self {
        Self {
            gateway: AuthorizationGateway::new(context, LABEL_ROUTES),
            store,
        }
    }

    pub fn gateway(&self) -> &AuthorizationGateway {
        &self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle a raw JSON envelope; an unparsable body is a denial.
    pub fn handle_json(&self, route_id: &str, body: &str) -> ApiResponse {
        match SignedEnvelope::from_json(body) {
            Ok(envelope) => self.handle(route_id, &envelope),
            Err(e) => ApiError::from(e).into(),
        }
    }

    /// Same as `handle`, resolving the route by method and path.
    pub fn handle_request(
        &self,
        method: Method,
        path: &str,
        envelope: &SignedEnvelope,
    ) -> ApiResponse {
        match self.gateway.find_route(method, path) {
            Some(route) => self.handle(route.id, envelope),
            None => ApiResponse::json(404, json!({ "error": "route doesn't exist" })),
        }
    }

    /// Authorize `envelope` for `route_id`, then run the handler.
    pub fn handle(&self, route_id: &str, envelope: &SignedEnvelope) -> ApiResponse {
        match self.dispatch(route_id, envelope) {
            Ok(response) => response,
            Err(e) => {
                if e.status_code() >= 500 {
                    tracing::error!(route = route_id, error = %e, "management request failed");
                } else {
                    tracing::debug!(route = route_id, status = e.status_code(), "management request rejected");
                }
                e.into()
            }
        }
    }

    fn dispatch(&self, route_id: &str, envelope: &SignedEnvelope) -> Result<ApiResponse, ApiError> {
        let (route, verified) = self.gateway.authorize_route(route_id, envelope)?;
        let data = verified.envelope().data();
        let status = route.success_status;

        match route.id {
            "labels.create" => Ok(ApiResponse::json(status, self.create(&data)?)),
            "labels.update" => Ok(ApiResponse::json(status, self.update(&data)?)),
            "labels.delete" => {
                self.delete(&data)?;
                Ok(ApiResponse::no_content())
            }
            "labels.list" => Ok(ApiResponse::json(status, self.list(&data)?)),
            "labels.filter_users" => Ok(ApiResponse::json(status, self.filter_users(&data)?)),
            other => Err(ApiError::Internal(format!("no handler for route {other}"))),
        }
    }

    fn create(&self, data: &Map<String, Value>) -> Result<Value, ApiError> {
        let mut params = Params::new(data);
        let owner = params.required_str("owner");
        let key = params.required_str("key");
        let value = params.required_str("value");
        let scope = params.optional_parsed("scope", |s| s.parse::<LabelScope>().ok());
        let description = params.optional_str("description");
        params.finish()?;

        let (Some(owner), Some(key), Some(value)) = (owner, key, value) else {
            return Err(ApiError::Internal("validated fields absent".to_string()));
        };
        self.require_owner(&owner)?;

        let label = self.store.create_label(NewLabel {
            owner,
            key,
            value,
            scope: scope.unwrap_or_default(),
            description,
        })?;
        tracing::info!(owner = %label.owner, key = %label.key, scope = %label.scope, "label created");
        Ok(label.to_json())
    }

    fn update(&self, data: &Map<String, Value>) -> Result<Value, ApiError> {
        let mut params = Params::new(data);
        let owner = params.required_str("owner");
        let key = params.required_str("key");
        let value = params.required_str("value");
        let scope = params.optional_parsed("scope", |s| s.parse::<LabelScope>().ok());
        let description = params.optional_str("description");
        let replace = params.optional_bool("replace");
        params.finish()?;

        let (Some(owner), Some(key), Some(value)) = (owner, key, value) else {
            return Err(ApiError::Internal("validated fields absent".to_string()));
        };
        self.require_owner(&owner)?;

        let outcome = self.store.update_label(LabelUpdate {
            owner,
            key,
            value,
            scope,
            description,
            replace: replace.unwrap_or(true),
        })?;
        let created = matches!(outcome, UpsertOutcome::Created(_));
        let label = outcome.into_label();
        tracing::info!(owner = %label.owner, key = %label.key, created, "label updated");
        Ok(label.to_json())
    }

    fn delete(&self, data: &Map<String, Value>) -> Result<(), ApiError> {
        let mut params = Params::new(data);
        let owner = params.required_str("owner");
        let key = params.required_str("key");
        let scope = params.optional_parsed("scope", |s| s.parse::<LabelScope>().ok());
        params.finish()?;

        let (Some(owner), Some(key)) = (owner, key) else {
            return Err(ApiError::Internal("validated fields absent".to_string()));
        };
        self.require_owner(&owner)?;

        let label = self.store.delete_label(&owner, &key, scope)?;
        tracing::info!(
            owner = %label.owner,
            key = %label.key,
            scope = %label.scope,
            "label deleted"
        );
        Ok(())
    }

    fn list(&self, data: &Map<String, Value>) -> Result<Value, ApiError> {
        let mut params = Params::new(data);
        let owner = params.required_str("owner");
        params.finish()?;

        let Some(owner) = owner else {
            return Err(ApiError::Internal("validated fields absent".to_string()));
        };
        self.require_owner(&owner)?;

        let labels = self.store.labels_for(&owner)?;
        Ok(Value::Array(labels.iter().map(|l| l.to_json()).collect()))
    }

    fn filter_users(&self, data: &Map<String, Value>) -> Result<Value, ApiError> {
        let mut params = Params::new(data);
        let key = params.required_str("key");
        let value = params.optional_str("value");
        let scope = params.optional_parsed("scope", |s| s.parse::<LabelScope>().ok());
        let from = params.optional_timestamp("from");
        let to = params.optional_timestamp("to");
        let extended = params.optional_bool("extended").unwrap_or(false);
        params.finish()?;

        let Some(key) = key else {
            return Err(ApiError::Internal("validated fields absent".to_string()));
        };
        let mut filter = LabelFilter::key(key).created_between(from, to);
        filter.value = value;
        filter.scope = scope;

        let users = filter_users(self.store.as_ref(), &filter)?
            .map(|user| user.map(|u| u.to_json(extended)))
            .collect::<Result<Vec<Value>, ApiError>>()?;
        Ok(Value::Array(users))
    }

    fn require_owner(&self, uid: &str) -> Result<User, ApiError> {
        self.store
            .find_user(uid)?
            .ok_or_else(|| ApiError::NotFound(OWNER_NOT_FOUND.to_string()))
    }
}

/// Lazily resolve the distinct owners matching `filter` to users.
///
/// Owners are taken from one snapshot; users removed since are skipped.
/// A failing lookup is yielded as an error, not skipped.
pub fn filter_users<'a, S>(
    store: &'a S,
    filter: &LabelFilter,
) -> Result<impl Iterator<Item = Result<User, ApiError>> + 'a, ApiError>
where
    S: UserDirectory + LabelStore + ?Sized,
{
    let owners = store.matching_owners(filter)?;
    Ok(owners.into_iter().filter_map(move |uid| {
        store
            .find_user(&uid)
            .map_err(ApiError::from)
            .transpose()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::model::Label;
    use crate::store::MemoryStore;
    use keygate_auth::{AuthConfig, EnvelopeBuilder};
    use ed25519_dalek::SigningKey;
    use pkcs8::{EncodePublicKey, LineEnding};

    struct Fixture {
        api: ManagementApi<MemoryStore>,
        alex: SigningKey,
        jeff: SigningKey,
    }

    fn pem(key: &SigningKey) -> String {
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    fn indent(pem: &str) -> String {
        pem.lines().map(|l| format!("      {l}\n")).collect()
    }

    fn fixture() -> Fixture {
        let alex = SigningKey::generate(&mut rand::thread_rng());
        let jeff = SigningKey::generate(&mut rand::thread_rng());
        let yaml = format!(
            "scopes:\n  write_labels:\n    permitted_signers: [alex, jeff]\n    mandatory_signers: [alex]\n  read_labels:\n    permitted_signers: [alex]\n    mandatory_signers: [alex]\n  read_users:\n    permitted_signers: [alex]\n    mandatory_signers: [alex]\nkeyring:\n  alex:\n    public_key: |\n{}  jeff:\n    public_key: |\n{}",
            indent(&pem(&alex)),
            indent(&pem(&jeff)),
        );
        let context = AuthConfig::from_yaml(&yaml, ".")
            .unwrap()
            .build_context()
            .unwrap();
        let store = MemoryStore::new();
        store
            .insert_user(User::pending("ID1", "one@example.com"))
            .unwrap();
        Fixture {
            api: ManagementApi::new(Arc::new(context), Arc::new(store)),
            alex,
            jeff,
        }
    }

    impl Fixture {
        fn envelope(&self, data: Value, signers: &[&str]) -> SignedEnvelope {
            let mut builder = EnvelopeBuilder::new(&json!({ "data": data })).unwrap();
            for signer in signers {
                let key = match *signer {
                    "alex" => &self.alex,
                    _ => &self.jeff,
                };
                builder = builder.sign(*signer, key);
            }
            builder.build()
        }
    }

    #[test]
    fn test_create_then_list() {
        let f = fixture();
        let data = json!({ "owner": "ID1", "key": "email", "value": "verified" });
        let response = f.api.handle("labels.create", &f.envelope(data, &["alex"]));
        assert_eq!(response.status, 201);
        assert_eq!(response.body.as_ref().unwrap()["scope"], "public");

        let response = f
            .api
            .handle("labels.list", &f.envelope(json!({ "owner": "ID1" }), &["alex"]));
        assert_eq!(response.status, 201);
        assert_eq!(response.body.unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_denial_runs_no_handler() {
        let f = fixture();
        let data = json!({ "owner": "ID1", "key": "email", "value": "verified" });
        let response = f.api.handle("labels.create", &f.envelope(data, &["jeff"]));
        assert_eq!(response.status, 401);
        assert_eq!(response.error_message(), Some("missing_mandatory_signer"));
        assert_eq!(f.api.store().label_count().unwrap(), 0);
    }

    #[test]
    fn test_invalid_scope_value() {
        let f = fixture();
        let data = json!({ "owner": "ID1", "key": "email", "value": "verified", "scope": "secret" });
        let response = f.api.handle("labels.create", &f.envelope(data, &["alex"]));
        assert_eq!(response.status, 422);
        assert_eq!(
            response.error_message(),
            Some("scope does not have a valid value")
        );
    }

    #[test]
    fn test_unknown_route_is_denied() {
        let f = fixture();
        let response = f
            .api
            .handle("labels.purge", &f.envelope(json!({}), &["alex"]));
        assert_eq!(response.status, 401);
        assert_eq!(response.error_message(), Some("unknown_scope"));
    }

    #[test]
    fn test_handle_request_by_path() {
        let f = fixture();
        let data = json!({ "owner": "ID1", "key": "phone", "value": "verified" });
        let response = f.api.handle_request(
            Method::Put,
            "/management/labels/",
            &f.envelope(data, &["alex", "jeff"]),
        );
        assert_eq!(response.status, 200);

        let response =
            f.api
                .handle_request(Method::Get, "/management/labels", &f.envelope(json!({}), &["alex"]));
        assert_eq!(response.status, 404);
    }

    /// Label side answers one owner; every user lookup fails.
    struct UnavailableUsers;

    impl UserDirectory for UnavailableUsers {
        fn insert_user(&self, _user: User) -> StoreResult<()> {
            Err(StoreError::lock_poisoned())
        }

        fn find_user(&self, _uid: &str) -> StoreResult<Option<User>> {
            Err(StoreError::lock_poisoned())
        }

        fn find_user_by_email(&self, _email: &str) -> StoreResult<Option<User>> {
            Err(StoreError::lock_poisoned())
        }

        fn activate_pending(&self, _uid: &str, _email: &str) -> StoreResult<User> {
            Err(StoreError::lock_poisoned())
        }
    }

    impl LabelStore for UnavailableUsers {
        fn create_label(&self, _label: NewLabel) -> StoreResult<Label> {
            Err(StoreError::lock_poisoned())
        }

        fn update_label(&self, _update: LabelUpdate) -> StoreResult<UpsertOutcome> {
            Err(StoreError::lock_poisoned())
        }

        fn delete_label(
            &self,
            _owner: &str,
            _key: &str,
            _scope: Option<LabelScope>,
        ) -> StoreResult<Label> {
            Err(StoreError::lock_poisoned())
        }

        fn labels_for(&self, _owner: &str) -> StoreResult<Vec<Label>> {
            Err(StoreError::lock_poisoned())
        }

        fn matching_owners(&self, _filter: &LabelFilter) -> StoreResult<Vec<String>> {
            Ok(vec!["ID1".to_string()])
        }
    }

    #[test]
    fn test_filter_users_surfaces_lookup_failure() {
        let result: Result<Vec<User>, ApiError> =
            filter_users(&UnavailableUsers, &LabelFilter::key("profile"))
                .unwrap()
                .collect();
        let err = result.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "internal error");
    }

    #[test]
    fn test_malformed_body() {
        let f = fixture();
        let response = f.api.handle_json("labels.create", "{not json");
        assert_eq!(response.status, 401);
        assert_eq!(response.error_message(), Some("malformed_envelope"));
    }
}
