//! Management API for Keygate.
//!
//! Handlers for user labels, registration and account confirmation. Every label route is
//! authorized through [`keygate_auth::AuthorizationGateway`] before it
//! touches the store:
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_auth::AuthConfig;
//! use keygate_management::{ManagementApi, MemoryStore};
//!
//! # fn example(body: &str) -> anyhow::Result<()> {
//! let config = AuthConfig::from_env()?;
//! let api = ManagementApi::new(Arc::new(config.build_context()?), Arc::new(MemoryStore::new()));
//!
//! let response = api.handle_json("labels.create", body);
//! println!("{} {}", response.status, response.body_string());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod identity;
pub mod labels;
pub mod model;
pub mod password;
pub mod response;
pub mod store;
pub mod validation;

pub use error::{ApiError, StoreError, StoreResult};
pub use identity::IdentityService;
pub use labels::{filter_users, ManagementApi, LABEL_ROUTES};
pub use model::{
    Label, LabelFilter, LabelScope, LabelUpdate, NewLabel, Profile, UpsertOutcome, User,
    UserState,
};
pub use password::{hash_password, password_matches};
pub use response::ApiResponse;
pub use store::{LabelStore, MemoryStore, UserDirectory};
pub use validation::{FieldViolation, FieldViolations, Params, ViolationKind};
