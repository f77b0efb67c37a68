//! Users and labels as seen by the management API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Label visibility.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LabelScope {
    #[default]
    Public,
    Private,
}

impl LabelScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelScope::Public => "public",
            LabelScope::Private => "private",
        }
    }
}

impl fmt::Display for LabelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(LabelScope::Public),
            "private" => Ok(LabelScope::Private),
            other => Err(format!("unknown label scope: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Pending,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub state: UserState,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    /// PHC-format argon2 digest; never rendered.
    #[serde(default, skip_serializing)]
    pub password_digest: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A new, not yet confirmed user.
    pub fn pending(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            state: UserState::Pending,
            profiles: Vec::new(),
            password_digest: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn with_password_digest(mut self, digest: impl Into<String>) -> Self {
        self.password_digest = Some(digest.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.state == UserState::Active
    }

    /// Response representation; `extended` joins the user's profiles.
    pub fn to_json(&self, extended: bool) -> Value {
        let mut value = json!({
            "uid": self.uid,
            "email": self.email,
            "state": self.state,
            "created_at": self.created_at.to_rfc3339(),
        });
        if extended {
            value["profiles"] = json!(self.profiles);
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Owning user's uid.
    pub owner: String,
    pub key: String,
    pub value: String,
    pub scope: LabelScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Label {
    pub fn to_json(&self) -> Value {
        json!({
            "key": self.key,
            "value": self.value,
            "scope": self.scope,
            "description": self.description,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

/// Input to `LabelStore::create_label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLabel {
    pub owner: String,
    pub key: String,
    pub value: String,
    pub scope: LabelScope,
    pub description: Option<String>,
}

/// Input to `LabelStore::update_label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelUpdate {
    pub owner: String,
    pub key: String,
    pub value: String,
    /// Selects between same-key labels of different scopes; `None` takes the
    /// first inserted. Also the scope of a label created by `replace`.
    pub scope: Option<LabelScope>,
    pub description: Option<String>,
    /// Create the label when it does not exist.
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated(Label),
    Created(Label),
}

impl UpsertOutcome {
    pub fn label(&self) -> &Label {
        match self {
            UpsertOutcome::Updated(label) | UpsertOutcome::Created(label) => label,
        }
    }

    pub fn into_label(self) -> Label {
        match self {
            UpsertOutcome::Updated(label) | UpsertOutcome::Created(label) => label,
        }
    }
}

/// Predicates for `filter_users`. Every given predicate must hold for the
/// same label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub key: String,
    pub value: Option<String>,
    /// `None` matches either scope; a given scope never matches the other.
    pub scope: Option<LabelScope>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
}

impl LabelFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            scope: None,
            from: None,
            to: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_scope(mut self, scope: LabelScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn matches(&self, label: &Label) -> bool {
        label.key == self.key
            && self.value.as_ref().is_none_or(|v| *v == label.value)
            && self.scope.is_none_or(|s| s == label.scope)
            && self.from.is_none_or(|from| label.created_at >= from)
            && self.to.is_none_or(|to| label.created_at < to)
    }
}
