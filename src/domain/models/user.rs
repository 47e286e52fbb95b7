use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Founder,
    CoFounder,
    Team,
    Mentor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Founder => "FOUNDER",
            Role::CoFounder => "CO_FOUNDER",
            Role::Team => "TEAM",
            Role::Mentor => "MENTOR",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Founder => "Founder",
            Role::CoFounder => "Co-Founder",
            Role::Team => "Team Member",
            Role::Mentor => "Mentor",
        }
    }

    /// Founder or Co-Founder.
    pub fn is_leadership(&self) -> bool {
        matches!(self, Role::Founder | Role::CoFounder)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FOUNDER" => Ok(Role::Founder),
            "CO_FOUNDER" => Ok(Role::CoFounder),
            "TEAM" => Ok(Role::Team),
            "MENTOR" => Ok(Role::Mentor),
            other => Err(AppError::InvalidArgument(format!("Unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOn {
    #[serde(default)]
    pub name: String,
    pub price: f64,
}

/// Profile document stored under `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub startup_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
}

impl UserProfile {
    pub fn new(uid: String, email: String, display_name: String, role: Role, startup_id: String) -> Self {
        Self {
            uid,
            email,
            display_name,
            role,
            startup_id,
            created_at: Utc::now(),
            photo_url: None,
            bio: None,
            status: None,
            plan: None,
            price: None,
            add_ons: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == Some(SubscriptionStatus::Active)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == Some(SubscriptionStatus::Cancelled)
    }

    pub fn add_on_total(&self) -> f64 {
        self.add_ons.iter().map(|a| a.price).sum()
    }
}

/// Fields a user may change on their own profile.
pub const SELF_EDITABLE_FIELDS: &[&str] = &["displayName", "photoURL", "bio", "skills"];
/// Billing fields a Founder may change on members of their startup.
pub const BILLING_FIELDS: &[&str] = &["status", "plan", "price", "addOns"];

/// The authenticated caller, resolved from the session and the stored profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub startup_id: String,
    pub photo_url: Option<String>,
}

impl From<&UserProfile> for Principal {
    fn from(profile: &UserProfile) -> Self {
        Self {
            uid: profile.uid.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            role: profile.role,
            startup_id: profile.startup_id.clone(),
            photo_url: profile.photo_url.clone(),
        }
    }
}

/// Who performs a store operation. `System` is reserved for internal flows
/// (signup, invitation redemption, notification fan-out, background workers).
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    User(Principal),
    System,
}

impl Actor {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Actor::User(p) => Some(p),
            Actor::System => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Actor::User(p) => &p.uid,
            Actor::System => "system",
        }
    }
}
