use serde::{Deserialize, Serialize};
use chrono::Utc;

fn default_stage() -> String {
    "Idea".to_string()
}

fn default_industry() -> String {
    "Tech".to_string()
}

fn default_team_size() -> i64 {
    1
}

/// Tenant root stored under `startups/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Startup {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default = "default_industry")]
    pub industry: String,
    #[serde(default)]
    pub founded_date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_team_size")]
    pub team_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl Startup {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            stage: default_stage(),
            industry: default_industry(),
            founded_date: Utc::now().to_rfc3339(),
            description: String::new(),
            website: String::new(),
            location: String::new(),
            team_size: 1,
            logo_url: None,
        }
    }
}

/// Fields Founder/Co-Founder may patch through `updateStartup`.
pub const EDITABLE_STARTUP_FIELDS: &[&str] = &[
    "name", "stage", "industry", "foundedDate", "description", "website", "location", "teamSize", "logoUrl",
];
