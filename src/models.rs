use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Company importance. Stored as an integer so that a descending sort puts
/// the most important companies first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub const fn as_i32(self) -> i32 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            3 => Some(Priority::High),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Some(Priority::Low),
            "normal" | "2" => Some(Priority::Normal),
            "high" | "3" => Some(Priority::High),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonaFide {
    High,
    Medium,
    Low,
    NeedLicense,
}

impl BonaFide {
    pub const fn as_i32(self) -> i32 {
        match self {
            BonaFide::High => 1,
            BonaFide::Medium => 2,
            BonaFide::Low => 3,
            BonaFide::NeedLicense => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(BonaFide::High),
            2 => Some(BonaFide::Medium),
            3 => Some(BonaFide::Low),
            4 => Some(BonaFide::NeedLicense),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "1" => Some(BonaFide::High),
            "medium" | "2" => Some(BonaFide::Medium),
            "low" | "3" => Some(BonaFide::Low),
            "need_license" | "4" => Some(BonaFide::NeedLicense),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            BonaFide::High => "high",
            BonaFide::Medium => "medium",
            BonaFide::Low => "low",
            BonaFide::NeedLicense => "need_license",
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_staff(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

#[derive(Debug, Default, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = api_keys)]
#[diesel(primary_key(key))]
#[diesel(belongs_to(User))]
pub struct ApiKey {
    pub key: String,
    pub user_id: Uuid,
    pub comment: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_keys)]
pub struct NewApiKey {
    pub key: String,
    pub user_id: Uuid,
    pub comment: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub hq: String,
    pub url: String,
    pub careers_url: String,
    pub careers_urls: Vec<String>,
    pub employees_est: String,
    pub employees_est_source: String,
    pub how_found: String,
    pub priority: i32,
    pub notes: String,
    pub filed: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Company {
    pub fn priority(&self) -> Priority {
        Priority::from_i32(self.priority).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
    pub hq: String,
    pub url: String,
    pub careers_url: String,
    pub careers_urls: Vec<String>,
    pub employees_est: String,
    pub employees_est_source: String,
    pub how_found: String,
    pub priority: i32,
    pub notes: String,
    pub filed: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = postings)]
#[diesel(belongs_to(Company))]
pub struct Posting {
    pub id: Uuid,
    pub company_id: Uuid,
    pub url: String,
    pub job_board_urls: Vec<String>,
    pub title: String,
    pub closed: Option<NaiveDateTime>,
    pub closed_note: String,
    pub location: String,
    pub in_jurisdiction: bool,
    pub jurisdiction: String,
    pub notes: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = postings)]
pub struct NewPosting {
    pub id: Uuid,
    pub company_id: Uuid,
    pub url: String,
    pub job_board_urls: Vec<String>,
    pub title: String,
    pub closed: Option<NaiveDateTime>,
    pub closed_note: String,
    pub location: String,
    pub in_jurisdiction: bool,
    pub jurisdiction: String,
    pub notes: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = applications)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Posting))]
pub struct Application {
    pub id: Uuid,
    pub user_id: Uuid,
    pub posting_id: Uuid,
    pub bona_fide: Option<i32>,
    pub applied: NaiveDateTime,
    pub reported: Option<NaiveDateTime>,
    pub notes: String,
}

impl Application {
    pub fn bona_fide(&self) -> Option<BonaFide> {
        self.bona_fide.and_then(BonaFide::from_i32)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = applications)]
pub struct NewApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub posting_id: Uuid,
    pub bona_fide: Option<i32>,
    pub applied: NaiveDateTime,
    pub reported: Option<NaiveDateTime>,
    pub notes: String,
}
