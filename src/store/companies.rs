use chrono::{NaiveDateTime, Utc};
use diesel::{dsl::count_star, pg::PgConnection, prelude::*};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::{
    models::{Company, NewCompany, Priority},
    schema::{companies, postings},
    validation::{limit_text, require_text, require_url, validate_url_list, ValidationResult},
};

const DUPLICATE_COMPANY: &str = "a company with this name, URL or careers URL already exists";

/// Unvalidated company fields as they arrive from a request body or a CSV row.
#[derive(Debug, Clone, Default)]
pub struct CompanyDraft {
    pub name: String,
    pub hq: String,
    pub url: String,
    pub careers_url: String,
    pub careers_urls: Vec<String>,
    pub employees_est: String,
    pub employees_est_source: String,
    pub how_found: String,
    pub priority: Priority,
    pub notes: String,
    pub filed: Option<NaiveDateTime>,
}

impl CompanyDraft {
    pub fn validate(self) -> ValidationResult<NewCompany> {
        Ok(NewCompany {
            id: Uuid::new_v4(),
            name: require_text("name", &self.name, 500)?,
            hq: limit_text("hq", self.hq.trim(), 250)?,
            url: require_url("url", &self.url)?,
            careers_url: require_url("careers_url", &self.careers_url)?,
            careers_urls: validate_url_list(self.careers_urls.iter().map(String::as_str))?,
            employees_est: limit_text("employees_est", self.employees_est.trim(), 100)?,
            employees_est_source: limit_text(
                "employees_est_source",
                self.employees_est_source.trim(),
                500,
            )?,
            how_found: limit_text("how_found", self.how_found.trim(), 250)?,
            priority: self.priority.as_i32(),
            notes: self.notes,
            filed: self.filed,
        })
    }
}

#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = companies)]
pub struct CompanyChangeset {
    pub name: Option<String>,
    pub hq: Option<String>,
    pub url: Option<String>,
    pub careers_url: Option<String>,
    pub careers_urls: Option<Vec<String>>,
    pub employees_est: Option<String>,
    pub employees_est_source: Option<String>,
    pub how_found: Option<String>,
    pub priority: Option<i32>,
    pub notes: Option<String>,
    pub filed: Option<Option<NaiveDateTime>>,
}

impl CompanyChangeset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.hq.is_none()
            && self.url.is_none()
            && self.careers_url.is_none()
            && self.careers_urls.is_none()
            && self.employees_est.is_none()
            && self.employees_est_source.is_none()
            && self.how_found.is_none()
            && self.priority.is_none()
            && self.notes.is_none()
            && self.filed.is_none()
    }

    /// Turns a full company row into a changeset that overwrites every field.
    pub fn replacing_with(new: NewCompany) -> Self {
        Self {
            name: Some(new.name),
            hq: Some(new.hq),
            url: Some(new.url),
            careers_url: Some(new.careers_url),
            careers_urls: Some(new.careers_urls),
            employees_est: Some(new.employees_est),
            employees_est_source: Some(new.employees_est_source),
            how_found: Some(new.how_found),
            priority: Some(new.priority),
            notes: Some(new.notes),
            filed: Some(new.filed),
        }
    }
}

pub fn find(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<Company> {
    companies::table.find(company_id).first(conn)
}

pub fn find_by_name(conn: &mut PgConnection, name: &str) -> QueryResult<Option<Company>> {
    companies::table
        .filter(companies::name.eq(name))
        .first(conn)
        .optional()
}

pub fn create_company(conn: &mut PgConnection, new_company: &NewCompany) -> StoreResult<Company> {
    diesel::insert_into(companies::table)
        .values(new_company)
        .get_result(conn)
        .map_err(|err| StoreError::on_unique_violation(err, DUPLICATE_COMPANY))
}

pub fn update_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    changes: &CompanyChangeset,
) -> StoreResult<Company> {
    let existing = find(conn, company_id)?;
    if changes.is_empty() {
        return Ok(existing);
    }

    let now = Utc::now().naive_utc();
    diesel::update(companies::table.find(company_id))
        .set((changes, companies::updated_at.eq(now)))
        .get_result(conn)
        .map_err(|err| StoreError::on_unique_violation(err, DUPLICATE_COMPANY))
}

pub fn delete_company(conn: &mut PgConnection, company_id: Uuid) -> StoreResult<()> {
    let posting_count: i64 = postings::table
        .filter(postings::company_id.eq(company_id))
        .select(count_star())
        .first(conn)?;

    if posting_count > 0 {
        return Err(StoreError::InUse(
            "cannot delete company that still has postings".to_string(),
        ));
    }

    let deleted = diesel::delete(companies::table.find(company_id)).execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::Database(diesel::result::Error::NotFound));
    }
    Ok(())
}
