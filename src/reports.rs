//! Read-only roll-ups over companies, postings and applications.
//!
//! Each counter is a grouped `COUNT` in the database, merged per company in
//! memory; every company is present in [`company_counts`] even when all of
//! its counters are zero.

use std::cmp::Reverse;
use std::collections::HashMap;

use diesel::{
    dsl::{count_distinct, count_star},
    pg::PgConnection,
    prelude::*,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::lower,
    models::Company,
    schema::{applications, companies, postings, users},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompanyCounts {
    pub company_id: Uuid,
    pub name: String,
    pub priority: i32,
    pub posting_count: i64,
    pub open_posting_count: i64,
    pub application_count: i64,
    pub reported_application_count: i64,
    /// Open postings that nobody has applied to yet.
    pub open_unapplied_count: i64,
    /// Open postings plus applications.
    pub available_count: i64,
    pub completion_percentage: f64,
}

impl CompanyCounts {
    fn finish(mut self) -> Self {
        self.available_count = self.open_posting_count + self.application_count;
        self.completion_percentage =
            completion_percentage(self.reported_application_count, self.open_unapplied_count);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserLeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub first_name: String,
    /// Distinct companies applied to.
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyLeaderboardEntry {
    pub company_id: Uuid,
    pub name: String,
    pub application_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCompanyCount {
    pub company_id: Uuid,
    pub name: String,
    pub count: i64,
    pub count_in_jurisdiction: i64,
}

/// Share of a company's work that is finished, as a percentage:
/// `reported / (reported + open_unapplied) * 100`, and 0 when both are zero.
pub fn completion_percentage(reported: i64, open_unapplied: i64) -> f64 {
    let denominator = reported + open_unapplied;
    if denominator <= 0 {
        return 0.0;
    }
    reported as f64 * 100.0 / denominator as f64
}

pub fn company_counts(conn: &mut PgConnection) -> QueryResult<Vec<CompanyCounts>> {
    let company_rows: Vec<(Uuid, String, i32)> = companies::table
        .select((companies::id, companies::name, companies::priority))
        .order((lower(companies::name).asc(), companies::id.asc()))
        .load(conn)?;

    let posting_counts = count_map(
        postings::table
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );
    let open_counts = count_map(
        postings::table
            .filter(postings::closed.is_null())
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );
    let open_unapplied_counts = count_map(
        postings::table
            .filter(postings::closed.is_null())
            .filter(postings::id.ne_all(applications::table.select(applications::posting_id)))
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );
    let application_counts = count_map(
        applications::table
            .inner_join(postings::table)
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );
    let reported_counts = count_map(
        applications::table
            .inner_join(postings::table)
            .filter(applications::reported.is_not_null())
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );

    let count = |map: &HashMap<Uuid, i64>, id: &Uuid| map.get(id).copied().unwrap_or_default();
    Ok(company_rows
        .into_iter()
        .map(|(id, name, priority)| {
            CompanyCounts {
                posting_count: count(&posting_counts, &id),
                open_posting_count: count(&open_counts, &id),
                application_count: count(&application_counts, &id),
                reported_application_count: count(&reported_counts, &id),
                open_unapplied_count: count(&open_unapplied_counts, &id),
                company_id: id,
                name,
                priority,
                ..Default::default()
            }
            .finish()
        })
        .collect())
}

/// Completion percentage for one company. Unknown ids report as not found.
pub fn completion_for_company(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<f64> {
    companies::table
        .find(company_id)
        .select(companies::id)
        .first::<Uuid>(conn)?;

    let company_postings = postings::table
        .filter(postings::company_id.eq(company_id))
        .select(postings::id);

    let reported: i64 = applications::table
        .filter(applications::posting_id.eq_any(company_postings))
        .filter(applications::reported.is_not_null())
        .select(count_star())
        .first(conn)?;

    let open_unapplied: i64 = postings::table
        .filter(postings::company_id.eq(company_id))
        .filter(postings::closed.is_null())
        .filter(postings::id.ne_all(applications::table.select(applications::posting_id)))
        .select(count_star())
        .first(conn)?;

    Ok(completion_percentage(reported, open_unapplied))
}

/// Users ranked by how many distinct companies they applied to.
pub fn user_application_leaderboard(
    conn: &mut PgConnection,
) -> QueryResult<Vec<UserLeaderboardEntry>> {
    let per_user = count_map(
        applications::table
            .inner_join(postings::table)
            .group_by(applications::user_id)
            .select((applications::user_id, count_distinct(postings::company_id)))
            .load(conn)?,
    );
    if per_user.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: Vec<Uuid> = per_user.keys().copied().collect();
    let user_rows: Vec<(Uuid, String, String)> = users::table
        .filter(users::id.eq_any(user_ids))
        .select((users::id, users::username, users::first_name))
        .load(conn)?;

    let mut entries: Vec<UserLeaderboardEntry> = user_rows
        .into_iter()
        .map(|(user_id, username, first_name)| UserLeaderboardEntry {
            count: per_user.get(&user_id).copied().unwrap_or_default(),
            user_id,
            username,
            first_name,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.username.cmp(&b.username))
    });
    Ok(entries)
}

/// Companies ranked by applications from every user. Companies without
/// applications are left out.
pub fn company_application_leaderboard(
    conn: &mut PgConnection,
) -> QueryResult<Vec<CompanyLeaderboardEntry>> {
    let per_company = count_map(
        applications::table
            .inner_join(postings::table)
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );

    let companies = load_companies(conn, per_company.keys().copied().collect())?;
    let mut entries: Vec<CompanyLeaderboardEntry> = companies
        .into_iter()
        .map(|company| CompanyLeaderboardEntry {
            application_count: per_company.get(&company.id).copied().unwrap_or_default(),
            company_id: company.id,
            name: company.name,
        })
        .collect();
    entries.sort_by_key(|entry| (Reverse(entry.application_count), entry.name.to_lowercase()));
    Ok(entries)
}

/// Per company, how many of the user's applications it received and how many
/// of those were for in-jurisdiction postings.
pub fn user_application_companies(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> QueryResult<Vec<UserCompanyCount>> {
    let totals = count_map(
        applications::table
            .inner_join(postings::table)
            .filter(applications::user_id.eq(user_id))
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );
    let in_jurisdiction = count_map(
        applications::table
            .inner_join(postings::table)
            .filter(applications::user_id.eq(user_id))
            .filter(postings::in_jurisdiction.eq(true))
            .group_by(postings::company_id)
            .select((postings::company_id, count_star()))
            .load(conn)?,
    );

    let companies = load_companies(conn, totals.keys().copied().collect())?;
    let mut entries: Vec<UserCompanyCount> = companies
        .into_iter()
        .map(|company| UserCompanyCount {
            count: totals.get(&company.id).copied().unwrap_or_default(),
            count_in_jurisdiction: in_jurisdiction.get(&company.id).copied().unwrap_or_default(),
            company_id: company.id,
            name: company.name,
        })
        .collect();
    entries.sort_by_key(|entry| (Reverse(entry.count), entry.name.to_lowercase()));
    Ok(entries)
}

fn count_map(rows: Vec<(Uuid, i64)>) -> HashMap<Uuid, i64> {
    rows.into_iter().collect()
}

fn load_companies(conn: &mut PgConnection, ids: Vec<Uuid>) -> QueryResult<Vec<Company>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    companies::table.filter(companies::id.eq_any(ids)).load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_zero_without_any_work() {
        assert_eq!(completion_percentage(0, 0), 0.0);
    }

    #[test]
    fn completion_is_full_when_nothing_is_left_open() {
        assert_eq!(completion_percentage(4, 0), 100.0);
    }

    #[test]
    fn completion_is_ratio_of_reported_to_all_work() {
        assert_eq!(completion_percentage(1, 3), 25.0);
        assert_eq!(completion_percentage(0, 5), 0.0);
    }

    #[test]
    fn finish_derives_available_and_completion() {
        let counts = CompanyCounts {
            open_posting_count: 3,
            application_count: 2,
            reported_application_count: 1,
            open_unapplied_count: 1,
            ..Default::default()
        }
        .finish();
        assert_eq!(counts.available_count, 5);
        assert_eq!(counts.completion_percentage, 50.0);
    }
}
