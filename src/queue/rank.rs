//! Per-company windowing of queue candidates, kept free of I/O so the
//! ranking rules can be tested directly.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::models::{Company, Posting};

/// How many ranked postings each company keeps in the capped queue.
pub const SLOTS_PER_COMPANY: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub posting_id: Uuid,
    pub company_id: Uuid,
    pub has_application: bool,
    pub in_jurisdiction: bool,
    pub created_at: NaiveDateTime,
}

/// Applied first, then in-jurisdiction, then newest. Posting id breaks the
/// remaining ties so the window is deterministic.
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.has_application
        .cmp(&a.has_application)
        .then_with(|| b.in_jurisdiction.cmp(&a.in_jurisdiction))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.posting_id.cmp(&b.posting_id))
}

/// Groups candidates by company, keeps the top `slots` of each group by
/// [`rank_order`], and returns the ids of the kept postings that still lack
/// an application, sorted ascending.
pub fn capped_unapplied<I>(candidates: I, slots: usize) -> Vec<Uuid>
where
    I: IntoIterator<Item = Candidate>,
{
    let mut by_company: BTreeMap<Uuid, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_company
            .entry(candidate.company_id)
            .or_default()
            .push(candidate);
    }

    let mut posting_ids: Vec<Uuid> = by_company
        .into_values()
        .flat_map(|mut group| {
            group.sort_by(rank_order);
            group.truncate(slots);
            group
                .into_iter()
                .filter(|candidate| !candidate.has_application)
                .map(|candidate| candidate.posting_id)
        })
        .collect();
    posting_ids.sort();
    posting_ids
}

#[derive(Debug, Clone)]
pub struct CompanyQueueCount {
    pub company: Company,
    pub count: i64,
    pub count_in_jurisdiction: i64,
}

/// Rolls queue rows up per company. Rows are expected in queue order; the
/// result is sorted by priority and count, and companies that tie on both
/// keep the order in which they first appeared.
pub fn count_by_company<I>(rows: I) -> Vec<CompanyQueueCount>
where
    I: IntoIterator<Item = (Posting, Company)>,
{
    let mut counts: Vec<CompanyQueueCount> = Vec::new();
    for (posting, company) in rows {
        let position = match counts
            .iter()
            .position(|entry| entry.company.id == company.id)
        {
            Some(position) => position,
            None => {
                counts.push(CompanyQueueCount {
                    company,
                    count: 0,
                    count_in_jurisdiction: 0,
                });
                counts.len() - 1
            }
        };
        let entry = &mut counts[position];
        entry.count += 1;
        if posting.in_jurisdiction {
            entry.count_in_jurisdiction += 1;
        }
    }

    counts.retain(|entry| entry.count > 0);
    counts.sort_by_key(|entry| (Reverse(entry.company.priority), Reverse(entry.count)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid timestamp")
    }

    fn candidate(
        company_id: Uuid,
        has_application: bool,
        in_jurisdiction: bool,
        day: u32,
    ) -> Candidate {
        Candidate {
            posting_id: Uuid::new_v4(),
            company_id,
            has_application,
            in_jurisdiction,
            created_at: at(day),
        }
    }

    fn company(name: &str, priority: Priority) -> Company {
        Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            hq: String::new(),
            url: format!("https://{name}.example"),
            careers_url: format!("https://{name}.example/careers"),
            careers_urls: Vec::new(),
            employees_est: String::new(),
            employees_est_source: String::new(),
            how_found: String::new(),
            priority: priority.as_i32(),
            notes: String::new(),
            filed: None,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    fn posting(company: &Company, in_jurisdiction: bool) -> Posting {
        Posting {
            id: Uuid::new_v4(),
            company_id: company.id,
            url: format!("https://jobs.example/{}", Uuid::new_v4()),
            job_board_urls: Vec::new(),
            title: "Engineer".to_string(),
            closed: None,
            closed_note: String::new(),
            location: "Remote".to_string(),
            in_jurisdiction,
            jurisdiction: String::new(),
            notes: String::new(),
            created_at: at(2),
            updated_at: at(2),
        }
    }

    #[test]
    fn applied_postings_rank_before_open_ones() {
        let company = Uuid::new_v4();
        let applied = candidate(company, true, false, 1);
        let open_in_jurisdiction = candidate(company, false, true, 20);
        assert_eq!(rank_order(&applied, &open_in_jurisdiction), Ordering::Less);
    }

    #[test]
    fn newer_postings_rank_first_within_same_flags() {
        let company = Uuid::new_v4();
        let older = candidate(company, false, true, 1);
        let newer = candidate(company, false, true, 9);
        assert_eq!(rank_order(&newer, &older), Ordering::Less);
    }

    #[test]
    fn caps_each_company_at_two_slots() {
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        let mut candidates: Vec<Candidate> =
            (1..=5).map(|day| candidate(busy, false, false, day)).collect();
        let quiet_posting = candidate(quiet, false, false, 3);
        candidates.push(quiet_posting.clone());

        let newest_busy: Vec<Uuid> = {
            let mut busy_ranked: Vec<&Candidate> = candidates
                .iter()
                .filter(|candidate| candidate.company_id == busy)
                .collect();
            busy_ranked.sort_by(|a, b| rank_order(a, b));
            busy_ranked.iter().take(2).map(|c| c.posting_id).collect()
        };

        let kept = capped_unapplied(candidates, SLOTS_PER_COMPANY);
        assert_eq!(kept.len(), 3);
        assert!(kept.contains(&quiet_posting.posting_id));
        for posting_id in newest_busy {
            assert!(kept.contains(&posting_id));
        }
    }

    #[test]
    fn applied_postings_consume_slots_but_are_not_returned() {
        let company = Uuid::new_v4();
        let applied = candidate(company, true, false, 1);
        let first_open = candidate(company, false, true, 5);
        let second_open = candidate(company, false, false, 6);

        let kept = capped_unapplied(
            vec![applied.clone(), first_open.clone(), second_open.clone()],
            SLOTS_PER_COMPANY,
        );
        assert_eq!(kept, vec![first_open.posting_id]);
        assert!(!kept.contains(&applied.posting_id));
    }

    #[test]
    fn fully_applied_company_contributes_nothing() {
        let company = Uuid::new_v4();
        let kept = capped_unapplied(
            vec![
                candidate(company, true, false, 1),
                candidate(company, true, true, 2),
                candidate(company, false, true, 3),
            ],
            SLOTS_PER_COMPANY,
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn capping_is_deterministic() {
        let company = Uuid::new_v4();
        let candidates: Vec<Candidate> =
            (0..6).map(|_| candidate(company, false, false, 4)).collect();
        let first = capped_unapplied(candidates.clone(), SLOTS_PER_COMPANY);
        let mut reversed = candidates;
        reversed.reverse();
        assert_eq!(first, capped_unapplied(reversed, SLOTS_PER_COMPANY));
    }

    #[test]
    fn counts_roll_up_by_priority_then_count() {
        let initech = company("Initech", Priority::High);
        let initrode = company("Initrode", Priority::Normal);
        let globex = company("Globex", Priority::Normal);

        let rows = vec![
            (posting(&initech, true), initech.clone()),
            (posting(&globex, false), globex.clone()),
            (posting(&initrode, true), initrode.clone()),
            (posting(&initrode, false), initrode.clone()),
        ];

        let counts = count_by_company(rows);
        let summary: Vec<(&str, i64, i64)> = counts
            .iter()
            .map(|entry| {
                (
                    entry.company.name.as_str(),
                    entry.count,
                    entry.count_in_jurisdiction,
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![("Initech", 1, 1), ("Initrode", 2, 1), ("Globex", 1, 0)]
        );
    }

    #[test]
    fn ties_keep_queue_order() {
        let alpha = company("alpha", Priority::Low);
        let beta = company("Beta", Priority::Low);
        let rows = vec![
            (posting(&alpha, false), alpha.clone()),
            (posting(&beta, false), beta.clone()),
        ];
        let names: Vec<String> = count_by_company(rows)
            .into_iter()
            .map(|entry| entry.company.name)
            .collect();
        assert_eq!(names, vec!["alpha", "Beta"]);
    }
}
