//! Field-level validation shared by the API handlers and CSV import.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

const ACCEPTED_SCHEMES: &[&str] = &["http", "https"];

static LINKEDIN_JOB_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/jobs/view/[0-9]+/?").expect("valid linkedin job path pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Value must be a list")]
    InvalidList,
    #[error("Value must be a list of URLs as strings")]
    InvalidStrings,
    #[error("Value must be a list of valid URLs")]
    InvalidUrls,
    #[error("{field} must be a valid URL")]
    InvalidUrl { field: &'static str },
    #[error("A posting containing URL {0} already exists")]
    DuplicateUrl(String),
    #[error("{0} must not be empty")]
    Required(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("invalid {field} '{value}'")]
    InvalidChoice { field: &'static str, value: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn is_valid_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(parsed) => {
            ACCEPTED_SCHEMES.contains(&parsed.scheme())
                && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// Validates a JSON URL-array field. `null` and `[]` both mean "no URLs".
pub fn validate_url_array(value: &Value) -> ValidationResult<Vec<String>> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(ValidationError::InvalidList),
    };

    let strings = items
        .iter()
        .map(|item| item.as_str().map(str::trim))
        .collect::<Option<Vec<&str>>>()
        .ok_or(ValidationError::InvalidStrings)?;

    validate_url_list(strings)
}

pub fn validate_url_list<'a, I>(urls: I) -> ValidationResult<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let urls: Vec<String> = urls.into_iter().map(|url| url.trim().to_string()).collect();
    if urls.iter().all(|url| is_valid_url(url)) {
        Ok(urls)
    } else {
        Err(ValidationError::InvalidUrls)
    }
}

pub fn require_url(field: &'static str, value: &str) -> ValidationResult<String> {
    let trimmed = require_text(field, value, 2048)?;
    if !is_valid_url(&trimmed) {
        return Err(ValidationError::InvalidUrl { field });
    }
    Ok(trimmed)
}

pub fn require_text(field: &'static str, value: &str, max: usize) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required(field));
    }
    limit_text(field, trimmed, max)
}

pub fn limit_text(field: &'static str, value: &str, max: usize) -> ValidationResult<String> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_string())
}

/// Canonicalizes a posting URL so the same listing reached through tracking
/// links maps to one stored value.
pub fn normalize_posting_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let Ok(mut parsed) = Url::parse(&with_scheme) else {
        return with_scheme;
    };

    let host = parsed.host_str().unwrap_or_default().to_string();
    match host.as_str() {
        "linkedin.com" | "www.linkedin.com" if LINKEDIN_JOB_PATH.is_match(parsed.path()) => {
            if !parsed.path().ends_with('/') {
                let path = format!("{}/", parsed.path());
                parsed.set_path(&path);
            }
            parsed.set_query(None);
            parsed.to_string()
        }
        "jobs.ashbyhq.com" | "jobs.lever.co" => {
            let last_segment = parsed
                .path()
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default();
            if Uuid::parse_str(last_segment).is_ok() {
                parsed.set_query(None);
                parsed.to_string()
            } else {
                with_scheme
            }
        }
        _ => with_scheme,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_array_accepts_null_and_empty() {
        assert_eq!(validate_url_array(&Value::Null), Ok(vec![]));
        assert_eq!(validate_url_array(&json!([])), Ok(vec![]));
    }

    #[test]
    fn url_array_distinguishes_failure_kinds() {
        assert_eq!(
            validate_url_array(&json!("https://example.com")),
            Err(ValidationError::InvalidList)
        );
        assert_eq!(
            validate_url_array(&json!(["https://example.com", 3])),
            Err(ValidationError::InvalidStrings)
        );
        assert_eq!(
            validate_url_array(&json!(["https://example.com", "not a url"])),
            Err(ValidationError::InvalidUrls)
        );
    }

    #[test]
    fn url_array_returns_trimmed_urls() {
        let urls = validate_url_array(&json!([" https://example.com/a ", "http://b.example"]))
            .expect("valid urls");
        assert_eq!(urls, vec!["https://example.com/a", "http://b.example"]);
    }

    #[test]
    fn error_messages_name_the_problem() {
        assert_eq!(
            ValidationError::DuplicateUrl("https://x.example/1".into()).to_string(),
            "A posting containing URL https://x.example/1 already exists"
        );
        assert_eq!(ValidationError::InvalidList.to_string(), "Value must be a list");
    }

    #[test]
    fn rejects_urls_without_host_or_scheme() {
        assert!(is_valid_url("https://example.com/jobs/1"));
        assert!(!is_valid_url("example.com/jobs/1"));
        assert!(!is_valid_url("mailto:someone@example.com"));
    }

    #[test]
    fn accepts_only_web_schemes() {
        assert!(is_valid_url("http://example.com/jobs/1"));
        assert!(!is_valid_url("ftp://example.com/jobs/1"));
        assert!(!is_valid_url("ftps://example.com/jobs/1"));
        assert_eq!(
            validate_url_array(&json!(["ftp://example.com/jobs/1"])),
            Err(ValidationError::InvalidUrls)
        );
    }

    #[test]
    fn normalizes_linkedin_tracking_links() {
        let url = "https://www.linkedin.com/jobs/view/3943736060/\
                   ?alternateChannel=search&refId=Ok%2BKJCffiXY5f1tWg%2Blafw%3D%3D\
                   &trk=d_flagship3_search_srp_jobs";
        assert_eq!(
            normalize_posting_url(url),
            "https://www.linkedin.com/jobs/view/3943736060/"
        );
    }

    #[test]
    fn adds_trailing_slash_to_linkedin_job_path() {
        assert_eq!(
            normalize_posting_url("linkedin.com/jobs/view/42?trk=x"),
            "https://linkedin.com/jobs/view/42/"
        );
    }

    #[test]
    fn strips_query_from_lever_uuid_postings() {
        assert_eq!(
            normalize_posting_url(
                "https://jobs.lever.co/acme/0b4e7f0a-4a1b-4f5e-9d59-1c2b3d4e5f60?lever-source=x"
            ),
            "https://jobs.lever.co/acme/0b4e7f0a-4a1b-4f5e-9d59-1c2b3d4e5f60"
        );
        assert_eq!(
            normalize_posting_url("https://jobs.lever.co/acme/apply?lever-source=x"),
            "https://jobs.lever.co/acme/apply?lever-source=x"
        );
    }

    #[test]
    fn leaves_other_urls_untouched() {
        assert_eq!(normalize_posting_url("  "), "");
        assert_eq!(
            normalize_posting_url("https://example.com/careers?id=7"),
            "https://example.com/careers?id=7"
        );
        assert_eq!(
            normalize_posting_url("example.com/careers"),
            "https://example.com/careers"
        );
    }
}
