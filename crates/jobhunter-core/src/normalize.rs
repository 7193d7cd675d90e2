//! Raw provider output → canonical [`JobRecord`]s.
//!
//! Candidates missing a title or a usable link are dropped, never
//! errors. LLM output is validated against a small JSON Schema before any
//! field is read from it.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use url::Url;

use crate::dates::{from_unix, parse_posted};
use crate::dedup::identity_key;
use crate::models::{JobRecord, ProviderMethod, RawRecord, ScrapedFields, SourceId, compute_hash};

/// Character cap for title, company and location.
pub const TEXT_CAP: usize = 200;
/// Character cap for description snippets.
pub const DESCRIPTION_CAP: usize = 500;

const TITLE_KEYS: &[&str] = &["title", "jobTitle", "job_title", "name", "position"];
const COMPANY_KEYS: &[&str] = &[
    "company",
    "companyName",
    "company_name",
    "employer",
    "hiringOrganization.name",
    "company.display_name",
    "company.name",
];
const LOCATION_KEYS: &[&str] = &[
    "location",
    "jobLocation",
    "city",
    "candidate_required_location",
    "location.display_name",
    "location.name",
    "jobLocation.address.addressLocality",
];
const URL_KEYS: &[&str] = &[
    "url",
    "link",
    "redirect_url",
    "applyUrl",
    "apply_url",
    "jobUrl",
    "job_url",
    "html_url",
];
const POSTED_KEYS: &[&str] = &[
    "posted_at",
    "date",
    "datePosted",
    "date_posted",
    "publication_date",
    "created",
    "created_at",
    "postedAt",
    "posted",
];
const DESCRIPTION_KEYS: &[&str] = &["description", "snippet", "summary", "description_snippet"];

/// JSON Schema every LLM response must satisfy before its items are read:
/// `{"jobs": [{...}, ...]}` or a bare array of objects.
pub fn job_list_schema() -> Value {
    serde_json::json!({
        "anyOf": [
            {
                "type": "object",
                "required": ["jobs"],
                "properties": {
                    "jobs": {"type": "array", "items": {"type": "object"}}
                }
            },
            {"type": "array", "items": {"type": "object"}}
        ]
    })
}

static JOB_LIST_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    jsonschema::validator_for(&job_list_schema()).expect("job list schema is valid")
});

/// Why a candidate was dropped. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationSkip {
    MissingTitle,
    MissingUrl,
    MalformedExtraction,
}

impl NormalizationSkip {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationSkip::MissingTitle => "missing title",
            NormalizationSkip::MissingUrl => "missing or invalid url",
            NormalizationSkip::MalformedExtraction => "malformed extraction output",
        }
    }
}

/// Output of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<JobRecord>,
    pub skipped: Vec<NormalizationSkip>,
}

/// Field values common to all raw shapes.
#[derive(Debug, Default)]
struct Candidate {
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    link: Option<String>,
    description: Option<String>,
}

/// Maps raw records of one source into job records.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    retrieved_at: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(retrieved_at: DateTime<Utc>) -> Self {
        Self { retrieved_at }
    }

    pub fn normalize(
        &self,
        source: &SourceId,
        method: ProviderMethod,
        raw: Vec<RawRecord>,
        base: Option<&Url>,
    ) -> Normalized {
        let mut out = Normalized::default();

        for record in raw {
            let candidates = match record {
                RawRecord::Structured(item) => vec![self.from_json(&item)],
                RawRecord::Scraped(fields) => vec![self.from_scraped(fields)],
                RawRecord::Extracted(value) => match extracted_items(value) {
                    Some(items) => items.iter().map(|item| self.from_json(item)).collect(),
                    None => {
                        tracing::warn!(%source, "LLM output failed validation, ignoring it");
                        out.skipped.push(NormalizationSkip::MalformedExtraction);
                        continue;
                    }
                },
            };

            for candidate in candidates {
                match self.finish(source, method, candidate, base) {
                    Ok(job) => out.records.push(job),
                    Err(skip) => {
                        tracing::debug!(%source, reason = skip.as_str(), "Skipping candidate");
                        out.skipped.push(skip);
                    }
                }
            }
        }

        out
    }

    fn from_json(&self, item: &Value) -> Candidate {
        Candidate {
            title: lookup_text(item, TITLE_KEYS),
            company: lookup_text(item, COMPANY_KEYS),
            location: lookup_text(item, LOCATION_KEYS),
            posted_at: lookup(item, POSTED_KEYS).and_then(|v| self.posted_from_value(v)),
            link: lookup_text(item, URL_KEYS),
            description: lookup_text(item, DESCRIPTION_KEYS),
        }
    }

    fn from_scraped(&self, fields: ScrapedFields) -> Candidate {
        Candidate {
            posted_at: fields
                .posted
                .as_deref()
                .and_then(|p| parse_posted(p, self.retrieved_at)),
            title: fields.title,
            company: fields.company,
            location: fields.location,
            link: fields.link,
            description: fields.description,
        }
    }

    fn posted_from_value(&self, value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => parse_posted(s, self.retrieved_at),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(from_unix),
            _ => None,
        }
    }

    fn finish(
        &self,
        source: &SourceId,
        method: ProviderMethod,
        candidate: Candidate,
        base: Option<&Url>,
    ) -> Result<JobRecord, NormalizationSkip> {
        let title = candidate
            .title
            .map(|t| clean_text(&t, TEXT_CAP))
            .filter(|t| !t.is_empty())
            .ok_or(NormalizationSkip::MissingTitle)?;
        let url = candidate
            .link
            .and_then(|l| resolve_link(&l, base))
            .ok_or(NormalizationSkip::MissingUrl)?;
        let company = candidate
            .company
            .map(|c| clean_text(&c, TEXT_CAP))
            .unwrap_or_default();
        let location = candidate
            .location
            .map(|l| clean_text(&l, TEXT_CAP))
            .unwrap_or_default();
        let description_snippet = candidate
            .description
            .map(|d| clean_text(&d, DESCRIPTION_CAP))
            .filter(|d| !d.is_empty());

        let id = compute_hash(&identity_key(&title, &company, &location, &url));

        Ok(JobRecord {
            id,
            title,
            company,
            location,
            url,
            source: source.clone(),
            method,
            posted_at: candidate.posted_at,
            retrieved_at: self.retrieved_at,
            description_snippet,
        })
    }
}

/// Collapse whitespace, trim, and cap at `cap` characters.
pub fn clean_text(s: &str, cap: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > cap {
        collapsed.chars().take(cap).collect::<String>().trim_end().to_string()
    } else {
        collapsed
    }
}

/// Turn a scraped or extracted link into an absolute http(s) URL without
/// fragment. Relative links are resolved against `base`.
pub fn resolve_link(link: &str, base: Option<&Url>) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    let mut url = match Url::parse(link) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(link).ok()?,
        Err(_) => return None,
    };
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Items of an LLM response, or `None` when the response is unusable.
fn extracted_items(value: Value) -> Option<Vec<Value>> {
    // Some models return the JSON document as a string.
    let value = match value {
        Value::String(s) => serde_json::from_str(&s).ok()?,
        other => other,
    };
    if !JOB_LIST_VALIDATOR.is_valid(&value) {
        return None;
    }
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("jobs") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// First value found under any of `keys`. Dotted keys walk nested objects;
/// arrays along the way contribute their first element.
fn lookup<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let mut current = item;
        for part in key.split('.') {
            if let Value::Array(items) = current {
                current = items.first()?;
            }
            current = current.get(part)?;
        }
        (!current.is_null()).then_some(current)
    })
}

fn lookup_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match lookup(item, &[key])? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(now())
    }

    fn source() -> SourceId {
        SourceId::new("Indeed")
    }

    #[test]
    fn maps_structured_items_through_aliases() {
        let item = serde_json::json!({
            "jobTitle": "  Senior   Engineer ",
            "hiringOrganization": {"name": "Acme"},
            "jobLocation": [{"address": {"addressLocality": "Bengaluru"}}],
            "datePosted": "2024-05-10T06:00:00Z",
            "applyUrl": "https://acme.example/jobs/42#apply",
            "snippet": "Build things"
        });

        let out = normalizer().normalize(
            &source(),
            ProviderMethod::Api,
            vec![RawRecord::Structured(item)],
            None,
        );

        assert_eq!(out.records.len(), 1);
        let job = &out.records[0];
        assert_eq!(job.title, "Senior Engineer");
        assert_eq!(job.company, "Acme");
        assert_eq!(job.location, "Bengaluru");
        assert_eq!(job.url, "https://acme.example/jobs/42");
        assert_eq!(job.posted_at, Some(now() - TimeDelta::hours(6)));
        assert_eq!(job.retrieved_at, now());
        assert_eq!(job.description_snippet.as_deref(), Some("Build things"));
        assert_eq!(job.method, ProviderMethod::Api);
        assert_eq!(job.id.len(), 64);
    }

    #[test]
    fn numeric_dates_are_unix_timestamps() {
        let item = serde_json::json!({
            "title": "Engineer",
            "url": "https://a.example/jobs/1",
            "created": 1_715_320_800
        });
        let out = normalizer().normalize(
            &source(),
            ProviderMethod::Api,
            vec![RawRecord::Structured(item)],
            None,
        );
        assert_eq!(
            out.records[0].posted_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn drops_candidates_missing_required_fields() {
        let raw = vec![
            RawRecord::Scraped(ScrapedFields {
                title: Some("   ".into()),
                link: Some("https://a.example/1".into()),
                ..Default::default()
            }),
            RawRecord::Scraped(ScrapedFields {
                title: Some("Engineer".into()),
                link: Some("javascript:void(0)".into()),
                ..Default::default()
            }),
            RawRecord::Scraped(ScrapedFields {
                title: Some("Engineer".into()),
                link: None,
                ..Default::default()
            }),
        ];

        let out = normalizer().normalize(&source(), ProviderMethod::BrowserScrape, raw, None);

        assert!(out.records.is_empty());
        assert_eq!(
            out.skipped,
            vec![
                NormalizationSkip::MissingTitle,
                NormalizationSkip::MissingUrl,
                NormalizationSkip::MissingUrl
            ]
        );
    }

    #[test]
    fn unparseable_date_keeps_record() {
        let raw = vec![RawRecord::Scraped(ScrapedFields {
            title: Some("Engineer".into()),
            link: Some("https://a.example/1".into()),
            posted: Some("Recently".into()),
            ..Default::default()
        })];
        let out = normalizer().normalize(&source(), ProviderMethod::BrowserScrape, raw, None);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].posted_at, None);
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("https://in.indeed.example").unwrap();
        let raw = vec![RawRecord::Scraped(ScrapedFields {
            title: Some("Engineer".into()),
            link: Some("/viewjob?jk=abc".into()),
            ..Default::default()
        })];
        let out = normalizer().normalize(&source(), ProviderMethod::BrowserScrape, raw, Some(&base));
        assert_eq!(out.records[0].url, "https://in.indeed.example/viewjob?jk=abc");
    }

    #[test]
    fn text_fields_are_capped() {
        let long = "x".repeat(5000);
        let raw = vec![RawRecord::Scraped(ScrapedFields {
            title: Some(long.clone()),
            company: Some(long.clone()),
            description: Some(long),
            link: Some("https://a.example/1".into()),
            ..Default::default()
        })];
        let out = normalizer().normalize(&source(), ProviderMethod::BrowserScrape, raw, None);
        let job = &out.records[0];
        assert_eq!(job.title.chars().count(), TEXT_CAP);
        assert_eq!(job.company.chars().count(), TEXT_CAP);
        assert_eq!(
            job.description_snippet.as_ref().unwrap().chars().count(),
            DESCRIPTION_CAP
        );
    }

    #[test]
    fn llm_envelope_items_are_validated_individually() {
        let value = serde_json::json!({"jobs": [
            {"title": "Engineer", "company": "Acme", "url": "https://a.example/1", "posted": "2 hours ago"},
            {"title": "Analyst", "company": "Acme"}
        ]});
        let out = normalizer().normalize(
            &source(),
            ProviderMethod::LlmExtraction,
            vec![RawRecord::Extracted(value)],
            None,
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].posted_at, Some(now() - TimeDelta::hours(2)));
        assert_eq!(out.skipped, vec![NormalizationSkip::MissingUrl]);
    }

    #[test]
    fn llm_bare_array_and_stringified_json_are_accepted() {
        let array = serde_json::json!([{"title": "Engineer", "url": "https://a.example/1"}]);
        let stringified = Value::String(
            r#"{"jobs": [{"title": "Engineer", "url": "https://a.example/2"}]}"#.into(),
        );
        let out = normalizer().normalize(
            &source(),
            ProviderMethod::LlmExtraction,
            vec![RawRecord::Extracted(array), RawRecord::Extracted(stringified)],
            None,
        );
        assert_eq!(out.records.len(), 2);
    }

    #[test]
    fn malformed_llm_output_yields_zero_records() {
        let raw = vec![
            RawRecord::Extracted(serde_json::json!({"results": "none"})),
            RawRecord::Extracted(serde_json::json!({"jobs": "Engineer at Acme"})),
            RawRecord::Extracted(serde_json::json!(["Engineer", "Analyst"])),
            RawRecord::Extracted(Value::String("Sorry, I cannot help".into())),
        ];
        let out = normalizer().normalize(&source(), ProviderMethod::LlmExtraction, raw, None);
        assert!(out.records.is_empty());
        assert_eq!(out.skipped.len(), 4);
        assert!(
            out.skipped
                .iter()
                .all(|s| *s == NormalizationSkip::MalformedExtraction)
        );
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a\n\t b  ", 100), "a b");
        assert_eq!(clean_text("abcdef", 3), "abc");
    }
}
