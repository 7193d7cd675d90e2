//! Merge stage: identity-based dedup, recency window, keyword/location
//! filtering and presentation order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use url::Url;

use crate::models::{JobRecord, SourceId};

/// Identity key of a posting.
///
/// A canonical URL identifies the posting on its own; otherwise the
/// lowercased `(title, company, location)` tuple does.
pub fn identity_key(title: &str, company: &str, location: &str, url: &str) -> String {
    match canonical_url(url) {
        Some(url) => format!("url:{url}"),
        None => format!(
            "tuple:{}|{}|{}",
            fold(title),
            fold(company),
            fold(location)
        ),
    }
}

/// Normalized form of `raw` if it can identify a posting: absolute http(s)
/// with a path beyond `/`. Scheme and host lowercased, path and query left
/// as they are; no fragment, no `utm_*` params, trailing slash trimmed.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    if url.path().trim_end_matches('/').is_empty() {
        return None;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    // `Url` already lowercases scheme and host.
    Some(url.as_str().trim_end_matches('/').to_string())
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Criteria applied after dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    keywords: Vec<String>,
    locations: Vec<String>,
    recency_window: TimeDelta,
}

impl FilterConfig {
    /// `aliases` maps a location to equivalent spellings; a configured
    /// location matching either side of an entry pulls in the whole entry.
    pub fn new(
        keywords: &BTreeSet<String>,
        locations: &BTreeSet<String>,
        aliases: &BTreeMap<String, Vec<String>>,
        recency_window: TimeDelta,
    ) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| fold(k))
            .filter(|k| !k.is_empty())
            .collect();

        let mut expanded = BTreeSet::new();
        for location in locations.iter().map(|l| fold(l)).filter(|l| !l.is_empty()) {
            for (key, values) in aliases {
                let key = fold(key);
                let values: Vec<String> = values.iter().map(|v| fold(v)).collect();
                if key == location || values.contains(&location) {
                    expanded.insert(key);
                    expanded.extend(values.into_iter().filter(|v| !v.is_empty()));
                }
            }
            expanded.insert(location);
        }

        Self {
            keywords,
            locations: expanded.into_iter().collect(),
            recency_window,
        }
    }

    pub fn recency_window(&self) -> TimeDelta {
        self.recency_window
    }

    /// Locations after alias expansion, lowercased.
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    /// A window reaching past the representable range makes nothing stale.
    fn is_stale(&self, job: &JobRecord, run_start: DateTime<Utc>) -> bool {
        let Some(cutoff) = run_start.checked_sub_signed(self.recency_window) else {
            return false;
        };
        job.posted_at.is_some_and(|posted| posted < cutoff)
    }

    fn matches(&self, job: &JobRecord) -> bool {
        let keyword_ok = self.keywords.is_empty() || {
            let title = job.title.to_lowercase();
            let description = job
                .description_snippet
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_default();
            self.keywords
                .iter()
                .any(|k| title.contains(k.as_str()) || description.contains(k.as_str()))
        };
        let location_ok = self.locations.is_empty() || {
            let location = job.location.to_lowercase();
            self.locations.iter().any(|l| location.contains(l.as_str()))
        };
        keyword_ok && location_ok
    }
}

/// Counts reported by [`merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub input: usize,
    pub duplicates_removed: usize,
    pub stale_removed: usize,
    pub criteria_removed: usize,
    pub output: usize,
}

/// Merge records from all sources into the final presentation order.
///
/// The result does not depend on the order of `records`.
pub fn merge(
    records: Vec<JobRecord>,
    filter: &FilterConfig,
    run_start: DateTime<Utc>,
) -> (Vec<JobRecord>, MergeStats) {
    let mut stats = MergeStats {
        input: records.len(),
        ..Default::default()
    };

    let mut groups: BTreeMap<String, JobRecord> = BTreeMap::new();
    for job in records {
        let key = identity_key(&job.title, &job.company, &job.location, &job.url);
        match groups.get_mut(&key) {
            Some(kept) => {
                stats.duplicates_removed += 1;
                if preference(&job, kept) == Ordering::Less {
                    *kept = job;
                }
            }
            None => {
                groups.insert(key, job);
            }
        }
    }

    let mut jobs = Vec::with_capacity(groups.len());
    for job in groups.into_values() {
        if filter.is_stale(&job, run_start) {
            stats.stale_removed += 1;
        } else if !filter.matches(&job) {
            stats.criteria_removed += 1;
        } else {
            jobs.push(job);
        }
    }

    jobs.sort_by(recency_order);
    group_by_source(&mut jobs);

    stats.output = jobs.len();
    (jobs, stats)
}

/// Total order among duplicates; `Less` means `a` is kept.
fn preference(a: &JobRecord, b: &JobRecord) -> Ordering {
    newest_first(a.posted_at, b.posted_at)
        .then_with(|| a.method.priority().cmp(&b.method.priority()))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.company.cmp(&b.company))
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.description_snippet.cmp(&b.description_snippet))
}

fn recency_order(a: &JobRecord, b: &JobRecord) -> Ordering {
    newest_first(a.posted_at, b.posted_at)
        .then_with(|| a.method.priority().cmp(&b.method.priority()))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.url.cmp(&b.url))
}

// Dated before undated, later before earlier.
fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable regroup: each source's block sits where its freshest record was.
fn group_by_source(jobs: &mut [JobRecord]) {
    let mut first_seen: HashMap<SourceId, usize> = HashMap::new();
    for (i, job) in jobs.iter().enumerate() {
        first_seen.entry(job.source.clone()).or_insert(i);
    }
    jobs.sort_by_key(|job| first_seen[&job.source]);
}
