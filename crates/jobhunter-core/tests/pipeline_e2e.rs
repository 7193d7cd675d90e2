use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use jobhunter_core::dedup::FilterConfig;
use jobhunter_core::reporter::SilentReporter;
use jobhunter_core::testutil::{MemorySink, MockProvider, RecordingReporter, scraped};
use jobhunter_core::{
    FallbackChain, Pipeline, PipelineSettings, ProviderError, ProviderMethod, RawRecord,
    SearchCriteria, SourceId, SourceProvider,
};

fn run_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

fn settings(keywords: &[&str]) -> PipelineSettings {
    let keywords: BTreeSet<String> = keywords.iter().map(|k| k.to_string()).collect();
    PipelineSettings {
        criteria: SearchCriteria {
            keywords: keywords.clone(),
            locations: BTreeSet::new(),
            max_results: 25,
        },
        filter: FilterConfig::new(
            &keywords,
            &BTreeSet::new(),
            &BTreeMap::new(),
            TimeDelta::hours(24),
        ),
        per_provider_timeout: Duration::from_secs(5),
        max_concurrent_sources: 3,
    }
}

fn chain(source: &str, providers: Vec<MockProvider>) -> FallbackChain {
    FallbackChain::new(
        source,
        providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn SourceProvider>)
            .collect(),
    )
}

fn indeed_browser_records() -> Vec<RawRecord> {
    vec![
        scraped(
            "Backend Engineer",
            "Acme",
            "Bengaluru",
            Some("3 hours ago"),
            "/viewjob?jk=a1",
        ),
        scraped(
            "Data Engineer",
            "Globex",
            "Pune",
            Some("5 hours ago"),
            "/viewjob?jk=b2",
        ),
        // Same posting as above, seen again with a tracking parameter and an
        // older date that is still inside the window.
        scraped(
            "Data Engineer",
            "Globex",
            "Pune",
            Some("6 hours ago"),
            "/viewjob?jk=b2&utm_source=feed",
        ),
    ]
}

#[tokio::test]
async fn indeed_falls_back_to_browser_and_dedups() {
    let api = MockProvider::failing(
        ProviderMethod::Api,
        ProviderError::RateLimited("HTTP 429".into()),
    );
    let browser = MockProvider::succeeding(ProviderMethod::BrowserScrape, indeed_browser_records())
        .with_base_url("https://in.indeed.com/jobs?q=engineer");
    let sink = MemorySink::new();
    let reporter = RecordingReporter::new();

    let pipeline = Pipeline::new(
        vec![chain("Indeed", vec![api.clone(), browser.clone()])],
        settings(&["engineer"]),
        sink.clone(),
        reporter.clone(),
    );
    let result = pipeline.run_at(run_start()).await.unwrap();

    let status = &result.source_status[&SourceId::new("Indeed")];
    assert!(status.succeeded);
    assert_eq!(status.method_used, Some(ProviderMethod::BrowserScrape));
    assert_eq!(status.attempts.len(), 2);
    assert_eq!(api.calls(), 1);
    assert_eq!(browser.calls(), 1);

    assert_eq!(result.jobs.len(), 2);
    for job in &result.jobs {
        assert!(job.title.to_lowercase().contains("engineer"));
        let posted = job.posted_at.expect("scraped dates parse");
        assert!(run_start() - posted <= TimeDelta::hours(24));
        assert!(job.url.starts_with("https://in.indeed.com/viewjob?jk="));
    }
    assert_eq!(result.jobs[0].title, "Backend Engineer");
    assert_eq!(result.jobs[1].url, "https://in.indeed.com/viewjob?jk=b2");
    assert_eq!(
        result.jobs[1].posted_at,
        Some(run_start() - TimeDelta::hours(5))
    );

    assert_eq!(sink.last(), Some(result));
    assert_eq!(reporter.count("provider_failed Indeed API RATE_LIMITED"), 1);
    assert_eq!(reporter.count("merge_completed 3 1 0 0 2"), 1);
    assert_eq!(browser.seen_criteria(), vec![settings(&["engineer"]).criteria]);
}

#[tokio::test]
async fn exhausted_source_is_isolated_and_reported() {
    let pipeline = Pipeline::new(
        vec![
            chain(
                "Naukri",
                vec![
                    MockProvider::failing(
                        ProviderMethod::Api,
                        ProviderError::AuthFailed("HTTP 401".into()),
                    ),
                    MockProvider::failing(
                        ProviderMethod::LlmExtraction,
                        ProviderError::Timeout(5),
                    ),
                ],
            ),
            chain(
                "Indeed",
                vec![MockProvider::succeeding(
                    ProviderMethod::Api,
                    vec![scraped(
                        "Engineer",
                        "Acme",
                        "Pune",
                        Some("1 hour ago"),
                        "https://in.indeed.com/viewjob?jk=z9",
                    )],
                )],
            ),
            chain(
                "Quiet",
                vec![MockProvider::succeeding(ProviderMethod::Api, vec![])],
            ),
        ],
        settings(&[]),
        MemorySink::new(),
        SilentReporter,
    );

    let result = pipeline.run_at(run_start()).await.unwrap();

    let naukri = &result.source_status[&SourceId::new("Naukri")];
    assert!(!naukri.succeeded);
    assert_eq!(naukri.error, Some(ProviderError::Timeout(5)));
    assert_eq!(naukri.attempts.len(), 2);

    let quiet = &result.source_status[&SourceId::new("Quiet")];
    assert!(quiet.succeeded);
    assert_eq!(quiet.record_count, 0);

    assert_eq!(result.jobs.len(), 1);
    assert_eq!(result.failed_sources().count(), 1);
}

#[tokio::test]
async fn output_is_deterministic_across_completion_orders() {
    let records_a = vec![
        scraped("Engineer I", "Acme", "Pune", Some("1 hour ago"), "https://a.example/jobs/1"),
        scraped("Engineer II", "Acme", "Pune", None, "https://a.example/jobs/2"),
    ];
    let records_b = vec![
        scraped("Engineer I", "ACME", "pune", Some("1 hour ago"), "https://A.example/jobs/1"),
        scraped("Engineer III", "Initech", "Pune", Some("4 hours ago"), "https://b.example/jobs/3"),
    ];

    let run = |delay_a: u64, delay_b: u64| {
        let a = MockProvider::succeeding(ProviderMethod::Api, records_a.clone())
            .with_delay(Duration::from_millis(delay_a));
        let b = MockProvider::succeeding(ProviderMethod::Api, records_b.clone())
            .with_delay(Duration::from_millis(delay_b));
        Pipeline::new(
            vec![chain("Alpha", vec![a]), chain("Beta", vec![b])],
            settings(&["engineer"]),
            MemorySink::new(),
            SilentReporter,
        )
    };

    let first = run(5, 40).run_at(run_start()).await.unwrap();
    let second = run(40, 5).run_at(run_start()).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.jobs).unwrap(),
        serde_json::to_string(&second.jobs).unwrap()
    );
    assert_eq!(first.jobs.len(), 3);
    let grouped: Vec<_> = first
        .by_source()
        .into_iter()
        .map(|(source, jobs)| (source.as_str().to_string(), jobs.len()))
        .collect();
    assert_eq!(grouped, vec![("Alpha".to_string(), 2), ("Beta".to_string(), 1)]);
}
