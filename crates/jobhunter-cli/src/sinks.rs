use std::io::Write;
use std::path::PathBuf;

use clap::ValueEnum;
use jobhunter_core::error::AppError;
use jobhunter_core::models::RunResult;
use jobhunter_core::traits::ResultSink;

const CSV_HEADER: [&str; 7] = [
    "source",
    "method",
    "title",
    "company",
    "location",
    "posted_at",
    "url",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed run result
    Json,
    /// One row per job
    Csv,
}

/// Writes the run result to a file, or to stdout when no path is given.
#[derive(Debug, Clone)]
pub struct OutputSink {
    format: OutputFormat,
    path: Option<PathBuf>,
}

impl OutputSink {
    pub fn new(format: OutputFormat, path: Option<PathBuf>) -> Self {
        Self { format, path }
    }

    fn render(&self, result: &RunResult) -> Result<Vec<u8>, AppError> {
        match self.format {
            OutputFormat::Json => render_json(result),
            OutputFormat::Csv => render_csv(result),
        }
    }
}

impl ResultSink for OutputSink {
    async fn deliver(&self, result: &RunResult) -> Result<(), AppError> {
        let bytes = self.render(result)?;
        match &self.path {
            Some(path) => {
                tokio::fs::write(path, &bytes).await.map_err(|e| {
                    AppError::SinkError(format!("Failed to write {}: {e}", path.display()))
                })?;
                tracing::info!(path = %path.display(), jobs = result.jobs.len(), "Results written");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

fn render_json(result: &RunResult) -> Result<Vec<u8>, AppError> {
    let mut bytes = serde_json::to_vec_pretty(result)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn render_csv(result: &RunResult) -> Result<Vec<u8>, AppError> {
    let csv_error = |e: csv::Error| AppError::SinkError(format!("CSV error: {e}"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;
    for job in &result.jobs {
        let posted_at = job.posted_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        writer
            .write_record([
                job.source.as_str(),
                job.method.as_str(),
                job.title.as_str(),
                job.company.as_str(),
                job.location.as_str(),
                posted_at.as_str(),
                job.url.as_str(),
            ])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::SinkError(format!("CSV error: {}", e.error())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use jobhunter_core::models::{JobRecord, ProviderMethod, SourceId};
    use uuid::Uuid;

    fn result() -> RunResult {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let job = |title: &str, posted| JobRecord {
            id: "id".into(),
            title: title.into(),
            company: "Acme, Inc.".into(),
            location: "Bengaluru".into(),
            url: "https://acme.example/jobs/1".into(),
            source: SourceId::new("Indeed"),
            method: ProviderMethod::BrowserScrape,
            posted_at: posted,
            retrieved_at: at,
            description_snippet: None,
        };
        RunResult {
            run_id: Uuid::nil(),
            started_at: at,
            finished_at: at,
            jobs: vec![job("Backend Engineer", Some(at)), job("Data Engineer", None)],
            source_status: Default::default(),
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_job() {
        let text = String::from_utf8(render_csv(&result()).unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "source,method,title,company,location,posted_at,url");
        assert_eq!(
            lines[1],
            "Indeed,BROWSER_SCRAPE,Backend Engineer,\"Acme, Inc.\",Bengaluru,2024-05-10T12:00:00+00:00,https://acme.example/jobs/1"
        );
        assert!(lines[2].contains(",Bengaluru,,https://"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn json_round_trips_the_result() {
        let bytes = render_json(&result()).unwrap();
        let parsed: RunResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, result());
    }

    #[tokio::test]
    async fn writes_to_the_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        let sink = OutputSink::new(OutputFormat::Csv, Some(path.clone()));

        sink.deliver(&result()).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("source,method"));
        assert!(written.contains("Data Engineer"));
    }

    #[tokio::test]
    async fn unwritable_path_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(
            OutputFormat::Json,
            Some(dir.path().join("missing").join("jobs.json")),
        );
        assert!(matches!(
            sink.deliver(&result()).await,
            Err(AppError::SinkError(_))
        ));
    }
}
