// CLI commands: submit-and-poll, health.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use kiln_common::languages::Language;
use kiln_common::types::{JobResult, JobStatus};

#[derive(Debug, Deserialize)]
struct Submitted {
    job_id: String,
}

pub async fn submit(
    api: &str,
    language: &str,
    file: &Path,
    problem: Option<i32>,
    timeout_secs: u64,
) -> Result<()> {
    // Fail locally on a typo'd language instead of burning a round trip.
    let _lang: Language = language.parse()?;

    let code = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut body = serde_json::json!({
        "language": language,
        "code": code,
    });
    if let Some(problem_id) = problem {
        body["probId"] = problem_id.into();
    }

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{api}/execute"))
        .json(&body)
        .send()
        .await
        .context("Failed to reach the dispatch API")?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        bail!("Submission rejected ({status}): {detail}");
    }

    let submitted: Submitted = response
        .json()
        .await
        .context("Malformed response from /execute")?;
    println!("Submitted job {}", submitted.job_id);

    let result = poll(api, &client, &submitted.job_id, timeout_secs).await?;
    print_verdict(&result);

    if matches!(result.status, JobStatus::Success | JobStatus::Accept) {
        Ok(())
    } else {
        bail!("Job finished with status {}", result.status)
    }
}

/// Poll /result/{id} until the status leaves `pending` or the budget runs
/// out. The interval backs off so long jobs do not hammer the API.
async fn poll(
    api: &str,
    client: &reqwest::Client,
    job_id: &str,
    timeout_secs: u64,
) -> Result<JobResult> {
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let mut interval = Duration::from_millis(500);

    loop {
        if Instant::now() >= deadline {
            bail!("Timed out waiting for job {job_id} after {timeout_secs}s");
        }

        let response = client
            .get(format!("{api}/result/{job_id}"))
            .send()
            .await
            .context("Failed to reach the dispatch API")?;

        if !response.status().is_success() {
            bail!("Result lookup failed: {}", response.status());
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("Malformed response from /result")?;

        if value["status"] == "pending" {
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(Duration::from_secs(4));
            continue;
        }

        return serde_json::from_value(value).context("Malformed job result");
    }
}

fn print_verdict(result: &JobResult) {
    println!("Status:   {}", result.status);
    println!("Time:     {}ms", result.exec_time_ms);

    if let (Some(passed), Some(total)) = (result.tests_passed, result.tests_total) {
        println!("Tests:    {passed}/{total}");
    }
    if !result.output.is_empty() {
        println!("Output:\n{}", result.output);
    }
    if !result.error.is_empty() {
        println!("Error:\n{}", result.error);
    }
}

pub async fn health(api: &str) -> Result<()> {
    let response = reqwest::get(format!("{api}/health"))
        .await
        .context("Failed to reach the dispatch API")?;

    if response.status().is_success() {
        println!("API at {api} is healthy");
        Ok(())
    } else {
        bail!("Health check failed: {}", response.status())
    }
}
