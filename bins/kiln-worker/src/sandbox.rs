//! Per-job sandbox driver.
//!
//! Owns the full lifecycle of one executor container: stage the source in
//! the code store, launch under resource limits, run the free-run or
//! graded path, and produce a terminal `JobResult`. Verdicts are values,
//! never errors: every failure path ends in a result record, and the
//! container, per-job directory, and code-store entry are released on all
//! of them via drop guards.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use kiln_common::languages::LanguageSpec;
use kiln_common::settings::Settings;
use kiln_common::types::{Job, JobResult};

use crate::code_store::CodeStore;

const MEMORY_LIMIT_BYTES: i64 = 100 * 1024 * 1024;
const NANO_CPUS: i64 = 500_000_000; // 0.5 cores
const PIDS_LIMIT: i64 = 50;

/// A free run that dies after this long is reported as a timeout rather
/// than an execution error.
const RUN_TIMEOUT_MS: i64 = 5_000;

/// Wall-clock bound for a single graded exec. A hung test case fails at
/// its index instead of wedging the worker.
const EXEC_TIMEOUT: Duration = Duration::from_secs(5);

/// Mount point of the per-job test-data directory inside the container.
const TESTDATA_MOUNT: &str = "/app/testdata";

/// Container names derive from the job ID so operators can correlate
/// crashes and stale-container cleanup stays deterministic.
pub fn container_name(job_id: &str) -> String {
    format!("code-exec-{job_id}")
}

/// Force-removes the container when the driver unwinds, whatever the path.
struct ContainerGuard {
    docker: Docker,
    name: String,
}

impl ContainerGuard {
    fn new(docker: Docker, name: String) -> Self {
        Self { docker, name }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&name, Some(options)).await {
                warn!(container = %name, error = %e, "Failed to remove sandbox container");
            }
        });
    }
}

/// Removes the per-job test-data directory on unwind.
struct JobDirGuard {
    path: PathBuf,
}

impl Drop for JobDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.path.display(), error = %e, "Failed to remove job directory");
            }
        }
    }
}

/// Drive one job to a terminal verdict.
pub async fn execute(
    docker: &Docker,
    store: &CodeStore,
    settings: &Settings,
    job: &Job,
) -> JobResult {
    let started = Instant::now();
    let spec = job.language.spec();

    // Lease the source for the duration of the job; the executor fetches
    // it back through the loopback endpoint.
    let lease = store.lease(job.code.clone());
    let code_url = settings.code_url(lease.code_id());
    let name = container_name(&job.id);

    // A worker that crashed mid-job may have left a container behind
    // under the same name. Clearing it is best effort.
    let _ = docker
        .remove_container(
            &name,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await;

    let result = if job.is_graded() {
        run_graded(docker, settings, job, spec, &code_url, &name, &started).await
    } else {
        run_free(docker, settings, job, spec, &code_url, &name, &started).await
    };

    // The guards inside the run paths remove the container on unwind; this
    // awaited pass makes the removal observable before the verdict is.
    let _ = docker
        .remove_container(
            &name,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await;

    result
}

fn elapsed_ms(started: &Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

fn base_host_config(settings: &Settings, bind: Option<String>) -> HostConfig {
    HostConfig {
        memory: Some(MEMORY_LIMIT_BYTES),
        nano_cpus: Some(NANO_CPUS),
        pids_limit: Some(PIDS_LIMIT),
        network_mode: Some(settings.sandbox_network.clone()),
        binds: bind.map(|b| vec![b]),
        ..Default::default()
    }
}

/// Free run: one container, entry point aimed at the executor, combined
/// output captured after exit.
async fn run_free(
    docker: &Docker,
    settings: &Settings,
    job: &Job,
    spec: LanguageSpec,
    code_url: &str,
    name: &str,
    started: &Instant,
) -> JobResult {
    let env = vec![
        format!("CODE_URL={code_url}"),
        format!("CODE_LANGUAGE={}", job.language),
    ];

    let config = Config::<String> {
        image: Some(spec.image.to_string()),
        entrypoint: Some(vec![spec.executor_path.to_string()]),
        env: Some(env),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        host_config: Some(base_host_config(settings, None)),
        ..Default::default()
    };

    let create_options = CreateContainerOptions {
        name,
        platform: None,
    };
    if let Err(e) = docker.create_container(Some(create_options), config).await {
        return JobResult::execution_error(
            &job.id,
            format!("Failed to start sandbox container: {e}"),
            elapsed_ms(started),
        );
    }
    let _container = ContainerGuard::new(docker.clone(), name.to_string());

    if let Err(e) = docker
        .start_container(name, None::<StartContainerOptions<String>>)
        .await
    {
        return JobResult::execution_error(
            &job.id,
            format!("Failed to start sandbox container: {e}"),
            elapsed_ms(started),
        );
    }

    // Wait for the executor to exit, then harvest its combined output.
    let mut wait_stream = docker.wait_container(
        name,
        Some(WaitContainerOptions {
            condition: "not-running",
        }),
    );
    let exit_code = match wait_stream.next().await {
        Some(Ok(response)) => response.status_code,
        // A non-zero exit surfaces as a wait "error" carrying the code.
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
        Some(Err(e)) => {
            return JobResult::execution_error(
                &job.id,
                format!("Failed waiting for sandbox container: {e}"),
                elapsed_ms(started),
            );
        }
        None => {
            return JobResult::execution_error(
                &job.id,
                "Sandbox container vanished before exiting".to_string(),
                elapsed_ms(started),
            );
        }
    };

    let output = collect_logs(docker, name).await;
    let elapsed = elapsed_ms(started);

    match classify_run(exit_code == 0, elapsed) {
        RunVerdict::Success => JobResult::success(&job.id, output, elapsed),
        RunVerdict::Timeout => JobResult::timeout(&job.id, elapsed),
        RunVerdict::Error => JobResult::execution_error(
            &job.id,
            format!("Execution error: exit status {exit_code}\nOutput: {output}"),
            elapsed,
        ),
    }
}

/// Graded run: one long-lived container, one exec per test vector, first
/// failure short-circuits.
async fn run_graded(
    docker: &Docker,
    settings: &Settings,
    job: &Job,
    spec: LanguageSpec,
    code_url: &str,
    name: &str,
    started: &Instant,
) -> JobResult {
    if job.inputs.len() != job.outputs.len() {
        return JobResult::execution_error(
            &job.id,
            "Mismatched input/output count".to_string(),
            elapsed_ms(started),
        );
    }

    let job_dir = PathBuf::from(&settings.shared_data_dir).join(format!("codeexec-{}", job.id));
    if let Err(e) = tokio::fs::create_dir_all(&job_dir).await {
        return JobResult::execution_error(
            &job.id,
            format!("Failed to create job directory: {e}"),
            elapsed_ms(started),
        );
    }
    let _job_dir_guard = JobDirGuard {
        path: job_dir.clone(),
    };

    let env = vec![
        format!("CODE_URL={code_url}"),
        format!("CODE_LANGUAGE={}", job.language),
        format!("DIRTXT={TESTDATA_MOUNT}"),
    ];
    let bind = format!("{}:{}", job_dir.display(), TESTDATA_MOUNT);

    // The image's own entry point is replaced with an idle process; each
    // test case execs the executor into the running container.
    let config = Config::<String> {
        image: Some(spec.image.to_string()),
        entrypoint: Some(vec![]),
        cmd: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "sleep 3600".to_string(),
        ]),
        env: Some(env),
        host_config: Some(base_host_config(settings, Some(bind))),
        ..Default::default()
    };

    let create_options = CreateContainerOptions {
        name,
        platform: None,
    };
    if let Err(e) = docker.create_container(Some(create_options), config).await {
        return JobResult::execution_error(
            &job.id,
            format!("Failed to start sandbox container: {e}"),
            elapsed_ms(started),
        );
    }
    let _container = ContainerGuard::new(docker.clone(), name.to_string());

    if let Err(e) = docker
        .start_container(name, None::<StartContainerOptions<String>>)
        .await
    {
        return JobResult::execution_error(
            &job.id,
            format!("Failed to start sandbox container: {e}"),
            elapsed_ms(started),
        );
    }

    let total = job.inputs.len();
    for (index, input) in job.inputs.iter().enumerate() {
        let expected = &job.outputs[index];

        // Stage the input where DIRTXT points; it is also piped on stdin
        // below so executors can pick either channel.
        if let Err(e) = tokio::fs::write(job_dir.join("input.txt"), input).await {
            return JobResult::execution_error(
                &job.id,
                format!("Failed to stage test input: {e}"),
                elapsed_ms(started),
            );
        }

        let capture = match run_test_exec(docker, name, spec.executor_path, input).await {
            Ok(capture) => capture,
            // An exec that cannot be created or attached grades the same
            // as a dirty program exit: it fails this index, like the
            // per-exec timeout below.
            Err(e) => {
                warn!(job_id = %job.id, test = index + 1, error = %e, "Test exec failed");
                ExecCapture {
                    output: String::new(),
                    exit_ok: false,
                }
            }
        };

        match judge_case(index, input, expected, &capture.output, capture.exit_ok) {
            CaseOutcome::Passed => {
                debug!(job_id = %job.id, test = index + 1, "Test passed");
            }
            CaseOutcome::Failed(failure) => {
                return JobResult::fail(
                    &job.id,
                    failure.report(),
                    index as u32,
                    total as u32,
                    elapsed_ms(started),
                );
            }
        }
    }

    JobResult::accept(&job.id, total as u32, elapsed_ms(started))
}

struct ExecCapture {
    output: String,
    exit_ok: bool,
}

/// Run the executor once inside the container, feeding one test input.
async fn run_test_exec(
    docker: &Docker,
    container: &str,
    executor_path: &str,
    stdin_payload: &str,
) -> anyhow::Result<ExecCapture> {
    let exec = docker
        .create_exec(
            container,
            CreateExecOptions::<String> {
                cmd: Some(vec![executor_path.to_string()]),
                attach_stdin: Some(true),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let capture = async {
        let mut collected = String::new();
        let results = docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    ..Default::default()
                }),
            )
            .await?;

        if let StartExecResults::Attached {
            mut output,
            mut input,
        } = results
        {
            input.write_all(stdin_payload.as_bytes()).await.ok();
            input.shutdown().await.ok();

            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                        collected.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Error reading exec output");
                        break;
                    }
                }
            }
        }

        let inspect = docker.inspect_exec(&exec.id).await?;
        Ok::<ExecCapture, anyhow::Error>(ExecCapture {
            output: collected,
            exit_ok: inspect.exit_code == Some(0),
        })
    };

    match tokio::time::timeout(EXEC_TIMEOUT, capture).await {
        Ok(result) => result,
        Err(_) => {
            warn!(container = %container, "Test exec exceeded time limit");
            Ok(ExecCapture {
                output: String::new(),
                exit_ok: false,
            })
        }
    }
}

async fn collect_logs(docker: &Docker, name: &str) -> String {
    let options = LogsOptions::<String> {
        stdout: true,
        stderr: true,
        follow: false,
        ..Default::default()
    };

    let mut stream = docker.logs(name, Some(options));
    let mut combined = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                combined.push_str(&String::from_utf8_lossy(&message));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(container = %name, error = %e, "Error reading container logs");
                break;
            }
        }
    }
    combined
}

enum RunVerdict {
    Success,
    Timeout,
    Error,
}

/// Free-run classification: a clean exit succeeds; a dirty exit that took
/// at least the run budget is a timeout, anything faster is an error.
fn classify_run(exit_ok: bool, elapsed_ms: i64) -> RunVerdict {
    if exit_ok {
        RunVerdict::Success
    } else if elapsed_ms >= RUN_TIMEOUT_MS {
        RunVerdict::Timeout
    } else {
        RunVerdict::Error
    }
}

enum CaseOutcome {
    Passed,
    Failed(CaseFailure),
}

struct CaseFailure {
    index: usize,
    input: String,
    expected: String,
    got: String,
}

impl CaseFailure {
    fn report(&self) -> String {
        format!(
            "Test #{} failed\nInput: {:?}\nExpected: {:?}\nGot: {:?}",
            self.index + 1,
            self.input,
            self.expected,
            self.got
        )
    }
}

/// Grading contract: both sides are trimmed of leading and trailing
/// whitespace and compared exactly. A non-zero exec exit fails the case
/// regardless of its output.
fn judge_case(
    index: usize,
    input: &str,
    expected: &str,
    actual: &str,
    exit_ok: bool,
) -> CaseOutcome {
    let expected_trim = expected.trim();
    let actual_trim = actual.trim();

    if exit_ok && actual_trim == expected_trim {
        CaseOutcome::Passed
    } else {
        CaseOutcome::Failed(CaseFailure {
            index,
            input: input.to_string(),
            expected: expected_trim.to_string(),
            got: actual_trim.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmed_match_passes() {
        assert!(matches!(
            judge_case(0, "1\n", "1", "  1  \n", true),
            CaseOutcome::Passed
        ));
        assert!(matches!(
            judge_case(0, "", "hello world", "hello world", true),
            CaseOutcome::Passed
        ));
    }

    #[test]
    fn interior_whitespace_still_matters() {
        assert!(matches!(
            judge_case(0, "", "a b", "a  b", true),
            CaseOutcome::Failed(_)
        ));
    }

    #[test]
    fn nonzero_exit_fails_even_with_matching_output() {
        let outcome = judge_case(2, "5\n", "120", "120", false);
        match outcome {
            CaseOutcome::Failed(failure) => {
                assert_eq!(failure.index, 2);
                assert_eq!(failure.got, "120");
            }
            CaseOutcome::Passed => panic!("dirty exit must not pass"),
        }
    }

    #[test]
    fn failure_report_names_one_based_test_and_quotes_values() {
        let outcome = judge_case(1, "2\n", "9", "2\n", true);
        let CaseOutcome::Failed(failure) = outcome else {
            panic!("mismatch must fail");
        };

        let report = failure.report();
        assert!(report.starts_with("Test #2 failed\n"));
        assert!(report.contains("Input: \"2\\n\""));
        assert!(report.contains("Expected: \"9\""));
        assert!(report.contains("Got: \"2\""));
    }

    #[test]
    fn clean_exit_is_success_regardless_of_elapsed() {
        assert!(matches!(classify_run(true, 10), RunVerdict::Success));
        assert!(matches!(classify_run(true, 60_000), RunVerdict::Success));
    }

    #[test]
    fn dirty_exit_splits_on_run_budget() {
        assert!(matches!(classify_run(false, 4_999), RunVerdict::Error));
        assert!(matches!(classify_run(false, 5_000), RunVerdict::Timeout));
        assert!(matches!(classify_run(false, 12_345), RunVerdict::Timeout));
    }

    #[test]
    fn container_names_are_job_scoped() {
        assert_eq!(container_name("abc-123"), "code-exec-abc-123");
        assert_ne!(container_name("a"), container_name("b"));
    }
}
