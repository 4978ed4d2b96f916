//! CLI commands implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use gpusched_core::{Device, JobId, JobView};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", self.base_url))?;
        decode(response).await
    }
}

/// Turn a non-success response into an error carrying the daemon's message
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error = response.text().await?;
        anyhow::bail!("daemon returned {}: {}", status, error);
    }
    Ok(response.json().await?)
}

/// Which queue to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl QueueState {
    const ALL: [QueueState; 4] = [
        QueueState::Pending,
        QueueState::Running,
        QueueState::Succeeded,
        QueueState::Failed,
    ];

    fn path(&self) -> &'static str {
        match self {
            QueueState::Pending => "/api/v1/jobs/pending",
            QueueState::Running => "/api/v1/jobs/running",
            QueueState::Succeeded => "/api/v1/jobs/succeeded",
            QueueState::Failed => "/api/v1/jobs/failed",
        }
    }
}

/// Submission response
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub id: JobId,
}

/// Status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub daemon_running: bool,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub devices_total: usize,
    pub devices_free: usize,
    pub wake_interval_secs: u64,
    pub pending_capacity: usize,
}

/// Settings response
#[derive(Debug, Deserialize)]
pub struct SettingsResponse {
    pub wake_interval_secs: u64,
    pub pending_capacity: usize,
}

/// Queue a job
pub async fn submit(
    client: &ApiClient,
    name: String,
    output: Option<PathBuf>,
    command: Vec<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct SubmitRequest {
        name: String,
        command: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<PathBuf>,
    }

    // The daemon resolves paths against its own working directory
    let output_path = match output {
        Some(path) => Some(absolute(path)?),
        None => None,
    };

    let req = SubmitRequest {
        name: name.clone(),
        command,
        output_path,
    };

    let response = client
        .client
        .post(client.url("/api/v1/jobs"))
        .json(&req)
        .send()
        .await
        .with_context(|| format!("failed to reach daemon at {}", client.base_url))?;

    let submitted: SubmitResponse = decode(response)
        .await
        .with_context(|| format!("failed to submit job '{}'", name))?;
    println!("Job '{}' submitted with id {}", name, submitted.id);

    Ok(())
}

/// List one queue, or all four in lifecycle order
pub async fn queue(client: &ApiClient, state: Option<QueueState>) -> Result<()> {
    let states: Vec<QueueState> = match state {
        Some(state) => vec![state],
        None => QueueState::ALL.to_vec(),
    };

    let mut jobs = Vec::new();
    for state in states {
        let mut batch: Vec<JobView> = client.get(state.path()).await?;
        jobs.append(&mut batch);
    }

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!("{}", job_header());
    println!("{}", "-".repeat(100));
    for job in &jobs {
        println!("{}", job_row(job));
    }

    Ok(())
}

/// Show one job
pub async fn job(client: &ApiClient, id: u64) -> Result<()> {
    let job: JobView = client
        .get(&format!("/api/v1/jobs/{}", id))
        .await
        .with_context(|| format!("job {} not found", id))?;

    for line in job_details(&job) {
        println!("{}", line);
    }

    Ok(())
}

/// List device slots
pub async fn devices(client: &ApiClient, free: bool) -> Result<()> {
    let path = if free {
        "/api/v1/devices/free"
    } else {
        "/api/v1/devices"
    };
    let devices: Vec<Device> = client.get(path).await?;

    if devices.is_empty() {
        println!("No devices {}", if free { "free" } else { "configured" });
    } else {
        for device in devices {
            println!("{}", device);
        }
    }

    Ok(())
}

/// Show daemon status
pub async fn status(client: &ApiClient) -> Result<()> {
    let status: StatusResponse = client.get("/api/v1/status").await?;

    println!("gpusched v{}", status.version);
    println!();
    println!(
        "Daemon: {}",
        if status.daemon_running {
            "running"
        } else {
            "stopped"
        }
    );
    println!(
        "Jobs: {} pending, {} running, {} succeeded, {} failed",
        status.pending, status.running, status.succeeded, status.failed
    );
    println!(
        "Devices: {} total, {} free",
        status.devices_total, status.devices_free
    );
    println!("Wake interval: {}s", status.wake_interval_secs);
    println!("Pending capacity: {}", status.pending_capacity);

    Ok(())
}

/// Change daemon settings
pub async fn set(
    client: &ApiClient,
    wake_interval: Option<i64>,
    pending_capacity: Option<i64>,
) -> Result<()> {
    if wake_interval.is_none() && pending_capacity.is_none() {
        anyhow::bail!("nothing to set; pass --wake-interval or --pending-capacity");
    }

    #[derive(Serialize)]
    struct SettingsRequest {
        #[serde(skip_serializing_if = "Option::is_none")]
        wake_interval_secs: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pending_capacity: Option<i64>,
    }

    let response = client
        .client
        .put(client.url("/api/v1/settings"))
        .json(&SettingsRequest {
            wake_interval_secs: wake_interval,
            pending_capacity,
        })
        .send()
        .await
        .with_context(|| format!("failed to reach daemon at {}", client.base_url))?;

    let settings: SettingsResponse = decode(response).await?;
    println!("Wake interval: {}s", settings.wake_interval_secs);
    println!("Pending capacity: {}", settings.pending_capacity);

    Ok(())
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}

fn job_details(job: &JobView) -> Vec<String> {
    let mut lines = vec![
        format!("Job {}: {}", job.id, job.name),
        format!("  Status: {}", job.status),
        format!("  Command: {}", job.command_line()),
    ];
    if let Some(path) = &job.output_path {
        lines.push(format!("  Output: {}", path.display()));
    }
    if let Some(device) = &job.device {
        lines.push(format!("  Device: {}", device));
    }
    if let Some(error) = &job.spawn_error {
        lines.push(format!("  Error: {}", error));
    }
    lines.push(format!("  Submitted: {}", format_time(Some(&job.submitted_at))));
    lines.push(format!("  Started: {}", format_time(job.started_at.as_ref())));
    if job.status.is_terminal() {
        let exit = job.exit_code.map(|c| c.to_string()).unwrap_or_default();
        lines.push(format!("  Exit code: {}", exit));
        lines.push(format!("  Finished: {}", format_time(job.finished_at.as_ref())));
    }
    lines
}

fn job_header() -> String {
    format!(
        "{:<8} {:<20} {:<10} {:<8} {:<6} {}",
        "ID", "NAME", "STATUS", "DEVICE", "EXIT", "COMMAND"
    )
}

fn job_row(job: &JobView) -> String {
    let device = job.device.as_ref().map(|d| d.to_string()).unwrap_or_default();
    let exit = job.exit_code.map(|c| c.to_string()).unwrap_or_default();
    format!(
        "{:<8} {:<20} {:<10} {:<8} {:<6} {}",
        job.id.to_string(),
        job.name,
        job.status.label(),
        device,
        exit,
        job.command_line()
    )
}

fn format_time(time: Option<&DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpusched_core::JobState;

    fn view(status: JobState, device: Option<&str>, exit_code: Option<i32>) -> JobView {
        JobView {
            id: JobId(12),
            name: "train".to_string(),
            command: vec!["python".to_string(), "train.py".to_string()],
            output_path: None,
            status,
            device: device.map(Device::new),
            exit_code,
            spawn_error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_api_client_url() {
        let client = ApiClient::new("http://localhost:8844/");
        assert_eq!(client.url("/api/v1/status"), "http://localhost:8844/api/v1/status");
    }

    #[test]
    fn test_job_row() {
        let row = job_row(&view(JobState::Failed, Some("1"), Some(3)));
        assert!(row.starts_with("12 "));
        assert!(row.contains("Failed"));
        assert!(row.ends_with("python train.py"));

        let pending = job_row(&view(JobState::Pending, None, None));
        assert!(pending.contains("Scheduled"));
    }

    #[test]
    fn test_job_details_only_report_exit_when_finished() {
        let pending = job_details(&view(JobState::Pending, None, None));
        assert_eq!(pending[1], "  Status: Scheduled");
        assert!(!pending.iter().any(|l| l.starts_with("  Exit code")));
        assert!(!pending.iter().any(|l| l.starts_with("  Finished")));

        let failed = job_details(&view(JobState::Failed, Some("1"), Some(3)));
        assert!(failed.contains(&"  Device: 1".to_string()));
        assert!(failed.contains(&"  Exit code: 3".to_string()));
        assert!(failed.iter().any(|l| l.starts_with("  Finished")));
    }

    #[test]
    fn test_absolute_output_path() {
        let path = absolute(PathBuf::from("out.log")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("out.log"));
        assert_eq!(
            absolute(PathBuf::from("/tmp/x.log")).unwrap(),
            PathBuf::from("/tmp/x.log")
        );
    }

    #[test]
    fn test_format_time_missing() {
        assert_eq!(format_time(None), "-");
    }
}
