//! Parsing of Vercel CLI output
//!
//! The CLI prints human-oriented tables. All parsing lives here so that a
//! change of the CLI's output format only touches this module and its
//! golden fixtures.

use chrono::{DateTime, Duration, Utc};

use crate::errors::ReconcilerError;
use crate::http::vercel::map_state;
use crate::models::deployment::{DeploymentState, DeploymentStatus};
use crate::models::platform::Platform;

/// Username printed by `vercel whoami`
pub fn parse_whoami(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_start_matches('>').trim())
        .filter(|line| !line.is_empty() && !line.starts_with("Vercel CLI"))
        .last()
        .map(str::to_string)
}

/// Deployments listed by `vercel ls <project>`, most recent first
pub fn parse_deployment_list(stdout: &str, now: DateTime<Utc>) -> Vec<DeploymentStatus> {
    let mut deployments: Vec<_> = stdout
        .lines()
        .filter_map(|line| parse_deployment_row(line, now))
        .collect();
    deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    deployments
}

fn parse_deployment_row(line: &str, now: DateTime<Utc>) -> Option<DeploymentStatus> {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .map(|t| t.trim_matches('●'))
        .filter(|t| !t.is_empty())
        .collect();

    let url_pos = tokens.iter().position(|t| t.starts_with("https://"))?;
    let age = parse_age(tokens.first()?)?;
    let url = tokens[url_pos].to_string();
    let status = tokens.get(url_pos + 1)?;
    let duration = tokens.get(url_pos + 3).and_then(|t| parse_age(t));

    let created_at = now - age;
    let state = map_cli_state(status);
    let ready_at = match (state, duration) {
        (DeploymentState::Ready, Some(d)) => Some(created_at + d),
        _ => None,
    };

    Some(DeploymentStatus {
        id: deployment_id_from_url(&url),
        platform: Platform::Hosting,
        state,
        url: Some(url),
        created_at,
        ready_at,
        error_message: None,
        source_revision: None,
    })
}

/// CLI status column onto the canonical lifecycle
pub fn map_cli_state(status: &str) -> DeploymentState {
    match status.to_lowercase().as_str() {
        "queued" => DeploymentState::Pending,
        other => map_state(other),
    }
}

/// Relative age such as `45s`, `7m`, `26h`, `3d` or `2w`
pub fn parse_age(token: &str) -> Option<Duration> {
    let split = token.find(|c: char| !c.is_ascii_digit())?;
    let (value, unit) = token.split_at(split);
    let value: i64 = value.parse().ok()?;

    match unit {
        "ms" => Some(Duration::milliseconds(value)),
        "s" => Some(Duration::seconds(value)),
        "m" => Some(Duration::minutes(value)),
        "h" => Some(Duration::hours(value)),
        "d" => Some(Duration::days(value)),
        "w" => Some(Duration::weeks(value)),
        _ => None,
    }
}

/// Deployment URL printed by `vercel deploy` / `vercel redeploy`
pub fn extract_deployment_url(stdout: &str) -> Option<String> {
    let urls: Vec<&str> = stdout
        .split_whitespace()
        .filter(|t| t.starts_with("https://") && !t.starts_with("https://vercel.com/"))
        .collect();
    urls.last().map(|u| u.trim_end_matches(['[', ']', ',']).to_string())
}

/// The CLI addresses deployments by their hostname
pub fn deployment_id_from_url(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

/// Classify a failed CLI invocation by its stderr
pub fn classify_failure(command: &str, stderr: &str) -> ReconcilerError {
    let message = stderr
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("Error"))
        .or_else(|| stderr.lines().map(str::trim).rfind(|l| !l.is_empty()))
        .unwrap_or("no output")
        .to_string();
    let detail = format!("vercel {} failed: {}", command, message);
    let lower = stderr.to_lowercase();

    if lower.contains("credentials")
        || lower.contains("not logged in")
        || lower.contains("token is not valid")
        || lower.contains("forbidden")
    {
        ReconcilerError::AuthError(detail)
    } else if lower.contains("enotfound")
        || lower.contains("etimedout")
        || lower.contains("econnreset")
        || lower.contains("network")
    {
        ReconcilerError::TransportError(detail)
    } else {
        ReconcilerError::ConfigError(detail)
    }
}
