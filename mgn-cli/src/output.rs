use chrono::{DateTime, Utc};
use colored::*;
use mgn_types::{
    BulkOperationProgress, JobDescription, OperationOutcome, OperationType, ServerRecord, ServerStatus,
    StatusCategory,
};

pub fn status_label(status: ServerStatus) -> ColoredString {
    let label = status.label();
    match status.category() {
        StatusCategory::Ready => label.bright_green(),
        StatusCategory::InProgress => label.bright_yellow(),
        StatusCategory::Succeeded => label.green(),
        StatusCategory::Failed => label.bright_red(),
        StatusCategory::Inactive => label.dimmed(),
        StatusCategory::Unknown => label.normal(),
    }
}

pub fn server_header() -> String {
    format!(
        "{:<28} {:<22} {:<20} {:<14} {:<22} {}",
        "NAME", "SOURCE SERVER", "STATUS", "REPLICATION", "TEST INSTANCE", "LAST SEEN"
    )
    .bold()
    .to_string()
}

pub fn server_row(server: &ServerRecord, now: DateTime<Utc>) -> String {
    let test_instance = match (&server.test_instance_id, &server.test_instance_state) {
        (Some(id), Some(state)) => format!("{id} ({state})"),
        (Some(id), None) => id.clone(),
        _ => "-".to_string(),
    };
    format!(
        "{:<28} {:<22} {:<20} {:<14} {:<22} {}",
        server.name,
        server.id,
        status_label(server.status),
        server.replication_status.label(),
        test_instance,
        server.last_seen_ago(now)
    )
}

pub fn progress_line(progress: &BulkOperationProgress) -> String {
    format!(
        "[{}/{}] {:>5.1}%  {} succeeded  {} failed  {} in progress",
        progress.completed(),
        progress.total_servers(),
        progress.progress_percentage(),
        progress.successful().to_string().bright_green(),
        progress.failed().to_string().bright_red(),
        progress.in_progress()
    )
}

pub fn summary(operation_type: OperationType, progress: &BulkOperationProgress) -> String {
    let total = progress.total_servers();
    let headline = match progress.outcome() {
        OperationOutcome::AllSucceeded => format!("All {total} servers succeeded").bright_green().bold(),
        OperationOutcome::AllFailed => format!("All {total} servers failed").bright_red().bold(),
        OperationOutcome::Mixed => format!(
            "{} of {total} servers succeeded, {} failed",
            progress.successful(),
            progress.failed()
        )
        .bright_yellow()
        .bold(),
        OperationOutcome::Pending => format!(
            "Stopped after {} of {total} servers ({} succeeded, {} failed)",
            progress.completed(),
            progress.successful(),
            progress.failed()
        )
        .bright_yellow()
        .bold(),
    };

    let mut lines = vec![format!("{}: {headline}", operation_type.title())];
    for result in progress.results() {
        let line = match (result.success(), result.job_id(), result.error_message()) {
            (true, Some(job_id), _) => format!("  {} {} job {job_id}", "OK".green(), result.server_name()),
            (true, None, _) => format!("  {} {}", "OK".green(), result.server_name()),
            (false, _, message) => format!(
                "  {} {}: {}",
                "FAILED".red(),
                result.server_name(),
                message.unwrap_or("unknown error")
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

pub fn job_line(server: &str, job: Option<&JobDescription>) -> String {
    match job {
        Some(job) => format!(
            "{server}: job {} {} ({:.0}%)",
            job.job_id,
            job.status.as_deref().unwrap_or("UNKNOWN"),
            job.progress_percentage
        ),
        None => format!("{server}: job status unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgn_types::BulkOperationResult;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_progress_line() {
        plain();
        let mut progress = BulkOperationProgress::new(4);
        progress.begin_unit();
        progress.begin_unit();
        progress.record(BulkOperationResult::succeeded(
            "s-1".to_string(),
            "web01".to_string(),
            OperationType::LaunchTest,
            Some("job-1".to_string()),
        ));
        assert_eq!(
            progress_line(&progress),
            "[1/4]  25.0%  1 succeeded  0 failed  1 in progress"
        );
    }

    #[test]
    fn test_summary_lists_failures_verbatim() {
        plain();
        let mut progress = BulkOperationProgress::new(2);
        progress.record(BulkOperationResult::succeeded(
            "s-1".to_string(),
            "web01".to_string(),
            OperationType::TerminateTest,
            None,
        ));
        progress.record(BulkOperationResult::failed(
            "s-2".to_string(),
            "db01".to_string(),
            OperationType::TerminateTest,
            "throttled".to_string(),
        ));

        let text = summary(OperationType::TerminateTest, &progress);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Terminating Test Instances: 1 of 2 servers succeeded, 1 failed"
        );
        assert_eq!(lines[1], "  OK web01");
        assert_eq!(lines[2], "  FAILED db01: throttled");
    }

    #[test]
    fn test_job_line() {
        let job = JobDescription {
            job_id: "mgnjob-1".to_string(),
            status: Some("STARTED".to_string()),
            progress_percentage: 42.4,
            end_time: None,
        };
        assert_eq!(job_line("web01", Some(&job)), "web01: job mgnjob-1 STARTED (42%)");
        assert_eq!(job_line("web01", None), "web01: job status unavailable");
    }
}
