//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use serde::Serialize;
use warden_auth::{AuthRequirement, BootstrapOutcome, DirectoryCheck, Session};
use tokio::task::JoinHandle;
use warden_events::{Notification, NotificationAction, NotificationBus, NotificationStream};

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

/// Enablement probe result.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ProbeView {
    pub(crate) sso_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) script_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) realm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) client_id: Option<String>,
}

impl ProbeView {
    pub(crate) fn from_requirement(requirement: &AuthRequirement, script: &str) -> Self {
        match requirement {
            AuthRequirement::NotRequired => Self {
                sso_required: false,
                script_url: None,
                realm: None,
                client_id: None,
            },
            AuthRequirement::Required(descriptor) => Self {
                sso_required: true,
                script_url: descriptor.script_location(script),
                realm: descriptor.realm().map(str::to_string),
                client_id: descriptor.client_id().map(str::to_string),
            },
        }
    }
}

/// Bootstrap summary for a started session.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct SessionView {
    pub(crate) outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) subject: Option<String>,
    pub(crate) states: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) directory: Option<String>,
}

impl SessionView {
    pub(crate) fn from_session(session: &Session) -> Self {
        let report = session.report();
        let subject = match &report.outcome {
            BootstrapOutcome::Authorized { subject } => Some(subject.clone()),
            BootstrapOutcome::Skipped | BootstrapOutcome::Failed(_) => None,
        };
        Self {
            outcome: report.outcome.as_str(),
            subject,
            states: report.history.iter().map(|state| state.name()).collect(),
            directory: session.directory().map(directory_label),
        }
    }
}

fn directory_label(check: &DirectoryCheck) -> String {
    match check {
        DirectoryCheck::Recognized(_) => "recognized".to_string(),
        DirectoryCheck::Unrecognized => "unrecognized".to_string(),
        DirectoryCheck::Unreachable(reason) => format!("unreachable ({reason})"),
    }
}

pub(crate) fn render_probe(view: &ProbeView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(view)?,
        OutputFormat::Table => {
            println!("sso required: {}", view.sso_required);
            if let Some(url) = &view.script_url {
                println!("adapter: {url}");
            }
            if let Some(realm) = &view.realm {
                println!("realm: {realm}");
            }
            if let Some(client_id) = &view.client_id {
                println!("client: {client_id}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_session(view: &SessionView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(view)?,
        OutputFormat::Table => {
            println!("outcome: {}", view.outcome);
            if let Some(subject) = &view.subject {
                println!("subject: {subject}");
            }
            println!("states: {}", view.states.join(" -> "));
            if let Some(directory) = &view.directory {
                println!("directory: {directory}");
            }
        }
    }
    Ok(())
}

/// Print notifications to stderr as they are published.
///
/// The task ends once every handle to `bus` has been dropped.
pub(crate) fn spawn_notification_printer(bus: &NotificationBus) -> JoinHandle<()> {
    let stream = bus.subscribe(None);
    tokio::spawn(forward_notifications(stream, |line| eprintln!("{line}")))
}

async fn forward_notifications<F>(mut stream: NotificationStream, mut sink: F)
where
    F: FnMut(String),
{
    while let Some(envelope) = stream.next().await {
        sink(format_notification(&envelope.notification));
    }
}

fn format_notification(notification: &Notification) -> String {
    let action = match notification.action {
        Some(NotificationAction::Logout) => " [action: logout]",
        None => "",
    };
    format!(
        "[{}] {}{}",
        notification.severity.as_str(),
        notification.message,
        action
    )
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}
