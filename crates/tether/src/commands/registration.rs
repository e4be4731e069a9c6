//! Registration commands

use crate::error::{CliError, CliResult};
use crate::output::{self, print_field, print_info, print_success, print_warning, OutputFormat};
use crate::session::Session;
use clap::Subcommand;
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;
use tether_lifecycle::TrackedRegistration;
use tether_types::{ConnectorProvider, RegistrationRequest};
use tokio_util::sync::CancellationToken;

/// Registration subcommands
#[derive(Subcommand)]
pub enum RegistrationCommands {
    /// Register an external cluster and wait until it is active
    Register {
        /// Registration name
        name: String,

        /// Connector provider (EKS_ANYWHERE, ANTHOS, GKE, AKS, OPENSHIFT, TANZU, RANCHER, EC2, OTHER)
        #[arg(short, long)]
        provider: Option<String>,

        /// Role the connector agent assumes
        #[arg(short, long)]
        role_arn: String,

        /// Tag as key=value (repeatable)
        #[arg(short, long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// How long to wait for the registration to become active
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Refresh and show a registration
    Show {
        /// Registration name
        name: String,
    },

    /// List tracked registrations
    List,

    /// Start tracking an existing registration
    Import {
        /// Registration name
        name: String,
    },

    /// Deregister a cluster
    #[command(alias = "delete")]
    Deregister {
        /// Registration name
        name: String,
    },
}

/// Table row for registration display
#[derive(Debug, Serialize, Tabled)]
struct RegistrationRow {
    name: String,
    status: String,
    provider: String,
    role: String,
    observed: String,
}

impl From<TrackedRegistration> for RegistrationRow {
    fn from(t: TrackedRegistration) -> Self {
        Self {
            name: t.record.name.to_string(),
            status: t.record.status.to_string(),
            provider: t
                .record
                .provider()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            role: t.record.role_arn().unwrap_or("-").to_string(),
            observed: humanize_duration(chrono::Utc::now() - t.observed_at),
        }
    }
}

fn humanize_duration(duration: chrono::Duration) -> String {
    if duration.num_days() > 0 {
        format!("{}d ago", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m ago", duration.num_minutes())
    } else {
        format!("{}s ago", duration.num_seconds().max(0))
    }
}

/// Parse a `key=value` tag argument
pub(crate) fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn print_registration(tracked: &TrackedRegistration, format: OutputFormat) -> CliResult<()> {
    if format == OutputFormat::Json {
        return output::print_json(tracked);
    }

    let record = &tracked.record;
    print_field("Name", &record.name);
    print_field("Status", &record.status);
    print_field("ARN", record.arn.as_deref().unwrap_or("-"));
    if let Some(connector) = &record.connector_config {
        print_field("Provider", connector.provider);
        print_field("Role", &connector.role_arn);
    }
    if let Some(created_at) = record.created_at {
        print_field("Created", created_at.to_rfc3339());
    }
    if let Some(detail) = record.failure_detail() {
        print_field("Issues", detail);
    }
    if !record.tags.is_empty() {
        let tags: Vec<String> = record.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        print_field("Tags", tags.join(", "));
    }
    print_field("Observed", tracked.observed_at.to_rfc3339());
    Ok(())
}

fn print_activation(tracked: &TrackedRegistration) {
    let Some(connector) = &tracked.record.connector_config else {
        return;
    };

    if let Some(id) = &connector.activation_id {
        print_field("Activation ID", id);
    }
    if let Some(code) = &connector.activation_code {
        print_field("Activation code", code);
    }
    if let Some(expiry) = connector.activation_expiry {
        print_field("Activation expires", expiry.to_rfc3339());
    }
    print_info("Install the connector agent in the cluster with this activation before it expires");
}

/// Execute a registration command
pub async fn execute(
    command: RegistrationCommands,
    session: &Session,
    default_provider: Option<ConnectorProvider>,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> CliResult<()> {
    let controller = session.controller();

    match command {
        RegistrationCommands::Register {
            name,
            provider,
            role_arn,
            tags,
            timeout_secs,
        } => {
            let provider = match provider {
                Some(raw) => raw
                    .parse::<ConnectorProvider>()
                    .map_err(|e| CliError::InvalidInput(e.to_string()))?,
                None => default_provider.ok_or_else(|| {
                    CliError::InvalidInput(
                        "--provider is required when no default_provider is configured".into(),
                    )
                })?,
            };

            let mut request = RegistrationRequest::new(name.as_str(), provider, role_arn);
            for (key, value) in tags {
                request = request.with_tag(key, value);
            }

            let timeout = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(controller.config().create_timeout);

            let tracked = match controller.create_with_timeout(&request, timeout, cancel).await {
                Ok(tracked) => tracked,
                Err(e) => {
                    if e.accepted.is_some() {
                        print_warning(&format!(
                            "Registration {} may still exist on the backend; run `tether import {}` or `tether deregister {}`",
                            name, name, name
                        ));
                    }
                    return Err(e.into());
                }
            };

            if format == OutputFormat::Json {
                return output::print_json(&tracked);
            }

            print_success(&format!(
                "Registered cluster {} ({})",
                tracked.record.name, tracked.record.status
            ));
            print_activation(&tracked);
            Ok(())
        }

        RegistrationCommands::Show { name } => {
            let handle = session.resolve(&name).await?;
            match controller.read(&handle, cancel).await? {
                Some(tracked) => print_registration(&tracked, format),
                None => {
                    print_warning(&format!(
                        "Registration {} no longer exists; removed from tracked state",
                        name
                    ));
                    Err(CliError::NotFound(name))
                }
            }
        }

        RegistrationCommands::List => {
            let rows: Vec<RegistrationRow> = controller
                .tracked()
                .await?
                .into_iter()
                .map(RegistrationRow::from)
                .collect();
            output::print_output(rows, format)
        }

        RegistrationCommands::Import { name } => {
            let handle = session.resolve(&name).await?;
            let tracked = controller.import(&handle, cancel).await?;

            if format == OutputFormat::Json {
                return output::print_json(&tracked);
            }
            print_success(&format!("Imported registration {}", tracked.record.name));
            print_registration(&tracked, format)
        }

        RegistrationCommands::Deregister { name } => {
            let handle = session.resolve(&name).await?;
            controller.delete(&handle, cancel).await?;
            print_success(&format!("Deregistered cluster {}", name));
            Ok(())
        }
    }
}
