use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::load_client_settings,
    management::ManagementCallbacks,
    tracker::{render, ShipmentTracker},
    wizard::WizardOptions,
    ClientEvent, ClientSettings, EventBus, FileSessionStore, ManagementStatus, ShipmentApi,
    ShipmentClient, ShipmentFormState, ShipmentManagement, ShipmentWizard, TrackingInfo,
};
use futures::StreamExt;
use shared::{
    domain::{ProjectId, Role, Shipment},
    lifecycle::ShipmentAction,
    protocol::QuoteRequest,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod output;

const DEFAULT_SESSION_FILE: &str = ".shipctl-session.json";

#[derive(Parser, Debug)]
#[command(about = "Create, track and advance project shipments")]
struct Cli {
    /// Settings file layered under SHIPMENTS__* variables.
    #[arg(long, env = "SHIPMENTS_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "SHIPMENTS_BASE_URL")]
    base_url: Option<String>,
    #[arg(long)]
    session: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obtain sandbox tokens and store the session.
    Login {
        username: String,
        /// client/marca or creator/creador
        #[arg(long)]
        role: Role,
    },
    Logout,
    Whoami,
    Quote {
        #[arg(long)]
        origin: String,
        #[arg(long)]
        destination: String,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
        #[arg(long, default_value_t = 20.0)]
        width: f64,
        #[arg(long, default_value_t = 15.0)]
        height: f64,
        #[arg(long, default_value_t = 30.0)]
        length: f64,
        #[arg(long)]
        return_required: bool,
    },
    /// Walk the label wizard with a JSON form file.
    Ship {
        project_id: i64,
        #[arg(long)]
        form: PathBuf,
        #[arg(long)]
        strict_addresses: bool,
    },
    /// Fetch the shipment once and print the tracker.
    Status { project_id: i64 },
    /// Poll the shipment and print every change until interrupted.
    Track { project_id: i64 },
    /// Run a lifecycle action as the signed-in role.
    Act {
        project_id: i64,
        #[arg(value_enum)]
        action: ActionArg,
    },
    /// Show what the project page renders for a given project status.
    Overview {
        project_id: i64,
        #[arg(long, value_enum)]
        status: Option<ProjectStatusArg>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    ConfirmShipped,
    ConfirmReceived,
    StartReturn,
    ConfirmReturnReceived,
}

impl From<ActionArg> for ShipmentAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::ConfirmShipped => ShipmentAction::ConfirmShipped,
            ActionArg::ConfirmReceived => ShipmentAction::ConfirmReceived,
            ActionArg::StartReturn => ShipmentAction::StartReturn,
            ActionArg::ConfirmReturnReceived => ShipmentAction::ConfirmReturnReceived,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProjectStatusArg {
    Pending,
    Shipped,
    Delivered,
    Confirmed,
}

impl From<ProjectStatusArg> for ManagementStatus {
    fn from(arg: ProjectStatusArg) -> Self {
        match arg {
            ProjectStatusArg::Pending => ManagementStatus::Pending,
            ProjectStatusArg::Shipped => ManagementStatus::Shipped,
            ProjectStatusArg::Delivered => ManagementStatus::Delivered,
            ProjectStatusArg::Confirmed => ManagementStatus::Confirmed,
        }
    }
}

struct PrintCallbacks;

impl ManagementCallbacks for PrintCallbacks {
    fn on_update_shipment(&self, shipment: &Shipment) {
        println!(
            "project {} shipment registered ({})",
            shipment.project_id,
            shipment.tracking_number.as_deref().unwrap_or("-")
        );
    }

    fn on_confirm_receipt(&self) {
        println!("receipt confirmed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_client_settings(cli.config.as_deref())
        .context("failed to load client settings")?;
    if let Some(base_url) = cli.base_url.clone() {
        settings.base_url = base_url;
    }
    let session_path = cli
        .session
        .clone()
        .or_else(|| settings.session_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));
    let session_store = Arc::new(FileSessionStore::new(session_path));
    debug!(
        base_url = %settings.base_url,
        session = %session_store.path().display(),
        "shipctl settings"
    );

    let events = EventBus::new();
    let mut notices = events.subscribe();
    let client = Arc::new(
        ShipmentClient::from_settings(&settings, session_store, events.clone())
            .context("failed to build shipment client")?,
    );

    let outcome = run(cli.command, &settings, client, events).await;
    output::drain_events(&mut notices);
    outcome
}

async fn run(
    command: Command,
    settings: &ClientSettings,
    client: Arc<ShipmentClient>,
    events: EventBus,
) -> Result<()> {
    match command {
        Command::Login { username, role } => {
            let session = client.sign_in(&username, role).await?;
            println!("signed in as {username} ({})", session.role);
        }
        Command::Logout => {
            client.sign_out()?;
            println!("signed out");
        }
        Command::Whoami => match client.current_session()? {
            Some(session) => println!(
                "{} ({})",
                session.username.as_deref().unwrap_or("unknown user"),
                session.role
            ),
            None => println!("not signed in"),
        },
        Command::Quote {
            origin,
            destination,
            weight,
            width,
            height,
            length,
            return_required,
        } => {
            let quote = client
                .quote(&QuoteRequest {
                    origin_postal_code: origin,
                    destination_postal_code: destination,
                    weight,
                    width,
                    height,
                    length,
                    return_required,
                })
                .await?;
            output::print_quote(&quote);
        }
        Command::Ship {
            project_id,
            form,
            strict_addresses,
        } => {
            let raw = std::fs::read_to_string(&form)
                .with_context(|| format!("failed to read form file {}", form.display()))?;
            let form: ShipmentFormState =
                serde_json::from_str(&raw).context("form file is not a valid shipment form")?;
            let mut wizard = ShipmentWizard::with_options(
                client,
                ProjectId(project_id),
                events,
                WizardOptions {
                    require_complete_addresses: strict_addresses,
                },
            );
            let shipment = run_wizard(&mut wizard, form).await?;
            output::print_shipment_summary(&shipment);
        }
        Command::Status { project_id } => {
            let role = signed_in_role(&client)?;
            let tracker = ShipmentTracker::new(client, ProjectId(project_id), role, events);
            tracker.refresh().await?;
            output::print_tracker(&tracker.view());
        }
        Command::Track { project_id } => {
            let role = signed_in_role(&client)?;
            let tracker = ShipmentTracker::new(client, ProjectId(project_id), role, events.clone());
            track(&tracker, settings, events).await?;
        }
        Command::Act { project_id, action } => {
            let role = signed_in_role(&client)?;
            let tracker = ShipmentTracker::new(client, ProjectId(project_id), role, events);
            tracker.refresh().await?;
            tracker.perform(action.into()).await?;
            output::print_tracker(&tracker.view());
        }
        Command::Overview { project_id, status } => {
            let role = signed_in_role(&client)?;
            let shipment = client.shipment(ProjectId(project_id)).await?;
            let tracking = shipment.as_ref().map(TrackingInfo::from).unwrap_or_default();
            let management = ShipmentManagement::new(
                role,
                status.map(ManagementStatus::from),
                tracking,
                Arc::new(PrintCallbacks),
            );
            output::print_management(&management.view());
            if let Some(tracker) = management.tracker(client, ProjectId(project_id), events) {
                tracker.refresh().await?;
                output::print_tracker(&tracker.view());
            }
        }
    }
    Ok(())
}

fn signed_in_role(client: &ShipmentClient) -> Result<Role> {
    match client.current_session()? {
        Some(session) => Ok(session.role),
        None => bail!("not signed in; run `shipctl login` first"),
    }
}

async fn run_wizard(wizard: &mut ShipmentWizard, form: ShipmentFormState) -> Result<Shipment> {
    *wizard.form_mut()? = form;
    wizard.next()?;
    let quote = wizard.calculate_quote().await?;
    output::print_quote(quote);
    Ok(wizard.generate_label().await?)
}

async fn track(
    tracker: &Arc<ShipmentTracker>,
    settings: &ClientSettings,
    events: EventBus,
) -> Result<()> {
    let _poller = tracker.start_polling(settings.poll_interval());
    let mut updates = WatchStream::new(tracker.subscribe());
    let mut notices = events.subscribe();
    let role = tracker.role();
    println!(
        "tracking project {} every {}s (Ctrl-C to stop)",
        tracker.project_id(),
        settings.poll_interval().as_secs()
    );
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(state) = update else { break };
                output::print_tracker(&render(role, &state, tracker.is_updating()));
            }
            event = notices.recv() => match event {
                Ok(ClientEvent::SessionExpired) => bail!("session expired; run `shipctl login` again"),
                Ok(other) => output::print_event(&other),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut interrupted => break,
        }
    }
    Ok(())
}
