//! Command line surface of the `assetdesk` binary.

use crate::config::CONFIG_ENV_VAR;
use crate::desk::AssetDesk;
use crate::notifications::Notification;
use assetdesk_core::{
    DeskError, DeskResult, DeviceId, EntityKind, EntityRow, Filter, ListPage, Relation, RelationId,
    TicketId, Timestamp, UserId, ValidationError,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use uuid::Uuid;

/// AssetDesk inventory and helpdesk client
#[derive(Debug, Parser)]
#[command(name = "assetdesk")]
#[command(about = "AssetDesk inventory and helpdesk client", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List one page of entities
    List {
        /// computer, monitor, user, ticket or relation
        kind: EntityKind,
        /// Filter as key=value; repeat for more, comma-separate alternatives
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<Filter>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show one entity
    Show { kind: EntityKind, id: Uuid },

    /// List relations of a device or a user
    Relations {
        #[arg(long, conflicts_with = "user", required_unless_present = "user")]
        device: Option<DeviceId>,
        #[arg(long)]
        user: Option<UserId>,
    },

    /// Assign a device to a user
    Assign {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        device: DeviceId,
        /// RFC 3339 start date; defaults to now
        #[arg(long)]
        start: Option<Timestamp>,
    },

    /// End a relation
    Unassign {
        #[arg(long)]
        relation: RelationId,
        #[arg(long)]
        user: Option<UserId>,
        #[arg(long)]
        device: Option<DeviceId>,
    },

    /// Add a worknote to a ticket as the configured principal
    Worknote {
        #[arg(long)]
        ticket: TicketId,
        #[arg(long)]
        note: String,
    },
}

impl Command {
    /// Name of the operation, as used in failure messages.
    pub fn operation(&self) -> &'static str {
        match self {
            Command::List { .. } => "list entities",
            Command::Show { .. } => "load entity",
            Command::Relations { .. } => "list relations",
            Command::Assign { .. } => "create relation",
            Command::Unassign { .. } => "end relation",
            Command::Worknote { .. } => "add worknote",
        }
    }
}

/// Parse `key=value`. The value may itself contain `=`.
pub fn parse_filter(raw: &str) -> Result<Filter, String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("filter key must not be empty".to_string());
    }
    Ok(Filter::new(key, value))
}

/// Run `command` and render its output, or the toast for its failure.
pub async fn execute(command: Command, desk: &AssetDesk) -> Result<String, Notification> {
    let operation = command.operation();
    run(command, desk)
        .await
        .map_err(|err| Notification::from_error(operation, &err))
}

async fn run(command: Command, desk: &AssetDesk) -> DeskResult<String> {
    let freshness = desk.best_effort();
    match command {
        Command::List {
            kind,
            filters,
            page,
        } => {
            let result = desk.lists().fetch_page(kind, &filters, page).await?;
            Ok(render_page(kind, &result))
        }
        Command::Show { kind, id } => match kind {
            EntityKind::Computer | EntityKind::Monitor => {
                let device = desk.inventory().device(DeviceId::from(id), freshness).await?;
                render_json(&device)
            }
            EntityKind::User => {
                let user = desk.inventory().user(UserId::from(id), freshness).await?;
                render_json(&user)
            }
            EntityKind::Ticket => {
                let tickets = desk.tickets();
                let ticket_id = TicketId::from(id);
                let ticket = tickets.ticket(ticket_id, freshness).await?;
                let notes = tickets.worknotes(ticket_id, freshness).await?;
                let mut out = render_json(&ticket)?;
                for note in notes {
                    let author = note
                        .author
                        .and_then(|author| author.email)
                        .unwrap_or_else(|| "unknown".to_string());
                    let _ = write!(out, "\n[{}] {}: {}", note.created_at.to_rfc3339(), author, note.note);
                }
                Ok(out)
            }
            EntityKind::Relation => Err(ValidationError::invalid(
                "kind",
                "relations are shown per device or user, use `relations`",
            )
            .into()),
        },
        Command::Relations { device, user } => {
            let views = desk.relation_views();
            let relations = match (device, user) {
                (Some(device_id), _) => views.by_device(device_id, freshness).await?,
                (None, Some(user_id)) => views.by_user(user_id, freshness).await?,
                (None, None) => return Err(ValidationError::required("device").into()),
            };
            Ok(render_relations(&relations))
        }
        Command::Assign {
            user,
            device,
            start,
        } => {
            let start = start.unwrap_or_else(Utc::now);
            let relation = desk.relations().create_relation(user, device, start).await?;
            Ok(Notification::success(format!("Relation {} created", relation.id)).message)
        }
        Command::Unassign {
            relation,
            user,
            device,
        } => {
            desk.relations().end_relation(relation, user, device).await?;
            Ok(Notification::success(format!("Relation {} ended", relation)).message)
        }
        Command::Worknote { ticket, note } => {
            let created = desk
                .tickets()
                .add_worknote(desk.principal(), ticket, &note)
                .await?;
            Ok(Notification::success(format!("Worknote {} added", created.id)).message)
        }
    }
}

/// One line per row with the kind's filterable columns, then the page line.
pub fn render_page(kind: EntityKind, page: &ListPage<EntityRow>) -> String {
    let paths = kind.field_paths();
    let mut out = String::new();
    for row in &page.rows {
        let cells: Vec<String> = paths
            .iter()
            .map(|path| row.resolve(path).unwrap_or_else(|| "-".to_string()))
            .collect();
        let _ = writeln!(out, "{}  {}", row.id(), cells.join(" | "));
    }
    let _ = write!(
        out,
        "page {}/{} ({})",
        page.meta.current_page, page.meta.total_pages, page.meta.count
    );
    out
}

fn render_relations(relations: &[Relation]) -> String {
    if relations.is_empty() {
        return "no relations".to_string();
    }
    relations
        .iter()
        .map(|relation| {
            let holder = relation.user.email.as_deref().unwrap_or("-");
            let serial = relation.device.serial_number.as_deref().unwrap_or("-");
            let end = relation
                .end_date
                .map(|end| end.to_rfc3339())
                .unwrap_or_else(|| "active".to_string());
            format!(
                "{}  {} -> {}  {} .. {}",
                relation.id,
                serial,
                holder,
                relation.start_date.to_rfc3339(),
                end
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_json<T: Serialize>(value: &T) -> DeskResult<String> {
    serde_json::to_string_pretty(value).map_err(|err| {
        DeskError::from(ValidationError::invalid("output", err.to_string()))
    })
}
