//! Parcelguard CLI
//!
//! Operator front-end over a JSON parcel snapshot:
//! - Scanning published parcels for overlapping boundaries
//! - Checking a new submission against the live parcels
//! - Archiving, deleting or accepting flagged overlaps
//! - Reading overlap statistics and the audit history

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use parcelguard_engine::{
    Actor, AuditActionType, EngineConfig, InMemoryParcelStore, JsonlAuditLog, OverlapError,
    OverlapFilter, OverlapService, Ownership, PairKey, Parcel, ParcelId, PolicyAction,
    ResolutionAction, ResolutionState, Severity, SortKey,
};
use tracing_subscriber::EnvFilter;

mod output;

#[derive(Parser)]
#[command(name = "parcelguard")]
#[command(
    author,
    version,
    about = "Parcelguard: land parcel overlap detection and resolution"
)]
struct Cli {
    /// Parcel snapshot (JSON with `parcels`, `owners`, `admin_ids`, `media`)
    #[arg(short, long, global = true, default_value = "parcels.json")]
    snapshot: PathBuf,

    /// Engine configuration (JSON); defaults apply to missing fields
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append-only audit log (JSON lines) [default: `<snapshot>.audit.jsonl`]
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Actor id recorded in the audit log
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Roles held by the actor
    #[arg(long = "role", global = true, default_value = "admin")]
    roles: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan all eligible parcels and list overlaps
    Scan {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Check a new parcel (JSON file) against the live parcels, as at creation time
    Check {
        /// Parcel JSON
        parcel: PathBuf,
        /// Submitting user (defaults to the parcel owner)
        #[arg(long)]
        submitter: Option<String>,
    },

    /// Archive one parcel of an overlapping pair
    Archive {
        /// Overlap id (`<parcel>|<parcel>`)
        overlap: PairKey,
        /// Parcel to archive
        target: String,
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Permanently delete one parcel of an overlapping pair
    Delete {
        /// Overlap id (`<parcel>|<parcel>`)
        overlap: PairKey,
        /// Parcel to delete
        target: String,
        /// Required
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Accept an overlap as legitimate
    Ignore {
        /// Overlap id (`<parcel>|<parcel>`)
        overlap: PairKey,
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Aggregate counts over a fresh scan
    Stats,

    /// Audit history, newest first
    Audit {
        /// Only these action types (e.g. ARCHIVE_DUPLICATE_LISTING); repeatable
        #[arg(long = "type")]
        types: Vec<AuditActionType>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Only these tiers (low, high, blocked); repeatable
    #[arg(long)]
    severity: Vec<Severity>,
    /// Only overlaps between parcels of the same owner
    #[arg(long, conflicts_with = "different_owner")]
    same_owner: bool,
    /// Only overlaps between parcels of different owners
    #[arg(long)]
    different_owner: bool,
    /// open, archived, deleted or ignored
    #[arg(long)]
    state: Option<String>,
    /// Minimum overlap percentage
    #[arg(long)]
    min_pct: Option<f64>,
    /// Free-text match on parcel id, title, region or owner
    #[arg(long)]
    search: Option<String>,
    /// percentage, area or discovered
    #[arg(long, default_value = "percentage")]
    sort: String,
    #[arg(long)]
    limit: Option<usize>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<OverlapFilter> {
        let state = self
            .state
            .as_deref()
            .map(|s| {
                serde_json::from_value::<ResolutionState>(serde_json::Value::String(
                    s.to_lowercase(),
                ))
                .map_err(|_| anyhow!("unknown state `{s}`"))
            })
            .transpose()?;
        let sort = match self.sort.as_str() {
            "percentage" | "pct" => SortKey::PercentageDesc,
            "area" => SortKey::AreaDesc,
            "discovered" | "recent" => SortKey::DiscoveredDesc,
            other => return Err(anyhow!("unknown sort key `{other}`")),
        };
        let ownership = match (self.same_owner, self.different_owner) {
            (true, _) => Some(Ownership::SameOwner),
            (false, true) => Some(Ownership::DifferentOwner),
            _ => None,
        };
        Ok(OverlapFilter {
            severities: self.severity.clone(),
            ownership,
            state,
            min_percentage: self.min_pct,
            text: self.search.clone(),
            sort,
            limit: self.limit,
        })
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Everything a command needs, opened from the global flags.
struct Session {
    store: Arc<InMemoryParcelStore>,
    service: OverlapService,
    actor: Actor,
    snapshot: PathBuf,
    json: bool,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        let store = Arc::new(
            InMemoryParcelStore::load_json(&cli.snapshot)
                .with_context(|| format!("loading snapshot {}", cli.snapshot.display()))?,
        );
        let audit_path = cli
            .audit_log
            .clone()
            .unwrap_or_else(|| default_audit_path(&cli.snapshot));
        let audit = Arc::new(
            JsonlAuditLog::open(&audit_path)
                .with_context(|| format!("opening audit log {}", audit_path.display()))?,
        );
        let service = OverlapService::new(config, store.clone(), store.clone(), audit)?;

        let actor = cli
            .roles
            .iter()
            .fold(Actor::new(cli.actor.clone()), |actor, role| actor.with_role(role.clone()));

        Ok(Self {
            store,
            service,
            actor,
            snapshot: cli.snapshot.clone(),
            json: cli.json,
        })
    }

    fn save(&self) -> Result<()> {
        self.store
            .save_json(&self.snapshot)
            .with_context(|| format!("writing snapshot {}", self.snapshot.display()))?;
        tracing::debug!(path = %self.snapshot.display(), "snapshot saved");
        Ok(())
    }

    fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Audit log kept beside the snapshot it describes.
fn default_audit_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("parcels"));
    name.push(".audit.jsonl");
    snapshot.with_file_name(name)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let session = Session::open(&cli)?;

    match &cli.command {
        Commands::Scan { filter } => cmd_scan(&session, filter),
        Commands::Check { parcel, submitter } => cmd_check(&session, parcel, submitter.as_deref()),
        Commands::Archive {
            overlap,
            target,
            reason,
        } => cmd_resolve(&session, overlap, Some(target), reason, |s, id, t, r| {
            s.service.archive(&s.actor, id, t, r)
        }),
        Commands::Delete {
            overlap,
            target,
            reason,
        } => cmd_resolve(&session, overlap, Some(target), reason, |s, id, t, r| {
            s.service.delete(&s.actor, id, t, r)
        }),
        Commands::Ignore { overlap, reason } => {
            cmd_resolve(&session, overlap, None, reason, |s, id, _, r| {
                s.service.ignore(&s.actor, id, r)
            })
        }
        Commands::Stats => cmd_stats(&session),
        Commands::Audit { types, limit } => cmd_audit(&session, types, *limit),
    }
}

fn cmd_scan(session: &Session, filter: &FilterArgs) -> Result<ExitCode> {
    let report = session.service.run_scan(&session.actor)?;
    let records = session.service.list_overlaps(&filter.to_filter()?)?;

    if session.json {
        session.print_json(&serde_json::json!({
            "records": records,
            "warnings": report.warnings,
            "stats": report.stats,
        }))?;
    } else {
        output::print_scan_summary(&report);
        let context = session.service.report_context(&records)?;
        output::print_records(
            &records,
            &context,
            &session.service.ledger(),
            &session.service.config().thresholds,
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(session: &Session, path: &Path, submitter: Option<&str>) -> Result<ExitCode> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading parcel {}", path.display()))?;
    let parcel: Parcel = serde_json::from_str(&contents)
        .with_context(|| format!("parsing parcel {}", path.display()))?;
    let submitter = submitter.map(str::to_string).unwrap_or_else(|| parcel.owner_id.clone());

    let outcome = session.service.submit_parcel(&submitter, parcel)?;
    session.save()?;

    if session.json {
        session.print_json(&outcome)?;
    } else {
        let verdict = match outcome.decision {
            PolicyAction::Allow => "accepted".green().bold(),
            PolicyAction::Warn => "flagged for review".yellow().bold(),
            PolicyAction::AutoReject => "rejected".red().bold(),
        };
        println!("{} {}", outcome.parcel_id.to_string().bold(), verdict);
        let context = session.service.report_context(&outcome.overlaps)?;
        output::print_records(
            &outcome.overlaps,
            &context,
            &session.service.ledger(),
            &session.service.config().thresholds,
        );
    }
    Ok(if outcome.is_rejected() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_resolve<F>(
    session: &Session,
    overlap: &PairKey,
    target: Option<&String>,
    reason: &str,
    apply: F,
) -> Result<ExitCode>
where
    F: Fn(&Session, &PairKey, &ParcelId, &str) -> parcelguard_engine::Result<ResolutionAction>,
{
    session.service.run_scan(&session.actor)?;
    let target = target
        .map(|t| ParcelId::from(t.as_str()))
        .unwrap_or_else(|| overlap.low().clone());

    match apply(session, overlap, &target, reason) {
        Ok(action) => {
            session.save()?;
            if session.json {
                session.print_json(&action)?;
            } else {
                println!(
                    "{} {:?} {} ({})",
                    "ok".green().bold(),
                    action.action,
                    action.overlap_record_id,
                    action.id
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_conflict() => {
            eprintln!("{} {err}", "conflict:".yellow().bold());
            Ok(ExitCode::from(3))
        }
        Err(err @ OverlapError::MissingReason) => {
            Err(anyhow!(err).context("pass --reason to delete a listing"))
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_stats(session: &Session) -> Result<ExitCode> {
    session.service.run_scan(&session.actor)?;
    let stats = session.service.stats();
    if session.json {
        session.print_json(&stats)?;
    } else {
        output::print_stats(&stats);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_audit(session: &Session, types: &[AuditActionType], limit: usize) -> Result<ExitCode> {
    let entries = session.service.get_audit_history(types, Some(limit))?;
    if session.json {
        session.print_json(&entries)?;
    } else {
        output::print_audit(&entries);
    }
    Ok(ExitCode::SUCCESS)
}
