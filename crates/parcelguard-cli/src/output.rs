//! Terminal rendering for scan results, stats and audit history.

use colored::{ColoredString, Colorize};
use parcelguard_engine::{
    AuditLogEntry, OverlapRecord, OverlapStats, ParcelId, ReportContext, ResolutionLedger,
    ScanReport, Severity, SeverityThresholds,
};

pub fn severity_label(record: &OverlapRecord, thresholds: &SeverityThresholds) -> ColoredString {
    let label = thresholds.label(record.overlap_percentage);
    match (label, record.severity) {
        ("critical", _) => label.red().bold(),
        (_, Severity::Blocked) => label.red(),
        (_, Severity::High) => label.yellow(),
        (_, Severity::Low) => label.normal(),
    }
}

fn owner_cell(context: &ReportContext, record: &OverlapRecord) -> String {
    let name = |id: &ParcelId| {
        context
            .summary(id)
            .and_then(|s| s.owner.as_ref())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "?".to_string())
    };
    if record.same_owner {
        format!("same ({})", name(&record.parcel_a_id))
    } else {
        format!("{} / {}", name(&record.parcel_a_id), name(&record.parcel_b_id))
    }
}

pub fn print_records(
    records: &[OverlapRecord],
    context: &ReportContext,
    ledger: &ResolutionLedger,
    thresholds: &SeverityThresholds,
) {
    if records.is_empty() {
        println!("{}", "no overlaps".green());
        return;
    }
    println!(
        "{:<32} {:>8} {:>12}  {:<9} {:<8} {}",
        "OVERLAP".bold(),
        "PCT".bold(),
        "AREA m²".bold(),
        "SEVERITY".bold(),
        "STATE".bold(),
        "OWNERS".bold()
    );
    for record in records {
        let state = format!("{:?}", ledger.state(&record.id)).to_lowercase();
        println!(
            "{:<32} {:>7.2}% {:>12.1}  {:<9} {:<8} {}",
            record.id.to_string(),
            record.overlap_percentage,
            record.overlap_area_m2,
            severity_label(record, thresholds),
            state,
            owner_cell(context, record)
        );
    }
}

pub fn print_scan_summary(report: &ScanReport) {
    let s = &report.stats;
    eprintln!(
        "{} {} parcels, {} pairs ({} pruned by bbox, {} intersected), {} overlaps in {} ms",
        "scanned".green().bold(),
        s.parcels_scanned,
        s.pairs_total,
        s.bbox_rejected,
        s.intersections_computed,
        s.records_emitted,
        s.elapsed_ms
    );
    if report.skipped_parcels() > 0 {
        eprintln!(
            "{} {} parcels skipped due to invalid geometry or duplicate ids",
            "warning:".yellow().bold(),
            report.skipped_parcels()
        );
    }
    for warning in &report.warnings {
        eprintln!("  {} {}", "→".yellow(), warning.message);
    }
}

pub fn print_stats(stats: &OverlapStats) {
    println!("{:<18} {}", "total".bold(), stats.total);
    for (severity, count) in &stats.by_severity {
        println!("{:<18} {}", severity.as_str(), count);
    }
    println!("{:<18} {}", "critical (label)", stats.critical);
    println!("{:<18} {}", "same owner", stats.same_owner);
    println!("{:<18} {}", "different owner", stats.different_owner);
    println!("{:<18} {}", "open", stats.open);
    println!("{:<18} {:.1} m²", "overlap area", stats.total_overlap_area_m2);
}

pub fn print_audit(entries: &[AuditLogEntry]) {
    if entries.is_empty() {
        println!("no audit entries");
        return;
    }
    for entry in entries {
        println!(
            "{}  {:<28} {:<12} {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action_type.as_str().cyan(),
            entry.actor_id,
            entry.subject_ids.join(", ")
        );
        if let Ok(Some(resolution)) = entry.resolution() {
            if !resolution.reason.is_empty() {
                println!("{:>21} {}", "reason:".dimmed(), resolution.reason);
            }
        }
    }
}
