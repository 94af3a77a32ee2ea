use crate::infra::{build_orchestrator, load_store, parse_batch};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Args;
use publisher_migration::config::{AppConfig, ConfigError};
use publisher_migration::error::AppError;
use publisher_migration::telemetry;
use publisher_migration::workflows::publishers::{
    MigrationRequest, MigrationServiceError, MigrationStats, SessionId, SnapshotId,
    ValidationReport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub(crate) struct MigrateArgs {
    /// Legacy websites/contacts CSV export (falls back to MIGRATION_LEGACY_CSV)
    #[arg(long)]
    pub(crate) legacy_csv: Option<PathBuf>,
    /// Run every phase without writing anything
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Records per batch (falls back to MIGRATION_BATCH_SIZE)
    #[arg(long, value_parser = parse_batch)]
    pub(crate) batch: Option<usize>,
    /// Directory for the dated JSON report (falls back to MIGRATION_REPORT_DIR)
    #[arg(long)]
    pub(crate) report_dir: Option<PathBuf>,
    /// Run the validator first and refuse a live run on blocking errors
    #[arg(long)]
    pub(crate) validate_first: bool,
    /// Skip the pre-migration rollback snapshot
    #[arg(long)]
    pub(crate) no_snapshot: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ValidateArgs {
    /// Legacy websites/contacts CSV export (falls back to MIGRATION_LEGACY_CSV)
    #[arg(long)]
    pub(crate) legacy_csv: Option<PathBuf>,
}

/// Contents of `publisher-migration-YYYY-MM-DD.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MigrationReportFile {
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) dry_run: bool,
    pub(crate) session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) snapshot_id: Option<SnapshotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stats: Option<MigrationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

pub(crate) async fn run_migrate(args: MigrateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let csv = resolve_csv(args.legacy_csv, &config)?;
    let store = load_store(Some(&csv))?;
    let orchestrator = build_orchestrator(store, &config);
    let report_dir = args
        .report_dir
        .unwrap_or_else(|| config.migration.report_dir.clone());
    let today = Local::now().date_naive();

    let request = MigrationRequest {
        dry_run: args.dry_run,
        batch_size: args.batch,
        validate_first: args.validate_first,
        snapshot: !args.no_snapshot,
    };

    match orchestrator.run(request).await {
        Ok(outcome) => {
            let report = MigrationReportFile {
                generated_at: Utc::now(),
                dry_run: outcome.stats.dry_run,
                session_id: outcome.session_id,
                snapshot_id: outcome.snapshot_id,
                stats: Some(outcome.stats.clone()),
                validation: outcome.validation,
                error: None,
            };
            let path = write_report(&report_dir, today, &report)?;
            print_summary(&outcome.stats, &path);

            if outcome.stats.has_errors() {
                return Err(AppError::MigrationIncomplete {
                    errors: outcome.stats.errors.len(),
                    report: path,
                    stats: Box::new(outcome.stats),
                });
            }
            Ok(())
        }
        Err(MigrationServiceError::ValidationBlocked { session_id, report }) => {
            let error = format!(
                "validation found {} blocking errors; live migration refused",
                report.error_count
            );
            let file = MigrationReportFile {
                generated_at: Utc::now(),
                dry_run: false,
                session_id: session_id.clone(),
                snapshot_id: None,
                stats: None,
                validation: Some((*report).clone()),
                error: Some(error),
            };
            let path = write_report(&report_dir, today, &file)?;
            warn!(report = %path.display(), "live migration refused by validation");
            println!("Validation blocked the migration; report written to {}", path.display());
            Err(MigrationServiceError::ValidationBlocked { session_id, report }.into())
        }
        Err(other) => Err(other.into()),
    }
}

pub(crate) async fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let csv = resolve_csv(args.legacy_csv, &config)?;
    let orchestrator = build_orchestrator(load_store(Some(&csv))?, &config);
    let report = orchestrator.validate().await?;

    println!("Legacy data validation for {}", csv.display());
    println!(
        "- {} websites, {:.1}% complete",
        report.total_websites, report.completeness_percentage
    );
    println!(
        "- {} errors, {} warnings, {} info",
        report.error_count, report.warning_count, report.info_count
    );
    for issue in &report.issues {
        println!(
            "  [{:?}] {:?}: {} ({} affected)",
            issue.severity, issue.category, issue.message, issue.affected_count
        );
    }
    println!(
        "Ready for migration: {}",
        if report.ready_for_migration { "yes" } else { "no" }
    );
    Ok(())
}

fn resolve_csv(explicit: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf, AppError> {
    explicit
        .or_else(|| config.migration.legacy_csv.clone())
        .ok_or_else(|| {
            ConfigError::MissingValue {
                key: "MIGRATION_LEGACY_CSV",
            }
            .into()
        })
}

pub(crate) fn report_file_name(date: NaiveDate) -> String {
    format!("publisher-migration-{}.json", date.format("%Y-%m-%d"))
}

pub(crate) fn write_report(
    dir: &Path,
    date: NaiveDate,
    report: &MigrationReportFile,
) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(date));
    let payload = serde_json::to_vec_pretty(report)?;
    std::fs::write(&path, payload)?;
    info!(path = %path.display(), "migration report written");
    Ok(path)
}

fn print_summary(stats: &MigrationStats, report: &Path) {
    let mode = if stats.dry_run { "Dry run" } else { "Migration" };
    println!("{mode} finished in {:.1}s", stats.duration_ms as f64 / 1000.0);
    println!("- Mappings analyzed: {}", stats.mappings_analyzed);
    println!("- Websites processed: {}", stats.websites_processed);
    println!(
        "- Shadow publishers created: {} (reused {})",
        stats.shadow_publishers_created, stats.existing_publishers_reused
    );
    println!("- Offerings created: {}", stats.offerings_created);
    println!("- Relationships created: {}", stats.relationships_created);
    println!(
        "- Performance records created: {}",
        stats.performance_records_created
    );
    println!("- Skipped mappings: {}", stats.skipped.len());
    println!("- Errors: {}", stats.errors.len());
    for issue in &stats.errors {
        println!("  [{:?}] {}: {}", issue.kind, issue.subject, issue.message);
    }
    println!("Report: {}", report.display());
}
