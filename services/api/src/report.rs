use crate::infra::{parse_program, parse_sort, parse_status};
use clap::Args;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stewardship::compliance::{
    ComplianceQuery, ComplianceReport, ComplianceService, ComplianceStatus, EventBulkReport,
    InMemoryOffsetRepository, OffsetToggles, Program, RequirementCalculator, SortKey, SortOrder,
};
use stewardship::config::AppConfig;
use stewardship::dataset::{Dataset, ImportReport};
use stewardship::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct ComplianceReportArgs {
    /// Dataset directory (defaults to APP_DATA_DIR)
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
    /// Program year (defaults to APP_PROGRAM_YEAR or the current year)
    #[arg(long)]
    pub(crate) year: Option<i32>,
    /// Restrict the report to one program
    #[arg(long, value_parser = parse_program)]
    pub(crate) program: Option<Program>,
    /// Only list communities with this status
    #[arg(long, value_parser = parse_status)]
    pub(crate) status: Option<ComplianceStatus>,
    /// Sort key for the listed rows
    #[arg(long, value_parser = parse_sort)]
    pub(crate) sort: Option<SortKey>,
    /// Sort in descending order
    #[arg(long)]
    pub(crate) desc: bool,
    /// Apply eligible events to shortfall communities before reporting
    #[arg(long)]
    pub(crate) apply_events: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RequirementArgs {
    /// Community population
    #[arg(long)]
    pub(crate) population: u64,
    /// Program tag
    #[arg(long, value_parser = parse_program)]
    pub(crate) program: Program,
    /// Dataset directory whose rules.json should be honoured
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

pub(crate) struct ReportOutput {
    pub(crate) import: ImportReport,
    pub(crate) events: Vec<EventBulkReport>,
    pub(crate) report: ComplianceReport,
}

pub(crate) fn run_compliance_report(args: ComplianceReportArgs) -> Result<(), AppError> {
    let (data_dir, year) = match (args.data_dir.clone(), args.year) {
        (Some(dir), Some(year)) => (dir, year),
        (dir, year) => {
            let config = AppConfig::load()?;
            (
                dir.unwrap_or(config.data.dir),
                year.unwrap_or(config.data.program_year),
            )
        }
    };

    let output = build_report(&data_dir, year, &args)?;
    print!("{}", render_report(&data_dir, year, &output));
    Ok(())
}

pub(crate) fn run_requirement(args: RequirementArgs) -> Result<(), AppError> {
    let calculator = requirement_calculator(args.data_dir.as_deref())?;
    let required = calculator.required(args.population, args.program);
    println!(
        "{} sites required for {} residents ({})",
        required,
        args.population,
        args.program.label()
    );
    Ok(())
}

pub(crate) fn requirement_calculator(
    data_dir: Option<&Path>,
) -> Result<RequirementCalculator, AppError> {
    match data_dir {
        Some(dir) => Ok(Dataset::load_calculator(dir)?),
        None => Ok(RequirementCalculator::standard()),
    }
}

pub(crate) fn build_report(
    data_dir: &Path,
    year: i32,
    args: &ComplianceReportArgs,
) -> Result<ReportOutput, AppError> {
    let (dataset, import) = Dataset::load_dir(data_dir)?;
    let service = ComplianceService::new(
        Arc::new(dataset),
        Arc::new(InMemoryOffsetRepository::new()),
    )
    .with_default_year(year);

    let programs: Vec<Program> = match args.program {
        Some(program) => vec![program],
        None => Program::ordered().to_vec(),
    };

    let mut events = Vec::new();
    if args.apply_events {
        for program in &programs {
            events.push(service.apply_all_events(*program, year)?);
        }
    }

    let mut query = ComplianceQuery::for_year(year);
    query.program = args.program;
    query.status = args.status;
    query.sort = args.sort.unwrap_or_default();
    query.order = if args.desc {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    };
    query.per_page = usize::MAX;
    query.offsets = OffsetToggles {
        event_offset: args.apply_events,
        ..OffsetToggles::default()
    };

    let report = service.compliance_report(&query)?;
    Ok(ReportOutput {
        import,
        events,
        report,
    })
}

pub(crate) fn render_report(data_dir: &Path, year: i32, output: &ReportOutput) -> String {
    let mut out = String::new();
    let summary = &output.report.summary;

    let _ = writeln!(out, "Stewardship compliance report");
    let _ = writeln!(out, "Dataset: {} (program year {})", data_dir.display(), year);
    let _ = writeln!(
        out,
        "Imported {} communities, {} sites, {} adjacency pairs",
        output.import.communities, output.import.sites, output.import.adjacency_pairs
    );

    if output.import.issues.is_empty() {
        let _ = writeln!(out, "\nImport issues: none");
    } else {
        let _ = writeln!(out, "\nImport issues");
        for issue in &output.import.issues {
            let _ = writeln!(out, "- {}:{} {}", issue.file, issue.line, issue.message);
        }
    }

    for bulk in &output.events {
        let _ = writeln!(
            out,
            "\n{} events: {} applied of cap {}{}",
            bulk.program.label(),
            bulk.total_applied,
            bulk.cap,
            if bulk.cap_reached { " (cap reached)" } else { "" }
        );
        for outcome in &bulk.results.succeeded {
            let _ = writeln!(
                out,
                "- {}: {} credited, {} still short",
                outcome.community_id, outcome.credited, outcome.remaining_shortfall
            );
        }
    }

    let _ = writeln!(out, "\nSummary");
    let _ = writeln!(
        out,
        "- {} rows: {} compliant, {} shortfall, {} excess",
        summary.rows, summary.compliant, summary.shortfall, summary.excess
    );
    let _ = writeln!(
        out,
        "- {} required, {} actual, {} short ({:.1}% compliant)",
        summary.total_adjusted_required,
        summary.total_actual,
        summary.total_shortfall,
        summary.overall_compliance_rate
    );

    if output.report.rows.items.is_empty() {
        let _ = writeln!(out, "\nCommunities: none");
    } else {
        let _ = writeln!(out, "\nCommunities");
        for row in &output.report.rows.items {
            let _ = writeln!(
                out,
                "- {} [{}]: {}/{} sites, {}",
                row.community_name,
                row.program.label(),
                row.effective_actual,
                row.adjusted_required,
                row.status_label
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data")
    }

    fn paint_args() -> ComplianceReportArgs {
        ComplianceReportArgs {
            program: Some(Program::Paint),
            ..ComplianceReportArgs::default()
        }
    }

    #[test]
    fn report_summarizes_the_sample_dataset() {
        let output = build_report(&sample_dir(), 2025, &paint_args()).expect("report builds");

        assert!(output.events.is_empty());
        assert_eq!(output.import.issues.len(), 4);
        assert_eq!(output.report.summary.rows, 6);
        assert_eq!(output.report.summary.total_required, 35);
        assert_eq!(output.report.summary.total_shortfall, 7);

        let text = render_report(&sample_dir(), 2025, &output);
        assert!(text.contains("- 6 rows: 1 compliant, 4 shortfall, 1 excess"));
        assert!(text.contains("- Milton [Paint]: 4/4 sites, Compliant"));
    }

    #[test]
    fn applying_events_credits_shortfall_communities() {
        let args = ComplianceReportArgs {
            apply_events: true,
            status: Some(ComplianceStatus::Shortfall),
            ..paint_args()
        };
        let output = build_report(&sample_dir(), 2025, &args).expect("report builds");

        assert_eq!(output.events.len(), 1);
        assert_eq!(output.events[0].total_applied, 3);
        assert!(output
            .report
            .rows
            .items
            .iter()
            .all(|row| row.status == ComplianceStatus::Shortfall));

        let text = render_report(&sample_dir(), 2025, &output);
        assert!(text.contains("Paint events: 3 applied of cap 12"));
    }

    #[test]
    fn requirement_reads_only_the_rules_document() {
        let dir = std::env::temp_dir().join(format!(
            "stewardship-api-rules-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("scratch directory created");
        std::fs::write(
            dir.join("rules.json"),
            r#"[{
                "id": "paint-rural",
                "program": "Paint",
                "category": "HSP",
                "rule_type": "site_calculation",
                "parameters": { "min_population": 1000, "sites_per_population": 2000 },
                "status": "Active"
            }]"#,
        )
        .expect("rules written");

        let calculator = requirement_calculator(Some(&dir)).expect("rules load without inventory");
        assert_eq!(calculator.required(8_000, Program::Paint), 4);

        let standard = requirement_calculator(None).expect("standard rules");
        assert_eq!(standard.required(8_000, Program::Paint), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_dataset_directory_is_an_error() {
        let missing = sample_dir().join("does-not-exist");
        let result = build_report(&missing, 2025, &paint_args());
        assert!(matches!(result, Err(AppError::Dataset(_))));
    }
}
