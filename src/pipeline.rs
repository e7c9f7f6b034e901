use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::stages::{
    enrich_with_holidays, finalize_output, find_excel_files, merge_excel_files, merge_weather,
    outputs_identical, ExcelMergeOptions, StageError, StageStats,
};
use crate::table::{write_atomic, TableError};
use crate::validator::validate_master;

/// How far the data has progressed through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    NotStarted,
    ExcelMerged,
    HolidayEnriched,
    WeatherMerged,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ExcelMerge,
    HolidayEnrich,
    WeatherMerge,
    Finalize,
}

impl StageId {
    /// Status reached once this stage has been completed or skipped
    pub fn reaches(self) -> PipelineStatus {
        match self {
            StageId::ExcelMerge => PipelineStatus::ExcelMerged,
            StageId::HolidayEnrich => PipelineStatus::HolidayEnriched,
            StageId::WeatherMerge => PipelineStatus::WeatherMerged,
            StageId::Finalize => PipelineStatus::Finalized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Skipped,
    Completed,
    WouldRun,
    Failed,
}

/// One step of the pipeline: what it reads, what it writes, how to run it
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub name: &'static str,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    run: fn(&PipelineConfig) -> Result<StageStats, StageError>,
    up_to_date: fn(&Stage) -> bool,
}

impl Stage {
    /// True when the stage's result is on disk and unchanged since it was recorded
    pub fn is_up_to_date(&self, previous: Option<&PipelineState>) -> bool {
        (self.up_to_date)(self) && self.matches_record(previous)
    }

    /// Whether this run would execute the stage rather than skip it
    pub fn will_run(&self, force: bool, previous: Option<&PipelineState>) -> bool {
        force || !self.is_up_to_date(previous)
    }

    /// Compare the output against the digest of the last run; with no digest
    /// on record the output's presence decides
    fn matches_record(&self, previous: Option<&PipelineState>) -> bool {
        let recorded = previous
            .and_then(|state| state.record(self.id))
            .and_then(|record| record.output_digest.as_deref());
        match recorded {
            Some(recorded) => {
                let matches = file_digest(&self.output).as_deref() == Some(recorded);
                if !matches {
                    debug!("{} changed since the last run", self.output.display());
                }
                matches
            }
            None => true,
        }
    }

    pub fn run(&self, config: &PipelineConfig) -> Result<StageStats, StageError> {
        (self.run)(config)
    }
}

fn output_exists(stage: &Stage) -> bool {
    stage.output.exists()
}

fn output_matches_input(stage: &Stage) -> bool {
    stage
        .inputs
        .first()
        .is_some_and(|source| outputs_identical(source, &stage.output))
}

fn run_excel_merge(config: &PipelineConfig) -> Result<StageStats, StageError> {
    let options = ExcelMergeOptions {
        hourly_only: config.hourly_only,
    };
    merge_excel_files(&config.excel_dir, &config.master_data_file, options).map(Into::into)
}

fn run_holiday_enrich(config: &PipelineConfig) -> Result<StageStats, StageError> {
    enrich_with_holidays(
        &config.master_data_file,
        &config.holiday_file,
        &config.enriched_data_file,
    )
    .map(Into::into)
}

fn run_weather_merge(config: &PipelineConfig) -> Result<StageStats, StageError> {
    merge_weather(
        &config.enriched_data_file,
        &config.weather_file,
        &config.merged_data_file,
    )
    .map(Into::into)
}

fn run_finalize(config: &PipelineConfig) -> Result<StageStats, StageError> {
    finalize_output(&config.merged_data_file, &config.output_dir).map(Into::into)
}

/// The four stages in execution order
pub fn build_stages(config: &PipelineConfig) -> Vec<Stage> {
    vec![
        Stage {
            id: StageId::ExcelMerge,
            name: "Merge Excel files",
            inputs: vec![config.excel_dir.clone()],
            output: config.master_data_file.clone(),
            run: run_excel_merge,
            up_to_date: output_exists,
        },
        Stage {
            id: StageId::HolidayEnrich,
            name: "Add holiday data",
            inputs: vec![config.master_data_file.clone(), config.holiday_file.clone()],
            output: config.enriched_data_file.clone(),
            run: run_holiday_enrich,
            up_to_date: output_exists,
        },
        Stage {
            id: StageId::WeatherMerge,
            name: "Merge weather data",
            inputs: vec![config.enriched_data_file.clone(), config.weather_file.clone()],
            output: config.merged_data_file.clone(),
            run: run_weather_merge,
            up_to_date: output_exists,
        },
        Stage {
            id: StageId::Finalize,
            name: "Finalize output",
            inputs: vec![config.merged_data_file.clone()],
            output: config.final_output_file(),
            run: run_finalize,
            up_to_date: output_matches_input,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub name: String,
    pub outcome: StageOutcome,
    pub output: PathBuf,
    pub rows: Option<usize>,
    pub summary: Option<String>,
    pub duration_ms: u64,
    /// BLAKE3 hex digest of the output file, when it exists
    pub output_digest: Option<String>,
    pub error: Option<String>,
}

/// Record of one pipeline run, persisted after every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub status: PipelineStatus,
    pub dry_run: bool,
    pub force: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
}

impl PipelineState {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            status: PipelineStatus::NotStarted,
            dry_run: config.dry_run,
            force: config.force,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        }
    }

    pub fn record(&self, stage: StageId) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn outcome(&self, stage: StageId) -> Option<StageOutcome> {
        self.record(stage).map(|r| r.outcome)
    }

    /// Stages with the given outcome, in run order
    pub fn stages_with(&self, outcome: StageOutcome) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.stage)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let contents = fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        write_atomic(path, |file| {
            serde_json::to_writer_pretty(&mut *file, self)?;
            Ok(())
        })
    }
}

/// State left by the previous run, if one was recorded and can be read
fn load_previous(path: &Path) -> Option<PipelineState> {
    if !path.exists() {
        return None;
    }
    match PipelineState::load(path) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Ignoring unreadable pipeline state: {}", e);
            None
        }
    }
}

/// A skipped stage whose output digest is already on record
fn unchanged_since(previous: Option<&PipelineState>, record: &StageRecord) -> bool {
    record.outcome == StageOutcome::Skipped
        && previous
            .and_then(|state| state.record(record.stage))
            .is_some_and(|prev| prev.output_digest == record.output_digest)
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pre-flight checks failed: {}", .0.join("; "))]
    Preflight(Vec<String>),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("Cannot record pipeline state: {0}")]
    StateFile(#[from] TableError),
}

/// Verify the external inputs of every stage that is going to run
pub fn preflight_checks(
    config: &PipelineConfig,
    stages: &[Stage],
    previous: Option<&PipelineState>,
) -> Result<(), PipelineError> {
    let mut problems = Vec::new();

    for stage in stages.iter().filter(|s| s.will_run(config.force, previous)) {
        match stage.id {
            StageId::ExcelMerge => match find_excel_files(&config.excel_dir) {
                Ok(files) if files.is_empty() => problems.push(format!(
                    "No Excel files found in {}",
                    config.excel_dir.display()
                )),
                Ok(_) => {}
                Err(e) => problems.push(e.to_string()),
            },
            StageId::HolidayEnrich => {
                if !config.holiday_file.is_file() {
                    problems.push(format!(
                        "Holiday file not found: {}",
                        config.holiday_file.display()
                    ));
                }
            }
            StageId::WeatherMerge => {
                if !config.weather_file.is_file() {
                    problems.push(format!(
                        "Weather file not found: {}",
                        config.weather_file.display()
                    ));
                }
            }
            StageId::Finalize => {}
        }
    }

    if problems.is_empty() {
        info!("Pre-flight checks passed");
        Ok(())
    } else {
        for problem in &problems {
            error!("{}", problem);
        }
        Err(PipelineError::Preflight(problems))
    }
}

/// Run the stages in order, skipping those whose output is already present
/// and matches the digest recorded by the previous run
///
/// With `force` every stage runs; with `dry_run` nothing is written and each
/// stage that would run is reported as `WouldRun`. The first failing stage
/// halts the run; earlier outputs are left in place. A run that skips every
/// stage leaves an existing state file untouched.
#[instrument(skip_all, fields(force = config.force, dry_run = config.dry_run))]
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineState, PipelineError> {
    info!("{}", "=".repeat(60));
    info!("DPDC load data pipeline");
    if config.dry_run {
        info!("DRY RUN: no files will be written");
    }
    if config.force {
        info!("FORCE: every stage will be regenerated");
    }
    info!("{}", "=".repeat(60));

    let stages = build_stages(config);
    let previous = load_previous(&config.state_file);
    preflight_checks(config, &stages, previous.as_ref())?;

    let mut state = PipelineState::new(config);
    let mut state_changed = previous.is_none();
    let run_start = Instant::now();

    for (step, stage) in stages.iter().enumerate() {
        info!("[{}/{}] {}", step + 1, stages.len(), stage.name);
        let started = Instant::now();

        let record = if !stage.will_run(config.force, previous.as_ref()) {
            info!("Output up to date, skipping: {}", stage.output.display());
            StageRecord {
                stage: stage.id,
                name: stage.name.to_string(),
                outcome: StageOutcome::Skipped,
                output: stage.output.clone(),
                rows: None,
                summary: None,
                duration_ms: 0,
                output_digest: file_digest(&stage.output),
                error: None,
            }
        } else if config.dry_run {
            info!("[DRY RUN] Would write {}", stage.output.display());
            StageRecord {
                stage: stage.id,
                name: stage.name.to_string(),
                outcome: StageOutcome::WouldRun,
                output: stage.output.clone(),
                rows: None,
                summary: None,
                duration_ms: 0,
                output_digest: None,
                error: None,
            }
        } else {
            match stage.run(config) {
                Ok(stats) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    info!(
                        stage = stage.name,
                        rows = stats.rows,
                        duration_ms,
                        "{}",
                        stats.summary
                    );
                    StageRecord {
                        stage: stage.id,
                        name: stage.name.to_string(),
                        outcome: StageOutcome::Completed,
                        output: stage.output.clone(),
                        rows: stats.rows,
                        summary: Some(stats.summary),
                        duration_ms,
                        output_digest: file_digest(&stage.output),
                        error: None,
                    }
                }
                Err(e) => {
                    error!(stage = stage.name, error = %e, "Stage failed");
                    state.stages.push(StageRecord {
                        stage: stage.id,
                        name: stage.name.to_string(),
                        outcome: StageOutcome::Failed,
                        output: stage.output.clone(),
                        rows: None,
                        summary: None,
                        duration_ms: started.elapsed().as_millis() as u64,
                        output_digest: None,
                        error: Some(e.to_string()),
                    });
                    state.finished_at = Some(Utc::now());
                    if let Err(save_err) = state.save(&config.state_file) {
                        warn!("Could not record pipeline state: {}", save_err);
                    }
                    return Err(PipelineError::Stage {
                        stage: stage.name,
                        source: e,
                    });
                }
            }
        };

        state_changed |= !unchanged_since(previous.as_ref(), &record);
        state.stages.push(record);
        state.status = stage.id.reaches();
        if !config.dry_run && state_changed {
            state.save(&config.state_file)?;
        }

        if stage.id == StageId::ExcelMerge && config.validate {
            run_validation(config);
        }
    }

    state.finished_at = Some(Utc::now());
    if !config.dry_run {
        if state_changed {
            state.save(&config.state_file)?;
        } else {
            info!("Nothing changed, keeping {}", config.state_file.display());
        }
    }

    let ran = state.stages_with(StageOutcome::Completed).len();
    let skipped = state.stages_with(StageOutcome::Skipped).len();
    let would_run = state.stages_with(StageOutcome::WouldRun).len();
    info!("{}", "=".repeat(60));
    if config.dry_run {
        info!(would_run, skipped, "DRY RUN complete");
    } else {
        info!(
            ran,
            skipped,
            elapsed_ms = run_start.elapsed().as_millis() as u64,
            "Pipeline completed successfully"
        );
        info!("Final output: {}", config.final_output_file().display());
    }
    info!("{}", "=".repeat(60));

    Ok(state)
}

/// Advisory check of the master table; problems are logged, never fatal
fn run_validation(config: &PipelineConfig) {
    if !config.master_data_file.is_file() {
        info!(
            "Skipping validation, {} not present",
            config.master_data_file.display()
        );
        return;
    }
    match validate_master(&config.master_data_file) {
        Ok(report) => {
            report.log_summary();
            if report.issues_found() {
                warn!("Validation found issues in {}", config.master_data_file.display());
            }
        }
        Err(e) => warn!("Validation could not run: {}", e),
    }
}

fn file_digest(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| blake3::hash(&bytes).to_hex().to_string())
}
