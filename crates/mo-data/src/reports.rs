//! Score reports and the classifier evaluation log.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use mo_types::{
    sorted_score_rows, Candidate, ClassifierEvaluation, DataError, EvaluationRecord, MoResult,
    ScoreRow,
};
use serde::{Deserialize, Serialize};

use crate::storage::{read_existing, write_atomic};

/// On-disk shape of a score row: nested values stored as JSON text.
#[derive(Debug, Serialize, Deserialize)]
struct ScoreReportRow {
    mean_score: f64,
    half_std: f64,
    parameters: String,
    fold_scores: String,
}

impl TryFrom<&ScoreRow> for ScoreReportRow {
    type Error = serde_json::Error;

    fn try_from(row: &ScoreRow) -> Result<Self, Self::Error> {
        Ok(Self {
            mean_score: row.mean_score,
            half_std: row.half_std,
            parameters: serde_json::to_string(&row.parameters)?,
            fold_scores: serde_json::to_string(&row.fold_scores)?,
        })
    }
}

/// Write score rows in the given order.
pub fn write_score_report<P: AsRef<Path>>(path: P, rows: &[ScoreRow]) -> MoResult<()> {
    let path = path.as_ref();
    write_atomic(path, |file| {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(&mut *file);
        for row in rows {
            writer.serialize(ScoreReportRow::try_from(row)?)?;
        }
        writer.flush()?;
        Ok(())
    })?;
    tracing::info!("Wrote {} score rows to {}", rows.len(), path.display());
    Ok(())
}

/// Sort `history` by descending mean score, log each row and persist it.
/// Returns the sorted rows.
pub fn save_score_history<P: AsRef<Path>>(
    path: P,
    history: &[EvaluationRecord],
) -> MoResult<Vec<ScoreRow>> {
    let rows = sorted_score_rows(history);
    for row in &rows {
        tracing::info!("{}", row);
    }
    write_score_report(path, &rows)?;
    Ok(rows)
}

pub fn read_score_report<P: AsRef<Path>>(path: P) -> MoResult<Vec<ScoreRow>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DataError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for (index, result) in rdr.deserialize::<ScoreReportRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let raw = result.map_err(|e| DataError::ParseError {
            line,
            message: e.to_string(),
        })?;
        let parameters: Candidate =
            serde_json::from_str(&raw.parameters).map_err(|e| DataError::ParseError {
                line,
                message: format!("parameters: {e}"),
            })?;
        let fold_scores: Vec<f64> =
            serde_json::from_str(&raw.fold_scores).map_err(|e| DataError::ParseError {
                line,
                message: format!("fold_scores: {e}"),
            })?;
        rows.push(ScoreRow {
            mean_score: raw.mean_score,
            half_std: raw.half_std,
            parameters,
            fold_scores,
        });
    }
    Ok(rows)
}

/// On-disk shape of one evaluation-log row.
#[derive(Debug, Serialize, Deserialize)]
struct EvaluationLogRow {
    name: String,
    method: String,
    parameters: String,
    accuracy: f64,
    f1_weighted: f64,
    precision_weighted: f64,
    recall_weighted: f64,
    precision_positive: f64,
    precision_negative: f64,
    recall_positive: f64,
    recall_negative: f64,
    f1_positive: f64,
    f1_negative: f64,
    support_positive: usize,
    support_negative: usize,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<&ClassifierEvaluation> for EvaluationLogRow {
    type Error = serde_json::Error;

    fn try_from(e: &ClassifierEvaluation) -> Result<Self, Self::Error> {
        Ok(Self {
            name: e.name.clone(),
            method: e.method.clone(),
            parameters: serde_json::to_string(&e.parameters)?,
            accuracy: e.accuracy,
            f1_weighted: e.f1_weighted,
            precision_weighted: e.precision_weighted,
            recall_weighted: e.recall_weighted,
            precision_positive: e.precision_positive,
            precision_negative: e.precision_negative,
            recall_positive: e.recall_positive,
            recall_negative: e.recall_negative,
            f1_positive: e.f1_positive,
            f1_negative: e.f1_negative,
            support_positive: e.support_positive,
            support_negative: e.support_negative,
            recorded_at: e.recorded_at,
        })
    }
}

/// Write `evaluations` to the log at `path`.
///
/// With `append`, rows are added after the existing ones and the header is
/// only written when the file is new or empty; otherwise the file is
/// replaced.
pub fn save_evaluations<P: AsRef<Path>>(
    path: P,
    evaluations: &[ClassifierEvaluation],
    append: bool,
) -> MoResult<()> {
    let path = path.as_ref();
    let existing = if append {
        read_existing(path)?
    } else {
        Vec::new()
    };

    write_atomic(path, |file| {
        file.write_all(&existing)?;
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            file.write_all(b"\n")?;
        }
        let mut writer = WriterBuilder::new()
            .has_headers(existing.is_empty())
            .from_writer(&mut *file);
        for evaluation in evaluations {
            writer.serialize(EvaluationLogRow::try_from(evaluation)?)?;
        }
        writer.flush()?;
        Ok(())
    })?;

    tracing::info!(
        "{} {} evaluation(s) to {}",
        if append { "Appended" } else { "Wrote" },
        evaluations.len(),
        path.display()
    );
    Ok(())
}

pub fn read_evaluations<P: AsRef<Path>>(path: P) -> MoResult<Vec<ClassifierEvaluation>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut evaluations = Vec::new();
    for (index, result) in rdr.deserialize::<EvaluationLogRow>().enumerate() {
        let line = index + 2;
        let row = result.map_err(|e| DataError::ParseError {
            line,
            message: e.to_string(),
        })?;
        let parameters: Candidate =
            serde_json::from_str(&row.parameters).map_err(|e| DataError::ParseError {
                line,
                message: format!("parameters: {e}"),
            })?;
        evaluations.push(ClassifierEvaluation {
            name: row.name,
            method: row.method,
            parameters,
            accuracy: row.accuracy,
            f1_weighted: row.f1_weighted,
            precision_weighted: row.precision_weighted,
            recall_weighted: row.recall_weighted,
            precision_positive: row.precision_positive,
            precision_negative: row.precision_negative,
            recall_positive: row.recall_positive,
            recall_negative: row.recall_negative,
            f1_positive: row.f1_positive,
            f1_negative: row.f1_negative,
            support_positive: row.support_positive,
            support_negative: row.support_negative,
            recorded_at: row.recorded_at,
        });
    }
    Ok(evaluations)
}
