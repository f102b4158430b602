use std::iter;
use std::path::PathBuf;

use clap::Parser;
use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::metrics::RunLogger;
use mlw_exp::{RoutineContext, TrainingRoutine};

use crate::dataset::{Dataset, DEFAULT_LABEL};
use crate::evaluate::{accuracy, roc_auc};
use crate::logistic::{FitOptions, LogisticModel};
use crate::split::train_test_split;

/// Name under which [`DiabetesTraining`] registers itself.
pub const ROUTINE_NAME: &str = "diabetes-logistic";

/// Relative path of the model artifact inside the run.
pub const MODEL_ARTIFACT: &str = "outputs/diabetes_model.bin";

/// Command line accepted by the routine. Flags keep their underscore
/// spelling so `--reg_rate 0.1` works as written.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = ROUTINE_NAME, about = "Train a diabetes classifier")]
pub struct TrainArgs {
    #[arg(long = "reg_rate", default_value_t = 0.01)]
    pub reg_rate: f64,
    /// CSV file, relative to the working directory.
    #[arg(long, default_value = "diabetes.csv")]
    pub data: PathBuf,
    #[arg(long, default_value = DEFAULT_LABEL)]
    pub label: String,
    #[arg(long = "test_size", default_value_t = 0.30)]
    pub test_size: f64,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    #[arg(long, default_value_t = 1000)]
    pub epochs: usize,
    #[arg(long = "learning_rate", default_value_t = 0.5)]
    pub learning_rate: f64,
}

impl TrainArgs {
    pub fn parse_args(args: &[String]) -> Result<Self, MlwError> {
        Self::try_parse_from(iter::once(ROUTINE_NAME.to_string()).chain(args.iter().cloned()))
            .map_err(|err| {
                MlwError::Validation(
                    ErrorInfo::new("train.args", err.to_string().trim().to_string())
                        .with_context("args", args.join(" ")),
                )
            })
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            reg_rate: self.reg_rate,
            epochs: self.epochs,
            learning_rate: self.learning_rate,
        }
    }
}

/// Result of one train/evaluate pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub model: LogisticModel,
    pub train_rows: usize,
    pub test_rows: usize,
    pub accuracy: f64,
    pub auc: f64,
}

/// Splits `data`, fits on the training rows and scores the held-out rows.
pub fn train_and_evaluate(data: &Dataset, args: &TrainArgs) -> Result<TrainingReport, MlwError> {
    let (train_idx, test_idx) = train_test_split(data.len(), args.test_size, args.seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(MlwError::Validation(
            ErrorInfo::new("train.split", "split leaves an empty train or test set")
                .with_context("rows", data.len().to_string())
                .with_context("test_size", args.test_size.to_string()),
        ));
    }
    let train = data.subset(&train_idx);
    let test = data.subset(&test_idx);
    let model = LogisticModel::fit(&train, &args.fit_options())?;
    let scores: Vec<f64> = test.rows.iter().map(|row| model.predict_proba(row)).collect();
    let predictions: Vec<f64> = scores
        .iter()
        .map(|&p| if p >= 0.5 { 1.0 } else { 0.0 })
        .collect();
    Ok(TrainingReport {
        accuracy: accuracy(&test.labels, &predictions),
        auc: roc_auc(&test.labels, &scores),
        train_rows: train.len(),
        test_rows: test.len(),
        model,
    })
}

/// Inline routine: loads the CSV, logs `Regularization Rate`, `Accuracy`
/// and `AUC`, and saves the model to `outputs/diabetes_model.bin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiabetesTraining;

impl DiabetesTraining {
    /// Manifest text naming this routine, for use as an inline entry script.
    pub fn manifest(reg_rate: f64) -> String {
        format!("routine = \"{ROUTINE_NAME}\"\n\n[defaults]\nreg_rate = {reg_rate:?}\n")
    }
}

impl TrainingRoutine for DiabetesTraining {
    fn name(&self) -> &str {
        ROUTINE_NAME
    }

    fn run(&self, ctx: &RoutineContext) -> Result<(), MlwError> {
        let args = TrainArgs::parse_args(&ctx.args)?;
        ctx.print("Loading Data...");
        let data = Dataset::from_csv(&ctx.path(&args.data), &args.label)?;
        ctx.logger.log("Regularization Rate", args.reg_rate);

        ctx.print(format!(
            "Training a logistic regression model with regularization rate of {}",
            args.reg_rate
        ));
        let report = train_and_evaluate(&data, &args)?;
        ctx.print(format!("Accuracy: {}", report.accuracy));
        ctx.logger.log("Accuracy", report.accuracy);
        ctx.print(format!("AUC: {}", report.auc));
        ctx.logger.log("AUC", report.auc);

        let artifact = ctx.path(MODEL_ARTIFACT);
        report.model.save(&artifact)?;
        log::debug!(
            "run {} trained on {} rows, saved {}",
            ctx.run_id,
            report.train_rows,
            artifact.display()
        );
        Ok(())
    }
}
