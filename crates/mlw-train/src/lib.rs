//! Built-in training routine: logistic regression on the diabetes dataset,
//! plus a generator for synthetic data of the same shape.

pub mod dataset;
pub mod evaluate;
pub mod logistic;
pub mod routine;
pub mod sample;
pub mod split;

pub use dataset::{Dataset, DEFAULT_LABEL};
pub use evaluate::{accuracy, roc_auc};
pub use logistic::{FitOptions, LogisticModel};
pub use routine::{
    train_and_evaluate, DiabetesTraining, TrainArgs, TrainingReport, MODEL_ARTIFACT, ROUTINE_NAME,
};
pub use sample::{generate, write_csv, PatientRecord};
pub use split::train_test_split;

/// Registry holding every routine this crate provides.
pub fn builtin_routines() -> mlw_exp::RoutineRegistry {
    mlw_exp::RoutineRegistry::new().with(DiabetesTraining)
}
