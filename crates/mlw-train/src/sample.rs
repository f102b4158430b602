//! Synthetic patient records shaped like the diabetes dataset.

use std::path::Path;

use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::rng::RngHandle;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatientRecord {
    #[serde(rename = "PatientID")]
    pub patient_id: u64,
    pub pregnancies: u32,
    pub plasma_glucose: f64,
    pub diastolic_blood_pressure: f64,
    pub triceps_thickness: f64,
    pub serum_insulin: f64,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    pub diabetes_pedigree: f64,
    pub age: u32,
    pub diabetic: u8,
}

fn normal(rng: &mut RngHandle, mean: f64, std_dev: f64) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1]
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Generates `rows` records from `seed`. The label is drawn from a logistic
/// model of glucose, BMI, age, pregnancies and pedigree, so the data is
/// learnable but not separable.
pub fn generate(rows: usize, seed: u64) -> Vec<PatientRecord> {
    let mut rng = RngHandle::from_seed(seed);
    (0..rows)
        .map(|idx| {
            let pregnancies = rng.gen_range(0..=12u32);
            let plasma_glucose = normal(&mut rng, 105.0, 25.0).clamp(44.0, 200.0).round();
            let diastolic_blood_pressure = normal(&mut rng, 72.0, 12.0).clamp(24.0, 120.0).round();
            let triceps_thickness = normal(&mut rng, 28.0, 10.0).clamp(7.0, 60.0).round();
            let serum_insulin = normal(&mut rng, 120.0, 80.0).clamp(14.0, 800.0).round();
            let bmi = round2(normal(&mut rng, 31.0, 8.0).clamp(18.0, 57.0));
            let diabetes_pedigree = round2(rng.gen_range(0.08..2.3));
            let age = 21 + (rng.gen::<f64>().powi(2) * 55.0) as u32;
            let z = -20.6
                + 0.09 * plasma_glucose
                + 0.18 * bmi
                + 0.07 * f64::from(age)
                + 0.24 * f64::from(pregnancies)
                + 1.2 * diabetes_pedigree;
            let p = 1.0 / (1.0 + (-z).exp());
            let diabetic = u8::from(rng.gen::<f64>() < p);
            PatientRecord {
                patient_id: 1_000_000 + idx as u64,
                pregnancies,
                plasma_glucose,
                diastolic_blood_pressure,
                triceps_thickness,
                serum_insulin,
                bmi,
                diabetes_pedigree,
                age,
                diabetic,
            }
        })
        .collect()
}

/// Writes `generate(rows, seed)` as a headed CSV file.
pub fn write_csv(path: &Path, rows: usize, seed: u64) -> Result<(), MlwError> {
    let export_error = |err: csv::Error| {
        MlwError::Storage(
            ErrorInfo::new("sample.write", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    };
    let mut wtr = csv::Writer::from_path(path).map_err(export_error)?;
    for record in generate(rows, seed) {
        wtr.serialize(record).map_err(export_error)?;
    }
    wtr.flush()
        .map_err(|err| MlwError::io("sample.write", path, err))
}
