//! Classifier variants
//!
//! A [`ClassifierSpec`] is the unfit recipe (variant, booster params, seed).
//! Fitting it on a [`FeatureFrame`] yields a [`FittedClassifier`] that owns its
//! own preprocessing, so replaying it needs nothing but the raw feature values.

use crate::cleaning::CleanedTable;
use crate::config::BoosterParams;
use crate::error::MotorError;
use crate::model::booster::{argmax, GradientBoostedTrees};
use crate::preprocess::{OneHotEncoder, RobustScaler};
use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Which feature set a classifier consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Motor numeric features only; used for scoring
    MotorOnly,
    /// Motor plus context features; diagnostic comparison
    MotorPlusContext,
}

impl Variant {
    /// Key used in the training report and artifact names
    pub fn key(self) -> &'static str {
        match self {
            Variant::MotorOnly => "modelA_motor_only",
            Variant::MotorPlusContext => "modelB_motor_plus_context",
        }
    }

    /// Feature frame this variant is trained on
    pub fn frame(self, cleaned: &CleanedTable) -> Result<FeatureFrame, MotorError> {
        match self {
            Variant::MotorOnly => Ok(FeatureFrame::motor_only(cleaned)),
            Variant::MotorPlusContext => FeatureFrame::motor_plus_context(cleaned),
        }
    }
}

/// Row-aligned numeric matrix plus column-major categorical data
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub numeric_columns: Vec<String>,
    pub numeric: Array2<f64>,
    pub categorical_columns: Vec<String>,
    pub categorical: Vec<Vec<String>>,
}

impl FeatureFrame {
    pub fn motor_only(cleaned: &CleanedTable) -> Self {
        Self {
            numeric_columns: cleaned.schema.motor_numeric.clone(),
            numeric: cleaned.motor.clone(),
            categorical_columns: Vec::new(),
            categorical: Vec::new(),
        }
    }

    pub fn motor_plus_context(cleaned: &CleanedTable) -> Result<Self, MotorError> {
        let numeric = concatenate(
            Axis(1),
            &[cleaned.motor.view(), cleaned.context_numeric.view()],
        )
        .map_err(|e| MotorError::Schema(format!("cannot join motor and context features: {e}")))?;

        let mut numeric_columns = cleaned.schema.motor_numeric.clone();
        numeric_columns.extend(cleaned.schema.context_numeric.iter().cloned());

        Ok(Self {
            numeric_columns,
            numeric,
            categorical_columns: cleaned.schema.context_categorical.clone(),
            categorical: cleaned.context_categorical.clone(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.numeric.nrows()
    }

    /// Subset of rows, in the order given
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            numeric_columns: self.numeric_columns.clone(),
            numeric: self.numeric.select(Axis(0), rows),
            categorical_columns: self.categorical_columns.clone(),
            categorical: self
                .categorical
                .iter()
                .map(|values| rows.iter().map(|&r| values[r].clone()).collect())
                .collect(),
        }
    }
}

/// Unfit classifier recipe
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSpec {
    pub variant: Variant,
    pub params: BoosterParams,
    pub seed: u64,
}

impl ClassifierSpec {
    pub fn new(variant: Variant, params: BoosterParams, seed: u64) -> Self {
        Self {
            variant,
            params,
            seed,
        }
    }

    /// Fit a fresh classifier; the spec itself is never mutated
    pub fn fit(&self, frame: &FeatureFrame, labels: &[usize]) -> Result<FittedClassifier, MotorError> {
        let scaler = RobustScaler::fit(&frame.numeric_columns, frame.numeric.view())?;
        let encoder = match self.variant {
            Variant::MotorOnly => None,
            Variant::MotorPlusContext => Some(OneHotEncoder::fit(
                &frame.categorical_columns,
                &frame.categorical,
            )?),
        };

        let design = design_matrix(&scaler, encoder.as_ref(), frame)?;
        let booster = GradientBoostedTrees::fit(design.view(), labels, &self.params, self.seed)?;

        Ok(FittedClassifier {
            variant: self.variant,
            scaler,
            encoder,
            booster,
        })
    }
}

/// Fitted preprocessing plus booster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedClassifier {
    pub variant: Variant,
    pub scaler: RobustScaler,
    pub encoder: Option<OneHotEncoder>,
    pub booster: GradientBoostedTrees,
}

impl FittedClassifier {
    /// Numeric input columns, in the order the classifier expects
    pub fn numeric_columns(&self) -> &[String] {
        &self.scaler.columns
    }

    /// Class probabilities for every row of `frame`
    pub fn predict_proba(&self, frame: &FeatureFrame) -> Result<Array2<f64>, MotorError> {
        let design = design_matrix(&self.scaler, self.encoder.as_ref(), frame)?;
        self.booster.predict_proba(design.view())
    }

    /// Most probable class per row (first class on ties)
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<usize>, MotorError> {
        let probabilities = self.predict_proba(frame)?;
        Ok(probabilities
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect())
    }

    /// Class probabilities for one unscaled numeric vector.
    ///
    /// Only valid for classifiers without categorical inputs.
    pub fn predict_proba_numeric(&self, values: &[f64]) -> Result<Vec<f64>, MotorError> {
        if self.encoder.as_ref().is_some_and(|e| e.n_outputs() > 0) {
            return Err(MotorError::ArtifactMismatch(
                "classifier needs categorical inputs".to_string(),
            ));
        }
        let scaled = self.scaler.transform_row(values)?;
        self.booster.predict_proba_row(&scaled)
    }
}

fn design_matrix(
    scaler: &RobustScaler,
    encoder: Option<&OneHotEncoder>,
    frame: &FeatureFrame,
) -> Result<Array2<f64>, MotorError> {
    if frame.numeric_columns != scaler.columns {
        return Err(MotorError::ArtifactMismatch(
            "numeric feature columns differ from the fitted classifier".to_string(),
        ));
    }
    let scaled = scaler.transform(frame.numeric.view())?;
    match encoder {
        Some(encoder) if encoder.n_outputs() > 0 => {
            let encoded = encoder.transform(&frame.categorical, frame.n_rows())?;
            concatenate(Axis(1), &[scaled.view(), encoded.view()])
                .map_err(|e| MotorError::Schema(format!("cannot join encoded features: {e}")))
        }
        _ => Ok(scaled),
    }
}
