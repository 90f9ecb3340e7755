//! # Model inputs
//!
//! Containers for aggregate margins. `EcoInput` holds the 2x2 data: the
//! row proportion `X`, the outcome proportion `Y`, and optional unit sizes
//! together with fully observed survey or homogeneous units. `MultiColumnInput`
//! holds 2xC data with precomputed deterministic bounds.
//!
//! # Examples
//!
//! ```
//! use eco_inference::EcoInput;
//!
//! let input = EcoInput::new(vec![0.4, 0.7], vec![0.3, 0.5]);
//! assert!(input.validate().is_ok());
//! ```
//!
//! ```
//! use eco_inference::EcoInput;
//!
//! let input = EcoInput::new(vec![0.4, 0.7], vec![0.3]);
//! assert!(input.validate().is_err());
//! ```

use faer::Mat;
use thiserror::Error;

use crate::utils::matrix_is_finite;

/// Slack allowed when checking that margins agree with the known columns.
const MARGIN_TOLERANCE: f64 = 1.0e-8;

/// Errors returned when validating model inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("at least one unit is required")]
    EmptyInput,
    #[error("X has {x} entries but Y has {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("{field} contains a non-finite value at unit {unit}")]
    NonFiniteValue { field: &'static str, unit: usize },
    #[error("{field} at unit {unit} is {value}; expected a proportion in [0, 1]")]
    ProportionOutOfRange {
        field: &'static str,
        unit: usize,
        value: f64,
    },
    #[error("unit sizes length ({sizes}) must match the number of units ({units})")]
    InvalidUnitSizeLength { sizes: usize, units: usize },
    #[error("unit sizes must be strictly positive")]
    NonPositiveUnitSize,
    #[error("survey matrix must have two columns; found {cols}")]
    InvalidSurveyShape { cols: usize },
    #[error("survey X length ({values}) must match survey rows ({rows})")]
    InvalidSurveyCovariateLength { values: usize, rows: usize },
    #[error("{field} has {rows} rows and {cols} columns; expected {expected_rows} rows and {expected_cols} columns")]
    InvalidMatrixShape {
        field: &'static str,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },
    #[error("at least two columns are required")]
    TooFewColumns,
    #[error("X row {unit} sums to {total}; expected 1")]
    RowNotNormalized { unit: usize, total: f64 },
    #[error("lower bound exceeds upper bound at unit {unit}, column {column}")]
    BoundsOutOfOrder { unit: usize, column: usize },
    #[error("Y at unit {unit} lies outside the range implied by its bounds")]
    InfeasibleMargin { unit: usize },
    #[error("X at unit {unit}, column {column} must be positive")]
    ZeroColumnShare { unit: usize, column: usize },
    #[error("input has {found} units but the draws hold {expected}")]
    UnitCountMismatch { expected: usize, found: usize },
}

/// Aggregate 2x2 data.
///
/// Unit `i` satisfies `Y_i = X_i W1_i + (1 - X_i) W2_i` for unobserved
/// proportions `W1_i` and `W2_i`.
#[derive(Debug, Clone)]
pub struct EcoInput {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Unit population sizes, used to weight aggregate proportions.
    pub unit_sizes: Option<Vec<f64>>,
    /// Survey units with fully observed `(W1, W2)`, one row per unit.
    pub survey: Option<Mat<f64>>,
    /// `X` for the survey units; required by the contextual model.
    pub survey_x: Option<Vec<f64>>,
    /// Supplemental units with `X = 1`: the observed `W1` values.
    pub known_w1: Vec<f64>,
    /// Supplemental units with `X = 0`: the observed `W2` values.
    pub known_w2: Vec<f64>,
}

impl EcoInput {
    #[must_use]
    pub const fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            x,
            y,
            unit_sizes: None,
            survey: None,
            survey_x: None,
            known_w1: Vec::new(),
            known_w2: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_unit_sizes(mut self, unit_sizes: Vec<f64>) -> Self {
        self.unit_sizes = Some(unit_sizes);
        self
    }

    #[must_use]
    pub fn with_survey(self, survey: Mat<f64>) -> Self {
        Self {
            survey: Some(survey),
            ..self
        }
    }

    #[must_use]
    pub fn with_survey_x(self, survey_x: Vec<f64>) -> Self {
        Self {
            survey_x: Some(survey_x),
            ..self
        }
    }

    #[must_use]
    pub fn with_known_w1(mut self, known_w1: Vec<f64>) -> Self {
        self.known_w1 = known_w1;
        self
    }

    #[must_use]
    pub fn with_known_w2(mut self, known_w2: Vec<f64>) -> Self {
        self.known_w2 = known_w2;
        self
    }

    /// Number of main-input units.
    #[must_use]
    pub const fn n_main(&self) -> usize {
        self.x.len()
    }

    #[must_use]
    pub fn n_survey(&self) -> usize {
        self.survey.as_ref().map_or(0, Mat::nrows)
    }

    /// Total number of units seen by the sampler.
    #[must_use]
    pub fn n_units(&self) -> usize {
        self.n_main() + self.known_w1.len() + self.known_w2.len() + self.n_survey()
    }

    /// Validate lengths, finiteness and ranges of every block.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if inputs are malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.x.len() != self.y.len() {
            return Err(InputError::LengthMismatch {
                x: self.x.len(),
                y: self.y.len(),
            });
        }
        if self.n_units() == 0 {
            return Err(InputError::EmptyInput);
        }
        check_proportions("X", &self.x)?;
        check_proportions("Y", &self.y)?;
        check_proportions("known W1", &self.known_w1)?;
        check_proportions("known W2", &self.known_w2)?;

        if let Some(sizes) = &self.unit_sizes {
            if sizes.len() != self.x.len() {
                return Err(InputError::InvalidUnitSizeLength {
                    sizes: sizes.len(),
                    units: self.x.len(),
                });
            }
            if let Some(unit) = sizes.iter().position(|value| !value.is_finite()) {
                return Err(InputError::NonFiniteValue {
                    field: "unit sizes",
                    unit,
                });
            }
            if sizes.iter().any(|value| *value <= 0.0) {
                return Err(InputError::NonPositiveUnitSize);
            }
        }

        if let Some(survey) = &self.survey {
            if survey.ncols() != 2 {
                return Err(InputError::InvalidSurveyShape {
                    cols: survey.ncols(),
                });
            }
            for row in 0..survey.nrows() {
                for col in 0..2 {
                    let value = survey[(row, col)];
                    if !value.is_finite() {
                        return Err(InputError::NonFiniteValue {
                            field: "survey",
                            unit: row,
                        });
                    }
                    if !(0.0..=1.0).contains(&value) {
                        return Err(InputError::ProportionOutOfRange {
                            field: "survey",
                            unit: row,
                            value,
                        });
                    }
                }
            }
        }

        if let Some(survey_x) = &self.survey_x {
            let rows = self.n_survey();
            if survey_x.len() != rows {
                return Err(InputError::InvalidSurveyCovariateLength {
                    values: survey_x.len(),
                    rows,
                });
            }
            check_proportions("survey X", survey_x)?;
        }
        Ok(())
    }
}

/// Aggregate 2xC data.
///
/// Row `i` of `x` holds the column proportions of unit `i` and sums to one;
/// `w_min` and `w_max` are the deterministic bounds of the unobserved
/// column-specific proportions.
#[derive(Debug, Clone)]
pub struct MultiColumnInput {
    pub x: Mat<f64>,
    pub y: Vec<f64>,
    pub w_min: Mat<f64>,
    pub w_max: Mat<f64>,
}

impl MultiColumnInput {
    #[must_use]
    pub const fn new(x: Mat<f64>, y: Vec<f64>, w_min: Mat<f64>, w_max: Mat<f64>) -> Self {
        Self { x, y, w_min, w_max }
    }

    #[must_use]
    pub fn n_units(&self) -> usize {
        self.x.nrows()
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.x.ncols()
    }

    /// # Errors
    ///
    /// Returns `InputError` if shapes disagree, values leave `[0, 1]`, a row of
    /// `x` has a zero entry or does not sum to one, or a margin cannot be
    /// reached within its bounds.
    pub fn validate(&self) -> Result<(), InputError> {
        let rows = self.y.len();
        let cols = self.x.ncols();
        if rows == 0 {
            return Err(InputError::EmptyInput);
        }
        if cols < 2 {
            return Err(InputError::TooFewColumns);
        }
        for (field, matrix) in [("X", &self.x), ("W min", &self.w_min), ("W max", &self.w_max)] {
            if matrix.nrows() != rows || matrix.ncols() != cols {
                return Err(InputError::InvalidMatrixShape {
                    field,
                    rows: matrix.nrows(),
                    cols: matrix.ncols(),
                    expected_rows: rows,
                    expected_cols: cols,
                });
            }
            if !matrix_is_finite(matrix) {
                let unit = (0..rows)
                    .find(|row| (0..cols).any(|col| !matrix[(*row, col)].is_finite()))
                    .unwrap_or(0);
                return Err(InputError::NonFiniteValue { field, unit });
            }
            for row in 0..rows {
                for col in 0..cols {
                    let value = matrix[(row, col)];
                    if !(0.0..=1.0).contains(&value) {
                        return Err(InputError::ProportionOutOfRange {
                            field,
                            unit: row,
                            value,
                        });
                    }
                }
            }
        }
        check_proportions("Y", &self.y)?;

        for unit in 0..rows {
            let total = (0..cols).map(|col| self.x[(unit, col)]).sum::<f64>();
            if (total - 1.0).abs() > 1.0e-6 {
                return Err(InputError::RowNotNormalized { unit, total });
            }
            let mut lower = 0.0;
            let mut upper = 0.0;
            for column in 0..cols {
                if self.x[(unit, column)] <= 0.0 {
                    return Err(InputError::ZeroColumnShare { unit, column });
                }
                let (lo, hi) = (self.w_min[(unit, column)], self.w_max[(unit, column)]);
                if lo > hi {
                    return Err(InputError::BoundsOutOfOrder { unit, column });
                }
                lower += self.x[(unit, column)] * lo;
                upper += self.x[(unit, column)] * hi;
            }
            let y = self.y[unit];
            if y < lower - MARGIN_TOLERANCE || y > upper + MARGIN_TOLERANCE {
                return Err(InputError::InfeasibleMargin { unit });
            }
        }
        Ok(())
    }
}

fn check_proportions(field: &'static str, values: &[f64]) -> Result<(), InputError> {
    for (unit, value) in values.iter().copied().enumerate() {
        if !value.is_finite() {
            return Err(InputError::NonFiniteValue { field, unit });
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(InputError::ProportionOutOfRange { field, unit, value });
        }
    }
    Ok(())
}
