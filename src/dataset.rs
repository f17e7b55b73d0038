//! Tabular datasets loaded from CSV
//!
//! A [`Dataset`] is a header row plus a dense `f64` matrix. Every cell must
//! parse as a finite number; the regression target is just another column
//! until [`Dataset::split`] separates it from the features.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::{Error, Result};

/// Dense numeric table with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    source: String,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Dataset {
    /// Build a dataset from column names and a row-major matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the matrix width does not match the column
    /// count or a column name repeats.
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(Error::Schema(format!(
                "{} column names for a matrix with {} columns",
                columns.len(),
                values.ncols()
            )));
        }
        if let Some(dup) = first_duplicate(&columns) {
            return Err(Error::Schema(format!("duplicate column `{dup}`")));
        }
        Ok(Self {
            source: "<memory>".to_string(),
            columns,
            values,
        })
    }

    /// Load a comma-separated file with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataLoad`] if the file cannot be opened or its content is
    /// not a rectangular table of finite numbers with at least one data row.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::data_load(path, e))?;
        Self::from_csv_reader(file, &path.display().to_string())
    }

    /// Parse CSV from any reader; `source` names the input in error messages.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Dataset::from_csv_path`].
    pub fn from_csv_reader<R: Read>(reader: R, source: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b',')
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| Error::data_load(source, e))?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(Error::data_load(source, "missing header row"));
        }
        if let Some(dup) = first_duplicate(&columns) {
            return Err(Error::data_load(source, format!("duplicate column `{dup}`")));
        }

        let mut cells = Vec::new();
        let mut rows = 0usize;
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::data_load(source, e))?;
            // header is line 1
            let line = idx + 2;
            for (col, field) in record.iter().enumerate() {
                let value: f64 = field.parse().map_err(|_| {
                    Error::data_load(
                        source,
                        format!("line {line}, column `{}`: `{field}` is not a number", columns[col]),
                    )
                })?;
                if !value.is_finite() {
                    return Err(Error::data_load(
                        source,
                        format!("line {line}, column `{}`: non-finite value", columns[col]),
                    ));
                }
                cells.push(value);
            }
            rows += 1;
        }

        if rows == 0 {
            return Err(Error::data_load(source, "no data rows"));
        }

        let values = Array2::from_shape_vec((rows, columns.len()), cells)
            .map_err(|e| Error::data_load(source, e))?;

        Ok(Self {
            source: source.to_string(),
            columns,
            values,
        })
    }

    /// Where the data came from (file path or `<memory>`).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Whether `name` is one of the columns.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Separate `target` from the remaining columns, keeping file order for features.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if `target` is not a column.
    pub fn split(&self, target: &str) -> Result<SplitDataset> {
        let order: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.as_str() != target)
            .cloned()
            .collect();
        self.split_with_feature_order(target, &order)
    }

    /// Separate `target` and lay features out in `feature_order`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if `target` or any named feature is missing, or if
    /// the dataset holds feature columns that `feature_order` does not name.
    pub fn split_with_feature_order(
        &self,
        target: &str,
        feature_order: &[String],
    ) -> Result<SplitDataset> {
        let target_idx = self.column_index(target).ok_or_else(|| {
            Error::Schema(format!(
                "target column `{target}` not found in {}",
                self.source
            ))
        })?;

        if feature_order.len() + 1 != self.columns.len() {
            return Err(Error::Schema(format!(
                "{} has {} feature columns, expected {}",
                self.source,
                self.columns.len() - 1,
                feature_order.len()
            )));
        }

        let indices = feature_order
            .iter()
            .map(|name| {
                self.column_index(name)
                    .filter(|&idx| idx != target_idx)
                    .ok_or_else(|| {
                        Error::Schema(format!("feature column `{name}` not found in {}", self.source))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SplitDataset {
            feature_names: feature_order.to_vec(),
            features: self.values.select(Axis(1), &indices),
            target: self.values.column(target_idx).to_owned(),
        })
    }
}

/// Feature matrix and target vector derived from one [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    target: Array1<f64>,
}

impl SplitDataset {
    /// Assemble a split directly (features are columns of `features`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] on mismatched dimensions.
    pub fn new(feature_names: Vec<String>, features: Array2<f64>, target: Array1<f64>) -> Result<Self> {
        if feature_names.len() != features.ncols() {
            return Err(Error::Schema(format!(
                "{} feature names for {} feature columns",
                feature_names.len(),
                features.ncols()
            )));
        }
        if features.nrows() != target.len() {
            return Err(Error::Schema(format!(
                "{} feature rows but {} target values",
                features.nrows(),
                target.len()
            )));
        }
        Ok(Self {
            feature_names,
            features,
            target,
        })
    }

    /// Feature column names, in matrix column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature matrix (rows = samples).
    #[must_use]
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Target vector.
    #[must_use]
    pub fn target(&self) -> ArrayView1<'_, f64> {
        self.target.view()
    }

    /// Number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.target.len()
    }
}

/// Load both splits and partition them on `target`.
///
/// Both files are read before any schema check, so an unreadable path is always
/// reported as [`Error::DataLoad`]. Test features are re-ordered to match the
/// training layout.
///
/// # Errors
///
/// [`Error::DataLoad`] for unreadable or malformed files, [`Error::Schema`] when
/// the target is missing from either file or the column sets differ.
pub fn load_train_test(
    train_path: impl AsRef<Path>,
    test_path: impl AsRef<Path>,
    target: &str,
) -> Result<(SplitDataset, SplitDataset)> {
    let train = Dataset::from_csv_path(train_path)?;
    let test = Dataset::from_csv_path(test_path)?;
    split_train_test(&train, &test, target)
}

/// Partition already-loaded splits; see [`load_train_test`].
///
/// # Errors
///
/// [`Error::Schema`] when the target is missing or the column sets differ.
pub fn split_train_test(
    train: &Dataset,
    test: &Dataset,
    target: &str,
) -> Result<(SplitDataset, SplitDataset)> {
    for ds in [train, test] {
        if !ds.has_column(target) {
            return Err(Error::Schema(format!(
                "target column `{target}` not found in {}",
                ds.source()
            )));
        }
    }

    let train_cols: BTreeSet<&str> = train.columns().iter().map(String::as_str).collect();
    let test_cols: BTreeSet<&str> = test.columns().iter().map(String::as_str).collect();
    if train_cols != test_cols {
        let only_train: Vec<_> = train_cols.difference(&test_cols).collect();
        let only_test: Vec<_> = test_cols.difference(&train_cols).collect();
        return Err(Error::Schema(format!(
            "train and test columns differ (train only: {only_train:?}, test only: {only_test:?})"
        )));
    }

    let train_split = train.split(target)?;
    let test_split = test.split_with_feature_order(target, train_split.feature_names())?;
    Ok((train_split, test_split))
}

fn first_duplicate(columns: &[String]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    columns
        .iter()
        .find(|c| !seen.insert(c.as_str()))
        .map(String::as_str)
}
