//! CSV datasets for the trainer: numeric feature columns plus a binary target.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::pipeline::BINARY_CLASSES;

const NA_TOKENS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

fn is_na(cell: &str) -> bool { NA_TOKENS.contains(&cell) }

#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<String>,
    /// Row-major; missing cells are NaN.
    pub rows: Vec<Vec<f64>>,
    /// Index into `classes` per row.
    pub labels: Vec<usize>,
    pub classes: [i64; 2],
}

fn parse_label(cell: &str) -> Option<i64> {
    if let Ok(v) = cell.parse::<i64>() { return Some(v); }
    let f = cell.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

impl Dataset {
    pub fn from_csv(path: &Path, target: &str) -> Result<Self, DatasetError> {
        if !path.exists() { return Err(DatasetError::NotFound(path.to_path_buf())); }
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file, target)
    }

    /// Columns with any non-numeric, non-NA cell are dropped. Rows without a target are skipped.
    pub fn from_reader<R: std::io::Read>(reader: R, target: &str) -> Result<Self, DatasetError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let target_idx = headers.iter().position(|h| h == target).ok_or_else(|| DatasetError::MissingTarget(target.to_string()))?;

        let mut records = Vec::new();
        let mut raw_labels = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec?;
            let line = i + 2;
            let cell = rec.get(target_idx).unwrap_or("");
            if is_na(cell) { warn!(line, "row without target skipped"); continue; }
            let label = parse_label(cell).ok_or_else(|| DatasetError::BadTarget { line, value: cell.to_string() })?;
            raw_labels.push(label);
            records.push((line, rec));
        }

        let numeric: Vec<usize> = (0..headers.len())
            .filter(|&c| c != target_idx)
            .filter(|&c| records.iter().all(|(_, r)| { let v = r.get(c).unwrap_or(""); is_na(v) || v.parse::<f64>().is_ok() }))
            .collect();
        let dropped = headers.len() - 1 - numeric.len();
        if dropped > 0 { debug!(dropped, "non-numeric columns dropped"); }
        if numeric.is_empty() { return Err(DatasetError::NoFeatures); }

        let mut classes: Vec<i64> = raw_labels.clone();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() != 2 { return Err(DatasetError::ClassCount(classes.len())); }
        if classes != BINARY_CLASSES { return Err(DatasetError::UnsupportedClasses(classes[0], classes[1])); }

        let mut rows = Vec::with_capacity(records.len());
        for (line, r) in &records {
            let mut row = Vec::with_capacity(numeric.len());
            for &c in &numeric {
                let v = r.get(c).unwrap_or("");
                let x = if is_na(v) { f64::NAN } else { v.parse::<f64>().unwrap_or(f64::NAN) };
                // "inf", "-infinity" and out-of-range literals parse but cannot be fitted
                if x.is_infinite() {
                    return Err(DatasetError::NonFinite { line: *line, column: headers[c].to_string(), value: v.to_string() });
                }
                row.push(x);
            }
            rows.push(row);
        }
        let labels = raw_labels.iter().map(|l| usize::from(*l == 1)).collect();
        Ok(Self { features: numeric.iter().map(|&c| headers[c].to_string()).collect(), rows, labels, classes: BINARY_CLASSES })
    }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn subset(&self, idx: &[usize]) -> (Vec<Vec<f64>>, Vec<usize>) {
        (idx.iter().map(|&i| self.rows[i].clone()).collect(), idx.iter().map(|&i| self.labels[i]).collect())
    }
}

/// Per-class shuffled split keeping class proportions. Returns `(train, test)` row indices.
pub fn stratified_split(labels: &[usize], test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>), DatasetError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut train, mut test) = (Vec::new(), Vec::new());
    for class in 0..2 {
        let mut idx: Vec<usize> = labels.iter().enumerate().filter(|&(_, &l)| l == class).map(|(i, _)| i).collect();
        if idx.len() < 2 { return Err(DatasetError::TooSmall(idx.len())); }
        idx.shuffle(&mut rng);
        let n_test = ((idx.len() as f64 * test_size).round() as usize).clamp(1, idx.len() - 1);
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "age,name,glucose,Outcome\n45,ann,120,1\n30,bob,,0\n50,cy,140,1\n22,di,90,0\n61,ed,NA,\n";

    #[test]
    fn keeps_numeric_columns_and_skips_unlabeled_rows() {
        let ds = Dataset::from_reader(CSV.as_bytes(), "Outcome").unwrap();
        assert_eq!(ds.features, vec!["age", "glucose"]);
        assert_eq!(ds.len(), 4);
        assert!(ds.rows[1][1].is_nan());
        assert_eq!(ds.labels, vec![1, 0, 1, 0]);
        assert_eq!(ds.classes, [0, 1]);
    }

    #[test]
    fn missing_target_column() {
        let err = Dataset::from_reader(CSV.as_bytes(), "target").unwrap_err();
        assert!(matches!(err, DatasetError::MissingTarget(t) if t == "target"));
    }

    #[test]
    fn single_class_is_rejected() {
        let err = Dataset::from_reader("a,y\n1,1\n2,1\n".as_bytes(), "y").unwrap_err();
        assert!(matches!(err, DatasetError::ClassCount(1)));
    }

    #[test]
    fn labels_other_than_zero_and_one_are_rejected() {
        let err = Dataset::from_reader("a,num\n1,1\n2,2\n3,1\n".as_bytes(), "num").unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedClasses(1, 2)));
    }

    #[test]
    fn infinite_cells_are_rejected() {
        for bad in ["inf", "-Infinity", "1e400"] {
            let csv = format!("age,glucose,y\n40,120,0\n50,{bad},1\n");
            let err = Dataset::from_reader(csv.as_bytes(), "y").unwrap_err();
            assert!(matches!(&err, DatasetError::NonFinite { line: 3, column, .. } if column == "glucose"), "{bad}: {err}");
        }
    }

    #[test]
    fn float_encoded_labels_are_accepted() {
        let ds = Dataset::from_reader("a,y\n1,0.0\n2,1.0\n".as_bytes(), "y").unwrap();
        assert_eq!(ds.labels, vec![0, 1]);
    }

    #[test]
    fn split_is_stratified_and_reproducible() {
        let labels: Vec<usize> = (0..100).map(|i| usize::from(i % 4 == 0)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 5);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 0).count(), 15);
        assert_eq!(stratified_split(&labels, 0.2, 42).unwrap(), (train, test));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Dataset::from_csv(Path::new("/no/such/heart.csv"), "target").unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }
}
