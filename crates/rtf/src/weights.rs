//! In-memory ingest of model weights produced by an external trainer.

use serde::{Deserialize, Serialize};

/// Model weights of the two fully-connected layers, as emitted by the
/// trainer's JSON weight files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    /// The first fully-connected layer, row-major.
    pub fc1: Vec<Vec<f64>>,
    /// The second fully-connected layer, row-major.
    pub fc2: Vec<Vec<f64>>,
}

impl ModelWeights {
    /// Flatten both layers row-major.
    pub fn flatten(&self) -> (Vec<f64>, Vec<f64>) {
        let fc1 = self.fc1.iter().flatten().copied().collect();
        let fc2 = self.fc2.iter().flatten().copied().collect();
        (fc1, fc2)
    }

    /// Pack the flattened layers into rows of `row_len` values: each layer
    /// occupies ceil(len / row_len) rows, trailing positions explicitly
    /// zero-padded.
    pub fn pack_rows(&self, row_len: usize) -> Vec<Vec<f64>> {
        let (fc1, fc2) = self.flatten();
        let mut rows = vec![];
        for layer in [&fc1, &fc2] {
            for chunk in layer.chunks(row_len) {
                let mut row = vec![0.0f64; row_len];
                row[..chunk.len()].copy_from_slice(chunk);
                rows.push(row);
            }
        }
        rows
    }

    /// Number of rows of `row_len` values the packed layers occupy.
    pub fn rows_needed(&self, row_len: usize) -> usize {
        let (fc1, fc2) = self.flatten();
        fc1.len().div_ceil(row_len) + fc2.len().div_ceil(row_len)
    }
}

#[cfg(test)]
mod tests {
    use super::ModelWeights;

    fn sample() -> ModelWeights {
        ModelWeights {
            fc1: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            fc2: vec![vec![5.0], vec![6.0], vec![7.0]],
        }
    }

    #[test]
    fn flatten_row_major() {
        let (fc1, fc2) = sample().flatten();
        assert_eq!(fc1, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(fc2, vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn pack_pads_with_zeros() {
        let rows = sample().pack_rows(3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(rows[1], vec![4.0, 0.0, 0.0]);
        assert_eq!(rows[2], vec![5.0, 6.0, 7.0]);
        assert_eq!(sample().rows_needed(3), 3);
    }

    #[test]
    fn json_ingest() {
        let json = r#"{"fc1": [[0.5, -0.5]], "fc2": [[1.5]]}"#;
        let mw: ModelWeights = serde_json::from_str(json).unwrap();
        assert_eq!(mw.fc1[0], vec![0.5, -0.5]);
        assert_eq!(mw.fc2[0], vec![1.5]);
    }
}
