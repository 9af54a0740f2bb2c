use crate::tensor::{Dim2, Tensor2};
use std::fmt::{Display, Formatter};

/// Confusion matrix over `classes` labels, rows indexed by the expected label and
/// columns by the predicted one.
#[derive(Clone, Debug, PartialEq)]
pub struct MulticlassScorer {
    matrix: Tensor2<usize>,
    count: usize,
}

impl MulticlassScorer {
    pub fn new(classes: usize) -> Self {
        MulticlassScorer {
            matrix: Tensor2::zeroed(Dim2(classes, classes)),
            count: 0,
        }
    }

    #[inline]
    pub fn classes(&self) -> usize {
        self.matrix.dims().rows()
    }

    pub fn record(&mut self, expected: usize, predicted: usize) {
        assert!(expected < self.classes() && predicted < self.classes());
        self.matrix[[expected, predicted]] += 1;
        self.count += 1;
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn correct(&self) -> usize {
        (0..self.classes()).map(|i| self.matrix[[i, i]]).sum()
    }

    /// Fraction of recorded samples predicted correctly, 0 when nothing was recorded.
    pub fn accuracy(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.correct() as f64 / self.count as f64
    }

    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        1.0 - self.accuracy()
    }

    #[inline]
    pub fn confusion_matrix(&self) -> &Tensor2<usize> {
        &self.matrix
    }
}

impl Display for MulticlassScorer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let classes = self.classes();
        writeln!(f, "Confusion matrix (row = expected, col = predicted, row-normalized):")?;
        for i in 0..classes {
            let total: usize = (0..classes).map(|j| self.matrix[[i, j]]).sum();
            write!(f, "{i:>3} |")?;
            for j in 0..classes {
                let frac = if total == 0 {
                    0.0
                } else {
                    self.matrix[[i, j]] as f64 / total as f64
                };
                write!(f, " {frac:.3}")?;
            }
            writeln!(f)?;
        }
        let incorrect = self.count - self.correct();
        write!(
            f,
            "Error rate: {:.2}% ({incorrect}/{})",
            self.error_rate() * 100.0,
            self.count
        )
    }
}
