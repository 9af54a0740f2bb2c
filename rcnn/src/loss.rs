use crate::dtype::DTypeFloat;
use crate::error::{Error, Result};
use crate::tensor::Tensor1;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LossFn {
    /// Categorical cross-entropy on softmax probabilities.
    #[default]
    CrossEntropy,
}

impl LossFn {
    /// Gradient of the loss w.r.t. the pre-softmax activations: `p - one_hot(label)`.
    pub fn output_error<F: DTypeFloat>(&self, probabilities: &Tensor1<F>, label: usize) -> Result<Tensor1<F>> {
        check_label(label, probabilities.len())?;
        match self {
            LossFn::CrossEntropy => {
                let mut error = probabilities.clone();
                error[label] -= F::ONE;
                Ok(error)
            }
        }
    }

    pub fn loss<F: DTypeFloat>(&self, probabilities: &Tensor1<F>, label: usize) -> Result<F> {
        check_label(label, probabilities.len())?;
        match self {
            LossFn::CrossEntropy => Ok(-probabilities[label].max(F::min_positive_value()).ln()),
        }
    }
}

#[inline]
fn check_label(label: usize, classes: usize) -> Result<()> {
    if label >= classes {
        Err(Error::InvalidLabel { label, classes })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tensor::Tensor1;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_output_error() {
        let p = Tensor1::from_vec_1d(vec![0.1f64, 0.7, 0.2]);
        let e = LossFn::CrossEntropy.output_error(&p, 1).unwrap();
        for (&a, b) in e.iter().zip([0.1, -0.3, 0.2]) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_loss() {
        let p = Tensor1::from_vec_1d(vec![0.5f64, 0.5, 0.0]);
        assert_abs_diff_eq!(LossFn::CrossEntropy.loss(&p, 0).unwrap(), 2f64.ln(), epsilon = 1e-12);
        assert!(LossFn::CrossEntropy.loss(&p, 2).unwrap().is_finite());
    }

    #[test]
    fn test_bad_label() {
        let p = Tensor1::from_vec_1d(vec![1.0f32; 10]);
        let res = LossFn::CrossEntropy.output_error(&p, 10);
        assert!(matches!(res, Err(Error::InvalidLabel { label: 10, classes: 10 })));
    }
}
