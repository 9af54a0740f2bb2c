use crate::dtype::DTypeFloat;
use crate::tensor::{Dim1, Tensor1};

/// Normalizes `logits` into a probability vector.
///
/// The largest logit is subtracted before exponentiating, which leaves the result unchanged
/// mathematically but keeps `exp` from overflowing on large activations.
pub fn softmax<F: DTypeFloat>(logits: &[F]) -> Tensor1<F> {
    let max = logits.iter().copied().fold(F::neg_infinity(), F::max);
    let mut out: Vec<F> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum = out.iter().fold(F::ZERO, |acc, &e| acc + e);
    out.iter_mut().for_each(|e| *e /= sum);
    let len = out.len();
    Tensor1::from_vec(out, Dim1(len))
}
