use crate::tensor::{Dims, Tensor};
use approx::{AbsDiffEq, RelativeEq};
use std::iter::zip;

impl<T: AbsDiffEq, D: Dims> AbsDiffEq for Tensor<T, D>
where
    T::Epsilon: Copy,
{
    type Epsilon = T::Epsilon;
    fn default_epsilon() -> Self::Epsilon {
        T::default_epsilon()
    }
    fn abs_diff_eq(&self, other: &Tensor<T, D>, epsilon: Self::Epsilon) -> bool {
        self.dims() == other.dims()
            && zip(self.as_ref(), other.as_ref()).all(|(a, b)| T::abs_diff_eq(a, b, epsilon))
    }
}

impl<T: RelativeEq, D: Dims> RelativeEq for Tensor<T, D>
where
    T::Epsilon: Copy,
{
    fn default_max_relative() -> Self::Epsilon {
        T::default_max_relative()
    }
    fn relative_eq(&self, other: &Tensor<T, D>, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.dims() == other.dims()
            && zip(self.as_ref(), other.as_ref()).all(|(a, b)| T::relative_eq(a, b, epsilon, max_relative))
    }
}

#[cfg(test)]
mod test {
    use crate::tensor::{Dim2, Tensor2};
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne, assert_relative_eq};

    #[test]
    fn test_tensor_approx() {
        let a = Tensor2::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], Dim2(2, 2));
        let b = Tensor2::from_vec(vec![1.0 + 1e-9, 2.0, 3.0, 4.0 - 1e-9], Dim2(2, 2));
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        assert_relative_eq!(a, b, max_relative = 1e-6);
        let c = Tensor2::from_vec(vec![1.0, 2.0, 3.0, 4.0], Dim2(4, 1));
        assert_abs_diff_ne!(a, c, epsilon = 1e-6);
    }
}
