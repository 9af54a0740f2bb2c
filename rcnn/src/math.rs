use crate::dtype::DType;
use crate::tensor::Dim2;

pub trait DTypeOps: DType {
    /// General matrix multiply: `c = alpha * op(a) * op(b) + beta * c`, all row-major.
    ///
    /// `a_dims`/`b_dims` are the stored (untransposed) shapes.
    fn gemm(
        alpha: Self,
        a: &[Self],
        a_dims: Dim2,
        ta: bool,
        b: &[Self],
        b_dims: Dim2,
        tb: bool,
        beta: Self,
        c: &mut [Self],
        c_dims: Dim2,
    );
}

macro_rules! implement_dtype_ops {
    ($t: ident, $g: ident) => {
        impl DTypeOps for $t {
            fn gemm(
                alpha: Self,
                a: &[Self],
                a_dims: Dim2,
                ta: bool,
                b: &[Self],
                b_dims: Dim2,
                tb: bool,
                beta: Self,
                c: &mut [Self],
                c_dims: Dim2,
            ) {
                let Dim2(a_rows, a_cols) = a_dims;
                let Dim2(b_rows, b_cols) = b_dims;
                assert_eq!(a.len(), a_rows * a_cols);
                assert_eq!(b.len(), b_rows * b_cols);
                assert_eq!(c.len(), c_dims.rows() * c_dims.cols());
                let (m, k, rsa, csa) = if ta {
                    (a_cols, a_rows, 1, a_cols as isize)
                } else {
                    (a_rows, a_cols, a_cols as isize, 1)
                };
                let (n, rsb, csb) = if tb {
                    assert_eq!(b_cols, k);
                    (b_rows, 1, b_cols as isize)
                } else {
                    assert_eq!(b_rows, k);
                    (b_cols, b_cols as isize, 1)
                };
                assert_eq!(c_dims, Dim2(m, n));
                unsafe {
                    matrixmultiply::$g(
                        m,
                        k,
                        n,
                        alpha,
                        a.as_ptr(),
                        rsa,
                        csa,
                        b.as_ptr(),
                        rsb,
                        csb,
                        beta,
                        c.as_mut_ptr(),
                        n as isize,
                        1,
                    );
                }
            }
        }
    };
}

implement_dtype_ops!(f32, sgemm);
implement_dtype_ops!(f64, dgemm);

#[cfg(test)]
mod test {
    use crate::math::DTypeOps;
    use crate::tensor::{Dim2, Tensor, Tensor2};

    macro_rules! assert_slice_equal {
        ($a:ident, $b:expr) => {{
            let b = $b;
            if $a.len() != b.len()
                || !std::iter::zip($a.as_ref(), &b).all(|(&i, &j)| (i - j).abs() <= f32::EPSILON)
            {
                panic!("slices not equal: left={:?}, right={:?}", &$a, &b);
            }
        }};
    }

    fn mat_mul(alpha: f32, a: &Tensor2<f32>, ta: bool, b: &Tensor2<f32>, tb: bool, beta: f32, c: &mut Tensor2<f32>) {
        let c_dims = *c.dims();
        f32::gemm(alpha, a.as_ref(), *a.dims(), ta, b.as_ref(), *b.dims(), tb, beta, c.as_mut(), c_dims);
    }

    #[test]
    fn test_mat_mul() {
        let a = Tensor::from_vec(vec![1., 2., 3., 4., 5., 6.], Dim2(2, 3));
        let b = Tensor::from_vec(vec![7., 8., 9., 10., 11., 12.], Dim2(3, 2));
        let c = Tensor::from_vec(vec![0.5, 1., 1., 0.25], Dim2(2, 2));

        let mut r2x2 = Tensor::filled(0., Dim2(2, 2));
        let mut r2x3 = Tensor::filled(0., Dim2(2, 3));
        let mut r3x2 = Tensor::filled(0., Dim2(3, 2));
        let mut r3x3 = Tensor::filled(0., Dim2(3, 3));

        r2x2.fill(100.); // existing values should be ignored
        mat_mul(1.0, &a, false, &b, false, 0.0, &mut r2x2);
        assert_slice_equal!(r2x2, [58., 64., 139., 154.]);

        r2x2.fill(1.);
        mat_mul(0.5, &a, false, &b, false, 5.0, &mut r2x2);
        assert_slice_equal!(r2x2, [34., 37., 74.5, 82.]);

        r3x3.fill(100.);
        mat_mul(1.0, &b, false, &a, false, 0.0, &mut r3x3);
        assert_slice_equal!(r3x3, [39., 54., 69., 49., 68., 87., 59., 82., 105.]);

        // C X Bt
        r2x3.fill(100.);
        mat_mul(1.0, &c, false, &b, true, 0.0, &mut r2x3);
        assert_slice_equal!(r2x3, [11.5, 14.5, 17.5, 9., 11.5, 14.]);

        // At X C
        r3x2.fill(100.);
        mat_mul(1.0, &a, true, &c, false, 0.0, &mut r3x2);
        assert_slice_equal!(r3x2, [4.5, 2., 6., 3.25, 7.5, 4.5]);
    }

    #[test]
    fn test_gemm_accumulates_with_beta() {
        // outer product accumulated twice: beta = 1 keeps the previous contribution
        let u = [1.0f64, 2.0];
        let v = [3.0f64, 4.0, 5.0];
        let mut acc = [0.0f64; 6];
        for _ in 0..2 {
            f64::gemm(1.0, &u, Dim2(2, 1), false, &v, Dim2(1, 3), false, 1.0, &mut acc, Dim2(2, 3));
        }
        assert_eq!(acc, [6., 8., 10., 12., 16., 20.]);
    }
}
