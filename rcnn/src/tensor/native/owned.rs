use crate::error::{Error, Result};
use crate::tensor::dims::{Dim1, Dim2, Dim3, Dim4, Dims};
use num_traits::Zero;
use rand::distributions::Distribution;
use rand::Rng;
use std::ops::{Index, IndexMut};
use std::slice::{Iter, IterMut};
use std::vec::IntoIter;

#[derive(Clone, PartialEq)]
pub struct Tensor<T, D>
where
    D: Dims,
{
    data: Vec<T>,
    dims: D,
}

pub type Tensor1<T> = Tensor<T, Dim1>;
pub type Tensor2<T> = Tensor<T, Dim2>;
pub type Tensor3<T> = Tensor<T, Dim3>;
pub type Tensor4<T> = Tensor<T, Dim4>;

impl<T, D: Dims> Tensor<T, D> {
    pub fn from_vec(data: Vec<T>, dims: D) -> Self {
        assert_eq!(data.len(), dims.tensor_len(), "data length does not match dims {dims}");
        Tensor { data, dims }
    }

    pub fn try_from_vec(data: Vec<T>, dims: D) -> Result<Self> {
        if data.len() != dims.tensor_len() {
            return Err(Error::shape_mismatch(
                "tensor data",
                format!("{} elements for {dims}", dims.tensor_len()),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Tensor { data, dims })
    }

    pub fn from_distribution<R, S>(rng: &mut R, dist: S, dims: D) -> Self
    where
        R: Rng,
        S: Distribution<T>,
    {
        let data: Vec<T> = dist.sample_iter(rng).take(dims.tensor_len()).collect();
        Tensor { data, dims }
    }

    /// Reinterprets the buffer under new dims holding the same number of elements.
    pub fn reshape<E: Dims>(self, dims: E) -> Result<Tensor<T, E>> {
        Tensor::try_from_vec(self.data, dims)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn dims(&self) -> &D {
        &self.dims
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.data.iter_mut()
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Clone, D: Dims> Tensor<T, D> {
    pub fn filled(value: T, dims: D) -> Self {
        Tensor {
            data: vec![value; dims.tensor_len()],
            dims,
        }
    }
    #[inline]
    pub fn fill(&mut self, fill: T) {
        self.data.fill(fill);
    }
}

impl<T: Zero + Clone, D: Dims> Tensor<T, D> {
    #[inline]
    pub fn zeroed(dims: D) -> Self {
        Self::filled(T::zero(), dims)
    }
    #[inline]
    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
    }
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|x| x.is_zero())
    }
}

impl<T: Copy + PartialOrd, D: Dims> Tensor<T, D> {
    pub fn max_value(&self) -> Option<T> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold(first, |m, x| if x > m { x } else { m }))
    }

    /// Index of the first maximum element.
    pub fn argmax(&self) -> Option<usize> {
        argmax(&self.data)
    }
}

pub(crate) fn argmax<T: Copy + PartialOrd>(a: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &x) in a.iter().enumerate() {
        match best {
            Some((_, m)) if !(x > m) => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}

impl<T> Tensor1<T> {
    pub fn from_vec_1d(data: Vec<T>) -> Self {
        let len = data.len();
        Tensor { data, dims: Dim1(len) }
    }
}

impl<T> Tensor2<T> {
    /// Builds a matrix from nested rows, rejecting empty or ragged input.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let num_rows = rows.len();
        let num_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if num_rows == 0 || num_cols == 0 {
            return Err(Error::InvalidInput("matrix must not be empty".to_string()));
        }
        let mut data = Vec::with_capacity(num_rows * num_cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != num_cols {
                return Err(Error::InvalidInput(format!(
                    "row {i} has {} columns, expected {num_cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(Tensor { data, dims: Dim2(num_rows, num_cols) })
    }
}

impl<T: Copy + Zero> Tensor3<T> {
    /// Copies this tensor into a larger one with `padding` zero cells on every spatial border.
    pub fn zero_padded(&self, padding: usize) -> Tensor3<T> {
        if padding == 0 {
            return self.clone();
        }
        let &Dim3(depth, height, width) = self.dims();
        let (ph, pw) = (height + 2 * padding, width + 2 * padding);
        let mut out = Tensor3::zeroed(Dim3(depth, ph, pw));
        for d in 0..depth {
            for y in 0..height {
                let src = (d * height + y) * width;
                let dst = (d * ph + y + padding) * pw + padding;
                out.data[dst..dst + width].copy_from_slice(&self.data[src..src + width]);
            }
        }
        out
    }

    /// Inverse of [`Tensor3::zero_padded`]: strips `padding` cells from every spatial border.
    pub fn unpadded(&self, padding: usize) -> Tensor3<T> {
        if padding == 0 {
            return self.clone();
        }
        let &Dim3(depth, ph, pw) = self.dims();
        assert!(ph >= 2 * padding && pw >= 2 * padding, "padding {padding} exceeds dims {}", self.dims);
        let (height, width) = (ph - 2 * padding, pw - 2 * padding);
        let mut out = Tensor3::zeroed(Dim3(depth, height, width));
        for d in 0..depth {
            for y in 0..height {
                let src = (d * ph + y + padding) * pw + padding;
                let dst = (d * height + y) * width;
                out.data[dst..dst + width].copy_from_slice(&self.data[src..src + width]);
            }
        }
        out
    }
}

impl<T, D: Dims> AsRef<[T]> for Tensor<T, D> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        &self.data
    }
}

impl<T, D: Dims> AsMut<[T]> for Tensor<T, D> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T, D: Dims> Index<usize> for Tensor<T, D> {
    type Output = T;
    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T, D: Dims> IndexMut<usize> for Tensor<T, D> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

macro_rules! impl_multi_index {
    ($dim:ident, $n:literal, |$d:ident, $i:ident| $offset:expr) => {
        impl<T> Index<[usize; $n]> for Tensor<T, $dim> {
            type Output = T;
            #[inline]
            fn index(&self, $i: [usize; $n]) -> &T {
                let $d = &self.dims;
                debug_assert!($i.iter().zip($d.as_vec()).all(|(&i, n)| i < n), "index {:?} out of bounds for {}", $i, $d);
                &self.data[$offset]
            }
        }
        impl<T> IndexMut<[usize; $n]> for Tensor<T, $dim> {
            #[inline]
            fn index_mut(&mut self, $i: [usize; $n]) -> &mut T {
                let $d = &self.dims;
                debug_assert!($i.iter().zip($d.as_vec()).all(|(&i, n)| i < n), "index {:?} out of bounds for {}", $i, $d);
                &mut self.data[$offset]
            }
        }
    };
}

impl_multi_index!(Dim2, 2, |d, i| i[0] * d.1 + i[1]);
impl_multi_index!(Dim3, 3, |d, i| (i[0] * d.1 + i[1]) * d.2 + i[2]);
impl_multi_index!(Dim4, 4, |d, i| ((i[0] * d.1 + i[1]) * d.2 + i[2]) * d.3 + i[3]);

impl<'a, T, D: Dims> IntoIterator for &'a Tensor<T, D> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<'a, T, D: Dims> IntoIterator for &'a mut Tensor<T, D> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter_mut()
    }
}

impl<T, D: Dims> IntoIterator for Tensor<T, D> {
    type Item = T;
    type IntoIter = IntoIter<T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}
