use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter, Write};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Dim1(pub usize);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Dim2(pub usize, pub usize);

impl Dim2 {
    #[inline]
    pub fn rows(&self) -> usize {
        self.0
    }
    #[inline]
    pub fn cols(&self) -> usize {
        self.1
    }
}

/// Shape of a feature map: (depth, height, width).
///
/// Depth is the channel count, height and width the spatial extent.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Dim3(pub usize, pub usize, pub usize);

pub type TensorShape = Dim3;

impl Dim3 {
    #[inline]
    pub fn depth(&self) -> usize {
        self.0
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.1
    }
    #[inline]
    pub fn width(&self) -> usize {
        self.2
    }
}

/// Shape of a filter bank: (filters, depth, kernel height, kernel width).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Dim4(pub usize, pub usize, pub usize, pub usize);

pub trait Dims: Copy + Debug + Eq + Display {
    const N: usize;
    fn first(&self) -> usize;
    fn tensor_len(&self) -> usize;
    fn as_vec(&self) -> Vec<usize>;
    fn try_from_slice(dims: &[usize]) -> Option<Self>;
}

impl Dims for Dim1 {
    const N: usize = 1;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0]
    }
    fn try_from_slice(dims: &[usize]) -> Option<Self> {
        match dims {
            &[a] => Some(Dim1(a)),
            _ => None,
        }
    }
}

impl Dims for Dim2 {
    const N: usize = 2;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0 * self.1
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0, self.1]
    }
    fn try_from_slice(dims: &[usize]) -> Option<Self> {
        match dims {
            &[a, b] => Some(Dim2(a, b)),
            _ => None,
        }
    }
}

impl Dims for Dim3 {
    const N: usize = 3;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0 * self.1 * self.2
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0, self.1, self.2]
    }
    fn try_from_slice(dims: &[usize]) -> Option<Self> {
        match dims {
            &[a, b, c] => Some(Dim3(a, b, c)),
            _ => None,
        }
    }
}

impl Dims for Dim4 {
    const N: usize = 4;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0 * self.1 * self.2 * self.3
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0, self.1, self.2, self.3]
    }
    fn try_from_slice(dims: &[usize]) -> Option<Self> {
        match dims {
            &[a, b, c, d] => Some(Dim4(a, b, c, d)),
            _ => None,
        }
    }
}

fn fmt_dims(f: &mut Formatter<'_>, dims: &[usize]) -> std::fmt::Result {
    f.write_char('(')?;
    for (i, d) in dims.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        Display::fmt(d, f)?;
    }
    f.write_char(')')
}

impl Display for Dim1 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_dims(f, &[self.0])
    }
}

impl Display for Dim2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_dims(f, &[self.0, self.1])
    }
}

impl Display for Dim3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_dims(f, &[self.0, self.1, self.2])
    }
}

impl Display for Dim4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_dims(f, &[self.0, self.1, self.2, self.3])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!("(3)", Dim1(3).to_string());
        assert_eq!("(2, 5)", Dim2(2, 5).to_string());
        assert_eq!("(1, 28, 28)", Dim3(1, 28, 28).to_string());
        assert_eq!("(16, 1, 3, 3)", Dim4(16, 1, 3, 3).to_string());
    }

    #[test]
    fn test_from_slice() {
        assert_eq!(Some(Dim3(32, 4, 4)), Dim3::try_from_slice(&[32, 4, 4]));
        assert_eq!(None, Dim3::try_from_slice(&[32, 4]));
        assert_eq!(Dim4(2, 3, 4, 5).tensor_len(), 120);
        assert_eq!(Dim3::default().tensor_len(), 0);
    }
}
