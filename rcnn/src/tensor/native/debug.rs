use crate::tensor::{Dims, Tensor};
use std::fmt::{Debug, Formatter, Write};

const DEBUG_LIMIT: usize = 10;

fn fmt_separated<'a, T: Debug + 'a>(
    f: &mut Formatter,
    iter: impl Iterator<Item = &'a T>,
) -> std::fmt::Result {
    let mut first = true;
    for el in iter {
        if first {
            first = false;
        } else {
            f.write_str(", ")?;
        }
        Debug::fmt(el, f)?;
    }
    Ok(())
}

impl<T: Debug, D: Dims> Debug for Tensor<T, D> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let data = self.as_ref();
        f.write_char('[')?;
        if data.len() > DEBUG_LIMIT {
            let half = DEBUG_LIMIT / 2;
            fmt_separated(f, data[..half].iter())?;
            write!(f, ", ...({} hidden), ", data.len() - 2 * half)?;
            fmt_separated(f, data[data.len() - half..].iter())?;
        } else {
            fmt_separated(f, data.iter())?;
        }
        f.write_char(']')?;
        write!(
            f,
            " dtype={} dims={} len={}",
            std::any::type_name::<T>(),
            self.dims(),
            self.len()
        )
    }
}
