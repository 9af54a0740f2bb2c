//! Named-array container holding every learnable parameter of a network.
//!
//! Arrays are stored as JSON objects `{ "shape": [..], "data": "<base64>" }`, where the data
//! string encodes big-endian `f64` values. Values are widened to `f64` on save and narrowed
//! to the network's element type on load.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::{Dims, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const FORMAT: &str = "rcnn-params";
const VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedArray {
    pub shape: Vec<usize>,
    #[serde(with = "serialize_vec")]
    pub data: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct ArchiveFile {
    format: String,
    version: u32,
    arrays: BTreeMap<String, NamedArray>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamArchive {
    arrays: BTreeMap<String, NamedArray>,
}

impl ParamArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: DType, D: Dims>(&mut self, key: impl Into<String>, tensor: &Tensor<T, D>) {
        let array = NamedArray {
            shape: tensor.dims().as_vec(),
            data: tensor.iter().map(|&x| x.as_f64()).collect(),
        };
        self.arrays.insert(key.into(), array);
    }

    /// Reads the array stored under `key`, which must have exactly the given dims.
    pub fn get<T: DType, D: Dims>(&self, key: &str, dims: D) -> Result<Tensor<T, D>> {
        let array = self
            .arrays
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))?;
        match D::try_from_slice(&array.shape) {
            Some(stored) if stored == dims => {}
            _ => {
                return Err(Error::ShapeMismatch {
                    context: "parameter archive",
                    expected: format!("{key} with dims {dims}"),
                    actual: format!("{:?}", array.shape),
                });
            }
        }
        let data = array.data.iter().map(|&x| T::from_f64(x)).collect();
        Tensor::try_from_vec(data, dims)
    }

    pub fn remove(&mut self, key: &str) -> Option<NamedArray> {
        self.arrays.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let file = ArchiveFile {
            format: FORMAT.to_string(),
            version: VERSION,
            arrays: self.arrays.clone(),
        };
        serde_json::to_writer(writer, &file)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let file: ArchiveFile = serde_json::from_reader(reader)?;
        if file.format != FORMAT {
            return Err(Error::InvalidArchive(format!("unknown format '{}'", file.format)));
        }
        if file.version != VERSION {
            return Err(Error::InvalidArchive(format!("unsupported version {}", file.version)));
        }
        for (key, array) in file.arrays.iter() {
            let expected: usize = array.shape.iter().product();
            if expected != array.data.len() {
                return Err(Error::InvalidArchive(format!(
                    "array '{key}' has {} values for shape {:?}",
                    array.data.len(),
                    array.shape
                )));
            }
        }
        Ok(ParamArchive { arrays: file.arrays })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}

mod serialize_vec {
    use serde::de::{Error, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt::Formatter;

    struct Vec64Visitor;

    impl<'de> Visitor<'de> for Vec64Visitor {
        type Value = Vec<f64>;
        fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
            formatter.write_str("a base64-encoded string encoding a f64 array")
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            match base64::decode(v) {
                Ok(data) => {
                    if data.len() % 8 != 0 {
                        Err(E::custom("byte length not a multiple of 8"))
                    } else {
                        let mut res = Vec::with_capacity(data.len() / 8);
                        for chunk in data.chunks_exact(8) {
                            let mut bytes = [0u8; 8];
                            bytes.copy_from_slice(chunk);
                            res.push(f64::from_be_bytes(bytes));
                        }
                        Ok(res)
                    }
                }
                Err(e) => Err(E::custom(e.to_string())),
            }
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: From<Vec<f64>>,
    {
        deserializer.deserialize_str(Vec64Visitor).map(|vec| vec.into())
    }

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[f64]>,
    {
        let arr = value.as_ref();
        let mut bytes = Vec::with_capacity(arr.len() * 8);
        for &f in arr {
            bytes.extend_from_slice(&f.to_be_bytes());
        }
        serializer.serialize_str(base64::encode(bytes).as_str())
    }
}
