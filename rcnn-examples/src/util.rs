use mnist::{Mnist, MnistBuilder};
use rcnn::dtype::DType;
use rcnn::net::{Sample, IMAGE_SIDE};
use rcnn::tensor::{Dim2, Tensor2};

pub const DATA_PATH: &str = "rcnn-examples/data";
const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;

pub struct MnistData<F> {
    pub train: Vec<Sample<F>>,
    pub test: Vec<Sample<F>>,
}

/// Reads the MNIST idx files from [`DATA_PATH`]. Pixels are kept in 0..=255.
pub fn load_mnist<F: DType>(train_samples: usize, test_samples: usize) -> MnistData<F> {
    let Mnist {
        trn_img,
        trn_lbl,
        tst_img,
        tst_lbl,
        ..
    } = MnistBuilder::new()
        .base_path(DATA_PATH)
        .label_format_digit()
        .training_set_length(train_samples as u32)
        .test_set_length(test_samples as u32)
        .finalize();

    assert_eq!(trn_img.len(), train_samples * IMAGE_PIXELS);
    assert_eq!(trn_lbl.len(), train_samples);
    assert_eq!(tst_img.len(), test_samples * IMAGE_PIXELS);
    assert_eq!(tst_lbl.len(), test_samples);
    log::info!("loaded {train_samples} training and {test_samples} test images from {DATA_PATH}");

    MnistData {
        train: to_samples(&trn_img, &trn_lbl),
        test: to_samples(&tst_img, &tst_lbl),
    }
}

fn to_samples<F: DType>(images: &[u8], labels: &[u8]) -> Vec<Sample<F>> {
    images
        .chunks_exact(IMAGE_PIXELS)
        .zip(labels)
        .map(|(pixels, &label)| Sample {
            image: Tensor2::from_vec(
                pixels.iter().map(|&p| F::from_usize(p as usize)).collect(),
                Dim2(IMAGE_SIDE, IMAGE_SIDE),
            ),
            label: label as usize,
        })
        .collect()
}
