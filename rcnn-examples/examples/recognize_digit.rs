use rcnn::net::initializer::RandomNetInitializer;
use rcnn::net::{LoadStatus, Network};
use rcnn_examples::util::{load_mnist, MnistData};
use std::error::Error;

const PARAMS_PATH: &str = "rcnn-examples/data/params.json";
const IMAGES: usize = 10;

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (mut net, status) = Network::<f32>::load_or_init(PARAMS_PATH, &mut RandomNetInitializer::default())?;
    if let LoadStatus::Fresh { reason } = &status {
        log::warn!("no trained parameters ({reason}), predictions are random");
    }

    let MnistData { test, .. } = load_mnist::<f32>(0, IMAGES);
    for (i, sample) in test.iter().enumerate() {
        let prediction = net.recognize(&sample.image)?;
        println!(
            "image {i}: label {}, recognized {} with confidence {:.3}",
            sample.label, prediction.digit, prediction.confidence
        );
    }
    Ok(())
}
