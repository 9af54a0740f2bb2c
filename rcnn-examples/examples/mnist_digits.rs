use rcnn::config::TrainConfig;
use rcnn::net::initializer::RandomNetInitializer;
use rcnn::net::Network;
use rcnn_examples::util::{load_mnist, MnistData};
use std::error::Error;
use std::time::Instant;

const TRAIN_SAMPLES: usize = 60_000;
const TEST_SAMPLES: usize = 10_000;
const DEFAULT_PARAMS_PATH: &str = "rcnn-examples/data/params.json";

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrainConfig::from_json_file(path)?,
        None => TrainConfig::default(),
    };
    let params_path = config
        .params_path
        .clone()
        .unwrap_or_else(|| DEFAULT_PARAMS_PATH.into());

    let MnistData { train, test } = load_mnist::<f32>(TRAIN_SAMPLES, TEST_SAMPLES);

    let mut initializer = match config.seed {
        Some(seed) => RandomNetInitializer::seed_from_u64(seed),
        None => RandomNetInitializer::default(),
    };
    let (mut net, status) = Network::<f32>::load_or_init(&params_path, &mut initializer)?;
    log::info!("{} parameters, resumed from disk: {}", net.num_params(), status.is_loaded());

    let start = Instant::now();
    let summaries = net.fit(&config, &train)?;
    log::info!(
        "training time for {} epochs: {:.1} sec",
        summaries.len(),
        start.elapsed().as_secs_f32()
    );

    let scorer = net.evaluate(&test)?;
    println!("{scorer}");

    net.save(&params_path)?;
    log::info!("saved parameters to {}", params_path.display());
    Ok(())
}
