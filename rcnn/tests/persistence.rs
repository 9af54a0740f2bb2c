use rcnn::net::initializer::RandomNetInitializer;
use rcnn::net::{LoadStatus, Network, INPUT_SHAPE};
use rcnn::persist::ParamArchive;
use rcnn::tensor::Tensor3;
use rcnn::Error;
use std::fs;

fn network(seed: u64) -> Network<f64> {
    Network::new(&mut RandomNetInitializer::seed_from_u64(seed)).unwrap()
}

fn test_input() -> Tensor3<f64> {
    let data = (0..INPUT_SHAPE.1 * INPUT_SHAPE.2).map(|i| (i % 17) as f64 / 16.0).collect();
    Tensor3::from_vec(data, INPUT_SHAPE)
}

#[test]
fn save_and_load_reproduce_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");

    let mut trained = network(1);
    trained.backward(&test_input(), 3).unwrap();
    trained.update(0.01);
    // leave a pending accumulator behind to check it is persisted too
    trained.backward(&test_input(), 5).unwrap();
    trained.save(&path).unwrap();

    let mut restored = network(2);
    assert_ne!(restored.predict(&test_input()).unwrap(), trained.predict(&test_input()).unwrap());
    restored.load_params(&path).unwrap();
    assert_eq!(restored.predict(&test_input()).unwrap(), trained.predict(&test_input()).unwrap());
    assert_eq!(restored.to_archive(), trained.to_archive());
    assert!(restored.has_pending_gradients());
}

#[test]
fn archive_keys_follow_layer_names() {
    let net = network(1);
    let archive = net.to_archive();
    let keys: Vec<&str> = archive.keys().collect();
    assert!(keys.contains(&"layer0_conv.weights"));
    assert!(keys.contains(&"layer0_conv.biases_grad"));
    assert!(keys.contains(&"layer1_prelu.alpha"));
    assert!(keys.contains(&"layer12_fc.weights_grad"));
    assert!(!keys.iter().any(|k| k.contains("max_pool")));
    // 4 conv + 2 fc layers with 4 arrays each, 6 prelu layers with 2
    assert_eq!(archive.len(), 6 * 4 + 6 * 2);
}

#[test]
fn missing_file_falls_back_to_fresh_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let (mut net, status) = Network::<f64>::load_or_init(&path, &mut RandomNetInitializer::seed_from_u64(1)).unwrap();
    assert!(!status.is_loaded());
    assert!(matches!(status, LoadStatus::Fresh { .. }));
    assert_eq!(net.predict(&test_input()).unwrap(), network(1).predict(&test_input()).unwrap());

    let res = network(1).load_params(&path);
    assert!(matches!(res, Err(Error::Io(_))));
}

#[test]
fn missing_key_is_reported_and_leaves_network_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.json");
    let mut archive = network(1).to_archive();
    archive.remove("layer5_conv.biases");
    archive.save(&path).unwrap();

    let mut net = network(2);
    let before = net.to_archive();
    let res = net.load_params(&path);
    assert!(matches!(res, Err(Error::MissingKey(ref k)) if k == "layer5_conv.biases"));
    assert_eq!(net.to_archive(), before);

    let (_, status) = Network::<f64>::load_or_init(&path, &mut RandomNetInitializer::seed_from_u64(2)).unwrap();
    match status {
        LoadStatus::Fresh { reason } => assert!(reason.contains("layer5_conv.biases")),
        LoadStatus::Loaded => panic!("partial archive must not load"),
    }
}

#[test]
fn corrupt_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    fs::write(&path, "{\"format\": \"rcnn-params\"").unwrap();
    let res = network(1).load_params(&path);
    assert!(matches!(res, Err(Error::Json(_))));

    let (_, status) = Network::<f64>::load_or_init(&path, &mut RandomNetInitializer::seed_from_u64(1)).unwrap();
    assert!(!status.is_loaded());
}

#[test]
fn f32_network_loads_f64_saved_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");
    network(3).save(&path).unwrap();
    let loaded = ParamArchive::load(&path).unwrap();
    let mut net: Network<f32> = Network::new(&mut RandomNetInitializer::seed_from_u64(9)).unwrap();
    net.restore(&loaded).unwrap();
    let p = net.predict(&Tensor3::zeroed(INPUT_SHAPE)).unwrap();
    assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
}
