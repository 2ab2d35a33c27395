mod support;

use digitboost::dataset::mmap::{ImageShape, MmapError, load_from_mmap, open_training_cache};
use digitboost::features::flatten;
use support::cache::{FEATURES, SIDE, config_in, write_cache};

#[test]
fn two_missing_paths_are_both_named() {
    let temp = tempfile::tempdir().expect("tempdir");
    let images = temp.path().join("nope/images.dat");
    let labels = temp.path().join("nope/labels.npy");

    let err = load_from_mmap(&images, &labels, ImageShape::new(1, 1, SIDE, SIDE))
        .expect_err("missing files");
    assert!(matches!(err, MmapError::MissingFiles { .. }));
    let message = err.to_string();
    assert!(message.starts_with("mmap files not found, check paths:"));
    assert!(message.contains(&images.display().to_string()));
    assert!(message.contains(&labels.display().to_string()));
}

#[test]
fn label_count_sets_leading_dimension() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config_in(temp.path());
    let labels: Vec<i64> = (0..5).collect();
    let pixels: Vec<f32> = (0..5 * FEATURES).map(|v| v as f32).collect();
    write_cache(&config, &pixels, &labels);

    let (images, loaded) = open_training_cache(
        &config.data.train_images_path(),
        &config.data.train_labels_path(),
        1,
        SIDE,
        SIDE,
    )
    .expect("open cache");
    assert_eq!(images.shape().samples, 5);
    assert_eq!(loaded.as_slice(), labels.as_slice());

    let tensor = images.view().expect("tensor view");
    assert_eq!(tensor.dim(), (5, 1, SIDE, SIDE));
    let flat = flatten(tensor).expect("flatten");
    assert_eq!(flat.dim(), (5, FEATURES));
    assert_eq!(flat[[2, 0]], (2 * FEATURES) as f32);
    assert_eq!(flat[[4, FEATURES - 1]], (5 * FEATURES - 1) as f32);
}

#[test]
fn truncated_image_file_is_a_shape_mismatch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config_in(temp.path());
    write_cache(&config, &vec![0.0; 2 * FEATURES], &[1, 2]);
    let images = config.data.train_images_path();
    let bytes = std::fs::read(&images).expect("read images");
    std::fs::write(&images, &bytes[..bytes.len() - 4]).expect("truncate");

    let err = open_training_cache(&images, &config.data.train_labels_path(), 1, SIDE, SIDE)
        .expect_err("short image file");
    assert!(matches!(err, MmapError::ShapeMismatch { .. }));
}
