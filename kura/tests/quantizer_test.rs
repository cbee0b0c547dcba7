mod common;

use std::path::Path;

use kura::{
    DataType,
    archive::Archive,
    quantization::{
        MANIFEST_FILE_NAME, QuantizationError, QuantizationManifest,
        QuantizationMode, QuantizationSpec, QuantizeEvent, Quantizer,
        has_quantization,
    },
};

use crate::common::{random_tensor, tensor_map, write_fixture_with_metadata};

fn write_model(dir: &Path) {
    write_fixture_with_metadata(
        &dir.join("transformer").join("model.safetensors"),
        &tensor_map(&[
            ("blocks.0.attn.qkv.weight", random_tensor(&[96, 64], 1)),
            ("blocks.0.attn.qkv.bias", random_tensor(&[96], 2)),
            ("blocks.0.norm.weight", random_tensor(&[64], 3)),
            ("blocks.0.odd.weight", random_tensor(&[8, 48], 4)),
        ]),
        &[("format", "pt")],
    );
    write_fixture_with_metadata(
        &dir.join("text_encoder").join("model.safetensors"),
        &tensor_map(&[(
            "model.encoder.layers.0.mlp.up.weight",
            random_tensor(&[128, 32], 5),
        )]),
        &[],
    );
    std::fs::write(
        dir.join("transformer").join("config.json"),
        r#"{"num_layers": 1}"#,
    )
    .unwrap();
}

#[test]
fn test_quantize_directory() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_model(input.path());

    let mut tensor_events = 0;
    let mut started = None;
    let spec = QuantizationSpec::new(32, 4, QuantizationMode::Affine);
    let manifest = Quantizer::new(spec)
        .with_model_id("acme/tiny")
        .with_revision("main")
        .quantize_directory_with_progress(input.path(), output.path(), |event| {
            match event {
                QuantizeEvent::Started {
                    archives,
                    tensors,
                } => started = Some((archives, tensors)),
                QuantizeEvent::Tensor {
                    ..
                } => tensor_events += 1,
                QuantizeEvent::ArchiveWritten {
                    ..
                } => {},
            }
        })
        .unwrap();

    assert_eq!(started, Some((2, 5)));
    assert_eq!(tensor_events, 5);
    assert!(has_quantization(output.path()));
    assert_eq!(
        QuantizationManifest::load(output.path()).unwrap(),
        manifest
    );
    assert_eq!(manifest.model_id.as_deref(), Some("acme/tiny"));
    assert_eq!(manifest.defaults, spec);

    let names: Vec<&str> =
        manifest.layers.iter().map(|layer| layer.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "model.encoder.layers.0.mlp.up.weight",
            "blocks.0.attn.qkv.weight"
        ]
    );
    let qkv = manifest.entry("blocks.0.attn.qkv.weight").unwrap();
    assert_eq!(qkv.file, "transformer/model.safetensors");
    assert_eq!(qkv.shape, vec![96, 64]);
    assert_eq!((qkv.in_dim, qkv.out_dim), (64, 96));

    let archive =
        Archive::open(output.path().join("transformer/model.safetensors"))
            .unwrap();
    assert_eq!(archive.user_metadata()["format"], "pt");
    let codes = archive.metadata("blocks.0.attn.qkv.weight").unwrap();
    assert_eq!(codes.data_type(), DataType::U8);
    assert_eq!(codes.shape(), &[96, 32]);
    assert_eq!(
        archive.metadata("blocks.0.attn.qkv.scales").unwrap().shape(),
        &[96, 2]
    );
    assert_eq!(
        archive.tensor("blocks.0.odd.weight").unwrap(),
        random_tensor(&[8, 48], 4)
    );
    assert_eq!(
        archive.tensor("blocks.0.norm.weight").unwrap(),
        random_tensor(&[64], 3)
    );

    let config = output.path().join("transformer").join("config.json");
    assert_eq!(
        std::fs::read_to_string(config).unwrap(),
        r#"{"num_layers": 1}"#
    );
    assert!(output.path().join(MANIFEST_FILE_NAME).is_file());
}

#[test]
fn test_custom_filter() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_model(input.path());

    let manifest = Quantizer::new(QuantizationSpec::default())
        .with_filter(|descriptor, _| descriptor.name().contains("mlp"))
        .quantize_directory(input.path(), output.path())
        .unwrap();
    assert_eq!(manifest.layers.len(), 1);
    assert_eq!(manifest.layers[0].file, "text_encoder/model.safetensors");
}

#[test]
fn test_failures() {
    let empty = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    assert!(matches!(
        Quantizer::new(QuantizationSpec::default())
            .quantize_directory(empty.path(), output.path()),
        Err(QuantizationError::NoSafetensorsFound(_))
    ));

    let input = tempfile::tempdir().unwrap();
    write_model(input.path());
    let blocker = output.path().join("file");
    std::fs::write(&blocker, "not a directory").unwrap();
    assert!(matches!(
        Quantizer::new(QuantizationSpec::default())
            .quantize_directory(input.path(), &blocker.join("nested")),
        Err(QuantizationError::OutputDirectoryCreationFailed { .. })
    ));

    assert!(matches!(
        Quantizer::new(QuantizationSpec::new(32, 4, QuantizationMode::Mxfp4))
            .quantize_directory(input.path(), output.path()),
        Ok(_)
    ));
    assert!(matches!(
        Quantizer::new(QuantizationSpec::new(16, 4, QuantizationMode::Affine))
            .quantize_directory(input.path(), output.path()),
        Err(QuantizationError::InvalidGroupSize(16))
    ));
}
