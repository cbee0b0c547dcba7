use cli::handlers::{
    handle_merge_lora, handle_quantize, inspect_archive, quantization_spec,
};
use indexmap::IndexMap;
use kura::{
    Tensor, TensorMap,
    archive::{Archive, write_tensors},
    quantization::{
        QuantizationError, QuantizationManifest, QuantizationMode,
        QuantizationSpec,
    },
};
use tempfile::tempdir;

fn model_tensors() -> TensorMap {
    let mut tensors = TensorMap::new();
    let values: Vec<f32> = (0..2 * 64).map(|i| (i as f32 / 64.0) - 1.0).collect();
    tensors.insert(
        "blocks.0.proj.weight".to_string(),
        Tensor::from_slice(&[2, 64], &values).unwrap(),
    );
    tensors.insert(
        "norm.weight".to_string(),
        Tensor::from_slice(&[2], &[1.0f32, 1.0]).unwrap(),
    );
    tensors
}

#[test]
fn test_inspect_lists_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let mut metadata = IndexMap::new();
    metadata.insert("format".to_string(), "pt".to_string());
    write_tensors(&path, &model_tensors(), Some(&metadata)).unwrap();

    let summary = inspect_archive(&path).unwrap();
    assert_eq!(summary.metadata["format"], "pt");
    assert_eq!(summary.tensors.len(), 2);
    assert_eq!(summary.tensors[0].name, "blocks.0.proj.weight");
    assert_eq!(summary.tensors[0].data_type, "F32");
    assert_eq!(summary.tensors[0].shape, vec![2, 64]);
    assert_eq!(summary.tensors[0].bytes, 2 * 64 * 4);
}

#[test]
fn test_quantize_writes_manifest() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_tensors(
        &input.path().join("model.safetensors"),
        &model_tensors(),
        None,
    )
    .unwrap();

    handle_quantize(
        input.path(),
        output.path(),
        QuantizationSpec::default(),
        Some("org/model".to_string()),
        None,
    )
    .unwrap();

    let manifest = QuantizationManifest::load(output.path()).unwrap();
    assert_eq!(manifest.model_id.as_deref(), Some("org/model"));
    assert_eq!(manifest.layers.len(), 1);
    assert_eq!(manifest.layers[0].name, "blocks.0.proj.weight");
}

#[test]
fn test_merge_lora_writes_merged_archives() {
    let model = tempdir().unwrap();
    let lora = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_tensors(
        &model.path().join("model.safetensors"),
        &model_tensors(),
        None,
    )
    .unwrap();

    let mut adapter = TensorMap::new();
    adapter.insert(
        "blocks.0.proj.lora_A.weight".to_string(),
        Tensor::from_slice(&[1, 64], &[1.0f32; 64]).unwrap(),
    );
    adapter.insert(
        "blocks.0.proj.lora_B.weight".to_string(),
        Tensor::from_slice(&[2, 1], &[0.5f32, 0.0]).unwrap(),
    );
    let lora_path = lora.path().join("adapter.safetensors");
    write_tensors(&lora_path, &adapter, None).unwrap();

    handle_merge_lora(
        model.path(),
        lora_path.to_str().unwrap(),
        output.path(),
        1.0,
    )
    .unwrap();

    let merged = Archive::open(output.path().join("model.safetensors")).unwrap();
    assert_eq!(merged.len(), 2);
    let original = model_tensors()["blocks.0.proj.weight"].to_f32_vec().unwrap();
    let weight = merged.tensor("blocks.0.proj.weight").unwrap().to_f32_vec().unwrap();
    assert_eq!(weight[0], original[0] + 0.5);
    assert_eq!(weight[64], original[64]);
}

#[test]
fn test_merge_lora_without_archives_fails() {
    let model = tempdir().unwrap();
    let output = tempdir().unwrap();
    assert!(handle_merge_lora(model.path(), "missing", output.path(), 1.0).is_err());
}

#[test]
fn test_merge_lora_rejects_quantized_model() {
    let input = tempdir().unwrap();
    let quantized = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_tensors(
        &input.path().join("model.safetensors"),
        &model_tensors(),
        None,
    )
    .unwrap();
    handle_quantize(
        input.path(),
        quantized.path(),
        QuantizationSpec::default(),
        None,
        None,
    )
    .unwrap();

    let error = handle_merge_lora(
        quantized.path(),
        "org/adapter",
        output.path(),
        1.0,
    )
    .unwrap_err();
    assert!(error.to_string().contains("quantized model"));
    assert!(!output.path().join("model.safetensors").exists());
}

#[test]
fn test_quantization_spec_defaults_per_mode() {
    assert_eq!(
        quantization_spec(QuantizationMode::Affine, None, None),
        QuantizationSpec::default()
    );
    assert_eq!(
        quantization_spec(QuantizationMode::Mxfp4, None, None),
        QuantizationSpec::mxfp4()
    );
    assert_eq!(
        quantization_spec(QuantizationMode::Affine, Some(64), Some(4)),
        QuantizationSpec::new(64, 4, QuantizationMode::Affine)
    );
}

#[test]
fn test_explicit_mxfp4_bits_are_rejected() {
    let spec = quantization_spec(QuantizationMode::Mxfp4, None, Some(8));
    assert_eq!(spec.bits, 8);
    assert!(matches!(spec.validate(), Err(QuantizationError::InvalidBits(8))));

    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_tensors(
        &input.path().join("model.safetensors"),
        &model_tensors(),
        None,
    )
    .unwrap();
    let error =
        handle_quantize(input.path(), output.path(), spec, None, None)
            .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<QuantizationError>(),
        Some(QuantizationError::InvalidBits(8))
    ));
    assert!(!QuantizationManifest::path_in(output.path()).exists());
}
