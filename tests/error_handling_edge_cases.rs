//! Error handling and boundary conditions of the removal pipeline
//!
//! Each failure must surface as exactly one error with the right kind, and
//! never leave a partial artifact behind.

mod common;

use bgremove_mask::{
    backends::MockBackend, BackendType, BgRemovalError, ErrorKind, ExecutionProvider,
    ModelLoading, OutputInterpretation, OutputMode, RemovalConfig,
};
use common::{uri, write_png, TestWorkspace};
use ndarray::{ArrayD, IxDyn};

#[test]
fn test_error_display_carries_cause() {
    let err = BgRemovalError::invalid_source("cannot open /tmp/x.jpg");
    assert_eq!(err.kind(), ErrorKind::InvalidSource);
    assert_eq!(err.kind().to_string(), "InvalidSource");
    assert!(err.to_string().contains("cannot open /tmp/x.jpg"));
    assert_eq!(err.message(), "cannot open /tmp/x.jpg");
}

#[test]
fn test_config_validation_edge_cases() {
    let config = RemovalConfig::builder().max_dimension(1).build().unwrap();
    assert_eq!(config.max_dimension, 1);

    let err = RemovalConfig::builder().max_dimension(0).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert!(err.to_string().contains("max dimension"));

    let err = RemovalConfig::builder()
        .backend(BackendType::Tract)
        .execution_provider(ExecutionProvider::Cuda)
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);

    let mut config = RemovalConfig::default();
    config.model.input_size = (0, 320);
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidConfig);

    let mut config = RemovalConfig::default();
    config.model.std = [0.5, 0.0, 0.5];
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidConfig);

    let mut config = RemovalConfig::default();
    config.model.sha256 = Some("not-a-digest".to_string());
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidConfig);
}

#[test]
fn test_json_config_errors() {
    let ws = TestWorkspace::new();

    let err = RemovalConfig::from_json_file(ws.path("absent.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);

    let broken = ws.path("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    let err = RemovalConfig::from_json_file(&broken).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);

    let invalid = ws.path("invalid.json");
    std::fs::write(&invalid, r#"{"max_dimension": 0}"#).unwrap();
    let err = RemovalConfig::from_json_file(&invalid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);

    let partial = ws.path("partial.json");
    std::fs::write(
        &partial,
        r#"{"model": {"path": "seg.onnx", "interpretation": {"type": "class_index", "background": 0}}}"#,
    )
    .unwrap();
    let config = RemovalConfig::from_json_file(&partial).unwrap();
    assert_eq!(
        config.model.interpretation,
        OutputInterpretation::ClassIndex { background: 0 }
    );
    assert_eq!(config.output_mode, OutputMode::Cutout);
}

#[test]
fn test_undecodable_source_is_invalid() {
    let ws = TestWorkspace::new();
    let fake = ws.path("fake.jpg");
    std::fs::write(&fake, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).unwrap();
    let (remover, factory) = ws.remover(
        ws.config(OutputMode::Cutout, ModelLoading::PerCall),
        MockBackend::new(),
    );

    let err = remover.run(&uri(&fake)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSource);
    assert_eq!(factory.inference_calls(), 0);
}

#[test]
fn test_unsupported_uri_schemes() {
    let ws = TestWorkspace::new();
    let (remover, factory) = ws.remover(
        ws.config(OutputMode::Cutout, ModelLoading::PerCall),
        MockBackend::new(),
    );

    for location in ["", "https://example.com/photo.jpg", "file://remote-host/photo.jpg"] {
        let err = remover.run(location).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSource, "{location:?}");
    }
    assert_eq!(factory.inference_calls(), 0);
}

#[test]
fn test_oversized_source_fails_allocation() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("wide.png"), 65, 3);
    let mut config = ws.config(OutputMode::Cutout, ModelLoading::PerCall);
    config.max_dimension = 64;
    let (remover, factory) = ws.remover(config, MockBackend::new());

    let err = remover.run(&uri(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BufferAllocationFailed);
    assert_eq!(factory.inference_calls(), 0);
}

#[test]
fn test_inconsistent_model_output_fails_mask_construction() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("mask.png"), 8, 8);

    let cases = [
        // Probability maps must be single channel
        ArrayD::<f32>::zeros(IxDyn(&[1, 3, 8, 8])),
        // Non-finite scores
        ArrayD::from_elem(IxDyn(&[1, 1, 4, 4]), f32::NAN),
    ];

    for output in cases {
        let (remover, _) = ws.remover(
            ws.config(OutputMode::Cutout, ModelLoading::PerCall),
            MockBackend::new().with_fixed_output(output),
        );
        let err = remover.run(&uri(&source)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaskConstructionFailed);
    }
    assert!(!ws.output_dir.join("mask.png").exists());
}

#[test]
fn test_class_scores_need_background_channel() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("scores.png"), 8, 8);
    let mut config = ws.config(OutputMode::Mask, ModelLoading::PerCall);
    config.model.interpretation = OutputInterpretation::ClassScores { background: 4 };
    let (remover, _) = ws.remover(
        config,
        MockBackend::new().with_fixed_output(ArrayD::zeros(IxDyn(&[1, 2, 8, 8]))),
    );

    let err = remover.run(&uri(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaskConstructionFailed);
}

#[test]
fn test_inference_failure_is_reported_once() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("fail.png"), 8, 8);
    let (remover, factory) = ws.remover(
        ws.config(OutputMode::Cutout, ModelLoading::Shared),
        MockBackend::new().with_inference_failure(),
    );

    let err = remover.run(&uri(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InferenceFailed);
    assert_eq!(factory.inference_calls(), 1);

    // The shared model stays usable for the next call
    let err = remover.run(&uri(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InferenceFailed);
    assert_eq!(factory.init_calls(), 1);
}

#[test]
fn test_unwritable_output_directory() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("blocked.png"), 8, 8);
    std::fs::write(&ws.output_dir, b"a file where the directory should be").unwrap();
    let (remover, _) = ws.remover(
        ws.config(OutputMode::Cutout, ModelLoading::PerCall),
        MockBackend::new(),
    );

    let err = remover.run(&uri(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteFailed);
}

#[test]
fn test_existing_output_is_replaced() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("again.png"), 12, 9);
    std::fs::create_dir_all(&ws.output_dir).unwrap();
    std::fs::write(ws.output_dir.join("again.png"), b"stale").unwrap();
    let (remover, _) = ws.remover(
        ws.config(OutputMode::Mask, ModelLoading::PerCall),
        MockBackend::new(),
    );

    let output = remover.run(&uri(&source)).unwrap();
    let written = image::open(&output.path).unwrap();
    assert_eq!((written.width(), written.height()), (12, 9));
}

#[test]
fn test_class_index_model_end_to_end() {
    let ws = TestWorkspace::new();
    let source = write_png(&ws.path("labels.png"), 30, 20);
    let mut config = ws.config(OutputMode::Mask, ModelLoading::PerCall);
    config.model.interpretation = OutputInterpretation::ClassIndex { background: 0 };
    let (remover, _) = ws.remover(config, MockBackend::new());

    let output = remover.run(&uri(&source)).unwrap();
    let mask = image::open(&output.path).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (30, 20));
    assert_eq!(mask.get_pixel(0, 0).0[0], 0);
    assert!(mask.get_pixel(15, 10).0[0] > 128);
}
