//! Registration pipeline integration tests.
//!
//! Tests verify:
//! - A full load, register and export run with a mock pipeline
//! - Missing pipeline outputs are reported
//! - The request document carries `z, y, x` spacings, a cubic block and
//!   absolute local paths
//! - The command backend speaks JSON over stdin and stdout

use std::path::Path;

use easifish_register::error::PipelineError;
use easifish_register::export::{export_volume, read_nifti, ExportOptions};
use easifish_register::io::StoreOptions;
use easifish_register::pipeline::{
    ClusterConfig, PipelineInvoker, RegistrationRequest, RequestDocument,
};
use easifish_register::volume::{DatasetLoader, MultiscaleDataset};

use super::test_utils::{create_multiscale, ramp_volume, MockPipeline, Omit};

const SHAPE: [usize; 3] = [8, 12, 16];

async fn load(root: &Path) -> MultiscaleDataset {
    DatasetLoader::open(root.to_str().unwrap(), &StoreOptions::default())
        .await
        .unwrap()
        .load_multiscale("lowres", "highres", None)
        .await
        .unwrap()
}

/// Fixed and moving containers side by side, plus a request writing to `out`.
async fn setup(dir: &Path) -> RegistrationRequest {
    let fixed_root = dir.join("fixed.n5");
    let moving_root = dir.join("moving.n5");
    create_multiscale(&fixed_root, SHAPE, [0.23, 0.23, 0.42]).await;
    create_multiscale(&moving_root, SHAPE, [0.25, 0.25, 0.5]).await;

    let fixed = load(&fixed_root).await;
    let moving = load(&moving_root).await;
    RegistrationRequest::new(fixed, moving, 4, dir.join("out"), ClusterConfig::new())
}

// =============================================================================
// Mock Pipeline
// =============================================================================

#[tokio::test]
async fn test_register_and_export_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let request = setup(dir.path()).await;
    assert!(!request.write_directory.exists());

    let invoker = PipelineInvoker::new(MockPipeline::new([1.5, -2.0, 0.25]));
    let result = invoker.invoke(&request).await.unwrap();
    assert_eq!(invoker.pipeline().calls(), 1);
    assert!(request.write_directory.is_dir());

    assert_eq!(result.affine.translation(), [1.5, -2.0, 0.25]);
    assert_eq!(result.affine_path, request.write_directory.join("affine.mat"));
    assert_eq!(result.deformation.shape(), &[8, 12, 16, 3]);
    assert_eq!(result.aligned.shape(), &[8, 12, 16]);
    assert_eq!(result.aligned_spacing, request.fixed_highres.spacing);

    let output = request.write_directory.join("aligned.nii.gz");
    let options = ExportOptions::default().with_spacing(result.aligned_spacing);
    export_volume(&result.aligned, &output, &options)
        .await
        .unwrap();

    let image = read_nifti(&output).await.unwrap();
    assert_eq!(image.array, ramp_volume(SHAPE));
    // pixdim holds single precision
    let written = image.spacing.unwrap().as_array();
    let expected = request.fixed_highres.spacing.as_array();
    for (w, e) in written.iter().zip(&expected) {
        assert!((w - e).abs() < 1e-6, "{:?} != {:?}", written, expected);
    }
}

#[tokio::test]
async fn test_block_partition_logged_at_debug() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let request = setup(dir.path()).await;
    let grid = easifish_register::BlockGrid::new(
        request.fixed_highres.volume.shape(),
        request.blocksize,
        request.overlap_factor,
    )
    .unwrap();
    assert_eq!(grid.nblocks(), [2, 3, 4]);
    assert_eq!(grid.blocks().len(), 24);

    let invoker = PipelineInvoker::new(MockPipeline::new([0.0; 3]));
    invoker.invoke(&request).await.unwrap();
    assert_eq!(invoker.pipeline().calls(), 1);
}

#[tokio::test]
async fn test_missing_affine_reported() {
    let dir = tempfile::tempdir().unwrap();
    let request = setup(dir.path()).await;

    let invoker = PipelineInvoker::new(MockPipeline::new([0.0; 3]).omitting(Omit::Affine));
    let err = invoker.invoke(&request).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingOutput {
            what: "affine transform",
            ..
        }
    ));
}

#[tokio::test]
async fn test_missing_deformation_reported() {
    let dir = tempfile::tempdir().unwrap();
    let request = setup(dir.path()).await;

    let invoker =
        PipelineInvoker::new(MockPipeline::new([0.0; 3]).omitting(Omit::Deformation));
    let err = invoker.invoke(&request).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingOutput {
            what: "deformation field",
            ..
        }
    ));
}

#[tokio::test]
async fn test_invalid_request_never_reaches_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = setup(dir.path()).await;
    request.blocksize = [0; 3];

    let invoker = PipelineInvoker::new(MockPipeline::new([0.0; 3]));
    let err = invoker.invoke(&request).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(invoker.pipeline().calls(), 0);
    assert!(!request.write_directory.exists());
}

// =============================================================================
// Request Document
// =============================================================================

#[tokio::test]
async fn test_request_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = setup(dir.path()).await;
    request
        .cluster_config
        .apply_override("ncpus=4")
        .unwrap();

    let json = serde_json::to_value(request.to_document().unwrap()).unwrap();
    assert_eq!(json["blocksize"], serde_json::json!([4, 4, 4]));
    assert_eq!(json["overlap_factor"], serde_json::json!(0.5));
    assert_eq!(json["cluster_config"]["ncpus"], serde_json::json!(4));
    assert_eq!(
        json["fixed_highres"]["spacing"],
        serde_json::json!([0.42, 0.23, 0.23])
    );
    assert_eq!(
        json["moving_lowres"]["spacing"],
        serde_json::json!([1.0, 0.5, 0.5])
    );
    assert_eq!(json["fixed_lowres"]["shape"], serde_json::json!([4, 6, 8]));
    assert_eq!(json["moving_highres"]["dataset"], "highres");

    let document: RequestDocument = serde_json::from_value(json).unwrap();
    assert_eq!(document.fixed_highres.spacing, request.fixed_highres.spacing);
}

// =============================================================================
// Command Pipeline
// =============================================================================

#[cfg(unix)]
mod command {
    use super::*;
    use easifish_register::format::n5::{write_dataset, DataType, WriteOptions};
    use easifish_register::pipeline::CommandPipeline;
    use easifish_register::volume::VolumeArray;

    const RESPONSE: &str = r#"{"affine": "affine.mat", "deformation": {"store": "transform.n5", "dataset": "vector_field"}, "aligned": {"store": "aligned.n5", "dataset": "data"}}"#;

    /// Outputs a real pipeline would leave behind, written ahead of the run.
    async fn precreate_outputs(out: &Path) {
        let field = VolumeArray::zeros(vec![8, 12, 16, 3], DataType::Float32);
        write_dataset(
            &out.join("transform.n5"),
            "vector_field",
            &field,
            &WriteOptions::cubic(4, 8),
        )
        .await
        .unwrap();
        write_dataset(
            &out.join("aligned.n5"),
            "data",
            &ramp_volume(SHAPE),
            &WriteOptions::cubic(3, 8),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_command_pipeline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let request = setup(dir.path()).await;
        precreate_outputs(&request.write_directory).await;

        let script = format!(
            "cat > request.json; \
             printf '1 0 0 3\\n0 1 0 0\\n0 0 1 0\\n0 0 0 1\\n' > affine.mat; \
             echo 'affine: done'; \
             echo '{}'",
            RESPONSE
        );
        let pipeline = CommandPipeline::new("sh").with_args(["-c".to_string(), script]);
        let result = PipelineInvoker::new(pipeline)
            .invoke(&request)
            .await
            .unwrap();

        assert_eq!(result.affine.translation(), [3.0, 0.0, 0.0]);
        assert_eq!(result.aligned.shape(), &[8, 12, 16]);
        // No resolution metadata on the aligned output
        assert_eq!(result.aligned_spacing, request.fixed_highres.spacing);

        let sent = std::fs::read(request.write_directory.join("request.json")).unwrap();
        let document: RequestDocument = serde_json::from_slice(&sent).unwrap();
        assert_eq!(document.blocksize, [4, 4, 4]);
        assert_eq!(
            document.write_directory,
            std::path::absolute(&request.write_directory).unwrap()
        );
        assert_eq!(document.moving_highres.shape, vec![8, 12, 16]);
        assert_eq!(document.fixed_lowres.dataset, "lowres");
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_from_pipeline_directory() {
        // A temp dir named relative to the test's working directory
        let dir = tempfile::tempdir_in(".").unwrap();
        assert!(dir.path().is_relative());
        let request = setup(dir.path()).await;
        assert!(request.write_directory.is_relative());
        precreate_outputs(&request.write_directory).await;

        let script = format!(
            "cat > request.json; pwd > cwd.txt; \
             printf '1 0 0 0\\n0 1 0 0\\n0 0 1 0\\n0 0 0 1\\n' > affine.mat; \
             echo '{}'",
            RESPONSE
        );
        let pipeline = CommandPipeline::new("sh").with_args(["-c".to_string(), script]);
        let result = PipelineInvoker::new(pipeline)
            .invoke(&request)
            .await
            .unwrap();
        assert_eq!(result.aligned.shape(), &[8, 12, 16]);

        let out = &request.write_directory;
        let cwd = std::fs::read_to_string(out.join("cwd.txt")).unwrap();
        let cwd = std::fs::canonicalize(cwd.trim()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(out).unwrap());

        // Every local path in the request must be usable from the pipeline's cwd
        let sent = std::fs::read(out.join("request.json")).unwrap();
        let document: RequestDocument = serde_json::from_slice(&sent).unwrap();
        assert!(document.write_directory.is_absolute());
        assert_eq!(std::fs::canonicalize(&document.write_directory).unwrap(), cwd);
        for descriptor in [
            &document.fixed_lowres,
            &document.fixed_highres,
            &document.moving_lowres,
            &document.moving_highres,
        ] {
            let store = Path::new(&descriptor.store);
            assert!(store.is_absolute(), "{} is relative", descriptor.store);
            assert!(cwd.join(store).join(&descriptor.dataset).is_dir());
        }
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let request = setup(dir.path()).await;

        let pipeline = CommandPipeline::new("sh")
            .with_args(["-c", "cat > /dev/null; echo 'out of memory' >&2; exit 3"]);
        let err = PipelineInvoker::new(pipeline)
            .invoke(&request)
            .await
            .unwrap_err();
        match err {
            PipelineError::Failed { stderr, .. } => assert_eq!(stderr, "out of memory"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let request = setup(dir.path()).await;

        let pipeline = CommandPipeline::new("/nonexistent/register-volumes");
        let err = PipelineInvoker::new(pipeline)
            .invoke(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }
}
