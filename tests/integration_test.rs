use offload_rs::apps::{self, multi_queue};
use offload_rs::image::RgbaImage;
use offload_rs::kernel::ArgKind;
use offload_rs::kernels::{vector_operation, MULTI_QUEUE_SOURCE};
use offload_rs::platform::{select_device, HostProvider};
use offload_rs::prelude::*;
use std::sync::Arc;

fn config(elements: usize, lanes: usize, wg: usize) -> Config {
    Config::builder()
        .elements(elements)
        .lanes(lanes)
        .work_group_size(wg)
        .seed(1234)
        .compute_units(2)
        .build()
        .unwrap()
}

fn context_with(kernel: Arc<dyn HostKernel>) -> Context {
    let config = config(0, 1, 1);
    let selection = select_device(&HostProvider::new(2), 0).unwrap();
    let mut registry = KernelRegistry::new();
    registry.register(kernel);
    Context::with_registry(selection, &config, registry).unwrap()
}

/// Writes one wrong value at a fixed global index.
struct OffByOneAt(usize);

impl HostKernel for OffByOneAt {
    fn name(&self) -> &str {
        "vector_operation"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Buffer("int"), ArgKind::Buffer("int")]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let src = args.buffer::<i32>(0)?;
        let dst = args.buffer::<i32>(1)?;
        let i = item.global_id(0);
        let v = vector_operation(src.get(i));
        dst.set(i, if i == self.0 { v + 1 } else { v });
        Ok(())
    }
}

/// Fails every work-item of the lane starting at a given offset.
struct FailsFrom(usize);

impl HostKernel for FailsFrom {
    fn name(&self) -> &str {
        "vector_operation"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Buffer("int"), ArgKind::Buffer("int")]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        if item.global_offset(0) == self.0 {
            return Err(Error::execution("device lost"));
        }
        let src = args.buffer::<i32>(0)?;
        let dst = args.buffer::<i32>(1)?;
        let i = item.global_id(0);
        dst.set(i, vector_operation(src.get(i)));
        Ok(())
    }
}

/// `dst[i] = 3 * src[i] + 1`, never zero for non-negative input.
struct TripleAddOne;

impl HostKernel for TripleAddOne {
    fn name(&self) -> &str {
        "vector_operation"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Buffer("int"), ArgKind::Buffer("int")]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let src = args.buffer::<i32>(0)?;
        let dst = args.buffer::<i32>(1)?;
        let i = item.global_id(0);
        dst.set(i, src.get(i) * 3 + 1);
        Ok(())
    }
}

fn triple_add_one(elements: usize, lanes: usize, wg: usize) -> (Vec<i32>, PipelineOutcome<i32>) {
    let ctx = context_with(Arc::new(TripleAddOne));
    let cfg = config(elements, lanes, wg);
    let program = ctx.build_program(MULTI_QUEUE_SOURCE, "").unwrap();
    let kernel = program.kernel(multi_queue::KERNEL_NAME).unwrap();
    let mut pipeline = MultiQueuePipeline::new(&ctx, kernel, &cfg).unwrap();

    let input = apps::random_ints(elements, Some(99));
    let outcome = pipeline.run(&input).unwrap();
    let expected = input.iter().map(|&x| x * 3 + 1).collect();
    (expected, outcome)
}

#[test]
fn test_download_sees_compute_result() {
    let (expected, outcome) = triple_add_one(16, 4, 4);
    assert!(outcome.ledger.is_empty());
    assert!(outcome.output.iter().all(|&v| v != 0));
    assert_eq!(outcome.output, expected);
}

#[test]
fn test_lane_count_does_not_change_computed_output() {
    let (expected, one) = triple_add_one(1000, 1, 64);
    let (_, four) = triple_add_one(1000, 4, 64);
    assert_eq!(one.output, expected);
    assert_eq!(four.output, expected);
}

#[test]
fn test_remainder_lane_is_computed() {
    let (expected, outcome) = triple_add_one(10, 3, 2);
    assert_eq!(outcome.workload.chunks[2].range(), 6..10);
    assert_eq!(outcome.output, expected);
    assert_ne!(outcome.output[9], 0);
}

#[test]
fn test_sixteen_elements_four_lanes() {
    let cfg = config(16, 4, 4);
    let ctx = Context::host(&cfg).unwrap();
    let run = multi_queue::run(&ctx, &cfg).unwrap();

    let offsets: Vec<usize> = run.outcome.workload.chunks.iter().map(|c| c.offset).collect();
    assert_eq!(offsets, vec![0, 4, 8, 12]);
    assert!(run.passed());
    assert_eq!(run.outcome.output, run.reference);
}

#[test]
fn test_lane_count_does_not_change_output() {
    let input = apps::random_ints(1000, Some(5));

    let one = config(1000, 1, 64);
    let four = config(1000, 4, 64);
    let a = multi_queue::run_with_input(&Context::host(&one).unwrap(), &one, input.clone()).unwrap();
    let b = multi_queue::run_with_input(&Context::host(&four).unwrap(), &four, input).unwrap();

    assert!(a.passed() && b.passed());
    assert_eq!(a.outcome.output, b.outcome.output);
}

#[test]
fn test_seeded_runs_are_deterministic() {
    let cfg = config(777, 3, 32);
    let ctx = Context::host(&cfg).unwrap();
    let a = multi_queue::run(&ctx, &cfg).unwrap();
    let b = multi_queue::run(&ctx, &cfg).unwrap();
    assert_eq!(a.input, b.input);
    assert_eq!(a.outcome.output, b.outcome.output);
}

#[test]
fn test_remainder_goes_to_last_lane() {
    let cfg = config(10, 3, 2);
    let ctx = Context::host(&cfg).unwrap();
    let run = multi_queue::run(&ctx, &cfg).unwrap();
    let lens: Vec<usize> = run.outcome.workload.chunks.iter().map(|c| c.len).collect();
    assert_eq!(lens, vec![3, 3, 4]);
    assert!(run.passed());
}

#[test]
fn test_reject_remainder() {
    let cfg = Config::builder()
        .elements(10)
        .lanes(3)
        .remainder(RemainderPolicy::Reject)
        .compute_units(1)
        .build()
        .unwrap();
    let ctx = Context::host(&cfg).unwrap();
    assert!(matches!(multi_queue::run(&ctx, &cfg), Err(Error::Partition(_))));
}

#[test]
fn test_mismatch_reported_at_injected_index() {
    let ctx = context_with(Arc::new(OffByOneAt(37)));
    let cfg = config(100, 4, 8);
    let run = multi_queue::run(&ctx, &cfg).unwrap();

    match run.verification {
        Verification::Mismatch { index, expected, actual } => {
            assert_eq!(index, 37);
            assert_eq!(expected, run.reference[37]);
            assert_eq!(actual, run.reference[37] + 1);
        }
        ref other => panic!("expected a mismatch, got {:?}", other),
    }
    assert!(run.to_string().contains("mismatch at location 37"));
    assert!(run.outcome.ledger.is_empty());
}

#[test]
fn test_failed_compute_skips_download() {
    let ctx = context_with(Arc::new(FailsFrom(50)));
    let cfg = config(100, 4, 5);
    let run = multi_queue::run(&ctx, &cfg).unwrap();
    let ledger = &run.outcome.ledger;

    // lane 2 covers [50, 75)
    assert!(matches!(ledger.get(2, Stage::Compute), Some(Error::Execution(_))));
    assert!(matches!(ledger.get(2, Stage::Download), Some(Error::DependencyFailed(_))));
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.for_lane(0).count(), 0);

    // the other lanes still delivered
    assert_eq!(run.outcome.output[..50], run.reference[..50]);
    assert_eq!(run.outcome.output[75..], run.reference[75..]);
    assert!(!run.passed());

    let text = run.to_string();
    assert!(text.contains("[FAIL] Test FAILED! 2 device fault(s)"));
    assert!(!text.contains("Test PASS"));
    assert!(!text.contains("speedup"));
    assert!(!run.report(&ctx, &cfg).passed);
}

#[test]
fn test_empty_workload() {
    let cfg = config(0, 4, 16);
    let ctx = Context::host(&cfg).unwrap();
    let run = multi_queue::run(&ctx, &cfg).unwrap();
    assert!(run.passed());
    assert!(run.outcome.output.is_empty());
    assert_eq!(ctx.metrics().bytes_uploaded, 0);
}

#[test]
fn test_platform_out_of_range() {
    let cfg = Config::builder().platform_index(3).build().unwrap();
    match Context::host(&cfg) {
        Err(Error::PlatformNotFound { index, available }) => {
            assert_eq!(index, 3);
            assert_eq!(available, 1);
        }
        other => panic!("expected PlatformNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_build_failure_carries_log() {
    let cfg = config(10, 1, 1);
    let ctx = Context::host(&cfg).unwrap();
    let broken = MULTI_QUEUE_SOURCE.replacen('}', "", 1);

    let err = ctx.build_program(&broken, "").unwrap_err();
    let logs = err.build_logs().expect("build error");
    assert!(!logs.is_empty());
    assert!(logs.iter().all(|l| !l.log.trim().is_empty()));
}

#[test]
fn test_kernel_path_with_unknown_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other.cl");
    std::fs::write(&path, "__kernel void other(__global int* a) { a[0] = 1; }\n").unwrap();

    let cfg = Config::builder()
        .elements(8)
        .kernel_path(&path)
        .compute_units(1)
        .build()
        .unwrap();
    let ctx = Context::host(&cfg).unwrap();
    assert!(multi_queue::run(&ctx, &cfg).is_err());
}

#[test]
fn test_report_serializes() {
    let cfg = config(64, 2, 8);
    let ctx = Context::host(&cfg).unwrap();
    let run = multi_queue::run(&ctx, &cfg).unwrap();
    let json = serde_json::to_value(run.report(&ctx, &cfg)).unwrap();
    assert_eq!(json["program"], "multi_queue");
    assert_eq!(json["elements"], 64);
    assert_eq!(json["passed"], true);
}

#[test]
fn test_image_apps_on_decoded_png() {
    let cfg = config(0, 1, 1);
    let ctx = Context::host(&cfg).unwrap();

    let source = RgbaImage::from_fn(24, 16, |x, y| [(x * 10) as i32, (y * 15) as i32, ((x + y) * 5) as i32]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.png");
    source.save(&path).unwrap();
    let image = RgbaImage::open(&path).unwrap();
    assert_eq!(image, source);

    let (bins, hist) = apps::histogram::run(&ctx, "", &image).unwrap();
    assert!(hist.passed());
    assert_eq!(bins.iter().sum::<i32>() as usize, image.pixels());

    let (_, blur) = apps::blur::run(&ctx, "", &image).unwrap();
    assert!(blur.passed());

    let (rotated, rotate) = apps::rotate::run(&ctx, "", &image, -std::f32::consts::FRAC_PI_4).unwrap();
    assert!(rotate.passed());
    assert_eq!((rotated.width(), rotated.height()), (24, 16));
}

#[test]
fn test_vector_add_and_transpose() {
    let cfg = config(0, 1, 1);
    let ctx = Context::host(&cfg).unwrap();

    assert!(apps::vector_add::run(&ctx, "", 4096).unwrap().passed());
    let checks = apps::transpose::run(&ctx, "", 48, 16, Some(9)).unwrap();
    assert_eq!(checks.len(), 2);
    assert!(checks.iter().all(|c| c.passed()));
}
