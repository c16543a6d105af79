use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use video_bgremove::{
    backends::MockSegmentationModel, CompositionColor, Compositor, Frame, FrameNormalizer,
    FrameProcessingPipeline, MaskResolver, OutputFormat, OutputFormatHandler, PipelineConfig,
    ProbabilityMap, ProcessingMode,
};

fn gradient_frame(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let r = (x as f32 / width as f32 * 255.0) as u8;
        let g = (y as f32 / height as f32 * 255.0) as u8;
        let b = ((x + y) as f32 / (width + height) as f32 * 255.0) as u8;
        Rgb([r, g, b])
    });
    Frame::new(image).unwrap()
}

fn bench_frame_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_frame_sizes");
    group.measurement_time(Duration::from_secs(8));
    group.sample_size(20);

    let pipeline = FrameProcessingPipeline::new(Arc::new(MockSegmentationModel::centered_disc(256)));
    let config = PipelineConfig::new(ProcessingMode::FileSolidBackground, CompositionColor::WHITE);

    for (name, width, height) in [("360p", 640, 360), ("720p", 1280, 720), ("1080p", 1920, 1080)] {
        let frame = gradient_frame(width, height);
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, frame| {
            b.iter(|| black_box(pipeline.process(black_box(frame), &config).unwrap()));
        });
    }

    group.finish();
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_stages");
    group.sample_size(30);

    let frame = gradient_frame(1280, 720);
    let normalizer = FrameNormalizer::new(512);
    group.bench_function("normalize_512", |b| {
        b.iter(|| black_box(normalizer.normalize(black_box(&frame)).unwrap()));
    });

    let map = ProbabilityMap::filled(512, 512, 0.75);
    group.bench_function("binarize_to_720p", |b| {
        b.iter(|| black_box(MaskResolver::binarize(black_box(&map), 1280, 720).unwrap()));
    });

    let mask = MaskResolver::binarize(&map, 1280, 720).unwrap();
    let compositor = Compositor::new();
    for mode in [ProcessingMode::FileSolidBackground, ProcessingMode::FileTransparent] {
        group.bench_function(format!("composite_{}", mode), |b| {
            b.iter(|| {
                black_box(
                    compositor
                        .composite(&frame, &mask, mode, CompositionColor::WHITE)
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_preview_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("preview_encoding");
    group.sample_size(20);

    let pipeline = FrameProcessingPipeline::new(Arc::new(MockSegmentationModel::centered_disc(256)));
    let output = pipeline
        .process(&gradient_frame(640, 480), &PipelineConfig::realtime_preview())
        .unwrap();

    for (name, format) in [("png", OutputFormat::Png), ("jpeg", OutputFormat::Jpeg)] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(OutputFormatHandler::encode(black_box(&output), format, 80).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_sizes, bench_stages, bench_preview_encoding);
criterion_main!(benches);
