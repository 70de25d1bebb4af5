//! # Telemetry Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bot_lib::{
    arm_ctrl::{forward_planar, solve_planar, Params},
    bot_client::receiver::{process_frame, DecodeStats},
    data_store::TelemetryStore,
    loc::OdometryIntegrator,
};
use comms_if::net::FrameReader;
use nalgebra::Point2;

fn telemetry_benchmark(c: &mut Criterion) {
    // ---- Build a stream of frames ----

    let lidar: Vec<String> = (0..682).map(|i| format!("{:.3}", 0.5 + i as f64 * 0.005)).collect();
    let mut stream = Vec::new();
    for i in 0..50 {
        stream.extend_from_slice(format!(".wheels#{};{};{};{}\r\n", i, i, i, i).as_bytes());
        stream.extend_from_slice(b".manip0#168;66;-150;105;166\r\n");
        if i % 5 == 0 {
            stream.extend_from_slice(format!(".laser#{}\r\n", lidar.join(";")).as_bytes());
        }
    }

    // ---- Benchmark decoding ----

    c.bench_function("Reassemble and apply telemetry", |b| {
        b.iter(|| {
            let store = TelemetryStore::new();
            let integrator = OdometryIntegrator::new();
            let mut reader = FrameReader::new();
            let mut stats = DecodeStats::default();

            // Split the stream into reads the size a socket would return
            for chunk in stream.chunks(1460) {
                for frame in reader.push(chunk) {
                    process_frame(&frame, &store, &integrator, &mut stats);
                }
            }

            black_box(store.pose())
        })
    });

    // ---- Benchmark inverse kinematics ----

    let params = Params::default();
    let (target, wrist) = forward_planar(&params, &[20.0, -70.0, -30.0]);

    c.bench_function("Planar inverse kinematics", |b| {
        b.iter(|| solve_planar(&params, black_box(&Point2::new(target.x, target.y)), wrist))
    });
}

criterion_group!(benches, telemetry_benchmark);
criterion_main!(benches);
