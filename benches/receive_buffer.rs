use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use serial_line::ReceiveBuffer;
use std::time::Duration;

fn modem_traffic(lines: usize) -> Vec<u8> {
    (0..lines)
        .flat_map(|i| format!("+CSQ: {},{}\r\n", i % 32, i % 100).into_bytes())
        .collect()
}

pub fn bench_read_line(c: &mut Criterion) {
    let traffic = modem_traffic(1000);
    c.bench_function("append_then_drain_1000_lines", |b| {
        b.iter(|| {
            let buffer = ReceiveBuffer::new();
            buffer.append(&traffic);
            while let Ok(line) = buffer.read_line() {
                black_box(line);
            }
        })
    });
}

pub fn bench_incomplete_scan(c: &mut Criterion) {
    // A long partial line: every read_line scans it and gives up.
    let buffer = ReceiveBuffer::new();
    buffer.append(&[b'x'; 64 * 1024]);
    c.bench_function("read_line_incomplete_64k", |b| {
        b.iter(|| black_box(buffer.read_line().is_err()))
    });
}

pub fn bench_read_byte(c: &mut Criterion) {
    let traffic = modem_traffic(100);
    c.bench_function("read_byte_drain", |b| {
        b.iter(|| {
            let buffer = ReceiveBuffer::new();
            buffer.append(&traffic);
            while let Ok(byte) = buffer.read_byte() {
                black_box(byte);
            }
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_read_line, bench_incomplete_scan, bench_read_byte
}
criterion_main!(benches);
