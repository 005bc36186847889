//! Put/get/delete throughput benchmarks.

use bitsack::{Bitsack, Options};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{distributions::Alphanumeric, Rng};

fn key(i: usize) -> Vec<u8> {
    format!("bitsack-key-{i:09}").into_bytes()
}

fn value(len: usize) -> Vec<u8> {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).collect()
}

fn bench_engine(c: &mut Criterion) {
    let dir = tempfile::TempDir::with_prefix("bitsack-bench").expect("tempdir");
    let db = Bitsack::open(Options { dir_path: dir.path().to_path_buf(), ..Options::default() })
        .expect("open");

    for i in 0..10_000 {
        db.put(&key(i), &value(1024)).expect("seed put");
    }

    let mut rng = rand::thread_rng();
    c.bench_function("put", |b| {
        let payload = value(1024);
        let mut i = 10_000;
        b.iter(|| {
            db.put(&key(i), &payload).expect("put");
            i += 1;
        });
    });

    c.bench_function("get", |b| {
        b.iter(|| {
            let _ = db.get(&key(rng.gen_range(0..10_000))).expect("get");
        });
    });

    c.bench_function("delete", |b| {
        b.iter(|| {
            db.delete(&key(rng.gen_range(0..10_000))).expect("delete");
        });
    });
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
