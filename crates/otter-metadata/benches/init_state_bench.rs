//! Init-state read benchmarks
//!
//! The fault-based check costs a single load on the fast path; the explicit
//! branch and the data-ref decode should stay in the same ballpark.
//!
//! Run with: `cargo bench -p otter-metadata init_state`

use criterion::{Criterion, criterion_group, criterion_main};
use otter_metadata::offset::address_of;
use otter_metadata::{
    ClassInit, ClassInitState, ClassMetadata, ClassMetadataRO, DataRefFormat, InitCheck,
};
use std::hint::black_box;

fn initialized_class(ro: &ClassMetadataRO) -> Box<ClassMetadata> {
    let mut meta = Box::new(ClassMetadata::new(0, 16));
    meta.set_class_info_ro(address_of(ro), DataRefFormat::Offset);
    meta.set_init_state(ClassInitState::Initializing);
    meta.set_init_state(ClassInitState::Initialized);
    meta
}

fn init_state_benchmark(c: &mut Criterion) {
    let ro = Box::new(ClassMetadataRO::new(0));
    let ready = initialized_class(&ro);
    let pending = Box::new(ClassMetadata::new(0, 16));

    let mut group = c.benchmark_group("init_state");
    group.bench_function("is_initialized/ready", |b| {
        b.iter(|| black_box(&*ready).is_initialized())
    });
    group.bench_function("is_initialized/pending", |b| {
        b.iter(|| black_box(&*pending).is_initialized())
    });
    group.bench_function("check_initialized/ready", |b| {
        b.iter(|| black_box(&*ready).check_initialized())
    });
    group.bench_function("class_info_ro/offset", |b| {
        b.iter(|| black_box(&*ready).class_info_ro())
    });
    group.finish();
}

criterion_group!(benches, init_state_benchmark);
criterion_main!(benches);
