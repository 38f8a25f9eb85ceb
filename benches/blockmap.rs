use blockmap::allocator::blockmap::{BlockMap, NullDevice, SizeClass};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const DEVICE_BLOCK_END: u64 = 4 * 262_144 - 1;

mod allocate {
    use super::*;

    pub fn fourk(ctx: &mut Criterion) {
        let mut group = ctx.benchmark_group("blockmap::allocate::4k");
        group.throughput(Throughput::Elements(1));

        group.bench_function("allocate", |b| {
            let map = BlockMap::init_blockmap(0, DEVICE_BLOCK_END, 0);
            let device = NullDevice;

            b.iter(|| {
                black_box(map.allocate(SizeClass::FourK, false, &device).unwrap());
            });
        });
    }

    pub fn one_g_cascade(ctx: &mut Criterion) {
        let mut group = ctx.benchmark_group("blockmap::allocate::1g_cascade");
        group.throughput(Throughput::Elements(1));

        // The only non-empty bucket is 1G; every call must cascade
        // 4K -> 2M -> 1G before finding a descriptor to pop.
        group.bench_function("allocate", |b| {
            let map = BlockMap::init_blockmap(0, DEVICE_BLOCK_END, 0);
            let device = NullDevice;

            b.iter(|| {
                let block = map.allocate(SizeClass::FourK, false, &device).unwrap();
                map.free(block, SizeClass::FourK, None).unwrap();
                black_box(block);
            });
        });
    }
}

mod free {
    use super::*;

    pub fn middle_no_coalesce(ctx: &mut Criterion) {
        let mut group = ctx.benchmark_group("blockmap::free::isolated");
        group.throughput(Throughput::Elements(1));

        group.bench_function("allocate_then_free", |b| {
            let map = BlockMap::init_blockmap(0, DEVICE_BLOCK_END, 0);
            let device = NullDevice;

            b.iter(|| {
                let block = map.allocate(SizeClass::FourK, false, &device).unwrap();
                map.free(block, SizeClass::FourK, None).unwrap();
            });
        });
    }

    pub fn with_zero_fill(ctx: &mut Criterion) {
        let mut group = ctx.benchmark_group("blockmap::free::zero_fill");
        group.throughput(Throughput::Elements(1));

        group.bench_function("allocate_zeroed_then_free", |b| {
            let map = BlockMap::init_blockmap(0, DEVICE_BLOCK_END, 0);
            let device = NullDevice;

            b.iter(|| {
                let block = map.allocate(SizeClass::FourK, true, &device).unwrap();
                map.free(block, SizeClass::FourK, None).unwrap();
            });
        });
    }
}

criterion_group!(
    blockmap,
    allocate::fourk,
    allocate::one_g_cascade,
    free::middle_no_coalesce,
    free::with_zero_fill,
);

criterion_main!(blockmap);
