//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for the worker pool

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kioken_pool::{PoolConfig, WorkerPool};
use std::hint::black_box;
use std::time::Duration;

// Benchmark hand-off latency for trivial tasks
fn bench_submit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("submit");
    for capacity in [1usize, 4, 16] {
        let pool = runtime.block_on(async { WorkerPool::new(PoolConfig::new(capacity)).unwrap() });

        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.to_async(&runtime).iter(|| async {
                pool.submit(async { black_box(()) }, Duration::ZERO)
                    .await
                    .unwrap();
            });
        });

        runtime.block_on(pool.shutdown());
    }
    group.finish();
}

// Benchmark resize churn
fn bench_resize(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let pool = runtime.block_on(async { WorkerPool::new(PoolConfig::new(4)).unwrap() });

    c.bench_function("resize_grow_shrink", |b| {
        b.iter(|| {
            let _guard = runtime.enter();
            pool.set_capacity(black_box(32)).unwrap();
            pool.set_capacity(black_box(4)).unwrap();
        });
    });

    runtime.block_on(pool.shutdown());
}

criterion_group!(benches, bench_submit, bench_resize);
criterion_main!(benches);
