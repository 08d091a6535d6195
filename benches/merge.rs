use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pixsearch::{ImageResult, SearchSession};
use std::hint::black_box;

/// Pages of `per_page` results where half of each page repeats the previous one.
fn overlapping_pages(pages: usize, per_page: usize) -> Vec<Vec<ImageResult>> {
    (0..pages)
        .map(|p| {
            let start = p * per_page / 2;
            (start..start + per_page)
                .map(|i| ImageResult::new(format!("https://images.example/{i}.jpg")))
                .collect()
        })
        .collect()
}

fn load_all(pages: &[Vec<ImageResult>]) -> usize {
    let mut session = SearchSession::default();
    let Ok(mut request) = session.start_search("benchmark") else {
        return 0;
    };
    for page in pages {
        let _ = session.complete_fetch(&request, Ok(page.clone()));
        match session.begin_fetch() {
            Some(next) => request = next,
            None => break,
        }
    }
    session.len()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_merge");
    for pages in [10, 50, 200] {
        let data = overlapping_pages(pages, 40);
        group.bench_with_input(BenchmarkId::from_parameter(pages), &data, |b, data| {
            b.iter(|| load_all(black_box(data)));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
