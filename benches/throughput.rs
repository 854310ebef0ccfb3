use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use revcaps::caps::{CapServer, Codec, Envelope, HandlerRegistry, KeyMaterial, SealMode};
use std::hint::black_box;

// Typical review-server payload: an applicant id plus a reader id.
const VALUE: &str = r#"{"a":"emb-2026-00417","r":"reader19"}"#;

fn codec(bits: usize, mode: SealMode) -> Codec {
    let key = KeyMaterial::generate(bits / 8).unwrap();
    Codec::new(&key, mode).unwrap()
}

fn seal_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal");
    let envelope = Envelope::new("setScore", VALUE);
    group.throughput(Throughput::Elements(1));

    for (name, bits, mode) in [
        ("aes128_randomized", 128, SealMode::Randomized),
        ("aes256_randomized", 256, SealMode::Randomized),
        ("aes128_deterministic", 128, SealMode::Deterministic),
    ] {
        let codec = codec(bits, mode);
        group.bench_function(name, |b| {
            b.iter(|| codec.seal(black_box(&envelope)).unwrap())
        });
    }

    group.finish();
}

fn open_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");
    let codec = codec(128, SealMode::Randomized);
    let token = codec.seal(&Envelope::new("setScore", VALUE)).unwrap();
    group.throughput(Throughput::Bytes(token.len() as u64));

    group.bench_function("valid", |b| {
        b.iter(|| codec.open(black_box(&token)).unwrap())
    });

    let mut forged = token.clone().into_bytes();
    let mid = forged.len() / 2;
    forged[mid] = if forged[mid] == b'A' { b'B' } else { b'A' };
    let forged = String::from_utf8(forged).unwrap();
    group.bench_function("forged", |b| {
        b.iter(|| codec.open(black_box(&forged)).unwrap_err())
    });

    group.finish();
}

async fn score(value: String, _request: Request) -> Response {
    (StatusCode::OK, value).into_response()
}

fn dispatch_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut registry = HandlerRegistry::builder();
    registry.register("setScore", score).unwrap();
    let server = CapServer::new("/caps/", codec(128, SealMode::Randomized), registry.build())
        .unwrap()
        .with_grant_logging(false);
    let url = server.grant("setScore", VALUE).unwrap();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));
    group.bench_function("in_process", |b| {
        b.to_async(&runtime).iter(|| async {
            let request = Request::builder()
                .method("POST")
                .uri(url.as_str())
                .body(Body::empty())
                .unwrap();
            server.dispatch(request).await
        })
    });
    group.finish();
}

criterion_group!(benches, seal_benchmark, open_benchmark, dispatch_benchmark);
criterion_main!(benches);
