#[path = "../tests/common/mod.rs"]
mod common;

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use quire_core::optimize::optimize;
use quire_core::writer::write_to_vec;
use quire_core::{Command, Configuration, Context, EncryptAlgorithm, Params, process};

const PAGE_COUNTS: [usize; 3] = [10, 100, 1000];

fn fixture(pages: usize) -> Vec<u8> {
    let widths: Vec<u32> = (0..pages).map(|i| 200 + (i % 400) as u32).collect();
    common::pages_document(&widths)
}

fn bench_parse_and_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_write");
    for pages in PAGE_COUNTS {
        let data = fixture(pages);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("classical", pages), &data, |b, data| {
            b.iter(|| {
                let mut ctx = Context::from_bytes(data.clone(), Configuration::default()).expect("parse PDF");
                optimize(&mut ctx).expect("optimize");
                black_box(write_to_vec(&mut ctx).expect("write PDF"));
            })
        });
        let config = Configuration {
            write_object_streams: true,
            write_xref_stream: true,
            ..Configuration::default()
        };
        group.bench_with_input(BenchmarkId::new("object_streams", pages), &data, |b, data| {
            b.iter(|| {
                let mut ctx = Context::from_bytes(data.clone(), config.clone()).expect("parse PDF");
                black_box(write_to_vec(&mut ctx).expect("write PDF"));
            })
        });
    }
    group.finish();
}

fn bench_commands(c: &mut Criterion) {
    let data = fixture(100);
    let mut group = c.benchmark_group("commands");
    group.throughput(Throughput::Bytes(data.len() as u64));

    let params = Params {
        selection: Some("odd,!1-10".into()),
        ..Params::default()
    };
    group.bench_function("trim", |b| {
        let config = Configuration::for_command(Command::Trim);
        b.iter(|| black_box(process([data.clone()], &params, &config).expect("trim")))
    });

    let params = Params {
        span: 10,
        ..Params::default()
    };
    group.bench_function("split", |b| {
        let config = Configuration::for_command(Command::Split);
        b.iter(|| black_box(process([data.clone()], &params, &config).expect("split")))
    });

    for alg in [EncryptAlgorithm::Rc4_128, EncryptAlgorithm::Aes256] {
        let mut config = Configuration::for_command(Command::Encrypt).with_passwords(b"user", b"owner");
        config.encrypt_using = alg;
        group.bench_function(BenchmarkId::new("encrypt", format!("{alg:?}")), |b| {
            b.iter(|| black_box(process([data.clone()], &Params::default(), &config).expect("encrypt")))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse_and_write, bench_commands);
criterion_main!(benches);
