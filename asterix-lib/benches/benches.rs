use std::path::PathBuf;
use std::sync::Arc;

use asterix::record::decode_blocks;
use asterix::{FormatDescriptor, FormatId, Pipeline, PipelineOptions, ReadChannel, WriteChannel};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    path.push("tests/fixtures");
    path.push(name);
    path
}

/// Category 062 block with a single track record.
fn cat062_block() -> Vec<u8> {
    let mut dat = vec![0x3e, 0x00, 0x00, 0x99, 0x09, 0x80, 0x19, 0x0a, 0x00, 0x40, 0x00];
    dat.extend_from_slice(&8_388_608i32.to_be_bytes());
    dat.extend_from_slice(&2_796_203i32.to_be_bytes());
    dat.extend_from_slice(&[0x00, 0x2a, 0x40]);
    dat.extend_from_slice(b"KLM123 ");
    dat[2] = u8::try_from(dat.len()).unwrap();
    dat
}

fn bench_decode(c: &mut Criterion) {
    let ctx = FormatDescriptor::load(fixture_path("asterix.ini")).unwrap();
    let block = cat062_block();
    let dat: Vec<u8> = block.iter().copied().cycle().take(block.len() * 100).collect();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.bench_function("blocks", |b| {
        b.iter(|| decode_blocks(ctx.definition(), &dat).unwrap());
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let ctx = Arc::new(FormatDescriptor::load(fixture_path("asterix.ini")).unwrap());
    let block = cat062_block();
    let dat: Vec<u8> = block.iter().copied().cycle().take(block.len() * 100).collect();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.bench_function("raw_to_text", |b| {
        b.iter(|| {
            let mut input = ReadChannel::new(&dat[..]);
            let mut output = WriteChannel::new(std::io::sink());
            Pipeline::new(
                Arc::clone(&ctx),
                FormatId::Raw,
                Some(FormatId::Text),
                PipelineOptions::default(),
            )
            .run(&mut input, &mut output)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_pipeline);
criterion_main!(benches);
