use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use packetbeam::framing;

const MAX_LEN: u32 = 16 * 1024 * 1024;

fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = framing::encode_length(body.len() as u32).to_vec();
    out.extend_from_slice(body);
    out
}

fn benchmark(c: &mut Criterion) {
    for body_len in [16usize, 256, 4096, 65536] {
        let stream = frame(&vec![b'x'; body_len]);

        c.bench_with_input(
            BenchmarkId::new("ingest_one_shot", body_len),
            black_box(&stream),
            |b, stream| {
                b.iter(|| {
                    let mut state = framing::FramingState::new(MAX_LEN);
                    let mut offset = 0;
                    while offset < stream.len() {
                        let chunk_len = state.read_buf_mut().len().min(stream.len() - offset);
                        state.read_buf_mut()[..chunk_len]
                            .copy_from_slice(&stream[offset..offset + chunk_len]);
                        let _ = state.ingest(chunk_len).unwrap();
                        offset += chunk_len;
                    }
                })
            },
        );
    }
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
