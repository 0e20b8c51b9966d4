//! Cipher path benchmarks.
//!
//! Measures raw AES-256-CFB throughput at the sizes the relay and the
//! multiplexer actually produce, and the cost of pushing data through a
//! [`SecureStream`] pair.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;

use muxtun::crypto::{cipher_pair, IvSource, OsIvSource, TunnelKey};
use muxtun::transport::SecureStream;

const SIZES: [usize; 3] = [1200, 16 * 1024, 256 * 1024];

fn bench_key_derivation(c: &mut Criterion) {
    c.bench_function("key_from_passphrase", |b| {
        b.iter(|| black_box(TunnelKey::from_passphrase(black_box("it's a secrect"))))
    });
}

fn bench_iv_generation(c: &mut Criterion) {
    let source = OsIvSource::default();
    c.bench_function("os_iv", |b| b.iter(|| black_box(source.next_iv())));
}

fn bench_cfb_encrypt(c: &mut Criterion) {
    let key = TunnelKey::from_bytes([0x42u8; 32]);
    let iv = [7u8; 16];

    let mut group = c.benchmark_group("cfb_encrypt");
    for size in SIZES {
        let mut data = vec![0u8; size];
        let (mut encryptor, _) = cipher_pair(&key, &iv).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                encryptor.apply(&mut data);
                black_box(&data);
            })
        });
    }
    group.finish();
}

fn bench_cfb_decrypt(c: &mut Criterion) {
    let key = TunnelKey::from_bytes([0x42u8; 32]);
    let iv = [7u8; 16];

    let mut group = c.benchmark_group("cfb_decrypt");
    for size in SIZES {
        let mut data = vec![0u8; size];
        let (_, mut decryptor) = cipher_pair(&key, &iv).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                decryptor.apply(&mut data);
                black_box(&data);
            })
        });
    }
    group.finish();
}

fn bench_secure_stream(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let key = TunnelKey::from_bytes([0x42u8; 32]);
    let iv = [7u8; 16];

    let mut group = c.benchmark_group("secure_stream_roundtrip");
    for size in SIZES {
        let payload = vec![0xabu8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let (left, right) = duplex(64 * 1024);
                    let mut writer = SecureStream::new(&key, left, &iv).unwrap();
                    let mut reader = SecureStream::new(&key, right, &iv).unwrap();
                    let mut out = vec![0u8; size];

                    let write = async {
                        writer.write_all(&payload).await.unwrap();
                        writer.flush().await.unwrap();
                    };
                    let read = reader.read_exact(&mut out);
                    let (_, read) = tokio::join!(write, read);
                    read.unwrap();
                    black_box(out)
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_iv_generation,
    bench_cfb_encrypt,
    bench_cfb_decrypt,
    bench_secure_stream,
);

criterion_main!(benches);
