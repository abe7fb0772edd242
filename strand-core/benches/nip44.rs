// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strand_core::crypto::random_bytes;
use strand_core::nip44::{decrypt, encrypt, ConversationKey};

fn bench_conversation_key(c: &mut Criterion) {
    let mut secret = [0u8; 32];
    secret[31] = 7;
    // x-coordinate of the generator point
    let peer: [u8; 32] = [
        0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87,
        0x0b, 0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b,
        0x16, 0xf8, 0x17, 0x98,
    ];

    c.bench_function("conversation_key_derive", |b| {
        b.iter(|| ConversationKey::derive(black_box(&secret), black_box(&peer)))
    });
}

fn bench_nip44(c: &mut Criterion) {
    let mut group = c.benchmark_group("nip44_v2");
    let key = ConversationKey::from_bytes(random_bytes());

    for size in [16, 256, 1024, 4096, 16384, 65536] {
        let plaintext: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let payload = encrypt(&plaintext, &key).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, p| {
            b.iter(|| encrypt(black_box(p), black_box(&key)))
        });

        group.bench_with_input(BenchmarkId::new("decrypt", size), &payload, |b, p| {
            b.iter(|| decrypt(black_box(p), black_box(&key)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_conversation_key, bench_nip44);
criterion_main!(benches);
