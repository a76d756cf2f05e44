#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use ko_chatbot::styling::Styler;
use ko_chatbot::vocab::{special_tokens, Vocab};
use std::time::{Duration, Instant};
use tch::Tensor;

fn styling_batches(iters: u64, styler: &Styler, enc_input: &Tensor, dec_input: &Tensor, sentiment: &Tensor) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        let _ = styler.styling(enc_input, dec_input, sentiment);
        duration = duration.checked_add(start.elapsed()).unwrap();
    }
    duration
}

fn bench_styling(c: &mut Criterion) {
    //    Set-up vocabularies and a raw batch of 128 rows
    let words = ["오늘", "날씨", "정말", "좋네요", "같이", "산책", "갈까", "."];
    let mut tokens = special_tokens();
    tokens.extend(words.iter().map(|word| word.to_string()));
    let vocab = Vocab::from_tokens(tokens).unwrap();
    let max_len = 64;
    let styler = Styler::new(&vocab, &vocab, max_len).unwrap();

    let sos = vocab.sos_index().unwrap();
    let eos = vocab.eos_index().unwrap();
    let pad = vocab.pad_index();
    let batch_size = 128;
    let mut enc_rows = Vec::with_capacity(batch_size * max_len);
    let mut dec_rows = Vec::with_capacity(batch_size * max_len);
    for row in 0..batch_size {
        let length = 4 + row % 24;
        let ids: Vec<i64> = (0..length)
            .map(|position| vocab.token_to_id(words[(row + position) % words.len()]))
            .collect();
        let mut enc = ids.clone();
        enc.resize(max_len, pad);
        let mut dec = vec![sos];
        dec.extend(ids);
        dec.push(eos);
        dec.resize(max_len, pad);
        enc_rows.extend(enc);
        dec_rows.extend(dec);
    }
    let shape = [batch_size as i64, max_len as i64];
    let enc_input = Tensor::from_slice(&enc_rows).view(shape);
    let dec_input = Tensor::from_slice(&dec_rows).view(shape);
    let sentiment = Tensor::from_slice(&(0..batch_size as i64).map(|row| row % 2).collect::<Vec<i64>>());

    c.bench_function("Styling 128x64", |b| {
        b.iter_custom(|iters| {
            black_box(styling_batches(iters, &styler, &enc_input, &dec_input, &sentiment))
        })
    });
}

criterion_group! {
name = benches;
config = Criterion::default().sample_size(50);
targets = bench_styling
}

criterion_main!(benches);
