use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rnn_oie_core::{pad_sequences, CorpusVocab, Dataset, LabelPolicy, LoaderConfig, Sample, Table};

fn synthetic_table(sentences: usize, tokens: usize) -> String {
    let labels = ["A0-B", "A0-I", "P-B", "A1-B", "A1-I", "O"];
    let mut out = String::from("run_id\tword\tpred\tlabel\n");
    for s in 0..sentences {
        for t in 0..tokens {
            out.push_str(&format!(
                "{}\tw{}\tp{}\t{}\n",
                s,
                (s * 31 + t) % 500,
                s % 50,
                labels[t % labels.len()]
            ));
        }
    }
    out
}

fn bench_pad_sequences(c: &mut Criterion) {
    let sequences: Vec<Vec<Sample>> = (0..1000)
        .map(|n| (0..(n % 40) as u32).map(Sample::new).collect())
        .collect();

    c.bench_function("pad_sequences_1000x40", |b| {
        b.iter(|| pad_sequences(black_box(&sequences), Some(20), Sample::pad).unwrap());
    });
}

fn bench_encode_dataset(c: &mut Criterion) {
    let text = synthetic_table(500, 25);
    let table = Table::parse(Cursor::new(text), '\t').unwrap();
    let embedding = CorpusVocab::from_table(&table, &["word", "pred"], 50).unwrap();
    let config = LoaderConfig::default().with_sent_maxlen(Some(20));

    c.bench_function("encode_dataset_500_sentences", |b| {
        b.iter(|| {
            Dataset::from_table(black_box(&table), &config, &embedding, LabelPolicy::Fit).unwrap()
        });
    });
}

criterion_group!(benches, bench_pad_sequences, bench_encode_dataset);
criterion_main!(benches);
