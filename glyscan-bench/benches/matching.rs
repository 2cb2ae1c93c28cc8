//! glyscan Benchmark Suite
//!
//! Rough targets for the synchronous hot paths:
//!   parse_structured_8_foods ........ < 50μs
//!   parse_text_8_lines .............. < 50μs
//!   rank_200_candidates ............. < 200μs
//!   search_cache_churn_1000_puts .... < 5ms

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chrono::{Duration, TimeZone, Utc};
use glyscan_core::cache::TtlCache;
use glyscan_core::config::ParserConfig;
use glyscan_core::resolver::ranking;
use glyscan_core::{gl, parser, Detection, FoodCategory, NutritionRecord};

const DISHES: [(&str, &str); 8] = [
    ("김치찌개", "Kimchi stew"),
    ("쌀밥", "Steamed rice"),
    ("불고기", "Bulgogi"),
    ("잡채", "Japchae"),
    ("계란말이", "Rolled omelette"),
    ("된장찌개", "Soybean paste stew"),
    ("김치", "Kimchi"),
    ("사과", "Apple"),
];

fn structured_reply() -> String {
    let foods: Vec<String> = DISHES
        .iter()
        .map(|(ko, en)| format!(r#"{{"nameKo":"{ko}","nameEn":"{en}","confidence":0.9}}"#))
        .collect();
    format!(r#"{{"foods":[{}]}}"#, foods.join(","))
}

fn text_reply() -> String {
    DISHES
        .iter()
        .map(|(ko, en)| format!("- {ko} ({en})"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn make_record(i: u32) -> NutritionRecord {
    let (ko, en) = DISHES[i as usize % DISHES.len()];
    NutritionRecord::new(
        format!("r{i}"),
        format!("{ko}{}", i / 8),
        format!("{en} {}", i / 8),
        f64::from(i % 100),
        f64::from(i % 60),
        100.0 + f64::from(i % 5) * 50.0,
        FoodCategory::Korean,
    )
}

/// Benchmark: structured reply parse.
fn bench_parse_structured(c: &mut Criterion) {
    let reply = structured_reply();
    let config = ParserConfig::default();
    c.bench_function("parse_structured_8_foods", |b| {
        b.iter(|| black_box(parser::parse(black_box(&reply), &config)));
    });
}

/// Benchmark: text fallback parse.
fn bench_parse_text(c: &mut Criterion) {
    let reply = text_reply();
    let config = ParserConfig::default();
    c.bench_function("parse_text_8_lines", |b| {
        b.iter(|| black_box(parser::parse(black_box(&reply), &config)));
    });
}

/// Benchmark: dedup and rank a large candidate list.
fn bench_rank(c: &mut Criterion) {
    let records: Vec<NutritionRecord> = (0..200).map(make_record).collect();
    let detection = Detection::new("김치", Some("김치".into()), Some("Kimchi".into()), 0.9);
    c.bench_function("rank_200_candidates", |b| {
        b.iter(|| {
            let ranked = ranking::rank(ranking::dedup_by_id(records.clone()), black_box(&detection));
            black_box(gl::total_gl(ranked.iter().take(3)));
        });
    });
}

/// Benchmark: search cache at capacity, every put evicting.
fn bench_cache_churn(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);
    let results: Vec<NutritionRecord> = (0..3).map(make_record).collect();
    c.bench_function("search_cache_churn_1000_puts", |b| {
        b.iter(|| {
            let mut cache: TtlCache<Vec<NutritionRecord>> = TtlCache::new(Duration::hours(24), Some(100));
            for i in 0..1000i64 {
                let now = start + Duration::seconds(i);
                cache.put(format!("query-{i}"), results.clone(), now);
            }
            black_box(cache.len());
        });
    });
}

criterion_group!(
    benches,
    bench_parse_structured,
    bench_parse_text,
    bench_rank,
    bench_cache_churn,
);
criterion_main!(benches);
