use criterion::{black_box, criterion_group, criterion_main, Criterion};

use overture_semver::VersionParser;

fn bench_normalize(c: &mut Criterion) {
    let parser = VersionParser::new();
    let versions = [
        "1.0.0",
        "v2.3.4",
        "1.0.0-beta2",
        "4.12.0RC1",
        "dev-main",
        "1.0.x-dev",
    ];

    c.bench_function("normalize", |b| {
        b.iter(|| {
            for v in &versions {
                let _ = parser.normalize(black_box(v));
            }
        })
    });
}

fn bench_parse_constraints(c: &mut Criterion) {
    let parser = VersionParser::new();
    let constraints = [
        "^7.4 || ^8.0",
        ">=1.2.3,<2.0.0",
        "~4.12",
        "1.0 - 2.0",
        "1.2.*",
        "dev-main",
    ];

    c.bench_function("parse_constraints", |b| {
        b.iter(|| {
            for s in &constraints {
                let _ = parser.parse_constraints(black_box(s));
            }
        })
    });
}

fn bench_constraint_matching(c: &mut Criterion) {
    let parser = VersionParser::new();
    let require = parser.parse_constraints("^1.2").unwrap();
    let provide = parser.parse_constraints(">=1.0 <3.0").unwrap();
    let version = parser.normalize("1.4.2").unwrap();

    c.bench_function("constraint_matches", |b| {
        b.iter(|| {
            black_box(require.matches(black_box(&provide)));
            black_box(require.matches_version(black_box(&version)));
        })
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_parse_constraints,
    bench_constraint_matching
);
criterion_main!(benches);
