use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use optab::construct::Schema;
use optab::document;
use optab::model::{File, Instance, Module, Table};
use optab::query::{Query, SelectItem};
use optab::resolve::Resolver;
use optab::settings::Settings;

fn document_with_rows(rows: usize) -> String {
    let instance: Vec<String> = (0..rows)
        .map(|i| format!(r#"["node{}", {}, {}.5, "flow(node{})"]"#, i, i, i, i))
        .collect();
    format!(
        r#"{{"MODULES": [{{"NAME": "data", "TABLES": [{{"NAME": "nodes",
            "SCHEMA": {{"FIELDS": ["node", "rank", "weight", "flow"],
                        "TYPES": ["STRING", "INTEGER", "DOUBLE", "DOUBLE_FUNCTION"]}},
            "INSTANCE": [{}]}}]}}]}}"#,
        instance.join(",\n")
    )
}

fn chain(depth: usize) -> File {
    let schema = Schema::from_tags(&["k"], &["INTEGER"]).unwrap();
    let instance = Instance::new(&schema, Vec::new()).unwrap();
    let mut tables = vec![Table::literal("t0", schema, instance)];
    for i in (1..=depth).rev() {
        let query = Query::new(vec![SelectItem::parse("k -- INTEGER").unwrap()]).from(format!("t{}", i - 1));
        tables.push(Table::from_query(format!("t{}", i), query).unwrap());
    }
    File::new(None, vec![Module::new("chain", tables).unwrap()]).unwrap()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for rows in [1_000, 100_000] {
        let text = document_with_rows(rows);
        c.bench_function(&format!("read {} rows", rows), |b| b.iter(|| document::read(black_box(&text)).unwrap()));
        let file = document::read(&text).unwrap();
        let settings = Settings::default();
        c.bench_function(&format!("write {} rows", rows), |b| {
            b.iter(|| document::write_string(black_box(&file), &settings).unwrap())
        });
    }
    for depth in [100, 10_000] {
        let file = chain(depth);
        c.bench_function(&format!("resolve chain of {}", depth), |b| {
            b.iter(|| {
                let mut resolver = Resolver::for_file(black_box(&file)).unwrap();
                resolver.resolve_dependencies().unwrap().len()
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
