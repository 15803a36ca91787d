use optab::OptabError;
use optab::construct::{Container, ContainerBuilder, Schema};
use optab::dataframe::SqliteDataframe;
use optab::datatype::Value;
use optab::document;
use optab::materialize::Materializer;
use optab::span::{Operator, Span, SpanFactory};

const DOCUMENT: &str = r#"{"MODULES": [{"NAME": "data", "TABLES": [
    {"NAME": "plants",
     "SCHEMA": {"FIELDS": ["plant", "capacity"], "TYPES": ["STRING", "DOUBLE"]},
     "INSTANCE": [["north", 10], ["south", 0], ["east", 7.5]]},
    {"NAME": "markets",
     "SCHEMA": {"FIELDS": ["market", "demand"], "TYPES": ["STRING", "INTEGER"]},
     "INSTANCE": [["oslo", 4], ["rome", 6]]}]}]}"#;

fn container(items: &[(&str, Value)]) -> Container<Value> {
    let mut builder = ContainerBuilder::new();
    for (name, value) in items {
        builder.add_item(*name, value.clone()).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn table_span_is_repeatable() {
    let file = document::read(DOCUMENT).unwrap();
    let plants = file.table("plants").unwrap();
    let factory = SpanFactory::new();
    let span = factory.from_table(plants);
    assert!(std::ptr::eq(span.schema(), plants.schema()));
    assert_eq!(span.records().unwrap().len(), 3);
    assert_eq!(span.apply().unwrap().count(), 3);
}

#[test]
fn unary_operator_drops_null_results() {
    let file = document::read(DOCUMENT).unwrap();
    let plants = file.table("plants").unwrap();
    let open = Schema::from_tags(&["name", "limit"], &["STRING", "DOUBLE"]).unwrap();
    let operator = Operator::unary(|plant, mut builder| {
        let capacity = plant.get("capacity").and_then(Value::as_f64).unwrap_or(0.0);
        if capacity <= 0.0 {
            return Ok(builder.build_null());
        }
        builder.add_item("name", plant.get("plant").cloned().unwrap_or(Value::Null))?;
        builder.add_item("limit", Value::Double(capacity))?;
        builder.build()
    })
    .with_result_schema(&open)
    .unwrap();
    let factory = SpanFactory::new();
    let span = factory.compose(factory.from_table(plants), operator).unwrap();
    assert!(std::ptr::eq(span.schema(), &open));
    let records = span.records().unwrap();
    let names: Vec<&str> = records.iter().filter_map(|r| r.get("name").and_then(Value::as_str)).collect();
    assert_eq!(names, vec!["north", "east"]);
}

#[test]
fn binary_operator_over_the_cross_product() {
    let file = document::read(DOCUMENT).unwrap();
    let arcs = Schema::from_tags(&["from", "to"], &["STRING", "STRING"]).unwrap();
    let operator = Operator::binary(|plant, market, mut builder| {
        builder.add_item("from", plant.get("plant").cloned().unwrap_or(Value::Null))?;
        builder.add_item("to", market.get("market").cloned().unwrap_or(Value::Null))?;
        builder.build()
    })
    .with_result_schema(&arcs)
    .unwrap();
    let factory = SpanFactory::new();
    let span = factory
        .combine(
            factory.from_table(file.table("plants").unwrap()),
            factory.from_table(file.table("markets").unwrap()),
            operator,
        )
        .unwrap();
    let records = span.records().unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(records[1].to_string(), r#"{from: "north", to: "rome"}"#);
}

#[test]
fn result_schema_is_fixed_once() {
    let schema = Schema::from_tags(&["a"], &["STRING"]).unwrap();
    let operator = Operator::unary(|_, builder| Ok(builder.build_null()));
    assert!(matches!(operator.result_schema().unwrap_err(), OptabError::State(_)));
    let operator = operator.with_result_schema(&schema).unwrap();
    assert!(std::ptr::eq(operator.result_schema().unwrap(), &schema));
    assert!(matches!(operator.with_result_schema(&schema).err(), Some(OptabError::State(_))));
}

#[test]
fn factory_checks_arity_and_result_schema() {
    let schema = Schema::from_tags(&["a"], &["STRING"]).unwrap();
    let factory = SpanFactory::new();
    let source = || factory.from_containers(&schema, vec![container(&[("a", Value::String("x".into()))])]);

    let unset = Operator::unary(|record, _| Ok(record.clone()));
    assert!(matches!(factory.compose(source(), unset).err(), Some(OptabError::State(_))));

    let binary = Operator::binary(|_, _, builder| Ok(builder.build_null())).with_result_schema(&schema).unwrap();
    assert!(matches!(factory.compose(source(), binary).err(), Some(OptabError::State(_))));

    let unary = Operator::unary(|_, builder| Ok(builder.build_null())).with_result_schema(&schema).unwrap();
    assert!(matches!(factory.combine(source(), source(), unary).err(), Some(OptabError::State(_))));

    assert!(matches!(factory.from_dataframe("t", &schema).err(), Some(OptabError::State(_))));
}

#[test]
fn container_span_validates_each_record() {
    let schema = Schema::from_tags(&["a", "n"], &["STRING", "INTEGER"]).unwrap();
    let factory = SpanFactory::new();
    let span = factory.from_containers(
        &schema,
        vec![
            container(&[("n", Value::Integer(1)), ("a", Value::String("x".into()))]),
            container(&[("a", Value::String("y".into()))]),
        ],
    );
    let mut records = span.apply().unwrap();
    assert_eq!(records.next().unwrap().unwrap().to_string(), r#"{a: "x", n: 1}"#);
    assert!(records.next().unwrap().is_err());
    assert!(span.records().is_err());
}

#[test]
fn dataframe_span_scans_loaded_tables() {
    let mut file = document::read(DOCUMENT).unwrap();
    let dataframe = SqliteDataframe::in_memory().unwrap();
    Materializer::new(&dataframe).run(&mut file).unwrap();
    let markets = file.table("markets").unwrap();
    let factory = SpanFactory::with_dataframe(&dataframe);
    let span = factory.from_dataframe("markets", markets.schema()).unwrap();
    let records = span.records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].get("demand"), Some(&Value::Integer(6)));
}

#[test]
fn operator_output_must_use_the_result_schema() {
    let file = document::read(DOCUMENT).unwrap();
    let markets = file.table("markets").unwrap();
    let other = Schema::from_tags(&["x"], &["STRING"]).unwrap();
    let passthrough = Operator::unary(|record, _| Ok(record.clone())).with_result_schema(&other).unwrap();
    let factory = SpanFactory::new();
    let span = factory.compose(factory.from_table(markets), passthrough).unwrap();
    assert!(matches!(span.records().unwrap_err(), OptabError::Schema(_)));
}

#[test]
fn values_set_through_a_table_span_reach_the_table() {
    let file = document::read(
        r#"{"MODULES": [{"NAME": "m", "TABLES": [{"NAME": "flows",
            "SCHEMA": {"FIELDS": ["arc", "flow"], "TYPES": ["STRING", "DOUBLE_FUNCTION"]},
            "INSTANCE": [["a", "flow(arc)"], ["b", "flow(arc)"]]}]}]}"#,
    )
    .unwrap();
    let flows = file.table("flows").unwrap();
    let factory = SpanFactory::new();
    for record in factory.from_table(flows).records().unwrap() {
        let call = record.get("flow").and_then(Value::as_function).unwrap();
        call.set_value(Value::Double(2.5)).unwrap();
    }
    let rows = flows.instance().unwrap().rows();
    assert!(rows.iter().all(|row| row[1].as_function().and_then(|call| call.value()) == Some(Value::Double(2.5))));
    assert!(document::write_string(&file, &Default::default()).unwrap().contains("flow(arc) = 2.5"));
}
