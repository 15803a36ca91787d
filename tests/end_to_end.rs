use optab::capture::{ResultCapture, capture_results};
use optab::construct::{Record, Schema};
use optab::dataframe::{Dataframe, SqliteDataframe};
use optab::datatype::Value;
use optab::document;
use optab::function::{FunctionCall, FunctionKeeper};
use optab::materialize::Materializer;
use optab::model::Table;
use optab::resolve::Resolver;
use optab::settings::Settings;
use optab::{OptabError, Result};

fn transport(row_expression: &str) -> String {
    format!(
        r#"{{
  "SYNTAX": "optab-1",
  "MODULES": [
    {{"NAME": "derived", "TABLES": [
      {{"NAME": "balance",
        "QUERY": {{"SELECT": ["{row_expression} AS Row -- STRING", "(supply-demand) AS RHS -- DOUBLE"],
                   "FROM": "cities"}}}}
    ]}},
    {{"NAME": "data", "TABLES": [
      {{"NAME": "cities",
        "SCHEMA": {{"FIELDS": ["city", "supply", "demand"], "TYPES": ["STRING", "DOUBLE", "DOUBLE"]}},
        "INSTANCE": [["Oslo", 10, 4], ["Lund", 3, 5.5], ["Rome", 8, 8], ["Kiel", 0, 2]]}},
      {{"NAME": "shipments",
        "SCHEMA": {{"FIELDS": ["city", "amount", "price"], "TYPES": ["STRING", "DOUBLE_FUNCTION", "DOUBLE_FUNCTION"]}},
        "INSTANCE": [["Oslo", "value(city)", "dual(city)"], ["Lund", "value(city)", "dual(city) = -1"]]}}
    ]}}
  ]
}}"#
    )
}

#[test]
fn resolves_literal_before_query_and_computes_the_schema() {
    let file = document::read(&transport("CONCAT('balance','_',city)")).expect("valid document");
    let mut resolver = Resolver::for_file(&file).unwrap();
    let order = resolver.resolve_dependencies().unwrap().to_vec();
    assert_eq!(order, vec!["cities", "shipments", "balance"]);
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("cities") < position("balance"));
    let balance = file.table("balance").unwrap();
    assert_eq!(balance.schema().to_string(), "{Row: STRING, RHS: DOUBLE}");
    assert_eq!(
        balance.query().unwrap().to_query_language(),
        "SELECT CONCAT('balance','_',city) AS Row, (supply-demand) AS RHS FROM cities"
    );
}

#[test]
fn materializes_query_tables_through_sqlite() {
    let mut file = document::read(&transport("'balance' || '_' || city")).unwrap();
    let dataframe = SqliteDataframe::in_memory().unwrap();
    let order = Materializer::new(&dataframe).run(&mut file).expect("materialized");
    assert_eq!(order, vec!["cities", "shipments", "balance"]);

    let balance = file.table("balance").unwrap();
    let rows = balance.instance().expect("computed instance").rows();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], vec![Value::String("balance_Oslo".into()), Value::Double(6.0)]);
    assert_eq!(rows[1], vec![Value::String("balance_Lund".into()), Value::Double(-2.5)]);

    // function cells pass through the dataframe as text
    let shipments = file.table("shipments").unwrap();
    let scanned = dataframe.scan("shipments", shipments.schema()).unwrap();
    assert_eq!(scanned, shipments.instance().unwrap().rows());

    // already materialized
    let err = file.table_mut("balance").unwrap().set_instance(Vec::new()).unwrap_err();
    assert!(matches!(err, OptabError::State(_)));
}

#[test]
fn query_execution_failures_surface_as_dataframe_errors() {
    let mut file = document::read(&transport("NO_SUCH_FUNCTION(city)")).unwrap();
    let dataframe = SqliteDataframe::in_memory().unwrap();
    let err = Materializer::new(&dataframe).run(&mut file).unwrap_err();
    assert!(matches!(err, OptabError::Dataframe(_)));
}

#[test]
fn non_finite_doubles_survive_the_dataframe() {
    let schema = Schema::from_tags(&["x", "y"], &["DOUBLE", "IEEEDOUBLE"]).unwrap();
    let rows = vec![
        vec![Value::Double(f64::NAN), Value::IeeeDouble(f64::NAN)],
        vec![Value::Double(f64::INFINITY), Value::IeeeDouble(f64::NEG_INFINITY)],
    ];
    let dataframe = SqliteDataframe::in_memory().unwrap();
    dataframe.load("odd", &schema, &rows).unwrap();
    let scanned = dataframe.scan("odd", &schema).unwrap();
    assert!(matches!(scanned[0][0], Value::Double(d) if d.is_nan()));
    assert!(matches!(scanned[0][1], Value::IeeeDouble(d) if d.is_nan()));
    assert_eq!(scanned[1], rows[1]);
}

struct Solution;

impl ResultCapture for Solution {
    fn value_for(&self, table: &Table, record: &Record<'_>, call: &FunctionCall) -> Result<Option<Value>> {
        assert_eq!(table.name(), "shipments");
        let city = record.get("city").and_then(Value::as_str).unwrap_or_default();
        Ok(match (call.name(), city) {
            ("value", "Oslo") => Some(Value::Double(6.0)),
            ("value", _) => Some(Value::Double(0.0)),
            ("dual", _) => Some(Value::Double(12.5)),
            _ => None,
        })
    }
}

#[test]
fn captured_results_survive_a_round_trip() {
    let file = document::read(&transport("city")).unwrap();
    let mut keeper = FunctionKeeper::new();
    keeper.define("value").unwrap();
    keeper.define("dual").unwrap();
    assert_eq!(file.validate_functions(&keeper).unwrap(), 4);

    // the second dual already holds a value and is left alone
    assert_eq!(capture_results(&file, &Solution).unwrap(), 3);
    assert_eq!(capture_results(&file, &Solution).unwrap(), 0);

    let written = document::write_string(&file, &Settings::default()).unwrap();
    assert!(written.contains("value(city) = 6"));
    assert!(written.contains("dual(city) = -1"));
    let again = document::read(&written).unwrap();
    let rows = again.table("shipments").unwrap().instance().unwrap().rows();
    assert_eq!(rows[0][1].as_function().unwrap().value(), Some(Value::Double(6.0)));
    assert_eq!(rows[0][2].as_function().unwrap().value(), Some(Value::Double(12.5)));
    assert_eq!(rows[1][2].as_function().unwrap().value(), Some(Value::Double(-1.0)));
}

#[test]
fn undefined_functions_are_reported() {
    let file = document::read(&transport("city")).unwrap();
    let mut keeper = FunctionKeeper::new();
    keeper.define("value").unwrap();
    let err = file.validate_functions(&keeper).unwrap_err();
    assert!(matches!(err, OptabError::Dependency(_)));
    assert!(format!("{}", err).contains("'dual'"));
}
