use optab::OptabError;
use optab::construct::Schema;
use optab::datatype::{ResultType, Value};
use optab::function::{FunctionCall, FunctionKeeper};

#[test]
fn three_opening_forms_are_equivalent() {
    for text in ["value(x,y)", "value<x, y>", "value x,y", "value (x , y)", "value(x,y"] {
        let call = FunctionCall::parse(text, ResultType::Double).unwrap_or_else(|e| panic!("{text}: {e}"));
        assert_eq!(call.name(), "value");
        assert_eq!(call.arguments(), &["x".to_string(), "y".to_string()]);
        assert_eq!(call.type_tag(), "DOUBLE_FUNCTION");
        assert!(!call.has_value());
    }
}

#[test]
fn malformed_call_points_at_the_first_bad_character() {
    let err = FunctionCall::parse("f(a,,c)", ResultType::Integer).unwrap_err();
    assert!(matches!(err, OptabError::Syntax { .. }));
    assert_eq!(err.line_col(), Some((1, 5)));
    assert!(format!("{}", err).contains('^'));

    let err = FunctionCall::parse("f(", ResultType::Integer).unwrap_err();
    assert_eq!(err.line_col(), Some((1, 3)));
    assert!(format!("{}", err).contains("1 | f("), "{}", err);
    assert!(format!("{}", err).contains('^'));
    assert!(FunctionCall::parse("(a)", ResultType::Integer).is_err());
    assert!(FunctionCall::parse("f", ResultType::Integer).is_err());
}

#[test]
fn value_is_set_exactly_once() {
    let call = FunctionCall::parse("value(x)", ResultType::Double).unwrap();
    call.set_value(Value::Double(4.5)).expect("first set");
    assert_eq!(call.value(), Some(Value::Double(4.5)));
    let err = call.set_value(Value::Double(5.0)).unwrap_err();
    assert!(matches!(err, OptabError::State(_)));
    assert_eq!(call.value(), Some(Value::Double(4.5)));
}

#[test]
fn value_of_the_wrong_type_is_rejected() {
    let call = FunctionCall::parse("label(x)", ResultType::String).unwrap();
    let err = call.set_value(Value::Integer(3)).unwrap_err();
    assert!(matches!(err, OptabError::Schema(_)));
    assert!(!call.has_value());
}

#[test]
fn captured_value_survives_display_and_parse() {
    let call = FunctionCall::parse("dual<row>", ResultType::Double).unwrap();
    assert_eq!(call.to_string(), "dual(row)");
    call.set_value(Value::Double(-2.25)).unwrap();
    assert_eq!(call.to_string(), "dual(row) = -2.25");
    let again = FunctionCall::parse(&call.to_string(), ResultType::Double).unwrap();
    assert_eq!(again, call);

    let bits = FunctionCall::parse("raw(x) = 0x1.8p1", ResultType::IeeeDouble).unwrap();
    assert_eq!(bits.value(), Some(Value::IeeeDouble(3.0)));
}

#[test]
fn keeper_rejects_re_definition() {
    let mut keeper = FunctionKeeper::new();
    keeper.define("value").unwrap();
    let err = keeper.define("value").unwrap_err();
    assert!(matches!(err, OptabError::State(_)));
    assert_eq!(keeper.len(), 1);
}

#[test]
fn validation_against_keeper_and_schema() {
    let mut keeper = FunctionKeeper::new();
    keeper.define("value").unwrap();
    let schema = Schema::from_tags(&["x", "v"], &["STRING", "DOUBLE_FUNCTION"]).unwrap();

    FunctionCall::parse("value(x)", ResultType::Double).unwrap().validate(&keeper, &schema).expect("valid");

    let err = FunctionCall::parse("dual(x)", ResultType::Double).unwrap().validate(&keeper, &schema).unwrap_err();
    assert!(matches!(err, OptabError::Dependency(_)));
    assert!(format!("{}", err).contains("Undefined function 'dual'"));

    let err = FunctionCall::parse("value(y)", ResultType::Double).unwrap().validate(&keeper, &schema).unwrap_err();
    assert!(matches!(err, OptabError::Dependency(_)));
    assert!(format!("{}", err).contains("Argument 'y'"));
}
