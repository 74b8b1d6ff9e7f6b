use domain::Value;
use gw_normalize::{Expression, NormalizeError, ValueHistory};

#[test]
fn scales_raw_value_as_float() {
    let expression = Expression::compile("raw / 10").expect("compile");
    let cooked = expression
        .evaluate(&Value::Int(215), &ValueHistory::default())
        .expect("evaluate");
    assert_eq!(cooked, Value::Float(21.5));
}

#[test]
fn binds_previous_values() {
    let expression = Expression::compile("raw - $pv + $ppv").expect("compile");
    let mut history = ValueHistory::default();

    // 历史为空时 $pv/$ppv 取本次值
    assert_eq!(
        expression.evaluate(&Value::Int(5), &history).expect("first"),
        Value::Float(5.0)
    );

    for raw in [1, 2, 3, 4] {
        history.push(Value::Int(raw));
    }
    assert_eq!(history.len(), 3);
    // raw=10, $pv=4, $ppv=3
    assert_eq!(
        expression.evaluate(&Value::Int(10), &history).expect("evaluate"),
        Value::Float(9.0)
    );
}

#[test]
fn boolean_results() {
    let alarm = Expression::compile("raw > 50").expect("compile");
    assert_eq!(
        alarm
            .evaluate(&Value::Float(60.5), &ValueHistory::default())
            .expect("evaluate"),
        Value::Bool(true)
    );
    let flag = Expression::compile("!raw").expect("compile");
    assert_eq!(
        flag.evaluate(&Value::Bool(false), &ValueHistory::default())
            .expect("evaluate"),
        Value::Bool(true)
    );
}

#[test]
fn reports_compile_and_evaluation_errors() {
    assert!(matches!(
        Expression::compile("raw * (2"),
        Err(NormalizeError::Compile(_, _))
    ));

    let expression = Expression::compile("raw * 2").expect("compile");
    let err = expression
        .evaluate(&Value::String("abc".to_string()), &ValueHistory::default())
        .expect_err("string arithmetic");
    assert!(err.to_string().starts_with("expression error"));

    let unknown = Expression::compile("raw * gain").expect("compile");
    assert!(unknown.evaluate(&Value::Int(1), &ValueHistory::default()).is_err());
}
