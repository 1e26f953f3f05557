//! Drives a column through the dynamic host call surface.

use cudf_binding::{init, BindingError, CallArgs, HostReturn, HostValue};
use proptest::prelude::*;

fn value(ret: HostReturn) -> HostValue {
    match ret {
        HostReturn::Value(v) => v,
        HostReturn::Column(c) => panic!("expected a value, got {:?}", c),
    }
}

fn no_args() -> CallArgs {
    CallArgs::default()
}

#[test]
fn string_column_round_trip_through_calls() {
    let module = init(None).unwrap();
    let mut col = module
        .column(&CallArgs::new(vec![
            "string".into(),
            HostValue::Undefined,
            b"red|green|blue".to_vec().into(),
        ]))
        .unwrap();

    assert_eq!(value(col.call("type", &no_args()).unwrap()), HostValue::from("string"));
    assert_eq!(value(col.call("size", &no_args()).unwrap()), HostValue::Number(1.0));

    let mut parts = match col.call("split", &CallArgs::new(vec!["|".into()])).unwrap() {
        HostReturn::Column(c) => c,
        other => panic!("expected a column, got {:?}", other),
    };
    assert_eq!(value(parts.call("size", &no_args()).unwrap()), HostValue::Number(3.0));
    assert_eq!(
        value(parts.call("get_value", &CallArgs::new(vec![HostValue::Number(2.0)])).unwrap()),
        HostValue::from("blue")
    );

    parts
        .call(
            "set_null_mask",
            &CallArgs::new(vec![vec![0b011u8].into(), HostValue::Number(1.0)]),
        )
        .unwrap();
    assert_eq!(value(parts.call("null_count", &no_args()).unwrap()), HostValue::Number(1.0));
    assert_eq!(
        value(parts.call("get_value", &CallArgs::new(vec![HostValue::Number(2.0)])).unwrap()),
        HostValue::Null
    );

    col.call("release", &no_args()).unwrap();
    col.call("release", &no_args()).unwrap();
    let err = col.call("split", &CallArgs::new(vec!["|".into()])).unwrap_err();
    assert_eq!(err, BindingError::UseAfterRelease { op: "split" });

    drop(parts);
    assert_eq!(module.memory_stats().live_buffers, 0);
}

#[test]
fn argument_shapes_are_checked_before_the_engine_runs() {
    let module = init(None).unwrap();
    let mut col = module.column_from_bytes("int32", &[0u8; 8]).unwrap();

    for (method, args) in [
        ("size", CallArgs::new(vec![HostValue::Null])),
        ("set_null_count", no_args()),
        ("set_null_count", CallArgs::new(vec!["1".into()])),
        ("get_value", CallArgs::new(vec![HostValue::Number(-1.0)])),
        ("split", no_args()),
    ] {
        let err = col.call(method, &args).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError", "{} {:?}", method, args);
    }
    assert_eq!(col.size().unwrap(), 2);
}

#[test]
fn gather_and_get_child_through_calls() {
    let module = init(None).unwrap();
    let mut col = module.column_from_bytes("string", b"x,y,z").unwrap().split(",").unwrap();

    let indices = HostValue::Array(vec![HostValue::Number(2.0), HostValue::BigInt(0)]);
    let mut picked = match col.call("gather", &CallArgs::new(vec![indices])).unwrap() {
        HostReturn::Column(c) => c,
        other => panic!("expected a column, got {:?}", other),
    };
    assert_eq!(value(picked.call("size", &no_args()).unwrap()), HostValue::Number(2.0));
    assert_eq!(
        value(picked.call("get_value", &CallArgs::new(vec![HostValue::Number(0.0)])).unwrap()),
        HostValue::from("z")
    );

    let out_of_bounds = HostValue::Array(vec![HostValue::Number(3.0)]);
    let err = col.call("gather", &CallArgs::new(vec![out_of_bounds])).unwrap_err();
    assert_eq!(err.kind(), "InvalidArgumentError");

    let mut offsets = match col.call("get_child", &CallArgs::new(vec![HostValue::Number(0.0)])).unwrap() {
        HostReturn::Column(c) => c,
        other => panic!("expected a column, got {:?}", other),
    };
    assert_eq!(value(offsets.call("type", &no_args()).unwrap()), HostValue::from("int32"));
    assert_eq!(value(offsets.call("size", &no_args()).unwrap()), HostValue::Number(4.0));
    let err = col
        .call("get_child", &CallArgs::new(vec![HostValue::Number(2.0)]))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgumentError");
}

proptest! {
    #[test]
    fn set_null_count_accepts_exactly_the_valid_range(rows in 0usize..32, k in 0usize..40) {
        let module = init(None).unwrap();
        let mut col = module.column_from_bytes("int32", &vec![0u8; rows * 4]).unwrap();
        let result = col.call("set_null_count", &CallArgs::new(vec![HostValue::Number(k as f64)]));
        if k <= rows {
            prop_assert!(result.is_ok());
            prop_assert_eq!(col.null_count().unwrap(), k);
        } else {
            prop_assert_eq!(result.unwrap_err().kind(), "InvalidArgumentError");
            prop_assert_eq!(col.null_count().unwrap(), 0);
        }
        prop_assert_eq!(col.has_nulls().unwrap(), col.null_count().unwrap() > 0);
    }
}
