use std::sync::Arc;

use anyhow::{Context, Result};
use symtensor::config::UnusedInputPolicy;
use symtensor::graph::{dscalar, dscalars, dvector, iscalar};
use symtensor::{function, Args, Error, FunctionBuilder, FunctionOutput, In, SharedCell, Tensor};
use symtensor_backend_ref_cpu::CpuBackend;

fn value(output: FunctionOutput) -> Result<f64> {
    output
        .single()
        .and_then(|tensor| tensor.item_f64())
        .context("expected a single scalar output")
}

#[test]
fn keyword_and_positional_binding_agree() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let [x, y, w] = dscalars(["x", "y", "w"]);
    let out = &(&x + &y) * &w;
    let f = FunctionBuilder::new(
        [
            In::from(&x),
            In::new(&y).default(1.0),
            In::new(&w).default(2.0).name("w_by_name"),
        ],
        &out,
    )
    .build(backend)?;

    assert_eq!(value(f.call(Args::new().arg(33))?)?, 68.0);
    assert_eq!(value(f.call(Args::new().arg(33).arg(2))?)?, 70.0);
    assert_eq!(value(f.call(Args::new().arg(33).arg(0).arg(1))?)?, 33.0);
    assert_eq!(value(f.call(Args::new().arg(33).kwarg("w_by_name", 1))?)?, 34.0);
    assert_eq!(
        value(
            f.call(
                Args::new()
                    .arg(33)
                    .kwarg("w_by_name", 1)
                    .kwarg("y", 0)
            )?
        )?,
        33.0
    );
    assert_eq!(
        f.input_names(),
        vec![Some("x"), Some("y"), Some("w_by_name")]
    );
    Ok(())
}

#[test]
fn omitted_defaults_match_explicit_defaults() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let x = dscalar("x");
    let y = dscalar("y");
    let total = SharedCell::named(0.0, "total");
    let product = &x * &y;
    let f = FunctionBuilder::new([In::from(&x), In::new(&y).default(2.5)], &product)
        .update(&total, &total.expr() + &product)
        .build(backend)?;

    for input in [-1.0, 0.0, 3.5] {
        total.set_value(1.0);
        let implicit = f.call(Args::new().arg(input))?;
        let after_implicit = total.get_value();

        total.set_value(1.0);
        let explicit = f.call(Args::new().arg(input).arg(2.5))?;
        assert_eq!(implicit, explicit);
        assert_eq!(after_implicit, total.get_value());
    }
    Ok(())
}

#[test]
fn defaults_can_be_replaced_after_compilation() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let x = dscalar("x");
    let y = dscalar("y");
    let mut f = function(backend, [In::from(&x), In::new(&y).default(1.0)], &x * &y)?;

    assert_eq!(f.default_value("y").and_then(Tensor::item_f64), Some(1.0));
    f.set_default("y", 10)?;
    assert_eq!(f.default_value("y").and_then(Tensor::item_f64), Some(10.0));
    assert_eq!(value(f.call(Args::new().arg(3.0))?)?, 30.0);

    let err = f.set_default("z", 0.0).unwrap_err();
    assert!(matches!(err, Error::UnknownParameter { .. }));

    let mut g = function(f.backend().clone(), [&x, &y], &x + &y)?;
    let err = g.set_default("x", 0.0).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    g.set_default("y", 0.5)?;
    g.set_default("x", 0.25)?;
    assert_eq!(value(g.call(Args::new())?)?, 0.75);
    Ok(())
}

#[test]
fn call_errors_are_reported() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let [x, y] = dscalars(["x", "y"]);
    let f = function(backend, [In::from(&x), In::new(&y).default(1.0)], &x - &y)?;

    let err = f.call(Args::new()).unwrap_err();
    assert!(matches!(err, Error::MissingArgument { ref name } if name == "x"));

    let err = f.call(Args::new().arg(1.0).kwarg("z", 2.0)).unwrap_err();
    assert!(matches!(err, Error::UnknownParameter { ref name } if name == "z"));

    let err = f.call(Args::new().arg(1.0).kwarg("x", 2.0)).unwrap_err();
    assert!(matches!(err, Error::DuplicateArgument { ref name } if name == "x"));

    let err = f
        .call_positional([Tensor::from(1.0), Tensor::from(2.0), Tensor::from(3.0)])
        .unwrap_err();
    assert!(matches!(err, Error::TooManyArguments { expected: 2, given: 3 }));

    let err = f.call(Args::new().arg(vec![1.0, 2.0])).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
    Ok(())
}

#[test]
fn strict_inputs_reject_conversions() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let x = dscalar("x");
    let f = function(backend, [In::new(&x).strict(true)], x.exp())?;
    assert!(matches!(
        f.call(Args::new().arg(1)).unwrap_err(),
        Error::TypeMismatch { .. }
    ));
    assert_eq!(value(f.call(Args::new().arg(0.0))?)?, 1.0);
    Ok(())
}

#[test]
fn construction_errors_are_reported() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let [x, y, z] = dscalars(["x", "y", "z"]);
    let state = SharedCell::named(0i64, "state");

    let err = function(
        backend.clone(),
        [In::new(&x).default(1.0), In::from(&y)],
        &x + &y,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = function(backend.clone(), [&x, &x], &x * 2.0).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = function(
        backend.clone(),
        [In::from(&x), In::new(&y).name("x")],
        &x + &y,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = function(backend.clone(), [&x], &x + &y).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = FunctionBuilder::new([&x], &x * 2.0)
        .given(&state.expr(), &x)
        .build(backend.clone())
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    let err = FunctionBuilder::new([&z], &x + &y)
        .given(&x, &y * 2.0)
        .given(&y, &z)
        .build(backend.clone())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let inc = iscalar("inc");
    let err = FunctionBuilder::new([&inc], state.expr())
        .update(&state, &state.expr() + 0.5)
        .build(backend.clone())
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    let err = FunctionBuilder::new([&inc], state.expr())
        .update(&state, &state.expr() + &inc)
        .update(&state, &state.expr() - &inc)
        .build(backend.clone())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = function(backend, [In::from(&x * 2.0)], &x).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    Ok(())
}

#[test]
fn unused_inputs_follow_the_policy() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let [x, y] = dscalars(["x", "y"]);

    let err = FunctionBuilder::new([&x, &y], &x * 2.0)
        .on_unused_input(UnusedInputPolicy::Raise)
        .build(backend.clone())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    for policy in [UnusedInputPolicy::Warn, UnusedInputPolicy::Ignore] {
        let f = FunctionBuilder::new([&x, &y], &x * 2.0)
            .on_unused_input(policy)
            .build(backend.clone())?;
        assert_eq!(value(f.call(Args::new().arg(4.0).arg(0.0))?)?, 8.0);
    }
    Ok(())
}

#[test]
fn givens_may_introduce_inputs() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let x = dscalar("x");
    let v = dvector("v");
    let f = FunctionBuilder::new([&v], &x * 3.0)
        .given(&x, v.sum(None)?)
        .build(backend)?;
    assert_eq!(value(f.call(Args::new().arg(vec![1.0, 2.0, 3.0]))?)?, 18.0);
    Ok(())
}
