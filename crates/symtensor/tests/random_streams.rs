use std::sync::Arc;

use anyhow::{Context, Result};
use symtensor::graph::dscalar;
use symtensor::{Args, DType, FunctionBuilder, FunctionOutput, In, RandomStream, Tensor};
use symtensor_backend_ref_cpu::CpuBackend;

fn no_inputs() -> Vec<In> {
    Vec::new()
}

fn single(output: FunctionOutput) -> Result<Tensor> {
    output.single().context("expected a single output")
}

#[test]
fn each_random_node_is_sampled_once_per_call() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let stream = RandomStream::new(Some(234));
    let rv_u = stream.uniform(0.0, 1.0, Some(&[2, 2]))?;
    let nearly_zero = &(&rv_u + &rv_u) - &(&rv_u * 2.0);
    let f = FunctionBuilder::new(no_inputs(), &nearly_zero).build(backend)?;

    let zeros = Tensor::zeros(DType::F64, [2, 2]);
    for _ in 0..5 {
        let out = single(f.call(Args::new())?)?;
        assert!(out.allclose(&zeros, 0.0, 1e-12));
    }
    Ok(())
}

#[test]
fn default_updates_advance_the_generator() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let stream = RandomStream::new(Some(234));
    let rv_u = stream.uniform(0.0, 1.0, Some(&[2, 2]))?;
    let rv_n = stream.normal(0.0, 1.0, Some(&[2, 2]))?;

    let f = FunctionBuilder::new(no_inputs(), &rv_u).build(backend.clone())?;
    let g = FunctionBuilder::new(no_inputs(), &rv_n)
        .no_default_updates(true)
        .build(backend)?;
    assert_eq!(f.updates().len(), 1);
    assert!(g.updates().is_empty());

    let f1 = single(f.call(Args::new())?)?;
    let f2 = single(f.call(Args::new())?)?;
    assert_ne!(f1, f2);
    assert!(f1.to_f64_vec().iter().all(|v| (0.0..1.0).contains(v)));

    let g1 = single(g.call(Args::new())?)?;
    let g2 = single(g.call(Args::new())?)?;
    assert_eq!(g1, g2);
    Ok(())
}

#[test]
fn reseeding_reproduces_draws() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let stream = RandomStream::new(Some(1));
    let rv_u = stream.uniform(0.0, 1.0, Some(&[3]))?;
    let rv_i = stream.integers(0i64, 100i64, Some(&[3]))?;
    let f = FunctionBuilder::new(no_inputs(), vec![rv_u.clone(), rv_i.clone()])
        .build(backend)?;

    stream.seed(902340);
    let first = f.call(Args::new())?.into_vec();
    let second = f.call(Args::new())?.into_vec();
    assert_ne!(first, second);

    stream.seed(902340);
    assert_eq!(f.call(Args::new())?.into_vec(), first);
    assert_eq!(first[1].dtype(), DType::I64);
    assert!(first[1].to_i64_vec().iter().all(|v| (0..100).contains(v)));
    Ok(())
}

#[test]
fn streams_with_equal_seeds_agree() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let draw = |seed| -> Result<Tensor> {
        let stream = RandomStream::new(Some(seed));
        let rv = stream.normal(5.0, 0.5, Some(&[8]))?;
        let f = FunctionBuilder::new(no_inputs(), &rv).build(Arc::clone(&backend))?;
        single(f.call(Args::new())?)
    };
    assert_eq!(draw(77)?, draw(77)?);
    assert_ne!(draw(77)?, draw(78)?);
    Ok(())
}

#[test]
fn suppressed_functions_observe_other_functions_advancing() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let stream = RandomStream::new(Some(5));
    let rv = stream.uniform(-1.0, 1.0, None)?;
    let advancing = FunctionBuilder::new(no_inputs(), &rv).build(backend.clone())?;
    let peeking = FunctionBuilder::new(no_inputs(), &rv)
        .no_default_updates_for(stream.state_updates().into_iter().map(|(cell, _)| cell))
        .build(backend)?;
    assert!(peeking.updates().is_empty());

    let before = single(peeking.call(Args::new())?)?;
    assert_eq!(single(peeking.call(Args::new())?)?, before);
    assert_eq!(single(advancing.call(Args::new())?)?, before);
    assert_ne!(single(peeking.call(Args::new())?)?, before);
    Ok(())
}

#[test]
fn parameters_may_depend_on_inputs() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let stream = RandomStream::new(Some(11));
    let loc = dscalar("loc");
    let rv = stream.normal(&loc, 0.0, Some(&[4]))?;
    let f = FunctionBuilder::new([&loc], &rv).build(backend)?;
    let out = single(f.call(Args::new().arg(3.0))?)?;
    assert_eq!(out.to_f64_vec(), vec![3.0; 4]);
    Ok(())
}

#[test]
fn explicit_updates_take_precedence_over_default_ones() -> Result<()> {
    let backend = Arc::new(CpuBackend::new());
    let stream = RandomStream::new(Some(3));
    let rv = stream.uniform(0.0, 1.0, None)?;
    let (cell, _) = stream
        .state_updates()
        .into_iter()
        .next()
        .context("stream should log the draw")?;
    let f = FunctionBuilder::new(no_inputs(), &rv)
        .update(&cell, cell.expr())
        .build(backend)?;
    assert_eq!(f.updates().len(), 1);

    let first = single(f.call(Args::new())?)?;
    assert_eq!(single(f.call(Args::new())?)?, first);
    Ok(())
}
