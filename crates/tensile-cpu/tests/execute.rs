use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensile::autodiff::{backprop_function, Adjoints};
use tensile::{DType, Function, FunctionBuilder, Graph, Literal, ValueType};
use tensile_cpu::{DenseBuffer, ExternalFunction, FrameError};

fn mul_add_function(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name);
    let x = b.parameter(DType::F32, [2, 2]);
    let w = b.parameter(DType::F32, [2, 2]);
    let lit = Literal::from_f32([2, 2], &[1.0, 2.0, 3.0, 3.0]).expect("literal fits its shape");
    let c = b.constant(lit);
    let prod = b.multiply(x, w);
    let sum = b.add(prod, c);
    b.build(sum).expect("well-formed function")
}

fn f32_out(shape: impl Into<tensile::Shape>) -> DenseBuffer {
    DenseBuffer::zeroed(ValueType::new(DType::F32, shape)).expect("representable size")
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
    }
}

#[test]
fn multiply_add_computes_the_expected_grid() -> Result<()> {
    let mut ext = ExternalFunction::new(mul_add_function("mul_add_exec"));
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let b = DenseBuffer::from_f32([2, 2], &[5.0, 6.0, 7.0, 8.0])?;
    let mut out = vec![f32_out([2, 2])];
    frame.call(&[&a, &b], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 14.0, 24.0, 35.0]);
    Ok(())
}

#[test]
fn reused_operands_compute_the_expected_grid() -> Result<()> {
    // A feeds both the multiply and the outer add.
    let mut b = FunctionBuilder::new("mul_add_alias_exec");
    let x = b.parameter(DType::F32, [2, 2]);
    let w = b.parameter(DType::F32, [2, 2]);
    let prod = b.multiply(x, w);
    let sum = b.add(prod, x);
    let f = b.build(sum).expect("well-formed function");

    let mut ext = ExternalFunction::new(f);
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let b_buf = DenseBuffer::from_f32([2, 2], &[5.0, 6.0, 7.0, 8.0])?;
    let mut out = vec![f32_out([2, 2])];
    frame.call(&[&a, &b_buf], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 14.0, 24.0, 36.0]);
    Ok(())
}

#[test]
fn frames_reuse_their_temporaries() -> Result<()> {
    let mut ext = ExternalFunction::new(mul_add_function("reuse_exec"));
    let mut frame = ext.make_call_frame()?;
    let source = ext.source().map(str::to_owned);

    let a = DenseBuffer::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let b = DenseBuffer::from_f32([2, 2], &[5.0, 6.0, 7.0, 8.0])?;
    let mut out = vec![f32_out([2, 2])];
    frame.call(&[&a, &b], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 14.0, 24.0, 35.0]);

    let a2 = DenseBuffer::from_f32([2, 2], &[0.0, 0.0, 0.0, 0.0])?;
    frame.call(&[&a2, &b], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![1.0, 2.0, 3.0, 3.0]);

    // Compilation happened exactly once; later frames share the unit.
    let mut second = ext.make_call_frame()?;
    assert_eq!(ext.source().map(str::to_owned), source);
    second.call(&[&a, &b], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 14.0, 24.0, 35.0]);
    Ok(())
}

#[test]
fn same_named_functions_compile_independently() -> Result<()> {
    // Two distinct bodies behind one function name must get distinct
    // artifacts and entry points.
    let name = "shared_name_exec";
    let mut b = FunctionBuilder::new(name);
    let x = b.parameter(DType::F32, [2, 2]);
    let w = b.parameter(DType::F32, [2, 2]);
    let sum = b.add(x, w);
    let added = b.build(sum).expect("well-formed function");

    let mut b = FunctionBuilder::new(name);
    let x = b.parameter(DType::F32, [2, 2]);
    let w = b.parameter(DType::F32, [2, 2]);
    let prod = b.multiply(x, w);
    let multiplied = b.build(prod).expect("well-formed function");

    let a = DenseBuffer::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let c = DenseBuffer::from_f32([2, 2], &[5.0, 6.0, 7.0, 8.0])?;
    let mut out = vec![f32_out([2, 2])];

    let mut add_ext = ExternalFunction::new(added);
    let mut add_frame = add_ext.make_call_frame()?;
    add_frame.call(&[&a, &c], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 8.0, 10.0, 12.0]);

    let mut mul_ext = ExternalFunction::new(multiplied);
    let mut mul_frame = mul_ext.make_call_frame()?;
    mul_frame.call(&[&a, &c], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![5.0, 12.0, 21.0, 32.0]);

    // The first unit is untouched by the second compilation.
    add_frame.call(&[&a, &c], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 8.0, 10.0, 12.0]);
    Ok(())
}

#[test]
fn multiply_gradient_swaps_the_operands() -> Result<()> {
    let mut b = FunctionBuilder::new("grad_mul_exec");
    let x = b.parameter(DType::F32, [2, 3]);
    let w = b.parameter(DType::F32, [2, 3]);
    let y = b.multiply(x, w);
    let f = b.build(y).expect("well-formed function");
    let grad = backprop_function(&f)?;

    let mut ext = ExternalFunction::new(grad);
    let mut frame = ext.make_call_frame()?;

    let mut rng = StdRng::seed_from_u64(7);
    let xs: Vec<f32> = (0..6).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let ws: Vec<f32> = (0..6).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let x_buf = DenseBuffer::from_f32([2, 3], &xs)?;
    let w_buf = DenseBuffer::from_f32([2, 3], &ws)?;
    let seed = DenseBuffer::from_f32([2, 3], &[1.0; 6])?;

    let mut outs = vec![f32_out([2, 3]), f32_out([2, 3])];
    frame.call(&[&x_buf, &w_buf, &seed], &mut outs)?;
    assert_close(&outs[0].f32_values(), &ws);
    assert_close(&outs[1].f32_values(), &xs);
    Ok(())
}

#[test]
fn divide_gradient_matches_hand_computation() -> Result<()> {
    let mut b = FunctionBuilder::new("grad_div_exec");
    let num = b.parameter(DType::F32, [2]);
    let den = b.parameter(DType::F32, [2]);
    let y = b.divide(num, den);
    let f = b.build(y).expect("well-formed function");
    let grad = backprop_function(&f)?;

    let mut ext = ExternalFunction::new(grad);
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_f32([2], &[2.0, -3.0])?;
    let d = DenseBuffer::from_f32([2], &[4.0, 0.5])?;
    let seed = DenseBuffer::from_f32([2], &[1.0, 2.0])?;
    let mut outs = vec![f32_out([2]), f32_out([2])];
    frame.call(&[&a, &d, &seed], &mut outs)?;

    // d(a/b)/da = s/b ; d(a/b)/db = -(s*a)/b^2
    assert_close(&outs[0].f32_values(), &[0.25, 4.0]);
    assert_close(&outs[1].f32_values(), &[-0.125, 24.0]);
    Ok(())
}

#[test]
fn abs_gradient_routes_through_sign() -> Result<()> {
    let mut b = FunctionBuilder::new("grad_abs_exec");
    let x = b.parameter(DType::F32, [3]);
    let y = b.abs(x);
    let f = b.build(y).expect("well-formed function");
    let grad = backprop_function(&f)?;

    let mut ext = ExternalFunction::new(grad);
    let mut frame = ext.make_call_frame()?;

    let x_buf = DenseBuffer::from_f32([3], &[-2.0, 0.0, 3.0])?;
    let seed = DenseBuffer::from_f32([3], &[1.0, 1.0, 1.0])?;
    let mut outs = vec![f32_out([3])];
    frame.call(&[&x_buf, &seed], &mut outs)?;
    assert_eq!(outs[0].f32_values(), vec![-1.0, 0.0, 1.0]);
    Ok(())
}

#[test]
fn repeated_operand_gradient_doubles_the_seed() -> Result<()> {
    let mut b = FunctionBuilder::new("grad_double_exec");
    let x = b.parameter(DType::F32, [2]);
    let y = b.add(x, x);
    let f = b.build(y).expect("well-formed function");
    let grad = backprop_function(&f)?;

    let mut ext = ExternalFunction::new(grad);
    let mut frame = ext.make_call_frame()?;

    let x_buf = DenseBuffer::from_f32([2], &[10.0, -1.0])?;
    let seed = DenseBuffer::from_f32([2], &[1.5, -2.0])?;
    let mut outs = vec![f32_out([2])];
    frame.call(&[&x_buf, &seed], &mut outs)?;
    assert_eq!(outs[0].f32_values(), vec![3.0, -4.0]);
    Ok(())
}

#[test]
fn three_deltas_accumulate_into_one_adjoint() -> Result<()> {
    // x contributes through three paths, so the adjoint is 3 * seed.
    let mut b = FunctionBuilder::new("grad_triple_exec");
    let x = b.parameter(DType::F32, [2]);
    let twice = b.add(x, x);
    let y = b.add(twice, x);
    let f = b.build(y).expect("well-formed function");
    let grad = backprop_function(&f)?;

    let mut ext = ExternalFunction::new(grad);
    let mut frame = ext.make_call_frame()?;

    let x_buf = DenseBuffer::from_f32([2], &[7.0, -0.5])?;
    let seed = DenseBuffer::from_f32([2], &[2.0, -1.0])?;
    let mut outs = vec![f32_out([2])];
    frame.call(&[&x_buf, &seed], &mut outs)?;
    assert_eq!(outs[0].f32_values(), vec![6.0, -3.0]);
    Ok(())
}

#[test]
fn accumulated_adjoints_match_across_delta_orders() -> Result<()> {
    // The same three contributions, folded in two different arrival orders,
    // must evaluate to the same adjoint.
    let mut outputs = Vec::new();
    let orders = [("accum_ord_a_exec", [0usize, 1, 2]), ("accum_ord_b_exec", [2, 0, 1])];
    for (name, order) in orders {
        let mut graph = Graph::new();
        let x = graph.parameter(DType::F32, [2]);
        let deltas = [
            graph.parameter(DType::F32, [2]),
            graph.parameter(DType::F32, [2]),
            graph.parameter(DType::F32, [2]),
        ];
        let y = graph.parameter(DType::F32, [2]);
        let seed = graph.parameter(DType::F32, [2]);
        let accumulated = {
            let mut adjoints = Adjoints::new(&mut graph, y, seed)?;
            for position in order {
                adjoints.add_delta(x, deltas[position]);
            }
            adjoints.get(x)?
        };
        let f = Function::from_parts(name, graph, deltas.to_vec(), accumulated)?;

        let mut ext = ExternalFunction::new(f);
        let mut frame = ext.make_call_frame()?;
        let d1 = DenseBuffer::from_f32([2], &[0.5, -1.25])?;
        let d2 = DenseBuffer::from_f32([2], &[2.0, 0.75])?;
        let d3 = DenseBuffer::from_f32([2], &[-3.5, 4.0])?;
        let mut out = vec![f32_out([2])];
        frame.call(&[&d1, &d2, &d3], &mut out)?;
        outputs.push(out[0].f32_values());
    }
    assert_eq!(outputs[0], vec![-1.0, 3.5]);
    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[test]
fn dot_contracts_matrix_with_vector() -> Result<()> {
    let mut b = FunctionBuilder::new("dot_vec_exec");
    let m = b.parameter(DType::F32, [2, 3]);
    let v = b.parameter(DType::F32, [3]);
    let y = b.dot(m, v);
    let f = b.build(y).expect("well-formed function");

    let mut ext = ExternalFunction::new(f);
    let mut frame = ext.make_call_frame()?;

    let m_buf = DenseBuffer::from_f32([2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let v_buf = DenseBuffer::from_f32([3], &[1.0, 0.0, -1.0])?;
    let mut outs = vec![f32_out([2])];
    frame.call(&[&m_buf, &v_buf], &mut outs)?;
    assert_eq!(outs[0].f32_values(), vec![-2.0, -2.0]);
    Ok(())
}

#[test]
fn dot_contracts_matrix_with_matrix() -> Result<()> {
    let mut b = FunctionBuilder::new("dot_mat_exec");
    let lhs = b.parameter(DType::F32, [2, 2]);
    let rhs = b.parameter(DType::F32, [2, 2]);
    let y = b.dot(lhs, rhs);
    let f = b.build(y).expect("well-formed function");

    let mut ext = ExternalFunction::new(f);
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let b_buf = DenseBuffer::from_f32([2, 2], &[5.0, 6.0, 7.0, 8.0])?;
    let mut outs = vec![f32_out([2, 2])];
    frame.call(&[&a, &b_buf], &mut outs)?;
    assert_eq!(outs[0].f32_values(), vec![19.0, 22.0, 43.0, 50.0]);
    Ok(())
}

#[test]
fn f64_buffers_flow_through_the_entry() -> Result<()> {
    let mut b = FunctionBuilder::new("add_f64_exec");
    let x = b.parameter(DType::F64, [2]);
    let w = b.parameter(DType::F64, [2]);
    let y = b.add(x, w);
    let f = b.build(y).expect("well-formed function");

    let mut ext = ExternalFunction::new(f);
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_f64([2], &[0.5, 1e300])?;
    let c = DenseBuffer::from_f64([2], &[0.25, 1e300])?;
    let mut outs = vec![DenseBuffer::zeroed(ValueType::new(DType::F64, [2]))?];
    frame.call(&[&a, &c], &mut outs)?;
    assert_eq!(outs[0].f64_values(), vec![0.75, 2e300]);
    Ok(())
}

#[test]
fn integer_buffers_flow_through_the_entry() -> Result<()> {
    let mut b = FunctionBuilder::new("mul_i32_exec");
    let x = b.parameter(DType::I32, [3]);
    let w = b.parameter(DType::I32, [3]);
    let y = b.multiply(x, w);
    let f = b.build(y).expect("well-formed function");

    let mut ext = ExternalFunction::new(f);
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_i32([3], &[2, -4, 10])?;
    let c = DenseBuffer::from_i32([3], &[3, 5, -2])?;
    let mut outs = vec![DenseBuffer::zeroed(ValueType::new(DType::I32, [3]))?];
    frame.call(&[&a, &c], &mut outs)?;
    assert_eq!(outs[0].i32_values(), vec![6, -20, -20]);
    Ok(())
}

#[test]
fn identity_results_stay_in_the_input_slot() -> Result<()> {
    let mut b = FunctionBuilder::new("identity_exec");
    let x = b.parameter(DType::F32, [2]);
    let f = b.build(x).expect("well-formed function");

    let mut ext = ExternalFunction::new(f);
    let mut frame = ext.make_call_frame()?;
    assert_eq!(frame.n_outputs(), 0);

    let a = DenseBuffer::from_f32([2], &[4.0, 2.0])?;
    frame.call(&[&a], &mut [])?;
    assert_eq!(a.f32_values(), vec![4.0, 2.0]);
    Ok(())
}

#[test]
fn frames_validate_arity_and_types() -> Result<()> {
    let mut ext = ExternalFunction::new(mul_add_function("arity_exec"));
    let mut frame = ext.make_call_frame()?;

    let a = DenseBuffer::from_f32([2, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let b = DenseBuffer::from_f32([2, 2], &[5.0, 6.0, 7.0, 8.0])?;
    let mut out = vec![f32_out([2, 2])];

    let err = frame.call(&[&a], &mut out).unwrap_err();
    assert!(matches!(
        err,
        FrameError::InputArity {
            expected: 2,
            got: 1
        }
    ));

    let wrong = DenseBuffer::from_f64([2, 2], &[0.0; 4])?;
    let err = frame.call(&[&a, &wrong], &mut out).unwrap_err();
    assert!(matches!(err, FrameError::InputType { index: 1, .. }));

    let err = frame.call(&[&a, &b], &mut []).unwrap_err();
    assert!(matches!(
        err,
        FrameError::OutputArity {
            expected: 1,
            got: 0
        }
    ));

    let mut bad_shape = vec![f32_out([4])];
    let err = frame.call(&[&a, &b], &mut bad_shape).unwrap_err();
    assert!(matches!(err, FrameError::OutputType { index: 0, .. }));

    frame.call(&[&a, &b], &mut out)?;
    assert_eq!(out[0].f32_values(), vec![6.0, 14.0, 24.0, 35.0]);
    Ok(())
}
