//! End-to-end property and scenario tests over the public API.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use retrograd_core::grad_check::check_operation_gradients;
use retrograd_core::ops::softmax::Softmax;
use retrograd_core::{
    instantiate, DeepMatrix, Gradient, Matrix, OpConfig, OpKind, Operation,
};

/// Random values bounded away from zero, so operations with a kink at the
/// origin stay differentiable at every sampled point.
fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Matrix {
    let data = (0..rows * cols)
        .map(|_| {
            let magnitude = rng.gen_range(0.1..1.5);
            if rng.gen_bool(0.5) {
                magnitude
            } else {
                -magnitude
            }
        })
        .collect();
    Matrix::new(rows, cols, data).unwrap()
}

#[test]
fn test_temperature_softmax_closed_form() {
    let mut op = Softmax::new(1.0);
    let x = Matrix::new(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let y = op.apply(&x).unwrap();

    let z: f64 = [1.0f64, 2.0, 3.0, 4.0].iter().map(|v| v.exp()).sum();
    for (j, &value) in y.data().iter().enumerate() {
        let expected = ((j + 1) as f64).exp() / z;
        assert!((value - expected).abs() < 1e-6);
    }
    assert!(
        y.data().windows(2).all(|w| w[0] < w[1]),
        "softmax of an increasing row must increase"
    );
}

#[test]
fn test_leaky_rectifier_scenario() {
    let mut op = instantiate(
        OpKind::LeakyRelu,
        &OpConfig {
            slope: 0.01,
            ..OpConfig::default()
        },
    );
    let x = Matrix::new(1, 5, vec![-2.0, -1.0, 0.0, 1.0, 2.0]).unwrap();
    let y = op.forward(&[&x]).unwrap();
    assert_eq!(y.data(), &[-0.02, -0.01, 0.0, 1.0, 2.0]);

    let result = op.backward(&Matrix::ones(1, 5)).unwrap();
    let grad = result.input(0).and_then(Gradient::as_matrix).unwrap();
    assert_eq!(grad.data(), &[0.01, 0.01, 1.0, 1.0, 1.0]);
}

#[test]
fn test_deep_stack_unstack_scenario() {
    let originals = vec![
        Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        Matrix::new(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap(),
        Matrix::new(2, 2, vec![-1.0, -2.0, -3.0, -4.0]).unwrap(),
    ];
    let kept: Vec<Vec<f64>> = originals.iter().map(|m| m.data().to_vec()).collect();

    let deep = DeepMatrix::stack(originals).unwrap();
    assert_eq!(deep.depth(), 3);
    let back = deep.unstack();

    for (matrix, expected) in back.iter().zip(&kept) {
        // Bit-identical contents.
        assert!(matrix
            .data()
            .iter()
            .zip(expected)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}

#[test]
fn test_softmax_rows_form_a_simplex() {
    let mut rng = StdRng::seed_from_u64(17);
    for &temperature in &[0.5, 1.0, 3.0] {
        let mut op = Softmax::new(temperature);
        let x = random_matrix(5, 7, &mut rng);
        let y = op.apply(&x).unwrap();
        for row in y.data().chunks(7) {
            assert!(row.iter().all(|&v| v >= 0.0));
            let total: f64 = row.iter().sum();
            // Declared scale: each row sums to exactly 1.
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            for &v in row {
                assert_relative_eq!(v / total, v, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_elementwise_operations_preserve_shape() {
    let mut rng = StdRng::seed_from_u64(23);
    let config = OpConfig {
        seed: Some(9),
        ..OpConfig::default()
    };
    let kinds = [
        OpKind::LeakyRelu,
        OpKind::Elu,
        OpKind::Sigmoid,
        OpKind::Tanh,
        OpKind::Softplus,
        OpKind::Swish,
        OpKind::Softmax,
        OpKind::GaussianNoise,
    ];
    for kind in kinds {
        let x = random_matrix(3, 5, &mut rng);
        let mut op = instantiate(kind, &config);
        let y = op.forward(&[&x]).unwrap();
        assert_eq!((y.rows(), y.cols()), (3, 5), "{kind:?}");
    }
}

#[test]
fn test_reductions_drop_rank_as_declared() {
    let m = Matrix::new(3, 4, (0..12).map(|i| i as f64).collect()).unwrap();
    // Fully-reduced: a scalar.
    let _: f64 = m.sum();
    let _: f64 = m.mean();
    let _: f64 = m.frobenius_norm();
    // One reduced axis: rank drops by one (a vector-shaped matrix).
    assert_eq!((m.column_sums().rows(), m.column_sums().cols()), (1, 4));
    assert_eq!((m.row_sums().rows(), m.row_sums().cols()), (3, 1));
}

#[test]
fn test_gradient_property_across_the_library() {
    let mut rng = StdRng::seed_from_u64(31);
    let config = OpConfig {
        slope: 0.1,
        alpha: 0.8,
        beta: 1.2,
        temperature: 1.5,
        ..OpConfig::default()
    };
    let unary = [
        OpKind::LeakyRelu,
        OpKind::Elu,
        OpKind::Sigmoid,
        OpKind::Tanh,
        OpKind::Softplus,
        OpKind::Swish,
        OpKind::Softmax,
    ];
    for kind in unary {
        let x = random_matrix(3, 4, &mut rng);
        let upstream = random_matrix(3, 4, &mut rng);
        let mut op = instantiate(kind, &config);
        check_operation_gradients(op.as_mut(), &[&x], &upstream, 1e-6, 1e-3)
            .unwrap_or_else(|e| panic!("{kind:?}: {e}"));
    }

    // Two-operand members.
    let a = random_matrix(3, 3, &mut rng);
    let b = random_matrix(3, 3, &mut rng);
    let upstream = random_matrix(3, 3, &mut rng);
    let mut matmul = instantiate(OpKind::MatMul, &config);
    check_operation_gradients(matmul.as_mut(), &[&a, &b], &upstream, 1e-6, 1e-3).unwrap();
}
