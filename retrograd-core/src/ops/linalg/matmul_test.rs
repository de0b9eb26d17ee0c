use super::*;
use crate::grad_check::check_operation_gradients;
use crate::result::Gradient;

#[test]
fn test_forward_shape_rule() {
    let mut op = MatMul::new();
    let a = Matrix::new(2, 3, vec![1.0; 6]).unwrap();
    let b = Matrix::new(3, 4, vec![1.0; 12]).unwrap();
    let c = op.forward(&[&a, &b]).unwrap();
    assert_eq!(c.rows(), 2);
    assert_eq!(c.cols(), 4);

    let bad = Matrix::new(2, 4, vec![1.0; 8]).unwrap();
    assert!(matches!(
        op.forward(&[&a, &bad]),
        Err(GradError::IncompatibleShapes { .. })
    ));
}

#[test]
fn test_backward_produces_both_operand_gradients() {
    let mut op = MatMul::new();
    let a = Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let b = Matrix::new(3, 2, vec![0.5, -1.0, 1.5, 2.0, -0.5, 1.0]).unwrap();
    op.forward(&[&a, &b]).unwrap();

    let result = op.backward(&Matrix::ones(2, 2)).unwrap();
    assert_eq!(result.input_count(), 2);
    let da = result.input(0).and_then(Gradient::as_matrix).unwrap();
    let db = result.input(1).and_then(Gradient::as_matrix).unwrap();
    assert_eq!((da.rows(), da.cols()), (2, 3));
    assert_eq!((db.rows(), db.cols()), (3, 2));
}

#[test]
fn test_upstream_shape_checked() {
    let mut op = MatMul::new();
    let a = Matrix::zeros(2, 3);
    let b = Matrix::zeros(3, 2);
    op.forward(&[&a, &b]).unwrap();
    assert!(matches!(
        op.backward(&Matrix::zeros(3, 2)),
        Err(GradError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_gradients_match_finite_differences() {
    let mut op = MatMul::new();
    let a = Matrix::new(2, 3, vec![0.4, -1.1, 0.7, 1.3, -0.2, 0.9]).unwrap();
    let b = Matrix::new(3, 2, vec![0.5, -1.0, 1.5, 2.0, -0.5, 1.0]).unwrap();
    let upstream = Matrix::new(2, 2, vec![1.0, -0.5, 0.7, 0.2]).unwrap();
    check_operation_gradients(&mut op, &[&a, &b], &upstream, 1e-6, 1e-3).unwrap();
}
