use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strided_store::{
    classify_contiguity, default_strides, dtypes, ArrayView, Chunk, Order, Resolved,
    StridedError, Value,
};

fn make_tensor(shape: &[usize], order: Order) -> ArrayView {
    ArrayView::from_fn(shape, dtypes::float64(), order, |idx| {
        Value::Float(idx.iter().zip(shape).fold(0, |acc, (&i, &d)| acc * d + i) as f64)
    })
    .unwrap()
}

fn as_view(r: Resolved) -> ArrayView {
    match r {
        Resolved::View(v) => v,
        Resolved::Offset(o) => panic!("expected a view, got offset {o}"),
    }
}

fn floats(a: &ArrayView) -> Vec<f64> {
    a.to_vec()
        .unwrap()
        .into_iter()
        .map(|v| v.as_f64().unwrap())
        .collect()
}

#[test]
fn test_default_strides_contiguous_in_own_order() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let rank = rng.gen_range(0..6);
        let shape: Vec<usize> = (0..rank).map(|_| rng.gen_range(0..6)).collect();
        for order in [Order::C, Order::F] {
            let (s, _) = default_strides(&shape, 8, order);
            let c = classify_contiguity(&shape, &s, 8);
            match order {
                Order::C => assert!(c.is_c(), "{shape:?}"),
                Order::F => assert!(c.is_f(), "{shape:?}"),
            }
        }
    }
}

#[test]
fn test_full_slice_round_trip() {
    let a = make_tensor(&[3, 4, 5], Order::C);
    let t = a.swap_axes(0, 2).unwrap();
    for v in [&a, &t] {
        let full = vec![Chunk::full(); v.ndim()];
        let s = as_view(v.resolve(&full).unwrap());
        assert_eq!(s.shape(), v.shape());
        assert_eq!(s.strides(), v.strides());
        assert_eq!(s.backstrides(), v.backstrides());
        assert_eq!(s.start(), v.start());
    }
}

#[test]
fn test_transpose_self_inverse() {
    let a = make_tensor(&[2, 3, 4], Order::F);
    let s = as_view(
        a.resolve(&[
            Chunk::full(),
            Chunk::Slice { start: None, stop: None, step: -1 },
            Chunk::range(1, 4),
        ])
        .unwrap(),
    );
    for v in [&a, &s] {
        let tt = v.transpose().unwrap().transpose().unwrap();
        assert_eq!(tt.shape(), v.shape());
        assert_eq!(tt.strides(), v.strides());
        assert_eq!(tt.backstrides(), v.backstrides());
        assert_eq!(tt.start(), v.start());
        assert_eq!(floats(&tt), floats(v));
    }
}

#[test]
fn test_write_through_slice_visible_in_base() {
    let a = make_tensor(&[4, 6], Order::C);
    let s = as_view(
        a.resolve(&[
            Chunk::Slice { start: Some(1), stop: None, step: 2 },
            Chunk::Slice { start: Some(-1), stop: None, step: -3 },
        ])
        .unwrap(),
    );
    assert_eq!(s.shape(), &[2, 2]);
    // s[1, 1] is a[3, 2]
    s.set_at(&[1, 1], &Value::Float(-7.5)).unwrap();
    let offset = s.lookup(&[1, 1]).unwrap();
    assert_eq!(offset, a.lookup(&[3, 2]).unwrap());
    assert_eq!(a.get_element(offset).unwrap(), Value::Float(-7.5));
    assert_eq!(a.get_at(&[3, 2]).unwrap(), Value::Float(-7.5));

    // and through a slice of a slice
    let inner = as_view(s.resolve(&[Chunk::Index(0)]).unwrap());
    assert!(ArrayView::ptr_eq(inner.base().unwrap(), &a));
    inner.set_at(&[0], &Value::Float(100.0)).unwrap();
    assert_eq!(a.get_at(&[1, 5]).unwrap(), Value::Float(100.0));
}

#[test]
fn test_iterator_row_major_and_restartable() {
    let a = make_tensor(&[2, 3], Order::C);
    let (it, state) = a.create_iter(None, false).unwrap();
    let first: Vec<usize> = it.offsets().collect();
    assert_eq!(first, vec![0, 8, 16, 24, 32, 40]);

    let mut manual = Vec::new();
    let mut st = state.clone();
    while !it.done(&st) {
        manual.push(st.offset);
        it.next(&mut st);
    }
    assert_eq!(manual, first);
    let second: Vec<usize> = it.offsets().collect();
    assert_eq!(second, first);
    assert_eq!(it.reset(), state);
}

#[test]
fn test_broadcast_iteration() {
    let row = make_tensor(&[3], Order::C);
    let (it, _) = row.create_iter(Some(&[4, 3]), false).unwrap();
    let got: Vec<usize> = it.offsets().collect();
    assert_eq!(got.len(), 12);
    assert_eq!(got, [0, 8, 16].repeat(4));

    let col = make_tensor(&[4, 1], Order::C);
    let (it, _) = col.create_iter(Some(&[4, 3]), false).unwrap();
    let got: Vec<usize> = it.offsets().collect();
    let expected: Vec<usize> = (0..4).flat_map(|r| [r * 8; 3]).collect();
    assert_eq!(got, expected);

    let bad = make_tensor(&[2], Order::C);
    assert!(matches!(
        bad.create_iter(Some(&[4, 3]), false),
        Err(StridedError::ShapeMismatch(_, _))
    ));
}

#[test]
fn test_index_bounds() {
    let a = make_tensor(&[5], Order::C);
    assert!(matches!(
        a.resolve(&[Chunk::Index(5)]),
        Err(StridedError::IndexOutOfBounds { axis: 0, index: 5, extent: 5 })
    ));
    assert!(matches!(
        a.resolve(&[Chunk::Index(-6)]),
        Err(StridedError::IndexOutOfBounds { axis: 0, index: -6, extent: 5 })
    ));
    match a.resolve(&[Chunk::Index(-1)]).unwrap() {
        Resolved::Offset(o) => assert_eq!(a.get_element(o).unwrap(), Value::Float(4.0)),
        Resolved::View(v) => panic!("expected an offset, got {v:?}"),
    }
}

#[test]
fn test_reshape_view_or_copy() {
    let a = make_tensor(&[2, 3, 4], Order::C);
    let r = a.reshape(&[6, 4]).unwrap();
    assert!(r.shares_storage(&a));
    assert_eq!(r.strides(), &[32, 8]);
    assert_eq!(floats(&r), floats(&a));

    let t = a.transpose().unwrap();
    assert!(matches!(
        t.reshape(&[6, 4]),
        Err(StridedError::IncompatibleReshape { .. })
    ));
    let c = t.reshape_or_copy(&[6, 4]).unwrap();
    assert!(!c.shares_storage(&a));
    assert_eq!(floats(&c), floats(&t));
}

#[test]
fn test_setslice_random_views() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        let rows = rng.gen_range(1..6);
        let cols = rng.gen_range(1..6);
        let a = make_tensor(&[rows, cols], Order::C);
        let b = ArrayView::zeros(&[cols, rows], dtypes::float64(), Order::F).unwrap();
        b.setslice(&a.transpose().unwrap()).unwrap();
        for i in 0..cols {
            for j in 0..rows {
                let got = b.get_at(&[i as isize, j as isize]).unwrap().as_f64().unwrap();
                let expected = a.get_at(&[j as isize, i as isize]).unwrap().as_f64().unwrap();
                assert_relative_eq!(got, expected, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_astype_round_values() {
    let a = make_tensor(&[3, 2], Order::C);
    let i = a.astype(dtypes::int16()).unwrap();
    let back = i.astype(dtypes::float32()).unwrap();
    for (x, y) in floats(&back).iter().zip(floats(&a)) {
        assert_relative_eq!(*x, y);
    }
}
