//! Algebraic properties of random-effects blocks on randomly generated
//! designs.

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use remat_core::data::GroupingFactor;
use remat_core::matrix::{BlockMatrix, UniformBlockDiagonal};
use remat_core::remat::{
    amalgamate, copy_scale_inflate, crossprod, is_nested, Lambda, ReMat, ReMatBuilder,
};
use remat_core::LmmError;

fn random_factor(rng: &mut StdRng, name: &str, n: usize, nlevels: usize) -> GroupingFactor {
    let labels: Vec<String> = (0..n)
        .map(|_| format!("{}{}", name, rng.gen_range(0..nlevels)))
        .collect();
    let refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
    GroupingFactor::new(name, &refs)
}

fn random_covariate(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect()
}

fn assert_close(a: &DMatrix<f64>, b: &DMatrix<f64>) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-10);
    }
}

#[test]
fn test_self_product_matches_general_path() {
    let mut rng = StdRng::seed_from_u64(42);
    let n = 60;

    let factor = random_factor(&mut rng, "subj", n, 7);
    let scalar = ReMatBuilder::new().factor(factor.clone()).intercept().build().unwrap();
    let fast = crossprod(&scalar, &scalar).unwrap();
    assert!(matches!(fast, BlockMatrix::Diagonal(_)));
    let general = crossprod(&scalar, &scalar.clone()).unwrap();
    assert_close(&fast.to_dense(), &general.to_dense());

    let x = random_covariate(&mut rng, n);
    let x2 = random_covariate(&mut rng, n);
    let vector = ReMatBuilder::new()
        .factor(factor)
        .intercept()
        .covariate("x", &x)
        .covariate("x2", &x2)
        .build()
        .unwrap();
    let fast = crossprod(&vector, &vector).unwrap();
    assert!(matches!(fast, BlockMatrix::UniformBlockDiagonal(_)));
    let general = crossprod(&vector, &vector.clone()).unwrap();
    assert_close(&fast.to_dense(), &general.to_dense());

    let zd = vector.to_dense();
    assert_close(&fast.to_dense(), &(zd.transpose() * &zd));
}

#[test]
fn test_amalgamated_product_is_sum_of_term_products() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 40;
    let subj = random_factor(&mut rng, "subj", n, 5);
    let item = random_factor(&mut rng, "item", n, 4);
    let x = random_covariate(&mut rng, n);

    let t1 = ReMatBuilder::new().factor(subj.clone()).intercept().build().unwrap();
    let t2 = ReMatBuilder::new().factor(subj).covariate("x", &x).build().unwrap();
    let other = ReMatBuilder::new().factor(item).intercept().build().unwrap();

    let parts = [
        crossprod(&t1, &other).unwrap().to_dense(),
        crossprod(&t2, &other).unwrap().to_dense(),
    ];
    let merged = amalgamate(vec![t1, t2, other.clone()]).unwrap();
    assert_eq!(merged.len(), 2);
    let m = &merged[0];
    let total = m.vsize();
    assert_eq!(total, 2);

    // embed each term's rows at its offset inside the merged per-level block
    let mut sum = DMatrix::zeros(m.ncols(), other.ncols());
    for (offset, part) in parts.iter().enumerate() {
        for r in 0..m.nlevs() {
            sum.row_mut(r * total + offset).copy_from(&part.row(r));
        }
    }
    assert_close(&crossprod(m, &other).unwrap().to_dense(), &sum);
}

#[test]
fn test_inflate_with_identity_twice_is_a_plus_i() {
    let mut rng = StdRng::seed_from_u64(3);
    let n = 30;
    let factor = random_factor(&mut rng, "g", n, 6);
    let x = random_covariate(&mut rng, n);

    let scalar = ReMatBuilder::new().factor(factor.clone()).intercept().build().unwrap();
    let a = crossprod(&scalar, &scalar).unwrap();
    let mut l = a.clone();
    copy_scale_inflate(&mut l, &a, &scalar).unwrap();
    copy_scale_inflate(&mut l, &a, &scalar).unwrap();
    let q = scalar.ncols();
    assert_eq!(l.to_dense(), a.to_dense() + DMatrix::identity(q, q));

    let vector = ReMatBuilder::new()
        .factor(factor)
        .intercept()
        .covariate("x", &x)
        .build()
        .unwrap();
    let a = crossprod(&vector, &vector).unwrap();
    let q = vector.ncols();
    let mut l = BlockMatrix::UniformBlockDiagonal(UniformBlockDiagonal::zeros(2, vector.nlevs()));
    copy_scale_inflate(&mut l, &a, &vector).unwrap();
    copy_scale_inflate(&mut l, &a, &vector).unwrap();
    assert_eq!(l.to_dense(), a.to_dense() + DMatrix::identity(q, q));
}

#[test]
fn test_theta_roundtrip_and_bounds() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 20;
    let factor = random_factor(&mut rng, "g", n, 4);
    let x = random_covariate(&mut rng, n);
    let x2 = random_covariate(&mut rng, n);
    let mut re = ReMatBuilder::new()
        .factor(factor)
        .intercept()
        .covariate("x", &x)
        .covariate("x2", &x2)
        .build()
        .unwrap();

    for _ in 0..5 {
        let theta: Vec<f64> = (0..re.n_theta()).map(|_| rng.gen_range(-1.0..3.0)).collect();
        re.set_theta(&theta).unwrap();
        let before = re.lambda().clone();
        let again = re.theta();
        assert_eq!(again, theta);
        re.set_theta(&again).unwrap();
        assert_eq!(re.lambda(), &before);
    }

    let k = re.lambda().dim();
    for (&ind, &bound) in re.inds().iter().zip(&re.lower_bounds()) {
        if ind % k == ind / k {
            assert_eq!(bound, 0.0);
        } else {
            assert_eq!(bound, f64::NEG_INFINITY);
        }
    }

    assert!(matches!(
        re.set_theta(&[1.0; 2]),
        Err(LmmError::ParameterLength { expected: 6, got: 2 })
    ));
}

#[test]
fn test_weighting_shares_until_weighted() {
    let mut rng = StdRng::seed_from_u64(5);
    let n = 12;
    let factor = random_factor(&mut rng, "g", n, 3);
    let x = random_covariate(&mut rng, n);
    let mut re = ReMatBuilder::new()
        .factor(factor)
        .intercept()
        .covariate("x", &x)
        .build()
        .unwrap();

    re.reweight(&[]).unwrap();
    assert!(std::ptr::eq(re.wtz(), re.z()));

    let sqrtwts: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..2.0)).collect();
    re.reweight(&sqrtwts).unwrap();
    assert!(!std::ptr::eq(re.wtz(), re.z()));
    for i in 0..n {
        for k in 0..2 {
            assert_eq!(re.wtz()[(k, i)], re.z()[(k, i)] * sqrtwts[i]);
        }
    }

    // the weighted cross product is Z' W Z
    let w = DMatrix::from_diagonal(&DVector::from_iterator(n, sqrtwts.iter().map(|s| s * s)));
    let unweighted = {
        let mut raw = re.to_dense();
        for (i, mut row) in raw.row_iter_mut().enumerate() {
            row /= sqrtwts[i];
        }
        raw
    };
    let expected = unweighted.transpose() * w * &unweighted;
    assert_close(&crossprod(&re, &re).unwrap().to_dense(), &expected);

    assert!(matches!(
        re.reweight(&[1.0]),
        Err(LmmError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_intercept_scenario() {
    let g = GroupingFactor::from_refs("g", vec!["1".into(), "2".into()], &[1, 1, 2]).unwrap();
    let re = ReMat::new(
        g,
        vec!["(Intercept)".into()],
        DMatrix::from_element(1, 3, 1.0),
        Lambda::LowerTriangular(DMatrix::from_element(1, 1, 2.0)),
        vec![0],
    )
    .unwrap();

    let a = crossprod(&re, &re).unwrap();
    assert_eq!(a.to_dense(), DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 1.0])));

    let mut l = a.clone();
    copy_scale_inflate(&mut l, &a, &re).unwrap();
    assert_eq!(l.to_dense(), DMatrix::from_diagonal(&DVector::from_vec(vec![9.0, 5.0])));
}

#[test]
fn test_out_of_range_refs_are_rejected() {
    let err = GroupingFactor::from_refs("g", vec!["1".into(), "2".into()], &[1, 3, 2]).unwrap_err();
    assert!(matches!(
        err,
        LmmError::InvalidLevelRef {
            index: 1,
            value: 3,
            nlevels: 2
        }
    ));
    assert!(GroupingFactor::from_refs("g", vec!["1".into()], &[0]).is_err());
}

#[test]
fn test_nesting_single_counterexample() {
    let intercept = |g: GroupingFactor| ReMatBuilder::new().factor(g).intercept().build().unwrap();
    let plot = intercept(GroupingFactor::new("plot", &["p1", "p1", "p2", "p2", "p3", "p3"]));
    let block = intercept(GroupingFactor::new("block", &["b1", "b1", "b1", "b1", "b2", "b2"]));
    assert!(is_nested(&plot, &block).unwrap());

    let broken = intercept(GroupingFactor::new("block", &["b1", "b1", "b1", "b2", "b2", "b2"]));
    assert!(!is_nested(&plot, &broken).unwrap());
}
