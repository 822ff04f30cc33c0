use indexmap::IndexMap;
use nalgebra::DMatrix;

use crate::error::{LmmError, Result};

use super::{BlockShape, Lambda, ReMat};

/// Merge random-effects terms that share a grouping factor.
///
/// Terms are grouped by factor name. A factor that appears once passes
/// through unchanged; `k > 1` terms on one factor become a single block
/// whose raw and weighted design rows and column names are stacked in term
/// order. The merged block keeps its own weighted design when any term had
/// weights applied.
/// The merged λ is free only inside each original term's diagonal block;
/// it is stored as `Diagonal` when that leaves only diagonal positions and
/// as `LowerTriangular` otherwise, starting from the identity.
///
/// The output follows the order in which each factor first appears.
pub fn amalgamate(terms: Vec<ReMat>) -> Result<Vec<ReMat>> {
    let mut groups: IndexMap<String, Vec<ReMat>> = IndexMap::new();
    for term in terms {
        groups.entry(term.fname().to_string()).or_default().push(term);
    }

    let mut merged = Vec::with_capacity(groups.len());
    for (fname, mut group) in groups {
        if group.len() == 1 {
            merged.extend(group.pop());
        } else {
            merged.push(merge_group(&fname, group)?);
        }
    }
    Ok(merged)
}

fn merge_group(fname: &str, group: Vec<ReMat>) -> Result<ReMat> {
    if group.iter().any(|t| t.shape() == BlockShape::Flexible) {
        return Err(LmmError::ModelSpec(format!(
            "flexible block on '{}' cannot be merged with other terms",
            fname
        )));
    }
    let first_codes = group[0].codes().to_vec();
    for term in &group[1..] {
        if term.nobs() != first_codes.len() {
            return Err(LmmError::dim(first_codes.len(), term.nobs(), format!("observations of terms on '{}'", fname)));
        }
        if term.codes() != first_codes.as_slice() || term.nlevs() != group[0].nlevs() {
            return Err(LmmError::Data(format!(
                "terms on '{}' do not share the same level references",
                fname
            )));
        }
    }

    log::debug!("merging {} random-effects terms on '{}'", group.len(), fname);

    let s_total: usize = group.iter().map(|t| t.vsize()).sum();
    let n = first_codes.len();
    let mut z = DMatrix::zeros(s_total, n);
    let mut wtz = DMatrix::zeros(s_total, n);
    let mut weighted = false;
    let mut cnames = Vec::with_capacity(s_total);
    let mut pattern = DMatrix::from_element(s_total, s_total, false);
    let mut factor = None;

    let mut offset = 0;
    for term in group {
        let (f, names, tz, tw, ind) = term.into_parts();
        let s = tz.nrows();
        z.rows_mut(offset, s).copy_from(&tz);
        wtz.rows_mut(offset, s).copy_from(tw.resolve(&tz));
        weighted |= !tw.is_shared();
        pattern.view_mut((offset, offset), (s, s)).copy_from(&ind);
        cnames.extend(names);
        factor.get_or_insert(f);
        offset += s;
    }
    for i in 0..s_total {
        pattern[(i, i)] = true;
    }

    let inds: Vec<usize> = pattern
        .iter()
        .enumerate()
        .filter_map(|(k, &free)| free.then_some(k))
        .collect();
    let diagonal_only = inds.iter().all(|&k| k % s_total == k / s_total);
    let lambda = if diagonal_only {
        Lambda::identity_diagonal(s_total)
    } else {
        Lambda::identity_lower(s_total)
    };

    let factor = factor.ok_or_else(|| LmmError::ModelSpec(format!("no terms on '{}'", fname)))?;
    let merged = ReMat::new(factor, cnames, z, lambda, inds)?;
    if weighted {
        merged.with_weighted(wtz)
    } else {
        Ok(merged)
    }
}
