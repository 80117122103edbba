//! Statistics Module
//! =================
//!
//! Small numeric helpers shared by the tracker and the detector:
//! - **Moments**: mean, population standard deviation, relative spread
//! - **Standardization**: zero-mean / unit-variance scaling per axis
//! - **DBSCAN**: density-based clustering on standardized points
//!
//! All standard deviations are population (ddof = 0) figures.

use nalgebra::DVector;

// =============================================================================
// MOMENTS
// =============================================================================

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` for an empty slice.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Relative standard deviation `std / |mean|`.
///
/// A zero mean yields `Some(0.0)` when every value is identical and `None`
/// otherwise (the ratio is undefined).
pub fn relative_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let s = std_dev(values)?;
    if m.abs() < f64::EPSILON {
        return if s < f64::EPSILON { Some(0.0) } else { None };
    }
    Some(s / m.abs())
}

// =============================================================================
// STANDARDIZATION
// =============================================================================

/// Scale every axis to zero mean and unit variance.
///
/// Constant axes are only centred, so identical points stay identical
/// instead of turning into NaN.
pub fn standardize(points: &[DVector<f64>]) -> Vec<DVector<f64>> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let n = points.len() as f64;

    let mut centroid = DVector::zeros(dim);
    for p in points {
        centroid += p;
    }
    centroid /= n;

    let mut scale = DVector::zeros(dim);
    for p in points {
        let d = p - &centroid;
        scale += d.component_mul(&d);
    }
    let scale = scale.map(|v| {
        let s = (v / n).sqrt();
        if s < f64::EPSILON { 1.0 } else { s }
    });

    points
        .iter()
        .map(|p| (p - &centroid).component_div(&scale))
        .collect()
}

// =============================================================================
// DBSCAN
// =============================================================================

/// Density-based clustering.
///
/// Two points are neighbours when their euclidean distance is at most `eps`.
/// A point with at least `min_points` neighbours (itself included) is a core
/// point; clusters grow from core points and absorb reachable border points.
///
/// Returns one label per input point: `Some(cluster)` or `None` for noise.
/// Cluster indices are dense and ordered by first appearance.
pub fn dbscan(points: &[DVector<f64>], eps: f64, min_points: usize) -> Vec<Option<usize>> {
    let n = points.len();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0;

    let neighbours = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| (&points[i] - &points[j]).norm() <= eps)
            .collect()
    };

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let seeds = neighbours(i);
        if seeds.len() < min_points {
            // Noise for now; may still be claimed as a border point later
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut queue = seeds;
        let mut k = 0;
        while k < queue.len() {
            let j = queue[k];
            k += 1;

            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;

            let expansion = neighbours(j);
            if expansion.len() >= min_points {
                queue.extend(expansion);
            }
        }
    }

    labels
}

/// Group point indices by cluster label, dropping noise.
pub fn cluster_members(labels: &[Option<usize>]) -> Vec<Vec<usize>> {
    let count = labels.iter().flatten().max().map_or(0, |m| m + 1);
    let mut clusters = vec![Vec::new(); count];
    for (idx, label) in labels.iter().enumerate() {
        if let Some(c) = label {
            clusters[*c].push(idx);
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pts(raw: &[&[f64]]) -> Vec<DVector<f64>> {
        raw.iter().map(|p| DVector::from_column_slice(p)).collect()
    }

    #[test]
    fn test_moments() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&v).unwrap(), 5.0);
        assert_relative_eq!(std_dev(&v).unwrap(), 2.0);
        assert_relative_eq!(relative_std(&v).unwrap(), 0.4);
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_relative_std_zero_mean() {
        assert_eq!(relative_std(&[0.0, 0.0, 0.0]), Some(0.0));
        assert_eq!(relative_std(&[-1.0, 1.0]), None);
    }

    #[test]
    fn test_standardize_constant_axis() {
        let scaled = standardize(&pts(&[&[1.0, 5.0], &[3.0, 5.0]]));
        assert_relative_eq!(scaled[0][0], -1.0);
        assert_relative_eq!(scaled[1][0], 1.0);
        assert_relative_eq!(scaled[0][1], 0.0);
        assert_relative_eq!(scaled[1][1], 0.0);
    }

    #[test]
    fn test_dbscan_two_clusters_and_noise() {
        let points = pts(&[
            &[0.0], &[0.1], &[0.2],
            &[5.0], &[5.1], &[5.2],
            &[20.0],
        ]);
        let labels = dbscan(&points, 0.5, 3);
        assert_eq!(labels[0], Some(0));
        assert_eq!(labels[2], Some(0));
        assert_eq!(labels[3], Some(1));
        assert_eq!(labels[6], None);

        let members = cluster_members(&labels);
        assert_eq!(members, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_dbscan_border_point_joins() {
        // 0.9 is only within eps of 0.5 (a core point), not a core point itself
        let points = pts(&[&[0.0], &[0.25], &[0.5], &[0.9]]);
        let labels = dbscan(&points, 0.45, 3);
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(0)]);
    }

    #[test]
    fn test_dbscan_sparse_is_all_noise() {
        let points = pts(&[&[0.0], &[10.0], &[20.0]]);
        assert!(dbscan(&points, 0.5, 2).iter().all(Option::is_none));
    }
}
