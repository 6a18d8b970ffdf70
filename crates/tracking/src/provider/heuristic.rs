//! Offline waypoint ordering.
//!
//! Nearest neighbour from the origin followed by 2-opt improvement against
//! the fixed destination. Leg durations are straight-line estimates at a
//! constant speed, so ETAs from this provider ignore traffic entirely.

use std::future::Future;
use std::pin::Pin;

use geo::Point;

use crate::models::types::Result;
use crate::network::traits::{MappingProvider, WaypointOrder};
use crate::spatial::{estimate_travel_seconds, haversine_distance};

const TWO_OPT_MAX_PASSES: usize = 64;
const IMPROVEMENT_EPSILON_M: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct HeuristicProvider {
    speed_kmh: f64,
}

impl HeuristicProvider {
    /// Urban average used when no live timing is available
    pub const DEFAULT_SPEED_KMH: f64 = 30.0;

    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Order the waypoints and estimate legs without any network access.
    pub fn plan(&self, origin: Point, destination: Point, interior: &[Point]) -> WaypointOrder {
        let ordered_indices = nearest_neighbor_two_opt(origin, destination, interior);

        let mut path = Vec::with_capacity(interior.len() + 2);
        path.push(origin);
        path.extend(ordered_indices.iter().map(|&i| interior[i]));
        path.push(destination);

        let leg_distances: Vec<f64> = path
            .windows(2)
            .map(|leg| haversine_distance(leg[0], leg[1]))
            .collect();

        WaypointOrder {
            ordered_indices,
            leg_durations_seconds: leg_distances
                .iter()
                .map(|&d| estimate_travel_seconds(d, self.speed_kmh).round() as u32)
                .collect(),
            total_distance_meters: Some(leg_distances.iter().sum()),
            used_live_traffic: false,
            polyline: None,
        }
    }
}

impl Default for HeuristicProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SPEED_KMH)
    }
}

impl MappingProvider for HeuristicProvider {
    fn optimize_waypoints<'a>(
        &'a self,
        origin: Point,
        destination: Point,
        interior: &'a [Point],
    ) -> Pin<Box<dyn Future<Output = Result<WaypointOrder>> + Send + 'a>> {
        Box::pin(async move {
            if interior.is_empty() {
                return Ok(WaypointOrder::identity(0));
            }
            Ok(self.plan(origin, destination, interior))
        })
    }
}

/// Visiting order of `interior` between fixed endpoints, as input indices.
pub fn nearest_neighbor_two_opt(origin: Point, destination: Point, interior: &[Point]) -> Vec<usize> {
    let n = interior.len();
    if n < 2 {
        return (0..n).collect();
    }

    // Nearest neighbour
    let mut order = Vec::with_capacity(n);
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut current = origin;
    while !remaining.is_empty() {
        let (pos, _) = remaining
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (pos, haversine_distance(current, interior[idx])))
            .fold((0, f64::INFINITY), |best, candidate| {
                if candidate.1 < best.1 { candidate } else { best }
            });
        let next = remaining.remove(pos);
        current = interior[next];
        order.push(next);
    }

    // 2-opt over interior positions; path[0] and path[n + 1] stay fixed
    let mut path: Vec<Point> = Vec::with_capacity(n + 2);
    path.push(origin);
    path.extend(order.iter().map(|&i| interior[i]));
    path.push(destination);

    for _ in 0..TWO_OPT_MAX_PASSES {
        let mut improved = false;
        for i in 1..n {
            for j in (i + 1)..=n {
                let before = haversine_distance(path[i - 1], path[i])
                    + haversine_distance(path[j], path[j + 1]);
                let after = haversine_distance(path[i - 1], path[j])
                    + haversine_distance(path[i], path[j + 1]);

                if after + IMPROVEMENT_EPSILON_M < before {
                    path[i..=j].reverse();
                    order[i - 1..j].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    fn path_length(origin: Point, destination: Point, interior: &[Point], order: &[usize]) -> f64 {
        let mut path = vec![origin];
        path.extend(order.iter().map(|&i| interior[i]));
        path.push(destination);
        path.windows(2).map(|l| haversine_distance(l[0], l[1])).sum()
    }

    #[test]
    fn test_orders_points_along_a_line() {
        let origin = Point::new(0.0, 0.0);
        let destination = Point::new(0.05, 0.0);
        let interior = vec![
            Point::new(0.04, 0.0),
            Point::new(0.01, 0.0),
            Point::new(0.03, 0.0),
            Point::new(0.02, 0.0),
        ];

        let order = nearest_neighbor_two_opt(origin, destination, &interior);
        assert_eq!(order, vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_two_opt_never_worse_than_input_order() {
        let origin = Point::new(0.0, 0.0);
        let destination = Point::new(0.0, 0.001);
        let interior = vec![
            Point::new(0.02, 0.02),
            Point::new(-0.01, 0.015),
            Point::new(0.015, -0.01),
            Point::new(-0.02, -0.02),
            Point::new(0.005, 0.03),
        ];

        let order = nearest_neighbor_two_opt(origin, destination, &interior);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

        let identity: Vec<usize> = (0..interior.len()).collect();
        assert!(
            path_length(origin, destination, &interior, &order)
                <= path_length(origin, destination, &interior, &identity) + 1e-6
        );
    }

    #[test]
    fn test_plan_estimates_every_leg() {
        let provider = HeuristicProvider::default();
        let origin = Point::new(0.0, 0.0);
        let destination = Point::new(0.02, 0.0);
        let interior = vec![Point::new(0.01, 0.0)];

        let order = provider.plan(origin, destination, &interior);
        assert_eq!(order.ordered_indices, vec![0]);
        assert_eq!(order.leg_durations_seconds.len(), 2);
        // ~1112 m at 30 km/h
        assert_eq!(order.leg_durations_seconds[0], 133);
        assert!(order.is_consistent_with(1));
    }

    #[test]
    fn test_no_interior_is_identity() {
        let provider = HeuristicProvider::default();
        let order = provider
            .optimize_waypoints(Point::new(0.0, 0.0), Point::new(0.01, 0.0), &[])
            .now_or_never()
            .unwrap()
            .unwrap();
        assert_eq!(order, WaypointOrder::identity(0));
    }
}
