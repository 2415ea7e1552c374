//! Endpoint selection policies

use serde::{Deserialize, Serialize};

/// How the dispatcher picks an endpoint within a request class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Walk the endpoint list in order, wrapping around
    #[default]
    RoundRobin,
    /// Pick the endpoint with the fewest selections so far, lowest index on ties
    LeastLoaded,
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::RoundRobin => write!(f, "round-robin"),
            SelectionPolicy::LeastLoaded => write!(f, "least-loaded"),
        }
    }
}

/// Pick the next endpoint index and update the rotation state.
///
/// `next` is the round-robin cursor and `loads` holds one selection counter per
/// endpoint; both are updated for either policy so the counters double as
/// diagnostics. `loads` must be non-empty.
pub(crate) fn choose(policy: SelectionPolicy, next: &mut usize, loads: &mut [u64]) -> usize {
    let index = match policy {
        SelectionPolicy::RoundRobin => {
            let index = *next % loads.len();
            *next = (index + 1) % loads.len();
            index
        }
        SelectionPolicy::LeastLoaded => loads
            .iter()
            .enumerate()
            .min_by_key(|(_, load)| **load)
            .map(|(index, _)| index)
            .unwrap_or(0),
    };
    loads[index] += 1;
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_wraps() {
        let mut next = 0;
        let mut loads = vec![0; 3];
        let picks: Vec<_> = (0..7)
            .map(|_| choose(SelectionPolicy::RoundRobin, &mut next, &mut loads))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(loads, vec![3, 2, 2]);
    }

    #[test]
    fn test_least_loaded_breaks_ties_by_index() {
        let mut next = 0;
        let mut loads = vec![2, 1, 1];
        assert_eq!(choose(SelectionPolicy::LeastLoaded, &mut next, &mut loads), 1);
        assert_eq!(choose(SelectionPolicy::LeastLoaded, &mut next, &mut loads), 2);
        assert_eq!(choose(SelectionPolicy::LeastLoaded, &mut next, &mut loads), 0);
        assert_eq!(loads, vec![3, 2, 2]);
    }

    #[test]
    fn test_policy_parse() {
        let policy: SelectionPolicy = serde_json::from_str(r#""least-loaded""#).unwrap();
        assert_eq!(policy, SelectionPolicy::LeastLoaded);
        assert_eq!(SelectionPolicy::default().to_string(), "round-robin");
    }
}
