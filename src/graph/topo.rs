//! Topological sort over dependency edges.

use std::collections::{HashMap, HashSet};

use crate::error::CycleError;

use super::Token;

/// Order the nodes of `edges` so every edge `(a, b)` has `a` before `b`.
///
/// Ties are broken first-in first-out: nodes enter the ready queue in the
/// order their last predecessor is released, and initially in order of
/// first appearance in `edges`. A self edge `(a, a)` is a cycle.
pub(crate) fn topsort(edges: &[(Token, Token)]) -> Result<Vec<Token>, CycleError> {
    let mut preds: HashMap<Token, usize> = HashMap::new();
    let mut seen: Vec<Token> = Vec::new();
    let mut successors: HashMap<Token, Vec<Token>> = HashMap::new();

    for &(first, second) in edges {
        for token in [first, second] {
            if !preds.contains_key(&token) {
                preds.insert(token, 0);
                seen.push(token);
            }
        }
        if let Some(count) = preds.get_mut(&second) {
            *count += 1;
        }
        successors.entry(first).or_default().push(second);
    }

    let mut answer: Vec<Token> =
        seen.iter().copied().filter(|t| preds.get(t) == Some(&0)).collect();
    let mut next = 0;
    while next < answer.len() {
        let x = answer[next];
        next += 1;
        for y in successors.remove(&x).unwrap_or_default() {
            if let Some(count) = preds.get_mut(&y) {
                *count -= 1;
                if *count == 0 {
                    answer.push(y);
                }
            }
        }
    }

    if answer.len() < seen.len() {
        let done: HashSet<Token> = answer.into_iter().collect();
        let mut stuck: Vec<(Token, Token)> =
            edges.iter().copied().filter(|(a, b)| !done.contains(a) && !done.contains(b)).collect();
        stuck.dedup();
        return Err(CycleError { edges: stuck });
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        assert_eq!(topsort(&[(0, 3), (0, 7)]).unwrap(), vec![0, 3, 7]);
        assert_eq!(topsort(&[(0, 1), (0, 3), (0, 7), (1, 3)]).unwrap(), vec![0, 1, 7, 3]);
    }

    #[test]
    fn test_empty() {
        assert!(topsort(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_reports_remaining_edges() {
        let err = topsort(&[(0, 1), (1, 2), (2, 1)]).unwrap_err();
        assert_eq!(err.edges, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let err = topsort(&[(0, 0)]).unwrap_err();
        assert_eq!(err.edges, vec![(0, 0)]);
    }
}
