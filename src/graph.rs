//! Index-based graph algorithms shared by the shader graph builder.
//!
//! Nodes are `0..n`; an edge `(from, to)` means `to` consumes `from`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Deterministic Kahn sort: among ready nodes the lowest index goes first, so
/// document order is preserved wherever dependencies allow.
///
/// On a cycle, returns `Err` with the nodes that lie on (or between) cycles,
/// in index order.
pub fn topo_sort(n: usize, edges: &[(usize, usize)]) -> Result<Vec<usize>, Vec<usize>> {
    let mut indeg = vec![0usize; n];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(from, to) in edges {
        indeg[to] += 1;
        outgoing[from].push(to);
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| indeg[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &m in &outgoing[i] {
            indeg[m] -= 1;
            if indeg[m] == 0 {
                ready.push(Reverse(m));
            }
        }
    }
    if order.len() == n {
        return Ok(order);
    }

    // Peel nodes that only lead out of the cycle region; what remains is cyclic.
    let mut remaining: HashSet<usize> = (0..n).filter(|&i| indeg[i] > 0).collect();
    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| !outgoing[i].iter().any(|m| remaining.contains(m)))
            .collect();
        if sinks.is_empty() {
            break;
        }
        for s in sinks {
            remaining.remove(&s);
        }
    }
    let mut cyclic: Vec<usize> = remaining.into_iter().collect();
    cyclic.sort_unstable();
    Err(cyclic)
}

/// Nodes from which any of `roots` can be reached, roots included.
pub fn upstream_reachable(n: usize, edges: &[(usize, usize)], roots: &[usize]) -> Vec<bool> {
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(from, to) in edges {
        incoming[to].push(from);
    }

    let mut visited = vec![false; n];
    let mut stack: Vec<usize> = roots.to_vec();
    while let Some(i) = stack.pop() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        stack.extend(incoming[i].iter().copied());
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topo_sort_keeps_index_order_when_free() {
        // 0 -> 2, 1 -> 2, 3 independent
        let order = topo_sort(4, &[(0, 2), (1, 2)]).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_topo_sort_respects_dependencies() {
        // 2 feeds 0
        let order = topo_sort(3, &[(2, 0), (0, 1)]).unwrap();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_topo_sort_reports_cycle_members_only() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let err = topo_sort(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]).unwrap_err();
        assert_eq!(err, vec![1, 2]);
    }

    #[test]
    fn test_upstream_reachable() {
        let reach = upstream_reachable(4, &[(0, 1), (1, 2), (3, 3)], &[2]);
        assert_eq!(reach, vec![true, true, true, false]);
    }
}
