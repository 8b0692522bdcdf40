//! Simple-cycle enumeration (Johnson's algorithm) over index adjacency lists.

use super::NodeId;

/// Enumerate simple cycles among `active` nodes, at most `limit` of them.
///
/// Each cycle starts at its lowest node id and lists nodes in edge order
/// without repeating the first one; a self-loop yields `[v]`.
pub(crate) fn simple_cycles(adj: &[Vec<NodeId>], active: &[bool], limit: usize) -> Vec<Vec<NodeId>> {
    let n = adj.len();
    let mut radj: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for (v, targets) in adj.iter().enumerate() {
        for &w in targets {
            radj[w].push(v);
        }
    }

    let mut search = CircuitSearch {
        adj,
        component: vec![false; n],
        blocked: vec![false; n],
        waiting: vec![Vec::new(); n],
        stack: Vec::new(),
        cycles: Vec::new(),
        limit,
    };

    for start in 0..n {
        if search.cycles.len() >= limit {
            break;
        }
        if !active[start] || adj[start].is_empty() {
            continue;
        }

        // Strongly connected part of the subgraph induced by nodes >= start
        let allowed = |v: NodeId| v >= start && active[v];
        let forward = reach(start, adj, &allowed);
        let backward = reach(start, &radj, &allowed);
        let mut size = 0;
        for v in 0..n {
            let inside = forward[v] && backward[v];
            search.component[v] = inside;
            if inside {
                size += 1;
            }
        }
        if size == 1 && !adj[start].contains(&start) {
            continue;
        }

        for v in 0..n {
            if search.component[v] {
                search.blocked[v] = false;
                search.waiting[v].clear();
            }
        }
        search.circuit(start, start);
    }

    search.cycles
}

fn reach(start: NodeId, adj: &[Vec<NodeId>], allowed: &dyn Fn(NodeId) -> bool) -> Vec<bool> {
    let mut seen = vec![false; adj.len()];
    let mut stack = vec![start];
    seen[start] = true;
    while let Some(v) = stack.pop() {
        for &w in &adj[v] {
            if !seen[w] && allowed(w) {
                seen[w] = true;
                stack.push(w);
            }
        }
    }
    seen
}

struct CircuitSearch<'a> {
    adj: &'a [Vec<NodeId>],
    component: Vec<bool>,
    blocked: Vec<bool>,
    waiting: Vec<Vec<NodeId>>,
    stack: Vec<NodeId>,
    cycles: Vec<Vec<NodeId>>,
    limit: usize,
}

impl CircuitSearch<'_> {
    fn circuit(&mut self, v: NodeId, start: NodeId) -> bool {
        let adj = self.adj;
        let mut found = false;
        self.stack.push(v);
        self.blocked[v] = true;

        for &w in &adj[v] {
            if !self.component[w] {
                continue;
            }
            if self.cycles.len() >= self.limit {
                break;
            }
            if w == start {
                self.cycles.push(self.stack.clone());
                found = true;
            } else if !self.blocked[w] && self.circuit(w, start) {
                found = true;
            }
        }

        if found {
            self.unblock(v);
        } else {
            for &w in &adj[v] {
                if self.component[w] && !self.waiting[w].contains(&v) {
                    self.waiting[w].push(v);
                }
            }
        }

        self.stack.pop();
        found
    }

    fn unblock(&mut self, v: NodeId) {
        let mut pending = vec![v];
        while let Some(u) = pending.pop() {
            self.blocked[u] = false;
            for w in std::mem::take(&mut self.waiting[u]) {
                if self.blocked[w] {
                    pending.push(w);
                }
            }
        }
    }
}
