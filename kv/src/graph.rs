use std::sync::Mutex;

/// The wait-for graph: a dense directed graph over the fixed set of
/// transaction slots. An edge a->b means "transaction a is blocked waiting
/// for a lock whose holder is b". The graph owns no entities, only the
/// relation between slot ids; liveness and age of a slot are supplied by the
/// caller (the engine) so this module stays ignorant of `TxnState`.
///
/// All access is serialized by a single mutex, referred to in the design as
/// `wf_mtx`. Callers must never hold `wf_mtx` across a lock's own mutex --
/// the ordering is always "lock mutex, then wf_mtx", never the reverse.
pub struct WaitForGraph {
    edges: Mutex<Vec<Vec<bool>>>,
    n: usize,
}

impl WaitForGraph {
    pub fn new(n: usize) -> Self {
        WaitForGraph { edges: Mutex::new(vec![vec![false; n]; n]), n }
    }

    pub fn add_edge(&self, a: usize, b: usize) {
        self.edges.lock().unwrap()[a][b] = true;
    }

    pub fn remove_edge(&self, a: usize, b: usize) {
        self.edges.lock().unwrap()[a][b] = false;
    }

    /// Removes every a->* edge, i.e. `a` is no longer waiting on anything.
    pub fn clear_outgoing(&self, a: usize) {
        let mut edges = self.edges.lock().unwrap();
        for out in edges[a].iter_mut() {
            *out = false;
        }
    }

    /// Removes every *->b edge, i.e. nobody should keep waiting for `b`.
    pub fn remove_incoming(&self, b: usize) {
        let mut edges = self.edges.lock().unwrap();
        for row in edges.iter_mut() {
            row[b] = false;
        }
    }

    /// Runs cycle detection over all live-slot roots. `is_live(slot)` should
    /// return `Some(start_seq)` for a currently live transaction, `None`
    /// otherwise. Among the members of the first cycle found that still
    /// reference a live slot, returns the one with the greatest `start_seq`
    /// (youngest-abort policy); ties broken by lowest slot id.
    ///
    /// Any cycle observed here is a cycle of the graph as it stood at the
    /// moment this call took `wf_mtx` -- edges are only ever added while
    /// holding both the relevant lock's mutex and `wf_mtx`, so this is sound
    /// with respect to the acquire protocol that calls it.
    pub fn find_victim(&self, is_live: impl Fn(usize) -> Option<u64>) -> Option<usize> {
        let edges = self.edges.lock().unwrap();
        let n = self.n;
        let mut visited = vec![false; n];

        for root in 0..n {
            if visited[root] || is_live(root).is_none() {
                continue;
            }
            let mut on_stack = vec![false; n];
            let mut parent = vec![usize::MAX; n];
            if let Some(cycle) =
                Self::dfs(root, &edges, n, &mut visited, &mut on_stack, &mut parent)
            {
                let victim = cycle
                    .iter()
                    .filter_map(|&id| is_live(id).map(|seq| (id, seq)))
                    .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                    .map(|(id, _)| id);
                if victim.is_some() {
                    return victim;
                }
            }
        }
        None
    }

    /// Depth-first search from `node`, maintaining `visited`/`on_stack`
    /// marks and a `parent` chain. A back-edge to an on-stack node closes a
    /// cycle, recovered by walking `parent` back to the rediscovered
    /// ancestor.
    fn dfs(
        node: usize,
        edges: &[Vec<bool>],
        n: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        parent: &mut [usize],
    ) -> Option<Vec<usize>> {
        visited[node] = true;
        on_stack[node] = true;

        for next in 0..n {
            if !edges[node][next] {
                continue;
            }
            if on_stack[next] {
                let mut cycle = vec![next];
                let mut cur = node;
                while cur != next {
                    cycle.push(cur);
                    cur = parent[cur];
                }
                return Some(cycle);
            }
            if !visited[next] {
                parent[next] = node;
                if let Some(cycle) = Self::dfs(next, edges, n, visited, on_stack, parent) {
                    return Some(cycle);
                }
            }
        }

        on_stack[node] = false;
        None
    }
}
