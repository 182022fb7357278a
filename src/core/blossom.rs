//! Maximum-weight matching on general graphs (Edmonds' blossom algorithm,
//! primal-dual form).
//!
//! Weights are integers so every dual update is exact; vertex duals are
//! stored doubled, which keeps `slack` and the blossom delta integral.
//! Runs in O(n^3).

const NONE: usize = usize::MAX;

const FREE: u8 = 0;
const S_LABEL: u8 = 1;
const T_LABEL: u8 = 2;
/// Temporary mark left by `scan_blossom` on S-blossoms it has walked.
const BREADCRUMB: u8 = 5;

/// Compute a maximum-weight matching.
///
/// `edges` are `(i, j, weight)` with `i, j < vertex_count`. Self-loops and
/// out-of-range endpoints are ignored. Returns each vertex's mate.
/// Not every vertex is necessarily matched; the result maximizes total
/// weight, not cardinality.
pub fn max_weight_matching(vertex_count: usize, edges: &[(usize, usize, i64)]) -> Vec<Option<usize>> {
    let edges: Vec<(usize, usize, i64)> = edges
        .iter()
        .copied()
        .filter(|&(i, j, _)| i != j && i < vertex_count && j < vertex_count)
        .collect();

    if vertex_count == 0 || edges.is_empty() {
        return vec![None; vertex_count];
    }

    let mut state = BlossomState::new(vertex_count, &edges);
    state.solve();
    state.mates()
}

struct BlossomState<'e> {
    n: usize,
    edges: &'e [(usize, usize, i64)],
    /// `endpoint[p]` is the vertex at endpoint `p`; edge `k` has endpoints `2k` and `2k + 1`.
    endpoint: Vec<usize>,
    /// Remote endpoints of the edges incident to each vertex.
    neighbend: Vec<Vec<usize>>,
    /// Remote endpoint of the matched edge, by vertex.
    mate: Vec<usize>,
    label: Vec<u8>,
    /// Endpoint through which a vertex or top-level blossom got its label.
    labelend: Vec<usize>,
    /// Top-level blossom containing each vertex.
    inblossom: Vec<usize>,
    parent: Vec<usize>,
    childs: Vec<Vec<usize>>,
    base: Vec<usize>,
    /// `endps[b][i]` joins `childs[b][i]` and `childs[b][i + 1]`.
    endps: Vec<Vec<usize>>,
    bestedge: Vec<usize>,
    blossombestedges: Vec<Option<Vec<usize>>>,
    unused: Vec<usize>,
    dual: Vec<i64>,
    allowedge: Vec<bool>,
    queue: Vec<usize>,
}

impl<'e> BlossomState<'e> {
    fn new(n: usize, edges: &'e [(usize, usize, i64)]) -> Self {
        let max_weight = edges.iter().map(|&(_, _, w)| w).max().unwrap_or(0).max(0);

        let mut endpoint = Vec::with_capacity(2 * edges.len());
        let mut neighbend = vec![Vec::new(); n];
        for (k, &(i, j, _)) in edges.iter().enumerate() {
            endpoint.push(i);
            endpoint.push(j);
            neighbend[i].push(2 * k + 1);
            neighbend[j].push(2 * k);
        }

        let mut base: Vec<usize> = (0..n).collect();
        base.extend(std::iter::repeat(NONE).take(n));
        let mut dual = vec![max_weight; n];
        dual.extend(std::iter::repeat(0).take(n));

        Self {
            n,
            edges,
            endpoint,
            neighbend,
            mate: vec![NONE; n],
            label: vec![FREE; 2 * n],
            labelend: vec![NONE; 2 * n],
            inblossom: (0..n).collect(),
            parent: vec![NONE; 2 * n],
            childs: vec![Vec::new(); 2 * n],
            base,
            endps: vec![Vec::new(); 2 * n],
            bestedge: vec![NONE; 2 * n],
            blossombestedges: vec![None; 2 * n],
            unused: (n..2 * n).collect(),
            dual,
            allowedge: vec![false; edges.len()],
            queue: Vec::new(),
        }
    }

    #[inline]
    fn slack(&self, k: usize) -> i64 {
        let (i, j, w) = self.edges[k];
        self.dual[i] + self.dual[j] - 2 * w
    }

    fn leaves(&self, b: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaves(b, &mut out);
        out
    }

    fn collect_leaves(&self, b: usize, out: &mut Vec<usize>) {
        if b < self.n {
            out.push(b);
        } else {
            for &child in &self.childs[b] {
                self.collect_leaves(child, out);
            }
        }
    }

    /// Label `w` and its top-level blossom; a T label also labels the mate S.
    fn assign_label(&mut self, w: usize, t: u8, p: usize) {
        let b = self.inblossom[w];
        self.label[w] = t;
        self.label[b] = t;
        self.labelend[w] = p;
        self.labelend[b] = p;
        self.bestedge[w] = NONE;
        self.bestedge[b] = NONE;

        if t == S_LABEL {
            let leaves = self.leaves(b);
            self.queue.extend(leaves);
        } else if t == T_LABEL {
            let mate_end = self.mate[self.base[b]];
            let next = self.endpoint[mate_end];
            self.assign_label(next, S_LABEL, mate_end ^ 1);
        }
    }

    /// Trace back from `v` and `w` to find a new blossom's base, or `NONE`
    /// when the paths reach two different roots (an augmenting path).
    fn scan_blossom(&mut self, mut v: usize, mut w: usize) -> usize {
        let mut path = Vec::new();
        let mut base = NONE;

        while v != NONE || w != NONE {
            let mut b = self.inblossom[v];
            if self.label[b] & 4 != 0 {
                base = self.base[b];
                break;
            }
            path.push(b);
            self.label[b] = BREADCRUMB;

            if self.labelend[b] == NONE {
                v = NONE;
            } else {
                v = self.endpoint[self.labelend[b]];
                b = self.inblossom[v];
                v = self.endpoint[self.labelend[b]];
            }
            if w != NONE {
                std::mem::swap(&mut v, &mut w);
            }
        }

        for b in path {
            self.label[b] = S_LABEL;
        }
        base
    }

    /// Contract the odd cycle closed by edge `k` into a new S-blossom.
    fn add_blossom(&mut self, base: usize, k: usize) {
        let (v, w, _) = self.edges[k];
        let bb = self.inblossom[base];
        let mut bv = self.inblossom[v];
        let mut bw = self.inblossom[w];

        let Some(b) = self.unused.pop() else {
            return;
        };
        self.base[b] = base;
        self.parent[b] = NONE;
        self.parent[bb] = b;

        let mut path = Vec::new();
        let mut endps = Vec::new();
        while bv != bb {
            self.parent[bv] = b;
            path.push(bv);
            endps.push(self.labelend[bv]);
            bv = self.inblossom[self.endpoint[self.labelend[bv]]];
        }
        path.push(bb);
        path.reverse();
        endps.reverse();
        endps.push(2 * k);
        while bw != bb {
            self.parent[bw] = b;
            path.push(bw);
            endps.push(self.labelend[bw] ^ 1);
            bw = self.inblossom[self.endpoint[self.labelend[bw]]];
        }

        self.label[b] = S_LABEL;
        self.labelend[b] = self.labelend[bb];
        self.dual[b] = 0;
        self.childs[b] = path.clone();
        self.endps[b] = endps;

        for leaf in self.leaves(b) {
            if self.label[self.inblossom[leaf]] == T_LABEL {
                self.queue.push(leaf);
            }
            self.inblossom[leaf] = b;
        }

        // Least-slack edges from the new blossom to each neighbouring S-blossom
        let mut bestedgeto = vec![NONE; 2 * self.n];
        for &child in &path {
            let lists: Vec<Vec<usize>> = match self.blossombestedges[child].take() {
                Some(list) => vec![list],
                None => self
                    .leaves(child)
                    .into_iter()
                    .map(|leaf| self.neighbend[leaf].iter().map(|p| p / 2).collect())
                    .collect(),
            };
            for edge in lists.into_iter().flatten() {
                let (i, j, _) = self.edges[edge];
                let j = if self.inblossom[j] == b { i } else { j };
                let bj = self.inblossom[j];
                if bj != b
                    && self.label[bj] == S_LABEL
                    && (bestedgeto[bj] == NONE || self.slack(edge) < self.slack(bestedgeto[bj]))
                {
                    bestedgeto[bj] = edge;
                }
            }
            self.bestedge[child] = NONE;
        }

        let list: Vec<usize> = bestedgeto.into_iter().filter(|&e| e != NONE).collect();
        let mut best = NONE;
        for &edge in &list {
            if best == NONE || self.slack(edge) < self.slack(best) {
                best = edge;
            }
        }
        self.blossombestedges[b] = Some(list);
        self.bestedge[b] = best;
    }

    /// Dissolve blossom `b` back into its children.
    fn expand_blossom(&mut self, b: usize, endstage: bool) {
        let childs = self.childs[b].clone();
        for &s in &childs {
            self.parent[s] = NONE;
            if s < self.n {
                self.inblossom[s] = s;
            } else if endstage && self.dual[s] == 0 {
                self.expand_blossom(s, endstage);
            } else {
                for leaf in self.leaves(s) {
                    self.inblossom[leaf] = s;
                }
            }
        }

        // A T-blossom expanded mid-stage: relabel the even path from the
        // entry child to the base so the alternating tree stays intact
        if !endstage && self.label[b] == T_LABEL {
            let endps = self.endps[b].clone();
            let len = childs.len() as isize;
            let at = |j: isize| j.rem_euclid(len) as usize;

            let entrychild = self.inblossom[self.endpoint[self.labelend[b] ^ 1]];
            let mut j = childs.iter().position(|&c| c == entrychild).unwrap_or(0) as isize;
            let (jstep, endptrick) = if j & 1 != 0 {
                j -= len;
                (1isize, 0usize)
            } else {
                (-1isize, 1usize)
            };

            let mut p = self.labelend[b];
            while j != 0 {
                let entry = self.endpoint[p ^ 1];
                self.label[entry] = FREE;
                let q = endps[at(j - endptrick as isize)];
                self.label[self.endpoint[q ^ endptrick ^ 1]] = FREE;
                self.assign_label(entry, T_LABEL, p);
                self.allowedge[q / 2] = true;
                j += jstep;
                p = endps[at(j - endptrick as isize)] ^ endptrick;
                self.allowedge[p / 2] = true;
                j += jstep;
            }

            let bv = childs[at(j)];
            let entry = self.endpoint[p ^ 1];
            self.label[entry] = T_LABEL;
            self.label[bv] = T_LABEL;
            self.labelend[entry] = p;
            self.labelend[bv] = p;
            self.bestedge[bv] = NONE;
            j += jstep;

            while childs[at(j)] != entrychild {
                let bv = childs[at(j)];
                if self.label[bv] == S_LABEL {
                    j += jstep;
                    continue;
                }
                let reached = self.leaves(bv).into_iter().find(|&leaf| self.label[leaf] != FREE);
                if let Some(leaf) = reached {
                    self.label[leaf] = FREE;
                    let mate_end = self.mate[self.base[bv]];
                    self.label[self.endpoint[mate_end]] = FREE;
                    let through = self.labelend[leaf];
                    self.assign_label(leaf, T_LABEL, through);
                }
                j += jstep;
            }
        }

        self.label[b] = FREE;
        self.labelend[b] = NONE;
        self.childs[b].clear();
        self.endps[b].clear();
        self.base[b] = NONE;
        self.blossombestedges[b] = None;
        self.bestedge[b] = NONE;
        self.unused.push(b);
    }

    /// Swap matched and unmatched edges along the path from `v` to the
    /// base of blossom `b`, making `v` the new base.
    fn augment_blossom(&mut self, b: usize, v: usize) {
        let mut t = v;
        while self.parent[t] != b {
            t = self.parent[t];
        }
        if t >= self.n {
            self.augment_blossom(t, v);
        }

        let len = self.childs[b].len() as isize;
        let at = |j: isize| j.rem_euclid(len) as usize;
        let i = self.childs[b].iter().position(|&c| c == t).unwrap_or(0);
        let mut j = i as isize;
        let (jstep, endptrick) = if i & 1 != 0 {
            j -= len;
            (1isize, 0usize)
        } else {
            (-1isize, 1usize)
        };

        while j != 0 {
            j += jstep;
            let child = self.childs[b][at(j)];
            let p = self.endps[b][at(j - endptrick as isize)] ^ endptrick;
            if child >= self.n {
                let end = self.endpoint[p];
                self.augment_blossom(child, end);
            }
            j += jstep;
            let child = self.childs[b][at(j)];
            if child >= self.n {
                let end = self.endpoint[p ^ 1];
                self.augment_blossom(child, end);
            }
            let (a, c) = (self.endpoint[p], self.endpoint[p ^ 1]);
            self.mate[a] = p ^ 1;
            self.mate[c] = p;
        }

        self.childs[b].rotate_left(i);
        self.endps[b].rotate_left(i);
        let first = self.childs[b][0];
        self.base[b] = self.base[first];
    }

    /// Augment the matching along the path through edge `k`.
    fn augment_matching(&mut self, k: usize) {
        let (v, w, _) = self.edges[k];
        for (start, first_end) in [(v, 2 * k + 1), (w, 2 * k)] {
            let mut s = start;
            let mut p = first_end;
            loop {
                let bs = self.inblossom[s];
                if bs >= self.n {
                    self.augment_blossom(bs, s);
                }
                self.mate[s] = p;
                if self.labelend[bs] == NONE {
                    break;
                }
                let t = self.endpoint[self.labelend[bs]];
                let bt = self.inblossom[t];
                s = self.endpoint[self.labelend[bt]];
                let j = self.endpoint[self.labelend[bt] ^ 1];
                if bt >= self.n {
                    self.augment_blossom(bt, j);
                }
                self.mate[j] = self.labelend[bt];
                p = self.labelend[bt] ^ 1;
            }
        }
    }

    fn reset_stage(&mut self) {
        self.label.fill(FREE);
        self.bestedge.fill(NONE);
        for b in self.n..2 * self.n {
            self.blossombestedges[b] = None;
        }
        self.allowedge.fill(false);
        self.queue.clear();
    }

    /// Grow alternating trees from the queue. Returns true on augmentation.
    fn grow(&mut self) -> bool {
        while let Some(v) = self.queue.pop() {
            let neighbours = self.neighbend[v].clone();
            for p in neighbours {
                let k = p / 2;
                let w = self.endpoint[p];
                if self.inblossom[v] == self.inblossom[w] {
                    continue;
                }

                let mut kslack = 0;
                if !self.allowedge[k] {
                    kslack = self.slack(k);
                    if kslack <= 0 {
                        self.allowedge[k] = true;
                    }
                }

                if self.allowedge[k] {
                    match self.label[self.inblossom[w]] {
                        FREE => self.assign_label(w, T_LABEL, p ^ 1),
                        S_LABEL => {
                            let base = self.scan_blossom(v, w);
                            if base != NONE {
                                self.add_blossom(base, k);
                            } else {
                                self.augment_matching(k);
                                return true;
                            }
                        }
                        _ => {
                            if self.label[w] == FREE {
                                self.label[w] = T_LABEL;
                                self.labelend[w] = p ^ 1;
                            }
                        }
                    }
                } else if self.label[self.inblossom[w]] == S_LABEL {
                    let b = self.inblossom[v];
                    if self.bestedge[b] == NONE || kslack < self.slack(self.bestedge[b]) {
                        self.bestedge[b] = k;
                    }
                } else if self.label[w] == FREE
                    && (self.bestedge[w] == NONE || kslack < self.slack(self.bestedge[w]))
                {
                    self.bestedge[w] = k;
                }
            }
        }
        false
    }

    fn solve(&mut self) {
        let n = self.n;

        for _ in 0..n {
            self.reset_stage();
            for v in 0..n {
                if self.mate[v] == NONE && self.label[self.inblossom[v]] == FREE {
                    self.assign_label(v, S_LABEL, NONE);
                }
            }

            let mut augmented = false;
            loop {
                if self.grow() {
                    augmented = true;
                    break;
                }

                // No augmenting path with tight edges: pick the dual update
                let mut delta_type = 1;
                let mut delta = self.dual[..n].iter().copied().min().unwrap_or(0);
                let mut delta_edge = NONE;
                let mut delta_blossom = NONE;

                for v in 0..n {
                    if self.label[self.inblossom[v]] == FREE && self.bestedge[v] != NONE {
                        let d = self.slack(self.bestedge[v]);
                        if d < delta {
                            delta = d;
                            delta_type = 2;
                            delta_edge = self.bestedge[v];
                        }
                    }
                }
                for b in 0..2 * n {
                    if self.parent[b] == NONE && self.label[b] == S_LABEL && self.bestedge[b] != NONE {
                        let d = self.slack(self.bestedge[b]) / 2;
                        if d < delta {
                            delta = d;
                            delta_type = 3;
                            delta_edge = self.bestedge[b];
                        }
                    }
                }
                for b in n..2 * n {
                    if self.base[b] != NONE
                        && self.parent[b] == NONE
                        && self.label[b] == T_LABEL
                        && self.dual[b] < delta
                    {
                        delta = self.dual[b];
                        delta_type = 4;
                        delta_blossom = b;
                    }
                }

                for v in 0..n {
                    match self.label[self.inblossom[v]] {
                        S_LABEL => self.dual[v] -= delta,
                        T_LABEL => self.dual[v] += delta,
                        _ => {}
                    }
                }
                for b in n..2 * n {
                    if self.base[b] != NONE && self.parent[b] == NONE {
                        match self.label[b] {
                            S_LABEL => self.dual[b] += delta,
                            T_LABEL => self.dual[b] -= delta,
                            _ => {}
                        }
                    }
                }

                match delta_type {
                    2 => {
                        self.allowedge[delta_edge] = true;
                        let (i, j, _) = self.edges[delta_edge];
                        let s = if self.label[self.inblossom[i]] == FREE { j } else { i };
                        self.queue.push(s);
                    }
                    3 => {
                        self.allowedge[delta_edge] = true;
                        let (i, _, _) = self.edges[delta_edge];
                        self.queue.push(i);
                    }
                    4 => self.expand_blossom(delta_blossom, false),
                    // Optimum reached
                    _ => break,
                }
            }

            if !augmented {
                break;
            }

            for b in n..2 * n {
                if self.parent[b] == NONE
                    && self.base[b] != NONE
                    && self.label[b] == S_LABEL
                    && self.dual[b] == 0
                {
                    self.expand_blossom(b, true);
                }
            }
        }
    }

    fn mates(&self) -> Vec<Option<usize>> {
        self.mate
            .iter()
            .map(|&p| if p == NONE { None } else { Some(self.endpoint[p]) })
            .collect()
    }
}

/// Total weight of a matching, counting each pair once.
pub fn matching_weight(mates: &[Option<usize>], edges: &[(usize, usize, i64)]) -> i64 {
    edges
        .iter()
        .filter(|&&(i, j, _)| i != j && mates.get(i).copied().flatten() == Some(j))
        .map(|&(_, _, w)| w)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn expect(mates: Vec<Option<usize>>, expected: &[i64]) {
        let expected: Vec<Option<usize>> = expected
            .iter()
            .map(|&m| if m < 0 { None } else { Some(m as usize) })
            .collect();
        assert_eq!(mates, expected);
    }

    fn best_by_enumeration(n: usize, edges: &[(usize, usize, i64)]) -> i64 {
        fn go(v: usize, n: usize, used: &mut Vec<bool>, edges: &[(usize, usize, i64)]) -> i64 {
            if v == n {
                return 0;
            }
            if used[v] {
                return go(v + 1, n, used, edges);
            }
            // Leave v unmatched
            let mut best = go(v + 1, n, used, edges);
            for &(i, j, w) in edges {
                let other = if i == v { j } else if j == v { i } else { continue };
                if used[other] || other == v {
                    continue;
                }
                used[v] = true;
                used[other] = true;
                best = best.max(w + go(v + 1, n, used, edges));
                used[v] = false;
                used[other] = false;
            }
            best
        }
        go(0, n, &mut vec![false; n], edges)
    }

    #[test]
    fn test_empty_graph() {
        assert!(max_weight_matching(0, &[]).is_empty());
        assert_eq!(max_weight_matching(3, &[]), vec![None, None, None]);
    }

    #[test]
    fn test_single_edge() {
        expect(max_weight_matching(2, &[(0, 1, 1)]), &[1, 0]);
    }

    #[test]
    fn test_prefers_heavier_edge_on_path() {
        expect(max_weight_matching(4, &[(1, 2, 10), (2, 3, 11)]), &[-1, -1, 3, 2]);
        expect(max_weight_matching(5, &[(1, 2, 5), (2, 3, 11), (3, 4, 5)]), &[-1, -1, 3, 2, -1]);
    }

    #[test]
    fn test_prefers_two_edges_over_one_heavier() {
        expect(max_weight_matching(4, &[(0, 1, 5), (1, 2, 6), (2, 3, 5)]), &[1, 0, 3, 2]);
    }

    #[test]
    fn test_triangle_takes_heaviest_edge() {
        expect(max_weight_matching(3, &[(0, 1, 10), (1, 2, 11), (0, 2, 12)]), &[2, -1, 0]);
    }

    #[test]
    fn test_s_blossom() {
        expect(
            max_weight_matching(5, &[(1, 2, 8), (1, 3, 9), (2, 3, 10), (3, 4, 7)]),
            &[-1, 2, 1, 4, 3],
        );
    }

    #[test]
    fn test_t_blossom() {
        expect(
            max_weight_matching(7, &[(1, 2, 9), (1, 3, 8), (2, 3, 10), (1, 4, 5), (4, 5, 4), (1, 6, 3)]),
            &[-1, 6, 3, 2, 5, 4, 1],
        );
    }

    #[test]
    fn test_nested_s_blossom() {
        expect(
            max_weight_matching(
                7,
                &[(1, 2, 9), (1, 3, 9), (2, 3, 10), (2, 4, 8), (3, 5, 8), (4, 5, 10), (5, 6, 6)],
            ),
            &[-1, 3, 4, 1, 2, 6, 5],
        );
    }

    #[test]
    fn test_ignores_self_loops_and_out_of_range() {
        let mates = max_weight_matching(2, &[(0, 0, 100), (0, 5, 100), (0, 1, 3)]);
        assert_eq!(mates, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_matches_enumeration_on_random_graphs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let n = rng.gen_range(1..=8);
            let mut edges = Vec::new();
            for i in 0..n {
                for j in (i + 1)..n {
                    if rng.gen_bool(0.5) {
                        edges.push((i, j, rng.gen_range(1..=20)));
                    }
                }
            }

            let mates = max_weight_matching(n, &edges);
            for (v, m) in mates.iter().enumerate() {
                if let Some(m) = m {
                    assert_ne!(*m, v);
                    assert_eq!(mates[*m], Some(v));
                    assert!(edges.iter().any(|&(i, j, _)| (i == v && j == *m) || (j == v && i == *m)));
                }
            }
            assert_eq!(matching_weight(&mates, &edges), best_by_enumeration(n, &edges));
        }
    }
}
