//! k-let-preserving sequence shuffling.
//!
//! Implements the u-shuffle construction: a shuffled sequence with exactly
//! the same k-let (length-`klet` substring) multiset as the input. The
//! shuffle is a uniformly random Euler path through the de-Bruijn multigraph
//! whose vertices are the (klet−1)-mers of the sequence: a random last-edge
//! arborescence toward the terminal vertex (Wilson's loop-erased walk),
//! a uniform permutation of every other out-edge, then the walk itself.
//!
//! The RNG is owned per [`Shuffler`] instance; counting passes construct one
//! per pass with [`Shuffler::new`] (seed 1) so a shuffled corpus is
//! reproducible without any process-global state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

/// Seed used at the start of every shuffled counting pass.
pub const SHUFFLE_SEED: u64 = 1;

/// A seeded shuffler; one instance per counting pass.
#[derive(Debug)]
pub struct Shuffler {
    rng: StdRng,
}

impl Default for Shuffler {
    fn default() -> Self {
        Self::new()
    }
}

impl Shuffler {
    /// Creates a shuffler with the pass-entry seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(SHUFFLE_SEED)
    }

    /// Creates a shuffler with an explicit seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns a shuffle of `seq` preserving its `klet`-mer frequencies.
    ///
    /// Output length equals input length. `klet` is clamped to at least 1;
    /// `klet == 1` is a plain permutation, and a sequence no longer than
    /// `klet` is returned unchanged.
    #[must_use]
    pub fn shuffle(&mut self, seq: &[u8], klet: u32) -> Vec<u8> {
        let l = klet.max(1) as usize;
        let n = seq.len();
        if n == 0 {
            return Vec::new();
        }
        if l == 1 {
            let mut out = seq.to_vec();
            self.permute(&mut out);
            return out;
        }
        if n <= l {
            return seq.to_vec();
        }

        // Vertices are the (l-1)-mers; edges are the l-mers, each carrying
        // the byte it appends.
        let vlen = l - 1;
        let mut vertex_ids: FxHashMap<&[u8], usize> = FxHashMap::default();
        let vertex_at: Vec<usize> = (0..=n - vlen)
            .map(|i| {
                let next = vertex_ids.len();
                *vertex_ids.entry(&seq[i..i + vlen]).or_insert(next)
            })
            .collect();
        let start = vertex_at[0];
        let root = vertex_at[n - vlen];

        let mut edges: Vec<Vec<(usize, u8)>> = vec![Vec::new(); vertex_ids.len()];
        for i in 0..=n - l {
            edges[vertex_at[i]].push((vertex_at[i + 1], seq[i + l - 1]));
        }

        let last_edge = self.random_arborescence(&edges, root);
        let order = self.arrange_edges(&edges, &last_edge, root);

        // Euler walk from the start vertex consumes every edge.
        let mut out = Vec::with_capacity(n);
        out.extend_from_slice(&seq[..vlen]);
        let mut cursor = vec![0usize; order.len()];
        let mut at = start;
        while cursor[at] < order[at].len() {
            let (to, byte) = order[at][cursor[at]];
            cursor[at] += 1;
            out.push(byte);
            at = to;
        }
        out
    }

    /// Picks, for every non-root vertex, the out-edge to use last so that
    /// the chosen edges form an arborescence toward `root` (Wilson's
    /// loop-erased random walk, uniform over arborescences).
    fn random_arborescence(&mut self, edges: &[Vec<(usize, u8)>], root: usize) -> Vec<usize> {
        let nv = edges.len();
        let mut last_edge = vec![0usize; nv];
        let mut in_tree = vec![false; nv];
        in_tree[root] = true;

        for v in 0..nv {
            if in_tree[v] || edges[v].is_empty() {
                continue;
            }
            let mut u = v;
            while !in_tree[u] {
                let pick = self.rng.gen_range(0..edges[u].len());
                last_edge[u] = pick;
                u = edges[u][pick].0;
            }
            let mut u = v;
            while !in_tree[u] {
                in_tree[u] = true;
                u = edges[u][last_edge[u]].0;
            }
        }
        last_edge
    }

    /// Uniformly permutes each vertex's out-edges, pinning the chosen last
    /// edge of every non-root vertex to the end of its list.
    fn arrange_edges(
        &mut self,
        edges: &[Vec<(usize, u8)>],
        last_edge: &[usize],
        root: usize,
    ) -> Vec<Vec<(usize, u8)>> {
        edges
            .iter()
            .enumerate()
            .map(|(v, out)| {
                let mut arranged = out.clone();
                if v != root && !arranged.is_empty() {
                    let pinned = arranged.remove(last_edge[v]);
                    self.permute(&mut arranged);
                    arranged.push(pinned);
                } else {
                    self.permute(&mut arranged);
                }
                arranged
            })
            .collect()
    }

    /// Fisher-Yates permutation.
    fn permute<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            items.swap(i, j);
        }
    }
}
