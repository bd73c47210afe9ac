// src/transaction/order.rs

//! Transaction ordering
//!
//! Elements are sorted so that a package comes after everything it
//! requires. Each requirement of an added package that another element
//! satisfies becomes an edge from the provider to the requirer; script
//! prerequisites are recorded before ordinary requirements. The graph is
//! then sorted with Kahn's algorithm, emitting elements with fewer
//! successors first.
//!
//! When elements remain that the sort cannot emit, they sit on dependency
//! loops. Each loop is reported and one plain requirement on it is dropped,
//! then sorting resumes. Prerequisite edges are never dropped.

use super::TransactionSet;
use super::element::ElementType;
use crate::al::{AlKey, AvailableList};
use crate::ds::SenseFlags;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, error, info, warn};

/// Result of ordering a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Every element was placed
    Ordered,
    /// Loops could not be broken; the elements keep their previous order
    Unordered { remaining: usize },
}

/// An edge in the ordering graph, stored on the predecessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Relation {
    /// Element that requires the predecessor
    successor: usize,
    /// Index into the successor's Requires that produced the edge
    reqx: usize,
}

/// Per-element scratch state used while ordering
#[derive(Debug, Clone, Default)]
struct SortInfo {
    /// Predecessors not yet emitted
    count: usize,
    /// Queue priority: the number of successors
    qcnt: usize,
    /// Outgoing edges in insertion order; traversed newest first
    successors: Vec<Relation>,
    /// Predecessor on the loop-detection chain
    chain: Option<usize>,
    /// Seen while walking a chain
    visited: bool,
    emitted: bool,
    /// Position in the combined added/erased key space
    order_key: usize,
}

struct Sorter<'a> {
    ts: &'a mut TransactionSet,
    tsi: Vec<SortInfo>,
    queue: VecDeque<usize>,
    ordering: Vec<usize>,
}

impl TransactionSet {
    /// Sort the elements so that requirements come first
    ///
    /// On failure the rollback hook, when set, is called with the number of
    /// elements that could not be ordered.
    pub fn order(&mut self) -> OrderOutcome {
        info!("Ordering {} elements", self.elements.len());
        if !self.added.is_indexed() {
            self.added.make_index();
        }

        let mut sorter = Sorter::new(self);
        sorter.build_relations();
        let outcome = sorter.sort();

        if let OrderOutcome::Unordered { remaining } = outcome
            && let Some(hook) = self.rollback.as_mut()
        {
            hook(remaining);
        }
        outcome
    }
}

impl<'a> Sorter<'a> {
    fn new(ts: &'a mut TransactionSet) -> Self {
        let tsi = vec![SortInfo::default(); ts.elements.len()];
        Self {
            ts,
            tsi,
            queue: VecDeque::new(),
            ordering: Vec::new(),
        }
    }

    /// Record every "q before p" relation
    fn build_relations(&mut self) {
        let n = self.ts.elements.len();

        // Erased packages take keys after the added ones
        let mut erased: AvailableList<usize> = AvailableList::new(self.ts.config.color);
        let base = self.ts.added.len();
        let mut added_slots: HashMap<AlKey, usize> = HashMap::new();
        for (slot, te) in self.ts.elements.iter().enumerate() {
            match te.element_type() {
                ElementType::Added => {
                    if let Some(key) = te.added_key() {
                        added_slots.insert(key, slot);
                        self.tsi[slot].order_key = key.0;
                    }
                }
                ElementType::Removed => {
                    if let Some(key) =
                        erased.add(None, slot, te.provides().clone(), te.files().clone())
                    {
                        self.tsi[slot].order_key = base + key.0;
                    }
                }
            }
        }
        erased.make_index();

        let mut selected = vec![false; n];
        for p in 0..n {
            if self.ts.elements[p].element_type() != ElementType::Added {
                continue;
            }
            selected.iter_mut().for_each(|s| *s = false);
            selected[p] = true;

            let flags: Vec<SenseFlags> = self.ts.elements[p]
                .requires()
                .iter()
                .map(|r| r.flags)
                .collect();

            // Prerequisites first
            for (reqx, f) in flags.iter().enumerate() {
                if f.is_install_prereq() || f.is_legacy_prereq() {
                    self.add_relation(p, reqx, &mut selected, &added_slots, &erased);
                }
            }
            for (reqx, f) in flags.iter().enumerate() {
                if f.is_erase_prereq() || f.is_install_prereq() || f.is_legacy_prereq() {
                    continue;
                }
                self.add_relation(p, reqx, &mut selected, &added_slots, &erased);
            }
        }

        let mut trees = 0;
        for (slot, te) in self.ts.elements.iter_mut().enumerate() {
            let npreds = self.tsi[slot].count;
            te.set_npreds(npreds);
            te.set_depth(1);
            te.set_degree(0);
            te.set_parent(None);
            if npreds == 0 {
                te.set_tree(Some(trees));
                trees += 1;
            } else {
                te.set_tree(None);
            }
        }
        debug!("{} ordering trees", trees);
    }

    fn add_relation(
        &mut self,
        p: usize,
        reqx: usize,
        selected: &mut [bool],
        added_slots: &HashMap<AlKey, usize>,
        erased: &AvailableList<usize>,
    ) {
        let Some(req) = self.ts.elements[p].requires().get(reqx) else {
            return;
        };
        if req.name.starts_with("rpmlib(") || req.name.starts_with("config(") {
            return;
        }

        let q = self
            .ts
            .added
            .satisfies_depend(req)
            .and_then(|key| added_slots.get(&key).copied())
            .or_else(|| {
                erased
                    .satisfies_depend(req)
                    .and_then(|key| erased.key(key).copied())
            });
        let Some(q) = q else {
            return;
        };
        if q == p {
            return;
        }

        let (pname, qname) = (self.ts.elements[p].name(), self.ts.elements[q].name());
        if self
            .ts
            .whiteouts
            .iter()
            .any(|w| w.successor == pname && w.predecessor == qname)
        {
            debug!("ignoring {} requires {} (whiteout)", pname, qname);
            return;
        }

        if selected[q] {
            return;
        }
        selected[q] = true;

        self.tsi[p].count += 1;
        let depth = self.ts.elements[q].depth() + 1;
        if self.ts.elements[p].depth() < depth {
            self.ts.elements[p].set_depth(depth);
        }
        self.tsi[q].successors.push(Relation { successor: p, reqx });
        self.tsi[q].qcnt += 1;
    }

    /// Queue `p` behind every element of equal or lower priority
    fn add_q(&mut self, p: usize) {
        let qcnt = self.tsi[p].qcnt;
        let pos = self
            .queue
            .iter()
            .position(|&q| self.tsi[q].qcnt > qcnt)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, p);
    }

    fn sort(&mut self) -> OrderOutcome {
        let n = self.ts.elements.len();
        let mut loopcheck = n;
        let mut rescans = self.ts.config.max_rescans;
        let mut printed = false;
        let mut tsbytes: u64 = 0;
        let mut peers: Vec<usize> = Vec::new();

        debug!(
            "========== tsorting packages (order, #predecessors, #succesors, tree, depth, breadth)"
        );

        loop {
            // Scan for zeroes
            for i in 0..n {
                if self.ts.config.anaconda_order {
                    self.tsi[i].qcnt = i;
                }
                if self.tsi[i].emitted || self.tsi[i].count != 0 {
                    continue;
                }
                self.add_q(i);
            }

            while let Some(q) = self.queue.pop_front() {
                let te = &self.ts.elements[q];
                let depth = te.depth();
                let tree = te.tree();
                if peers.len() <= depth {
                    peers.resize(depth + 1, 0);
                }
                let breadth = peers[depth];
                peers[depth] += 1;

                debug!(
                    "{:5}{:5}{:5}{:5}{:5}{:5} {:indent$}{}{}",
                    self.ordering.len(),
                    te.npreds(),
                    self.tsi[q].qcnt,
                    tree.map_or(-1, |t| t as i64),
                    depth,
                    breadth,
                    "",
                    te.element_type(),
                    te.nevra(),
                    indent = 2 * depth
                );
                tsbytes += te.pkg_file_size();

                self.ts.elements[q].set_degree(0);
                self.tsi[q].emitted = true;
                self.ordering.push(self.tsi[q].order_key);
                loopcheck -= 1;

                // Release the successors
                let successors = std::mem::take(&mut self.tsi[q].successors);
                for rel in successors.iter().rev() {
                    let p = rel.successor;
                    self.tsi[p].count = self.tsi[p].count.saturating_sub(1);
                    if self.tsi[p].count == 0 {
                        self.ts.elements[p].set_tree(tree);
                        self.ts.elements[p].set_depth(depth + 1);
                        self.ts.elements[p].set_parent(Some(q));
                        let degree = self.ts.elements[q].degree();
                        self.ts.elements[q].set_degree(degree + 1);
                        self.add_q(p);
                    }
                }

                if !printed && loopcheck == self.queue.len() && !self.queue.is_empty() {
                    printed = true;
                    debug!("========== successors only ({} bytes)", tsbytes);
                }
            }

            if loopcheck == 0 {
                break;
            }

            let nzaps = self.break_loops();
            if nzaps > 0 && rescans > 0 {
                rescans -= 1;
                debug!("========== continuing tsort ...");
                continue;
            }

            error!("ordering failed, {} elements remain", loopcheck);
            return OrderOutcome::Unordered {
                remaining: loopcheck,
            };
        }

        self.permute();
        OrderOutcome::Ordered
    }

    /// Report every loop among the unemitted elements and drop one plain
    /// requirement from each. Returns the number of dropped relations.
    fn break_loops(&mut self) -> usize {
        let n = self.tsi.len();
        let mut nzaps = 0;

        for info in &mut self.tsi {
            info.chain = None;
            info.visited = false;
        }

        for q in 0..n {
            if self.tsi[q].emitted || self.tsi[q].successors.is_empty() {
                continue;
            }
            self.mark_loop(q);
        }

        for r in 0..n {
            let mut budget = 1;
            let mut reported = false;

            // Find where the predecessor chain closes on itself
            let mut q = self.tsi[r].chain;
            while let Some(x) = q {
                if self.tsi[x].visited {
                    break;
                }
                self.tsi[x].visited = true;
                q = self.tsi[x].chain;
            }

            while let Some(p) = q {
                let Some(pred) = self.tsi[p].chain else {
                    break;
                };
                self.tsi[p].chain = None;
                if !reported {
                    warn!("LOOP:");
                    reported = true;
                }
                let desc = self.zap_relation(pred, p, &mut budget, &mut nzaps);
                warn!(
                    "    {:<40} {}",
                    self.ts.elements[p].nevra(),
                    desc.as_deref().unwrap_or("not found!?!")
                );
                q = Some(pred);
            }

            // Clear the linear part of the chain
            let mut p = r;
            while let Some(x) = self.tsi[p].chain {
                self.tsi[p].chain = None;
                self.tsi[p].visited = false;
                p = x;
            }
        }

        nzaps
    }

    /// Chain every element reachable from `start` to the predecessor it was
    /// first reached from. `start`'s own edges are not followed again.
    fn mark_loop(&mut self, start: usize) {
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(top) = stack.last_mut() {
            let q = top.0;
            let edges = &self.tsi[q].successors;
            if top.1 >= edges.len() {
                stack.pop();
                continue;
            }
            let p = edges[edges.len() - 1 - top.1].successor;
            top.1 += 1;

            if self.tsi[p].chain.is_some() {
                continue;
            }
            self.tsi[p].chain = Some(q);
            if p != start && !self.tsi[p].successors.is_empty() {
                stack.push((p, 0));
            }
        }
    }

    /// Describe the requirement behind the `q` before `p` relation and drop
    /// it while the budget allows and it is not a prerequisite
    fn zap_relation(
        &mut self,
        q: usize,
        p: usize,
        budget: &mut usize,
        nzaps: &mut usize,
    ) -> Option<String> {
        let pos = self.tsi[q].successors.iter().rposition(|r| r.successor == p)?;
        let reqx = self.tsi[q].successors[pos].reqx;
        let req = self.ts.elements[p].requires().get(reqx)?;
        let desc = format!("{} {}", req.flags.identify(), req);

        if *budget > 0 && !req.flags.contains(SenseFlags::PREREQ) {
            warn!(
                "removing {} \"{}\" from tsort relations.",
                self.ts.elements[p].nevra(),
                desc
            );
            self.tsi[p].count = self.tsi[p].count.saturating_sub(1);
            self.tsi[q].successors.remove(pos);
            *nzaps += 1;
            *budget -= 1;
        }
        Some(desc)
    }

    /// Rearrange the elements into emission order
    fn permute(&mut self) {
        let n = self.ts.elements.len();
        let mut keys: Vec<(usize, usize)> = self
            .tsi
            .iter()
            .enumerate()
            .map(|(slot, info)| (info.order_key, slot))
            .collect();
        keys.sort_unstable();

        let mut new_slot = vec![0; n];
        let mut order = Vec::with_capacity(n);
        for key in &self.ordering {
            if let Ok(ix) = keys.binary_search_by(|(k, _)| k.cmp(key)) {
                let slot = keys[ix].1;
                new_slot[slot] = order.len();
                order.push(slot);
            }
        }
        assert_eq!(order.len(), n, "ordered element count mismatch");

        let mut old: Vec<Option<_>> = std::mem::take(&mut self.ts.elements)
            .into_iter()
            .map(Some)
            .collect();
        for slot in order {
            if let Some(mut te) = old[slot].take() {
                te.set_parent(te.parent().map(|p| new_slot[p]));
                self.ts.elements.push(te);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransactionConfig;
    use crate::header::{HeaderBuilder, HeaderRef};
    use std::cell::Cell;
    use std::rc::Rc;

    fn add(ts: &mut TransactionSet, b: HeaderBuilder) {
        let h: HeaderRef = Rc::new(b.build().unwrap());
        ts.add_install_element(h, None, false, vec![]).unwrap();
    }

    fn names(ts: &TransactionSet) -> Vec<&str> {
        ts.elements().iter().map(|te| te.name()).collect()
    }

    #[test]
    fn test_requirement_ordered_first() {
        let mut ts = TransactionSet::new(TransactionConfig::default());
        add(&mut ts, HeaderBuilder::new("A", "1", "1").requires("B >= 2"));
        add(&mut ts, HeaderBuilder::new("B", "2", "1").provides("B = 2"));

        assert_eq!(ts.order(), OrderOutcome::Ordered);
        assert_eq!(names(&ts), vec!["B", "A"]);
        assert_eq!(ts.elements()[1].parent(), Some(0));
        assert_eq!(ts.elements()[1].depth(), 2);
        assert_eq!(ts.elements()[0].degree(), 1);
    }

    #[test]
    fn test_fewer_successors_first() {
        let mut ts = TransactionSet::new(TransactionConfig::default());
        add(&mut ts, HeaderBuilder::new("lib", "1", "1"));
        add(&mut ts, HeaderBuilder::new("tool", "1", "1"));
        add(&mut ts, HeaderBuilder::new("app", "1", "1").requires("lib"));

        assert_eq!(ts.order(), OrderOutcome::Ordered);
        assert_eq!(names(&ts), vec!["tool", "lib", "app"]);
    }

    #[test]
    fn test_anaconda_keeps_presentation_order() {
        let mut config = TransactionConfig::default();
        config.anaconda_order = true;
        let mut ts = TransactionSet::new(config);
        add(&mut ts, HeaderBuilder::new("lib", "1", "1"));
        add(&mut ts, HeaderBuilder::new("tool", "1", "1"));
        add(&mut ts, HeaderBuilder::new("app", "1", "1").requires("lib"));

        assert_eq!(ts.order(), OrderOutcome::Ordered);
        assert_eq!(names(&ts), vec!["lib", "tool", "app"]);
    }

    #[test]
    fn test_three_cycle_breaks_one_edge() {
        let mut ts = TransactionSet::new(TransactionConfig::default());
        add(&mut ts, HeaderBuilder::new("A", "1", "1").requires("B"));
        add(&mut ts, HeaderBuilder::new("B", "1", "1").requires("C"));
        add(&mut ts, HeaderBuilder::new("C", "1", "1").requires("A"));

        assert_eq!(ts.order(), OrderOutcome::Ordered);
        assert_eq!(names(&ts), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_prereq_loop_is_unorderable() {
        let mut ts = TransactionSet::new(TransactionConfig::default());
        add(
            &mut ts,
            HeaderBuilder::new("A", "1", "1").requires_with("B", SenseFlags::SCRIPT_PRE, ""),
        );
        add(
            &mut ts,
            HeaderBuilder::new("B", "1", "1").requires_with("A", SenseFlags::SCRIPT_POST, ""),
        );
        let seen = Rc::new(Cell::new(0));
        let hook_seen = seen.clone();
        ts.set_rollback_hook(Box::new(move |remaining| hook_seen.set(remaining)));

        assert_eq!(ts.order(), OrderOutcome::Unordered { remaining: 2 });
        assert_eq!(seen.get(), 2);
        assert_eq!(names(&ts), vec!["A", "B"]);
    }

    #[test]
    fn test_whiteout_drops_edge() {
        let mut config = TransactionConfig::default();
        config.dependency_whiteout = vec!["A>B".to_string()];
        let mut ts = TransactionSet::new(config);
        add(&mut ts, HeaderBuilder::new("A", "1", "1").requires("B"));
        add(&mut ts, HeaderBuilder::new("B", "1", "1").requires("A"));

        assert_eq!(ts.order(), OrderOutcome::Ordered);
        assert_eq!(names(&ts), vec!["A", "B"]);
    }

    #[test]
    fn test_rpmlib_and_self_requirements_make_no_edges() {
        let mut ts = TransactionSet::new(TransactionConfig::default());
        add(
            &mut ts,
            HeaderBuilder::new("A", "1", "1")
                .requires("A")
                .requires_with("rpmlib(PayloadIsXz)", SenseFlags::LE | SenseFlags::RPMLIB, "5.2-1"),
        );
        assert_eq!(ts.order(), OrderOutcome::Ordered);
        assert_eq!(ts.elements()[0].npreds(), 0);
        assert_eq!(ts.elements()[0].tree(), Some(0));
    }
}
