use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::domain::Build;

/// Source builds in order of preference when several are equally close to a target
pub const SOURCE_PREFERENCE: [Build; 6] = [
    Build::B37,
    Build::B38,
    Build::B36,
    Build::B35,
    Build::B34,
    Build::B33,
];

/// A locus to lift: its known coordinates and the builds it still needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    pub id: String,
    pub known: BTreeMap<Build, u64>,
    pub wanted: BTreeSet<Build>,
}

/// One direct transform edge used by a locus, at its distance from the locus' sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hop {
    pub level: usize,
    pub source: Build,
    pub target: Build,
}

/// Per locus id, the `(source, target)` edges that already left it unmapped
pub type DeadEdges = HashMap<String, BTreeSet<(Build, Build)>>;

/// Edges a locus needs to reach every wanted build, using the shortest route from any
/// known build. Builds unreachable from the known ones are skipped.
pub fn hops_for(locus: &Locus) -> Vec<Hop> {
    hops_avoiding(locus, &BTreeSet::new())
}

/// Like [`hops_for`], but routes around `dead` edges.
pub fn hops_avoiding(locus: &Locus, dead: &BTreeSet<(Build, Build)>) -> Vec<Hop> {
    let mut parent: BTreeMap<Build, (Build, usize)> = BTreeMap::new();
    let mut queue: VecDeque<(Build, usize)> = VecDeque::new();
    let mut visited: BTreeSet<Build> = BTreeSet::new();

    for build in SOURCE_PREFERENCE {
        if locus.known.contains_key(&build) {
            visited.insert(build);
            queue.push_back((build, 0));
        }
    }

    while let Some((build, level)) = queue.pop_front() {
        for next in build.direct_targets() {
            if dead.contains(&(build, *next)) {
                continue;
            }
            if visited.insert(*next) {
                parent.insert(*next, (build, level + 1));
                queue.push_back((*next, level + 1));
            }
        }
    }

    let mut hops = BTreeSet::new();
    for wanted in &locus.wanted {
        if locus.known.contains_key(wanted) {
            continue;
        }
        let mut target = *wanted;
        while let Some((source, level)) = parent.get(&target) {
            if !hops.insert(Hop {
                level: *level,
                source: *source,
                target,
            }) {
                break;
            }
            target = *source;
        }
    }

    hops.into_iter().collect()
}

/// Per level, the loci each `(source, target)` job carries. Levels are ascending and
/// every job at level `n` only depends on jobs at levels below `n`.
pub type HopPlan = BTreeMap<usize, BTreeMap<(Build, Build), Vec<String>>>;

pub fn plan(loci: &[Locus]) -> HopPlan {
    plan_avoiding(loci, &DeadEdges::new())
}

pub fn plan_avoiding(loci: &[Locus], dead: &DeadEdges) -> HopPlan {
    let none = BTreeSet::new();
    let mut plan = HopPlan::new();
    for locus in loci {
        for hop in hops_avoiding(locus, dead.get(&locus.id).unwrap_or(&none)) {
            plan.entry(hop.level)
                .or_default()
                .entry((hop.source, hop.target))
                .or_default()
                .push(locus.id.clone());
        }
    }
    plan
}
