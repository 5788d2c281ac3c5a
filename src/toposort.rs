use rustc_hash::FxHashMap;
use tracing::warn;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Orders `items` so that every item comes after the items it depends on.
///
/// `describe` returns an item's key and the keys it depends on. Dependencies
/// on keys that are not among `items` are ignored. Each item is visited once:
/// a dependency that is already in progress (a cycle) is logged and skipped,
/// so the result always contains every item exactly once.
pub fn topological_sort<'a, T, F>(items: &'a [T], describe: F) -> Vec<&'a T>
where
    F: Fn(&'a T) -> (&'a str, Vec<&'a str>),
{
    let described: Vec<(&str, Vec<&str>)> = items.iter().map(&describe).collect();
    let index: FxHashMap<&str, usize> = described
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (*key, i))
        .collect();

    let mut marks = vec![Mark::Unvisited; items.len()];
    let mut order = Vec::with_capacity(items.len());
    for i in 0..items.len() {
        visit(i, &described, &index, &mut marks, &mut order);
    }

    order.into_iter().map(|i| &items[i]).collect()
}

fn visit(
    i: usize,
    described: &[(&str, Vec<&str>)],
    index: &FxHashMap<&str, usize>,
    marks: &mut [Mark],
    order: &mut Vec<usize>,
) {
    match marks[i] {
        Mark::Done => return,
        Mark::InProgress => {
            warn!(key = described[i].0, "Dependency cycle detected");
            return;
        }
        Mark::Unvisited => {}
    }

    marks[i] = Mark::InProgress;
    for dependency in &described[i].1 {
        if let Some(&j) = index.get(dependency) {
            visit(j, described, index, marks, order);
        }
    }
    marks[i] = Mark::Done;
    order.push(i);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        key: &'static str,
        deps: Vec<&'static str>,
    }

    fn node(key: &'static str, deps: &[&'static str]) -> Node {
        Node {
            key,
            deps: deps.to_vec(),
        }
    }

    fn sort(nodes: &[Node]) -> Vec<&'static str> {
        topological_sort(nodes, |n| (n.key, n.deps.clone()))
            .into_iter()
            .map(|n| n.key)
            .collect()
    }

    fn position(order: &[&str], key: &str) -> usize {
        order.iter().position(|k| *k == key).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let nodes = vec![
            node("orders", &["customers", "products"]),
            node("products", &["brands"]),
            node("customers", &[]),
            node("brands", &[]),
        ];
        let order = sort(&nodes);
        assert_eq!(order.len(), 4);
        assert!(position(&order, "customers") < position(&order, "orders"));
        assert!(position(&order, "products") < position(&order, "orders"));
        assert!(position(&order, "brands") < position(&order, "products"));
    }

    #[test]
    fn independent_items_keep_input_order() {
        let nodes = vec![node("a", &[]), node("b", &[]), node("c", &[])];
        assert_eq!(sort(&nodes), vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_dependencies_are_ignored() {
        let nodes = vec![node("a", &["elsewhere"]), node("b", &["a"])];
        assert_eq!(sort(&nodes), vec!["a", "b"]);
    }

    #[test]
    fn cycles_visit_each_key_once() {
        let nodes = vec![node("a", &["b"]), node("b", &["c"]), node("c", &["a"])];
        let mut order = sort(&nodes);
        assert_eq!(order.len(), 3);
        order.sort();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn self_dependency_is_tolerated() {
        let nodes = vec![node("a", &["a"]), node("b", &["a"])];
        assert_eq!(sort(&nodes), vec!["a", "b"]);
    }
}
