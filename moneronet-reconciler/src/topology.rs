//! Peer wiring for networks of node sets.

use std::collections::BTreeSet;

pub const EXCLUSIVE_NODE_FLAG: &str = "--add-exclusive-node";

/// Sorted, de-duplicated union of two argument lists.
pub fn merged_slice<A, B>(a: A, b: B) -> Vec<String>
where
    A: IntoIterator,
    A::Item: Into<String>,
    B: IntoIterator,
    B::Item: Into<String>,
{
    a.into_iter()
        .map(Into::into)
        .chain(b.into_iter().map(Into::into))
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// Exclusive-peer arguments for member `self_index` of a network of `total`
/// members: one per other member, addressed through `address_of`, sorted.
pub fn plan_exclusive_peers<F>(self_index: u32, total: u32, address_of: F) -> Vec<String>
where
    F: Fn(u32) -> String,
{
    (0..total)
        .filter(|&peer| peer != self_index)
        .map(|peer| format!("{EXCLUSIVE_NODE_FLAG}={}", address_of(peer)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn member(index: u32) -> String {
        format!("mainnet-{index}")
    }

    #[test]
    fn merge_is_sorted_and_deduplicated() {
        assert_eq!(merged_slice(["--a"], ["--b", "--a"]), vec!["--a", "--b"]);
        assert_eq!(merged_slice(["--b", "--a"], ["--a"]), vec!["--a", "--b"]);
        assert_eq!(merged_slice(Vec::<String>::new(), Vec::<String>::new()), Vec::<String>::new());
    }

    #[test]
    fn solo_member_has_no_peers() {
        assert!(plan_exclusive_peers(0, 1, member).is_empty());
    }

    #[test]
    fn three_members_reference_each_other() {
        assert_eq!(
            plan_exclusive_peers(1, 3, member),
            vec![
                "--add-exclusive-node=mainnet-0",
                "--add-exclusive-node=mainnet-2",
            ]
        );
    }

    #[test]
    fn plans_form_a_complete_graph() {
        for total in 1..=12u32 {
            let mut edges = BTreeSet::new();
            for i in 0..total {
                let plan = plan_exclusive_peers(i, total, member);
                assert_eq!(plan.len() as u32, total - 1);
                let own = format!("{EXCLUSIVE_NODE_FLAG}={}", member(i));
                assert!(!plan.contains(&own));
                let mut sorted = plan.clone();
                sorted.sort();
                assert_eq!(plan, sorted);
                for arg in plan {
                    edges.insert((member(i), arg.trim_start_matches("--add-exclusive-node=").to_owned()));
                }
            }
            assert_eq!(edges.len() as u32, total * (total - 1));
        }
    }
}
