//! Editing ordered sibling collections.
//!
//! A collection is the set of element children of one container, optionally
//! restricted to one tag: the `p:sldId` entries of a slide list, the shapes of
//! a shape tree, the layouts of a master. Order is meaningful (list order,
//! z-order), so nothing here reorders unless asked to. Text nodes between
//! members stay where they are.

use crate::common::xml::{XmlElement, XmlNode};
use log::warn;

/// Child-node indices of the members of `parent`, in document order.
fn member_slots(parent: &XmlElement, tag: Option<&str>) -> Vec<usize> {
    parent
        .children()
        .iter()
        .enumerate()
        .filter_map(|(slot, node)| match node {
            XmlNode::Element(el) if tag.is_none_or(|t| el.is(t)) => Some(slot),
            _ => None,
        })
        .collect()
}

/// Number of members.
pub fn len(parent: &XmlElement, tag: Option<&str>) -> usize {
    member_slots(parent, tag).len()
}

/// Remove members, returning how many went.
///
/// Without `from`, everything past the first `keep` members is removed.
/// With `from`, the members at positions `from..keep` are removed and the
/// ones after `keep` survive.
pub fn truncate(parent: &mut XmlElement, tag: Option<&str>, keep: usize, from: Option<usize>) -> usize {
    let slots = member_slots(parent, tag);
    let doomed: Vec<usize> = match from {
        Some(from) => slots
            .get(from..keep.min(slots.len()))
            .map(<[usize]>::to_vec)
            .unwrap_or_default(),
        None => slots.get(keep..).map(<[usize]>::to_vec).unwrap_or_default(),
    };
    // Back to front so earlier slots stay valid.
    for &slot in doomed.iter().rev() {
        parent.children_mut().remove(slot);
    }
    doomed.len()
}

/// Move members to the end in the order given by `permutation`, a list of
/// original positions. See [`reorder_with`].
pub fn reorder(parent: &mut XmlElement, tag: Option<&str>, permutation: &[usize]) -> usize {
    reorder_with(parent, tag, permutation, |_, _| {})
}

/// Re-append members in `permutation` order, calling `callback(member, i)`
/// for the member at `permutation[i]` before it moves.
///
/// Out-of-range positions are logged and skipped. Members the permutation
/// does not mention keep their relative order ahead of the moved ones.
/// Returns the number of moves applied.
pub fn reorder_with<F>(
    parent: &mut XmlElement,
    tag: Option<&str>,
    permutation: &[usize],
    mut callback: F,
) -> usize
where
    F: FnMut(&mut XmlElement, usize),
{
    let slots = member_slots(parent, tag);
    let mut order: Vec<usize> = (0..parent.children().len()).collect();
    let mut moved = 0;

    for (i, &index) in permutation.iter().enumerate() {
        let Some(&slot) = slots.get(index) else {
            warn!(
                "reorder: index {} out of range for {} members of <{}>",
                index,
                slots.len(),
                parent.name()
            );
            continue;
        };
        if let Some(el) = parent.children_mut()[slot].as_element_mut() {
            callback(el, i);
        }
        order.retain(|&s| s != slot);
        order.push(slot);
        moved += 1;
    }

    let mut nodes: Vec<Option<XmlNode>> = std::mem::take(parent.children_mut())
        .into_iter()
        .map(Some)
        .collect();
    *parent.children_mut() = order
        .into_iter()
        .filter_map(|slot| nodes[slot].take())
        .collect();
    moved
}

/// Call `callback(member, position)` on every member, in order.
pub fn transform<F>(parent: &mut XmlElement, tag: Option<&str>, mut callback: F)
where
    F: FnMut(&mut XmlElement, usize),
{
    let slots = member_slots(parent, tag);
    for (position, slot) in slots.into_iter().enumerate() {
        if let Some(el) = parent.children_mut()[slot].as_element_mut() {
            callback(el, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::xml::XmlDocument;

    fn list(n: usize) -> XmlElement {
        let mut parent = XmlElement::new("p:sldIdLst");
        for i in 0..n {
            parent.push_element(XmlElement::new("p:sldId").with_attr("orig", &i.to_string()));
        }
        parent
    }

    fn attrs(parent: &XmlElement, name: &str) -> Vec<String> {
        parent.elements().filter_map(|el| el.attr(name)).collect()
    }

    #[test]
    fn test_reorder_with_stamp() {
        let mut parent = list(5);
        let moved = reorder_with(&mut parent, Some("p:sldId"), &[2, 0, 1, 4, 3], |el, i| {
            el.set_attr("pos", &i.to_string());
        });
        assert_eq!(moved, 5);
        assert_eq!(attrs(&parent, "orig"), ["2", "0", "1", "4", "3"]);
        assert_eq!(attrs(&parent, "pos"), ["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_reorder_skips_out_of_range() {
        let mut parent = list(3);
        let moved = reorder(&mut parent, None, &[7, 0]);
        assert_eq!(moved, 1);
        assert_eq!(attrs(&parent, "orig"), ["1", "2", "0"]);
    }

    #[test]
    fn test_reorder_keeps_non_members_in_place() {
        let doc = XmlDocument::parse(
            br#"<p:spTree><p:nvGrpSpPr/><p:sp n="a"/><p:pic n="b"/><p:sp n="c"/></p:spTree>"#,
        )
        .unwrap();
        let mut tree = doc.root().clone();
        reorder(&mut tree, Some("p:sp"), &[1, 0]);
        let names: Vec<_> = tree.elements().map(|el| el.name().to_string()).collect();
        assert_eq!(names, ["p:nvGrpSpPr", "p:pic", "p:sp", "p:sp"]);
        assert_eq!(attrs(&tree, "n"), ["b", "c", "a"]);
    }

    #[test]
    fn test_truncate_tail_and_range() {
        let mut parent = list(5);
        assert_eq!(truncate(&mut parent, None, 3, None), 2);
        assert_eq!(attrs(&parent, "orig"), ["0", "1", "2"]);

        let mut parent = list(5);
        assert_eq!(truncate(&mut parent, Some("p:sldId"), 3, Some(1)), 2);
        assert_eq!(attrs(&parent, "orig"), ["0", "3", "4"]);

        let mut parent = list(2);
        assert_eq!(truncate(&mut parent, None, 5, None), 0);
        assert_eq!(truncate(&mut parent, None, 1, Some(4)), 0);
        assert_eq!(len(&parent, None), 2);
    }

    #[test]
    fn test_transform_visits_in_order() {
        let mut parent = list(3);
        let mut seen = Vec::new();
        transform(&mut parent, None, |el, position| {
            seen.push((el.attr("orig").unwrap_or_default(), position));
            el.set_attr("visited", "1");
        });
        assert_eq!(seen, [("0".to_string(), 0), ("1".to_string(), 1), ("2".to_string(), 2)]);
        assert_eq!(attrs(&parent, "visited").len(), 3);
    }
}
