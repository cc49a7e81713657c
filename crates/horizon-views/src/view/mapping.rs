//! Mapping from view positions to source indices.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Where the new-item placeholder is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderPosition {
    /// No placeholder.
    #[default]
    None,
    /// Before every item.
    AtBeginning,
    /// After every item.
    AtEnd,
}

/// One position of the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Placeholder,
    Source(usize),
}

/// Internal mapping, analogous to a proxy's row mapping but with
/// structural entries for the placeholder and the item being added.
#[derive(Debug, Default)]
pub(crate) struct ViewMapping {
    /// Visible source indices in view order, excluding the item being added.
    pub(crate) sorted: Vec<usize>,
    /// Source index of the item being added, shown next to the placeholder.
    pub(crate) new_item: Option<usize>,
    pub(crate) placeholder: PlaceholderPosition,
    slots: Vec<Slot>,
}

impl ViewMapping {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, position: usize) -> Option<Slot> {
        self.slots.get(position).copied()
    }

    #[cfg(test)]
    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Lays out the final sequence around `body`, which is either the
    /// sorted indices or the flattened group tree.
    pub(crate) fn rebuild_slots(&mut self, body: &[usize]) {
        let mut slots = Vec::with_capacity(body.len() + 2);
        if self.placeholder == PlaceholderPosition::AtBeginning {
            slots.push(Slot::Placeholder);
            slots.extend(self.new_item.map(Slot::Source));
            slots.extend(body.iter().copied().map(Slot::Source));
        } else {
            slots.extend(body.iter().copied().map(Slot::Source));
            slots.extend(self.new_item.map(Slot::Source));
            if self.placeholder == PlaceholderPosition::AtEnd {
                slots.push(Slot::Placeholder);
            }
        }
        self.slots = slots;
    }

    pub(crate) fn placeholder_slot(&self) -> Option<usize> {
        match self.placeholder {
            PlaceholderPosition::None => None,
            PlaceholderPosition::AtBeginning => Some(0),
            PlaceholderPosition::AtEnd => self.slots.len().checked_sub(1),
        }
    }

    /// Every position showing `index`. Several positions occur when an item
    /// belongs to more than one group.
    pub(crate) fn positions_of(&self, index: usize) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| **slot == Slot::Source(index))
            .map(|(position, _)| position)
            .collect()
    }

    /// The position of `index` closest to `near`.
    pub(crate) fn position_near(&self, index: usize, near: Option<usize>) -> Option<usize> {
        let positions = self.positions_of(index);
        match near {
            Some(near) => positions.into_iter().min_by_key(|&p| p.abs_diff(near)),
            None => positions.first().copied(),
        }
    }

    /// Inserts a visible index in order.
    pub(crate) fn insert_sorted(&mut self, index: usize, order: &dyn Fn(usize, usize) -> Ordering) {
        let at = self.sorted.partition_point(|&other| order(other, index).is_lt());
        self.sorted.insert(at, index);
    }

    pub(crate) fn remove_sorted(&mut self, index: usize) -> bool {
        match self.sorted.iter().position(|&other| other == index) {
            Some(at) => {
                self.sorted.remove(at);
                true
            }
            None => false,
        }
    }

    /// Adjusts stored indices after a source insertion at `at`.
    pub(crate) fn shift_inserted(&mut self, at: usize) {
        for index in self.sorted.iter_mut().chain(self.new_item.as_mut()) {
            if *index >= at {
                *index += 1;
            }
        }
    }

    /// Adjusts stored indices after a source removal at `at`. The removed
    /// index must already be gone.
    pub(crate) fn shift_removed(&mut self, at: usize) {
        for index in self.sorted.iter_mut().chain(self.new_item.as_mut()) {
            if *index > at {
                *index -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(placeholder: PlaceholderPosition, new_item: Option<usize>, body: &[usize]) -> ViewMapping {
        let mut mapping = ViewMapping {
            sorted: body.to_vec(),
            new_item,
            placeholder,
            ..Default::default()
        };
        mapping.rebuild_slots(body);
        mapping
    }

    #[test]
    fn test_layouts() {
        let m = mapping(PlaceholderPosition::AtBeginning, Some(9), &[2, 1]);
        assert_eq!(
            m.slots(),
            &[Slot::Placeholder, Slot::Source(9), Slot::Source(2), Slot::Source(1)]
        );
        assert_eq!(m.placeholder_slot(), Some(0));

        let m = mapping(PlaceholderPosition::AtEnd, Some(9), &[2, 1]);
        assert_eq!(
            m.slots(),
            &[Slot::Source(2), Slot::Source(1), Slot::Source(9), Slot::Placeholder]
        );
        assert_eq!(m.placeholder_slot(), Some(3));

        let m = mapping(PlaceholderPosition::None, Some(9), &[2, 1]);
        assert_eq!(m.slots(), &[Slot::Source(2), Slot::Source(1), Slot::Source(9)]);
        assert_eq!(m.placeholder_slot(), None);
    }

    #[test]
    fn test_positions_of_repeated_index() {
        let m = mapping(PlaceholderPosition::None, None, &[0, 3, 1, 3]);
        assert_eq!(m.positions_of(3), vec![1, 3]);
        assert_eq!(m.position_near(3, Some(3)), Some(3));
        assert_eq!(m.position_near(3, None), Some(1));
        assert!(m.positions_of(7).is_empty());
    }

    #[test]
    fn test_insert_sorted_and_shift() {
        let mut m = mapping(PlaceholderPosition::None, Some(4), &[0, 2]);
        m.shift_inserted(1);
        assert_eq!(m.sorted, vec![0, 3]);
        assert_eq!(m.new_item, Some(5));
        m.insert_sorted(1, &|a, b| a.cmp(&b));
        assert_eq!(m.sorted, vec![0, 1, 3]);

        assert!(m.remove_sorted(1));
        m.shift_removed(1);
        assert_eq!(m.sorted, vec![0, 2]);
        assert_eq!(m.new_item, Some(4));
    }
}
