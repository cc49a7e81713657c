//! Group trees over a view's ordered items.
//!
//! Groups are ordered by the first appearance of their key in the sorted,
//! filtered sequence, not by key value. The tree stores source indices at
//! its leaves and is maintained per item on incremental changes.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use horizon_views_core::logging::targets;

use crate::error::Result;
use crate::item::{CollectionItem, ItemHandle, ViewItem, resolve_accessor};
use crate::value::PropertyValue;

/// Extracts the group keys of an item.
pub type GroupKeyFn<T> = Arc<dyn Fn(&T) -> Vec<PropertyValue> + Send + Sync>;

/// One level of grouping.
///
/// A description maps an item to one or more keys. An item with several
/// keys is a member of each matching group.
pub struct GroupDescription<T> {
    name: String,
    from_property: bool,
    keys: GroupKeyFn<T>,
}

impl<T> Clone for GroupDescription<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            from_property: self.from_property,
            keys: self.keys.clone(),
        }
    }
}

impl<T: CollectionItem> GroupDescription<T> {
    /// Groups by the value of a property path.
    ///
    /// Fails with a configuration error if `T` has no such property.
    pub fn by_property(path: &str) -> Result<Self> {
        let accessor = resolve_accessor::<T>(path)?;
        Ok(Self {
            name: path.to_string(),
            from_property: true,
            keys: Arc::new(move |item| vec![accessor(item)]),
        })
    }

    /// Groups by a single computed key.
    pub fn by_key<F, V>(name: impl Into<String>, key: F) -> Self
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<PropertyValue>,
    {
        Self {
            name: name.into(),
            from_property: false,
            keys: Arc::new(move |item| vec![key(item).into()]),
        }
    }

    /// Groups by any number of computed keys.
    pub fn by_keys<F>(name: impl Into<String>, keys: F) -> Self
    where
        F: Fn(&T) -> Vec<PropertyValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            from_property: false,
            keys: Arc::new(keys),
        }
    }

    /// The property path or name this description was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property path, for descriptions made with [`by_property`](Self::by_property).
    pub fn property_path(&self) -> Option<&str> {
        self.from_property.then_some(self.name.as_str())
    }

    /// The distinct keys of `item`. An item without keys gets the null key.
    pub fn keys_for(&self, item: &T) -> Vec<PropertyValue> {
        let mut keys: Vec<PropertyValue> = Vec::new();
        for key in (self.keys)(item) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            keys.push(PropertyValue::None);
        }
        keys
    }
}

impl<T> fmt::Debug for GroupDescription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupDescription").field("name", &self.name).finish()
    }
}

/// A group in a snapshot of a view's group tree.
pub struct Group<T> {
    key: PropertyValue,
    path: Vec<PropertyValue>,
    entries: Vec<GroupEntry<T>>,
    item_count: usize,
}

impl<T> Group<T> {
    /// The key shared by the group's items.
    pub fn key(&self) -> &PropertyValue {
        &self.key
    }

    /// Keys of the enclosing groups, outermost first.
    pub fn path(&self) -> &[PropertyValue] {
        &self.path
    }

    /// Nesting depth, `0` for top-level groups.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// The subgroups or items of this group, in view order.
    pub fn entries(&self) -> &[GroupEntry<T>] {
        &self.entries
    }

    /// Number of items in this group and its subgroups.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Returns `true` if the entries are items rather than subgroups.
    pub fn is_bottom_level(&self) -> bool {
        self.entries.iter().all(|e| matches!(e, GroupEntry::Item(_)))
    }

    /// The direct subgroups.
    pub fn subgroups(&self) -> impl Iterator<Item = &Group<T>> {
        self.entries.iter().filter_map(GroupEntry::as_group)
    }

    /// Every item of the group, depth first.
    pub fn items(&self) -> Vec<ViewItem<T>> {
        let mut out = Vec::with_capacity(self.item_count);
        collect_items(&self.entries, &mut out);
        out
    }

    /// Finds a direct subgroup by key.
    pub fn subgroup(&self, key: &PropertyValue) -> Option<&Group<T>> {
        self.subgroups().find(|g| &g.key == key)
    }
}

fn collect_items<T>(entries: &[GroupEntry<T>], out: &mut Vec<ViewItem<T>>) {
    for entry in entries {
        match entry {
            GroupEntry::Group(group) => collect_items(&group.entries, out),
            GroupEntry::Item(item) => out.push(item.clone()),
        }
    }
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            path: self.path.clone(),
            entries: self.entries.clone(),
            item_count: self.item_count,
        }
    }
}

impl<T> fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("item_count", &self.item_count)
            .finish()
    }
}

/// An entry of a group list: a group or a single item.
pub enum GroupEntry<T> {
    /// A group.
    Group(Group<T>),
    /// An item, or the placeholder at the top level.
    Item(ViewItem<T>),
}

impl<T> GroupEntry<T> {
    /// The group, if this entry is one.
    pub fn as_group(&self) -> Option<&Group<T>> {
        match self {
            GroupEntry::Group(group) => Some(group),
            GroupEntry::Item(_) => None,
        }
    }

    /// The item, if this entry is one.
    pub fn as_item(&self) -> Option<&ViewItem<T>> {
        match self {
            GroupEntry::Item(item) => Some(item),
            GroupEntry::Group(_) => None,
        }
    }
}

impl<T> Clone for GroupEntry<T> {
    fn clone(&self) -> Self {
        match self {
            GroupEntry::Group(group) => GroupEntry::Group(group.clone()),
            GroupEntry::Item(item) => GroupEntry::Item(item.clone()),
        }
    }
}

impl<T> fmt::Debug for GroupEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupEntry::Group(group) => group.fmt(f),
            GroupEntry::Item(ViewItem::Placeholder) => f.write_str("Placeholder"),
            GroupEntry::Item(ViewItem::Item(_)) => f.write_str("Item"),
        }
    }
}

#[derive(Debug)]
enum GroupContent {
    Groups(Vec<GroupNode>),
    Leaves(Vec<usize>),
}

#[derive(Debug)]
struct GroupNode {
    key: PropertyValue,
    content: GroupContent,
}

impl GroupNode {
    fn new(key: PropertyValue, bottom: bool) -> Self {
        let content = if bottom {
            GroupContent::Leaves(Vec::new())
        } else {
            GroupContent::Groups(Vec::new())
        };
        Self { key, content }
    }

    fn first_leaf(&self) -> Option<usize> {
        match &self.content {
            GroupContent::Leaves(leaves) => leaves.first().copied(),
            GroupContent::Groups(groups) => groups.first().and_then(GroupNode::first_leaf),
        }
    }

    fn is_empty(&self) -> bool {
        match &self.content {
            GroupContent::Leaves(leaves) => leaves.is_empty(),
            GroupContent::Groups(groups) => groups.is_empty(),
        }
    }

    fn leaf_count(&self) -> usize {
        match &self.content {
            GroupContent::Leaves(leaves) => leaves.len(),
            GroupContent::Groups(groups) => groups.iter().map(GroupNode::leaf_count).sum(),
        }
    }
}

/// Orders two source indices.
pub(crate) type IndexOrder<'a> = &'a dyn Fn(usize, usize) -> Ordering;

fn insert_into(
    nodes: &mut Vec<GroupNode>,
    index: usize,
    key_path: &[Vec<PropertyValue>],
    order: Option<IndexOrder<'_>>,
    moved: &mut bool,
) {
    let Some((keys, rest)) = key_path.split_first() else {
        return;
    };
    for key in keys {
        let position = match nodes.iter().position(|n| &n.key == key) {
            Some(position) => position,
            None => {
                let at = order
                    .and_then(|order| {
                        nodes
                            .iter()
                            .position(|n| n.first_leaf().is_some_and(|first| order(index, first).is_lt()))
                    })
                    .unwrap_or(nodes.len());
                tracing::trace!(target: targets::GROUPING, key = %key, at, "new group");
                nodes.insert(at, GroupNode::new(key.clone(), rest.is_empty()));
                at
            }
        };
        match &mut nodes[position].content {
            GroupContent::Groups(children) => insert_into(children, index, rest, order, moved),
            GroupContent::Leaves(leaves) => {
                let at = match order {
                    Some(order) => leaves.partition_point(|&leaf| order(leaf, index).is_lt()),
                    None => leaves.len(),
                };
                leaves.insert(at, index);
            }
        }
        if let Some(order) = order {
            *moved |= settle(nodes, order);
        }
    }
}

/// Restores first-appearance order among siblings after one of them gained
/// or lost its first member. Ties keep their relative order. Returns `true`
/// if any sibling moved.
fn settle(nodes: &mut [GroupNode], order: IndexOrder<'_>) -> bool {
    let compare = |a: &GroupNode, b: &GroupNode| match (a.first_leaf(), b.first_leaf()) {
        (Some(a), Some(b)) => order(a, b),
        (a, b) => a.is_none().cmp(&b.is_none()),
    };
    if nodes.is_sorted_by(|a, b| compare(a, b).is_le()) {
        return false;
    }
    nodes.sort_by(compare);
    tracing::trace!(target: targets::GROUPING, "groups reordered by first member");
    true
}

fn remove_from(
    nodes: &mut Vec<GroupNode>,
    index: usize,
    order: IndexOrder<'_>,
    moved: &mut bool,
) -> bool {
    let mut removed = false;
    for node in nodes.iter_mut() {
        removed |= match &mut node.content {
            GroupContent::Leaves(leaves) => {
                let before = leaves.len();
                leaves.retain(|&leaf| leaf != index);
                leaves.len() != before
            }
            GroupContent::Groups(children) => remove_from(children, index, order, moved),
        };
    }
    nodes.retain(|node| {
        let keep = !node.is_empty();
        if !keep {
            tracing::trace!(target: targets::GROUPING, key = %node.key, "pruned empty group");
        }
        keep
    });
    if removed {
        *moved |= settle(nodes, order);
    }
    removed
}

fn for_each_leaf_mut(nodes: &mut [GroupNode], f: &mut dyn FnMut(&mut usize)) {
    for node in nodes {
        match &mut node.content {
            GroupContent::Leaves(leaves) => leaves.iter_mut().for_each(&mut *f),
            GroupContent::Groups(children) => for_each_leaf_mut(children, f),
        }
    }
}

fn flatten_into(nodes: &[GroupNode], out: &mut Vec<usize>) {
    for node in nodes {
        match &node.content {
            GroupContent::Leaves(leaves) => out.extend_from_slice(leaves),
            GroupContent::Groups(children) => flatten_into(children, out),
        }
    }
}

fn snapshot_nodes<T>(
    nodes: &[GroupNode],
    path: &mut Vec<PropertyValue>,
    resolve: &dyn Fn(usize) -> Option<ItemHandle<T>>,
) -> Vec<Group<T>> {
    nodes
        .iter()
        .map(|node| {
            let entries = match &node.content {
                GroupContent::Leaves(leaves) => leaves
                    .iter()
                    .filter_map(|&leaf| resolve(leaf))
                    .map(|item| GroupEntry::Item(ViewItem::Item(item)))
                    .collect(),
                GroupContent::Groups(children) => {
                    path.push(node.key.clone());
                    let groups = snapshot_nodes(children, path, resolve);
                    path.pop();
                    groups.into_iter().map(GroupEntry::Group).collect()
                }
            };
            Group {
                key: node.key.clone(),
                path: path.clone(),
                entries,
                item_count: node.leaf_count(),
            }
        })
        .collect()
}

/// The grouping configuration of a view and the tree it maintains.
pub struct GroupingStage<T> {
    descriptions: Vec<GroupDescription<T>>,
    roots: Vec<GroupNode>,
    /// Set when an incremental change reordered groups.
    moved: bool,
}

impl<T: CollectionItem> Default for GroupingStage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> GroupingStage<T> {
    /// An ungrouped stage.
    pub fn new() -> Self {
        Self {
            descriptions: Vec::new(),
            roots: Vec::new(),
            moved: false,
        }
    }

    /// Returns `true` if at least one description is configured.
    pub fn is_active(&self) -> bool {
        !self.descriptions.is_empty()
    }

    /// The configured descriptions, outermost first.
    pub fn descriptions(&self) -> &[GroupDescription<T>] {
        &self.descriptions
    }

    /// Adds an innermost grouping level. The tree must be rebuilt afterwards.
    pub fn push(&mut self, description: GroupDescription<T>) {
        self.descriptions.push(description);
        self.roots.clear();
    }

    /// Removes the level at `index`. The tree must be rebuilt afterwards.
    pub fn remove(&mut self, index: usize) -> Option<GroupDescription<T>> {
        if index >= self.descriptions.len() {
            return None;
        }
        self.roots.clear();
        Some(self.descriptions.remove(index))
    }

    /// Removes all levels.
    pub fn clear(&mut self) {
        self.descriptions.clear();
        self.roots.clear();
    }

    /// Keys of `item` at each level.
    pub fn key_path(&self, item: &T) -> Vec<Vec<PropertyValue>> {
        self.descriptions.iter().map(|d| d.keys_for(item)).collect()
    }

    /// Rebuilds the tree from indices already in view order.
    pub(crate) fn rebuild(&mut self, ordered: &[usize], key_path: &dyn Fn(usize) -> Vec<Vec<PropertyValue>>) {
        self.roots.clear();
        self.moved = false;
        if !self.is_active() {
            return;
        }
        for &index in ordered {
            insert_into(&mut self.roots, index, &key_path(index), None, &mut self.moved);
        }
        tracing::debug!(target: targets::GROUPING, groups = self.roots.len(), "regrouped");
    }

    /// Places one index into every group its keys select.
    pub(crate) fn insert(&mut self, index: usize, key_path: &[Vec<PropertyValue>], order: IndexOrder<'_>) {
        if self.is_active() {
            insert_into(&mut self.roots, index, key_path, Some(order), &mut self.moved);
        }
    }

    /// Removes every occurrence of an index, pruning empty groups and
    /// moving groups whose first member went away.
    pub(crate) fn remove_index(&mut self, index: usize, order: IndexOrder<'_>) -> bool {
        remove_from(&mut self.roots, index, order, &mut self.moved)
    }

    /// Returns and clears whether incremental changes reordered groups
    /// since the last call.
    pub(crate) fn take_moved(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    /// Adjusts leaves after a source insertion at `at`.
    pub(crate) fn shift_inserted(&mut self, at: usize) {
        for_each_leaf_mut(&mut self.roots, &mut |leaf: &mut usize| {
            if *leaf >= at {
                *leaf += 1;
            }
        });
    }

    /// Adjusts leaves after a source removal at `at`.
    pub(crate) fn shift_removed(&mut self, at: usize) {
        for_each_leaf_mut(&mut self.roots, &mut |leaf: &mut usize| {
            if *leaf > at {
                *leaf -= 1;
            }
        });
    }

    /// Leaves in view order; an index appears once per membership.
    pub(crate) fn flatten(&self) -> Vec<usize> {
        let mut out = Vec::new();
        flatten_into(&self.roots, &mut out);
        out
    }

    /// A public snapshot of the tree.
    pub(crate) fn snapshot(&self, resolve: &dyn Fn(usize) -> Option<ItemHandle<T>>) -> Vec<Group<T>> {
        snapshot_nodes(&self.roots, &mut Vec::new(), resolve)
    }
}
