use std::collections::HashMap;

use crate::core::{aabb::Aabb, rigidbody::BodyHandle};

const NULL_NODE: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct TreeNode {
    /// Fat box for leaves, union of the children for internal nodes.
    aabb: Aabb,
    parent: u32,
    left: u32,
    right: u32,
    /// Leaf payload; `None` for internal and free nodes.
    body: Option<BodyHandle>,
    height: i32,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Dynamic bounding-volume tree over fat body AABBs.
///
/// Leaves store the tight AABB grown by `margin`, so a body that moves a
/// little stays inside its leaf and the tree is only restructured when the
/// body escapes it.
#[derive(Debug)]
pub struct DynamicTree {
    nodes: Vec<TreeNode>,
    root: u32,
    leaves: HashMap<BodyHandle, u32>,
    free_list: Vec<u32>,
    margin: f32,
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AABB_MARGIN)
    }
}

impl DynamicTree {
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            leaves: HashMap::new(),
            free_list: Vec::new(),
            margin: margin.max(0.0),
        }
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn contains(&self, body: BodyHandle) -> bool {
        self.leaves.contains_key(&body)
    }

    /// Height of the root; zero for a single leaf or an empty tree.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    pub fn fat_aabb(&self, body: BodyHandle) -> Option<Aabb> {
        self.leaves
            .get(&body)
            .map(|&leaf| self.nodes[leaf as usize].aabb)
    }

    /// Inserts `body` with its tight `aabb`. Re-inserting a known body replaces its leaf.
    pub fn insert(&mut self, body: BodyHandle, aabb: Aabb) {
        if self.leaves.contains_key(&body) {
            self.remove(body);
        }
        let leaf = self.allocate(TreeNode {
            aabb: aabb.expanded(self.margin),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            body: Some(body),
            height: 0,
        });
        self.leaves.insert(body, leaf);
        self.insert_leaf(leaf);
    }

    /// Removes `body`; returns `false` if it was not in the tree.
    pub fn remove(&mut self, body: BodyHandle) -> bool {
        match self.leaves.remove(&body) {
            Some(leaf) => {
                self.remove_leaf(leaf);
                self.free(leaf);
                true
            }
            None => false,
        }
    }

    /// Moves `body` to a new tight AABB. Returns `true` when the leaf had to be
    /// re-inserted because the box escaped its fat AABB.
    pub fn update(&mut self, body: BodyHandle, aabb: Aabb) -> bool {
        let Some(&leaf) = self.leaves.get(&body) else {
            return false;
        };
        if self.nodes[leaf as usize].aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(leaf);
        self.nodes[leaf as usize].aabb = aabb.expanded(self.margin);
        self.insert_leaf(leaf);
        true
    }

    /// Calls `visit` for every body whose fat AABB overlaps `aabb`.
    pub fn query(&self, aabb: &Aabb, mut visit: impl FnMut(BodyHandle)) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                if let Some(body) = node.body {
                    visit(body);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.leaves.clear();
        self.free_list.clear();
        self.root = NULL_NODE;
    }

    fn allocate(&mut self, node: TreeNode) -> u32 {
        if let Some(index) = self.free_list.pop() {
            self.nodes[index as usize] = node;
            index
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn free(&mut self, index: u32) {
        let node = &mut self.nodes[index as usize];
        node.body = None;
        node.parent = NULL_NODE;
        node.left = NULL_NODE;
        node.right = NULL_NODE;
        node.height = -1;
        self.free_list.push(index);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let sibling = self.find_best_sibling(&leaf_aabb);

        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.allocate(TreeNode {
            aabb: leaf_aabb.union(self.nodes[sibling as usize].aabb),
            parent: old_parent,
            left: sibling,
            right: leaf,
            body: None,
            height: self.nodes[sibling as usize].height + 1,
        });
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else {
            let parent = &mut self.nodes[old_parent as usize];
            if parent.left == sibling {
                parent.left = new_parent;
            } else {
                parent.right = new_parent;
            }
        }

        self.refit(new_parent);
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grandparent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grandparent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
        } else {
            let node = &mut self.nodes[grandparent as usize];
            if node.left == parent {
                node.left = sibling;
            } else {
                node.right = sibling;
            }
            self.nodes[sibling as usize].parent = grandparent;
            self.refit(grandparent);
        }

        self.nodes[leaf as usize].parent = NULL_NODE;
        self.free(parent);
    }

    /// Branch-and-bound search for the sibling minimizing the surface area
    /// added to the tree.
    fn find_best_sibling(&self, leaf_aabb: &Aabb) -> u32 {
        let mut best = self.root;
        let mut best_cost = leaf_aabb
            .union(self.nodes[self.root as usize].aabb)
            .surface_area();

        let mut stack = vec![(self.root, 0.0_f32)];
        while let Some((current, inherited)) = stack.pop() {
            let node = &self.nodes[current as usize];
            let direct = leaf_aabb.union(node.aabb).surface_area();
            let cost = direct + inherited;
            if cost < best_cost {
                best = current;
                best_cost = cost;
            }

            if node.is_leaf() {
                continue;
            }
            let child_inherited = inherited + direct - node.aabb.surface_area();
            let lower_bound = leaf_aabb.surface_area() + child_inherited;
            if lower_bound < best_cost {
                stack.push((node.left, child_inherited));
                stack.push((node.right, child_inherited));
            }
        }
        best
    }

    /// Walks from `start` to the root, rebalancing and refitting each
    /// ancestor.
    fn refit(&mut self, start: u32) {
        let mut current = start;
        while current != NULL_NODE {
            current = self.balance(current);
            self.recompute(current);
            current = self.nodes[current as usize].parent;
        }
    }

    fn recompute(&mut self, index: u32) {
        let (left, right) = {
            let node = &self.nodes[index as usize];
            (node.left, node.right)
        };
        let left_node = &self.nodes[left as usize];
        let right_node = &self.nodes[right as usize];
        let aabb = left_node.aabb.union(right_node.aabb);
        let height = 1 + left_node.height.max(right_node.height);

        let node = &mut self.nodes[index as usize];
        node.aabb = aabb;
        node.height = height;
    }

    /// Rotates the taller child of `index` up when the child heights differ
    /// by more than one. Returns the node now occupying `index`'s slot.
    fn balance(&mut self, index: u32) -> u32 {
        let node = &self.nodes[index as usize];
        if node.is_leaf() || node.height < 2 {
            return index;
        }
        let (left, right) = (node.left, node.right);
        let skew = self.nodes[right as usize].height - self.nodes[left as usize].height;
        if skew > 1 {
            self.rotate_up(index, right, false)
        } else if skew < -1 {
            self.rotate_up(index, left, true)
        } else {
            index
        }
    }

    /// Promotes `child` into `index`'s place. The taller grandchild stays
    /// under `child`, the shorter one moves down to `index`.
    fn rotate_up(&mut self, index: u32, child: u32, child_is_left: bool) -> u32 {
        let (first, second) = {
            let node = &self.nodes[child as usize];
            (node.left, node.right)
        };
        let (keep, moved) =
            if self.nodes[first as usize].height > self.nodes[second as usize].height {
                (first, second)
            } else {
                (second, first)
            };

        let parent = self.nodes[index as usize].parent;
        if parent == NULL_NODE {
            self.root = child;
        } else {
            let parent_node = &mut self.nodes[parent as usize];
            if parent_node.left == index {
                parent_node.left = child;
            } else {
                parent_node.right = child;
            }
        }

        {
            let promoted = &mut self.nodes[child as usize];
            promoted.parent = parent;
            promoted.left = index;
            promoted.right = keep;
        }
        {
            let demoted = &mut self.nodes[index as usize];
            demoted.parent = child;
            if child_is_left {
                demoted.left = moved;
            } else {
                demoted.right = moved;
            }
        }
        self.nodes[moved as usize].parent = index;

        self.recompute(index);
        self.recompute(child);
        child
    }

    /// Checks parent links, heights and containment for every reachable node.
    #[cfg(test)]
    fn assert_consistent(&self) {
        if self.root == NULL_NODE {
            assert!(self.leaves.is_empty());
            return;
        }
        assert_eq!(self.nodes[self.root as usize].parent, NULL_NODE);
        let mut leaf_count = 0;
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current as usize];
            if node.is_leaf() {
                leaf_count += 1;
                assert_eq!(node.height, 0);
                let body = node.body.expect("leaf without body");
                assert_eq!(self.leaves[&body], current);
                continue;
            }
            for child in [node.left, node.right] {
                assert_eq!(self.nodes[child as usize].parent, current);
                assert!(node.aabb.contains(&self.nodes[child as usize].aabb));
                stack.push(child);
            }
            let expected = 1 + self.nodes[node.left as usize]
                .height
                .max(self.nodes[node.right as usize].height);
            assert_eq!(node.height, expected);
        }
        assert_eq!(leaf_count, self.leaves.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn handle(index: u32) -> BodyHandle {
        BodyHandle::new(index, 0)
    }

    fn unit_box(center: Vec3) -> Aabb {
        Aabb::from_center_half_extents(center, Vec3::splat(0.5))
    }

    #[test]
    fn insert_and_remove_keep_tree_consistent() {
        let mut tree = DynamicTree::new(0.1);
        for i in 0..32 {
            tree.insert(handle(i), unit_box(Vec3::new(i as f32 * 1.5, 0.0, 0.0)));
            tree.assert_consistent();
        }
        assert_eq!(tree.len(), 32);
        for i in (0..32).step_by(3) {
            assert!(tree.remove(handle(i)));
            tree.assert_consistent();
        }
        assert!(!tree.remove(handle(0)));
        assert_eq!(tree.len(), 21);
    }

    #[test]
    fn sorted_inserts_keep_tree_shallow() {
        let mut tree = DynamicTree::new(0.1);
        for i in 0..256 {
            tree.insert(handle(i), unit_box(Vec3::new(i as f32 * 2.0, 0.0, 0.0)));
        }
        tree.assert_consistent();
        assert!(tree.height() <= 20, "height {}", tree.height());

        for i in (0..256).filter(|i| i % 4 != 0) {
            tree.remove(handle(i));
        }
        tree.assert_consistent();
        assert!(tree.height() <= 16, "height {}", tree.height());
    }

    #[test]
    fn small_motion_stays_in_fat_aabb() {
        let mut tree = DynamicTree::new(0.1);
        tree.insert(handle(0), unit_box(Vec3::ZERO));
        assert!(!tree.update(handle(0), unit_box(Vec3::new(0.05, 0.0, 0.0))));
        assert!(tree.update(handle(0), unit_box(Vec3::new(2.0, 0.0, 0.0))));
        let fat = tree.fat_aabb(handle(0)).unwrap();
        assert!(fat.contains(&unit_box(Vec3::new(2.0, 0.0, 0.0))));
        tree.assert_consistent();
    }

    #[test]
    fn query_matches_brute_force() {
        let mut tree = DynamicTree::new(0.0);
        let boxes: Vec<Aabb> = (0..40)
            .map(|i| {
                let f = i as f32;
                unit_box(Vec3::new((f * 0.7).sin() * 5.0, (f * 1.3).cos() * 5.0, f * 0.2))
            })
            .collect();
        for (i, aabb) in boxes.iter().enumerate() {
            tree.insert(handle(i as u32), *aabb);
        }

        let probe = Aabb::new(Vec3::new(-2.0, -2.0, 0.0), Vec3::new(2.0, 2.0, 4.0));
        let mut found = Vec::new();
        tree.query(&probe, |body| found.push(body.index()));
        found.sort_unstable();

        let expected: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, aabb)| aabb.intersects(&probe))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(found, expected);
    }
}
