//! Mutation set organised by path component.
//!
//! Every level of the trie corresponds to a directory level in the tree that
//! is being mutated, so that tree building can descend the base tree and the
//! trie in lockstep, touching only the sub-trees named by the trie.

use crate::{err_at, Error, Result};

pub struct Trie<'a> {
    root: Node<'a>,
}

impl<'a> Trie<'a> {
    pub fn new() -> Trie<'a> {
        Trie {
            root: "--root--".to_string().into(),
        }
    }

    /// Add blob `data` at `comps`, with file `mode`.
    pub fn insert(&mut self, comps: &[&str], data: &'a [u8], mode: i32) -> Result<()> {
        self.root.insert(comps, data, mode)
    }

    /// Remove the entry at `comps`, if present.
    pub fn remove(&mut self, comps: &[&str]) -> Result<()> {
        self.root.remove(comps)
    }

    pub fn as_root(&self) -> &Node<'a> {
        &self.root
    }
}

pub struct Node<'a> {
    comp: String,
    children: Vec<Node<'a>>,
    leafs: Vec<Op<'a>>,
    // number of inserts at or below this node.
    n_inserts: usize,
}

pub enum Op<'a> {
    /// insert leaf component
    Ins {
        comp: String,
        data: &'a [u8],
        mode: i32,
    },
    /// Remove leaf component
    Rem { comp: String },
}

impl<'a> Op<'a> {
    pub fn as_comp(&self) -> &str {
        match self {
            Op::Ins { comp, .. } => comp,
            Op::Rem { comp } => comp,
        }
    }
}

impl<'a> From<String> for Node<'a> {
    fn from(comp: String) -> Node<'a> {
        Node {
            comp,
            children: Vec::default(),
            leafs: Vec::default(),
            n_inserts: 0,
        }
    }
}

impl<'a> Node<'a> {
    pub fn as_comp(&self) -> &str {
        &self.comp
    }

    pub fn as_children(&self) -> &[Node<'a>] {
        &self.children
    }

    pub fn as_leafs(&self) -> &[Op<'a>] {
        &self.leafs
    }

    /// Whether this sub-trie adds anything, a sub-trie with only removals
    /// never has to create a tree that does not exist yet.
    pub fn has_inserts(&self) -> bool {
        self.n_inserts > 0
    }

    fn insert(&mut self, comps: &[&str], data: &'a [u8], mode: i32) -> Result<()> {
        match comps {
            [comp] => {
                if self.children_has_inserts(comp) {
                    return err_at!(InvalidMutation, msg: "{:?} added as file and dir", comp);
                }
                let off = self.leaf_offset(comp)?;
                let op = Op::Ins {
                    comp: comp.to_string(),
                    data,
                    mode,
                };
                self.leafs.insert(off, op);
            }
            [comp, ..] => {
                let res = self.leafs.binary_search_by(|op| op.as_comp().cmp(comp));
                if let Ok(off) = res {
                    if let Op::Ins { .. } = self.leafs[off] {
                        return err_at!(InvalidMutation, msg: "{:?} added as file and dir", comp);
                    }
                }
                let off = self.child_offset(comp);
                self.children[off].insert(&comps[1..], data, mode)?;
            }
            [] => return err_at!(InvalidMutation, msg: "empty path"),
        }

        self.n_inserts += 1;
        Ok(())
    }

    fn remove(&mut self, comps: &[&str]) -> Result<()> {
        match comps {
            [comp] => {
                let off = self.leaf_offset(comp)?;
                let op = Op::Rem {
                    comp: comp.to_string(),
                };
                self.leafs.insert(off, op);
            }
            [comp, ..] => {
                let off = self.child_offset(comp);
                self.children[off].remove(&comps[1..])?;
            }
            [] => return err_at!(InvalidMutation, msg: "empty path"),
        }

        Ok(())
    }

    // offset to insert a new leaf op, a leaf can be named only once.
    fn leaf_offset(&self, comp: &str) -> Result<usize> {
        match self.leafs.binary_search_by(|op| op.as_comp().cmp(comp)) {
            Ok(_) => err_at!(InvalidMutation, msg: "{:?} mutated more than once", comp),
            Err(off) => Ok(off),
        }
    }

    fn child_offset(&mut self, comp: &str) -> usize {
        match self.children.binary_search_by(|n| n.comp.as_str().cmp(comp)) {
            Ok(off) => off,
            Err(off) => {
                self.children.insert(off, comp.to_string().into());
                off
            }
        }
    }

    fn children_has_inserts(&self, comp: &str) -> bool {
        match self.children.binary_search_by(|n| n.comp.as_str().cmp(comp)) {
            Ok(off) => self.children[off].has_inserts(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "trie_test.rs"]
mod trie_test;
